//! 문자열 함수와 정규식 함수
//!
//! 정규식은 패턴 문자열 단위로 프로세스 전역 캐시에 보관됩니다.
//! 리터럴 패턴은 파싱 시점에 컴파일을 검증합니다.

use std::collections::{BTreeMap, HashMap};
use std::sync::{OnceLock, RwLock};

use pipewright_core::value::Value;
use regex::Regex;

use super::{Builtin, ConstantArgs, FunctionArgs, FunctionDescriptor, FunctionError, ParameterDescriptor};
use crate::interpreter::EvaluationContext;
use crate::types::ValueType;

const REGEX_CACHE_MAX: usize = 1024;

static REGEX_CACHE: OnceLock<RwLock<HashMap<String, Regex>>> = OnceLock::new();

/// 컴파일된 정규식을 캐시에서 찾거나 새로 컴파일합니다.
pub(crate) fn cached_regex(pattern: &str) -> Result<Regex, FunctionError> {
    let cache = REGEX_CACHE.get_or_init(|| RwLock::new(HashMap::new()));

    {
        let guard = cache
            .read()
            .map_err(|_| FunctionError::Failed("regex cache lock poisoned".to_owned()))?;
        if let Some(re) = guard.get(pattern) {
            return Ok(re.clone());
        }
    }

    let compiled = Regex::new(pattern)
        .map_err(|e| FunctionError::invalid("pattern", format!("invalid regex '{pattern}': {e}")))?;

    let mut guard = cache
        .write()
        .map_err(|_| FunctionError::Failed("regex cache lock poisoned".to_owned()))?;
    if guard.len() >= REGEX_CACHE_MAX {
        guard.clear();
    }
    guard
        .entry(pattern.to_owned())
        .or_insert_with(|| compiled.clone());
    Ok(compiled)
}

fn validate_pattern(args: &ConstantArgs) -> Result<(), FunctionError> {
    match args.get_str("pattern") {
        Some(pattern) => cached_regex(pattern).map(|_| ()),
        None => Ok(()),
    }
}

fn unary(name: &str, description: &str) -> FunctionDescriptor {
    FunctionDescriptor::new(name, ValueType::String)
        .param(ParameterDescriptor::required("value", ValueType::String))
        .description(description)
}

fn affix(name: &str, needle: &str, description: &str) -> FunctionDescriptor {
    FunctionDescriptor::new(name, ValueType::Bool)
        .param(ParameterDescriptor::required("value", ValueType::String))
        .param(ParameterDescriptor::required(needle, ValueType::String))
        .param(ParameterDescriptor::optional("ignore_case", ValueType::Bool).default_value(false))
        .description(description)
}

pub(crate) fn builtins() -> Vec<Builtin> {
    vec![
        Builtin::new(unary("lowercase", "Converts a string to lower case"), |args, _| {
            Ok(Value::String(args.required_str("value")?.to_lowercase()))
        }),
        Builtin::new(unary("uppercase", "Converts a string to upper case"), |args, _| {
            Ok(Value::String(args.required_str("value")?.to_uppercase()))
        }),
        Builtin::new(unary("capitalize", "Upper-cases the first character"), capitalize),
        Builtin::new(unary("trim", "Removes leading and trailing whitespace"), |args, _| {
            Ok(Value::String(args.required_str("value")?.trim().to_owned()))
        }),
        Builtin::new(
            FunctionDescriptor::new("abbreviate", ValueType::String)
                .param(ParameterDescriptor::required("value", ValueType::String))
                .param(ParameterDescriptor::required("width", ValueType::Long))
                .description("Shortens a string to at most `width` characters using an ellipsis"),
            abbreviate,
        ),
        Builtin::new(
            affix("contains", "search", "Checks whether the string contains the search string"),
            contains,
        ),
        Builtin::new(
            affix("starts_with", "prefix", "Checks whether the string starts with the prefix"),
            starts_with,
        ),
        Builtin::new(
            affix("ends_with", "suffix", "Checks whether the string ends with the suffix"),
            ends_with,
        ),
        Builtin::new(
            FunctionDescriptor::new("substring", ValueType::String)
                .param(ParameterDescriptor::required("value", ValueType::String))
                .param(ParameterDescriptor::required("start", ValueType::Long))
                .param(ParameterDescriptor::optional("end", ValueType::Long))
                .description("Character range of a string; negative indices count from the end"),
            substring,
        ),
        Builtin::new(
            FunctionDescriptor::new("concat", ValueType::String)
                .param(ParameterDescriptor::required("first", ValueType::Any))
                .param(ParameterDescriptor::required("second", ValueType::Any))
                .description("Concatenates the string forms of two values"),
            |args, _| {
                let display = |name: &str| args.get(name).map(Value::to_display_string).unwrap_or_default();
                Ok(Value::String(display("first") + &display("second")))
            },
        ),
        Builtin::new(
            FunctionDescriptor::new("length", ValueType::Long)
                .param(ParameterDescriptor::required("value", ValueType::String))
                .param(ParameterDescriptor::optional("bytes", ValueType::Bool).default_value(false))
                .description("Number of characters, or bytes when `bytes` is set"),
            length,
        ),
        Builtin::new(
            FunctionDescriptor::new("split", ValueType::List)
                .param(ParameterDescriptor::required("pattern", ValueType::String))
                .param(ParameterDescriptor::required("value", ValueType::String))
                .param(ParameterDescriptor::optional("limit", ValueType::Long).default_value(0i64))
                .description("Splits a string around regex matches"),
            split,
        )
        .with_validation(validate_pattern),
        Builtin::new(
            FunctionDescriptor::new("join", ValueType::String)
                .param(ParameterDescriptor::required("elements", ValueType::List))
                .param(ParameterDescriptor::optional("delimiter", ValueType::String).default_value(""))
                .description("Joins the string forms of list elements"),
            join,
        ),
        Builtin::new(
            FunctionDescriptor::new("replace", ValueType::String)
                .param(ParameterDescriptor::required("value", ValueType::String))
                .param(ParameterDescriptor::required("search", ValueType::String))
                .param(ParameterDescriptor::optional("replacement", ValueType::String).default_value(""))
                .param(ParameterDescriptor::optional("max", ValueType::Long).default_value(-1i64))
                .description("Replaces literal occurrences; `max` below zero replaces all"),
            replace,
        ),
        Builtin::new(
            FunctionDescriptor::new("regex", ValueType::Map)
                .param(ParameterDescriptor::required("pattern", ValueType::String))
                .param(ParameterDescriptor::required("value", ValueType::String))
                .param(ParameterDescriptor::optional("group_names", ValueType::List))
                .description("Matches a regex; the result has `matches` and one entry per capture group"),
            regex_match,
        )
        .with_validation(validate_pattern),
        Builtin::new(
            FunctionDescriptor::new("regex_replace", ValueType::String)
                .param(ParameterDescriptor::required("pattern", ValueType::String))
                .param(ParameterDescriptor::required("value", ValueType::String))
                .param(ParameterDescriptor::required("replacement", ValueType::String))
                .param(ParameterDescriptor::optional("replace_all", ValueType::Bool).default_value(true))
                .description("Replaces regex matches; `$1` and `${name}` refer to groups"),
            regex_replace,
        )
        .with_validation(validate_pattern),
        Builtin::new(
            FunctionDescriptor::new("key_value", ValueType::Map)
                .param(ParameterDescriptor::required("value", ValueType::String))
                .param(ParameterDescriptor::optional("delimiters", ValueType::String).default_value(" "))
                .param(ParameterDescriptor::optional("kv_delimiters", ValueType::String).default_value("="))
                .param(
                    ParameterDescriptor::optional("ignore_empty_values", ValueType::Bool)
                        .default_value(true),
                )
                .param(ParameterDescriptor::optional("trim_key_chars", ValueType::String).default_value(""))
                .param(ParameterDescriptor::optional("trim_value_chars", ValueType::String).default_value(""))
                .description("Extracts key=value pairs; the first occurrence of a key wins"),
            key_value,
        ),
    ]
}

fn capitalize(args: &FunctionArgs, _ctx: &mut EvaluationContext<'_>) -> Result<Value, FunctionError> {
    let value = args.required_str("value")?;
    let mut chars = value.chars();
    let capitalized = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    };
    Ok(Value::String(capitalized))
}

fn abbreviate(args: &FunctionArgs, _ctx: &mut EvaluationContext<'_>) -> Result<Value, FunctionError> {
    const ELLIPSIS: &str = "...";
    let value = args.required_str("value")?;
    let width = args.required_long("width")?;
    if width < 4 {
        return Err(FunctionError::invalid("width", "minimum abbreviation width is 4"));
    }
    let width = usize::try_from(width).unwrap_or(usize::MAX);
    if value.chars().count() <= width {
        return Ok(Value::String(value.to_owned()));
    }
    let head: String = value.chars().take(width - ELLIPSIS.len()).collect();
    Ok(Value::String(head + ELLIPSIS))
}

fn affix_check(
    args: &FunctionArgs,
    needle: &str,
    check: fn(&str, &str) -> bool,
) -> Result<Value, FunctionError> {
    let value = args.required_str("value")?;
    let needle = args.required_str(needle)?;
    let matched = if args.optional_bool("ignore_case")?.unwrap_or(false) {
        check(&value.to_lowercase(), &needle.to_lowercase())
    } else {
        check(value, needle)
    };
    Ok(Value::Bool(matched))
}

fn contains(args: &FunctionArgs, _ctx: &mut EvaluationContext<'_>) -> Result<Value, FunctionError> {
    affix_check(args, "search", |v, n| v.contains(n))
}

fn starts_with(args: &FunctionArgs, _ctx: &mut EvaluationContext<'_>) -> Result<Value, FunctionError> {
    affix_check(args, "prefix", |v, n| v.starts_with(n))
}

fn ends_with(args: &FunctionArgs, _ctx: &mut EvaluationContext<'_>) -> Result<Value, FunctionError> {
    affix_check(args, "suffix", |v, n| v.ends_with(n))
}

/// 음수 인덱스를 문자 수 기준 위치로 변환하고 `[0, len]`으로 자릅니다.
fn clamp_index(index: i64, len: usize) -> usize {
    let len_i = i64::try_from(len).unwrap_or(i64::MAX);
    let absolute = if index < 0 { len_i.saturating_add(index) } else { index };
    usize::try_from(absolute.clamp(0, len_i)).unwrap_or(len)
}

fn substring(args: &FunctionArgs, _ctx: &mut EvaluationContext<'_>) -> Result<Value, FunctionError> {
    let value = args.required_str("value")?;
    let len = value.chars().count();
    let start = clamp_index(args.required_long("start")?, len);
    let end = match args.optional_long("end")? {
        Some(end) => clamp_index(end, len),
        None => len,
    };
    if start >= end {
        return Ok(Value::String(String::new()));
    }
    Ok(Value::String(value.chars().skip(start).take(end - start).collect()))
}

fn length(args: &FunctionArgs, _ctx: &mut EvaluationContext<'_>) -> Result<Value, FunctionError> {
    let value = args.required_str("value")?;
    let len = if args.optional_bool("bytes")?.unwrap_or(false) {
        value.len()
    } else {
        value.chars().count()
    };
    Ok(Value::Long(i64::try_from(len).unwrap_or(i64::MAX)))
}

fn split(args: &FunctionArgs, _ctx: &mut EvaluationContext<'_>) -> Result<Value, FunctionError> {
    let re = cached_regex(args.required_str("pattern")?)?;
    let value = args.required_str("value")?;
    let limit = args.optional_long("limit")?.unwrap_or(0);
    let parts: Vec<Value> = if limit > 0 {
        re.splitn(value, usize::try_from(limit).unwrap_or(usize::MAX))
            .map(Value::from)
            .collect()
    } else {
        let mut parts: Vec<&str> = re.split(value).collect();
        // 끝의 빈 조각은 버립니다.
        while parts.last().is_some_and(|p| p.is_empty()) {
            parts.pop();
        }
        parts.into_iter().map(Value::from).collect()
    };
    Ok(Value::List(parts))
}

fn join(args: &FunctionArgs, _ctx: &mut EvaluationContext<'_>) -> Result<Value, FunctionError> {
    let elements = args.required_list("elements")?;
    let delimiter = args.optional_str("delimiter")?.unwrap_or_default();
    let joined: Vec<String> = elements.iter().map(Value::to_display_string).collect();
    Ok(Value::String(joined.join(delimiter)))
}

fn replace(args: &FunctionArgs, _ctx: &mut EvaluationContext<'_>) -> Result<Value, FunctionError> {
    let value = args.required_str("value")?;
    let search = args.required_str("search")?;
    let replacement = args.optional_str("replacement")?.unwrap_or_default();
    let max = args.optional_long("max")?.unwrap_or(-1);
    if search.is_empty() || max == 0 {
        return Ok(Value::String(value.to_owned()));
    }
    let replaced = match usize::try_from(max) {
        Ok(max) => value.replacen(search, replacement, max),
        Err(_) => value.replace(search, replacement),
    };
    Ok(Value::String(replaced))
}

fn regex_match(args: &FunctionArgs, _ctx: &mut EvaluationContext<'_>) -> Result<Value, FunctionError> {
    let re = cached_regex(args.required_str("pattern")?)?;
    let value = args.required_str("value")?;
    let group_names: Vec<String> = match args.get("group_names") {
        Some(Value::List(names)) => names.iter().map(Value::to_display_string).collect(),
        _ => Vec::new(),
    };

    let mut result = BTreeMap::new();
    let Some(captures) = re.captures(value) else {
        result.insert("matches".to_owned(), Value::Bool(false));
        return Ok(Value::Map(result));
    };
    result.insert("matches".to_owned(), Value::Bool(true));
    let regex_names: Vec<Option<&str>> = re.capture_names().skip(1).collect();
    for (index, group) in captures.iter().skip(1).enumerate() {
        let key = group_names
            .get(index)
            .cloned()
            .or_else(|| regex_names.get(index).copied().flatten().map(str::to_owned))
            .unwrap_or_else(|| index.to_string());
        let value = group.map(|m| Value::from(m.as_str())).unwrap_or(Value::Null);
        result.insert(key, value);
    }
    Ok(Value::Map(result))
}

fn regex_replace(args: &FunctionArgs, _ctx: &mut EvaluationContext<'_>) -> Result<Value, FunctionError> {
    let re = cached_regex(args.required_str("pattern")?)?;
    let value = args.required_str("value")?;
    let replacement = args.required_str("replacement")?;
    let replaced = if args.optional_bool("replace_all")?.unwrap_or(true) {
        re.replace_all(value, replacement)
    } else {
        re.replace(value, replacement)
    };
    Ok(Value::String(replaced.into_owned()))
}

fn key_value(args: &FunctionArgs, _ctx: &mut EvaluationContext<'_>) -> Result<Value, FunctionError> {
    let value = args.required_str("value")?;
    let delimiters = args.optional_str("delimiters")?.unwrap_or(" ");
    let kv_delimiters = args.optional_str("kv_delimiters")?.unwrap_or("=");
    let ignore_empty = args.optional_bool("ignore_empty_values")?.unwrap_or(true);
    let trim_key: Vec<char> = args.optional_str("trim_key_chars")?.unwrap_or_default().chars().collect();
    let trim_value: Vec<char> = args
        .optional_str("trim_value_chars")?
        .unwrap_or_default()
        .chars()
        .collect();
    if delimiters.is_empty() || kv_delimiters.is_empty() {
        return Err(FunctionError::invalid("delimiters", "delimiters must not be empty"));
    }

    let mut result = BTreeMap::new();
    for pair in value.split(|c: char| delimiters.contains(c)) {
        let Some((key, val)) = pair.split_once(|c: char| kv_delimiters.contains(c)) else {
            continue;
        };
        let key = key.trim_matches(trim_key.as_slice());
        let val = val.trim_matches(trim_value.as_slice());
        if key.is_empty() || (ignore_empty && val.is_empty()) {
            continue;
        }
        result
            .entry(key.to_owned())
            .or_insert_with(|| Value::from(val));
    }
    Ok(Value::Map(result))
}
