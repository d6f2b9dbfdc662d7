//! 메시지 필드, 생명주기, 스트림, 메타데이터 함수
//!
//! 모든 함수는 선택 인자 `message`로 대상 메시지를 지정할 수 있으며
//! 생략하면 현재 평가 중인 메시지에 적용됩니다.

use chrono::Utc;
use pipewright_core::message::{DEFAULT_STREAM_ID, Message};
use pipewright_core::value::Value;

use super::{Builtin, FunctionArgs, FunctionDescriptor, FunctionError, ParameterDescriptor};
use crate::interpreter::EvaluationContext;
use crate::types::ValueType;

fn message_param() -> ParameterDescriptor {
    ParameterDescriptor::optional("message", ValueType::Message)
        .description("Target message, defaults to the message being processed")
}

pub(crate) fn builtins() -> Vec<Builtin> {
    vec![
        Builtin::new(
            FunctionDescriptor::new("has_field", ValueType::Bool)
                .param(ParameterDescriptor::required("field", ValueType::String))
                .param(message_param())
                .description("Checks whether the message has the field"),
            has_field,
        ),
        Builtin::new(
            FunctionDescriptor::new("set_field", ValueType::Void)
                .param(ParameterDescriptor::required("field", ValueType::String))
                .param(ParameterDescriptor::required("value", ValueType::Any))
                .param(ParameterDescriptor::optional("prefix", ValueType::String))
                .param(ParameterDescriptor::optional("suffix", ValueType::String))
                .param(message_param())
                .description("Sets a field; null values are ignored"),
            set_field,
        ),
        Builtin::new(
            FunctionDescriptor::new("set_fields", ValueType::Void)
                .param(ParameterDescriptor::required("fields", ValueType::Map))
                .param(ParameterDescriptor::optional("prefix", ValueType::String))
                .param(ParameterDescriptor::optional("suffix", ValueType::String))
                .param(message_param())
                .description("Sets every entry of the map as a field"),
            set_fields,
        ),
        Builtin::new(
            FunctionDescriptor::new("rename_field", ValueType::Void)
                .param(ParameterDescriptor::required("old_field", ValueType::String))
                .param(ParameterDescriptor::required("new_field", ValueType::String))
                .param(message_param())
                .description("Renames a field"),
            rename_field,
        ),
        Builtin::new(
            FunctionDescriptor::new("remove_field", ValueType::Void)
                .param(ParameterDescriptor::required("field", ValueType::String))
                .param(message_param())
                .description("Removes a field; reserved fields are kept"),
            remove_field,
        ),
        Builtin::new(
            FunctionDescriptor::new("drop_message", ValueType::Void)
                .param(message_param())
                .description("Marks the message as dropped"),
            drop_message,
        ),
        Builtin::new(
            FunctionDescriptor::new("create_message", ValueType::Message)
                .param(ParameterDescriptor::optional("message", ValueType::String))
                .param(ParameterDescriptor::optional("source", ValueType::String))
                .param(ParameterDescriptor::optional("timestamp", ValueType::Date))
                .description("Creates a new message that joins the processing queue"),
            create_message,
        ),
        Builtin::new(
            FunctionDescriptor::new("clone_message", ValueType::Message)
                .param(message_param())
                .description("Copies fields and streams into a new message"),
            clone_message,
        ),
        Builtin::new(
            FunctionDescriptor::new("route_to_stream", ValueType::Void)
                .param(ParameterDescriptor::required("id", ValueType::String))
                .param(
                    ParameterDescriptor::optional("remove_from_default", ValueType::Bool)
                        .default_value(false),
                )
                .param(message_param())
                .description("Adds the message to a stream"),
            route_to_stream,
        ),
        Builtin::new(
            FunctionDescriptor::new("remove_from_stream", ValueType::Void)
                .param(ParameterDescriptor::required("id", ValueType::String))
                .param(message_param())
                .description("Removes the message from a stream; a message left without streams returns to the default stream"),
            remove_from_stream,
        ),
        Builtin::new(
            FunctionDescriptor::new("get_metadata", ValueType::Any)
                .param(ParameterDescriptor::required("key", ValueType::String))
                .param(message_param())
                .description("Reads a metadata entry"),
            get_metadata,
        ),
        Builtin::new(
            FunctionDescriptor::new("set_metadata", ValueType::Void)
                .param(ParameterDescriptor::required("key", ValueType::String))
                .param(ParameterDescriptor::required("value", ValueType::Any))
                .param(message_param())
                .description("Writes a metadata entry"),
            set_metadata,
        ),
        Builtin::new(
            FunctionDescriptor::new("remove_metadata", ValueType::Void)
                .param(ParameterDescriptor::required("key", ValueType::String))
                .param(message_param())
                .description("Removes a metadata entry"),
            remove_metadata,
        ),
    ]
}

/// `message` 인자가 가리키는 메시지
pub(crate) fn target<'c>(
    args: &FunctionArgs,
    ctx: &'c mut EvaluationContext<'_>,
) -> Result<&'c mut Message, FunctionError> {
    let handle = args.message("message")?;
    ctx.resolve_mut(handle)
        .ok_or_else(|| FunctionError::Failed(format!("unknown message reference {handle:?}")))
}

fn has_field(args: &FunctionArgs, ctx: &mut EvaluationContext<'_>) -> Result<Value, FunctionError> {
    let field = args.required_str("field")?;
    Ok(Value::Bool(target(args, ctx)?.has_field(field)))
}

fn decorated(args: &FunctionArgs, name: &str) -> Result<String, FunctionError> {
    let prefix = args.optional_str("prefix")?.unwrap_or_default();
    let suffix = args.optional_str("suffix")?.unwrap_or_default();
    Ok(format!("{prefix}{name}{suffix}"))
}

fn set_field(args: &FunctionArgs, ctx: &mut EvaluationContext<'_>) -> Result<Value, FunctionError> {
    let name = decorated(args, args.required_str("field")?)?;
    if let Some(value) = args.get("value") {
        target(args, ctx)?.add_field(name, value.clone());
    }
    Ok(Value::Null)
}

fn set_fields(args: &FunctionArgs, ctx: &mut EvaluationContext<'_>) -> Result<Value, FunctionError> {
    let mut fields = Vec::new();
    for (name, value) in args.required_map("fields")? {
        fields.push((decorated(args, name)?, value.clone()));
    }
    target(args, ctx)?.add_fields(fields);
    Ok(Value::Null)
}

fn rename_field(args: &FunctionArgs, ctx: &mut EvaluationContext<'_>) -> Result<Value, FunctionError> {
    let old = args.required_str("old_field")?;
    let new = args.required_str("new_field")?;
    target(args, ctx)?.rename_field(old, new);
    Ok(Value::Null)
}

fn remove_field(args: &FunctionArgs, ctx: &mut EvaluationContext<'_>) -> Result<Value, FunctionError> {
    let field = args.required_str("field")?;
    target(args, ctx)?.remove_field(field);
    Ok(Value::Null)
}

fn drop_message(args: &FunctionArgs, ctx: &mut EvaluationContext<'_>) -> Result<Value, FunctionError> {
    target(args, ctx)?.set_filter_out(true);
    Ok(Value::Null)
}

fn create_message(args: &FunctionArgs, ctx: &mut EvaluationContext<'_>) -> Result<Value, FunctionError> {
    let body = args.optional_str("message")?.unwrap_or_default();
    let source = args.optional_str("source")?.unwrap_or_default();
    let timestamp = args
        .get("timestamp")
        .and_then(Value::as_date)
        .unwrap_or_else(Utc::now);
    let handle = ctx.add_created_message(Message::new(body, source, timestamp));
    Ok(Value::Message(handle))
}

fn clone_message(args: &FunctionArgs, ctx: &mut EvaluationContext<'_>) -> Result<Value, FunctionError> {
    let clone = target(args, ctx)?.duplicate();
    let handle = ctx.add_created_message(clone);
    Ok(Value::Message(handle))
}

fn route_to_stream(args: &FunctionArgs, ctx: &mut EvaluationContext<'_>) -> Result<Value, FunctionError> {
    let id = args.required_str("id")?;
    if id.trim().is_empty() {
        return Err(FunctionError::invalid("id", "stream id must not be empty"));
    }
    let remove_from_default = args.optional_bool("remove_from_default")?.unwrap_or(false);
    let message = target(args, ctx)?;
    message.add_stream(id);
    if remove_from_default && id != DEFAULT_STREAM_ID {
        message.remove_stream(DEFAULT_STREAM_ID);
    }
    Ok(Value::Null)
}

fn remove_from_stream(args: &FunctionArgs, ctx: &mut EvaluationContext<'_>) -> Result<Value, FunctionError> {
    let id = args.required_str("id")?;
    let message = target(args, ctx)?;
    message.remove_stream(id);
    if message.streams().is_empty() {
        message.add_stream(DEFAULT_STREAM_ID);
    }
    Ok(Value::Null)
}

fn get_metadata(args: &FunctionArgs, ctx: &mut EvaluationContext<'_>) -> Result<Value, FunctionError> {
    let key = args.required_str("key")?;
    Ok(target(args, ctx)?
        .metadata(key)
        .cloned()
        .unwrap_or(Value::Null))
}

fn set_metadata(args: &FunctionArgs, ctx: &mut EvaluationContext<'_>) -> Result<Value, FunctionError> {
    let key = args.required_str("key")?;
    let value = args.get("value").cloned().unwrap_or(Value::Null);
    target(args, ctx)?.set_metadata(key, value);
    Ok(Value::Null)
}

fn remove_metadata(args: &FunctionArgs, ctx: &mut EvaluationContext<'_>) -> Result<Value, FunctionError> {
    let key = args.required_str("key")?;
    target(args, ctx)?.remove_metadata(key);
    Ok(Value::Null)
}
