//! 해시와 인코딩 함수

use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use pipewright_core::value::Value;
use sha2::{Digest, Sha256, Sha512};

use super::{Builtin, FunctionArgs, FunctionDescriptor, FunctionError, ParameterDescriptor};
use crate::interpreter::EvaluationContext;
use crate::types::ValueType;

fn string_fn(name: &str, description: &str) -> FunctionDescriptor {
    FunctionDescriptor::new(name, ValueType::String)
        .param(ParameterDescriptor::required("value", ValueType::String))
        .description(description)
}

pub(crate) fn builtins() -> Vec<Builtin> {
    vec![
        Builtin::new(string_fn("sha256", "Lower-case hex SHA-256 digest"), |args, _| {
            Ok(Value::String(hex::encode(Sha256::digest(args.required_str("value")?))))
        }),
        Builtin::new(string_fn("sha512", "Lower-case hex SHA-512 digest"), |args, _| {
            Ok(Value::String(hex::encode(Sha512::digest(args.required_str("value")?))))
        }),
        Builtin::new(
            string_fn("base64_encode", "Standard base64 encoding of the UTF-8 bytes").param(
                ParameterDescriptor::optional("omit_padding", ValueType::Bool).default_value(false),
            ),
            base64_encode,
        ),
        Builtin::new(string_fn("base64_decode", "Decodes standard base64 into a UTF-8 string"), base64_decode),
        Builtin::new(string_fn("base16_encode", "Lower-case hex encoding"), |args, _| {
            Ok(Value::String(hex::encode(args.required_str("value")?)))
        }),
        Builtin::new(string_fn("base16_decode", "Decodes hex into a UTF-8 string"), base16_decode),
    ]
}

fn base64_encode(args: &FunctionArgs, _ctx: &mut EvaluationContext<'_>) -> Result<Value, FunctionError> {
    let value = args.required_str("value")?;
    let encoded = if args.optional_bool("omit_padding")?.unwrap_or(false) {
        STANDARD_NO_PAD.encode(value)
    } else {
        STANDARD.encode(value)
    };
    Ok(Value::String(encoded))
}

fn utf8(bytes: Vec<u8>) -> Result<Value, FunctionError> {
    String::from_utf8(bytes)
        .map(Value::String)
        .map_err(|_| FunctionError::invalid("value", "decoded bytes are not valid UTF-8"))
}

fn base64_decode(args: &FunctionArgs, _ctx: &mut EvaluationContext<'_>) -> Result<Value, FunctionError> {
    let value = args.required_str("value")?.trim();
    let bytes = STANDARD
        .decode(value)
        .or_else(|_| STANDARD_NO_PAD.decode(value))
        .map_err(|e| FunctionError::invalid("value", e.to_string()))?;
    utf8(bytes)
}

fn base16_decode(args: &FunctionArgs, _ctx: &mut EvaluationContext<'_>) -> Result<Value, FunctionError> {
    let bytes = hex::decode(args.required_str("value")?.trim())
        .map_err(|e| FunctionError::invalid("value", e.to_string()))?;
    utf8(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::Function;
    use pipewright_core::message::Message;

    fn call(name: &str, args: Vec<(&str, Value)>) -> Result<Value, FunctionError> {
        let function = builtins()
            .into_iter()
            .find(|b| b.descriptor().name() == name)
            .unwrap();
        let mut message = Message::empty();
        let mut ctx = EvaluationContext::new(&mut message);
        let args = FunctionArgs::new(args.into_iter().map(|(k, v)| (k.to_owned(), v)).collect())
            .with_defaults(function.descriptor());
        function.evaluate(&args, &mut ctx)
    }

    #[test]
    fn sha256_of_known_input() {
        assert_eq!(
            call("sha256", vec![("value", "abc".into())]).unwrap(),
            Value::from("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
        let Value::String(digest) = call("sha512", vec![("value", "abc".into())]).unwrap() else {
            panic!("expected string")
        };
        assert_eq!(digest.len(), 128);
    }

    #[test]
    fn base64_padding_option() {
        assert_eq!(call("base64_encode", vec![("value", "ab".into())]).unwrap(), Value::from("YWI="));
        assert_eq!(
            call("base64_encode", vec![("value", "ab".into()), ("omit_padding", Value::Bool(true))])
                .unwrap(),
            Value::from("YWI")
        );
        assert_eq!(call("base64_decode", vec![("value", "YWI".into())]).unwrap(), Value::from("ab"));
        assert!(call("base64_decode", vec![("value", "***".into())]).is_err());
    }

    #[test]
    fn base16_roundtrip_and_bad_input() {
        assert_eq!(call("base16_encode", vec![("value", "hi".into())]).unwrap(), Value::from("6869"));
        assert_eq!(call("base16_decode", vec![("value", "6869".into())]).unwrap(), Value::from("hi"));
        assert!(call("base16_decode", vec![("value", "zz".into())]).is_err());
        assert!(call("base16_decode", vec![("value", "ff".into())]).is_err());
    }
}
