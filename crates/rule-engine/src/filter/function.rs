//! `remove_from_stream_destination(stream_id, destination_type)`

use pipewright_core::metrics as names;
use pipewright_core::value::Value;

use crate::functions::{Builtin, FunctionArgs, FunctionDescriptor, FunctionError, ParameterDescriptor};
use crate::interpreter::EvaluationContext;
use crate::types::ValueType;

use super::DESTINATIONS_METADATA_KEY;

pub(crate) fn builtin() -> Builtin {
    Builtin::new(
        FunctionDescriptor::new("remove_from_stream_destination", ValueType::Void)
            .param(ParameterDescriptor::required("stream_id", ValueType::String))
            .param(ParameterDescriptor::required("destination_type", ValueType::String))
            .description("Removes the stream from the message's destinations of the given type"),
        remove_from_stream_destination,
    )
}

fn remove_from_stream_destination(
    args: &FunctionArgs,
    ctx: &mut EvaluationContext<'_>,
) -> Result<Value, FunctionError> {
    let stream_id = args.required_str("stream_id")?;
    let destination_type = args.required_str("destination_type")?;

    let message = ctx.message_mut();
    let Some(Value::Map(mut destinations)) = message.remove_metadata(DESTINATIONS_METADATA_KEY) else {
        return Err(FunctionError::Failed(
            "message carries no destination metadata".to_owned(),
        ));
    };

    if let Some(Value::List(streams)) = destinations.get_mut(destination_type) {
        let before = streams.len();
        streams.retain(|s| s.as_str() != Some(stream_id));
        if streams.len() < before {
            metrics::counter!(names::OUTPUT_FILTER_DESTINATIONS_REMOVED_TOTAL).increment(1);
        }
    }
    message.set_metadata(DESTINATIONS_METADATA_KEY, Value::Map(destinations));
    Ok(Value::Null)
}
