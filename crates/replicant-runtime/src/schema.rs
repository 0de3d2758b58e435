//! JSON Schema export for the wire types.
//!
//! Transport implementers publish these so a simulator written in any
//! language can validate the instruction stream it receives and the
//! response frames it sends back.

use replicant_types::{Instruction, ReplicantError, ResponseFrame};
use schemars::schema_for;
use serde_json::{json, Value};

/// Schema of one outgoing [`Instruction`].
pub fn instruction_schema() -> Result<Value, ReplicantError> {
    serde_json::to_value(schema_for!(Instruction))
        .map_err(|e| ReplicantError::Serialization(e.to_string()))
}

/// Schema of one incoming [`ResponseFrame`].
pub fn response_frame_schema() -> Result<Value, ReplicantError> {
    serde_json::to_value(schema_for!(ResponseFrame))
        .map_err(|e| ReplicantError::Serialization(e.to_string()))
}

/// Both schemas keyed by direction.
pub fn wire_schema() -> Result<Value, ReplicantError> {
    Ok(json!({
        "instruction": instruction_schema()?,
        "response_frame": response_frame_schema()?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instruction_schema_lists_every_variant_tag() {
        let text = instruction_schema().unwrap().to_string();
        for tag in ["set_wheels", "set_hand_target", "pin_held_rotation", "send_output"] {
            assert!(text.contains(tag), "missing {tag}");
        }
        assert!(text.contains("$type"));
    }

    #[test]
    fn wire_schema_has_both_directions() {
        let schema = wire_schema().unwrap();
        assert!(schema["instruction"].is_object());
        assert!(schema["response_frame"].to_string().contains("framerate"));
    }
}
