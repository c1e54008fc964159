use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One discrete editor action extracted from streamed model output.
///
/// The enum is closed: a value whose `type` tag is not one of the known action
/// kinds fails deserialization. The extractor relies on that — a failing parse
/// means "this array element has not finished streaming yet", never an error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeEvent {
    CreateShape {
        shape_id: String,
        shape: Value,
    },
    UpdateShape {
        shape_id: String,
        shape: Value,
    },
    DeleteShape {
        shape_id: String,
    },
    /// Model narration that is not applied to the canvas.
    Think {
        text: String,
    },
    /// A message the consumer may surface to the user verbatim.
    Message {
        text: String,
    },
}

impl ChangeEvent {
    /// The wire tag for this action kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::CreateShape { .. } => "create_shape",
            Self::UpdateShape { .. } => "update_shape",
            Self::DeleteShape { .. } => "delete_shape",
            Self::Think { .. } => "think",
            Self::Message { .. } => "message",
        }
    }

    /// The shape this action targets, if it targets one.
    #[must_use]
    pub fn shape_id(&self) -> Option<&str> {
        match self {
            Self::CreateShape { shape_id, .. }
            | Self::UpdateShape { shape_id, .. }
            | Self::DeleteShape { shape_id } => Some(shape_id),
            Self::Think { .. } | Self::Message { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn known_tag_round_trips() {
        let event = ChangeEvent::CreateShape {
            shape_id: "shape:1".to_string(),
            shape: json!({"kind": "rectangle", "x": 0, "y": 0}),
        };
        let text = serde_json::to_string(&event).unwrap();
        let back: ChangeEvent = serde_json::from_str(&text).unwrap();
        assert_eq!(back, event);
        assert_eq!(back.kind(), "create_shape");
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let value = json!({"type": "rotate_shape", "shape_id": "shape:1"});
        assert!(serde_json::from_value::<ChangeEvent>(value).is_err());
    }

    #[test]
    fn missing_field_is_rejected() {
        let value = json!({"type": "delete_shape"});
        assert!(serde_json::from_value::<ChangeEvent>(value).is_err());
    }
}
