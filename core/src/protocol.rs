use serde::{Deserialize, Serialize};

use crate::image_id::ImageId;
use crate::model::Frequency;

/// Messages exchanged between the background context, extension pages and
/// content scripts. On the wire each is a JSON object `{ "type": ..., ... }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ExtensionMsg {
    PieceCollected {
        image_id: ImageId,
        piece: u32,
        collected: Vec<u32>,
    },
    ToggleEnabled {
        enabled: bool,
    },
    ImageAdded {
        image_id: ImageId,
    },
    ImageRemoved {
        image_id: ImageId,
    },
    FrequencyChanged {
        image_id: ImageId,
        frequency: Frequency,
    },
    PuzzleStateUpdated {
        image_id: ImageId,
    },
    PuzzleCompleted {
        image_id: ImageId,
    },
}

impl ExtensionMsg {
    pub fn kind(&self) -> &'static str {
        match self {
            ExtensionMsg::PieceCollected { .. } => "pieceCollected",
            ExtensionMsg::ToggleEnabled { .. } => "toggleEnabled",
            ExtensionMsg::ImageAdded { .. } => "imageAdded",
            ExtensionMsg::ImageRemoved { .. } => "imageRemoved",
            ExtensionMsg::FrequencyChanged { .. } => "frequencyChanged",
            ExtensionMsg::PuzzleStateUpdated { .. } => "puzzleStateUpdated",
            ExtensionMsg::PuzzleCompleted { .. } => "puzzleCompleted",
        }
    }

    pub fn image_id(&self) -> Option<&ImageId> {
        match self {
            ExtensionMsg::ToggleEnabled { .. } => None,
            ExtensionMsg::PieceCollected { image_id, .. }
            | ExtensionMsg::ImageAdded { image_id }
            | ExtensionMsg::ImageRemoved { image_id }
            | ExtensionMsg::FrequencyChanged { image_id, .. }
            | ExtensionMsg::PuzzleStateUpdated { image_id }
            | ExtensionMsg::PuzzleCompleted { image_id } => Some(image_id),
        }
    }

    pub fn to_json(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }

    pub fn from_json(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }
}
