use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::dto::votes::BallotView;

#[derive(Debug, Deserialize, Serialize, ToSchema)]
/// Messages accepted from draft session WebSocket clients.
#[serde(tag = "type")]
pub enum DraftInboundMessage {
    /// Update the draft rating of an entry; committed after the debounce delay.
    #[serde(rename = "set_rating")]
    SetRating { entry_id: String, score: i64 },
    /// Set or clear the favorite right away.
    #[serde(rename = "set_favorite")]
    SetFavorite { favorite: Option<String> },
    /// Commit every pending draft now.
    #[serde(rename = "flush")]
    Flush,
    /// Retry the entries whose last commit failed.
    #[serde(rename = "retry")]
    Retry,
    #[serde(other)]
    Unknown,
}

impl DraftInboundMessage {
    pub fn from_json_str(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

/// Saving indicator of one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SavingStatusDto {
    Idle,
    Saving,
    Saved,
    Error,
}

#[derive(Debug, Serialize, ToSchema)]
/// Messages pushed to draft session WebSocket clients.
#[serde(tag = "type")]
pub enum DraftOutboundMessage {
    /// The stored ballot the session starts from.
    #[serde(rename = "ballot")]
    Ballot { ballot: BallotView },
    /// Saving indicator change of one entry.
    #[serde(rename = "saving_status")]
    SavingStatus {
        entry_id: String,
        status: SavingStatusDto,
        /// Draft score still waiting to be saved, kept on errors.
        #[serde(skip_serializing_if = "Option::is_none")]
        draft: Option<u8>,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// A request that could not be processed.
    #[serde(rename = "error")]
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_messages_are_tagged_by_type() {
        let message =
            DraftInboundMessage::from_json_str(r#"{"type":"set_rating","entry_id":"dt1-3","score":8}"#)
                .unwrap();
        assert!(matches!(
            message,
            DraftInboundMessage::SetRating { ref entry_id, score: 8 } if entry_id == "dt1-3"
        ));
        assert!(matches!(
            DraftInboundMessage::from_json_str(r#"{"type":"dance"}"#).unwrap(),
            DraftInboundMessage::Unknown
        ));
    }

    #[test]
    fn saving_status_serializes_flat() {
        let message = DraftOutboundMessage::SavingStatus {
            entry_id: "dt1-3".into(),
            status: SavingStatusDto::Saved,
            draft: None,
            message: None,
        };
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            serde_json::json!({"type": "saving_status", "entry_id": "dt1-3", "status": "saved"})
        );
    }
}
