use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::{format_system_time, validation::validate_join_code},
    state::party::Party,
};

/// Payload used to start a new party.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreatePartyRequest {
    #[validate(length(min = 1, max = 60))]
    pub name: String,
}

/// Payload used to join an existing party by its code.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct JoinPartyRequest {
    /// Six letters or digits; case-insensitive.
    #[validate(custom(function = "validate_join_code"))]
    pub join_code: String,
}

/// Public profile of a party member.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MemberSummary {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
    pub is_creator: bool,
}

/// Party details as returned to its members.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PartySummary {
    pub id: Uuid,
    pub name: String,
    pub join_code: String,
    pub created_by: String,
    /// Members in joining order.
    pub members: Vec<MemberSummary>,
    /// RFC 3339 timestamp.
    pub created_at: String,
}

impl From<Party> for PartySummary {
    fn from(party: Party) -> Self {
        let members = party
            .members
            .iter()
            .map(|id| MemberSummary {
                id: id.clone(),
                name: party.member_names.get(id).cloned().unwrap_or_default(),
                photo: party.member_photos.get(id).cloned().flatten(),
                is_creator: *id == party.created_by,
            })
            .collect();

        Self {
            id: party.id,
            name: party.name,
            join_code: party.join_code,
            created_by: party.created_by,
            members,
            created_at: format_system_time(party.created_at),
        }
    }
}
