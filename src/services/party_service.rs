use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    dao::models::{CommitOutcome, PartyEntity},
    error::ServiceError,
    services::{transaction::run_party_transaction, vote_service::load_member_party},
    state::{
        SharedState,
        party::{Member, Party, generate_join_code, normalize_join_code},
    },
};

/// Fresh codes drawn before giving up on finding an unused one.
const MAX_JOIN_CODE_ATTEMPTS: u32 = 8;

/// Start a party whose sole member is `creator`.
pub async fn create_party(
    state: &SharedState,
    creator: &Member,
    name: &str,
) -> Result<Party, ServiceError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ServiceError::InvalidInput("party name must not be blank".into()));
    }
    let store = state.require_vote_store().await?;

    for attempt in 1..=MAX_JOIN_CODE_ATTEMPTS {
        let join_code = generate_join_code(&mut rand::rng());
        let party = Party::new(name.to_owned(), creator, join_code, state.now_system());

        match store.insert_party(PartyEntity::from(party.clone())).await? {
            CommitOutcome::Committed(_) => {
                info!(party_id = %party.id, created_by = %creator.id, "party created");
                return Ok(party);
            }
            CommitOutcome::Conflict => {
                debug!(attempt, "join code already taken; drawing another");
            }
        }
    }

    Err(ServiceError::Contention("join code generation".into()))
}

/// Join the party behind `join_code`. Joining twice only refreshes the member's profile.
pub async fn join_party(
    state: &SharedState,
    member: &Member,
    join_code: &str,
) -> Result<Party, ServiceError> {
    let join_code = normalize_join_code(join_code)?;
    let store = state.require_vote_store().await?;

    let party = store
        .find_party_by_join_code(join_code.clone())
        .await?
        .map(|stored| Party::from(stored.value))
        .ok_or_else(|| ServiceError::NotFound(format!("no party uses join code `{join_code}`")))?;

    let unchanged = party.is_member(&member.id)
        && party.member_names.get(&member.id) == Some(&member.name)
        && party.member_photos.get(&member.id) == Some(&member.photo);
    if unchanged {
        return Ok(party);
    }

    let attempts = state.config().voting().max_transaction_attempts;
    let (party, ()) = run_party_transaction(store.as_ref(), party.id, attempts, |party| {
        party.add_member(member);
        Ok(())
    })
    .await?;

    info!(party_id = %party.id, member_id = %member.id, "member joined party");
    Ok(party)
}

/// Remove `target_id` from the party. Only the creator may do this and never to themself.
pub async fn remove_member(
    state: &SharedState,
    party_id: Uuid,
    requester_id: &str,
    target_id: &str,
) -> Result<Party, ServiceError> {
    let store = state.require_vote_store().await?;
    let attempts = state.config().voting().max_transaction_attempts;

    let (party, ()) = run_party_transaction(store.as_ref(), party_id, attempts, |party| {
        if party.created_by != requester_id {
            return Err(ServiceError::Unauthorized(
                "only the party creator can remove members".into(),
            ));
        }
        if target_id == party.created_by {
            return Err(ServiceError::InvalidState(
                "the party creator cannot be removed".into(),
            ));
        }
        if !party.remove_member(target_id) {
            return Err(ServiceError::NotFound(format!(
                "`{target_id}` is not a member of party `{party_id}`"
            )));
        }
        Ok(())
    })
    .await?;

    info!(%party_id, member_id = target_id, "member removed from party");
    Ok(party)
}

/// A party, for its members only.
pub async fn get_party(
    state: &SharedState,
    party_id: Uuid,
    member_id: &str,
) -> Result<Party, ServiceError> {
    let store = state.require_vote_store().await?;
    load_member_party(store.as_ref(), party_id, member_id).await
}

/// Every party the member belongs to, oldest first.
pub async fn list_parties(state: &SharedState, member_id: &str) -> Result<Vec<Party>, ServiceError> {
    let store = state.require_vote_store().await?;
    let parties = store.list_parties_for_member(member_id.to_owned()).await?;
    Ok(parties.into_iter().map(Party::from).collect())
}
