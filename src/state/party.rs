use std::{collections::HashMap, time::SystemTime};

use rand::Rng;
use thiserror::Error;
use uuid::Uuid;

use crate::state::catalog::MemberId;

/// Number of characters in a join code.
pub const JOIN_CODE_LENGTH: usize = 6;
/// Characters join codes are drawn from; look-alikes (`0`/`O`, `1`/`I`) are left out.
const JOIN_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Who is calling, as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub id: MemberId,
    pub name: String,
    pub photo: Option<String>,
}

/// A group of members voting together.
#[derive(Debug, Clone, PartialEq)]
pub struct Party {
    pub id: Uuid,
    pub name: String,
    pub created_by: MemberId,
    pub join_code: String,
    /// Members in order of joining; the creator comes first.
    pub members: Vec<MemberId>,
    pub member_names: HashMap<MemberId, String>,
    pub member_photos: HashMap<MemberId, Option<String>>,
    pub created_at: SystemTime,
}

impl Party {
    /// A fresh party whose only member is its creator.
    pub fn new(name: String, creator: &Member, join_code: String, now: SystemTime) -> Self {
        let mut party = Self {
            id: Uuid::new_v4(),
            name,
            created_by: creator.id.clone(),
            join_code,
            members: Vec::new(),
            member_names: HashMap::new(),
            member_photos: HashMap::new(),
            created_at: now,
        };
        party.add_member(creator);
        party
    }

    pub fn is_member(&self, member_id: &str) -> bool {
        self.members.iter().any(|member| member == member_id)
    }

    /// Add a member, refreshing the display name and photo when already present.
    pub fn add_member(&mut self, member: &Member) {
        if !self.is_member(&member.id) {
            self.members.push(member.id.clone());
        }
        self.member_names
            .insert(member.id.clone(), member.name.clone());
        self.member_photos
            .insert(member.id.clone(), member.photo.clone());
    }

    /// Drop a member and their profile details. Returns whether anything was removed.
    pub fn remove_member(&mut self, member_id: &str) -> bool {
        let before = self.members.len();
        self.members.retain(|member| member != member_id);
        self.member_names.remove(member_id);
        self.member_photos.remove(member_id);
        self.members.len() != before
    }
}

/// Raised for join codes that cannot possibly match a party.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinCodeError {
    #[error("join code must be exactly {JOIN_CODE_LENGTH} characters (got {0})")]
    Length(usize),
    #[error("join code may only contain letters and digits")]
    Charset,
}

/// Draw a random join code.
pub fn generate_join_code(rng: &mut impl Rng) -> String {
    (0..JOIN_CODE_LENGTH)
        .map(|_| char::from(JOIN_CODE_ALPHABET[rng.random_range(0..JOIN_CODE_ALPHABET.len())]))
        .collect()
}

/// Trim and upper-case user input, then check its shape.
pub fn normalize_join_code(raw: &str) -> Result<String, JoinCodeError> {
    let code = raw.trim().to_ascii_uppercase();
    let length = code.chars().count();
    if length != JOIN_CODE_LENGTH {
        return Err(JoinCodeError::Length(length));
    }
    if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(JoinCodeError::Charset);
    }
    Ok(code)
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn member(id: &str, name: &str) -> Member {
        Member {
            id: id.into(),
            name: name.into(),
            photo: None,
        }
    }

    #[test]
    fn creator_is_the_first_member() {
        let party = Party::new(
            "Mello-gänget".into(),
            &member("alice", "Alice"),
            "ABC123".into(),
            SystemTime::UNIX_EPOCH,
        );
        assert_eq!(party.members, vec!["alice".to_string()]);
        assert_eq!(party.created_by, "alice");
        assert_eq!(party.member_names["alice"], "Alice");
    }

    #[test]
    fn joining_twice_does_not_duplicate_members() {
        let mut party = Party::new(
            "Mello".into(),
            &member("alice", "Alice"),
            "ABC123".into(),
            SystemTime::UNIX_EPOCH,
        );
        party.add_member(&member("bob", "Bob"));
        party.add_member(&member("bob", "Bobby"));

        assert_eq!(party.members.len(), 2);
        assert_eq!(party.member_names["bob"], "Bobby");
    }

    #[test]
    fn removing_a_member_clears_their_profile() {
        let mut party = Party::new(
            "Mello".into(),
            &member("alice", "Alice"),
            "ABC123".into(),
            SystemTime::UNIX_EPOCH,
        );
        party.add_member(&member("bob", "Bob"));

        assert!(party.remove_member("bob"));
        assert!(!party.remove_member("bob"));
        assert!(!party.member_names.contains_key("bob"));
        assert!(!party.member_photos.contains_key("bob"));
    }

    #[test]
    fn generated_codes_are_well_formed() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let code = generate_join_code(&mut rng);
            assert_eq!(normalize_join_code(&code), Ok(code.clone()));
        }
    }

    #[test]
    fn join_codes_are_normalized() {
        assert_eq!(normalize_join_code("  abc123 "), Ok("ABC123".into()));
        assert_eq!(normalize_join_code("ABC12"), Err(JoinCodeError::Length(5)));
        assert_eq!(normalize_join_code("ABC-12"), Err(JoinCodeError::Charset));
    }
}
