use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(
    Debug, Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(transparent)]
pub struct MemberId(pub i64);

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for MemberId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<i64>().map(MemberId)
    }
}

/// Unordered pair of members, stored in canonical (lo, hi) order so that
/// `{a, b}` and `{b, a}` hit the same room-uniqueness key.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct MemberPair(MemberId, MemberId);

impl MemberPair {
    pub fn new(a: MemberId, b: MemberId) -> Self {
        if a < b { Self(a, b) } else { Self(b, a) }
    }

    pub fn lo(&self) -> MemberId {
        self.0
    }

    pub fn hi(&self) -> MemberId {
        self.1
    }
}

/// Display name shown when a member row no longer resolves.
pub const WITHDRAWN_MEMBER: &str = "withdrawn member";

/// What the rest of the system is allowed to know about a member.
#[derive(Debug, Clone)]
pub struct MemberProfile {
    pub member_id: MemberId,
    pub nickname: String,
    pub email: Option<String>,
    pub avatar_file: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_pair_is_canonical() {
        let p1 = MemberPair::new(MemberId(7), MemberId(3));
        let p2 = MemberPair::new(MemberId(3), MemberId(7));
        assert_eq!(p1, p2);
        assert_eq!(p1.lo(), MemberId(3));
        assert_eq!(p1.hi(), MemberId(7));
    }
}
