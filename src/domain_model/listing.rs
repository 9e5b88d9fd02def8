use crate::domain_model::*;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(
    Debug, Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(transparent)]
pub struct ListingId(pub i64);

impl fmt::Display for ListingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The narrow slice of a listing the chat core is allowed to see.
#[derive(Debug, Clone)]
pub struct ListingCard {
    pub listing_id: ListingId,
    pub seller_id: MemberId,
    pub title: String,
    pub price: Option<i64>,
    pub thumb_file: Option<String>,
}
