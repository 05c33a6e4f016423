use crate::ids::GroupId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A set of users sharing a catalog. Balances are scoped per group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    /// Code other users present to join.
    pub invite_code: String,
    pub created_at: DateTime<Utc>,
}
