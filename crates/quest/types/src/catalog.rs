use crate::ids::{GroupId, ShopItemId, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// How completing a task converts into currency.
///
/// Each case carries its own computation rule, see [`CompletionPolicy::award`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CompletionPolicy {
    /// Done / not done. Always awards the reward value once.
    Boolean,
    /// Counted units, awarding `reward_value` per unit.
    Integer {
        /// Quantity pre-filled by presentation layers.
        default_quantity: i64,
    },
}

/// Currency and recorded quantity produced by one completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Award {
    pub amount: i64,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AwardError {
    #[error("quantity must be provided for integer tasks")]
    MissingQuantity,

    #[error("quantity must be positive, got {0}")]
    NonPositiveQuantity(i64),

    #[error("reward {reward_value} x quantity {quantity} overflows")]
    Overflow { reward_value: i64, quantity: i64 },
}

impl CompletionPolicy {
    pub fn kind(&self) -> PolicyKind {
        match self {
            Self::Boolean => PolicyKind::Boolean,
            Self::Integer { .. } => PolicyKind::Integer,
        }
    }

    pub fn default_quantity(&self) -> Option<i64> {
        match self {
            Self::Boolean => None,
            Self::Integer { default_quantity } => Some(*default_quantity),
        }
    }

    /// Compute the award for one completion.
    ///
    /// Boolean ignores `quantity` and records 1. Integer requires a positive
    /// quantity and multiplies.
    pub fn award(&self, reward_value: i64, quantity: Option<i64>) -> Result<Award, AwardError> {
        match self {
            Self::Boolean => Ok(Award {
                amount: reward_value,
                quantity: 1,
            }),
            Self::Integer { .. } => {
                let quantity = quantity.ok_or(AwardError::MissingQuantity)?;
                if quantity <= 0 {
                    return Err(AwardError::NonPositiveQuantity(quantity));
                }
                let amount = reward_value
                    .checked_mul(quantity)
                    .ok_or(AwardError::Overflow {
                        reward_value,
                        quantity,
                    })?;
                Ok(Award { amount, quantity })
            }
        }
    }
}

/// Tag of a [`CompletionPolicy`], as it appears in forms and storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    Boolean,
    Integer,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid task type '{0}': must be 'boolean' or 'integer'")]
pub struct UnknownPolicyKind(pub String);

impl PolicyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Integer => "integer",
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyKind {
    type Err = UnknownPolicyKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "boolean" => Ok(Self::Boolean),
            "integer" => Ok(Self::Integer),
            _ => Err(UnknownPolicyKind(s.to_string())),
        }
    }
}

/// A reward-earning catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub group_id: GroupId,
    pub title: String,
    pub description: String,
    pub policy: CompletionPolicy,
    /// Currency per completion, or per unit for integer tasks.
    pub reward_value: i64,
    /// Consumed (deleted) after the first completion.
    pub is_one_time: bool,
    pub due_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn from_fields(
        id: TaskId,
        group_id: GroupId,
        fields: TaskFields,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            group_id,
            title: fields.title,
            description: fields.description,
            policy: fields.policy,
            reward_value: fields.reward_value,
            is_one_time: fields.is_one_time,
            due_at: fields.due_at,
            created_at,
        }
    }
}

/// Unvalidated task input as submitted by a presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub kind: PolicyKind,
    pub reward_value: i64,
    /// Non-positive or missing values fall back to the configured default.
    #[serde(default)]
    pub default_quantity: Option<i64>,
    #[serde(default)]
    pub is_one_time: bool,
    #[serde(default)]
    pub due_at: Option<DateTime<Utc>>,
}

impl TaskDraft {
    pub fn boolean(title: impl Into<String>, reward_value: i64) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            kind: PolicyKind::Boolean,
            reward_value,
            default_quantity: None,
            is_one_time: false,
            due_at: None,
        }
    }

    pub fn integer(title: impl Into<String>, reward_value: i64) -> Self {
        Self {
            kind: PolicyKind::Integer,
            ..Self::boolean(title, reward_value)
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn one_time(mut self) -> Self {
        self.is_one_time = true;
        self
    }
}

/// Validated task attributes, ready to persist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFields {
    pub title: String,
    pub description: String,
    pub policy: CompletionPolicy,
    pub reward_value: i64,
    pub is_one_time: bool,
    pub due_at: Option<DateTime<Utc>>,
}

/// A reward-spending catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopItem {
    pub id: ShopItemId,
    pub group_id: GroupId,
    pub title: String,
    pub description: String,
    pub cost: i64,
    pub is_one_time: bool,
    pub created_at: DateTime<Utc>,
}

impl ShopItem {
    pub fn from_fields(
        id: ShopItemId,
        group_id: GroupId,
        fields: ShopItemFields,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            group_id,
            title: fields.title,
            description: fields.description,
            cost: fields.cost,
            is_one_time: fields.is_one_time,
            created_at,
        }
    }
}

/// Unvalidated shop item input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopItemDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub cost: i64,
    #[serde(default)]
    pub is_one_time: bool,
}

impl ShopItemDraft {
    pub fn new(title: impl Into<String>, cost: i64) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            cost,
            is_one_time: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn one_time(mut self) -> Self {
        self.is_one_time = true;
        self
    }
}

/// Validated shop item attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopItemFields {
    pub title: String,
    pub description: String,
    pub cost: i64,
    pub is_one_time: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boolean_award_ignores_quantity() {
        let award = CompletionPolicy::Boolean.award(10, Some(99)).unwrap();
        assert_eq!(award, Award { amount: 10, quantity: 1 });
        let award = CompletionPolicy::Boolean.award(10, None).unwrap();
        assert_eq!(award.quantity, 1);
    }

    #[test]
    fn integer_award_multiplies() {
        let policy = CompletionPolicy::Integer { default_quantity: 10 };
        let award = policy.award(2, Some(5)).unwrap();
        assert_eq!(award, Award { amount: 10, quantity: 5 });
    }

    #[test]
    fn integer_award_rejects_missing_or_non_positive_quantity() {
        let policy = CompletionPolicy::Integer { default_quantity: 10 };
        assert_eq!(policy.award(2, None), Err(AwardError::MissingQuantity));
        assert_eq!(policy.award(2, Some(0)), Err(AwardError::NonPositiveQuantity(0)));
        assert_eq!(policy.award(2, Some(-3)), Err(AwardError::NonPositiveQuantity(-3)));
        assert!(matches!(
            policy.award(i64::MAX, Some(2)),
            Err(AwardError::Overflow { .. })
        ));
    }

    #[test]
    fn policy_kind_parses_known_tags_only() {
        assert_eq!("boolean".parse::<PolicyKind>().unwrap(), PolicyKind::Boolean);
        assert_eq!(" Integer ".parse::<PolicyKind>().unwrap(), PolicyKind::Integer);
        let err = "percent".parse::<PolicyKind>().unwrap_err();
        assert_eq!(err, UnknownPolicyKind("percent".to_string()));
    }

    #[test]
    fn policy_serializes_as_tagged_variant() {
        let json = serde_json::to_value(CompletionPolicy::Integer { default_quantity: 4 }).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "integer", "default_quantity": 4}));
    }
}
