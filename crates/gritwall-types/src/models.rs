use serde::{Deserialize, Serialize};

/// How a challenge decides its losers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChallengeType {
    LastToComplete,
    NotCompleted,
}

impl ChallengeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LastToComplete => "LAST_TO_COMPLETE",
            Self::NotCompleted => "NOT_COMPLETED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "LAST_TO_COMPLETE" => Some(Self::LastToComplete),
            "NOT_COMPLETED" => Some(Self::NotCompleted),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InviteType {
    Private,
    Public,
}

impl InviteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "PRIVATE",
            Self::Public => "PUBLIC",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PRIVATE" => Some(Self::Private),
            "PUBLIC" => Some(Self::Public),
            _ => None,
        }
    }
}

/// Purchasable powerups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PowerUp {
    Grief,
    Protec,
}

/// Items that can be thrown at shamed participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EffectType {
    Tomato,
    Egg,
    Poop,
}

/// A user's avatar — all three parts are chosen during profile setup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Avatar {
    pub animal: String,
    pub background: String,
    pub color: String,
}
