use serde::{Deserialize, Serialize};

use crate::catalog::nullable;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnlockMode {
    /// Every requirement must hold.
    All,
    /// At least one requirement must hold. Anything but `all`, including a
    /// missing or null `type`, reads as `any`.
    #[default]
    #[serde(other)]
    Any,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Requirement {
    pub level_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_perfect: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_skip: Option<bool>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UnlockConditions {
    #[serde(rename = "type", default, deserialize_with = "nullable::or_default")]
    pub mode: UnlockMode,
    #[serde(default, deserialize_with = "nullable::or_default")]
    pub requirements: Vec<Requirement>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Level {
    pub id: String,
    #[serde(default, deserialize_with = "nullable::or_default")]
    pub title: String,
    #[serde(default, deserialize_with = "nullable::or_default")]
    pub icon: String,
    #[serde(default, deserialize_with = "nullable::or_default")]
    pub description: String,
    #[serde(default, deserialize_with = "nullable::or_default")]
    pub order: i64,
    #[serde(default, deserialize_with = "nullable::or_default")]
    pub hidden: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unlock_conditions: Option<UnlockConditions>,
}

impl Level {
    /// Level ids this level's unlock conditions refer to.
    pub fn prerequisites(&self) -> impl Iterator<Item = &str> {
        self.unlock_conditions
            .iter()
            .flat_map(|c| c.requirements.iter())
            .map(|r| r.level_id.as_str())
    }
}

/// Sort levels by their `order` field, keeping catalog order for ties.
pub fn sorted_by_order(levels: &[Level]) -> Vec<&Level> {
    let mut sorted: Vec<&Level> = levels.iter().collect();
    sorted.sort_by_key(|l| l.order);
    sorted
}
