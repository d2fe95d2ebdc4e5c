use serde::{Deserialize, Serialize};

use crate::constants::UNKNOWN_PARTY_LABEL;

/// Display data from the identity subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub display_name: String,
    pub avatar_url: Option<String>,
}

/// Resolved counterpart identity. The counterpart of a thread may live in
/// the business namespace or the individual namespace; `Unknown` covers
/// profiles that resolve in neither (deleted accounts, data races).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Identity {
    Business(Profile),
    Individual(Profile),
    Unknown,
}

impl Identity {
    pub fn display_name(&self) -> &str {
        match self {
            Identity::Business(p) | Identity::Individual(p) => &p.display_name,
            Identity::Unknown => UNKNOWN_PARTY_LABEL,
        }
    }

    pub fn avatar_url(&self) -> Option<&str> {
        match self {
            Identity::Business(p) | Identity::Individual(p) => p.avatar_url.as_deref(),
            Identity::Unknown => None,
        }
    }
}
