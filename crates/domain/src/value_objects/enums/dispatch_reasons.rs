use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Why a subscriber id was handed to the notification pipeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DispatchReason {
    Alert,
    Summary,
}

impl Display for DispatchReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            DispatchReason::Alert => "alert",
            DispatchReason::Summary => "summary",
        };
        write!(f, "{}", reason)
    }
}

impl DispatchReason {
    pub fn from_str(value: &str) -> Self {
        match value {
            "alert" => DispatchReason::Alert,
            _ => DispatchReason::Summary,
        }
    }
}
