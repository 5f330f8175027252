use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Default, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubscriberRole {
    #[default]
    Guest,
    Member,
    Worker,
    Admin,
}

impl Display for SubscriberRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let role = match self {
            SubscriberRole::Guest => "guest",
            SubscriberRole::Member => "member",
            SubscriberRole::Worker => "worker",
            SubscriberRole::Admin => "admin",
        };
        write!(f, "{}", role)
    }
}

impl SubscriberRole {
    pub fn from_str(value: &str) -> Self {
        match value {
            "guest" => SubscriberRole::Guest,
            "member" => SubscriberRole::Member,
            "worker" => SubscriberRole::Worker,
            "admin" => SubscriberRole::Admin,
            _ => SubscriberRole::Guest,
        }
    }

    /// Staff roles see every recall regardless of billing state.
    pub fn is_elevated(&self) -> bool {
        matches!(self, SubscriberRole::Worker | SubscriberRole::Admin)
    }
}
