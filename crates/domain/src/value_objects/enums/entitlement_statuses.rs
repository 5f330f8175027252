use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Billing lifecycle states as reported by the provider. The set is fixed;
/// unknown provider strings collapse to `Canceled` rather than inventing a
/// live entitlement.
#[derive(Default, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntitlementStatus {
    #[default]
    Incomplete,
    Trialing,
    Active,
    PastDue,
    Canceled,
    Unpaid,
    IncompleteExpired,
}

impl Display for EntitlementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = match self {
            EntitlementStatus::Incomplete => "incomplete",
            EntitlementStatus::Trialing => "trialing",
            EntitlementStatus::Active => "active",
            EntitlementStatus::PastDue => "past_due",
            EntitlementStatus::Canceled => "canceled",
            EntitlementStatus::Unpaid => "unpaid",
            EntitlementStatus::IncompleteExpired => "incomplete_expired",
        };
        write!(f, "{}", status)
    }
}

impl EntitlementStatus {
    pub fn from_str(value: &str) -> Self {
        match value {
            "incomplete" => EntitlementStatus::Incomplete,
            "trialing" => EntitlementStatus::Trialing,
            "active" => EntitlementStatus::Active,
            "past_due" => EntitlementStatus::PastDue,
            "canceled" => EntitlementStatus::Canceled,
            "unpaid" => EntitlementStatus::Unpaid,
            "incomplete_expired" => EntitlementStatus::IncompleteExpired,
            _ => EntitlementStatus::Canceled,
        }
    }

    /// Statuses under which the provider still considers the subscription
    /// billable or recoverable.
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            EntitlementStatus::Trialing | EntitlementStatus::Active | EntitlementStatus::PastDue
        )
    }

    /// Statuses a subscription can only carry when it never reached a paid
    /// period at all.
    pub fn never_became_active(&self) -> bool {
        matches!(
            self,
            EntitlementStatus::Incomplete | EntitlementStatus::IncompleteExpired
        )
    }
}
