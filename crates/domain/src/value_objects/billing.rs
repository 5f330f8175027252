use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::enums::entitlement_statuses::EntitlementStatus;

/// A full subscription snapshot as handed over by the billing integration.
/// Which of the optional fields are populated depends on *how* the
/// subscription changed on the provider side.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BillingSnapshot {
    pub customer_ref: String,
    pub subscription_ref: String,
    pub plan_ref: String,
    pub status: EntitlementStatus,
    pub start_date: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub cancel_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
}

/// Already-deserialized billing events. Invoice events carry only the
/// references; the reconciler re-fetches the subscription through the
/// injected gateway before merging.
#[derive(Debug, Clone)]
pub enum BillingEvent {
    InvoicePaid {
        customer_ref: String,
        subscription_ref: String,
    },
    InvoiceFailed {
        customer_ref: String,
        subscription_ref: String,
    },
    SubscriptionCanceled(BillingSnapshot),
    SubscriptionUpdated(BillingSnapshot),
}

impl BillingEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            BillingEvent::InvoicePaid { .. } => "invoice_paid",
            BillingEvent::InvoiceFailed { .. } => "invoice_failed",
            BillingEvent::SubscriptionCanceled(_) => "subscription_canceled",
            BillingEvent::SubscriptionUpdated(_) => "subscription_updated",
        }
    }

    pub fn customer_ref(&self) -> &str {
        match self {
            BillingEvent::InvoicePaid { customer_ref, .. }
            | BillingEvent::InvoiceFailed { customer_ref, .. } => customer_ref,
            BillingEvent::SubscriptionCanceled(snapshot)
            | BillingEvent::SubscriptionUpdated(snapshot) => &snapshot.customer_ref,
        }
    }

    pub fn subscription_ref(&self) -> &str {
        match self {
            BillingEvent::InvoicePaid {
                subscription_ref, ..
            }
            | BillingEvent::InvoiceFailed {
                subscription_ref, ..
            } => subscription_ref,
            BillingEvent::SubscriptionCanceled(snapshot)
            | BillingEvent::SubscriptionUpdated(snapshot) => &snapshot.subscription_ref,
        }
    }
}
