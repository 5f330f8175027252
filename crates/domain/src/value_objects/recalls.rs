use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::recalls::RecallEntity;
use crate::value_objects::vehicles::VehicleKey;

/// A published recall or vehicle campaign, reduced to the attributes
/// targeting cares about. Validation and persistence of recall documents
/// happen upstream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecallModel {
    pub id: Uuid,
    pub title: Option<String>,
    pub audiences: Vec<String>,
    pub categories: Vec<String>,
    pub distributions: Vec<String>,
    pub risk_levels: Vec<String>,
    pub vehicle_keys: Vec<VehicleKey>,

    /// Restricted recalls are visible only to subscribers holding an active
    /// recall entitlement (elevated roles excepted).
    pub restricted: bool,

    pub published_at: DateTime<Utc>,
    pub dispatched_at: Option<DateTime<Utc>>,
}

impl RecallModel {
    pub fn is_vehicle_campaign(&self) -> bool {
        !self.vehicle_keys.is_empty()
    }
}

impl From<RecallEntity> for RecallModel {
    fn from(entity: RecallEntity) -> Self {
        Self {
            id: entity.id,
            title: entity.title,
            audiences: entity.audiences,
            categories: entity.categories,
            distributions: entity.distributions,
            risk_levels: entity.risk_levels,
            // Keys were normalized when the slots were written; drop any that
            // no longer parse instead of poisoning the whole recall.
            vehicle_keys: entity
                .vehicle_keys
                .iter()
                .filter_map(|raw| VehicleKey::parse(raw).ok())
                .collect(),
            restricted: entity.restricted,
            published_at: entity.published_at,
            dispatched_at: entity.dispatched_at,
        }
    }
}

/// Delivery channel a targeting pass can additionally require.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertChannel {
    Email,
    Phone,
}

/// Inputs refining a targeting pass beyond the recall's own attributes.
#[derive(Debug, Clone)]
pub struct TargetingOptions {
    /// Instant at which entitlement activity is evaluated.
    pub as_of: DateTime<Utc>,

    /// Include `worker`/`admin` subscribers, who bypass the entitlement
    /// check on restricted recalls.
    pub include_elevated: bool,

    /// When set, require the matching channel flag plus a confirmed contact
    /// for that channel.
    pub channel: Option<AlertChannel>,

    /// Restrict to subscribers who opted into periodic summaries.
    pub summary_only: bool,

    /// Hard stop for the scan; exceeded deadlines abort the invocation.
    pub deadline: Option<DateTime<Utc>>,
}

impl TargetingOptions {
    pub fn at(as_of: DateTime<Utc>) -> Self {
        Self {
            as_of,
            include_elevated: true,
            channel: None,
            summary_only: false,
            deadline: None,
        }
    }

    pub fn with_channel(mut self, channel: AlertChannel) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn summaries_only(mut self) -> Self {
        self.summary_only = true;
        self
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }
}
