use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::value_objects::enums::subscriber_roles::SubscriberRole;
use crate::value_objects::subscribers::SubscriberModel;

/// Coarse entitlement shape a scan can pre-filter on. The store check
/// ignores expiry; callers re-apply the grace clock on each page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntitlementKind {
    Recall,
    Vehicle,
}

/// Store-side predicates for a population scan.
#[derive(Debug, Clone, Default)]
pub struct PopulationFilter {
    /// Restrict to these roles; empty means any role.
    pub roles: Vec<SubscriberRole>,

    /// Only subscribers with a confirmed email on file.
    pub confirmed_email_only: bool,

    /// Only subscribers holding at least one entitlement of this shape.
    pub entitled: Option<EntitlementKind>,
}

/// Multi-reader, lock-free access to the subscriber population. Reads are
/// keyset-paged so targeting never materializes the full aggregate graph;
/// a scan is "best effort as of scan start" with respect to concurrent
/// reconciliations.
#[async_trait]
#[automock]
pub trait PopulationStore {
    /// One page ordered by subscriber id, strictly after `after`.
    async fn scan_page(
        &self,
        filter: &PopulationFilter,
        after: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<SubscriberModel>>;
}
