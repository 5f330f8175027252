pub mod billing_reconciler;
pub mod exclusive_update;
pub mod plan_cache;
pub mod recall_fanout;
pub mod subscriptions;
pub mod targeting;
pub mod vehicle_slots;
