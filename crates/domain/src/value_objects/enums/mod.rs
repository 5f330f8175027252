pub mod dispatch_reasons;
pub mod entitlement_statuses;
pub mod subscriber_roles;
