pub mod dispatches;
pub mod plans;
pub mod recalls;
pub mod subscribers;
