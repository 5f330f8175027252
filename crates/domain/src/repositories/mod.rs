pub mod billing;
pub mod dispatches;
pub mod plans;
pub mod population;
pub mod recalls;
pub mod subscribers;
