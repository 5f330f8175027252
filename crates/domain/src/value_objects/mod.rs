pub mod billing;
pub mod entitlements;
pub mod enums;
pub mod grace;
pub mod plans;
pub mod recalls;
pub mod subscribers;
pub mod vehicles;
