pub mod core;
pub mod masterdata;
pub mod recaps;
pub mod reports;
pub mod setup;
