pub mod activity;
pub mod reminder;
