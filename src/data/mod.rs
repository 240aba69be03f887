pub mod cache;
pub mod calendar;
pub mod source;
pub mod types;
