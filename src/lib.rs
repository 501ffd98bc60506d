pub mod auth;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod fallback;
pub mod insights;
pub mod providers;
pub mod report;
pub mod session;
