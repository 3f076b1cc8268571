pub mod acquire;
pub mod auth;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod engine;
pub mod humanize;
pub mod jobs;
pub mod ledger;
pub mod observability;
pub mod sanitize;
pub mod storage;
