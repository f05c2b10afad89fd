pub mod api;
pub mod config;
pub mod delivery;
pub mod error;
pub mod map;
pub mod metrics;
pub mod policy;
pub mod replies;
pub mod tracker;
pub mod workflow;
