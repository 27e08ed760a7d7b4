pub mod analysis;
pub mod auth;
pub mod client;
pub mod clock;
pub mod config;
pub mod duration;
pub mod error;
pub mod format;
pub mod models;
pub mod pipeline;
pub mod render;
pub mod report;
