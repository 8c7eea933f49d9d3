pub mod config;
pub mod link;
pub mod messages;
pub mod motion;
pub mod runtime;
