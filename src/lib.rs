//! pairlink: links a messaging account by pairing code and delivers the
//! resulting session to the account's own chat.

pub mod bot;
pub mod cli;
pub mod config;
pub mod error;
pub mod pairing;
pub mod platform;
pub mod server;
pub mod session;
pub mod store;

pub use config::{Config, PipelineTimings};
pub use error::{Error, Result};
