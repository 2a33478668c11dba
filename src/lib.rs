//! Offline-first resource caching and synchronization for the story client.

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod logging;
pub mod net;
pub mod stories;
pub mod worker;

#[cfg(test)]
mod testing;

pub use error::{OfflineError, Result};
