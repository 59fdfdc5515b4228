//! Listsync Core Library
//!
//! This library keeps remotely hosted filter-list subscriptions up to date.
//! It decides when each subscription should be fetched again, downloads it,
//! interprets the outcome and maintains the schedule so that clients neither
//! over-fetch nor fall behind, even across restarts.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`sync`] - Synchronization coordinator and fallback service client
//! - [`download`] - HTTP downloader and refresh scheduler
//! - [`expiration`] - Expiration, jitter and backoff rules
//! - [`subscription`] - Subscription records and stores
//! - [`parser`] - Filter-list parsing
//! - [`notify`] - Subscription change notifications
//! - [`config`] - Configuration file loading
//! - [`db`] - Database connection and schema management
//! - [`shutdown`] - Process shutdown hooks

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod db;
pub mod download;
pub mod expiration;
pub mod notify;
pub mod parser;
pub mod shutdown;
pub mod subscription;
pub mod sync;
mod user_agent;

// Re-export commonly used types
pub use config::{ConfigError, SyncConfig};
pub use db::Database;
pub use download::{DownloadError, Downloader, HttpClient, HttpDownloader};
pub use notify::{BroadcastNotifier, Notifier, SubscriptionEvent};
pub use shutdown::Shutdown;
pub use subscription::{
    DownloadStatus, MemoryStore, SqliteStore, StoreError, Subscription, SubscriptionStore,
};
pub use sync::Synchronizer;
