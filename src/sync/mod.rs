//! Subscription synchronization.
//!
//! The [`Synchronizer`] connects the subscription store to a
//! [`Downloader`](crate::download::Downloader): it hands out due
//! downloadables, records every outcome on the subscription and, after
//! repeated automatic failures, consults the fallback service.
//!
//! # Overview
//!
//! - [`projection`] - Subscription to downloadable mapping and back
//! - [`fallback`] - Fallback service URL template and directives
//! - [`Synchronizer`] - The coordinator and download event sink

mod coordinator;
pub mod fallback;
pub mod projection;

pub use coordinator::Synchronizer;
pub use fallback::{FallbackClient, FallbackDirective, FallbackRequest, build_fallback_url};
pub use projection::{ScheduleUpdate, to_downloadable};
