//! # Iron Dash Library
//!
//! This library provides the core functionality for the Iron Dash homelab
//! dashboard. Iron Dash serves a single editable document of link groups and
//! widgets, keeps an eye on every link with a background uptime monitor, and
//! caches the external content its widgets display.
//!
//! ## Overview
//!
//! - `store`: Loads, merges and atomically saves the dashboard document
//! - `document`: The document model and its create/update/delete operations
//! - `uptime`: Periodic, concurrent reachability probing of every link
//! - `cache`: Time-bounded cache for fetched and parsed content
//! - `feed`, `calendar`, `weather`: Fetchers for the content widgets
//! - `icons`: Disk-backed icon cache
//! - `server`, `settings`, `board`, `content`: The HTTP API
//!
//! ## Getting Started
//!
//! ```no_run
//! use iron_dash::{config::AppConfig, server};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), iron_dash::error::IronDashError> {
//!     let cancel_token = CancellationToken::new();
//!     server::run(AppConfig::from_env(), cancel_token).await
//! }
//! ```
//!
//! ## Consistency
//!
//! Every mutation reads the whole document from disk, changes it, and writes it
//! back atomically. Mutations issued through one process are applied one after
//! another; the file itself is never observed half-written.

/// Custom error types module
///
/// Defines the `IronDashError` enum, the crate `Result` alias and the mapping
/// from error classes to HTTP status codes.
pub mod error;

/// Request extractors with JSON error responses
pub mod extract;

/// Process configuration from environment variables
pub mod config;

/// Dashboard document model
pub mod document;

/// Document persistence
///
/// Load with defaults, atomic save, import and partial updates.
pub mod store;

/// Generic TTL cache for fetched content
pub mod cache;

/// RSS/Atom fetching and parsing
pub mod feed;

/// iCalendar fetching and parsing
pub mod calendar;

/// Current weather conditions
pub mod weather;

/// Disk-backed icon cache
pub mod icons;

/// Uptime monitoring module
///
/// Implements link monitoring that checks the availability of every configured
/// link and publishes the results as a snapshot and as Server-Sent Events.
pub mod uptime;

/// Server operations module
///
/// Contains the web server implementation using the Axum framework. This module
/// sets up routes, serves static files, starts the uptime monitor and manages
/// graceful shutdown.
pub mod server;

/// Document endpoints: read, partial update, export, import and favicon
pub mod settings;

/// Group, link and widget endpoints
pub mod board;

/// Feed, calendar, weather and icon endpoints
pub mod content;

/// Utility functions module
///
/// Identifier generation and atomic file replacement.
pub mod utils;
