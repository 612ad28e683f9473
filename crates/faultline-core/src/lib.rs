//! faultline-core library.
//!
//! Turns error notices from instrumented applications into deduplicated
//! tracking records:
//!
//! - [`decode`]: Hoptoad v2 XML and legacy YAML bodies into one [`model::notice::Notice`]
//! - [`filter`]: backtrace noise filtering
//! - [`summary`]: dedup subject, description and resolved attributes
//! - [`render`]: journal text in Textile or Markdown
//! - [`reconcile`]: find-or-create, counter bump and journal commit
//! - [`endpoint`]: route + body in, status + plain text out
//!
//! Collaborators sit behind traits in [`directory`] and [`store`];
//! [`db::SqliteStore`] is the on-disk store.
//!
//! # Conventions
//!
//! - **Errors**: typed `thiserror` enums at the library boundary
//!   ([`error::IngestError`], [`store::StoreError`], [`decode::DecodeError`]);
//!   `anyhow::Result` for config and database plumbing.
//! - **Logging**: `tracing` macros with structured fields (`request_id`,
//!   `record_id`, `subject`).

pub mod config;
pub mod db;
pub mod decode;
pub mod directory;
pub mod endpoint;
pub mod error;
pub mod filter;
pub mod model;
pub mod reconcile;
pub mod render;
pub mod store;
pub mod summary;
