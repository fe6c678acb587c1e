//! Core traits and types for the gsync dashboard watcher.
//!
//! This crate defines the pieces shared by every gsync backend:
//! - `DashboardApi`: the remote dashboard API boundary (create, fetch, delete)
//! - `ResourceRegistry`: durable artifact path -> mirror uid mapping per context
//! - `WatchSession`: per-watch state guarded by a single lock
//! - `artifact`: parsing, validation and rewriting of dashboard JSON documents

pub mod artifact;
mod error;
mod registry;
mod remote;
mod session;

pub use error::WatchError;
pub use registry::{RegistryEntry, ResourceRegistry};
pub use remote::{CreateDashboardRequest, DashboardApi, DashboardEnvelope, FetchOutcome};
pub use session::{SessionSnapshot, SessionState, WatchSession};
