//! beaconlog - anonymous usage analytics
//!
//! One library shared by both ends of the pipe:
//! - [`schema`]: validation rules plus the event and registration models
//! - [`client`]: SDK that builds, pre-flight validates and sends payloads
//! - [`server`]: axum collector that validates again at the boundary
//! - [`storage`]: persistence adapter (SQLite warehouse or object store)
//! - [`config`]: layered configuration (env > file > defaults)

pub mod client;
pub mod config;
pub mod error;
pub mod schema;
pub mod server;
pub mod storage;

pub use error::{ValidationError, ValidationResult};
pub use schema::{AnalyticsEvent, Kind, Registration, Submission};
