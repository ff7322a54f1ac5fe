//! unitd - Minimal declarative process supervisor
//!
//! A Rust implementation that:
//! - Parses declarative .service and .target unit files
//! - Supervises one long-running process per service descriptor
//! - Applies a fixed-delay restart policy and readiness notification
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                     unitd                       │
//! ├─────────────────────────────────────────────────┤
//! │  Unit Parser  │  Service Manager  │  Control IPC│
//! ├─────────────────────────────────────────────────┤
//! │      Process Execution / Notify Socket          │
//! └─────────────────────────────────────────────────┘
//! ```

pub mod manager;
pub mod protocol;
pub mod units;

pub use units::{InstallSection, Service, ServiceType, ServiceSection, Unit, UnitSection};
