//! armseal Server
//!
//! HTTP surface and operator tooling for the experiment service.
//!
//! - [`http`]: axum router for `/api/chat` and `/healthz`
//! - [`simulate`]: offline assignment balance report

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod http;
pub mod simulate;

pub use http::{router, serve, AppState};
pub use simulate::{simulate_assignments, ArmCounts, SimulationReport};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
