//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Start:
//!     bind listener → track serve task (work.rs) → spawn serve loop
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → one stop() → owner awaits wait()
//!
//! Stop:
//!     clear + close listener → serve loop exits → drain connections
//!     → work guard dropped → wait() resolves
//! ```
//!
//! # Design Decisions
//! - Every background task holds a work guard; completion is drop-driven
//! - Shutdown has a drain deadline: connections cannot hold wait() forever

pub mod signals;
pub mod work;

pub use work::{flag_raised, WorkGuard, WorkTracker};
