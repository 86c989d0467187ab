//! sb-core: stable foundation for signalbox.
//!
//! Contains:
//! - units (uom SI types + constructors for track lengths and speeds)
//! - numeric (Real + finiteness checks)
//! - ids (stable compact IDs for sections, signals, trains and deadlock areas)
//! - timing (cost measurement used by the update scheduler)
//! - error (shared error types)

pub mod error;
pub mod ids;
pub mod numeric;
pub mod timing;
pub mod units;

// Re-exports: nice ergonomics for downstream crates
pub use error::{SbError, SbResult};
pub use ids::*;
pub use numeric::*;
pub use units::*;
