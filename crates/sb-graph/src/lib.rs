//! sb-graph: track circuit topology for signalbox.
//!
//! Provides:
//! - Track circuit sections with typed kinds and directional pin pairs
//! - Incremental track builder with validation
//! - Read-only graph accessors used by the interlocking
//!
//! # Example
//!
//! ```
//! use sb_core::m;
//! use sb_graph::{SectionKind, TrackBuilder, TrackDirection};
//!
//! let mut builder = TrackBuilder::new();
//! let a = builder.add_section("A", SectionKind::Normal, m(400.0));
//! let b = builder.add_section("B", SectionKind::Normal, m(300.0));
//! builder.connect(a, TrackDirection::Ahead, b, TrackDirection::Ahead).unwrap();
//! let graph = builder.build().unwrap();
//!
//! assert_eq!(graph.sections().len(), 2);
//! assert_eq!(graph.next(a, TrackDirection::Ahead).map(|p| p.link), Some(b));
//! ```

pub mod builder;
pub mod error;
pub mod graph;
pub(crate) mod validate;

// Re-exports for ergonomics
pub use builder::TrackBuilder;
pub use error::GraphError;
pub use graph::{Pin, PinPair, SectionKind, TrackDirection, TrackGraph, TrackSection};
