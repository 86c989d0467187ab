//! sb-interlock: the mutable interlocking core of signalbox.
//!
//! Provides:
//! - Track circuit state per section (occupancy, reservation, claims, traps)
//! - Signal heads, signal types and the signal object state machine
//! - Route clearance with block-state derivation and clear-ahead propagation
//! - Deadlock resolution for passing areas
//! - A self-tuning, budgeted update scheduler
//! - Node-control authority for trains outside signal control
//! - An extension API for custom head logic
//! - Snapshot and restore of the mutable state
//!
//! Everything hangs off one [`Interlocking`] value; there is no global state.

pub mod aspect;
pub mod authority;
pub mod block;
pub mod circuit;
pub mod config;
pub mod deadlock;
pub mod error;
pub mod extension;
pub mod head;
pub mod interlocking;
pub mod persist;
pub mod route;
pub mod scheduler;
pub mod section;
pub mod signal;
pub mod train;

// Behaviour split across impl blocks of `Interlocking`
mod blockstate;
mod clearance;
mod placement;
mod query;
mod rules;

// Re-exports for public API
pub use aspect::{Aspect, FunctionNames, SignalFunction};
pub use authority::{EndAuthority, NodeClearance};
pub use block::{BlockState, SignalBlockState};
pub use circuit::{Occupant, ReserveConflict, TrackCircuitState};
pub use config::{InterlockConfig, PassingPathMode, SchedulerConfig};
pub use deadlock::{Assignment, DeadlockInfo, DeadlockPath, MAIN_PATH, PathSpec};
pub use error::{InterlockError, InterlockResult};
pub use extension::{ExtensionRegistry, HeadExtension, HeadHandle, SignalEvent, SignalMessage};
pub use head::{ApproachControlLimits, AspectEntry, SignalHead, SignalType, SpeedInfo};
pub use interlocking::{HeadSpec, Interlocking, SignalSpec};
pub use persist::{DeadlockSnapshot, HeadSnapshot, InterlockSnapshot, SectionSnapshot, SignalSnapshot};
pub use placement::{Placement, SignalPlacements};
pub use route::{AlternativeStart, RouteElement, RoutedTrain, TrackRoute};
pub use scheduler::{TickReport, UpdateScheduler};
pub use section::{DeadlockTraps, SectionRuntime};
pub use signal::{HoldState, NextSignals, Permission, SignalKind, SignalObject, SignalPhase, TrainLock};
pub use train::{ControlMode, DeadlockLink, Train, TrainPosition, TrainTable};
