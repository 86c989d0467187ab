//! Interlocking configuration.

use serde::{Deserialize, Serialize};

/// Strategy used to derive the block state of a route through passing areas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PassingPathMode {
    /// Trains carry alternative routes; switch when the main route is blocked.
    PathBased,
    /// Passing areas are resolved by the deadlock resolver on arrival.
    #[default]
    LocationBased,
}

/// Update scheduler tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Budget target for the first rotation, in microseconds.
    pub initial_target_us: u64,
    /// Number of signal updates between budget checks.
    pub check_interval: usize,
    /// Divisor applied to a full rotation cost to obtain the per-tick budget.
    pub batch_divisor: u64,
    /// Largest change of the budget target per rotation, in microseconds.
    pub max_adjust_us: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            initial_target_us: 1_000,
            check_interval: 10,
            batch_divisor: 20,
            max_adjust_us: 10,
        }
    }
}

/// Options for one interlocking instance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterlockConfig {
    pub passing_paths: PassingPathMode,
    /// Trains at or below this speed (m/s) count as stationary.
    pub stationary_speed_mps: f64,
    /// Furthest distance (m) node control will clear ahead of a train.
    pub max_check_distance_m: f64,
    /// Upper bound on sections visited by any forward track walk.
    pub max_walk_sections: usize,
    pub scheduler: SchedulerConfig,
}

impl Default for InterlockConfig {
    fn default() -> Self {
        Self {
            passing_paths: PassingPathMode::default(),
            stationary_speed_mps: 0.5,
            max_check_distance_m: 5_000.0,
            max_walk_sections: 500,
            scheduler: SchedulerConfig::default(),
        }
    }
}
