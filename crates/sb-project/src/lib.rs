//! sb-project: layout files, scenarios and snapshot files for signalbox.

pub mod compile;
pub mod fingerprint;
pub mod scenario;
pub mod schema;
pub mod snapshot;
pub mod validate;

pub use compile::{CompiledLayout, Dropped, DroppedKind, compile};
pub use fingerprint::layout_fingerprint;
pub use scenario::{ActionOutcome, run_scenario};
pub use schema::*;
pub use snapshot::{SNAPSHOT_FORMAT, SnapshotFile, load_snapshot, restore_snapshot, save_snapshot};
pub use validate::{ValidationError, validate_layout, validate_scenario};

use sb_core::SbError;
use sb_interlock::InterlockError;

pub type ProjectResult<T> = Result<T, ProjectError>;

#[derive(thiserror::Error, Debug)]
pub enum ProjectError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Track layout error: {0}")]
    Track(#[from] SbError),

    #[error("Interlocking error: {0}")]
    Interlock(#[from] InterlockError),

    #[error("Scenario error: {what}")]
    Scenario { what: String },

    #[error("Snapshot error: {what}")]
    Snapshot { what: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub fn load_layout(path: &std::path::Path) -> ProjectResult<Layout> {
    let content = std::fs::read_to_string(path)?;
    let layout: Layout = serde_yaml::from_str(&content)?;
    validate_layout(&layout)?;
    Ok(layout)
}

pub fn save_layout(path: &std::path::Path, layout: &Layout) -> ProjectResult<()> {
    validate_layout(layout)?;
    let content = serde_yaml::to_string(layout)?;
    std::fs::write(path, content)?;
    Ok(())
}

pub fn load_scenario(path: &std::path::Path, layout: &Layout) -> ProjectResult<Scenario> {
    let content = std::fs::read_to_string(path)?;
    let scenario: Scenario = serde_yaml::from_str(&content)?;
    validate_scenario(&scenario, layout)?;
    Ok(scenario)
}

/// Compile and commission a layout with no head extensions.
pub fn build_interlocking(layout: &Layout) -> ProjectResult<CompiledLayout> {
    let mut compiled = compile(layout)?;
    compiled.interlocking.commission()?;
    Ok(compiled)
}
