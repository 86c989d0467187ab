//! Snapshot files: interlocking state plus the layout it was taken from.

use std::path::Path;

use sb_interlock::{InterlockSnapshot, Interlocking};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::fingerprint::layout_fingerprint;
use crate::schema::Layout;
use crate::{ProjectError, ProjectResult};

/// Snapshot file format written by this crate.
pub const SNAPSHOT_FORMAT: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotFile {
    pub format: u32,
    pub layout_name: String,
    pub layout_fingerprint: String,
    /// RFC 3339 time the snapshot was taken.
    pub saved_at: String,
    pub state: InterlockSnapshot,
}

impl SnapshotFile {
    pub fn capture(layout: &Layout, il: &Interlocking) -> Self {
        Self {
            format: SNAPSHOT_FORMAT,
            layout_name: layout.name.clone(),
            layout_fingerprint: layout_fingerprint(layout),
            saved_at: chrono::Utc::now().to_rfc3339(),
            state: il.snapshot(),
        }
    }
}

pub fn save_snapshot(path: &Path, snapshot: &SnapshotFile) -> ProjectResult<()> {
    let content = serde_json::to_string_pretty(snapshot)?;
    std::fs::write(path, content)?;
    Ok(())
}

pub fn load_snapshot(path: &Path) -> ProjectResult<SnapshotFile> {
    let content = std::fs::read_to_string(path)?;
    let snapshot: SnapshotFile = serde_json::from_str(&content)?;
    if snapshot.format > SNAPSHOT_FORMAT {
        return Err(ProjectError::Snapshot {
            what: format!("unsupported snapshot format {}", snapshot.format),
        });
    }
    if chrono::DateTime::parse_from_rfc3339(&snapshot.saved_at).is_err() {
        warn!(saved_at = %snapshot.saved_at, "snapshot timestamp is not RFC 3339");
    }
    Ok(snapshot)
}

/// Apply a snapshot to an interlocking compiled from `layout`.
///
/// A different layout fingerprint is only a warning; a different section
/// count is fatal and leaves the interlocking untouched.
pub fn restore_snapshot(il: &mut Interlocking, layout: &Layout, snapshot: &SnapshotFile) -> ProjectResult<()> {
    let fingerprint = layout_fingerprint(layout);
    if fingerprint != snapshot.layout_fingerprint {
        warn!(
            layout = %layout.name,
            saved_layout = %snapshot.layout_name,
            "snapshot was taken from a different layout definition"
        );
    }
    il.restore(&snapshot.state)?;
    info!(layout = %layout.name, saved_at = %snapshot.saved_at, "snapshot restored");
    Ok(())
}
