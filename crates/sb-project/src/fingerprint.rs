//! Content hash of a layout definition.

use sha2::{Digest, Sha256};

use crate::schema::Layout;

/// Hex SHA-256 of the layout's canonical JSON form.
///
/// Snapshots record it so a restore can tell when the layout changed.
pub fn layout_fingerprint(layout: &Layout) -> String {
    let mut hasher = Sha256::new();
    let layout_json = serde_json::to_string(layout).unwrap_or_default();
    hasher.update(layout_json.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{LAYOUT_VERSION, SectionDef};
    use sb_graph::SectionKind;
    use sb_interlock::InterlockConfig;

    fn layout(name: &str) -> Layout {
        Layout {
            version: LAYOUT_VERSION,
            name: name.to_string(),
            options: InterlockConfig::default(),
            sections: vec![SectionDef {
                name: "A".to_string(),
                kind: SectionKind::Normal,
                length_m: 250.0,
            }],
            links: vec![],
            signal_types: vec![],
            signals: vec![],
            passing_areas: vec![],
        }
    }

    #[test]
    fn fingerprint_is_stable() {
        let a = layout_fingerprint(&layout("one"));
        assert_eq!(a, layout_fingerprint(&layout("one")));
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn fingerprint_tracks_changes() {
        let mut changed = layout("one");
        changed.sections[0].length_m = 260.0;
        assert_ne!(layout_fingerprint(&layout("one")), layout_fingerprint(&changed));
    }
}
