//! Positional join between sheet rows and boundary features.
//!
//! The spreadsheet refers to a sub-district by its 1-based position in the
//! boundary file rather than by its administrative code. Reordering the
//! boundary file therefore silently re-targets every row; the join is kept
//! positional because the published sheets depend on it.

use crate::data::coerce_count;
use crate::types::{GeoFeature, JoinedRecord, SheetRow, REFERENCE_COLUMN};
use std::collections::HashMap;
use tracing::debug;

/// Position (`"1"..="N"`) to canonical code.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyBridge(HashMap<String, String>);

impl KeyBridge {
    pub fn build(features: &[GeoFeature]) -> Self {
        let map = features
            .iter()
            .enumerate()
            .map(|(idx, f)| ((idx + 1).to_string(), f.code()))
            .collect();
        KeyBridge(map)
    }

    pub fn resolve(&self, position: &str) -> Option<&str> {
        self.0.get(position.trim()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Canonical code to joined record.
#[derive(Debug, Clone, Default)]
pub struct JoinedData(HashMap<String, JoinedRecord>);

impl JoinedData {
    pub fn get(&self, code: &str) -> Option<&JoinedRecord> {
        self.0.get(code)
    }

    /// Record for a code, all zeros when the sheet had no row for it.
    pub fn record_or_default(&self, code: &str) -> JoinedRecord {
        self.0.get(code).cloned().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

pub fn join_rows(rows: &[SheetRow], bridge: &KeyBridge) -> JoinedData {
    let mut joined = HashMap::new();
    let mut dropped = 0usize;

    for row in rows {
        let reference = row.get(REFERENCE_COLUMN).map(String::as_str).unwrap_or("");
        let code = match bridge.resolve(reference) {
            Some(code) if !code.is_empty() => code,
            _ => {
                dropped += 1;
                continue;
            }
        };

        let record = JoinedRecord {
            total_bencana: coerce_count(row.get("total_bencana").map(String::as_str)),
            manusia: coerce_count(row.get("manusia").map(String::as_str)),
            rumah: coerce_count(row.get("rumah").map(String::as_str)),
            raw: row.clone(),
        };
        joined.insert(code.to_string(), record);
    }

    debug!(joined = joined.len(), dropped, "Joined sheet rows to boundaries");
    JoinedData(joined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::parse_boundaries;
    use crate::render::{MapRenderer, RenderOptions};
    use serde_json::{json, Map};

    fn feature(position: usize, code: &str) -> GeoFeature {
        let mut properties = Map::new();
        properties.insert("kd_kecamatan".to_string(), json!(code));
        GeoFeature { position, properties, geometry: None }
    }

    fn row(pairs: &[(&str, &str)]) -> SheetRow {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_bridge_keys_are_positions() {
        let features = vec![feature(1, "32.02.010"), feature(2, "32.02.020"), feature(3, "32.02.030")];
        let bridge = KeyBridge::build(&features);

        assert_eq!(bridge.len(), 3);
        assert_eq!(bridge.resolve("1"), Some("32.02.010"));
        assert_eq!(bridge.resolve("2"), Some("32.02.020"));
        assert_eq!(bridge.resolve(" 3 "), Some("32.02.030"));
        assert_eq!(bridge.resolve("0"), None);
        assert_eq!(bridge.resolve("4"), None);
    }

    #[test]
    fn test_unresolved_rows_are_dropped() {
        let bridge = KeyBridge::build(&[feature(1, "A")]);
        let rows = vec![
            row(&[("kd_kecamatan", "1"), ("total_bencana", "5")]),
            row(&[("kd_kecamatan", "2"), ("total_bencana", "9")]),
        ];

        let joined = join_rows(&rows, &bridge);
        assert_eq!(joined.len(), 1);
        let a = joined.get("A").unwrap();
        assert_eq!(a.total_bencana, 5);
        assert_eq!(a.manusia, 0);
        assert_eq!(a.rumah, 0);
    }

    #[test]
    fn test_non_numeric_values_coerce_to_zero() {
        let bridge = KeyBridge::build(&[feature(1, "A")]);
        let joined = join_rows(&[row(&[("kd_kecamatan", "1"), ("total_bencana", "abc")])], &bridge);
        assert_eq!(joined.get("A").unwrap().total_bencana, 0);
    }

    #[test]
    fn test_duplicate_codes_last_row_wins() {
        let bridge = KeyBridge::build(&[feature(1, "A"), feature(2, "A")]);
        let rows = vec![
            row(&[("kd_kecamatan", "1"), ("total_bencana", "3")]),
            row(&[("kd_kecamatan", "2"), ("total_bencana", "8")]),
        ];
        let joined = join_rows(&rows, &bridge);
        assert_eq!(joined.len(), 1);
        assert_eq!(joined.get("A").unwrap().total_bencana, 8);
    }

    #[test]
    fn test_missing_code_defaults_to_zero_record() {
        let joined = join_rows(&[], &KeyBridge::build(&[feature(1, "A")]));
        assert_eq!(joined.record_or_default("A"), JoinedRecord::default());
        assert!(joined.record_or_default("A").raw.is_empty());
    }

    #[test]
    fn test_rows_for_features_without_code_are_dropped() {
        let square = |x: f64| json!({"type": "Polygon", "coordinates": [[[x,-7.0],[x+0.5,-7.0],[x+0.5,-6.5],[x,-6.5],[x,-7.0]]]});
        let boundaries = parse_boundaries(json!({
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "properties": {"nm_kecamatan": "Cisaat"}, "geometry": square(106.0)},
                {"type": "Feature", "properties": {"nm_kecamatan": "Sukaraja"}, "geometry": square(106.5)}
            ]
        }))
        .unwrap();
        let bridge = KeyBridge::build(&boundaries.features);
        let joined = join_rows(&[row(&[("kd_kecamatan", "1"), ("total_bencana", "40")])], &bridge);
        assert_eq!(joined.len(), 0);
        assert!(joined.get("").is_none());

        let mut renderer = MapRenderer::new(RenderOptions {
            width: 400,
            height: 300,
            pan_offset_px: 0.0,
            bounds_padding: 0.3,
        });
        renderer.draw(&boundaries, &joined);
        let layer = renderer.layer().unwrap();
        assert_eq!(layer.features.len(), 2);
        assert!(layer.features.iter().all(|f| f.style.fill_color == "#eeeeee"));
        assert!(layer.features.iter().all(|f| f.record.total_bencana == 0));
    }
}
