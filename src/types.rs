use geo::MultiPolygon;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

pub const CATEGORIES: [&str; 11] = [
    "longsor", "banjir", "ak", "gb", "pt", "kk", "khl", "lga", "abr", "tsu", "ll",
];

pub const MONTHS: [&str; 12] = [
    "January", "February", "March", "April", "May", "June",
    "July", "August", "September", "October", "November", "December",
];

/// Properties tried in order when reading a feature's administrative code.
pub const CODE_PROPERTIES: [&str; 2] = ["kd_kecamatan", "KD_KECAMATAN"];
pub const NAME_PROPERTIES: [&str; 2] = ["nm_kecamatan", "NM_KECAMATAN"];
pub const UNKNOWN_NAME: &str = "Tidak diketahui";

/// Column of a sheet row that holds the 1-based feature position.
pub const REFERENCE_COLUMN: &str = "kd_kecamatan";

/// One row of a monthly sheet, keys and values already trimmed.
pub type SheetRow = HashMap<String, String>;

#[derive(Debug, Clone)]
pub struct GeoFeature {
    /// 1-based position inside the source collection.
    pub position: usize,
    pub properties: Map<String, Value>,
    pub geometry: Option<MultiPolygon<f64>>,
}

impl GeoFeature {
    pub fn code(&self) -> String {
        self.first_property(&CODE_PROPERTIES).unwrap_or_default()
    }

    pub fn name(&self) -> String {
        self.first_property(&NAME_PROPERTIES)
            .unwrap_or_else(|| UNKNOWN_NAME.to_string())
    }

    // First candidate with a non-empty value wins; numbers are stringified.
    fn first_property(&self, candidates: &[&str]) -> Option<String> {
        candidates.iter().find_map(|key| {
            let value = match self.properties.get(*key)? {
                Value::String(s) => s.trim().to_string(),
                Value::Number(n) => n.to_string(),
                _ => return None,
            };
            (!value.is_empty()).then_some(value)
        })
    }
}

/// Boundary file as loaded: the raw document (served back by the query
/// endpoint) and the parsed features in source order.
#[derive(Debug, Clone)]
pub struct BoundarySet {
    pub raw: Value,
    pub features: Vec<GeoFeature>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JoinedRecord {
    pub total_bencana: u32,
    pub manusia: u32,
    pub rumah: u32,
    pub raw: SheetRow,
}
