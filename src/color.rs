//! Five-bucket sequential ramp used to fill sub-districts.

pub const NO_DATA: &str = "#eeeeee";

// Lower bound of each bucket, warmest first.
const BUCKETS: [(i64, &str); 5] = [
    (30, "#800026"),
    (15, "#BD0026"),
    (5, "#E31A1C"),
    (3, "#FC4E2A"),
    (1, "#FD8D3C"),
];

/// Fill color for an incident count. Zero and negative counts are gray.
pub fn color_for(count: i64) -> &'static str {
    BUCKETS
        .iter()
        .find(|(min, _)| count >= *min)
        .map(|(_, color)| *color)
        .unwrap_or(NO_DATA)
}

/// Parse `#rrggbb` into RGB, black on malformed input.
pub fn hex_to_rgb(hex: &str) -> [u8; 3] {
    let hex = hex.trim_start_matches('#');
    let channel = |range: std::ops::Range<usize>| {
        hex.get(range)
            .and_then(|s| u8::from_str_radix(s, 16).ok())
            .unwrap_or(0)
    };
    [channel(0..2), channel(2..4), channel(4..6)]
}
