use crate::error::{LoadError, LoadResult};
use crate::types::{BoundarySet, GeoFeature, SheetRow};
use csv::{ReaderBuilder, Trim};
use geo::MultiPolygon;
use geojson::GeoJson;
use serde_json::Value;
use tracing::debug;

/// Parse one monthly sheet. Header names and cell values are trimmed, short
/// rows are padded with empty strings.
pub fn parse_sheet(text: &str) -> LoadResult<Vec<SheetRow>> {
    let mut rdr = ReaderBuilder::new()
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = rdr
        .headers()
        .map_err(|e| LoadError::Csv(e.to_string()))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(|e| LoadError::Csv(e.to_string()))?;
        let row: SheetRow = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.clone(), record.get(i).unwrap_or("").trim().to_string()))
            .collect();
        rows.push(row);
    }

    debug!(rows = rows.len(), columns = headers.len(), "Parsed sheet");
    Ok(rows)
}

/// Parse the boundary document, keeping feature order. Features without a
/// polygonal geometry keep their position but carry no shape.
pub fn parse_boundaries(raw: Value) -> LoadResult<BoundarySet> {
    let geojson = GeoJson::from_json_value(raw.clone())
        .map_err(|e| LoadError::Json(e.to_string()))?;

    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => return Err(LoadError::NotFeatureCollection),
    };

    let features = collection
        .features
        .into_iter()
        .enumerate()
        .map(|(idx, feature)| {
            let geometry = feature.geometry.and_then(|geom| {
                let converted: Result<geo::Geometry<f64>, _> = geom.value.try_into();
                match converted {
                    Ok(geo::Geometry::MultiPolygon(mp)) => Some(mp),
                    Ok(geo::Geometry::Polygon(p)) => Some(MultiPolygon::new(vec![p])),
                    _ => None,
                }
            });
            GeoFeature {
                position: idx + 1,
                properties: feature.properties.unwrap_or_default(),
                geometry,
            }
        })
        .collect();

    Ok(BoundarySet { raw, features })
}

/// Lenient numeric coercion: anything that is not a finite number is 0,
/// negatives clamp to 0 and fractions truncate.
pub fn coerce_count(value: Option<&str>) -> u32 {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .map(|v| v.max(0.0) as u32)
        .unwrap_or(0)
}

/// True when the payload contains something shaped like an HTML tag, which
/// the spreadsheet host returns instead of CSV on errors and login walls.
pub fn contains_markup(text: &str) -> bool {
    let bytes = text.as_bytes();
    let Some(last_close) = bytes.iter().rposition(|&b| b == b'>') else {
        return false;
    };
    bytes[..last_close].iter().enumerate().any(|(i, &b)| {
        if b != b'<' {
            return false;
        }
        let rest = &bytes[i + 1..];
        let rest = rest.strip_prefix(b"/").unwrap_or(rest);
        matches!(rest.first(), Some(c) if c.is_ascii_alphabetic() || *c == b'!')
    })
}
