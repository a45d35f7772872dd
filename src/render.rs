//! Choropleth scene: styled sub-district polygons, labels, viewport and the
//! hover/click interaction that drives the info panel.

use crate::color::color_for;
use crate::config::MapConfig;
use crate::error::SoftError;
use crate::join::JoinedData;
use crate::panel::InfoPanel;
use crate::types::{BoundarySet, GeoFeature, JoinedRecord};
use geo::{BoundingRect, Contains, Coord, MultiPolygon, Point, Rect};
use rstar::{RTree, RTreeObject, AABB};
use serde::Serialize;
use std::f64::consts::PI;
use tracing::debug;

pub const BORDER_COLOR: &str = "#ffffff";
pub const HOVER_BORDER_COLOR: &str = "#444444";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Style {
    pub color: String,
    pub weight: f64,
    pub opacity: f64,
    pub fill_color: String,
    pub fill_opacity: f64,
}

impl Style {
    pub fn for_count(count: u32) -> Self {
        Self {
            color: BORDER_COLOR.to_string(),
            weight: 0.8,
            opacity: 1.0,
            fill_color: color_for(count as i64).to_string(),
            fill_opacity: 0.9,
        }
    }

    pub fn highlighted(&self) -> Self {
        Self {
            color: HOVER_BORDER_COLOR.to_string(),
            weight: 2.2,
            fill_opacity: 1.0,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone)]
pub struct StyledFeature {
    pub position: usize,
    pub code: String,
    pub name: String,
    pub record: JoinedRecord,
    pub geometry: MultiPolygon<f64>,
    pub base_style: Style,
    pub style: Style,
}

/// Non-interactive text placed at the center of a feature's bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct Label {
    pub position: usize,
    pub text: String,
    pub anchor: Coord<f64>,
}

struct FeatureEnvelope {
    slot: usize,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for FeatureEnvelope {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

/// Everything drawn for one load; replaced wholesale on reload.
pub struct MapLayer {
    pub id: u64,
    pub features: Vec<StyledFeature>,
    pub labels: Vec<Label>,
    pub bounds: Option<Rect<f64>>,
    index: RTree<FeatureEnvelope>,
}

impl MapLayer {
    pub fn feature(&self, position: usize) -> Option<&StyledFeature> {
        self.features.iter().find(|f| f.position == position)
    }

    fn feature_mut(&mut self, position: usize) -> Option<&mut StyledFeature> {
        self.features.iter_mut().find(|f| f.position == position)
    }

    /// Feature whose polygon contains the given lon/lat.
    pub fn feature_at(&self, lon: f64, lat: f64) -> Option<&StyledFeature> {
        let point = Point::new(lon, lat);
        let envelope = AABB::from_point([lon, lat]);
        self.index
            .locate_in_envelope_intersecting(&envelope)
            .filter_map(|candidate| self.features.get(candidate.slot))
            .find(|f| f.geometry.contains(&point))
    }
}

/// Web-Mercator viewport in normalized world units (0..1 on both axes).
#[derive(Debug, Clone, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
    pub center: Coord<f64>,
    /// Screen pixels per world unit.
    pub scale: f64,
    pub max_bounds: Option<Rect<f64>>,
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            center: Coord { x: 0.5, y: 0.5 },
            scale: width.min(height),
            max_bounds: None,
        }
    }

    pub fn fit_bounds(&mut self, bounds: Rect<f64>) {
        let world = project_rect(bounds);
        self.center = world.center();
        let (dx, dy) = (world.width(), world.height());
        self.scale = match (dx > 0.0, dy > 0.0) {
            (true, true) => (self.width / dx).min(self.height / dy),
            (true, false) => self.width / dx,
            (false, true) => self.height / dy,
            (false, false) => self.scale,
        };
    }

    pub fn set_max_bounds(&mut self, bounds: Rect<f64>) {
        self.max_bounds = Some(project_rect(bounds));
        self.clamp();
    }

    /// Move the view by screen pixels; positive x shifts the content left.
    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        self.center.x += dx / self.scale;
        self.center.y += dy / self.scale;
        self.clamp();
    }

    fn clamp(&mut self) {
        let Some(max) = self.max_bounds else { return };
        let half_w = self.width / 2.0 / self.scale;
        let half_h = self.height / 2.0 / self.scale;
        self.center.x = clamp_axis(self.center.x, half_w, max.min().x, max.max().x);
        self.center.y = clamp_axis(self.center.y, half_h, max.min().y, max.max().y);
    }

    pub fn to_screen(&self, lonlat: Coord<f64>) -> Coord<f64> {
        let world = project(lonlat);
        Coord {
            x: (world.x - self.center.x) * self.scale + self.width / 2.0,
            y: (world.y - self.center.y) * self.scale + self.height / 2.0,
        }
    }

    pub fn to_geo(&self, screen: Coord<f64>) -> Coord<f64> {
        unproject(Coord {
            x: (screen.x - self.width / 2.0) / self.scale + self.center.x,
            y: (screen.y - self.height / 2.0) / self.scale + self.center.y,
        })
    }
}

fn clamp_axis(center: f64, half: f64, min: f64, max: f64) -> f64 {
    if !half.is_finite() || max - min <= 2.0 * half {
        (min + max) / 2.0
    } else {
        center.clamp(min + half, max - half)
    }
}

pub fn project(lonlat: Coord<f64>) -> Coord<f64> {
    let lat_rad = lonlat.y.to_radians();
    Coord {
        x: (lonlat.x + 180.0) / 360.0,
        y: (1.0 - (lat_rad.tan() + (1.0 / lat_rad.cos())).ln() / PI) / 2.0,
    }
}

pub fn unproject(world: Coord<f64>) -> Coord<f64> {
    Coord {
        x: world.x * 360.0 - 180.0,
        y: (PI * (1.0 - 2.0 * world.y)).sinh().atan().to_degrees(),
    }
}

fn project_rect(rect: Rect<f64>) -> Rect<f64> {
    Rect::new(project(rect.min()), project(rect.max()))
}

/// Grow each side by `ratio` of the width/height.
pub fn pad_bounds(rect: Rect<f64>, ratio: f64) -> Rect<f64> {
    let w = rect.width() * ratio;
    let h = rect.height() * ratio;
    Rect::new(
        Coord { x: rect.min().x - w, y: rect.min().y - h },
        Coord { x: rect.max().x + w, y: rect.max().y + h },
    )
}

pub fn union_bounds<'a>(geometries: impl IntoIterator<Item = &'a MultiPolygon<f64>>) -> Option<Rect<f64>> {
    geometries
        .into_iter()
        .filter_map(|g| g.bounding_rect())
        .reduce(|a, b| {
            Rect::new(
                Coord { x: a.min().x.min(b.min().x), y: a.min().y.min(b.min().y) },
                Coord { x: a.max().x.max(b.max().x), y: a.max().y.max(b.max().y) },
            )
        })
}

pub fn label_anchor(feature: &GeoFeature) -> Result<Coord<f64>, SoftError> {
    let degenerate = || SoftError::DegenerateGeometry { position: feature.position };
    let center = feature
        .geometry
        .as_ref()
        .and_then(|g| g.bounding_rect())
        .ok_or_else(degenerate)?
        .center();
    if center.x.is_finite() && center.y.is_finite() {
        Ok(center)
    } else {
        Err(degenerate())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RenderOptions {
    pub width: u32,
    pub height: u32,
    pub pan_offset_px: f64,
    pub bounds_padding: f64,
}

impl From<&MapConfig> for RenderOptions {
    fn from(map: &MapConfig) -> Self {
        Self {
            width: map.width,
            height: map.height,
            pan_offset_px: map.pan_offset_px,
            bounds_padding: map.bounds_padding,
        }
    }
}

#[derive(Debug, Default)]
pub struct DrawReport {
    pub layer_id: u64,
    pub features: usize,
    pub labels: usize,
    pub skipped_labels: Vec<SoftError>,
}

/// Owns the drawn layer, the viewport and the info panel.
pub struct MapRenderer {
    options: RenderOptions,
    viewport: Viewport,
    layer: Option<MapLayer>,
    panel: InfoPanel,
    next_layer_id: u64,
}

impl MapRenderer {
    pub fn new(options: RenderOptions) -> Self {
        Self {
            viewport: Viewport::new(options.width as f64, options.height as f64),
            options,
            layer: None,
            panel: InfoPanel::default(),
            next_layer_id: 1,
        }
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn layer(&self) -> Option<&MapLayer> {
        self.layer.as_ref()
    }

    pub fn panel(&self) -> &InfoPanel {
        &self.panel
    }

    pub fn reset_panel(&mut self) {
        self.panel.reset();
    }

    /// Replace the current layer with one built from `boundaries` and
    /// `joined`, then fit the viewport to it.
    pub fn draw(&mut self, boundaries: &BoundarySet, joined: &JoinedData) -> DrawReport {
        if let Some(old) = self.layer.take() {
            debug!(layer = old.id, "Removing previous layer");
        }

        let mut report = DrawReport::default();
        let mut features = Vec::new();
        let mut labels = Vec::new();

        for feature in &boundaries.features {
            let Some(geometry) = feature.geometry.clone() else {
                debug!(position = feature.position, "Feature has no polygon geometry");
                continue;
            };
            let code = feature.code();
            let record = joined.record_or_default(&code);
            let style = Style::for_count(record.total_bencana);

            match label_anchor(feature) {
                Ok(anchor) => labels.push(Label {
                    position: feature.position,
                    text: feature.name(),
                    anchor,
                }),
                Err(e) => {
                    debug!(error = %e, "Skipping label");
                    report.skipped_labels.push(e);
                }
            }

            features.push(StyledFeature {
                position: feature.position,
                code,
                name: feature.name(),
                record,
                geometry,
                base_style: style.clone(),
                style,
            });
        }

        let index = RTree::bulk_load(
            features
                .iter()
                .enumerate()
                .filter_map(|(slot, f)| {
                    let rect = f.geometry.bounding_rect()?;
                    Some(FeatureEnvelope {
                        slot,
                        aabb: AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
                    })
                })
                .collect(),
        );

        let bounds = union_bounds(features.iter().map(|f| &f.geometry));
        match bounds {
            Some(bounds) => {
                self.viewport.fit_bounds(bounds);
                self.viewport.set_max_bounds(pad_bounds(bounds, self.options.bounds_padding));
                self.viewport.pan_by(self.options.pan_offset_px, 0.0);
            }
            None => debug!("No drawable bounds, viewport left unchanged"),
        }

        let id = self.next_layer_id;
        self.next_layer_id += 1;

        report.layer_id = id;
        report.features = features.len();
        report.labels = labels.len();

        self.layer = Some(MapLayer { id, features, labels, bounds, index });
        report
    }

    /// Highlight a feature and show it in the panel. Returns false when the
    /// position is not on the map.
    pub fn hover(&mut self, position: usize) -> bool {
        let Some(feature) = self.layer.as_mut().and_then(|l| l.feature_mut(position)) else {
            return false;
        };
        feature.style = feature.base_style.highlighted();
        self.panel.show(&feature.name, &feature.record);
        true
    }

    /// Restore the feature's style and clear the panel, including any
    /// selection made by a click.
    pub fn leave(&mut self, position: usize) -> bool {
        let Some(feature) = self.layer.as_mut().and_then(|l| l.feature_mut(position)) else {
            return false;
        };
        feature.style = feature.base_style.clone();
        self.panel.reset();
        true
    }

    pub fn click(&mut self, position: usize) -> bool {
        let Some(feature) = self.layer.as_ref().and_then(|l| l.feature(position)) else {
            return false;
        };
        self.panel.show(&feature.name, &feature.record);
        true
    }

    pub fn feature_at(&self, lon: f64, lat: f64) -> Option<&StyledFeature> {
        self.layer.as_ref()?.feature_at(lon, lat)
    }
}
