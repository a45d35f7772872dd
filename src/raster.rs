//! Raster output of the current layer. Fills and borders only; labels are
//! left to the vector output.

use crate::color::hex_to_rgb;
use crate::render::{MapRenderer, Style, Viewport};
use anyhow::{Context, Result};
use geo::Coord;
use image::{ImageBuffer, ImageOutputFormat, Rgba, RgbaImage};
use rayon::prelude::*;
use std::io::Cursor;

const BACKGROUND: Rgba<u8> = Rgba([0xf8, 0xf8, 0xf8, 255]);

pub fn render_png(renderer: &MapRenderer) -> RgbaImage {
    let vp = renderer.viewport();
    let (width, height) = (vp.width as u32, vp.height as u32);
    let mut img: RgbaImage = ImageBuffer::from_pixel(width, height, BACKGROUND);

    let Some(layer) = renderer.layer() else {
        return img;
    };
    if width == 0 || height == 0 {
        return img;
    }

    // Fills: every pixel center is hit-tested against the layer's index.
    img.par_chunks_mut(width as usize * 4)
        .enumerate()
        .for_each(|(py, row)| {
            for (px, pixel) in row.chunks_exact_mut(4).enumerate() {
                let at = vp.to_geo(Coord { x: px as f64 + 0.5, y: py as f64 + 0.5 });
                if let Some(feature) = layer.feature_at(at.x, at.y) {
                    let rgb = hex_to_rgb(&feature.style.fill_color);
                    let out = blend(BACKGROUND, rgb, feature.style.fill_opacity);
                    pixel.copy_from_slice(&out.0);
                }
            }
        });

    for feature in &layer.features {
        for polygon in &feature.geometry {
            for ring in std::iter::once(polygon.exterior()).chain(polygon.interiors()) {
                for segment in ring.lines() {
                    draw_segment(&mut img, vp, segment.start, segment.end, &feature.style);
                }
            }
        }
    }

    img
}

pub fn encode_png(img: &RgbaImage) -> Result<Vec<u8>> {
    let mut bytes = Cursor::new(Vec::new());
    img.write_to(&mut bytes, ImageOutputFormat::Png)
        .context("Failed to encode PNG")?;
    Ok(bytes.into_inner())
}

fn blend(under: Rgba<u8>, over: [u8; 3], alpha: f64) -> Rgba<u8> {
    let alpha = alpha.clamp(0.0, 1.0);
    let mix = |a: u8, b: u8| (a as f64 * (1.0 - alpha) + b as f64 * alpha).round() as u8;
    Rgba([mix(under[0], over[0]), mix(under[1], over[1]), mix(under[2], over[2]), 255])
}

fn draw_segment(img: &mut RgbaImage, vp: &Viewport, a: Coord<f64>, b: Coord<f64>, style: &Style) {
    let a = vp.to_screen(a);
    let b = vp.to_screen(b);
    let steps = (b.x - a.x).abs().max((b.y - a.y).abs()).ceil().max(1.0) as usize;
    let thickness = style.weight.round().max(1.0) as i64;
    let rgb = hex_to_rgb(&style.color);

    for i in 0..=steps {
        let t = i as f64 / steps as f64;
        let x = (a.x + (b.x - a.x) * t).floor() as i64;
        let y = (a.y + (b.y - a.y) * t).floor() as i64;
        for dx in 0..thickness {
            for dy in 0..thickness {
                let (px, py) = (x + dx, y + dy);
                if px < 0 || py < 0 || px >= img.width() as i64 || py >= img.height() as i64 {
                    continue;
                }
                let under = *img.get_pixel(px as u32, py as u32);
                img.put_pixel(px as u32, py as u32, blend(under, rgb, style.opacity));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::join::{join_rows, KeyBridge};
    use crate::render::fixtures::two_squares;
    use crate::render::RenderOptions;
    use crate::types::SheetRow;

    fn renderer() -> MapRenderer {
        let boundaries = two_squares();
        let bridge = KeyBridge::build(&boundaries.features);
        let rows: Vec<SheetRow> = vec![[("kd_kecamatan", "1"), ("total_bencana", "40")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()];
        let mut renderer = MapRenderer::new(RenderOptions {
            width: 200,
            height: 100,
            pan_offset_px: 0.0,
            bounds_padding: 0.3,
        });
        renderer.draw(&boundaries, &join_rows(&rows, &bridge));
        renderer
    }

    #[test]
    fn test_fills_follow_feature_colors() {
        let renderer = renderer();
        let img = render_png(&renderer);
        assert_eq!(img.dimensions(), (200, 100));

        let vp = renderer.viewport();
        let west = vp.to_screen(Coord { x: 106.25, y: -6.75 });
        let east = vp.to_screen(Coord { x: 106.75, y: -6.75 });

        let expected_west = blend(BACKGROUND, hex_to_rgb("#800026"), 0.9);
        let expected_east = blend(BACKGROUND, hex_to_rgb("#eeeeee"), 0.9);
        assert_eq!(*img.get_pixel(west.x as u32, west.y as u32), expected_west);
        assert_eq!(*img.get_pixel(east.x as u32, east.y as u32), expected_east);
    }

    #[test]
    fn test_empty_renderer_is_background() {
        let renderer = MapRenderer::new(RenderOptions {
            width: 8,
            height: 8,
            pan_offset_px: 0.0,
            bounds_padding: 0.3,
        });
        let img = render_png(&renderer);
        assert!(img.pixels().all(|p| *p == BACKGROUND));
    }

    #[test]
    fn test_encode_png_signature() {
        let bytes = encode_png(&render_png(&renderer())).unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
    }
}
