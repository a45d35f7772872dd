//! Vector output: the current layer as SVG, and a self-contained page that
//! wraps it with the info panel and month slider.

use crate::panel::escape_html;
use crate::render::{MapRenderer, Style, Viewport};
use crate::types::MONTHS;
use geo::{Coord, LineString, MultiPolygon};
use std::fmt::Write;

pub fn render_svg(renderer: &MapRenderer) -> String {
    let vp = renderer.viewport();
    let mut svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = vp.width,
        h = vp.height,
    );
    svg.push_str(r##"<rect width="100%" height="100%" fill="#f8f8f8"/>"##);

    if let Some(layer) = renderer.layer() {
        svg.push_str(r#"<g class="kecamatan">"#);
        for feature in &layer.features {
            let _ = write!(
                svg,
                r#"<path data-position="{}" data-code="{}" d="{}" {}/>"#,
                feature.position,
                escape_html(&feature.code),
                path_data(&feature.geometry, vp),
                style_attrs(&feature.style),
            );
        }
        svg.push_str("</g>");

        svg.push_str(r#"<g class="kecamatan-label" pointer-events="none" font-family="sans-serif" font-size="11" text-anchor="middle">"#);
        for label in &layer.labels {
            let at = vp.to_screen(label.anchor);
            let _ = write!(
                svg,
                r#"<text x="{:.1}" y="{:.1}">{}</text>"#,
                at.x,
                at.y,
                escape_html(&label.text)
            );
        }
        svg.push_str("</g>");
    }

    svg.push_str("</svg>");
    svg
}

fn style_attrs(style: &Style) -> String {
    format!(
        r#"stroke="{}" stroke-width="{}" stroke-opacity="{}" fill="{}" fill-opacity="{}" fill-rule="evenodd""#,
        style.color, style.weight, style.opacity, style.fill_color, style.fill_opacity
    )
}

fn path_data(geometry: &MultiPolygon<f64>, vp: &Viewport) -> String {
    let mut d = String::new();
    for polygon in geometry {
        ring_data(&mut d, polygon.exterior(), vp);
        for interior in polygon.interiors() {
            ring_data(&mut d, interior, vp);
        }
    }
    d
}

fn ring_data(d: &mut String, ring: &LineString<f64>, vp: &Viewport) {
    for (i, coord) in ring.coords().enumerate() {
        let Coord { x, y } = vp.to_screen(*coord);
        let cmd = if i == 0 { 'M' } else { 'L' };
        let _ = write!(d, "{}{:.1},{:.1}", cmd, x, y);
    }
    if !ring.0.is_empty() {
        d.push('Z');
    }
}

pub fn render_page(renderer: &MapRenderer, month: &str, slider: usize) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="id">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Peta Bencana - {month}</title>
    <style>{css}</style>
</head>
<body>
    <div id="map">{svg}</div>
    <div id="info-panel">{panel}</div>
    <div id="month-control">
        <input type="range" id="monthSlider" min="1" max="{max}" value="{slider}">
        <span id="monthLabel">{month}</span>
    </div>
    <script>{js}</script>
</body>
</html>"#,
        month = escape_html(month),
        css = inline_css(),
        svg = render_svg(renderer),
        panel = renderer.panel().to_html(),
        max = MONTHS.len(),
        slider = slider,
        js = inline_javascript(),
    )
}

fn inline_css() -> &'static str {
    r#"
body { margin: 0; font-family: sans-serif; }
#map { position: relative; }
#map path { cursor: pointer; }
#info-panel { position: absolute; top: 12px; right: 12px; width: 240px; padding: 12px;
  background: rgba(255,255,255,0.95); border-radius: 6px; box-shadow: 0 1px 4px rgba(0,0,0,0.3); }
#month-control { position: absolute; bottom: 16px; left: 16px; background: #fff; padding: 8px 12px; border-radius: 6px; }
.kecamatan-label text { fill: #333; }
"#
}

fn inline_javascript() -> &'static str {
    r##"
(function(){
  const panel = document.getElementById("info-panel");
  const slider = document.getElementById("monthSlider");
  const label = document.getElementById("monthLabel");

  function interact(path, action){
    fetch(`/api/features/${path.dataset.position}/${action}`)
      .then(r => r.json())
      .then(p => {
        panel.innerHTML = p.html;
        if (p.style) {
          path.setAttribute("stroke", p.style.color);
          path.setAttribute("stroke-width", p.style.weight);
          path.setAttribute("fill-opacity", p.style.fill_opacity);
        }
      })
      .catch(err => console.error(err));
  }

  function wire(){
    document.querySelectorAll("#map path[data-position]").forEach(path => {
      path.addEventListener("mouseover", () => interact(path, "hover"));
      path.addEventListener("mouseout", () => interact(path, "leave"));
      path.addEventListener("click", () => interact(path, "click"));
    });
  }

  slider.addEventListener("input", () => {
    fetch(`/api/month?slider=${slider.value}`)
      .then(r => { if (!r.ok) throw new Error("load failed"); return r.json(); })
      .then(s => {
        label.innerText = s.month;
        panel.innerHTML = s.panel_html;
        return fetch("/map.svg").then(r => r.text());
      })
      .then(svg => { document.getElementById("map").innerHTML = svg; wire(); })
      .catch(() => alert("Gagal memuat data. Lihat console."));
  });

  wire();
})();
"##
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
        let rows: Vec<SheetRow> = vec![[("kd_kecamatan", "2"), ("total_bencana", "31")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()];
        let mut renderer = MapRenderer::new(RenderOptions {
            width: 800,
            height: 600,
            pan_offset_px: 0.0,
            bounds_padding: 0.3,
        });
        renderer.draw(&boundaries, &join_rows(&rows, &bridge));
        renderer
    }

    #[test]
    fn test_svg_contains_styled_paths_and_labels() {
        let svg = render_svg(&renderer());
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains(r#"data-position="1" data-code="A""#));
        assert!(svg.contains(r##"fill="#eeeeee""##));
        assert!(svg.contains(r##"fill="#800026""##));
        assert!(svg.contains(r#"stroke-width="0.8""#));
        assert!(svg.contains(">Cisaat</text>"));
        assert!(svg.contains(">Sukaraja</text>"));
        assert_eq!(svg.matches("<path").count(), 2);
    }

    #[test]
    fn test_empty_renderer_draws_background_only() {
        let svg = render_svg(&MapRenderer::new(RenderOptions {
            width: 10,
            height: 10,
            pan_offset_px: 0.0,
            bounds_padding: 0.3,
        }));
        assert!(!svg.contains("<path"));
        assert!(svg.ends_with("</svg>"));
    }

    #[test]
    fn test_page_wraps_map_panel_and_slider() {
        let page = render_page(&renderer(), "March", 3);
        assert!(page.contains("<title>Peta Bencana - March</title>"));
        assert!(page.contains(r#"id="monthSlider" min="1" max="12" value="3""#));
        assert!(page.contains("Pilih Kecamatan"));
    }
}
