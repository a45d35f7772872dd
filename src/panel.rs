use crate::data::coerce_count;
use crate::types::{JoinedRecord, CATEGORIES};
use serde::Serialize;

pub const NEUTRAL_HEADING: &str = "Pilih Kecamatan";
pub const NEUTRAL_BODY: &str = "Arahkan kursor ke kecamatan untuk melihat detail bencana.";
pub const FOOTNOTE: &str = "Data diperbarui otomatis dari server";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PanelLine {
    pub label: String,
    pub value: u32,
}

/// What the side panel currently shows.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum InfoPanel {
    #[default]
    Neutral,
    Selected {
        heading: String,
        summary: Vec<PanelLine>,
        categories: Vec<PanelLine>,
    },
}

impl InfoPanel {
    pub fn show(&mut self, name: &str, record: &JoinedRecord) {
        let summary = vec![
            line("Total Bencana", record.total_bencana),
            line("Korban Manusia", record.manusia),
            line("Rumah Rusak", record.rumah),
        ];

        // Sparse: only categories with a positive count get a line.
        let categories = CATEGORIES
            .iter()
            .filter_map(|cat| {
                let value = coerce_count(record.raw.get(&format!("data_{}", cat)).map(String::as_str));
                (value > 0).then(|| line(&cat.to_uppercase(), value))
            })
            .collect();

        *self = InfoPanel::Selected {
            heading: name.to_string(),
            summary,
            categories,
        };
    }

    pub fn reset(&mut self) {
        *self = InfoPanel::Neutral;
    }

    pub fn heading(&self) -> &str {
        match self {
            InfoPanel::Neutral => NEUTRAL_HEADING,
            InfoPanel::Selected { heading, .. } => heading,
        }
    }

    /// Body as plain text lines, `"<LABEL>: <value>"`.
    pub fn body_lines(&self) -> Vec<String> {
        match self {
            InfoPanel::Neutral => vec![NEUTRAL_BODY.to_string()],
            InfoPanel::Selected { summary, categories, .. } => summary
                .iter()
                .chain(categories.iter())
                .map(|l| format!("{}: {}", l.label, l.value))
                .collect(),
        }
    }

    pub fn to_html(&self) -> String {
        match self {
            InfoPanel::Neutral => format!(
                "<h3>{}</h3><div id=\"info-content\">{}</div>",
                NEUTRAL_HEADING, NEUTRAL_BODY
            ),
            InfoPanel::Selected { heading, summary, categories } => {
                let mut html = format!("<h3>{}</h3><div id=\"info-content\">", escape_html(heading));
                for l in summary {
                    html.push_str(&format!("<p><strong>{}:</strong> {}</p>", l.label, l.value));
                }
                html.push_str("<hr/>");
                for l in categories {
                    html.push_str(&format!("<p><strong>{}:</strong> {}</p>", l.label, l.value));
                }
                html.push_str(&format!("<small>{}</small></div>", FOOTNOTE));
                html
            }
        }
    }
}

fn line(label: &str, value: u32) -> PanelLine {
    PanelLine { label: label.to_string(), value }
}

pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(raw: &[(&str, &str)]) -> JoinedRecord {
        JoinedRecord {
            total_bencana: 3,
            manusia: 1,
            rumah: 2,
            raw: raw.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        }
    }

    #[test]
    fn test_zero_categories_are_omitted() {
        let mut panel = InfoPanel::default();
        panel.show("Cibadak", &record(&[("data_banjir", "0"), ("data_ak", "3")]));

        let body = panel.body_lines();
        assert_eq!(panel.heading(), "Cibadak");
        assert!(body.contains(&"AK: 3".to_string()));
        assert!(!body.iter().any(|l| l.starts_with("BANJIR")));
        assert_eq!(&body[..3], ["Total Bencana: 3", "Korban Manusia: 1", "Rumah Rusak: 2"]);
    }

    #[test]
    fn test_categories_follow_fixed_order() {
        let mut panel = InfoPanel::default();
        panel.show("X", &record(&[("data_ll", "1"), ("data_longsor", "4"), ("data_gb", "junk")]));
        let body = panel.body_lines();
        assert_eq!(&body[3..], ["LONGSOR: 4", "LL: 1"]);
    }

    #[test]
    fn test_reset_restores_neutral_state() {
        let mut panel = InfoPanel::default();
        panel.show("Cibadak", &record(&[]));
        panel.reset();
        assert_eq!(panel, InfoPanel::Neutral);
        assert_eq!(panel.heading(), NEUTRAL_HEADING);
        assert_eq!(panel.body_lines(), vec![NEUTRAL_BODY.to_string()]);
    }

    #[test]
    fn test_html_escapes_heading() {
        let mut panel = InfoPanel::default();
        panel.show("<b>", &record(&[("data_tsu", "2")]));
        let html = panel.to_html();
        assert!(html.contains("<h3>&lt;b&gt;</h3>"));
        assert!(html.contains("<strong>TSU:</strong> 2"));
    }
}
