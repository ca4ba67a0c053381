use std::collections::{BTreeMap, BTreeSet};

use eframe::egui::Color32;
use palette::{Hsl, IntoColor, Srgb};

use crate::data::model::CellValue;

// ---------------------------------------------------------------------------
// Color palette generator
// ---------------------------------------------------------------------------

/// Generates `n` visually distinct colours using evenly spaced hues.
pub fn generate_palette(n: usize) -> Vec<Color32> {
    if n == 0 {
        return Vec::new();
    }
    (0..n)
        .map(|i| {
            let hue = (i as f32 / n as f32) * 360.0;
            let hsl = Hsl::new(hue, 0.75, 0.55);
            let rgb: Srgb = hsl.into_color();
            Color32::from_rgb(
                (rgb.red * 255.0) as u8,
                (rgb.green * 255.0) as u8,
                (rgb.blue * 255.0) as u8,
            )
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Series colours: series value → Color32
// ---------------------------------------------------------------------------

/// Stable colours for the values of the series column (e.g. Progress),
/// shared by every panel of a chart.
#[derive(Debug, Clone, Default)]
pub struct SeriesColors {
    mapping: BTreeMap<CellValue, Color32>,
}

impl SeriesColors {
    pub fn new(values: &BTreeSet<CellValue>) -> Self {
        let mapping = values
            .iter()
            .cloned()
            .zip(generate_palette(values.len()))
            .collect();
        Self { mapping }
    }

    /// Colour for a series value; grey for values outside the palette.
    pub fn color_for(&self, value: &CellValue) -> Color32 {
        self.mapping.get(value).copied().unwrap_or(Color32::GRAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palette_has_distinct_entries() {
        let p = generate_palette(4);
        assert_eq!(p.len(), 4);
        let unique: BTreeSet<[u8; 4]> = p.iter().map(|c| c.to_array()).collect();
        assert_eq!(unique.len(), 4);
    }

    #[test]
    fn unknown_series_value_is_grey() {
        let colors = SeriesColors::new(&BTreeSet::from([CellValue::from("early")]));
        assert_ne!(colors.color_for(&CellValue::from("early")), Color32::GRAY);
        assert_eq!(colors.color_for(&CellValue::Null), Color32::GRAY);
    }
}
