mod frequency;

use anyhow::Result;
use plotters::prelude::*;
use std::path::Path;

use crate::types::MutationMap;

/// Output format for plots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlotFormat {
    Png,
    Svg,
}

impl PlotFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            PlotFormat::Png => "png",
            PlotFormat::Svg => "svg",
        }
    }

    /// Pick a format from a file extension, defaulting to PNG.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("svg") => PlotFormat::Svg,
            _ => PlotFormat::Png,
        }
    }
}

/// Configuration for plot generation.
#[derive(Debug, Clone)]
pub struct PlotConfig {
    pub width: u32,
    pub row_height: u32,
    pub format: PlotFormat,
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            width: 1800,
            row_height: 400,
            format: PlotFormat::Png,
        }
    }
}

pub const COLOR_STEEL_BLUE: RGBColor = RGBColor(46, 134, 171); // #2E86AB
pub const COLOR_RED: RGBColor = RGBColor(220, 50, 50); // trend lines
pub const COLOR_GRID: RGBColor = RGBColor(200, 200, 200);

/// Render one frequency panel per chromosome, stacked vertically.
pub fn plot_frequencies(
    mutations: &MutationMap,
    path: &Path,
    title: &str,
    config: &PlotConfig,
) -> Result<()> {
    if mutations.is_empty() {
        anyhow::bail!("No data to plot");
    }

    let height = config.row_height * mutations.len() as u32 + 80; // 80px for title

    match config.format {
        PlotFormat::Png => {
            let root = BitMapBackend::new(path, (config.width, height)).into_drawing_area();
            frequency::draw_frequency_panels(&root, mutations, title)?;
            root.present()?;
        }
        PlotFormat::Svg => {
            let root = SVGBackend::new(path, (config.width, height)).into_drawing_area();
            frequency::draw_frequency_panels(&root, mutations, title)?;
            root.present()?;
        }
    }

    eprintln!("  Plot saved to: {}", path.display());
    Ok(())
}
