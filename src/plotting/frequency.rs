use anyhow::Result;
use plotters::prelude::*;

use super::{COLOR_GRID, COLOR_RED, COLOR_STEEL_BLUE};
use crate::types::MutationMap;

/// Draw one panel per chromosome: position (Mb) against frequency (%),
/// y-axis fixed to 0..100, with a least-squares trend line when the
/// chromosome carries more than one point.
pub fn draw_frequency_panels<DB: DrawingBackend>(
    root: &DrawingArea<DB, plotters::coord::Shift>,
    mutations: &MutationMap,
    title: &str,
) -> Result<()>
where
    DB::ErrorType: 'static,
{
    root.fill(&WHITE)?;

    let (title_area, chart_area) = root.split_vertically(60);
    title_area.titled(title, ("sans-serif", 22).into_font().color(&BLACK))?;

    let panel_areas = chart_area.split_evenly((mutations.len(), 1));
    let pixel_width = root.dim_in_pixel().0 as usize;

    for (idx, (chrom, observations)) in mutations.iter().enumerate() {
        let points: Vec<(f64, f64)> = observations
            .iter()
            .map(|obs| (obs.pos as f64 / 1_000_000.0, obs.frequency))
            .collect();

        let x_min = points.first().map(|p| p.0).unwrap_or(0.0);
        let x_max = points.last().map(|p| p.0).unwrap_or(1.0);
        let x_margin = (x_max - x_min).max(0.1) * 0.02;

        let mean = points.iter().map(|p| p.1).sum::<f64>() / points.len().max(1) as f64;
        let max = points.iter().map(|p| p.1).fold(0.0f64, f64::max);
        let caption = format!(
            "{}  (n={}, mean={:.1}%, max={:.1}%)",
            chrom,
            points.len(),
            mean,
            max
        );

        let mut chart = ChartBuilder::on(&panel_areas[idx])
            .caption(&caption, ("sans-serif", 14).into_font().color(&BLACK))
            .margin(5)
            .x_label_area_size(25)
            .y_label_area_size(50)
            .build_cartesian_2d((x_min - x_margin)..(x_max + x_margin), 0.0..100.0)?;

        chart
            .configure_mesh()
            .x_desc("Position (Mb)")
            .y_desc("Frequency (%)")
            .x_label_style(("sans-serif", 10))
            .y_label_style(("sans-serif", 10))
            .light_line_style(COLOR_GRID.mix(0.3))
            .draw()?;

        let reduced = minmax_downsample(&points, pixel_width);
        let draw_points = reduced.as_deref().unwrap_or(&points);

        chart.draw_series(
            draw_points
                .iter()
                .map(|&(x, y)| Circle::new((x, y), 2, COLOR_STEEL_BLUE.mix(0.6).filled())),
        )?;

        if let Some((slope, intercept)) = linear_fit(&points) {
            chart.draw_series(DashedLineSeries::new(
                vec![
                    (x_min, slope * x_min + intercept),
                    (x_max, slope * x_max + intercept),
                ],
                5,
                3,
                COLOR_RED.mix(0.6).into(),
            ))?;
        }
    }

    Ok(())
}

/// Least-squares line over (x, y) points. None with fewer than two points
/// or when every x coincides.
fn linear_fit(points: &[(f64, f64)]) -> Option<(f64, f64)> {
    if points.len() < 2 {
        return None;
    }
    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.1).sum::<f64>() / n;

    let sxx: f64 = points.iter().map(|p| (p.0 - mean_x).powi(2)).sum();
    let sxy: f64 = points
        .iter()
        .map(|p| (p.0 - mean_x) * (p.1 - mean_y))
        .sum();

    if sxx == 0.0 {
        return None;
    }
    let slope = sxy / sxx;
    Some((slope, mean_y - slope * mean_x))
}

/// Reduce x-sorted points to at most two per horizontal pixel, keeping the
/// vertical extremes of each pixel bucket. Returns None when the input is
/// already small enough to draw directly.
fn minmax_downsample(points: &[(f64, f64)], pixel_width: usize) -> Option<Vec<(f64, f64)>> {
    if pixel_width == 0 || points.len() <= pixel_width * 2 {
        return None;
    }
    let x0 = points.first()?.0;
    let span = points.last()?.0 - x0;
    if span <= 0.0 {
        return None;
    }

    let mut reduced = Vec::with_capacity(pixel_width * 2);
    let mut current_bucket = 0usize;
    let mut lo: Option<(f64, f64)> = None;
    let mut hi: Option<(f64, f64)> = None;

    let flush = |lo: &mut Option<(f64, f64)>, hi: &mut Option<(f64, f64)>, out: &mut Vec<(f64, f64)>| {
        if let (Some(l), Some(h)) = (lo.take(), hi.take()) {
            out.push(l);
            if h != l {
                out.push(h);
            }
        }
    };

    for &point in points {
        let bucket = (((point.0 - x0) / span) * pixel_width as f64) as usize;
        let bucket = bucket.min(pixel_width - 1);
        if bucket != current_bucket {
            flush(&mut lo, &mut hi, &mut reduced);
            current_bucket = bucket;
        }
        if lo.map_or(true, |l| point.1 < l.1) {
            lo = Some(point);
        }
        if hi.map_or(true, |h| point.1 > h.1) {
            hi = Some(point);
        }
    }
    flush(&mut lo, &mut hi, &mut reduced);

    Some(reduced)
}
