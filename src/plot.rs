use crate::models::CellData;
use eframe::egui::Color32;
use std::collections::HashMap;
use thiserror::Error;

const CONTINUOUS_BINS: usize = 32;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlotError {
    #[error("expression overlay has {got} values for {expected} points")]
    ShapeMismatch { expected: usize, got: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorScale {
    Viridis,
    Plasma,
}

// Derived scatter data: coordinates plus one color value per point. For a
// categorical trace the color value is the first-seen index of the cell's
// cluster id; for an expression overlay it is the raw expression value.
#[derive(Debug, Clone, PartialEq)]
pub struct PlotTrace {
    pub xs: Vec<f64>,
    pub ys: Vec<f64>,
    pub colors: Vec<f64>,
    pub scale: ColorScale,
    pub cluster_labels: Vec<String>,
}

impl PlotTrace {
    pub fn len(&self) -> usize {
        self.xs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.xs.is_empty()
    }
}

pub fn build_base_trace(cells: &[CellData]) -> PlotTrace {
    let mut xs = Vec::with_capacity(cells.len());
    let mut ys = Vec::with_capacity(cells.len());
    let mut colors = Vec::with_capacity(cells.len());
    let mut cluster_labels: Vec<String> = Vec::new();
    let mut index_of: HashMap<String, usize> = HashMap::new();

    for cell in cells {
        let cluster = cell.cluster_id.clone().unwrap_or_else(|| "N/A".to_string());
        let index = *index_of.entry(cluster.clone()).or_insert_with(|| {
            cluster_labels.push(cluster);
            cluster_labels.len() - 1
        });
        xs.push(cell.umap_1);
        ys.push(cell.umap_2);
        colors.push(index as f64);
    }

    PlotTrace {
        xs,
        ys,
        colors,
        scale: ColorScale::Viridis,
        cluster_labels,
    }
}

// Non-destructive recoloring: the base trace is left untouched so the
// caller can fall back to it when the overlay is cleared.
pub fn apply_expression_overlay(base: &PlotTrace, values: &[f64]) -> Result<PlotTrace, PlotError> {
    if values.len() != base.len() {
        return Err(PlotError::ShapeMismatch {
            expected: base.len(),
            got: values.len(),
        });
    }
    Ok(PlotTrace {
        xs: base.xs.clone(),
        ys: base.ys.clone(),
        colors: values.to_vec(),
        scale: ColorScale::Plasma,
        cluster_labels: base.cluster_labels.clone(),
    })
}

pub struct PointSeries {
    pub color: Color32,
    pub label: Option<String>,
    pub points: Vec<[f64; 2]>,
}

fn gradient_color(scale: ColorScale, t: f64) -> Color32 {
    let gradient = match scale {
        ColorScale::Viridis => colorous::VIRIDIS,
        ColorScale::Plasma => colorous::PLASMA,
    };
    let c = gradient.eval_continuous(t.clamp(0.0, 1.0));
    Color32::from_rgb(c.r, c.g, c.b)
}

fn categorical_series(trace: &PlotTrace) -> Vec<PointSeries> {
    let n = trace.cluster_labels.len();
    let mut series: Vec<PointSeries> = trace
        .cluster_labels
        .iter()
        .enumerate()
        .map(|(i, label)| {
            let t = if n <= 1 { 0.0 } else { i as f64 / (n as f64 - 1.0) };
            PointSeries {
                color: gradient_color(trace.scale, t),
                label: Some(label.clone()),
                points: Vec::new(),
            }
        })
        .collect();
    for i in 0..trace.len() {
        let index = trace.colors[i] as usize;
        if let Some(group) = series.get_mut(index) {
            group.points.push([trace.xs[i], trace.ys[i]]);
        }
    }
    series
}

fn continuous_series(trace: &PlotTrace) -> Vec<PointSeries> {
    let finite: Vec<f64> = trace.colors.iter().copied().filter(|v| v.is_finite()).collect();
    let vmin = finite.iter().copied().fold(f64::INFINITY, f64::min);
    let vmax = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let den = (vmax - vmin).max(1e-12);

    let mut bins: Vec<Vec<[f64; 2]>> = vec![Vec::new(); CONTINUOUS_BINS];
    let mut missing: Vec<[f64; 2]> = Vec::new();
    for i in 0..trace.len() {
        let value = trace.colors[i];
        if !value.is_finite() || finite.is_empty() {
            missing.push([trace.xs[i], trace.ys[i]]);
            continue;
        }
        let t = ((value - vmin) / den).clamp(0.0, 1.0);
        let bin = ((t * (CONTINUOUS_BINS - 1) as f64).round() as usize).min(CONTINUOUS_BINS - 1);
        bins[bin].push([trace.xs[i], trace.ys[i]]);
    }

    let mut series: Vec<PointSeries> = bins
        .into_iter()
        .enumerate()
        .filter(|(_, points)| !points.is_empty())
        .map(|(bin, points)| PointSeries {
            color: gradient_color(trace.scale, bin as f64 / (CONTINUOUS_BINS - 1) as f64),
            label: None,
            points,
        })
        .collect();
    if !missing.is_empty() {
        series.push(PointSeries {
            color: Color32::from_gray(128),
            label: None,
            points: missing,
        });
    }
    series
}

pub fn series(trace: &PlotTrace) -> Vec<PointSeries> {
    match trace.scale {
        ColorScale::Viridis => categorical_series(trace),
        ColorScale::Plasma => continuous_series(trace),
    }
}

pub fn nearest_cell(cells: &[CellData], x: f64, y: f64) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, cell) in cells.iter().enumerate() {
        let dx = cell.umap_1 - x;
        let dy = cell.umap_2 - y;
        let dist = dx * dx + dy * dy;
        match best {
            Some((_, d)) if d <= dist => {}
            _ => best = Some((i, dist)),
        }
    }
    best.map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(barcode: &str, x: f64, y: f64, cluster: Option<&str>) -> CellData {
        CellData {
            cell_barcode: barcode.to_string(),
            umap_1: x,
            umap_2: y,
            cluster_id: cluster.map(|c| c.to_string()),
            cell_type: None,
        }
    }

    #[test]
    fn test_cluster_index_is_stable_in_first_seen_order() {
        let cells = vec![
            cell("c1", 0.0, 0.0, Some("T cells")),
            cell("c2", 1.0, 1.0, Some("7")),
            cell("c3", 2.0, 2.0, Some("T cells")),
            cell("c4", 3.0, 3.0, None),
            cell("c5", 4.0, 4.0, Some("7")),
        ];
        let trace = build_base_trace(&cells);
        assert_eq!(trace.cluster_labels, vec!["T cells", "7", "N/A"]);
        assert_eq!(trace.colors, vec![0.0, 1.0, 0.0, 2.0, 1.0]);
        assert_eq!(trace.scale, ColorScale::Viridis);
    }

    #[test]
    fn test_overlay_replaces_colors_and_scale() {
        let cells = vec![
            cell("c1", 0.0, 0.0, Some("0")),
            cell("c2", 1.0, 1.0, Some("1")),
        ];
        let base = build_base_trace(&cells);
        let overlay = apply_expression_overlay(&base, &[0.5, 2.25]).unwrap();
        assert_eq!(overlay.colors, vec![0.5, 2.25]);
        assert_eq!(overlay.scale, ColorScale::Plasma);
        assert_eq!(overlay.xs, base.xs);
        // Base stays categorical.
        assert_eq!(base.scale, ColorScale::Viridis);
        assert_eq!(base.colors, vec![0.0, 1.0]);
    }

    #[test]
    fn test_overlay_shape_mismatch_leaves_base_unchanged() {
        let cells = vec![
            cell("c1", 0.0, 0.0, Some("0")),
            cell("c2", 1.0, 1.0, Some("1")),
        ];
        let base = build_base_trace(&cells);
        let before = base.clone();
        let err = apply_expression_overlay(&base, &[1.0]).unwrap_err();
        assert_eq!(err, PlotError::ShapeMismatch { expected: 2, got: 1 });
        assert_eq!(base, before);
    }

    #[test]
    fn test_categorical_series_group_points_per_cluster() {
        let cells = vec![
            cell("c1", 0.0, 0.0, Some("a")),
            cell("c2", 1.0, 1.0, Some("b")),
            cell("c3", 2.0, 2.0, Some("a")),
        ];
        let trace = build_base_trace(&cells);
        let groups = series(&trace);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].label.as_deref(), Some("a"));
        assert_eq!(groups[0].points, vec![[0.0, 0.0], [2.0, 2.0]]);
        assert_eq!(groups[1].label.as_deref(), Some("b"));
        assert_eq!(groups[1].points, vec![[1.0, 1.0]]);
    }

    #[test]
    fn test_continuous_series_cover_all_points() {
        let cells: Vec<CellData> = (0..10)
            .map(|i| cell(&format!("c{i}"), i as f64, 0.0, Some("0")))
            .collect();
        let base = build_base_trace(&cells);
        let values: Vec<f64> = (0..10).map(|i| i as f64 / 10.0).collect();
        let overlay = apply_expression_overlay(&base, &values).unwrap();
        let groups = series(&overlay);
        let total: usize = groups.iter().map(|g| g.points.len()).sum();
        assert_eq!(total, 10);
        assert!(groups.iter().all(|g| g.label.is_none()));
    }

    #[test]
    fn test_non_finite_expression_values_fall_into_missing_bucket() {
        let cells = vec![
            cell("c1", 0.0, 0.0, Some("0")),
            cell("c2", 1.0, 1.0, Some("0")),
        ];
        let base = build_base_trace(&cells);
        let overlay = apply_expression_overlay(&base, &[f64::NAN, 1.0]).unwrap();
        let groups = series(&overlay);
        let total: usize = groups.iter().map(|g| g.points.len()).sum();
        assert_eq!(total, 2);
    }

    #[test]
    fn test_nearest_cell_picks_the_closest_point() {
        let cells = vec![
            cell("c1", 0.0, 0.0, Some("0")),
            cell("c2", 5.0, 5.0, Some("0")),
            cell("c3", 10.0, 0.0, Some("0")),
        ];
        assert_eq!(nearest_cell(&cells, 4.5, 5.2), Some(1));
        assert_eq!(nearest_cell(&[], 0.0, 0.0), None);
    }
}
