use crate::error::{CoreError, Result};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Write as _;

/// Axis-aligned bounds of a 2-D point set: (min_x, max_x, min_y, max_y).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, max_x: f64, min_y: f64, max_y: f64) -> Self {
        Self {
            min_x,
            max_x,
            min_y,
            max_y,
        }
    }

    /// Tight bounds of a point set. None for an empty set.
    pub fn of_points(points: &[[f64; 2]]) -> Option<Self> {
        let first = points.first()?;
        let mut bbox = Self::new(first[0], first[0], first[1], first[1]);
        for p in &points[1..] {
            bbox.min_x = bbox.min_x.min(p[0]);
            bbox.max_x = bbox.max_x.max(p[0]);
            bbox.min_y = bbox.min_y.min(p[1]);
            bbox.max_y = bbox.max_y.max(p[1]);
        }
        Some(bbox)
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
}

/// One box-counting resolution: (-log(r), log(N(r))).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoxCountSample {
    pub neg_log_r: f64,
    pub log_count: f64,
}

/// Box-counting samples across a geometric sequence of box sizes, with
/// the fitted log-log slope (the dimension estimate) and intercept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoxCountSeries {
    pub samples: Vec<BoxCountSample>,
    pub dimension: f64,
    pub intercept: f64,
    pub point_count: usize,
}

/// Counts the grid cells of size `r` (anchored at the bounding-box
/// minimum) that contain at least one point. A zero-extent axis is
/// treated as one box wide; indices are clamped to the grid to absorb
/// floating-point edge effects.
pub fn occupied_boxes(points: &[[f64; 2]], r: f64, bbox: &BoundingBox) -> usize {
    let effective_width = if bbox.width() == 0.0 { r } else { bbox.width() };
    let effective_height = if bbox.height() == 0.0 {
        r
    } else {
        bbox.height()
    };

    let boxes_x = (effective_width / r).ceil().max(1.0) as i64;
    let boxes_y = (effective_height / r).ceil().max(1.0) as i64;

    let mut occupied: HashSet<(i64, i64)> = HashSet::new();
    for p in points {
        let box_x = (((p[0] - bbox.min_x) / r).floor() as i64).clamp(0, boxes_x - 1);
        let box_y = (((p[1] - bbox.min_y) / r).floor() as i64).clamp(0, boxes_y - 1);
        occupied.insert((box_x, box_y));
    }
    occupied.len()
}

/// Estimates the box-counting fractal dimension of a 2-D point set.
///
/// Box sizes follow the halving sequence r_i = D / 2^(i+1), where D is
/// the larger bounding-box extent (1.0 for a fully degenerate box).
/// Because successive grids nest, N(r) is non-increasing in r by
/// construction. The dimension is the ordinary least-squares slope of
/// log N(r) against -log r; the intercept is kept for diagnostics.
pub fn estimate_fractal_dimension(
    points: &[[f64; 2]],
    bbox: &BoundingBox,
    num_resolutions: usize,
) -> Result<BoxCountSeries> {
    if points.is_empty() {
        return Err(CoreError::InvalidInput(
            "cannot estimate the dimension of an empty point set".to_string(),
        ));
    }
    if num_resolutions < 2 {
        return Err(CoreError::InvalidInput(format!(
            "num_resolutions must be at least 2 to fit a line, got {}",
            num_resolutions
        )));
    }

    let mut max_dim = bbox.width().max(bbox.height());
    if max_dim == 0.0 {
        // Single-point box; an arbitrary unit scale keeps the size
        // sequence well defined.
        max_dim = 1.0;
    }

    let mut samples = Vec::with_capacity(num_resolutions);
    for i in 0..num_resolutions {
        let r = max_dim / 2.0_f64.powi(i as i32 + 1);
        let count = occupied_boxes(points, r, bbox);
        samples.push(BoxCountSample {
            neg_log_r: -r.ln(),
            log_count: (count as f64).ln(),
        });
    }

    let (dimension, intercept) = fit_line(&samples)?;
    Ok(BoxCountSeries {
        samples,
        dimension,
        intercept,
        point_count: points.len(),
    })
}

/// Least-squares line through the (-log r, log N) samples via SVD.
fn fit_line(samples: &[BoxCountSample]) -> Result<(f64, f64)> {
    if samples.len() < 2 {
        return Err(CoreError::InvalidInput(format!(
            "a line fit needs at least 2 samples, got {}",
            samples.len()
        )));
    }

    let design = DMatrix::from_fn(samples.len(), 2, |row, col| {
        if col == 0 {
            samples[row].neg_log_r
        } else {
            1.0
        }
    });
    let rhs = DVector::from_iterator(samples.len(), samples.iter().map(|s| s.log_count));

    let svd = design.svd(true, true);
    let coefficients = svd
        .solve(&rhs, f64::EPSILON)
        .map_err(|message| CoreError::InvalidInput(message.to_string()))?;

    Ok((coefficients[0], coefficients[1]))
}

impl BoxCountSeries {
    /// Renders the series in the persisted text format: a header
    /// identifying the data, the two-column format line, the point count,
    /// a blank line, then one tab-separated row per resolution at fixed
    /// six-decimal precision.
    pub fn to_data_string(&self) -> String {
        let mut out = String::new();
        out.push_str("# Box Counting Data for Fractal Dimension Calculation\n");
        out.push_str("# Format: -log(box_size(r)) log(occupied_boxes(N(r)))\n");
        let _ = writeln!(out, "# Number of points: {}", self.point_count);
        out.push('\n');
        for sample in &self.samples {
            let _ = writeln!(out, "{:.6}\t{:.6}", sample.neg_log_r, sample.log_count);
        }
        out
    }

    /// Re-reads a persisted series, reconstructing the samples to their
    /// stored precision and refitting the same dimension and intercept.
    pub fn parse(text: &str) -> Result<Self> {
        const POINT_COUNT_PREFIX: &str = "# Number of points:";

        let mut point_count: Option<usize> = None;
        let mut samples = Vec::new();

        for (line_number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(rest) = line.strip_prefix(POINT_COUNT_PREFIX) {
                point_count = Some(rest.trim().parse().map_err(|_| {
                    CoreError::MalformedData(format!(
                        "line {}: unreadable point count {:?}",
                        line_number + 1,
                        rest.trim()
                    ))
                })?);
                continue;
            }
            if line.starts_with('#') {
                continue;
            }

            let mut columns = line.split('\t');
            let neg_log_r = parse_column(columns.next(), line_number)?;
            let log_count = parse_column(columns.next(), line_number)?;
            if columns.next().is_some() {
                return Err(CoreError::MalformedData(format!(
                    "line {}: expected exactly two tab-separated columns",
                    line_number + 1
                )));
            }
            samples.push(BoxCountSample {
                neg_log_r,
                log_count,
            });
        }

        let point_count = point_count
            .ok_or_else(|| CoreError::MalformedData("missing point-count header".to_string()))?;
        let (dimension, intercept) = fit_line(&samples).map_err(|_| {
            CoreError::MalformedData(format!(
                "need at least 2 data rows to refit, got {}",
                samples.len()
            ))
        })?;

        Ok(Self {
            samples,
            dimension,
            intercept,
            point_count,
        })
    }
}

fn parse_column(column: Option<&str>, line_number: usize) -> Result<f64> {
    column
        .and_then(|value| value.trim().parse().ok())
        .ok_or_else(|| {
            CoreError::MalformedData(format!(
                "line {}: expected a tab-separated pair of reals",
                line_number + 1
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::{estimate_fractal_dimension, occupied_boxes, BoundingBox, BoxCountSeries};
    use crate::error::CoreError;

    fn diagonal_points(count: usize) -> Vec<[f64; 2]> {
        (0..count)
            .map(|i| {
                let t = i as f64 / (count - 1) as f64;
                [t, t]
            })
            .collect()
    }

    #[test]
    fn colinear_points_occupy_two_boxes_at_r_two() {
        let points = [[0.0, 0.0], [1.0, 0.0], [2.0, 0.0], [3.0, 0.0]];
        let bbox = BoundingBox::new(0.0, 3.0, 0.0, 1.0);
        assert_eq!(occupied_boxes(&points, 2.0, &bbox), 2);
    }

    #[test]
    fn zero_height_box_still_counts_one_row() {
        let points = [[0.0, 0.0], [1.5, 0.0], [3.0, 0.0]];
        let bbox = BoundingBox::new(0.0, 3.0, 0.0, 0.0);
        assert_eq!(occupied_boxes(&points, 1.0, &bbox), 3);
        assert_eq!(occupied_boxes(&points, 3.0, &bbox), 1);
    }

    #[test]
    fn boundary_points_are_clamped_into_the_grid() {
        // x = 3 lands on the upper edge of a 2-wide grid and must fold
        // into the last cell instead of a third one.
        let points = [[3.0, 1.0]];
        let bbox = BoundingBox::new(0.0, 3.0, 0.0, 1.0);
        assert_eq!(occupied_boxes(&points, 2.0, &bbox), 1);
    }

    #[test]
    fn occupied_count_is_monotone_across_the_size_sequence() {
        // A deterministic scattering with structure at several scales.
        let points: Vec<[f64; 2]> = (0..2000)
            .map(|i| {
                let a = (i as f64 * 0.37).sin();
                let b = (i as f64 * 1.93).cos();
                [a * a, b * b]
            })
            .collect();
        let bbox = BoundingBox::of_points(&points).expect("non-empty");
        let series = estimate_fractal_dimension(&points, &bbox, 7).expect("estimate");

        let counts: Vec<f64> = series.samples.iter().map(|s| s.log_count.exp()).collect();
        for pair in counts.windows(2) {
            assert!(
                pair[1] >= pair[0] - 1e-9,
                "occupied count dropped at a finer resolution: {:?}",
                counts
            );
        }
        let resolutions: Vec<f64> = series.samples.iter().map(|s| s.neg_log_r).collect();
        for pair in resolutions.windows(2) {
            assert!(pair[1] > pair[0], "box sizes must strictly decrease");
        }
    }

    #[test]
    fn diagonal_line_has_dimension_one() {
        let points = diagonal_points(1024);
        let bbox = BoundingBox::new(0.0, 1.0, 0.0, 1.0);
        let series = estimate_fractal_dimension(&points, &bbox, 6).expect("estimate");
        assert!(
            (series.dimension - 1.0).abs() < 1e-9,
            "diagonal dimension was {}",
            series.dimension
        );
        assert!(series.intercept.abs() < 1e-9);
        assert_eq!(series.point_count, 1024);
    }

    #[test]
    fn filled_square_has_dimension_two() {
        let mut points = Vec::new();
        for i in 0..128 {
            for j in 0..128 {
                points.push([i as f64 / 127.0, j as f64 / 127.0]);
            }
        }
        let bbox = BoundingBox::new(0.0, 1.0, 0.0, 1.0);
        let series = estimate_fractal_dimension(&points, &bbox, 5).expect("estimate");
        assert!(
            (series.dimension - 2.0).abs() < 0.05,
            "filled-square dimension was {}",
            series.dimension
        );
    }

    #[test]
    fn degenerate_single_point_box_is_recovered() {
        let points = [[0.5, 0.5]; 3];
        let bbox = BoundingBox::new(0.5, 0.5, 0.5, 0.5);
        let series = estimate_fractal_dimension(&points, &bbox, 4).expect("estimate");
        for sample in &series.samples {
            assert_eq!(sample.log_count, 0.0, "a single point fills one box");
        }
        assert!(series.dimension.abs() < 1e-12);
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        let bbox = BoundingBox::new(0.0, 1.0, 0.0, 1.0);
        assert!(matches!(
            estimate_fractal_dimension(&[], &bbox, 6),
            Err(CoreError::InvalidInput(_))
        ));
        assert!(matches!(
            estimate_fractal_dimension(&[[0.0, 0.0]], &bbox, 1),
            Err(CoreError::InvalidInput(_))
        ));
    }

    #[test]
    fn data_string_round_trips_to_stored_precision() {
        let points = diagonal_points(256);
        let bbox = BoundingBox::new(0.0, 1.0, 0.0, 1.0);
        let series = estimate_fractal_dimension(&points, &bbox, 6).expect("estimate");

        let text = series.to_data_string();
        assert!(text.starts_with("# Box Counting Data"));
        assert!(text.contains("# Number of points: 256"));

        let reread = BoxCountSeries::parse(&text).expect("parse");
        assert_eq!(reread.samples.len(), series.samples.len());
        assert_eq!(reread.point_count, 256);
        for (a, b) in series.samples.iter().zip(reread.samples.iter()) {
            assert!((a.neg_log_r - b.neg_log_r).abs() < 1e-6);
            assert!((a.log_count - b.log_count).abs() < 1e-6);
        }
        assert!((reread.dimension - series.dimension).abs() < 1e-4);
        assert!((reread.intercept - series.intercept).abs() < 1e-4);
    }

    #[test]
    fn malformed_data_is_rejected() {
        assert!(matches!(
            BoxCountSeries::parse("0.5\t0.3\n1.2\t0.9\n"),
            Err(CoreError::MalformedData(_))
        ));
        assert!(matches!(
            BoxCountSeries::parse("# Number of points: 4\n\n0.5\tnope\n"),
            Err(CoreError::MalformedData(_))
        ));
        assert!(matches!(
            BoxCountSeries::parse("# Number of points: 4\n\n0.5\t0.3\t0.1\n0.6\t0.4\n"),
            Err(CoreError::MalformedData(_))
        ));
        assert!(matches!(
            BoxCountSeries::parse("# Number of points: 4\n\n0.5\t0.3\n"),
            Err(CoreError::MalformedData(_))
        ));
    }
}
