//! Beam coordinate to XYZ velocity transform.
use ndarray::{Array2, Axis};

use crate::calibration::{Matrix, Transform};

/// Velocity scale factor for a header's velocity scaling exponent.
#[must_use]
pub fn velocity_scale(exponent: i8) -> f64 {
    10f64.powf(f64::from(exponent))
}

/// Apply `matrix` to a single cell's beam velocities after scaling them by `scale`.
#[must_use]
pub fn apply(matrix: &Matrix, beam: &[f64; 3], scale: f64) -> [f64; 3] {
    let scaled = beam.map(|v| scale * v);
    let mut xyz = [0.0; 3];
    for (j, row) in matrix.iter().enumerate() {
        for (k, m) in row.iter().enumerate() {
            xyz[j] += m * scaled[k];
        }
    }
    xyz
}

/// Convert raw `(beams, cells)` velocities to output velocities.
///
/// With a transform matrix (3-beam data) each cell is scaled and transformed to XYZ.
/// Otherwise the raw values are returned as-is, without scaling.
#[must_use]
pub fn beam_to_xyz(velocity: &Array2<i16>, transform: Transform, scale: f64) -> Array2<f64> {
    let raw = velocity.mapv(f64::from);
    let Some(matrix) = transform.matrix() else {
        return raw;
    };
    if raw.nrows() != 3 {
        return raw;
    }

    let mut out = Array2::zeros(raw.dim());
    for (cell, beam) in raw.axis_iter(Axis(1)).enumerate() {
        let xyz = apply(matrix, &[beam[0], beam[1], beam[2]], scale);
        for (j, v) in xyz.into_iter().enumerate() {
            out[[j, cell]] = v;
        }
    }
    out
}
