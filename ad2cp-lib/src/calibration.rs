//! Beam to XYZ transform matrix selection.
//!
//! 3-beam instruments report which physical beams are in use through the
//! [BeamConfig] nibbles. Each supported beam combination has a fixed transform
//! matrix determined by the beam geometry.
use tracing::{debug, warn};

use crate::prelude::*;
use crate::record::BeamConfig;

/// 3x3 transform matrix, row-major.
pub type Matrix = [[f64; 3]; 3];

/// Transform for physical beams 1, 2, and 4.
pub const BEAM_124: Matrix = [
    [1.3564, -0.5056, -0.5056],
    [0.0000, -1.1831, 1.1831],
    [0.0000, 0.5518, 0.5518],
];

/// Transform for physical beams 2, 3, and 4.
pub const BEAM_234: Matrix = [
    [0.5056, -1.3564, 0.5056],
    [-1.1831, 0.0000, 1.1831],
    [0.5518, 0.0000, 0.5518],
];

pub const IDENTITY: Matrix = [[1., 0., 0.], [0., 1., 0.], [0., 0., 1.]];

/// One of the known beam transforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnownMatrix {
    Beam124,
    Beam234,
}

impl KnownMatrix {
    #[must_use]
    pub fn matrix(self) -> &'static Matrix {
        match self {
            KnownMatrix::Beam124 => &BEAM_124,
            KnownMatrix::Beam234 => &BEAM_234,
        }
    }

    /// Identify `m` by exact element-wise comparison.
    #[must_use]
    pub fn identify(m: &Matrix) -> Option<Self> {
        [KnownMatrix::Beam124, KnownMatrix::Beam234]
            .into_iter()
            .find(|k| k.matrix() == m)
    }
}

/// Result of selecting a transform for an ensemble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    Known(KnownMatrix),
    /// 3-beam data with an unrecognized beam configuration.
    Identity,
    /// Beam count is not 3; velocities are left as they are.
    None,
}

impl Transform {
    #[must_use]
    pub fn matrix(&self) -> Option<&'static Matrix> {
        match self {
            Transform::Known(k) => Some(k.matrix()),
            Transform::Identity => Some(&IDENTITY),
            Transform::None => None,
        }
    }
}

/// Select the transform for `config` and `beams`.
#[must_use]
pub fn select(config: BeamConfig, beams: usize) -> Transform {
    if beams != 3 {
        return Transform::None;
    }
    match config.0 {
        [1, 2, 4, 0] => Transform::Known(KnownMatrix::Beam124),
        [2, 3, 4, 0] => Transform::Known(KnownMatrix::Beam234),
        _ => Transform::Identity,
    }
}

/// Calibration state for a run.
///
/// Tracks the matrix asserted by configuration strings and checks each ensemble's
/// selected transform against it.
#[derive(Debug, Default)]
pub struct Calibration {
    asserted: Option<KnownMatrix>,
    warned: Option<BeamConfig>,
}

impl Calibration {
    #[must_use]
    pub fn asserted(&self) -> Option<KnownMatrix> {
        self.asserted
    }

    /// Record the matrix embedded in a configuration string.
    ///
    /// # Errors
    /// [Error::CalibrationMismatch] if `m` is not one of the known matrices.
    pub fn assert_matrix(&mut self, m: &Matrix) -> Result<KnownMatrix> {
        let Some(known) = KnownMatrix::identify(m) else {
            return Err(Error::CalibrationMismatch(format!(
                "GETXFAVG {m:?} does not match a known beam matrix"
            )));
        };
        debug!("GETXFAVG matches {known:?}");
        self.asserted = Some(known);
        Ok(known)
    }

    /// Select the transform for an ensemble, warning about unknown beam configurations.
    ///
    /// # Errors
    /// [Error::CalibrationMismatch] if a matrix was asserted and the selected 3-beam
    /// transform differs from it.
    pub fn transform(&mut self, config: BeamConfig, beams: usize) -> Result<Transform> {
        let transform = select(config, beams);
        if transform == Transform::Identity && self.warned != Some(config) {
            warn!("unknown beam configuration {config}; using identity matrix");
            self.warned = Some(config);
        }

        if let (Some(asserted), Some(m)) = (self.asserted, transform.matrix()) {
            if asserted.matrix() != m {
                return Err(Error::CalibrationMismatch(format!(
                    "beam configuration {config} selects {transform:?}, but GETXFAVG specified {asserted:?}"
                )));
            }
        }
        Ok(transform)
    }
}
