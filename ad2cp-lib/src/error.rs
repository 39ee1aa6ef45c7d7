use crate::record::Family;

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Stream ended in the middle of a frame prefix or payload.
    #[error("stream truncated: wanted {wanted} bytes, got {got}")]
    Truncated { wanted: usize, got: usize },

    #[error("not enough bytes: got {actual}, need {minimum}")]
    NotEnoughData { actual: usize, minimum: usize },

    #[error("checksum mismatch for record {id:#04x}: declared {declared:#06x}, computed {computed:#06x}")]
    ChecksumMismatch {
        id: u8,
        declared: u16,
        computed: u16,
    },

    /// Embedded `GETXFAVG` matrix is not one of the known beam matrices, or does not
    /// agree with the matrix implied by an ensemble's beam configuration.
    #[error("calibration mismatch: {0}")]
    CalibrationMismatch(String),

    #[error("ensemble family changed from {expected} to {got}")]
    InconsistentEnsembleFamily { expected: Family, got: Family },

    #[error("ensemble layout changed from {expected_beams}x{expected_cells} to {beams}x{cells} (beams x cells)")]
    LayoutChanged {
        expected_beams: usize,
        expected_cells: usize,
        beams: usize,
        cells: usize,
    },

    #[error("capacity of {0} ensembles exceeded")]
    CapacityExceeded(usize),

    #[error("invalid container: {0}")]
    Container(String),
}

pub type Result<T> = std::result::Result<T, Error>;
