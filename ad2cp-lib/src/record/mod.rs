//! Record decoding.
//!
//! A [Frame] payload is interpreted according to its record id. Configuration string
//! records are searched for an embedded transform matrix and burst, average, and echo
//! sounder records are decoded as [Ensemble]s. Everything else is ignored.
mod config;
mod ensemble;

pub use config::*;
pub use ensemble::*;

use std::fmt::Display;

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::framing::Frame;
use crate::prelude::*;

/// Record id of a burst ensemble.
pub const ID_BURST: u8 = 0x15;
/// Record id of an average ensemble.
pub const ID_AVERAGE: u8 = 0x16;
/// Record id of an echo sounder ensemble.
pub const ID_ECHO: u8 = 0x1c;
/// Record id of a configuration string.
pub const ID_STRING: u8 = 0xa0;

/// Ensemble storage layouts that cannot be mixed in a single time series.
#[cfg_attr(feature = "serde", derive(Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    /// Burst and average data; per beam velocity, amplitude and correlation.
    Velocity,
    /// Echo sounder intensity.
    Echo,
}

impl Display for Family {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Family::Velocity => write!(f, "velocity"),
            Family::Echo => write!(f, "echo"),
        }
    }
}

#[cfg_attr(feature = "serde", derive(Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Burst,
    Average,
    Echo,
}

impl RecordKind {
    #[must_use]
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            ID_BURST => Some(RecordKind::Burst),
            ID_AVERAGE => Some(RecordKind::Average),
            ID_ECHO => Some(RecordKind::Echo),
            _ => None,
        }
    }

    #[must_use]
    pub fn id(self) -> u8 {
        match self {
            RecordKind::Burst => ID_BURST,
            RecordKind::Average => ID_AVERAGE,
            RecordKind::Echo => ID_ECHO,
        }
    }

    #[must_use]
    pub fn family(self) -> Family {
        match self {
            RecordKind::Burst | RecordKind::Average => Family::Velocity,
            RecordKind::Echo => Family::Echo,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    /// Configuration string containing a `GETXFAVG` response.
    Transform(TransformString),
    Ensemble(Box<Ensemble>),
    /// Record that carries nothing of interest, by record id.
    Ignored(u8),
}

impl Record {
    /// Decode a frame's payload.
    ///
    /// # Errors
    /// Any error decoding an ensemble, see [Ensemble::decode].
    pub fn decode(frame: &Frame) -> Result<Self> {
        if frame.id == ID_STRING {
            return Ok(match find_transform(&frame.payload) {
                Some(xf) => Record::Transform(xf),
                None => Record::Ignored(frame.id),
            });
        }
        match RecordKind::from_id(frame.id) {
            Some(kind) => Ok(Record::Ensemble(Box::new(Ensemble::decode(
                kind,
                &frame.payload,
            )?))),
            None => Ok(Record::Ignored(frame.id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_ids_are_ignored() {
        for id in [0x17, 0x1a, 0x1b, 0xa1] {
            let frame = Frame::new(id, 0x10, vec![0u8; 100]);
            assert_eq!(Record::decode(&frame).unwrap(), Record::Ignored(id));
        }
    }

    #[test]
    fn string_without_transform_is_ignored() {
        let frame = Frame::new(ID_STRING, 0x10, b"GETCLOCKSTR,TIME=\"2020-01-01\"\r\n".to_vec());
        assert_eq!(Record::decode(&frame).unwrap(), Record::Ignored(ID_STRING));
    }

    #[test]
    fn string_with_malformed_transform() {
        let frame = Frame::new(ID_STRING, 0x10, b"GETXFAVG,ROWS=3,COLS=3,M11=1\r\n".to_vec());
        assert!(matches!(
            Record::decode(&frame).unwrap(),
            Record::Transform(TransformString::Malformed(_))
        ));
    }

    #[test]
    fn short_ensemble_is_an_error() {
        let frame = Frame::new(ID_AVERAGE, 0x10, vec![0u8; 10]);
        assert!(matches!(
            Record::decode(&frame),
            Err(Error::NotEnoughData { .. })
        ));
    }

    #[test]
    fn record_kinds() {
        for kind in [RecordKind::Burst, RecordKind::Average, RecordKind::Echo] {
            assert_eq!(RecordKind::from_id(kind.id()), Some(kind));
        }
        assert_eq!(RecordKind::Echo.family(), Family::Echo);
        assert_eq!(RecordKind::Burst.family(), Family::Velocity);
    }
}
