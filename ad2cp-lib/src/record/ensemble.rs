//! Burst, average, and echo sounder ensemble records (data structure version 3).
use std::fmt::Display;

use hifitime::Epoch;
use ndarray::Array2;
#[cfg(feature = "serde")]
use serde::Serialize;
use tracing::debug;

use super::{Family, RecordKind};
use crate::prelude::*;

/// Bitmask of the sections included in an ensemble.
#[cfg_attr(feature = "serde", derive(Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeadConfig(pub u16);

impl HeadConfig {
    fn bit(self, n: u16) -> bool {
        (self.0 >> n) & 0x1 == 1
    }

    #[must_use]
    pub fn pressure(self) -> bool {
        self.bit(0)
    }
    #[must_use]
    pub fn temperature(self) -> bool {
        self.bit(1)
    }
    #[must_use]
    pub fn compass(self) -> bool {
        self.bit(2)
    }
    #[must_use]
    pub fn tilt(self) -> bool {
        self.bit(3)
    }
    #[must_use]
    pub fn velocity(self) -> bool {
        self.bit(5)
    }
    #[must_use]
    pub fn amplitude(self) -> bool {
        self.bit(6)
    }
    #[must_use]
    pub fn correlation(self) -> bool {
        self.bit(7)
    }
    #[must_use]
    pub fn altimeter(self) -> bool {
        self.bit(8)
    }
    #[must_use]
    pub fn altimeter_raw(self) -> bool {
        self.bit(9)
    }
    #[must_use]
    pub fn ast(self) -> bool {
        self.bit(10)
    }
    #[must_use]
    pub fn echo(self) -> bool {
        self.bit(11)
    }
    #[must_use]
    pub fn ahrs(self) -> bool {
        self.bit(12)
    }
    #[must_use]
    pub fn percent_good(self) -> bool {
        self.bit(13)
    }
    #[must_use]
    pub fn std_dev(self) -> bool {
        self.bit(14)
    }
}

/// Physical beam numbers assigned to each data beam, 4 bits each. Unused slots are 0.
#[cfg_attr(feature = "serde", derive(Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BeamConfig(pub [u8; 4]);

impl BeamConfig {
    #[must_use]
    pub fn from_raw(x: u16) -> Self {
        BeamConfig([
            (x & 0xf) as u8,
            (x >> 4 & 0xf) as u8,
            (x >> 8 & 0xf) as u8,
            (x >> 12 & 0xf) as u8,
        ])
    }
}

impl Display for BeamConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let [a, b, c, d] = self.0;
        write!(f, "{a}:{b}:{c}:{d}")
    }
}

/// The cell field at offset 30, interpreted according to the record kind.
#[cfg_attr(feature = "serde", derive(Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellLayout {
    Velocity {
        cells: usize,
        /// 0 ENU, 1 XYZ, 2 beam
        coord_system: u8,
        beams: usize,
    },
    Echo {
        cells: usize,
    },
}

impl CellLayout {
    #[must_use]
    pub fn decode(kind: RecordKind, x: u16) -> Self {
        match kind.family() {
            Family::Echo => CellLayout::Echo {
                cells: usize::from(x),
            },
            Family::Velocity => CellLayout::Velocity {
                cells: usize::from(x & 0x3ff),
                coord_system: (x >> 10 & 0x3) as u8,
                beams: usize::from(x >> 12 & 0xf),
            },
        }
    }

    #[must_use]
    pub fn cells(&self) -> usize {
        match self {
            CellLayout::Velocity { cells, .. } | CellLayout::Echo { cells } => *cells,
        }
    }

    /// Number of beams; always 1 for echo sounder data.
    #[must_use]
    pub fn beams(&self) -> usize {
        match self {
            CellLayout::Velocity { beams, .. } => *beams,
            CellLayout::Echo { .. } => 1,
        }
    }
}

/// Ensemble header with scaling applied.
#[cfg_attr(feature = "serde", derive(Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct EnsembleHeader {
    pub version: u8,
    pub data_offset: u8,
    pub headconfig: HeadConfig,
    pub serial_number: u32,
    /// Seconds since the UNIX epoch, including sub-second part.
    pub time: f64,
    /// m/s
    pub sound_speed: f64,
    /// degrees C
    pub temperature: f64,
    /// dBar
    pub pressure: f64,
    /// degrees
    pub heading: f64,
    /// degrees
    pub pitch: f64,
    /// degrees
    pub roll: f64,
    pub layout: CellLayout,
    /// meters
    pub cell_size: f64,
    /// meters
    pub blanking: f64,
    pub nominal_correlation: u8,
    pub pressure_temperature: u8,
    /// volts
    pub battery: f64,
    pub magnetometer: [i16; 3],
    pub accelerometer: [i16; 3],
    /// Ambiguity velocity for velocity data, frequency for echo sounder data.
    pub ambiguity_or_frequency: u16,
    pub beam_config: BeamConfig,
    pub transmit_energy: u16,
    /// Velocities are in units of `10^velocity_scaling` m/s
    pub velocity_scaling: i8,
    pub power_level: i8,
    pub magnetometer_temperature: i16,
    pub rtc_temperature: i16,
    pub error: u16,
    pub status0: u16,
    pub status: u32,
    pub ensemble_counter: u32,
}

fn u16_at(buf: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([buf[off], buf[off + 1]])
}

fn i16_at(buf: &[u8], off: usize) -> i16 {
    i16::from_le_bytes([buf[off], buf[off + 1]])
}

fn u32_at(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

/// UTC time of the ensemble as UNIX seconds.
///
/// `year` is years since 1900 and `month` is 0-based. Out of range fields carry over
/// into the next larger field, so Feb 30 is Mar 2 and day 0 is the last day of the
/// previous month.
fn unix_seconds(buf: &[u8]) -> f64 {
    let year = 1900 + i32::from(buf[8]) + i32::from(buf[9] / 12);
    let month = buf[9] % 12 + 1;
    let start = Epoch::from_gregorian_utc_at_midnight(year, month, 1).to_unix_seconds();
    let [day, hour, minute, second] = [buf[10], buf[11], buf[12], buf[13]].map(f64::from);
    start
        + (day - 1.0) * 86_400.0
        + hour * 3_600.0
        + minute * 60.0
        + second
        + f64::from(u16_at(buf, 14)) / 1e4
}

impl EnsembleHeader {
    /// Size of the header; sample data immediately follows.
    pub const LEN: usize = 76;

    /// Decode the header of an ensemble of `kind`.
    ///
    /// # Errors
    /// [Error::NotEnoughData] if `buf` is shorter than [Self::LEN].
    pub fn decode(kind: RecordKind, buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::LEN {
            return Err(Error::NotEnoughData {
                actual: buf.len(),
                minimum: Self::LEN,
            });
        }

        Ok(EnsembleHeader {
            version: buf[0],
            data_offset: buf[1],
            headconfig: HeadConfig(u16_at(buf, 2)),
            serial_number: u32_at(buf, 4),
            time: unix_seconds(buf),
            sound_speed: f64::from(u16_at(buf, 16)) * 0.1,
            temperature: f64::from(i16_at(buf, 18)) * 0.01,
            pressure: f64::from(u32_at(buf, 20)) * 0.001,
            heading: f64::from(u16_at(buf, 24)) * 0.01,
            pitch: f64::from(i16_at(buf, 26)) * 0.01,
            roll: f64::from(i16_at(buf, 28)) * 0.01,
            layout: CellLayout::decode(kind, u16_at(buf, 30)),
            cell_size: f64::from(u16_at(buf, 32)) / 1000.,
            blanking: f64::from(u16_at(buf, 34)) / 100.,
            nominal_correlation: buf[36],
            pressure_temperature: buf[37],
            battery: f64::from(u16_at(buf, 38)) * 0.1,
            magnetometer: [i16_at(buf, 40), i16_at(buf, 42), i16_at(buf, 44)],
            accelerometer: [i16_at(buf, 46), i16_at(buf, 48), i16_at(buf, 50)],
            ambiguity_or_frequency: u16_at(buf, 52),
            beam_config: BeamConfig::from_raw(u16_at(buf, 54)),
            transmit_energy: u16_at(buf, 56),
            velocity_scaling: buf[58] as i8,
            power_level: buf[59] as i8,
            magnetometer_temperature: i16_at(buf, 60),
            rtc_temperature: i16_at(buf, 62),
            error: u16_at(buf, 64),
            status0: u16_at(buf, 66),
            status: u32_at(buf, 68),
            ensemble_counter: u32_at(buf, 72),
        })
    }
}

/// Sample data following the header. Velocity arrays are shaped `(beams, cells)`.
#[derive(Debug, Clone, PartialEq)]
pub enum Samples {
    Velocity {
        /// Raw velocities in units of `10^velocity_scaling` m/s.
        velocity: Array2<i16>,
        amplitude: Option<Array2<u8>>,
        correlation: Option<Array2<u8>>,
    },
    /// Raw echo intensity per cell, 0.01 dB.
    Echo(Vec<u16>),
}

// Cuts sections off the front of the sample block.
struct Sections<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> Sections<'a> {
    fn take(&mut self, len: usize) -> &'a [u8] {
        let dat = &self.buf[self.offset..self.offset + len];
        self.offset += len;
        dat
    }
}

impl Samples {
    fn decode(header: &EnsembleHeader, buf: &[u8]) -> Result<Self> {
        let cells = header.layout.cells();
        let beams = header.layout.beams();
        let n = cells * beams;

        let hc = header.headconfig;
        let need = match header.layout {
            CellLayout::Velocity { .. } => {
                2 * n + usize::from(hc.amplitude()) * n + usize::from(hc.correlation()) * n
            }
            CellLayout::Echo { .. } => 2 * cells,
        };
        if buf.len() < EnsembleHeader::LEN + need {
            return Err(Error::NotEnoughData {
                actual: buf.len(),
                minimum: EnsembleHeader::LEN + need,
            });
        }
        let mut sections = Sections {
            buf,
            offset: EnsembleHeader::LEN,
        };

        match header.layout {
            CellLayout::Velocity { .. } => {
                let velocity = sections
                    .take(2 * n)
                    .chunks_exact(2)
                    .map(|w| i16::from_le_bytes([w[0], w[1]]))
                    .collect();
                let velocity = beam_major(beams, cells, velocity)?;
                let amplitude = if hc.amplitude() {
                    Some(beam_major(beams, cells, sections.take(n).to_vec())?)
                } else {
                    None
                };
                let correlation = if hc.correlation() {
                    Some(beam_major(beams, cells, sections.take(n).to_vec())?)
                } else {
                    None
                };
                Ok(Samples::Velocity {
                    velocity,
                    amplitude,
                    correlation,
                })
            }
            CellLayout::Echo { .. } => Ok(Samples::Echo(
                sections
                    .take(2 * cells)
                    .chunks_exact(2)
                    .map(|w| u16::from_le_bytes([w[0], w[1]]))
                    .collect(),
            )),
        }
    }
}

fn beam_major<T>(beams: usize, cells: usize, dat: Vec<T>) -> Result<Array2<T>> {
    let actual = dat.len();
    Array2::from_shape_vec((beams, cells), dat).map_err(|_| Error::NotEnoughData {
        actual,
        minimum: beams * cells,
    })
}

/// A decoded burst, average, or echo sounder record.
#[derive(Debug, Clone, PartialEq)]
pub struct Ensemble {
    pub kind: RecordKind,
    pub header: EnsembleHeader,
    pub samples: Samples,
}

impl Ensemble {
    /// Decode an ensemble record payload.
    ///
    /// # Errors
    /// [Error::NotEnoughData] if the payload is too short for the header or for the sample
    /// data it describes.
    pub fn decode(kind: RecordKind, payload: &[u8]) -> Result<Self> {
        let header = EnsembleHeader::decode(kind, payload)?;
        if usize::from(header.data_offset) != EnsembleHeader::LEN {
            debug!(
                data_offset = header.data_offset,
                "unexpected data offset; using {}",
                EnsembleHeader::LEN
            );
        }
        let samples = Samples::decode(&header, payload)?;
        Ok(Ensemble {
            kind,
            header,
            samples,
        })
    }

    #[must_use]
    pub fn family(&self) -> Family {
        self.kind.family()
    }
}
