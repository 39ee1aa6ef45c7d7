//! Time series accumulation.
//!
//! Each decoded ensemble appends one column to every channel. Storage is sized by the
//! first ensemble and its beam and cell counts are fixed for the rest of the run.
use ndarray::{Array1, Array2, ArrayView1};
use tracing::debug;

use crate::calibration::Transform;
use crate::mat::NamedArray;
use crate::prelude::*;
use crate::record::{Ensemble, Family, Samples};
use crate::transform::{beam_to_xyz, velocity_scale};

/// Accumulator state. The terminal drained state is reached by consuming the
/// accumulator with [SeriesAccumulator::into_arrays].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Uninitialized,
    /// Storage is allocated, no columns appended yet.
    Sized,
    Accumulating,
}

#[derive(Debug)]
struct VelocitySeries {
    beams: usize,
    cells: usize,
    velocity: Vec<Array2<f64>>,
    amplitude: Vec<Array2<i16>>,
    correlation: Vec<Array2<i16>>,
}

#[derive(Debug)]
struct EchoSeries {
    cells: usize,
    echo: Array2<f64>,
    beam: Vec<i16>,
    power: Vec<i16>,
}

#[derive(Debug)]
enum Storage {
    Velocity(VelocitySeries),
    Echo(EchoSeries),
}

impl Storage {
    fn new(family: Family, beams: usize, cells: usize) -> Self {
        match family {
            Family::Velocity => Storage::Velocity(VelocitySeries {
                beams,
                cells,
                velocity: empty_columns(beams, cells),
                amplitude: empty_columns(beams, cells),
                correlation: empty_columns(beams, cells),
            }),
            Family::Echo => Storage::Echo(EchoSeries {
                cells,
                echo: Array2::from_elem((cells, 0), 0.0),
                beam: Vec::default(),
                power: Vec::default(),
            }),
        }
    }

    fn family(&self) -> Family {
        match self {
            Storage::Velocity(_) => Family::Velocity,
            Storage::Echo(_) => Family::Echo,
        }
    }

    // (beams, cells)
    fn layout(&self) -> (usize, usize) {
        match self {
            Storage::Velocity(v) => (v.beams, v.cells),
            Storage::Echo(e) => (1, e.cells),
        }
    }
}

fn empty_columns<T: Clone + Default>(n: usize, cells: usize) -> Vec<Array2<T>> {
    (0..n)
        .map(|_| Array2::from_elem((cells, 0), T::default()))
        .collect()
}

#[derive(Debug, Default)]
struct Environment {
    pressure: Vec<f64>,
    temperature: Vec<f64>,
    heading: Vec<f64>,
    pitch: Vec<f64>,
    roll: Vec<f64>,
    mag_x: Vec<i16>,
    mag_y: Vec<i16>,
    mag_z: Vec<i16>,
    time: Vec<f64>,
}

/// Growing time series storage for a single run.
///
/// # Example
/// ```
/// use ad2cp::series::{SeriesAccumulator, State};
///
/// let series = SeriesAccumulator::with_capacity(Some(1000));
/// assert_eq!(series.state(), State::Uninitialized);
/// let arrays = series.into_arrays();
/// assert_eq!(arrays.last().unwrap().name, "blanking");
/// ```
#[derive(Debug, Default)]
pub struct SeriesAccumulator {
    capacity: Option<usize>,
    count: usize,
    storage: Option<Storage>,
    env: Environment,
    cell_size: f64,
    blanking: f64,
    amplitude_included: bool,
    correlation_included: bool,
}

impl SeriesAccumulator {
    /// Accumulator with unbounded storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulator that accepts at most `capacity` ensembles, or unbounded if `None`.
    #[must_use]
    pub fn with_capacity(capacity: Option<usize>) -> Self {
        SeriesAccumulator {
            capacity,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn state(&self) -> State {
        match (&self.storage, self.count) {
            (None, _) => State::Uninitialized,
            (Some(_), 0) => State::Sized,
            (Some(_), _) => State::Accumulating,
        }
    }

    /// Number of ensembles appended.
    #[must_use]
    pub fn len(&self) -> usize {
        self.count
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Family of the accumulated ensembles, once sized.
    #[must_use]
    pub fn family(&self) -> Option<Family> {
        self.storage.as_ref().map(Storage::family)
    }

    /// `(beams, cells)`, once sized.
    #[must_use]
    pub fn layout(&self) -> Option<(usize, usize)> {
        self.storage.as_ref().map(Storage::layout)
    }

    // Allocate storage for the first ensemble.
    fn size(&mut self, family: Family, beams: usize, cells: usize) {
        debug!(%family, beams, cells, capacity = ?self.capacity, "sizing time series");
        if let Some(cap) = self.capacity {
            let env = &mut self.env;
            for v in [
                &mut env.pressure,
                &mut env.temperature,
                &mut env.heading,
                &mut env.pitch,
                &mut env.roll,
                &mut env.time,
            ] {
                v.reserve_exact(cap);
            }
            for v in [&mut env.mag_x, &mut env.mag_y, &mut env.mag_z] {
                v.reserve_exact(cap);
            }
        }
        self.storage = Some(Storage::new(family, beams, cells));
    }

    /// Append `ensemble` as the next column, converting velocities with `transform`.
    ///
    /// Nothing is appended if an error is returned.
    ///
    /// # Errors
    /// * [Error::InconsistentEnsembleFamily] if the ensemble is not of the family used to
    ///   size storage
    /// * [Error::LayoutChanged] if the beam or cell count differs from the first ensemble
    /// * [Error::CapacityExceeded] if a capacity is set and has been reached
    pub fn append(&mut self, ensemble: &Ensemble, transform: Transform) -> Result<()> {
        let hdr = &ensemble.header;
        let family = ensemble.family();
        let (beams, cells) = (hdr.layout.beams(), hdr.layout.cells());

        if let Some(storage) = &self.storage {
            if storage.family() != family {
                return Err(Error::InconsistentEnsembleFamily {
                    expected: storage.family(),
                    got: family,
                });
            }
            let (expected_beams, expected_cells) = storage.layout();
            if (expected_beams, expected_cells) != (beams, cells) {
                return Err(Error::LayoutChanged {
                    expected_beams,
                    expected_cells,
                    beams,
                    cells,
                });
            }
        }
        if let Some(cap) = self.capacity {
            if self.count >= cap {
                return Err(Error::CapacityExceeded(cap));
            }
        }
        if self.storage.is_none() {
            self.size(family, beams, cells);
        }

        let layout_err = |_| Error::LayoutChanged {
            expected_beams: beams,
            expected_cells: cells,
            beams,
            cells,
        };
        match (self.storage.as_mut(), &ensemble.samples) {
            (
                Some(Storage::Velocity(series)),
                Samples::Velocity {
                    velocity,
                    amplitude,
                    correlation,
                },
            ) => {
                let xyz = beam_to_xyz(velocity, transform, velocity_scale(hdr.velocity_scaling));
                let zeros = Array1::<i16>::zeros(cells);
                for b in 0..beams {
                    series.velocity[b]
                        .push_column(xyz.row(b))
                        .map_err(layout_err)?;
                    let amp = amplitude
                        .as_ref()
                        .map_or_else(|| zeros.clone(), |a| a.row(b).mapv(i16::from));
                    series.amplitude[b]
                        .push_column(amp.view())
                        .map_err(layout_err)?;
                    let corr = correlation
                        .as_ref()
                        .map_or_else(|| zeros.clone(), |c| c.row(b).mapv(i16::from));
                    series.correlation[b]
                        .push_column(corr.view())
                        .map_err(layout_err)?;
                }
            }
            (Some(Storage::Echo(series)), Samples::Echo(echo)) => {
                let intensity: Vec<f64> = echo.iter().map(|v| f64::from(*v) * 0.01).collect();
                series
                    .echo
                    .push_column(ArrayView1::from(&intensity))
                    .map_err(layout_err)?;
                series.beam.push(i16::from(hdr.beam_config.0[0]));
                series.power.push(i16::from(hdr.power_level));
            }
            (storage, _) => {
                return Err(Error::InconsistentEnsembleFamily {
                    expected: storage.map_or(family, |s| s.family()),
                    got: family,
                })
            }
        }

        let env = &mut self.env;
        env.pressure.push(hdr.pressure);
        env.temperature.push(hdr.temperature);
        env.heading.push(hdr.heading);
        env.pitch.push(hdr.pitch);
        env.roll.push(hdr.roll);
        env.mag_x.push(hdr.magnetometer[0]);
        env.mag_y.push(hdr.magnetometer[1]);
        env.mag_z.push(hdr.magnetometer[2]);
        env.time.push(hdr.time);

        self.cell_size = hdr.cell_size;
        self.blanking = hdr.blanking;
        self.amplitude_included = hdr.headconfig.amplitude();
        self.correlation_included = hdr.headconfig.correlation();
        self.count += 1;
        Ok(())
    }

    /// Drain the accumulated series into output arrays.
    ///
    /// Velocity runs produce `velX`, `velY`, `velZ` for 3-beam data or `vel1`..`velN`
    /// otherwise, followed by `corr1`.. and `amp1`.. if they were included in the last
    /// ensemble. Echo runs produce `echo`, `beam`, and `power`. Both are followed by the
    /// environmental series, `time`, `cellSize`, and `blanking`.
    #[must_use]
    pub fn into_arrays(self) -> Vec<NamedArray> {
        let mut arrays = Vec::default();
        match self.storage {
            Some(Storage::Velocity(series)) => {
                let xyz = series.beams == 3;
                for (b, vel) in series.velocity.into_iter().enumerate() {
                    let name = if xyz {
                        format!("vel{}", ["X", "Y", "Z"][b])
                    } else {
                        format!("vel{}", b + 1)
                    };
                    arrays.push(NamedArray::new(&name, vel));
                }
                if self.correlation_included {
                    for (b, corr) in series.correlation.into_iter().enumerate() {
                        arrays.push(NamedArray::new(&format!("corr{}", b + 1), corr));
                    }
                }
                if self.amplitude_included {
                    for (b, amp) in series.amplitude.into_iter().enumerate() {
                        arrays.push(NamedArray::new(&format!("amp{}", b + 1), amp));
                    }
                }
            }
            Some(Storage::Echo(series)) => {
                arrays.push(NamedArray::new("echo", series.echo));
                arrays.push(NamedArray::vector("beam", series.beam));
                arrays.push(NamedArray::vector("power", series.power));
            }
            None => (),
        }

        let env = self.env;
        arrays.extend([
            NamedArray::vector("pressure", env.pressure),
            NamedArray::vector("temperature", env.temperature),
            NamedArray::vector("heading", env.heading),
            NamedArray::vector("pitch", env.pitch),
            NamedArray::vector("roll", env.roll),
            NamedArray::vector("magX", env.mag_x),
            NamedArray::vector("magY", env.mag_y),
            NamedArray::vector("magZ", env.mag_z),
            NamedArray::vector("time", env.time),
            NamedArray::scalar("cellSize", self.cell_size),
            NamedArray::scalar("blanking", self.blanking),
        ]);
        arrays
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::KnownMatrix;
    use crate::mat::ArrayData;
    use crate::record::{
        BeamConfig, CellLayout, EnsembleHeader, HeadConfig, RecordKind,
    };
    use ndarray::array;

    fn header(layout: CellLayout) -> EnsembleHeader {
        EnsembleHeader {
            version: 3,
            data_offset: 76,
            headconfig: HeadConfig(0b1110_1111),
            serial_number: 1,
            time: 1_600_000_000.5,
            sound_speed: 1500.,
            temperature: 10.,
            pressure: 1.0,
            heading: 18.0,
            pitch: -1.,
            roll: 2.,
            layout,
            cell_size: 2.0,
            blanking: 0.1,
            nominal_correlation: 0,
            pressure_temperature: 0,
            battery: 15.,
            magnetometer: [1, -2, 3],
            accelerometer: [0, 0, 0],
            ambiguity_or_frequency: 0,
            beam_config: BeamConfig([1, 2, 4, 0]),
            transmit_energy: 0,
            velocity_scaling: 0,
            power_level: -4,
            magnetometer_temperature: 0,
            rtc_temperature: 0,
            error: 0,
            status0: 0,
            status: 0,
            ensemble_counter: 0,
        }
    }

    fn velocity(beams: usize, cells: usize) -> Ensemble {
        let n = beams * cells;
        let raw: Vec<i16> = (0..n).map(|i| i as i16).collect();
        Ensemble {
            kind: RecordKind::Average,
            header: header(CellLayout::Velocity {
                cells,
                coord_system: 2,
                beams,
            }),
            samples: Samples::Velocity {
                velocity: Array2::from_shape_vec((beams, cells), raw).unwrap(),
                amplitude: Some(Array2::from_elem((beams, cells), 7)),
                correlation: Some(Array2::from_elem((beams, cells), 9)),
            },
        }
    }

    fn echo(cells: usize) -> Ensemble {
        let mut hdr = header(CellLayout::Echo { cells });
        hdr.beam_config = BeamConfig([5, 0, 0, 0]);
        Ensemble {
            kind: RecordKind::Echo,
            header: hdr,
            samples: Samples::Echo(vec![100; cells]),
        }
    }

    fn find<'a>(arrays: &'a [NamedArray], name: &str) -> &'a NamedArray {
        arrays
            .iter()
            .find(|a| a.name == name)
            .unwrap_or_else(|| panic!("no array named {name}"))
    }

    fn names(arrays: &[NamedArray]) -> Vec<&str> {
        arrays.iter().map(|a| a.name.as_str()).collect()
    }

    #[test]
    fn states() {
        let mut series = SeriesAccumulator::new();
        assert_eq!(series.state(), State::Uninitialized);
        series.append(&velocity(4, 2), Transform::None).unwrap();
        assert_eq!(series.state(), State::Accumulating);
        assert_eq!(series.len(), 1);
        assert_eq!(series.family(), Some(Family::Velocity));
        assert_eq!(series.layout(), Some((4, 2)));
    }

    #[test]
    fn four_beam_names_and_columns() {
        let mut series = SeriesAccumulator::new();
        for _ in 0..3 {
            series.append(&velocity(4, 2), Transform::None).unwrap();
        }
        let arrays = series.into_arrays();
        assert_eq!(
            names(&arrays),
            vec![
                "vel1", "vel2", "vel3", "vel4", "corr1", "corr2", "corr3", "corr4", "amp1",
                "amp2", "amp3", "amp4", "pressure", "temperature", "heading", "pitch", "roll",
                "magX", "magY", "magZ", "time", "cellSize", "blanking"
            ]
        );
        let ArrayData::Float64(vel2) = &find(&arrays, "vel2").data else {
            panic!("wrong kind");
        };
        // cells x time, raw unscaled values
        assert_eq!(vel2, &array![[2.0, 2.0, 2.0], [3.0, 3.0, 3.0]]);
        assert_eq!(find(&arrays, "heading").dim(), (3, 1));
        assert_eq!(
            find(&arrays, "magY").data,
            ArrayData::Int16(array![[-2], [-2], [-2]])
        );
        assert_eq!(find(&arrays, "cellSize").data, ArrayData::Float64(array![[2.0]]));
    }

    #[test]
    fn three_beam_velocities_transformed() {
        let mut series = SeriesAccumulator::new();
        series
            .append(&velocity(3, 1), Transform::Known(KnownMatrix::Beam124))
            .unwrap();
        let arrays = series.into_arrays();
        assert_eq!(&names(&arrays)[..3], &["velX", "velY", "velZ"]);

        let expected = crate::transform::apply(KnownMatrix::Beam124.matrix(), &[0., 1., 2.], 1.);
        let ArrayData::Float64(vel_z) = &find(&arrays, "velZ").data else {
            panic!("wrong kind");
        };
        assert_eq!(vel_z[[0, 0]], expected[2]);
    }

    #[test]
    fn amplitude_omitted_when_not_included() {
        let mut series = SeriesAccumulator::new();
        let mut ens = velocity(4, 2);
        ens.header.headconfig = HeadConfig(0b1010_1111);
        series.append(&ens, Transform::None).unwrap();
        let arrays = series.into_arrays();
        assert!(arrays.iter().all(|a| !a.name.starts_with("amp")));
        assert!(arrays.iter().any(|a| a.name == "corr4"));
    }

    #[test]
    fn echo_arrays() {
        let mut series = SeriesAccumulator::new();
        series.append(&echo(4), Transform::None).unwrap();
        series.append(&echo(4), Transform::None).unwrap();
        let arrays = series.into_arrays();
        assert_eq!(&names(&arrays)[..4], &["echo", "beam", "power", "pressure"]);
        assert_eq!(find(&arrays, "echo").dim(), (4, 2));
        assert_eq!(find(&arrays, "beam").data, ArrayData::Int16(array![[5], [5]]));
        assert_eq!(find(&arrays, "power").data, ArrayData::Int16(array![[-4], [-4]]));
    }

    #[test]
    fn echo_then_velocity_is_inconsistent() {
        let mut series = SeriesAccumulator::new();
        series.append(&echo(4), Transform::None).unwrap();
        let err = series.append(&velocity(3, 4), Transform::Identity).unwrap_err();
        assert!(
            matches!(
                err,
                Error::InconsistentEnsembleFamily {
                    expected: Family::Echo,
                    got: Family::Velocity
                }
            ),
            "got {err:?}"
        );
        assert_eq!(series.len(), 1);
    }

    #[test]
    fn changed_layout_is_an_error() {
        let mut series = SeriesAccumulator::new();
        series.append(&velocity(4, 2), Transform::None).unwrap();
        assert!(matches!(
            series.append(&velocity(4, 3), Transform::None),
            Err(Error::LayoutChanged { cells: 3, .. })
        ));
        assert_eq!(series.len(), 1);
    }

    #[test]
    fn capacity_exceeded() {
        let mut series = SeriesAccumulator::with_capacity(Some(2));
        series.append(&velocity(4, 2), Transform::None).unwrap();
        series.append(&velocity(4, 2), Transform::None).unwrap();
        assert!(matches!(
            series.append(&velocity(4, 2), Transform::None),
            Err(Error::CapacityExceeded(2))
        ));
        assert_eq!(series.into_arrays()[0].dim(), (2, 2));
    }

    #[test]
    fn empty_series_still_has_scalars() {
        let arrays = SeriesAccumulator::new().into_arrays();
        assert_eq!(arrays.len(), 11);
        assert_eq!(find(&arrays, "pressure").dim(), (0, 1));
    }
}
