//! Decoding a run of input streams into a single time series.
use std::io::{Read, Write};

use tracing::{debug, info, trace, warn};
use typed_builder::TypedBuilder;

use crate::calibration::{Calibration, KnownMatrix};
use crate::framing::{Frame, FrameReader, FrameStats, ReaderOpts};
use crate::mat::{write_arrays, NamedArray};
use crate::prelude::*;
use crate::record::{Ensemble, Family, Record, TransformString, XFAVG_KEY};
use crate::series::SeriesAccumulator;

/// Options for a decode run.
#[derive(Debug, Clone, TypedBuilder)]
pub struct DecodeOpts {
    /// Maximum number of ensembles to accept. Unbounded if not set.
    #[builder(default, setter(strip_option))]
    pub capacity: Option<usize>,
    #[builder(default)]
    pub reader: ReaderOpts,
}

impl Default for DecodeOpts {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Decodes input streams, in order, into one time series.
///
/// Recoverable problems, such as a truncated input or a short record, are logged and
/// skipped. Any error returned from [Decoder::decode] is fatal for the whole run.
///
/// # Example
/// ```
/// use ad2cp::{DecodeOpts, Decoder};
///
/// let mut decoder = Decoder::new(DecodeOpts::default());
/// let stats = decoder.decode(&b"not an ad2cp stream"[..]).unwrap();
/// assert_eq!(stats.total_frames(), 0);
/// assert_eq!(decoder.ensembles(), 0);
/// ```
#[derive(Debug)]
pub struct Decoder {
    opts: DecodeOpts,
    calibration: Calibration,
    series: SeriesAccumulator,
    time_range: Option<(f64, f64)>,
    last_stats: FrameStats,
}

impl Decoder {
    #[must_use]
    pub fn new(opts: DecodeOpts) -> Self {
        Decoder {
            series: SeriesAccumulator::with_capacity(opts.capacity),
            calibration: Calibration::default(),
            opts,
            time_range: None,
            last_stats: FrameStats::default(),
        }
    }

    /// Decode all frames from `reader`, returning the frame statistics for this input.
    ///
    /// A stream that ends inside a frame is not an error; the frames before it are kept
    /// and the truncation is reported in the returned stats.
    ///
    /// # Errors
    /// * [Error::CalibrationMismatch] if an embedded transform matrix is unknown or does
    ///   not agree with an ensemble's beam configuration
    /// * [Error::InconsistentEnsembleFamily], [Error::LayoutChanged], or
    ///   [Error::CapacityExceeded] from [SeriesAccumulator::append]
    /// * [Error::Io] on read errors
    ///
    /// The frame statistics up to the failure remain available from
    /// [Decoder::last_stats].
    pub fn decode<R: Read>(&mut self, reader: R) -> Result<FrameStats> {
        let before = self.series.len();
        let mut frames = FrameReader::with_opts(reader, self.opts.reader.clone());
        let zult = self.drain(&mut frames);
        self.last_stats = frames.into_stats();
        zult?;

        let stats = self.last_stats.clone();
        info!(
            frames = stats.total_frames(),
            ensembles = self.series.len() - before,
            skipped_bytes = stats.skipped_bytes,
            checksum_failures = stats.checksum_failures,
            truncated = stats.truncated,
            "decoded input"
        );
        Ok(stats)
    }

    fn drain<R: Read>(&mut self, frames: &mut FrameReader<R>) -> Result<()> {
        loop {
            let frame = match frames.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(Error::Truncated { wanted, got }) => {
                    warn!(
                        offset = frames.offset(),
                        "input truncated, wanted {wanted} bytes but got {got}"
                    );
                    break;
                }
                Err(err) => return Err(err),
            };
            self.handle(&frame)?;
        }
        Ok(())
    }

    fn handle(&mut self, frame: &Frame) -> Result<()> {
        let record = match Record::decode(frame) {
            Ok(record) => record,
            Err(err @ Error::NotEnoughData { .. }) => {
                warn!(id = frame.id, "skipping record: {err}");
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        match record {
            Record::Transform(TransformString::Matrix(m)) => {
                self.calibration.assert_matrix(&m)?;
            }
            Record::Transform(TransformString::Malformed(line)) => {
                warn!("malformed {XFAVG_KEY} response ignored: {line:?}");
            }
            Record::Ensemble(ensemble) => self.append(&ensemble)?,
            Record::Ignored(id) => trace!(id, "ignoring record"),
        }
        Ok(())
    }

    fn append(&mut self, ensemble: &Ensemble) -> Result<()> {
        let hdr = &ensemble.header;
        if hdr.error != 0 {
            debug!(
                error = hdr.error,
                counter = hdr.ensemble_counter,
                "instrument reported error"
            );
        }
        let transform = self
            .calibration
            .transform(hdr.beam_config, hdr.layout.beams())?;
        debug!(kind = ?ensemble.kind, ?transform, "selected transform");
        self.series.append(ensemble, transform)?;

        self.time_range = Some(match self.time_range {
            None => (hdr.time, hdr.time),
            Some((first, _)) => (first, hdr.time),
        });
        Ok(())
    }

    /// Number of ensembles accumulated so far, over all inputs.
    #[must_use]
    pub fn ensembles(&self) -> usize {
        self.series.len()
    }

    /// Times of the first and last accumulated ensembles, UNIX seconds.
    #[must_use]
    pub fn time_range(&self) -> Option<(f64, f64)> {
        self.time_range
    }

    /// Frame statistics of the most recent input passed to [Decoder::decode], including
    /// one that failed.
    #[must_use]
    pub fn last_stats(&self) -> &FrameStats {
        &self.last_stats
    }

    /// Transform matrix asserted by the configuration strings seen so far.
    #[must_use]
    pub fn asserted_matrix(&self) -> Option<KnownMatrix> {
        self.calibration.asserted()
    }

    #[must_use]
    pub fn family(&self) -> Option<Family> {
        self.series.family()
    }

    /// `(beams, cells)` of the accumulated ensembles.
    #[must_use]
    pub fn layout(&self) -> Option<(usize, usize)> {
        self.series.layout()
    }

    /// End the run, draining the time series into output arrays.
    #[must_use]
    pub fn finish(self) -> Vec<NamedArray> {
        self.series.into_arrays()
    }
}

/// Decode all `inputs`, in order, and write the resulting arrays to `writer`.
///
/// Nothing is written unless all inputs decode without a fatal error.
///
/// # Errors
/// Any error from [Decoder::decode] or from writing the container.
pub fn convert<I, R, W>(inputs: I, opts: DecodeOpts, writer: W) -> Result<W>
where
    I: IntoIterator<Item = R>,
    R: Read,
    W: Write,
{
    let mut decoder = Decoder::new(opts);
    for input in inputs {
        decoder.decode(input)?;
    }
    write_arrays(writer, decoder.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ID_STRING;

    fn string_frame(text: &str) -> Vec<u8> {
        Frame::new(ID_STRING, 0x10, text.as_bytes().to_vec()).encode()
    }

    #[test]
    fn known_matrix_is_accepted() {
        let dat = string_frame(
            "GETXFAVG,ROWS=3,COLS=3,M11=1.3564,M12=-0.5056,M13=-0.5056,M21=0.0000,\
             M22=-1.1831,M23=1.1831,M31=0.0000,M32=0.5518,M33=0.5518\r\n",
        );
        let mut decoder = Decoder::new(DecodeOpts::default());
        let stats = decoder.decode(&dat[..]).unwrap();
        assert_eq!(stats.frames.get(&ID_STRING), Some(&1));
        assert_eq!(decoder.ensembles(), 0);
    }

    #[test]
    fn unknown_matrix_is_fatal() {
        let dat = string_frame(
            "GETXFAVG,ROWS=3,COLS=3,M11=9.9,M12=-0.5056,M13=-0.5056,M21=0.0000,\
             M22=-1.1831,M23=1.1831,M31=0.0000,M32=0.5518,M33=0.5518\r\n",
        );
        let zult = convert([&dat[..]], DecodeOpts::default(), Vec::new());
        assert!(matches!(zult, Err(Error::CalibrationMismatch(_))));
    }

    const BEAM_124_LINE: &str = "GETXFAVG,ROWS=3,COLS=3,M11=1.3564,M12=-0.5056,M13=-0.5056,\
        M21=0.0000,M22=-1.1831,M23=1.1831,M31=0.0000,M32=0.5518,M33=0.5518\r\n";

    #[test]
    fn malformed_matrix_is_ignored() {
        let dat = string_frame("GETXFAVG,ROWS=3,COLS=3,M11=1.0,M12=oops\r\n");
        let mut decoder = Decoder::new(DecodeOpts::default());
        decoder.decode(&dat[..]).unwrap();
        assert_eq!(decoder.asserted_matrix(), None);
    }

    #[test]
    fn malformed_matrix_keeps_asserted_calibration() {
        let mut dat = string_frame(BEAM_124_LINE);
        dat.extend(string_frame("GETXFAVG,ROWS=3,COLS=3,M11=1.0,M12=oops\r\n"));
        let mut decoder = Decoder::new(DecodeOpts::default());
        decoder.decode(&dat[..]).unwrap();
        assert_eq!(decoder.asserted_matrix(), Some(KnownMatrix::Beam124));
        assert_eq!(decoder.last_stats().frames.get(&ID_STRING), Some(&2));
    }

    #[test]
    fn stats_survive_fatal_error() {
        let mut dat = string_frame("GETCLOCKSTR,TIME=\"2020-01-01\"\r\n");
        dat.extend(string_frame(
            "GETXFAVG,ROWS=3,COLS=3,M11=9.9,M12=-0.5056,M13=-0.5056,M21=0.0000,\
             M22=-1.1831,M23=1.1831,M31=0.0000,M32=0.5518,M33=0.5518\r\n",
        ));
        let mut decoder = Decoder::new(DecodeOpts::default());
        assert!(matches!(
            decoder.decode(&dat[..]),
            Err(Error::CalibrationMismatch(_))
        ));
        assert_eq!(decoder.last_stats().frames.get(&ID_STRING), Some(&2));
        assert_eq!(decoder.asserted_matrix(), None);
    }

    #[test]
    fn truncated_input_is_not_an_error() {
        let dat = string_frame("GETCLOCKSTR,TIME=\"2020-01-01\"\r\n");
        let mut decoder = Decoder::new(DecodeOpts::default());
        let stats = decoder.decode(&dat[..dat.len() - 3]).unwrap();
        assert!(stats.truncated);
        assert_eq!(stats.total_frames(), 0);
    }

    #[test]
    fn opts_builder() {
        let opts = DecodeOpts::builder()
            .capacity(10)
            .reader(ReaderOpts::builder().verify_checksums(true).build())
            .build();
        assert_eq!(opts.capacity, Some(10));
        assert!(opts.reader.verify_checksums);
        assert_eq!(DecodeOpts::default().capacity, None);
    }
}
