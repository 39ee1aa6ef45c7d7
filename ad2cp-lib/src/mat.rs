//! MATLAB level-4 MAT file encoding.
//!
//! A level-4 file is a sequence of arrays, each written as:
//!
//! | size | field |
//! |---|---|
//! | 4 | type, `M*1000 + O*100 + P*10 + T` |
//! | 4 | number of rows |
//! | 4 | number of columns |
//! | 4 | imaginary flag, always 0 here |
//! | 4 | name length including the terminating NUL |
//! | namlen | name |
//! | rows*cols*width | real part, column-major |
//!
//! where `M` is the machine byte order (0 little-endian, 1 big-endian), `O` is
//! always 0, `P` the element precision, and `T` 0 for a full numeric matrix. All
//! integers and elements are in the byte order given by `M`, which for written
//! files is that of the host.
use std::io::{Read, Write};

use ndarray::{Array1, Array2, Axis, ShapeBuilder};

use crate::prelude::*;

/// Element precision of an array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Float64,
    Int16,
    UInt16,
}

impl ElementKind {
    /// `P` digit of the type tag.
    #[must_use]
    pub fn precision(self) -> i32 {
        match self {
            ElementKind::Float64 => 0,
            ElementKind::Int16 => 3,
            ElementKind::UInt16 => 4,
        }
    }

    #[must_use]
    pub fn from_precision(p: i32) -> Option<Self> {
        match p {
            0 => Some(ElementKind::Float64),
            3 => Some(ElementKind::Int16),
            4 => Some(ElementKind::UInt16),
            _ => None,
        }
    }

    /// Element width in bytes.
    #[must_use]
    pub fn width(self) -> usize {
        match self {
            ElementKind::Float64 => 8,
            ElementKind::Int16 | ElementKind::UInt16 => 2,
        }
    }
}

/// Array element data.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    Float64(Array2<f64>),
    Int16(Array2<i16>),
    UInt16(Array2<u16>),
}

impl From<Array2<f64>> for ArrayData {
    fn from(a: Array2<f64>) -> Self {
        ArrayData::Float64(a)
    }
}

impl From<Array2<i16>> for ArrayData {
    fn from(a: Array2<i16>) -> Self {
        ArrayData::Int16(a)
    }
}

impl From<Array2<u16>> for ArrayData {
    fn from(a: Array2<u16>) -> Self {
        ArrayData::UInt16(a)
    }
}

/// A named 2-D array. Vectors are `n x 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedArray {
    pub name: String,
    pub data: ArrayData,
}

impl NamedArray {
    pub fn new<D: Into<ArrayData>>(name: &str, data: D) -> Self {
        NamedArray {
            name: name.to_string(),
            data: data.into(),
        }
    }

    /// Column vector from `dat`.
    pub fn vector<T>(name: &str, dat: Vec<T>) -> Self
    where
        Array2<T>: Into<ArrayData>,
    {
        Self::new(name, Array1::from(dat).insert_axis(Axis(1)))
    }

    /// 1x1 array.
    #[must_use]
    pub fn scalar(name: &str, x: f64) -> Self {
        Self::vector(name, vec![x])
    }

    #[must_use]
    pub fn kind(&self) -> ElementKind {
        match self.data {
            ArrayData::Float64(_) => ElementKind::Float64,
            ArrayData::Int16(_) => ElementKind::Int16,
            ArrayData::UInt16(_) => ElementKind::UInt16,
        }
    }

    /// `(rows, cols)`
    #[must_use]
    pub fn dim(&self) -> (usize, usize) {
        match &self.data {
            ArrayData::Float64(a) => a.dim(),
            ArrayData::Int16(a) => a.dim(),
            ArrayData::UInt16(a) => a.dim(),
        }
    }
}

/// `M` digit of the type tag for this host.
#[must_use]
pub fn host_machine() -> i32 {
    if cfg!(target_endian = "big") {
        1
    } else {
        0
    }
}

/// Full type tag for `kind` on this host.
#[must_use]
pub fn type_tag(kind: ElementKind) -> i32 {
    host_machine() * 1000 + kind.precision() * 10
}

fn dim_to_i32(n: usize) -> Result<i32> {
    i32::try_from(n).map_err(|_| Error::Container(format!("dimension {n} too large")))
}

/// Sequential level-4 writer.
///
/// # Example
/// ```
/// use ad2cp::mat::{MatWriter, NamedArray};
///
/// let mut w = MatWriter::new(Vec::new());
/// w.write(NamedArray::vector("pressure", vec![1.0, 1.5])).unwrap();
/// w.write(NamedArray::scalar("cellSize", 2.0)).unwrap();
/// let buf = w.finish().unwrap();
/// // two headers, two 9 byte names, three doubles
/// assert_eq!(buf.len(), 2 * 20 + 2 * 9 + 3 * 8);
/// ```
pub struct MatWriter<W>
where
    W: Write,
{
    writer: W,
}

impl<W> MatWriter<W>
where
    W: Write,
{
    pub fn new(writer: W) -> Self {
        MatWriter { writer }
    }

    /// Write a single array.
    ///
    /// # Errors
    /// On I/O errors or if a dimension or name does not fit in the header.
    pub fn write(&mut self, array: NamedArray) -> Result<()> {
        let kind = array.kind();
        let (rows, cols) = array.dim();
        let NamedArray { name, data } = array;
        let mut name = name.into_bytes();
        name.push(0);

        let header = [
            type_tag(kind),
            dim_to_i32(rows)?,
            dim_to_i32(cols)?,
            0,
            dim_to_i32(name.len())?,
        ];
        let mut buf = Vec::with_capacity(20 + name.len() + rows * cols * kind.width());
        for x in header {
            buf.extend_from_slice(&x.to_ne_bytes());
        }
        buf.extend_from_slice(&name);

        // transpose so logical iteration order is column-major
        match &data {
            ArrayData::Float64(a) => a.t().iter().for_each(|x| buf.extend(x.to_ne_bytes())),
            ArrayData::Int16(a) => a.t().iter().for_each(|x| buf.extend(x.to_ne_bytes())),
            ArrayData::UInt16(a) => a.t().iter().for_each(|x| buf.extend(x.to_ne_bytes())),
        }
        self.writer.write_all(&buf)?;
        Ok(())
    }

    /// Flush and return the underlying writer. No more arrays can be written.
    ///
    /// # Errors
    /// If flushing fails.
    pub fn finish(mut self) -> Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

/// Write all `arrays`, in order, and finish the container.
///
/// # Errors
/// See [MatWriter::write].
pub fn write_arrays<W, I>(writer: W, arrays: I) -> Result<W>
where
    W: Write,
    I: IntoIterator<Item = NamedArray>,
{
    let mut w = MatWriter::new(writer);
    for array in arrays {
        w.write(array)?;
    }
    w.finish()
}

// Fill `buf` completely, returning false on a clean EOF before any bytes are read.
fn read_full<R: Read>(r: &mut R, buf: &mut [u8]) -> Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => {
                return Err(Error::Truncated {
                    wanted: buf.len(),
                    got: filled,
                })
            }
            Ok(n) => filled += n,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        }
    }
    Ok(true)
}

// Read exactly `len` bytes. The buffer grows with the data actually read, so a bogus
// length in a header cannot force a large allocation.
fn read_exact<R: Read>(r: &mut R, len: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::default();
    r.take(u64::try_from(len).unwrap_or(u64::MAX))
        .read_to_end(&mut buf)?;
    if buf.len() < len {
        return Err(Error::Truncated {
            wanted: len,
            got: buf.len(),
        });
    }
    Ok(buf)
}

fn elements<T, const N: usize>(dat: &[u8], conv: fn([u8; N]) -> T) -> Vec<T> {
    dat.chunks_exact(N)
        .map(|c| {
            let mut b = [0u8; N];
            b.copy_from_slice(c);
            conv(b)
        })
        .collect()
}

fn column_major<T>(rows: usize, cols: usize, dat: Vec<T>) -> Result<Array2<T>> {
    Array2::from_shape_vec((rows, cols).f(), dat).map_err(|e| Error::Container(e.to_string()))
}

/// Read all arrays from a level-4 container, written on a host of either byte order.
///
/// # Errors
/// [Error::Container] for unsupported types or invalid headers and [Error::Truncated]
/// if the data ends inside an array.
pub fn read_arrays<R: Read>(mut reader: R) -> Result<Vec<NamedArray>> {
    let mut arrays = Vec::default();
    loop {
        let mut hdr = [0u8; 20];
        if !read_full(&mut reader, &mut hdr)? {
            return Ok(arrays);
        }

        let word = |i: usize, big: bool| {
            let b = [hdr[i * 4], hdr[i * 4 + 1], hdr[i * 4 + 2], hdr[i * 4 + 3]];
            if big {
                i32::from_be_bytes(b)
            } else {
                i32::from_le_bytes(b)
            }
        };
        let big = match (word(0, false), word(0, true)) {
            (tag, _) if (0..1000).contains(&tag) => false,
            (_, tag) if (1000..2000).contains(&tag) => true,
            (tag, _) => return Err(Error::Container(format!("invalid type {tag}"))),
        };
        let tag = word(0, big) % 1000;
        if tag / 100 != 0 || tag % 10 != 0 {
            return Err(Error::Container(format!("unsupported type {tag}")));
        }
        let Some(kind) = ElementKind::from_precision(tag / 10) else {
            return Err(Error::Container(format!("unsupported precision in type {tag}")));
        };
        if word(3, big) != 0 {
            return Err(Error::Container("complex arrays not supported".to_string()));
        }
        let dims = [word(1, big), word(2, big), word(4, big)];
        let [rows, cols, namlen] = dims.map(|d| usize::try_from(d).unwrap_or(usize::MAX));
        if rows == usize::MAX || cols == usize::MAX || namlen == usize::MAX {
            return Err(Error::Container(format!("invalid dimensions {dims:?}")));
        }

        let name = read_exact(&mut reader, namlen)?;
        let name = String::from_utf8_lossy(&name)
            .trim_end_matches('\0')
            .to_string();

        let len = rows
            .checked_mul(cols)
            .and_then(|n| n.checked_mul(kind.width()))
            .ok_or_else(|| Error::Container(format!("invalid dimensions {dims:?}")))?;
        let dat = read_exact(&mut reader, len)?;
        let data: ArrayData = match (kind, big) {
            (ElementKind::Float64, false) => {
                column_major(rows, cols, elements(&dat, f64::from_le_bytes))?.into()
            }
            (ElementKind::Float64, true) => {
                column_major(rows, cols, elements(&dat, f64::from_be_bytes))?.into()
            }
            (ElementKind::Int16, false) => {
                column_major(rows, cols, elements(&dat, i16::from_le_bytes))?.into()
            }
            (ElementKind::Int16, true) => {
                column_major(rows, cols, elements(&dat, i16::from_be_bytes))?.into()
            }
            (ElementKind::UInt16, false) => {
                column_major(rows, cols, elements(&dat, u16::from_le_bytes))?.into()
            }
            (ElementKind::UInt16, true) => {
                column_major(rows, cols, elements(&dat, u16::from_be_bytes))?.into()
            }
        };
        arrays.push(NamedArray { name, data });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn words(buf: &[u8]) -> Vec<i32> {
        buf.chunks_exact(4)
            .map(|c| i32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    #[test]
    fn header_layout() {
        let buf = write_arrays(
            Vec::new(),
            [NamedArray::new("vel1", array![[1.0f64, 2.0, 3.0], [4.0, 5.0, 6.0]])],
        )
        .unwrap();

        assert_eq!(words(&buf[..20]), vec![host_machine() * 1000, 2, 3, 0, 5]);
        assert_eq!(&buf[20..25], b"vel1\0");
        let vals: Vec<f64> = buf[25..]
            .chunks_exact(8)
            .map(|c| f64::from_ne_bytes(c.try_into().unwrap()))
            .collect();
        assert_eq!(vals, vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0], "must be column-major");
    }

    #[test]
    fn int_type_tags() {
        assert_eq!(type_tag(ElementKind::Int16) % 1000, 30);
        assert_eq!(type_tag(ElementKind::UInt16) % 1000, 40);
        assert_eq!(type_tag(ElementKind::Float64) % 1000, 0);
        if cfg!(target_endian = "little") {
            assert_eq!(type_tag(ElementKind::Int16), 30);
        }
    }

    #[test]
    fn orientation_does_not_change_output() {
        let a = array![[1i16, 2], [3, 4], [5, 6]];
        let mut f = Array2::<i16>::zeros((3, 2).f());
        f.assign(&a);
        let x = write_arrays(Vec::new(), [NamedArray::new("a", a)]).unwrap();
        let y = write_arrays(Vec::new(), [NamedArray::new("a", f)]).unwrap();
        assert_eq!(x, y);
    }

    #[test]
    fn round_trip() {
        let arrays = vec![
            NamedArray::new("velX", array![[0.5f64, -1.25], [3.0, 1e-9], [7.0, 8.0]]),
            NamedArray::new("amp1", array![[1i16, -2, 3]]),
            NamedArray::vector("echo", vec![0u16, 65535, 12]),
            NamedArray::scalar("blanking", 0.1),
            NamedArray::vector::<f64>("empty", vec![]),
        ];
        let buf = write_arrays(Vec::new(), arrays.clone()).unwrap();
        let got = read_arrays(&buf[..]).unwrap();
        assert_eq!(got, arrays);
        assert_eq!(got[0].dim(), (3, 2));
        assert_eq!(got[2].kind(), ElementKind::UInt16);
        assert_eq!(got[4].dim(), (0, 1));
    }

    #[test]
    fn read_big_endian() {
        let mut buf = Vec::new();
        for x in [1030i32, 1, 2, 0, 2] {
            buf.extend(x.to_be_bytes());
        }
        buf.extend(b"a\0");
        buf.extend(258i16.to_be_bytes());
        buf.extend((-1i16).to_be_bytes());

        let got = read_arrays(&buf[..]).unwrap();
        assert_eq!(got, vec![NamedArray::new("a", array![[258i16, -1]])]);
    }

    #[test]
    fn read_truncated() {
        let buf = write_arrays(Vec::new(), [NamedArray::vector("x", vec![1.0f64, 2.0])]).unwrap();
        assert!(matches!(
            read_arrays(&buf[..buf.len() - 1]),
            Err(Error::Truncated { .. })
        ));
    }

    #[test]
    fn read_unsupported_precision() {
        let mut buf = Vec::new();
        for x in [10i32, 1, 1, 0, 2] {
            buf.extend(x.to_le_bytes());
        }
        buf.extend(b"a\0");
        buf.extend(1.0f32.to_le_bytes());
        assert!(matches!(read_arrays(&buf[..]), Err(Error::Container(_))));
    }

    fn header(words: [i32; 5], name: &[u8]) -> Vec<u8> {
        let mut buf: Vec<u8> = words.iter().flat_map(|x| x.to_le_bytes()).collect();
        buf.extend(name);
        buf
    }

    #[test]
    fn read_size_overflow() {
        // i32::MAX * i32::MAX doubles overflow the byte count
        let buf = header([0, i32::MAX, i32::MAX, 0, 2], b"a\0");
        let zult = read_arrays(&buf[..]);
        assert!(matches!(zult, Err(Error::Container(_))), "{zult:?}");
    }

    #[test]
    fn read_huge_name_length() {
        let buf = header([30, 1, 1, 0, i32::MAX], b"a\0");
        assert!(matches!(
            read_arrays(&buf[..]),
            Err(Error::Truncated { wanted, got: 2 }) if wanted == i32::MAX as usize
        ));
    }

    #[test]
    fn read_huge_row_count() {
        let mut buf = header([30, 1 << 30, 4, 0, 2], b"a\0");
        buf.extend(1i16.to_le_bytes());
        assert!(matches!(
            read_arrays(&buf[..]),
            Err(Error::Truncated { got: 2, .. }) | Err(Error::Container(_))
        ));
    }
}
