//! `GETXFAVG` transform matrix embedded in configuration string records.
use crate::calibration::Matrix;

/// Key of the command response carrying the average mode transform matrix.
pub const XFAVG_KEY: &str = "GETXFAVG";

const XFAVG_DIMS: &str = ",ROWS=3,COLS=3";
const ELEMENT_NAMES: [&str; 9] = [
    "M11", "M12", "M13", "M21", "M22", "M23", "M31", "M32", "M33",
];

/// Result of looking for a transform matrix in a configuration string.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformString {
    /// All nine elements, row-major.
    Matrix(Matrix),
    /// The key was present but fewer than nine elements could be parsed. Contains the
    /// offending line.
    Malformed(String),
}

/// Search a configuration string payload for the `GETXFAVG` response.
///
/// The text is only considered up to the first NUL. Returns `None` if the key is absent.
#[must_use]
pub fn find_transform(payload: &[u8]) -> Option<TransformString> {
    let text = String::from_utf8_lossy(payload);
    let text = text.split('\0').next().unwrap_or_default();
    let start = text.find(XFAVG_KEY)?;
    let line = text[start..].lines().next().unwrap_or_default();

    let values = parse_elements(&line[XFAVG_KEY.len()..]);
    if values.len() != ELEMENT_NAMES.len() {
        return Some(TransformString::Malformed(line.to_string()));
    }

    let mut matrix = [[0.0; 3]; 3];
    for (i, v) in values.into_iter().enumerate() {
        matrix[i / 3][i % 3] = v;
    }
    Some(TransformString::Matrix(matrix))
}

// Parse elements in order, stopping at the first one that does not match.
fn parse_elements(s: &str) -> Vec<f64> {
    let mut values = Vec::with_capacity(ELEMENT_NAMES.len());
    let Some(mut rest) = s.strip_prefix(XFAVG_DIMS) else {
        return values;
    };
    for name in ELEMENT_NAMES {
        let Some(r) = rest
            .strip_prefix(',')
            .and_then(|r| r.strip_prefix(name))
            .and_then(|r| r.strip_prefix('='))
        else {
            break;
        };
        let r = r.trim_start();
        let end = r
            .find(|c: char| !(c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E')))
            .unwrap_or(r.len());
        let Ok(v) = r[..end].parse::<f64>() else {
            break;
        };
        values.push(v);
        rest = &r[end..];
    }
    values
}
