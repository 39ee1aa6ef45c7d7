#![doc = include_str!("../README.md")]

mod error;
mod prelude;

pub mod calibration;
pub mod decode;
pub mod framing;
pub mod mat;
pub mod record;
pub mod series;
pub mod transform;

pub use decode::{convert, DecodeOpts, Decoder};
pub use error::{Error, Result};
