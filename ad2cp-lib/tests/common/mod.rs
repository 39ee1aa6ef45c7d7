#![allow(dead_code)]

use ad2cp::framing::Frame;
use ad2cp::record::{ID_AVERAGE, ID_ECHO, ID_STRING};

const HEADER_LEN: usize = 76;

/// Raw field values of a synthetic version 3 ensemble record.
#[derive(Debug, Clone)]
pub struct EnsembleSpec {
    pub id: u8,
    pub beams: u16,
    pub cells: u16,
    pub headconfig: u16,
    pub beam_config: u16,
    pub pressure: u32,
    pub heading: u16,
    pub velocity_scaling: i8,
    pub power_level: i8,
    /// year since 1900, 0-based month, day, hour, minute, second
    pub date: [u8; 6],
    pub hundred_micros: u16,
}

impl Default for EnsembleSpec {
    fn default() -> Self {
        EnsembleSpec {
            id: ID_AVERAGE,
            beams: 3,
            cells: 4,
            // pressure, temperature, compass, tilt, velocity, amplitude, correlation
            headconfig: 0b1110_1111,
            beam_config: 0x0421,
            pressure: 1000,
            heading: 1800,
            velocity_scaling: -3,
            power_level: 0,
            date: [121, 2, 14, 8, 0, 0],
            hundred_micros: 0,
        }
    }
}

impl EnsembleSpec {
    pub fn echo(cells: u16) -> Self {
        EnsembleSpec {
            id: ID_ECHO,
            beams: 1,
            cells,
            headconfig: 0b1000_0000_1111,
            beam_config: 0x0001,
            power_level: -3,
            ..Self::default()
        }
    }

    pub fn with_second(mut self, second: u8) -> Self {
        self.date[5] = second;
        self
    }

    pub fn payload(&self) -> Vec<u8> {
        let mut buf = vec![0u8; HEADER_LEN];
        buf[0] = 3;
        buf[1] = HEADER_LEN as u8;
        buf[2..4].copy_from_slice(&self.headconfig.to_le_bytes());
        buf[4..8].copy_from_slice(&100_234u32.to_le_bytes());
        buf[8..14].copy_from_slice(&self.date);
        buf[14..16].copy_from_slice(&self.hundred_micros.to_le_bytes());
        buf[16..18].copy_from_slice(&15_000u16.to_le_bytes());
        buf[18..20].copy_from_slice(&1_250i16.to_le_bytes());
        buf[20..24].copy_from_slice(&self.pressure.to_le_bytes());
        buf[24..26].copy_from_slice(&self.heading.to_le_bytes());
        let cell_field = if self.id == ID_ECHO {
            self.cells
        } else {
            self.cells | 2 << 10 | self.beams << 12
        };
        buf[30..32].copy_from_slice(&cell_field.to_le_bytes());
        buf[32..34].copy_from_slice(&1_000u16.to_le_bytes());
        buf[34..36].copy_from_slice(&50u16.to_le_bytes());
        buf[54..56].copy_from_slice(&self.beam_config.to_le_bytes());
        buf[58] = self.velocity_scaling as u8;
        buf[59] = self.power_level as u8;

        let n = usize::from(self.beams) * usize::from(self.cells);
        if self.id == ID_ECHO {
            for c in 0..self.cells {
                buf.extend((1_000 + c).to_le_bytes());
            }
        } else {
            for i in 0..n {
                buf.extend((i as i16 * 10).to_le_bytes());
            }
            if self.headconfig & 1 << 6 != 0 {
                buf.extend(vec![50u8; n]);
            }
            if self.headconfig & 1 << 7 != 0 {
                buf.extend(vec![90u8; n]);
            }
        }
        buf
    }

    pub fn encode(&self) -> Vec<u8> {
        Frame::new(self.id, 0x10, self.payload()).encode()
    }
}

/// Configuration string frame with a `GETXFAVG` response for `m`.
pub fn xfavg_frame(m: [[f64; 3]; 3]) -> Vec<u8> {
    let mut text = String::from("GETXFAVG,ROWS=3,COLS=3");
    for (i, row) in m.iter().enumerate() {
        for (j, v) in row.iter().enumerate() {
            text.push_str(&format!(",M{}{}={:.4}", i + 1, j + 1, v));
        }
    }
    text.push_str("\r\n");
    Frame::new(ID_STRING, 0x10, text.into_bytes()).encode()
}

/// Concatenate encoded frames into a stream.
pub fn stream<I: IntoIterator<Item = Vec<u8>>>(frames: I) -> Vec<u8> {
    frames.into_iter().flatten().collect()
}
