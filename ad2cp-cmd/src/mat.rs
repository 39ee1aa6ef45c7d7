use std::{
    fs::File,
    io::{stdout, BufReader, Write},
    path::Path,
};

use ad2cp::mat::{read_arrays, ElementKind};
use anyhow::{Context, Result};

fn kind_name(kind: ElementKind) -> &'static str {
    match kind {
        ElementKind::Float64 => "f64",
        ElementKind::Int16 => "i16",
        ElementKind::UInt16 => "u16",
    }
}

pub fn list(fpath: &Path) -> Result<()> {
    let src = File::open(fpath).context("opening input")?;
    let arrays = read_arrays(BufReader::new(src)).context("reading MAT file")?;

    let mut out = stdout().lock();
    writeln!(out, "{:<16} {:<5} {:>8} {:>8}", "Name", "Type", "Rows", "Cols")?;
    for array in &arrays {
        let (rows, cols) = array.dim();
        writeln!(
            out,
            "{:<16} {:<5} {:>8} {:>8}",
            array.name,
            kind_name(array.kind()),
            rows,
            cols
        )?;
    }
    Ok(())
}
