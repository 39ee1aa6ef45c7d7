use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::{Path, PathBuf},
};

use ad2cp::{mat::write_arrays, DecodeOpts, Decoder};
use anyhow::{bail, Context, Result};
use tempfile::NamedTempFile;
use tracing::info;

pub fn convert(inputs: &[PathBuf], output: &Path, clobber: bool, opts: DecodeOpts) -> Result<()> {
    if !clobber && output.exists() {
        bail!("{output:?} exists; use --clobber");
    }

    let mut decoder = Decoder::new(opts);
    for input in inputs {
        info!("decoding {input:?}");
        let src = File::open(input).with_context(|| format!("opening input {input:?}"))?;
        decoder
            .decode(BufReader::new(src))
            .with_context(|| format!("decoding {input:?}"))?;
    }
    if decoder.ensembles() == 0 {
        bail!("no ensembles found in inputs; nothing written");
    }
    info!(
        "writing {} ensembles ({}) to {output:?}",
        decoder.ensembles(),
        decoder
            .family()
            .map(|f| f.to_string())
            .unwrap_or_default()
    );

    // Staged in the destination directory and persisted only once fully written.
    let dir = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let staged = NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to create temporary output in {dir:?}"))?;
    write_arrays(BufWriter::new(staged.as_file()), decoder.finish())
        .context("writing arrays")?;
    staged
        .persist(output)
        .with_context(|| format!("failed to create output {output:?}"))?;
    Ok(())
}
