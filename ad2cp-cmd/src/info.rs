use std::{
    fs::File,
    io::{stdout, BufReader, Write},
    path::{Path, PathBuf},
};

use ad2cp::framing::{FrameStats, ReaderOpts};
use ad2cp::record::{Family, RecordKind, ID_STRING};
use ad2cp::{DecodeOpts, Decoder};
use anyhow::{Context, Result};
use handlebars::handlebars_helper;
use hifitime::Epoch;
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone)]
pub enum Format {
    Json,
    Text,
}

impl clap::ValueEnum for Format {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Json, Self::Text]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        match self {
            Self::Json => Some(clap::builder::PossibleValue::new("json")),
            Self::Text => Some(clap::builder::PossibleValue::new("text")),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct RecordCount {
    id: String,
    name: &'static str,
    count: usize,
}

#[derive(Debug, Clone, Serialize)]
struct Info {
    filename: String,
    records: Vec<RecordCount>,
    stats: FrameStats,
    ensembles: usize,
    family: Option<Family>,
    beams: Option<usize>,
    cells: Option<usize>,
    first_ensemble_time: Option<Epoch>,
    last_ensemble_time: Option<Epoch>,
    /// Fatal decode error, if any.
    error: Option<String>,
}

fn record_name(id: u8) -> &'static str {
    if id == ID_STRING {
        return "string";
    }
    match RecordKind::from_id(id) {
        Some(RecordKind::Burst) => "burst",
        Some(RecordKind::Average) => "average",
        Some(RecordKind::Echo) => "echo sounder",
        None => "",
    }
}

fn summarize(fpath: &Path, verify_checksums: bool) -> Result<Info> {
    let src = File::open(fpath).context("opening input")?;
    let opts = DecodeOpts::builder()
        .reader(
            ReaderOpts::builder()
                .verify_checksums(verify_checksums)
                .build(),
        )
        .build();
    let mut decoder = Decoder::new(opts);
    let (stats, error) = match decoder.decode(BufReader::new(src)) {
        Ok(stats) => (stats, None),
        Err(err) => {
            warn!("failed to decode {fpath:?}: {err}");
            (decoder.last_stats().clone(), Some(err.to_string()))
        }
    };

    let records = stats
        .frames
        .iter()
        .map(|(id, count)| RecordCount {
            id: format!("{id:#04x}"),
            name: record_name(*id),
            count: *count,
        })
        .collect();
    let (first, last) = decoder
        .time_range()
        .map(|(first, last)| {
            (
                Some(Epoch::from_unix_seconds(first)),
                Some(Epoch::from_unix_seconds(last)),
            )
        })
        .unwrap_or_default();

    Ok(Info {
        filename: fpath.to_string_lossy().to_string(),
        records,
        stats,
        ensembles: decoder.ensembles(),
        family: decoder.family(),
        beams: decoder.layout().map(|(beams, _)| beams),
        cells: decoder.layout().map(|(_, cells)| cells),
        first_ensemble_time: first,
        last_ensemble_time: last,
        error,
    })
}

pub fn info(inputs: &[PathBuf], format: &Format, verify_checksums: bool) -> Result<()> {
    let infos = inputs
        .iter()
        .map(|p| summarize(p, verify_checksums).with_context(|| format!("summarizing {p:?}")))
        .collect::<Result<Vec<_>>>()?;

    match format {
        Format::Json => {
            serde_json::to_writer_pretty(stdout(), &infos).context("serializing to json")
        }
        Format::Text => {
            let mut out = stdout().lock();
            for info in &infos {
                let data = render_text(info).context("serializing info")?;
                out.write_all(data.as_bytes()).context("writing to stdout")?;
            }
            Ok(())
        }
    }
}

fn render_text(info: &Info) -> Result<String> {
    handlebars_helper!(left_pad: |num: u64, v: Json| {
        let v = match v {
            serde_json::Value::String(s) => s.to_owned(),
            serde_json::Value::Null => String::new(),
            _ => v.to_string()
        };
        let num = usize::try_from(num).unwrap_or_default().max(v.len());
        format!("{v:>num$}")
    });
    let mut hb = handlebars::Handlebars::new();
    hb.register_helper("lpad", Box::new(left_pad));
    hb.register_template_string("info", TEXT_TEMPLATE)
        .context("compiling template")?;

    hb.render("info", &info).context("rendering text")
}

const TEXT_TEMPLATE: &str = r"{{ filename }}
========================================================================
First:      {{ first_ensemble_time }}
Last:       {{ last_ensemble_time }}
Ensembles:  {{ ensembles }} {{ family }}
Layout:     {{ beams }} beams x {{ cells }} cells
Skipped:    {{ stats.skipped_bytes }} bytes
Checksums:  {{ stats.checksum_failures }} failed
Truncated:  {{ stats.truncated }}
{{ #if error }}Error:      {{ error }}
{{ /if }}------------------------------------------------------------------------
    ID            Name       Count
------------------------------------------------------------------------
{{ #each records }}{{ lpad 6 id }}  {{ lpad 14 name }}  {{ lpad 10 count }}
{{/each }}
";
