//! Reading exports into a [`RawTable`] and writing rendered output.
//!
//! - **Delimiter resolution**: `.tsv` → tab, everything else comma, with a
//!   manual override.
//! - **Encoding**: an explicit label is honoured; otherwise input is decoded as
//!   UTF-8 and, when that fails, as Big5 (common for Traditional-Chinese
//!   exports). A byte-order mark selects its own encoding and is dropped.
//! - **stdin/stdout**: the `-` path convention routes through standard streams.

use std::{
    fs::File,
    io::{self, Read, Write},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use encoding_rs::{BIG5, Encoding, UTF_8};
use log::{debug, info, warn};

use crate::data::RawTable;

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn resolve_encoding(label: Option<&str>) -> Result<Option<&'static Encoding>> {
    label
        .map(|value| {
            Encoding::for_label(value.trim().as_bytes())
                .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
        })
        .transpose()
}

pub fn resolve_input_delimiter(path: &Path, provided: Option<u8>) -> u8 {
    provided.unwrap_or_else(|| match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_CSV_DELIMITER,
    })
}

fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    if is_dash(path) {
        io::stdin()
            .lock()
            .read_to_end(&mut bytes)
            .context("Reading input from stdin")?;
    } else {
        File::open(path)
            .with_context(|| format!("Opening input file {path:?}"))?
            .read_to_end(&mut bytes)
            .with_context(|| format!("Reading input file {path:?}"))?;
    }
    Ok(bytes)
}

/// Decodes `bytes` with `encoding`, or with UTF-8 falling back to Big5.
pub fn decode_text(bytes: &[u8], encoding: Option<&'static Encoding>) -> Result<String> {
    let candidates = match encoding {
        Some(encoding) => vec![encoding],
        None => vec![UTF_8, BIG5],
    };
    for candidate in candidates {
        let (text, used, had_errors) = candidate.decode(bytes);
        if !had_errors {
            debug!("Decoded input as {}", used.name());
            return Ok(text.into_owned());
        }
        debug!("Input is not valid {}", candidate.name());
    }
    Err(anyhow!(
        "Failed to decode input as {}",
        encoding.map(|e| e.name()).unwrap_or("UTF-8 or Big5")
    ))
}

pub fn parse_table(text: &str, delimiter: u8) -> Result<RawTable> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true)
        .from_reader(text.as_bytes());
    let headers = reader
        .headers()
        .context("Reading header row")?
        .iter()
        .map(str::to_string)
        .collect::<Vec<_>>();
    let rows = reader
        .records()
        .enumerate()
        .map(|(idx, record)| {
            record
                .map(|record| record.iter().map(str::to_string).collect::<Vec<_>>())
                .with_context(|| format!("Reading row {}", idx + 2))
        })
        .collect::<Result<Vec<_>>>()?;
    for (idx, row) in rows.iter().enumerate() {
        if row.len() > headers.len() {
            warn!(
                "Row {} has {} cell(s) for {} header(s); extra cells are ignored",
                idx + 2,
                row.len(),
                headers.len()
            );
        }
    }
    Ok(RawTable::new(headers, rows))
}

pub fn read_table(
    path: &Path,
    delimiter: u8,
    encoding: Option<&'static Encoding>,
) -> Result<RawTable> {
    let bytes = read_bytes(path)?;
    let text = decode_text(&bytes, encoding).with_context(|| format!("Decoding {path:?}"))?;
    let table = parse_table(&text, delimiter).with_context(|| format!("Parsing {path:?}"))?;
    info!(
        "Loaded {} row(s) x {} column(s) from {:?}",
        table.len(),
        table.headers.len(),
        path
    );
    Ok(table)
}

/// Writes `text` to `path` (stdout when absent or `-`) in `encoding`.
pub fn write_output(
    path: Option<&Path>,
    text: &str,
    encoding: Option<&'static Encoding>,
) -> Result<()> {
    let encoding = encoding.unwrap_or(UTF_8);
    let (encoded, _, had_errors) = encoding.encode(text);
    if had_errors {
        return Err(anyhow!(
            "Output contains characters not representable in {}",
            encoding.name()
        ));
    }
    match path {
        Some(p) if !is_dash(p) => {
            let mut file = File::create(p).with_context(|| format!("Creating output file {p:?}"))?;
            file.write_all(&encoded)
                .with_context(|| format!("Writing output file {p:?}"))?;
            file.flush().context("Flushing output")
        }
        _ => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(&encoded).context("Writing to stdout")?;
            stdout.flush().context("Flushing output")
        }
    }
}
