//! Newline-delimited JSON session files
//!
//! One record per line. Files ending in `.gz` are decompressed on the fly.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use flate2::read::GzDecoder;

use crate::error::{FusionError, Result};
use crate::types::{sort_by_timestamp, Record};

/// Parse records from `reader`, skipping blank lines, sorted by timestamp.
pub fn read_records<R: BufRead>(reader: R) -> Result<Vec<Record>> {
    let mut records = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: Record = serde_json::from_str(&line).map_err(|source| FusionError::Parse {
            line: idx + 1,
            source,
        })?;
        records.push(record);
    }
    sort_by_timestamp(&mut records);
    Ok(records)
}

pub fn load_records(path: &Path) -> Result<Vec<Record>> {
    let file = File::open(path)?;
    if path.extension().map(|e| e == "gz").unwrap_or(false) {
        read_records(BufReader::new(GzDecoder::new(file)))
    } else {
        read_records(BufReader::new(file))
    }
}

pub fn write_records<W: Write>(writer: W, records: &[Record]) -> Result<()> {
    let mut writer = BufWriter::new(writer);
    for record in records {
        serde_json::to_writer(&mut writer, record).map_err(std::io::Error::from)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

pub fn save_records(path: &Path, records: &[Record]) -> Result<()> {
    write_records(File::create(path)?, records)
}
