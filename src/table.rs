use csv::{ReaderBuilder, Trim};
use std::path::Path;

use crate::error::PipelineError;

pub const DEFAULT_DELIMITER: u8 = b',';

/// An untyped delimited table as uploaded by the user.
///
/// Cells are trimmed; blank cells are stored as `None` so that "absent" is
/// never confused with an empty string further down the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

/// Decodes bytes as UTF-8, falling back to Latin-1 when they are not valid UTF-8.
pub fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => {
            log::warn!("Input is not valid UTF-8, decoding as Latin-1");
            // Latin-1 maps every byte to the code point of the same value.
            bytes.iter().map(|&b| b as char).collect()
        }
    }
}

fn to_cell(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

impl RawTable {
    pub fn from_bytes(bytes: &[u8], delimiter: u8) -> Result<Self, PipelineError> {
        let text = decode_text(bytes);
        let text = text.strip_prefix('\u{feff}').unwrap_or(&text);

        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(Trim::All)
            .delimiter(delimiter)
            .from_reader(text.as_bytes());

        let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.trim().to_string()).collect();
        if headers.iter().all(|h| h.is_empty()) {
            return Err(PipelineError::InputUnavailable(
                "table has no header row".to_string(),
            ));
        }

        let mut rows = Vec::new();
        for result in rdr.records() {
            let record = result?;
            let mut row: Vec<Option<String>> = record.iter().map(to_cell).collect();
            row.resize(headers.len(), None);
            rows.push(row);
        }

        Ok(Self { headers, rows })
    }

    pub fn from_path(path: &Path, delimiter: u8) -> Result<Self, PipelineError> {
        if !path.exists() {
            return Err(PipelineError::InputUnavailable(format!(
                "file not found at {:?}",
                path
            )));
        }
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes, delimiter)
    }

    pub fn column_index(&self, name: &str) -> Result<usize, PipelineError> {
        let name = name.trim();
        self.headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| {
                PipelineError::SchemaMismatch(format!(
                    "column '{}' not found (available: {})",
                    name,
                    self.headers.join(", ")
                ))
            })
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .and_then(|c| c.as_deref())
    }

    pub fn is_column_empty(&self, col: usize) -> bool {
        self.rows
            .iter()
            .all(|row| row.get(col).map_or(true, |c| c.is_none()))
    }

    /// Removes every column whose cells are all blank. Returns the number removed.
    pub fn drop_empty_columns(&mut self) -> usize {
        let keep: Vec<bool> = (0..self.headers.len())
            .map(|col| !self.is_column_empty(col))
            .collect();
        let removed = keep.iter().filter(|k| !**k).count();
        if removed == 0 {
            return 0;
        }

        let mut flags = keep.iter();
        self.headers.retain(|_| *flags.next().unwrap_or(&true));
        for row in &mut self.rows {
            let mut flags = keep.iter();
            row.retain(|_| *flags.next().unwrap_or(&true));
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
