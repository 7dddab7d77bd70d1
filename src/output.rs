use anyhow::{Context, Result};
use csv::Writer;
use serde::Serialize;
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::aggregator::AggregateTable;
use crate::join::JoinResult;
use crate::pipeline::PipelineOutput;

pub const UNMATCHED_FILE: &str = "unmatched_food_codes.csv";
pub const DETAILS_FILE: &str = "joined_details.csv";

/// Plain decimal rendering, independent of locale.
pub fn format_number(value: f64) -> String {
    format!("{}", value)
}

pub fn write_aggregate_csv<W: Write>(table: &AggregateTable, writer: W) -> Result<()> {
    let mut wtr = Writer::from_writer(writer);
    let header: Vec<&str> = table
        .key_columns
        .iter()
        .chain(&table.nutrient_names)
        .map(String::as_str)
        .collect();
    wtr.write_record(&header)?;

    for row in &table.rows {
        let record: Vec<String> = row
            .key
            .iter()
            .cloned()
            .chain(row.totals.iter().map(|v| format_number(*v)))
            .collect();
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_unmatched_csv<W: Write>(codes: &[String], writer: W) -> Result<()> {
    let mut wtr = Writer::from_writer(writer);
    wtr.write_record(["food_code"])?;
    for code in codes {
        wtr.write_record([code])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Per-row view of the join: identity, code, grams, matched name and the
/// scaled nutrients. Unmatched rows leave the nutrient cells blank.
pub fn write_details_csv<W: Write>(
    joined: &JoinResult,
    identity_columns: &[String],
    writer: W,
) -> Result<()> {
    let mut wtr = Writer::from_writer(writer);
    let mut header: Vec<String> = identity_columns.to_vec();
    header.extend(["food_code", "grams", "food_name", "matched"].map(String::from));
    header.extend(joined.nutrient_names.iter().cloned());
    wtr.write_record(&header)?;

    for row in &joined.rows {
        let mut record = row.record.identity.clone();
        record.push(row.record.food_code.clone());
        record.push(format_number(row.record.quantity_grams));
        record.push(row.food_name.clone().unwrap_or_default());
        record.push(row.is_matched().to_string());
        match &row.contributions {
            Some(values) => record.extend(values.iter().map(|v| format_number(*v))),
            None => record.extend(std::iter::repeat(String::new()).take(joined.nutrient_names.len())),
        }
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

/// File names for the result tables, in table order. Names that sanitise to
/// the same file (ignoring case) get `_2`, `_3`, ... so no table overwrites
/// another.
pub fn table_file_names(tables: &[AggregateTable]) -> Vec<String> {
    let mut taken = HashSet::new();
    tables
        .iter()
        .map(|table| {
            let base = sanitize(&table.name);
            let mut candidate = format!("{}_nutrition.csv", base);
            let mut n = 2;
            while !taken.insert(candidate.to_lowercase()) {
                candidate = format!("{}_{}_nutrition.csv", base, n);
                n += 1;
            }
            candidate
        })
        .collect()
}

fn create(path: &Path) -> Result<std::fs::File> {
    std::fs::File::create(path).with_context(|| format!("Failed to create output file {:?}", path))
}

/// Writes every result table into `dir`, returning the files written.
pub fn write_outputs(output: &PipelineOutput, dir: &Path, details: bool) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {:?}", dir))?;
    let mut written = Vec::new();

    for (table, name) in output.tables.iter().zip(table_file_names(&output.tables)) {
        let path = dir.join(name);
        write_aggregate_csv(table, create(&path)?)
            .with_context(|| format!("Failed to write {:?}", path))?;
        written.push(path);
    }

    if !output.unmatched_codes().is_empty() {
        let path = dir.join(UNMATCHED_FILE);
        write_unmatched_csv(output.unmatched_codes(), create(&path)?)
            .with_context(|| format!("Failed to write {:?}", path))?;
        written.push(path);
    }

    if details {
        let path = dir.join(DETAILS_FILE);
        write_details_csv(&output.joined, &output.identity_columns, create(&path)?)
            .with_context(|| format!("Failed to write {:?}", path))?;
        written.push(path);
    }

    for path in &written {
        log::info!("Wrote {:?}", path);
    }
    Ok(written)
}

#[derive(Debug, Serialize)]
pub struct TableSummary {
    pub name: String,
    pub file: String,
    pub groups: usize,
}

/// Machine-readable account of one run.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub consumption_records: usize,
    pub matched_records: usize,
    pub unmatched_records: usize,
    pub unmatched_codes: Vec<String>,
    pub nutrients: Vec<String>,
    pub tables: Vec<TableSummary>,
    pub warnings: Vec<String>,
}

impl RunSummary {
    pub fn from_output(output: &PipelineOutput) -> Self {
        let total = output.joined.rows.len();
        Self {
            consumption_records: total,
            matched_records: total - output.joined.unmatched_rows,
            unmatched_records: output.joined.unmatched_rows,
            unmatched_codes: output.unmatched_codes().to_vec(),
            nutrients: output.joined.nutrient_names.clone(),
            tables: output
                .tables
                .iter()
                .zip(table_file_names(&output.tables))
                .map(|(t, file)| TableSummary {
                    name: t.name.clone(),
                    file,
                    groups: t.rows.len(),
                })
                .collect(),
            warnings: output.warnings.clone(),
        }
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize run summary")?;
        std::fs::write(path, json).with_context(|| format!("Failed to write summary to {:?}", path))
    }
}
