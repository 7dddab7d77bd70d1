use serde::Serialize;

use crate::error::PipelineError;
use crate::join::normalize_code;
use crate::normalizer::normalize_wide;
use crate::table::RawTable;

/// Which columns of the uploaded table play which role.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ConsumptionLayout {
    /// One food and quantity per row.
    Narrow {
        identity_columns: Vec<String>,
        food_code_column: String,
        quantity_column: String,
    },
    /// Repeated (food code, quantity) column pairs per row, matched by position.
    Wide {
        identity_columns: Vec<String>,
        food_code_columns: Vec<String>,
        quantity_columns: Vec<String>,
    },
}

impl ConsumptionLayout {
    pub fn identity_columns(&self) -> &[String] {
        match self {
            ConsumptionLayout::Narrow { identity_columns, .. } => identity_columns,
            ConsumptionLayout::Wide { identity_columns, .. } => identity_columns,
        }
    }

    /// Narrow layout taken from the first three columns: id, food code, grams.
    pub fn narrow_by_position(table: &RawTable) -> Result<Self, PipelineError> {
        if table.headers.len() < 3 {
            return Err(PipelineError::SchemaMismatch(format!(
                "expected at least 3 columns (id, food code, grams), found {}",
                table.headers.len()
            )));
        }
        Ok(ConsumptionLayout::Narrow {
            identity_columns: vec![table.headers[0].clone()],
            food_code_column: table.headers[1].clone(),
            quantity_column: table.headers[2].clone(),
        })
    }
}

/// One food eaten by one identity, in long form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsumptionRecord {
    /// Values of the identity columns, in the order they were assigned.
    pub identity: Vec<String>,
    pub food_code: String,
    pub quantity_grams: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadWarnings {
    pub invalid_quantities: usize,
    pub negative_quantities: usize,
    pub blank_food_codes: usize,
    /// Rows with at least one blank identity cell; they group under "".
    pub blank_identities: usize,
}

impl LoadWarnings {
    pub fn merge(&mut self, other: &LoadWarnings) {
        self.invalid_quantities += other.invalid_quantities;
        self.negative_quantities += other.negative_quantities;
        self.blank_food_codes += other.blank_food_codes;
        self.blank_identities += other.blank_identities;
    }

    pub fn messages(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.invalid_quantities > 0 {
            out.push(format!(
                "{} rows have non-numeric grams and were treated as 0.",
                self.invalid_quantities
            ));
        }
        if self.negative_quantities > 0 {
            out.push(format!(
                "{} rows have negative grams and were treated as 0.",
                self.negative_quantities
            ));
        }
        if self.blank_food_codes > 0 {
            out.push(format!(
                "{} rows have a blank food code and cannot be matched.",
                self.blank_food_codes
            ));
        }
        if self.blank_identities > 0 {
            out.push(format!(
                "{} rows have a blank identity value and were grouped under an empty key.",
                self.blank_identities
            ));
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct LoadedConsumption {
    pub identity_columns: Vec<String>,
    pub records: Vec<ConsumptionRecord>,
    pub warnings: LoadWarnings,
}

/// Outcome of reading one quantity cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Quantity {
    Valid(f64),
    Invalid,
    Negative,
}

impl Quantity {
    pub fn grams(self) -> f64 {
        match self {
            Quantity::Valid(g) => g,
            Quantity::Invalid | Quantity::Negative => 0.0,
        }
    }

    pub fn record_into(self, warnings: &mut LoadWarnings) {
        match self {
            Quantity::Valid(_) => {}
            Quantity::Invalid => warnings.invalid_quantities += 1,
            Quantity::Negative => warnings.negative_quantities += 1,
        }
    }
}

/// Parses a grams cell, ignoring `,` thousands separators.
pub fn parse_quantity(cell: Option<&str>) -> Quantity {
    let Some(raw) = cell else {
        return Quantity::Invalid;
    };
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    match cleaned.parse::<f64>() {
        Ok(v) if !v.is_finite() => Quantity::Invalid,
        Ok(v) if v < 0.0 => Quantity::Negative,
        Ok(v) => Quantity::Valid(v),
        Err(_) => Quantity::Invalid,
    }
}

/// Identity values of one row, and whether any of them was blank.
pub(crate) fn identity_values(
    table: &RawTable,
    row: usize,
    identity_idx: &[usize],
) -> (Vec<String>, bool) {
    let mut blank = false;
    let values = identity_idx
        .iter()
        .map(|&col| match table.cell(row, col) {
            Some(value) => value.to_string(),
            None => {
                blank = true;
                String::new()
            }
        })
        .collect();
    (values, blank)
}

fn resolve_columns(table: &RawTable, names: &[String]) -> Result<Vec<usize>, PipelineError> {
    names.iter().map(|n| table.column_index(n)).collect()
}

/// Validates the role assignment against the table and produces long-form records.
pub fn load_consumption(
    table: &RawTable,
    layout: &ConsumptionLayout,
) -> Result<LoadedConsumption, PipelineError> {
    let identity_columns = layout.identity_columns().to_vec();
    if identity_columns.is_empty() {
        return Err(PipelineError::SchemaMismatch(
            "at least one identity column is required".to_string(),
        ));
    }
    let identity_idx = resolve_columns(table, &identity_columns)?;

    let (records, warnings) = match layout {
        ConsumptionLayout::Narrow {
            food_code_column,
            quantity_column,
            ..
        } => {
            let code_idx = table.column_index(food_code_column)?;
            let qty_idx = table.column_index(quantity_column)?;
            load_narrow(table, &identity_idx, code_idx, qty_idx)
        }
        ConsumptionLayout::Wide {
            food_code_columns,
            quantity_columns,
            ..
        } => {
            if food_code_columns.len() != quantity_columns.len() {
                return Err(PipelineError::SchemaMismatch(format!(
                    "wide layout needs matching food code and quantity columns, got {} and {}",
                    food_code_columns.len(),
                    quantity_columns.len()
                )));
            }
            if food_code_columns.is_empty() {
                return Err(PipelineError::SchemaMismatch(
                    "wide layout needs at least one food code / quantity column pair".to_string(),
                ));
            }
            let code_idx = resolve_columns(table, food_code_columns)?;
            let qty_idx = resolve_columns(table, quantity_columns)?;
            let pairs: Vec<(usize, usize)> = code_idx.into_iter().zip(qty_idx).collect();
            normalize_wide(table, &identity_idx, &pairs)
        }
    };

    for message in warnings.messages() {
        log::warn!("{}", message);
    }
    log::info!(
        "Loaded {} consumption records from {} input rows",
        records.len(),
        table.len()
    );

    Ok(LoadedConsumption {
        identity_columns,
        records,
        warnings,
    })
}

fn load_narrow(
    table: &RawTable,
    identity_idx: &[usize],
    code_idx: usize,
    qty_idx: usize,
) -> (Vec<ConsumptionRecord>, LoadWarnings) {
    let mut warnings = LoadWarnings::default();
    let mut records = Vec::with_capacity(table.len());

    for row in 0..table.len() {
        let food_code = match table.cell(row, code_idx) {
            Some(code) => normalize_code(code),
            None => {
                warnings.blank_food_codes += 1;
                String::new()
            }
        };
        let quantity = parse_quantity(table.cell(row, qty_idx));
        quantity.record_into(&mut warnings);

        let (identity, blank_identity) = identity_values(table, row, identity_idx);
        if blank_identity {
            warnings.blank_identities += 1;
        }

        records.push(ConsumptionRecord {
            identity,
            food_code,
            quantity_grams: quantity.grams(),
        });
    }

    (records, warnings)
}
