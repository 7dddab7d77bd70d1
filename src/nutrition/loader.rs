use serde::Serialize;
use std::collections::HashMap;

use crate::error::PipelineError;
use crate::join::normalize_code;
use crate::table::RawTable;

/// One food of the composition table; nutrient amounts are per 100 g.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NutritionEntry {
    pub food_code: String,
    pub food_name: String,
    pub food_name_alt: Option<String>,
    /// Aligned with `NutritionTable::nutrient_names`.
    pub nutrients: Vec<f64>,
}

/// How the columns of a composition table are assigned.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum NutritionLayout {
    /// Column 0 is the code, column 1 the name, column 2 the alternate name
    /// when `alt_name` is set; every remaining column is a nutrient.
    Positional { alt_name: bool },
    Explicit {
        code_column: String,
        name_column: String,
        alt_name_column: Option<String>,
        /// Every other column when `None`.
        nutrient_columns: Option<Vec<String>>,
    },
}

impl Default for NutritionLayout {
    fn default() -> Self {
        NutritionLayout::Positional { alt_name: false }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum DuplicateCodePolicy {
    /// Keep the first row for a code and ignore later ones.
    #[default]
    FirstWins,
    /// Refuse to load a table with repeated codes.
    Reject,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NutritionTable {
    pub nutrient_names: Vec<String>,
    pub entries: Vec<NutritionEntry>,
    pub coerced_nutrient_cells: usize,
    pub duplicate_codes: Vec<String>,
    pub skipped_blank_codes: usize,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl NutritionTable {
    pub fn lookup(&self, code: &str) -> Option<&NutritionEntry> {
        self.index
            .get(&normalize_code(code))
            .map(|&i| &self.entries[i])
    }

    /// Position of a nutrient within every entry's `nutrients`.
    pub fn nutrient_index(&self, name: &str) -> Option<usize> {
        self.nutrient_names.iter().position(|n| n == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Restricts the table to the given nutrients, in the given order.
    pub fn select(&self, names: &[String]) -> Result<NutritionTable, PipelineError> {
        let positions: Vec<usize> = names
            .iter()
            .map(|name| {
                self.nutrient_index(name)
                    .ok_or_else(|| {
                        PipelineError::SchemaMismatch(format!(
                            "nutrient '{}' not found (available: {})",
                            name,
                            self.nutrient_names.join(", ")
                        ))
                    })
            })
            .collect::<Result<_, _>>()?;

        let entries = self
            .entries
            .iter()
            .map(|entry| NutritionEntry {
                nutrients: positions.iter().map(|&i| entry.nutrients[i]).collect(),
                ..entry.clone()
            })
            .collect();

        Ok(NutritionTable {
            nutrient_names: names.to_vec(),
            entries,
            coerced_nutrient_cells: self.coerced_nutrient_cells,
            duplicate_codes: self.duplicate_codes.clone(),
            skipped_blank_codes: self.skipped_blank_codes,
            index: self.index.clone(),
        })
    }

    pub fn warnings(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.coerced_nutrient_cells > 0 {
            out.push(format!(
                "{} nutrient cells in the nutrition table were not numeric and were treated as 0.",
                self.coerced_nutrient_cells
            ));
        }
        if !self.duplicate_codes.is_empty() {
            out.push(format!(
                "Nutrition table repeats {} food codes; the first occurrence of each was used: {}",
                self.duplicate_codes.len(),
                self.duplicate_codes.join(", ")
            ));
        }
        if self.skipped_blank_codes > 0 {
            out.push(format!(
                "{} nutrition table rows have no food code and were skipped.",
                self.skipped_blank_codes
            ));
        }
        out
    }
}

/// Parses a nutrient cell; blank or garbled cells count as zero.
fn parse_nutrient(cell: Option<&str>) -> Option<f64> {
    let raw = cell?;
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

struct Roles {
    code: usize,
    name: usize,
    alt_name: Option<usize>,
    nutrients: Vec<usize>,
}

fn resolve_roles(table: &RawTable, layout: &NutritionLayout) -> Result<Roles, PipelineError> {
    match layout {
        NutritionLayout::Positional { alt_name } => {
            let first_nutrient = if *alt_name { 3 } else { 2 };
            if table.headers.len() < first_nutrient {
                return Err(PipelineError::SchemaMismatch(format!(
                    "nutrition table needs at least {} non-empty columns, found {}",
                    first_nutrient,
                    table.headers.len()
                )));
            }
            Ok(Roles {
                code: 0,
                name: 1,
                alt_name: alt_name.then_some(2),
                nutrients: (first_nutrient..table.headers.len()).collect(),
            })
        }
        NutritionLayout::Explicit {
            code_column,
            name_column,
            alt_name_column,
            nutrient_columns,
        } => {
            let code = table.column_index(code_column)?;
            let name = table.column_index(name_column)?;
            let alt_name = alt_name_column
                .as_deref()
                .map(|c| table.column_index(c))
                .transpose()?;
            let nutrients = match nutrient_columns {
                Some(cols) => cols
                    .iter()
                    .map(|c| table.column_index(c))
                    .collect::<Result<Vec<_>, _>>()?,
                None => (0..table.headers.len())
                    .filter(|i| *i != code && *i != name && Some(*i) != alt_name)
                    .collect(),
            };
            Ok(Roles {
                code,
                name,
                alt_name,
                nutrients,
            })
        }
    }
}

/// Builds the composition table from a raw table.
///
/// All-empty columns are dropped before roles are assigned, so a spacer
/// column between the names and the nutrients does not shift the layout.
pub fn load_nutrition(
    raw: &RawTable,
    layout: &NutritionLayout,
    policy: DuplicateCodePolicy,
) -> Result<NutritionTable, PipelineError> {
    if raw.is_empty() {
        return Err(PipelineError::InputUnavailable(
            "nutrition table contains no food codes".to_string(),
        ));
    }

    let mut table = raw.clone();
    let dropped = table.drop_empty_columns();
    if dropped > 0 {
        log::debug!("Dropped {} empty columns from the nutrition table", dropped);
    }

    let roles = resolve_roles(&table, layout)?;
    if roles.nutrients.is_empty() {
        return Err(PipelineError::SchemaMismatch(
            "no nutrition columns detected in the nutrition table".to_string(),
        ));
    }
    let nutrient_names: Vec<String> = roles
        .nutrients
        .iter()
        .map(|&i| table.headers[i].clone())
        .collect();

    let mut entries = Vec::with_capacity(table.len());
    let mut index = HashMap::new();
    let mut duplicate_codes: Vec<String> = Vec::new();
    let mut coerced_nutrient_cells = 0usize;
    let mut skipped_blank_codes = 0usize;

    for row in 0..table.len() {
        let Some(raw_code) = table.cell(row, roles.code) else {
            skipped_blank_codes += 1;
            continue;
        };
        let food_code = normalize_code(raw_code);

        if index.contains_key(&food_code) {
            if policy == DuplicateCodePolicy::Reject {
                return Err(PipelineError::SchemaMismatch(format!(
                    "food code '{}' appears more than once in the nutrition table",
                    food_code
                )));
            }
            if !duplicate_codes.contains(&food_code) {
                duplicate_codes.push(food_code);
            }
            continue;
        }

        let nutrients = roles
            .nutrients
            .iter()
            .map(|&col| {
                parse_nutrient(table.cell(row, col)).unwrap_or_else(|| {
                    coerced_nutrient_cells += 1;
                    0.0
                })
            })
            .collect();

        index.insert(food_code.clone(), entries.len());
        entries.push(NutritionEntry {
            food_code,
            food_name: table.cell(row, roles.name).unwrap_or_default().to_string(),
            food_name_alt: roles
                .alt_name
                .and_then(|col| table.cell(row, col))
                .map(str::to_string),
            nutrients,
        });
    }

    if entries.is_empty() {
        return Err(PipelineError::InputUnavailable(
            "nutrition table contains no food codes".to_string(),
        ));
    }

    let loaded = NutritionTable {
        nutrient_names,
        entries,
        coerced_nutrient_cells,
        duplicate_codes,
        skipped_blank_codes,
        index,
    };
    for message in loaded.warnings() {
        log::warn!("{}", message);
    }
    log::info!(
        "Nutrition table loaded: {} foods, nutrients: {}",
        loaded.len(),
        loaded.nutrient_names.join(", ")
    );
    Ok(loaded)
}
