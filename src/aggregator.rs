use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::error::PipelineError;
use crate::join::JoinedRow;

/// Token used in group specifications for the matched food name.
pub const FOOD_NAME_TOKEN: &str = "@food";
pub const FOOD_NAME_COLUMN: &str = "food_name";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum GroupField {
    /// One of the identity columns of the consumption table.
    Identity(String),
    FoodName,
}

impl GroupField {
    pub fn column_name(&self) -> &str {
        match self {
            GroupField::Identity(name) => name,
            GroupField::FoodName => FOOD_NAME_COLUMN,
        }
    }
}

/// One requested output table: the fields whose combined values form a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupSpec {
    pub name: String,
    pub fields: Vec<GroupField>,
}

impl GroupSpec {
    pub fn new(fields: Vec<GroupField>) -> Self {
        let name = fields
            .iter()
            .map(GroupField::column_name)
            .collect::<Vec<_>>()
            .join("_");
        Self { name, fields }
    }

    pub fn by_identities(columns: &[String]) -> Self {
        Self::new(columns.iter().cloned().map(GroupField::Identity).collect())
    }

    /// Parses `household_id+person_id` or `household_id+@food`.
    pub fn parse(text: &str) -> Result<Self, PipelineError> {
        let fields: Vec<GroupField> = text
            .split('+')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| {
                if part == FOOD_NAME_TOKEN {
                    GroupField::FoodName
                } else {
                    GroupField::Identity(part.to_string())
                }
            })
            .collect();
        if fields.is_empty() {
            return Err(PipelineError::SchemaMismatch(format!(
                "group specification '{}' names no columns",
                text
            )));
        }
        Ok(Self::new(fields))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateRow {
    pub key: Vec<String>,
    pub totals: Vec<f64>,
    pub matched_rows: usize,
    pub unmatched_rows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateTable {
    pub name: String,
    pub key_columns: Vec<String>,
    pub nutrient_names: Vec<String>,
    pub rows: Vec<AggregateRow>,
}

impl AggregateTable {
    pub fn row(&self, key: &[&str]) -> Option<&AggregateRow> {
        self.rows
            .iter()
            .find(|r| r.key.iter().map(String::as_str).eq(key.iter().copied()))
    }

    pub fn total(&self, key: &[&str], nutrient: &str) -> Option<f64> {
        let idx = self.nutrient_names.iter().position(|n| n == nutrient)?;
        self.row(key).map(|r| r.totals[idx])
    }
}

/// Numeric-aware ordering for key parts: numbers sort by value and before text.
fn compare_key_part(a: &str, b: &str) -> Ordering {
    match (a.parse::<f64>().ok(), b.parse::<f64>().ok()) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

fn compare_keys(a: &[String], b: &[String]) -> Ordering {
    a.iter()
        .zip(b)
        .map(|(x, y)| compare_key_part(x, y))
        .find(|o| *o != Ordering::Equal)
        .unwrap_or_else(|| a.len().cmp(&b.len()))
}

/// Sums nutrient contributions per group.
///
/// Unmatched rows contribute nothing to any total but still register their
/// group, so a group made only of unmatched rows appears with zero totals.
pub fn aggregate(
    joined: &[JoinedRow],
    identity_columns: &[String],
    spec: &GroupSpec,
    nutrient_names: &[String],
) -> Result<AggregateTable, PipelineError> {
    enum Part {
        Identity(usize),
        FoodName,
    }

    let parts: Vec<Part> = spec
        .fields
        .iter()
        .map(|field| match field {
            GroupField::Identity(name) => identity_columns
                .iter()
                .position(|c| c == name)
                .map(Part::Identity)
                .ok_or_else(|| {
                    PipelineError::SchemaMismatch(format!(
                        "group column '{}' is not an identity column (identity columns: {})",
                        name,
                        identity_columns.join(", ")
                    ))
                }),
            GroupField::FoodName => Ok(Part::FoodName),
        })
        .collect::<Result<_, _>>()?;

    let mut groups: HashMap<Vec<String>, AggregateRow> = HashMap::new();
    for row in joined {
        let key: Vec<String> = parts
            .iter()
            .map(|part| match part {
                Part::Identity(i) => row.record.identity.get(*i).cloned().unwrap_or_default(),
                Part::FoodName => row.food_name.clone().unwrap_or_default(),
            })
            .collect();

        let group = groups.entry(key.clone()).or_insert_with(|| AggregateRow {
            key,
            totals: vec![0.0; nutrient_names.len()],
            matched_rows: 0,
            unmatched_rows: 0,
        });

        match &row.contributions {
            Some(contributions) => {
                group.matched_rows += 1;
                for (total, value) in group.totals.iter_mut().zip(contributions) {
                    *total += value;
                }
            }
            None => group.unmatched_rows += 1,
        }
    }

    let mut rows: Vec<AggregateRow> = groups.into_values().collect();
    rows.sort_by(|a, b| compare_keys(&a.key, &b.key));

    log::info!("Aggregated '{}': {} groups", spec.name, rows.len());

    Ok(AggregateTable {
        name: spec.name.clone(),
        key_columns: spec.fields.iter().map(|f| f.column_name().to_string()).collect(),
        nutrient_names: nutrient_names.to_vec(),
        rows,
    })
}
