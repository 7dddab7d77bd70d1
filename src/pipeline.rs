use serde::Serialize;

use crate::aggregator::{aggregate, AggregateTable, GroupSpec};
use crate::consumption::{load_consumption, ConsumptionLayout, LoadWarnings};
use crate::error::PipelineError;
use crate::join::{join_and_scale, JoinResult};
use crate::nutrition::NutritionTable;
use crate::table::RawTable;

/// Everything the user chose about how to read and summarise the inputs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineConfig {
    pub layout: ConsumptionLayout,
    /// One output table per group spec; empty means group by every identity column.
    pub groups: Vec<GroupSpec>,
    /// Restrict output to these nutrients, in this order.
    pub nutrients: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub identity_columns: Vec<String>,
    pub tables: Vec<AggregateTable>,
    pub joined: JoinResult,
    pub load_warnings: LoadWarnings,
    /// Human-readable warnings; never written into the result tables.
    pub warnings: Vec<String>,
}

impl PipelineOutput {
    pub fn unmatched_codes(&self) -> &[String] {
        &self.joined.unmatched_codes
    }
}

/// Runs load, join, scale and aggregation over one pair of inputs.
///
/// Missing inputs and schema problems stop the run; coerced cells and
/// unmatched codes are reported in `warnings` and the run continues.
pub fn run(
    consumption: Option<&RawTable>,
    nutrition: Option<&NutritionTable>,
    config: &PipelineConfig,
) -> Result<PipelineOutput, PipelineError> {
    let consumption = consumption.ok_or_else(|| {
        PipelineError::InputUnavailable("consumption table was not supplied".to_string())
    })?;
    let nutrition = nutrition.ok_or_else(|| {
        PipelineError::InputUnavailable("nutrition table could not be loaded".to_string())
    })?;

    let selected;
    let nutrition = match &config.nutrients {
        Some(names) if !names.is_empty() => {
            selected = nutrition.select(names)?;
            &selected
        }
        _ => nutrition,
    };

    let loaded = load_consumption(consumption, &config.layout)?;

    let groups = if config.groups.is_empty() {
        vec![GroupSpec::by_identities(&loaded.identity_columns)]
    } else {
        config.groups.clone()
    };

    let joined = join_and_scale(&loaded.records, nutrition);

    let tables = groups
        .iter()
        .map(|spec| aggregate(&joined.rows, &loaded.identity_columns, spec, &joined.nutrient_names))
        .collect::<Result<Vec<_>, _>>()?;

    let mut warnings = loaded.warnings.messages();
    warnings.extend(nutrition.warnings());
    if joined.unmatched_rows > 0 {
        warnings.push(format!(
            "{} consumption rows could not be matched to any food code in the nutrition table: {}",
            joined.unmatched_rows,
            joined.unmatched_codes.join(", ")
        ));
    }

    Ok(PipelineOutput {
        identity_columns: loaded.identity_columns,
        tables,
        joined,
        load_warnings: loaded.warnings,
        warnings,
    })
}
