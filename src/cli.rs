use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::aggregator::GroupSpec;
use crate::consumption::ConsumptionLayout;
use crate::error::PipelineError;
use crate::nutrition::{DuplicateCodePolicy, NutritionLayout, NutritionSource};
use crate::pipeline::PipelineConfig;
use crate::table::RawTable;

pub const NUTRITION_URL_ENV_VAR: &str = "NUTRITION_TABLE_URL";
pub const NUTRITION_PATH_ENV_VAR: &str = "NUTRITION_TABLE_PATH";
/// Fixed table used when nothing else is configured.
pub const DEFAULT_NUTRITION_PATH: &str = "nutrition.csv";

#[derive(Parser, Debug)]
#[command(author, version, about = "Compute nutrient totals from food consumption records", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Join consumption records to a nutrition table and write per-group totals
    Compute(ComputeArgs),
    /// Print an example consumption CSV
    Example,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayoutKind {
    Narrow,
    Wide,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum NutritionLayoutKind {
    Positional,
    Explicit,
}

#[derive(Args, Debug)]
pub struct ComputeArgs {
    /// Path to the consumption CSV
    #[arg(short, long)]
    pub consumption: PathBuf,

    #[arg(long, value_enum, default_value_t = LayoutKind::Narrow)]
    pub layout: LayoutKind,

    /// Identity column(s), in order (e.g. household then person)
    #[arg(long = "id-column")]
    pub id_columns: Vec<String>,

    /// Food code column; repeat for each pair in wide layout
    #[arg(long = "food-code-column")]
    pub food_code_columns: Vec<String>,

    /// Grams column; repeat for each pair in wide layout
    #[arg(long = "quantity-column")]
    pub quantity_columns: Vec<String>,

    /// Fetch the nutrition table from this URL
    #[arg(long, conflicts_with_all = ["nutrition_file", "nutrition_path"])]
    pub nutrition_url: Option<String>,

    /// Nutrition table supplied with this run
    #[arg(long, conflicts_with = "nutrition_path")]
    pub nutrition_file: Option<PathBuf>,

    /// Fixed local nutrition table
    #[arg(long)]
    pub nutrition_path: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = NutritionLayoutKind::Positional)]
    pub nutrition_layout: NutritionLayoutKind,

    /// Positional layout: third column is an alternate food name
    #[arg(long)]
    pub alt_name: bool,

    #[arg(long)]
    pub code_column: Option<String>,

    #[arg(long)]
    pub name_column: Option<String>,

    #[arg(long)]
    pub alt_name_column: Option<String>,

    /// Explicit layout: nutrient column (repeatable); defaults to all others
    #[arg(long = "nutrient-column")]
    pub nutrient_columns: Vec<String>,

    /// Fail when the nutrition table repeats a food code
    #[arg(long)]
    pub reject_duplicate_codes: bool,

    /// Only report these nutrients (repeatable)
    #[arg(long = "nutrient")]
    pub nutrients: Vec<String>,

    /// Grouping, e.g. `person_id`, `household_id+person_id`, `household_id+@food` (repeatable)
    #[arg(long = "group-by")]
    pub group_by: Vec<String>,

    /// Field delimiter for both input tables
    #[arg(long, default_value_t = ',')]
    pub delimiter: char,

    #[arg(short, long, default_value = "output")]
    pub output_dir: PathBuf,

    /// Also write the per-row join details
    #[arg(long)]
    pub details: bool,

    /// Write a JSON summary of the run to this path
    #[arg(long)]
    pub summary_json: Option<PathBuf>,
}

pub fn parse_args() -> Cli {
    Cli::parse()
}

impl ComputeArgs {
    pub fn delimiter_byte(&self) -> Result<u8, PipelineError> {
        u8::try_from(self.delimiter)
            .ok()
            .filter(u8::is_ascii)
            .ok_or_else(|| {
                PipelineError::SchemaMismatch(format!(
                    "delimiter '{}' must be a single ASCII character",
                    self.delimiter
                ))
            })
    }

    pub fn nutrition_source(&self) -> NutritionSource {
        self.nutrition_source_with(|key| std::env::var(key).ok())
    }

    /// Command-line flags win; then the environment; then the fixed default path.
    pub fn nutrition_source_with<F>(&self, env: F) -> NutritionSource
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = &self.nutrition_url {
            return NutritionSource::RemoteUrl(url.clone());
        }
        if let Some(path) = &self.nutrition_file {
            return NutritionSource::Upload(path.clone());
        }
        if let Some(path) = &self.nutrition_path {
            return NutritionSource::LocalPath(path.clone());
        }
        let lookup = |key: &str| env(key).filter(|v| !v.trim().is_empty());
        if let Some(url) = lookup(NUTRITION_URL_ENV_VAR) {
            return NutritionSource::RemoteUrl(url);
        }
        let path = lookup(NUTRITION_PATH_ENV_VAR).unwrap_or_else(|| DEFAULT_NUTRITION_PATH.to_string());
        NutritionSource::LocalPath(PathBuf::from(path))
    }

    pub fn nutrition_layout(&self) -> Result<NutritionLayout, PipelineError> {
        match self.nutrition_layout {
            NutritionLayoutKind::Positional => Ok(NutritionLayout::Positional {
                alt_name: self.alt_name,
            }),
            NutritionLayoutKind::Explicit => {
                let missing = |flag: &str| {
                    PipelineError::SchemaMismatch(format!("explicit nutrition layout needs --{}", flag))
                };
                Ok(NutritionLayout::Explicit {
                    code_column: self.code_column.clone().ok_or_else(|| missing("code-column"))?,
                    name_column: self.name_column.clone().ok_or_else(|| missing("name-column"))?,
                    alt_name_column: self.alt_name_column.clone(),
                    nutrient_columns: if self.nutrient_columns.is_empty() {
                        None
                    } else {
                        Some(self.nutrient_columns.clone())
                    },
                })
            }
        }
    }

    pub fn duplicate_policy(&self) -> DuplicateCodePolicy {
        if self.reject_duplicate_codes {
            DuplicateCodePolicy::Reject
        } else {
            DuplicateCodePolicy::FirstWins
        }
    }

    /// Builds the column roles; narrow input without named columns uses the
    /// first three columns as id, food code and grams.
    pub fn consumption_layout(&self, table: &RawTable) -> Result<ConsumptionLayout, PipelineError> {
        match self.layout {
            LayoutKind::Narrow => {
                if self.id_columns.is_empty()
                    && self.food_code_columns.is_empty()
                    && self.quantity_columns.is_empty()
                {
                    return ConsumptionLayout::narrow_by_position(table);
                }
                let single = |values: &[String], flag: &str| match values {
                    [one] => Ok(one.clone()),
                    _ => Err(PipelineError::SchemaMismatch(format!(
                        "narrow layout needs exactly one --{}, got {}",
                        flag,
                        values.len()
                    ))),
                };
                Ok(ConsumptionLayout::Narrow {
                    identity_columns: self.id_columns.clone(),
                    food_code_column: single(&self.food_code_columns, "food-code-column")?,
                    quantity_column: single(&self.quantity_columns, "quantity-column")?,
                })
            }
            LayoutKind::Wide => Ok(ConsumptionLayout::Wide {
                identity_columns: self.id_columns.clone(),
                food_code_columns: self.food_code_columns.clone(),
                quantity_columns: self.quantity_columns.clone(),
            }),
        }
    }

    pub fn pipeline_config(&self, table: &RawTable) -> Result<PipelineConfig, PipelineError> {
        Ok(PipelineConfig {
            layout: self.consumption_layout(table)?,
            groups: self
                .group_by
                .iter()
                .map(|g| GroupSpec::parse(g))
                .collect::<Result<_, _>>()?,
            nutrients: if self.nutrients.is_empty() {
                None
            } else {
                Some(self.nutrients.clone())
            },
        })
    }
}

pub const EXAMPLE_CSV: &str = "person_id,food_code,grams\n1,101,150\n1,102,80\n2,101,200\n3,103,50\n";
