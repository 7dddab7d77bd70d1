use anyhow::{Context, Result};
use nutrient_mapper::cli::{parse_args, Command, ComputeArgs, EXAMPLE_CSV};
use nutrient_mapper::error::PipelineError;
use nutrient_mapper::output::{format_number, write_outputs, RunSummary};
use nutrient_mapper::pipeline::{self, PipelineOutput};
use nutrient_mapper::table::RawTable;
use tokio::fs;

const PREVIEW_ROWS: usize = 10;

async fn read_consumption(args: &ComputeArgs, delimiter: u8) -> Option<RawTable> {
    let bytes = match fs::read(&args.consumption).await {
        Ok(bytes) => bytes,
        Err(e) => {
            log::error!("Could not read consumption file {:?}: {}", args.consumption, e);
            return None;
        }
    };
    match RawTable::from_bytes(&bytes, delimiter) {
        Ok(table) => {
            log::info!(
                "Consumption file loaded: {} rows, columns: {}",
                table.len(),
                table.headers.join(", ")
            );
            Some(table)
        }
        Err(e) => {
            log::error!("Could not parse consumption file {:?}: {}", args.consumption, e);
            None
        }
    }
}

fn print_results(output: &PipelineOutput) {
    for table in &output.tables {
        println!("\n== {} ({} groups) ==", table.name, table.rows.len());
        let header: Vec<&str> = table
            .key_columns
            .iter()
            .chain(&table.nutrient_names)
            .map(String::as_str)
            .collect();
        println!("{}", header.join("\t"));
        for row in table.rows.iter().take(PREVIEW_ROWS) {
            let cells: Vec<String> = row
                .key
                .iter()
                .cloned()
                .chain(row.totals.iter().map(|v| format_number(*v)))
                .collect();
            println!("{}", cells.join("\t"));
        }
        if table.rows.len() > PREVIEW_ROWS {
            println!("... {} more", table.rows.len() - PREVIEW_ROWS);
        }
    }

    if !output.unmatched_codes().is_empty() {
        println!(
            "\nFood codes with no match in the nutrition table: {}",
            output.unmatched_codes().join(", ")
        );
    }
}

async fn compute(args: ComputeArgs) -> Result<()> {
    let delimiter = args.delimiter_byte()?;

    let consumption = read_consumption(&args, delimiter).await;

    let source = args.nutrition_source();
    let nutrition = source
        .load_optional(delimiter, &args.nutrition_layout()?, args.duplicate_policy())
        .await?;

    let Some(table) = consumption.as_ref() else {
        return Err(PipelineError::InputUnavailable(format!(
            "consumption table {:?}",
            args.consumption
        ))
        .into());
    };
    let config = args.pipeline_config(table)?;
    let output = pipeline::run(Some(table), nutrition.as_ref(), &config)?;

    for warning in &output.warnings {
        eprintln!("Warning: {}", warning);
    }
    print_results(&output);

    let written = write_outputs(&output, &args.output_dir, args.details)
        .with_context(|| format!("Failed to write results to {:?}", args.output_dir))?;
    println!("\nWrote {} files to {:?}", written.len(), args.output_dir);

    if let Some(path) = &args.summary_json {
        RunSummary::from_output(&output).write_json(path)?;
        println!("Run summary written to {:?}", path);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = parse_args();
    match cli.command {
        Command::Compute(args) => compute(args).await,
        Command::Example => {
            print!("{}", EXAMPLE_CSV);
            Ok(())
        }
    }
}
