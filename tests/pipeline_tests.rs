use nutrient_mapper::aggregator::GroupSpec;
use nutrient_mapper::consumption::ConsumptionLayout;
use nutrient_mapper::nutrition::{load_nutrition, DuplicateCodePolicy, NutritionLayout, NutritionSource, NutritionTable};
use nutrient_mapper::output::{write_outputs, RunSummary, DETAILS_FILE, UNMATCHED_FILE};
use nutrient_mapper::pipeline::{run, PipelineConfig};
use nutrient_mapper::table::RawTable;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::io::Write;
use tempfile::NamedTempFile;

const EPS: f64 = 1e-9;

fn table(text: &str) -> RawTable {
    RawTable::from_bytes(text.as_bytes(), b',').unwrap()
}

fn energy_table() -> NutritionTable {
    let raw = table("code,name,,energy\n101,Rice,,100\n102,Beans,,200\n103,Milk,,60\n");
    load_nutrition(&raw, &NutritionLayout::default(), DuplicateCodePolicy::FirstWins).unwrap()
}

fn narrow(id: &str) -> ConsumptionLayout {
    ConsumptionLayout::Narrow {
        identity_columns: vec![id.to_string()],
        food_code_column: "food_code".to_string(),
        quantity_column: "grams".to_string(),
    }
}

fn config(layout: ConsumptionLayout, groups: &[&str]) -> PipelineConfig {
    PipelineConfig {
        layout,
        groups: groups.iter().map(|g| GroupSpec::parse(g).unwrap()).collect(),
        nutrients: None,
    }
}

#[test]
fn test_per_person_totals() {
    let consumption = table("person_id,food_code,grams\n1,101,150\n1,102,80\n2,101,200\n");
    let out = run(Some(&consumption), Some(&energy_table()), &config(narrow("person_id"), &[])).unwrap();

    let per_person = &out.tables[0];
    assert_eq!(per_person.rows.len(), 2);
    assert!((per_person.total(&["1"], "energy").unwrap() - 310.0).abs() < EPS);
    assert!((per_person.total(&["2"], "energy").unwrap() - 200.0).abs() < EPS);
    assert!(out.unmatched_codes().is_empty());
}

#[test]
fn test_unmatched_code_reported_once_and_excluded() {
    let consumption = table("person_id,food_code,grams\n1,101,150\n1,999,500\n2,999,10\n");
    let out = run(Some(&consumption), Some(&energy_table()), &config(narrow("person_id"), &[])).unwrap();

    assert_eq!(out.unmatched_codes(), ["999".to_string()]);
    assert_eq!(out.joined.unmatched_rows, 2);
    assert!((out.tables[0].total(&["1"], "energy").unwrap() - 150.0).abs() < EPS);
    assert_eq!(out.tables[0].total(&["2"], "energy"), Some(0.0));
    assert!(out.warnings.iter().any(|w| w.contains("999")));
}

#[test]
fn test_join_is_total_over_consumption_rows() {
    let consumption = table("person_id,food_code,grams\n1,101,1\n1,5,2\n2, 102 ,3\n3,101.0,4\n4,,5\n");
    let out = run(Some(&consumption), Some(&energy_table()), &config(narrow("person_id"), &[])).unwrap();

    assert_eq!(out.joined.rows.len(), consumption.len());
    let matched = out.joined.rows.iter().filter(|r| r.is_matched()).count();
    assert_eq!(matched, 3);
    assert_eq!(out.load_warnings.blank_food_codes, 1);
}

#[test]
fn test_single_row_group_equals_direct_computation() {
    let consumption = table("person_id,food_code,grams\n7,102,37.5\n");
    let out = run(Some(&consumption), Some(&energy_table()), &config(narrow("person_id"), &[])).unwrap();
    let direct = 37.5 / 100.0 * 200.0;
    assert_eq!(out.tables[0].total(&["7"], "energy"), Some(direct));
}

#[test]
fn test_permuting_rows_does_not_change_totals() {
    let mut lines: Vec<String> = (0..60)
        .map(|i| format!("{},{},{}", i % 7, 101 + i % 4, 10.0 + i as f64 * 3.7))
        .collect();
    let baseline_csv = format!("person_id,food_code,grams\n{}\n", lines.join("\n"));
    let baseline = run(
        Some(&table(&baseline_csv)),
        Some(&energy_table()),
        &config(narrow("person_id"), &[]),
    )
    .unwrap();

    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..5 {
        lines.shuffle(&mut rng);
        let shuffled_csv = format!("person_id,food_code,grams\n{}\n", lines.join("\n"));
        let shuffled = run(
            Some(&table(&shuffled_csv)),
            Some(&energy_table()),
            &config(narrow("person_id"), &[]),
        )
        .unwrap();

        let (a, b) = (&baseline.tables[0], &shuffled.tables[0]);
        assert_eq!(a.rows.len(), b.rows.len());
        for row in &a.rows {
            let key: Vec<&str> = row.key.iter().map(String::as_str).collect();
            let other = b.row(&key).unwrap();
            assert!((row.totals[0] - other.totals[0]).abs() < 1e-6);
            assert_eq!(row.unmatched_rows, other.unmatched_rows);
        }
    }
}

#[test]
fn test_wide_household_person_and_food_outputs() {
    let consumption = table(
        "hh_id,person_id,food_code1,quantity1,food_code2,quantity2\n\
         H1,1,101,100,,60\n\
         H1,2,102,50,103,\"1,000\"\n\
         H2,1,999,20,101,30\n\
         H2,2,,,,\n",
    );
    let layout = ConsumptionLayout::Wide {
        identity_columns: vec!["hh_id".to_string(), "person_id".to_string()],
        food_code_columns: vec!["food_code1".to_string(), "food_code2".to_string()],
        quantity_columns: vec!["quantity1".to_string(), "quantity2".to_string()],
    };
    let cfg = config(layout, &["person_id", "hh_id", "hh_id+person_id", "hh_id+@food"]);
    let out = run(Some(&consumption), Some(&energy_table()), &cfg).unwrap();

    // Row 1 pair 2 has no food code; the last row has no pairs at all.
    assert_eq!(out.joined.rows.len(), 5);

    let hh = &out.tables[1];
    assert!((hh.total(&["H1"], "energy").unwrap() - (100.0 + 100.0 + 600.0)).abs() < EPS);
    assert!((hh.total(&["H2"], "energy").unwrap() - 30.0).abs() < EPS);
    assert!(hh.row(&["H2"]).is_some());

    let hh_person = &out.tables[2];
    assert!((hh_person.total(&["H1", "2"], "energy").unwrap() - 700.0).abs() < EPS);
    assert!(hh_person.row(&["H2", "2"]).is_none());

    let hh_food = &out.tables[3];
    assert!((hh_food.total(&["H1", "Rice"], "energy").unwrap() - 100.0).abs() < EPS);
    assert!((hh_food.total(&["H1", "Milk"], "energy").unwrap() - 600.0).abs() < EPS);
    assert_eq!(out.unmatched_codes(), ["999".to_string()]);
}

#[test]
fn test_wide_row_with_blank_second_code_yields_one_record() {
    let consumption = table("hh,pid,food_code1,quantity1,food_code2,quantity2\n1,1,30,100,,60\n");
    let layout = ConsumptionLayout::Wide {
        identity_columns: vec!["hh".to_string(), "pid".to_string()],
        food_code_columns: vec!["food_code1".to_string(), "food_code2".to_string()],
        quantity_columns: vec!["quantity1".to_string(), "quantity2".to_string()],
    };
    let out = run(Some(&consumption), Some(&energy_table()), &config(layout, &[])).unwrap();
    assert_eq!(out.joined.rows.len(), 1);
    assert_eq!(out.joined.rows[0].record.food_code, "30");
}

#[test]
fn test_schema_errors_halt_the_run() {
    let consumption = table("person_id,food_code,grams\n1,101,150\n");
    let bad_group = config(narrow("person_id"), &["household_id"]);
    assert!(run(Some(&consumption), Some(&energy_table()), &bad_group).is_err());

    let bad_column = config(narrow("pid"), &[]);
    assert!(run(Some(&consumption), Some(&energy_table()), &bad_column).is_err());
}

#[test]
fn test_outputs_written_to_directory() -> anyhow::Result<()> {
    let consumption = table("person_id,food_code,grams\n1,101,150\n1,102,80\n2,999,200\n");
    let out = run(Some(&consumption), Some(&energy_table()), &config(narrow("person_id"), &[]))?;

    let dir = tempfile::tempdir()?;
    let written = write_outputs(&out, dir.path(), true)?;
    assert_eq!(written.len(), 3);

    let per_person = std::fs::read_to_string(dir.path().join("person_id_nutrition.csv"))?;
    assert_eq!(per_person, "person_id,energy\n1,310\n2,0\n");

    let unmatched = std::fs::read_to_string(dir.path().join(UNMATCHED_FILE))?;
    assert_eq!(unmatched, "food_code\n999\n");
    assert!(dir.path().join(DETAILS_FILE).exists());

    let summary_path = dir.path().join("summary.json");
    RunSummary::from_output(&out).write_json(&summary_path)?;
    let summary: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&summary_path)?)?;
    assert_eq!(summary["unmatched_records"], 1);
    assert_eq!(summary["tables"][0]["file"], "person_id_nutrition.csv");
    Ok(())
}

#[test]
fn test_tables_with_the_same_name_get_separate_files() -> anyhow::Result<()> {
    let consumption = table("person_id,food_code,grams\n1,101,150\n2,102,50\n");
    let cfg = config(narrow("person_id"), &["person_id", "person_id"]);
    let out = run(Some(&consumption), Some(&energy_table()), &cfg)?;

    let dir = tempfile::tempdir()?;
    let written = write_outputs(&out, dir.path(), false)?;
    assert_eq!(written.len(), 2);
    assert_eq!(written[0], dir.path().join("person_id_nutrition.csv"));
    assert_eq!(written[1], dir.path().join("person_id_2_nutrition.csv"));
    for path in &written {
        assert_eq!(std::fs::read_to_string(path)?, "person_id,energy\n1,150\n2,100\n");
    }

    let summary = RunSummary::from_output(&out);
    assert_eq!(summary.tables[1].file, "person_id_2_nutrition.csv");
    Ok(())
}

#[tokio::test]
async fn test_end_to_end_from_files() -> anyhow::Result<()> {
    let mut nutrition = NamedTempFile::new()?;
    writeln!(nutrition, "Code;Food;Energy (kcal);Protein (g)")?;
    writeln!(nutrition, "101;Rice;130;2.5")?;
    writeln!(nutrition, "102;Lentils;116;9")?;
    nutrition.flush()?;

    let layout = NutritionLayout::Explicit {
        code_column: "Code".to_string(),
        name_column: "Food".to_string(),
        alt_name_column: None,
        nutrient_columns: None,
    };
    let source = NutritionSource::Upload(nutrition.path().to_path_buf());
    let nutrition_table = source.load(b';', &layout, DuplicateCodePolicy::Reject).await?;
    assert_eq!(nutrition_table.nutrient_names, vec!["Energy (kcal)", "Protein (g)"]);

    let consumption = RawTable::from_bytes(b"pid;food_code;grams\n1;102;200\n", b';')?;
    let out = run(Some(&consumption), Some(&nutrition_table), &config(narrow("pid"), &[]))?;
    assert!((out.tables[0].total(&["1"], "Energy (kcal)").unwrap() - 232.0).abs() < EPS);
    assert!((out.tables[0].total(&["1"], "Protein (g)").unwrap() - 18.0).abs() < EPS);
    Ok(())
}
