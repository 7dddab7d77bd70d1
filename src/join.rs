use serde::Serialize;
use std::collections::HashSet;

use crate::consumption::ConsumptionRecord;
use crate::nutrition::NutritionTable;

/// Canonical text form of a food code used on both sides of the join.
///
/// Codes are trimmed, and a float rendering of an integral code ("101.0",
/// common in spreadsheet exports) is reduced to its integer digits so that it
/// matches "101".
pub fn normalize_code(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Some((int_part, frac_part)) = trimmed.split_once('.') {
        let int_ok = !int_part.is_empty() && int_part.chars().all(|c| c.is_ascii_digit());
        let frac_zero = !frac_part.is_empty() && frac_part.chars().all(|c| c == '0');
        if int_ok && frac_zero {
            return int_part.to_string();
        }
    }
    trimmed.to_string()
}

/// A consumption record after the left join.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinedRow {
    pub record: ConsumptionRecord,
    pub food_name: Option<String>,
    /// Per-nutrient amounts for the grams eaten; `None` when the code did not match.
    pub contributions: Option<Vec<f64>>,
}

impl JoinedRow {
    pub fn is_matched(&self) -> bool {
        self.contributions.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JoinResult {
    pub nutrient_names: Vec<String>,
    pub rows: Vec<JoinedRow>,
    /// Distinct unmatched codes, in the order first seen.
    pub unmatched_codes: Vec<String>,
    pub unmatched_rows: usize,
}

/// Amount of a nutrient in `grams` of a food holding `per_100g` per 100 g.
pub fn scale(grams: f64, per_100g: f64) -> f64 {
    grams / 100.0 * per_100g
}

/// Left-joins every record to the nutrition table and scales nutrients by grams / 100.
pub fn join_and_scale(records: &[ConsumptionRecord], nutrition: &NutritionTable) -> JoinResult {
    let mut rows = Vec::with_capacity(records.len());
    let mut unmatched_codes = Vec::new();
    let mut seen = HashSet::new();
    let mut unmatched_rows = 0usize;

    for record in records {
        match nutrition.lookup(&record.food_code) {
            Some(entry) => {
                let contributions = entry
                    .nutrients
                    .iter()
                    .map(|&v| scale(record.quantity_grams, v))
                    .collect();
                rows.push(JoinedRow {
                    record: record.clone(),
                    food_name: Some(entry.food_name.clone()),
                    contributions: Some(contributions),
                });
            }
            None => {
                unmatched_rows += 1;
                if seen.insert(record.food_code.clone()) {
                    unmatched_codes.push(record.food_code.clone());
                }
                rows.push(JoinedRow {
                    record: record.clone(),
                    food_name: None,
                    contributions: None,
                });
            }
        }
    }

    if unmatched_rows > 0 {
        log::warn!(
            "{} consumption rows could not be matched to any food code in the nutrition table ({} distinct codes)",
            unmatched_rows,
            unmatched_codes.len()
        );
    }

    JoinResult {
        nutrient_names: nutrition.nutrient_names.clone(),
        rows,
        unmatched_codes,
        unmatched_rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nutrition::{load_nutrition, DuplicateCodePolicy, NutritionLayout};
    use crate::table::RawTable;

    fn nutrition() -> NutritionTable {
        let raw = RawTable::from_bytes(
            b"code,name,energy,protein\n101,Rice,100,2.5\n102 ,Beans,200,8\n",
            b',',
        )
        .unwrap();
        load_nutrition(&raw, &NutritionLayout::default(), DuplicateCodePolicy::FirstWins).unwrap()
    }

    fn record(id: &str, code: &str, grams: f64) -> ConsumptionRecord {
        ConsumptionRecord {
            identity: vec![id.to_string()],
            food_code: normalize_code(code),
            quantity_grams: grams,
        }
    }

    #[test]
    fn test_normalize_code() {
        assert_eq!(normalize_code(" 101 "), "101");
        assert_eq!(normalize_code("101.0"), "101");
        assert_eq!(normalize_code("101.00"), "101");
        assert_eq!(normalize_code("101.5"), "101.5");
        assert_eq!(normalize_code("A-12"), "A-12");
        assert_eq!(normalize_code("1.2.0"), "1.2.0");
        assert_eq!(normalize_code(".0"), ".0");
    }

    #[test]
    fn test_scale_matches_direct_computation() {
        for (q, v) in [(0.0, 12.0), (150.0, 100.0), (33.3, 7.7), (1250.0, 0.01)] {
            assert!((scale(q, v) - q / 100.0 * v).abs() < 1e-12);
        }
    }

    #[test]
    fn test_join_is_total_and_ordered() {
        let records = vec![record("1", "101", 150.0), record("1", "999", 10.0), record("2", "102.0", 80.0)];
        let joined = join_and_scale(&records, &nutrition());

        assert_eq!(joined.rows.len(), records.len());
        for (row, rec) in joined.rows.iter().zip(&records) {
            assert_eq!(&row.record, rec);
        }
        assert_eq!(joined.rows[0].contributions, Some(vec![150.0, 3.75]));
        assert_eq!(joined.rows[2].contributions, Some(vec![160.0, 6.4]));
        assert_eq!(joined.rows[2].food_name.as_deref(), Some("Beans"));
    }

    #[test]
    fn test_unmatched_is_missing_not_zero() {
        let records = vec![record("1", "999", 10.0), record("2", "999", 20.0), record("3", "998", 5.0)];
        let joined = join_and_scale(&records, &nutrition());

        assert!(joined.rows.iter().all(|r| !r.is_matched()));
        assert_eq!(joined.unmatched_codes, vec!["999", "998"]);
        assert_eq!(joined.unmatched_rows, 3);
    }
}
