use crate::consumption::{identity_values, parse_quantity, ConsumptionRecord, LoadWarnings};
use crate::join::normalize_code;
use crate::table::RawTable;

/// Converts a wide table (one row per identity, repeated food/quantity column
/// pairs) into long-form records.
///
/// A pair is emitted only when both its food code and quantity cells are
/// present; a person who ate fewer foods than there are pairs simply leaves
/// the trailing pairs blank. Row order and pair order are preserved.
pub fn normalize_wide(
    table: &RawTable,
    identity_idx: &[usize],
    pairs: &[(usize, usize)],
) -> (Vec<ConsumptionRecord>, LoadWarnings) {
    let mut warnings = LoadWarnings::default();
    let mut records = Vec::new();
    let mut skipped_pairs = 0usize;

    for row in 0..table.len() {
        let (identity, blank_identity) = identity_values(table, row, identity_idx);
        let before = records.len();

        for &(code_idx, qty_idx) in pairs {
            let (Some(code), Some(qty)) = (table.cell(row, code_idx), table.cell(row, qty_idx)) else {
                skipped_pairs += 1;
                continue;
            };

            let quantity = parse_quantity(Some(qty));
            quantity.record_into(&mut warnings);

            records.push(ConsumptionRecord {
                identity: identity.clone(),
                food_code: normalize_code(code),
                quantity_grams: quantity.grams(),
            });
        }

        if blank_identity && records.len() > before {
            warnings.blank_identities += 1;
        }
    }

    log::debug!(
        "Wide-to-long: {} rows x {} pairs -> {} records ({} empty pairs skipped)",
        table.len(),
        pairs.len(),
        records.len(),
        skipped_pairs
    );

    (records, warnings)
}
