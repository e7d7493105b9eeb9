use std::sync::OnceLock;

use medbill_core::{BillItem, ItemFlag};
use regex::Regex;
use tracing::debug;

use crate::columns::{AssignedRow, Cell};
use crate::config::ItemConfig;
use crate::numeric::parse_number;

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

re!(re_date, r"\b\d{1,2}[/-]\d{1,2}[/-]\d{2,4}\b");
re!(re_noise, r"[~_»|—]");

/// Tidy the ITEM column text: dates and scanner noise go, trailing bare
/// numbers (serials, stray quantities) go, edge punctuation goes.
pub fn clean_item_name(text: &str) -> String {
    let text = re_date().replace_all(text, " ");
    let text = re_noise().replace_all(&text, " ");

    let mut tokens: Vec<&str> = text
        .split_whitespace()
        .filter(|t| t.chars().any(char::is_alphanumeric) || t.contains(['(', ')']))
        .collect();
    while tokens.last().is_some_and(|t| is_bare_number(t)) {
        tokens.pop();
    }

    tokens
        .join(" ")
        .trim_matches(|c: char| matches!(c, ' ' | '.' | ',' | ':' | ';' | '-'))
        .to_string()
}

fn is_bare_number(token: &str) -> bool {
    token.chars().any(|c| c.is_ascii_digit()) && token.chars().all(|c| c.is_ascii_digit() || matches!(c, ',' | '.'))
}

/// Turn assigned rows into bill items, in row order.
///
/// Rows with neither a name nor numeric cells are dropped. With
/// `merge_continuation_lines`, a name-only row is held and prefixed to the
/// next row that has numbers; without it, name-only rows above the first
/// row with numbers (hospital banner, patient details) are skipped.
pub fn build_items(rows: Vec<AssignedRow>, config: &ItemConfig) -> Vec<BillItem> {
    let mut items = Vec::with_capacity(rows.len());
    let mut pending: Vec<String> = Vec::new();
    let mut seen_numeric = false;

    for row in rows {
        let name = clean_item_name(&row.item_text);
        if !row.has_numeric_cells() {
            if name.is_empty() {
                continue;
            }
            if config.merge_continuation_lines {
                debug!(row = row.row_index, text = %name, "holding continuation line");
                pending.push(name);
                continue;
            }
            if !seen_numeric {
                debug!(row = row.row_index, text = %name, "skipping text above the first priced row");
                continue;
            }
        }
        seen_numeric |= row.has_numeric_cells();

        let name = if pending.is_empty() {
            name
        } else {
            pending.push(name);
            let joined = pending.join(" ");
            pending.clear();
            joined.trim().to_string()
        };
        items.push(build_item(name, &row));
    }

    if !pending.is_empty() {
        debug!(text = %pending.join(" "), "dropping trailing continuation text");
    }
    items
}

fn build_item(name: String, row: &AssignedRow) -> BillItem {
    let mut item = BillItem::new(name);
    if let Some((v, conf)) = parse_cell(&mut item, row.quantity.as_ref()) {
        item = item.with_quantity(v, conf);
    }
    if let Some((v, conf)) = parse_cell(&mut item, row.rate.as_ref()) {
        item = item.with_rate(v, conf);
    }
    if let Some((v, conf)) = parse_cell(&mut item, row.amount.as_ref()) {
        item = item.with_amount(v, conf);
    }
    if !row.conflicts.is_empty() {
        item.flag(ItemFlag::ColumnAssignmentConflict);
    }
    item
}

fn parse_cell(item: &mut BillItem, cell: Option<&Cell>) -> Option<(f64, f32)> {
    let cell = cell?;
    match parse_number(&cell.text) {
        Some(v) => Some((v, cell.confidence)),
        None => {
            debug!(item = %item.item_name, text = %cell.text, "numeric cell did not parse");
            item.flag(ItemFlag::NumericParseError);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ColumnRole;

    fn cell(text: &str) -> Option<Cell> {
        Some(Cell { text: text.to_string(), confidence: 0.9 })
    }

    fn assigned(item: &str, q: Option<Cell>, r: Option<Cell>, a: Option<Cell>) -> AssignedRow {
        AssignedRow {
            row_index: 0,
            item_text: item.to_string(),
            quantity: q,
            rate: r,
            amount: a,
            conflicts: vec![],
        }
    }

    #[test]
    fn cleans_dates_and_noise() {
        assert_eq!(clean_item_name("Consultation 12/03/2024"), "Consultation");
        assert_eq!(clean_item_name("~Room Rent_ »"), "Room Rent");
        assert_eq!(clean_item_name("Dressing | 01-02-24 |"), "Dressing");
    }

    #[test]
    fn strips_trailing_numbers_and_edge_punctuation() {
        assert_eq!(clean_item_name("Pharmacy - 2 3"), "Pharmacy");
        assert_eq!(clean_item_name("  : X-Ray  ."), "X-Ray");
        assert_eq!(clean_item_name("Blood Test   (CBC)"), "Blood Test (CBC)");
        assert_eq!(clean_item_name("Ward B"), "Ward B");
        assert_eq!(clean_item_name("12 1,200.00"), "");
    }

    #[test]
    fn builds_typed_item() {
        let rows = vec![assigned("Consultation", cell("1"), cell("500"), cell("500"))];
        let items = build_items(rows, &ItemConfig::default());
        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.item_name, "Consultation");
        assert_eq!(item.item_quantity, Some(1.0));
        assert_eq!(item.item_rate, Some(500.0));
        assert_eq!(item.item_amount, Some(500.0));
        assert_eq!(item.field_confidence.rate, Some(0.9));
        assert!(item.confidence_flags.is_empty());
    }

    #[test]
    fn unparseable_cell_is_null_and_flagged() {
        let rows = vec![assigned("Dressing", None, cell("abc"), cell("₹1,200.00"))];
        let items = build_items(rows, &ItemConfig::default());
        assert_eq!(items[0].item_rate, None);
        assert_eq!(items[0].item_amount, Some(1200.0));
        assert!(items[0].has_flag(ItemFlag::NumericParseError));
    }

    #[test]
    fn conflicts_are_flagged() {
        let mut row = assigned("Dressing", None, None, cell("510"));
        row.conflicts = vec![ColumnRole::Amount];
        let items = build_items(vec![row], &ItemConfig::default());
        assert!(items[0].has_flag(ItemFlag::ColumnAssignmentConflict));
    }

    #[test]
    fn drops_rows_with_nothing_in_them() {
        let rows = vec![
            assigned(" ~ ", None, None, None),
            assigned("", None, None, cell("100")),
            assigned("Room Charges", None, None, None),
        ];
        let items = build_items(rows, &ItemConfig::default());
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].item_name, "");
        assert_eq!(items[1].item_name, "Room Charges");
        assert_eq!(items[1].numeric_field_count(), 0);
    }

    #[test]
    fn text_above_the_first_priced_row_is_skipped() {
        let rows = vec![
            assigned("City Hospital", None, None, None),
            assigned("Patient: A. Kumar", None, None, None),
            assigned("Consultation", None, None, cell("500")),
            assigned("Room Charges", None, None, None),
            assigned("Room Rent", None, None, cell("300")),
        ];
        let items = build_items(rows, &ItemConfig::default());
        let names: Vec<_> = items.iter().map(|i| i.item_name.as_str()).collect();
        assert_eq!(names, vec!["Consultation", "Room Charges", "Room Rent"]);
    }

    #[test]
    fn continuation_lines_merge_when_enabled() {
        let rows = || {
            vec![
                assigned("Inj. Ceftriaxone", None, None, None),
                assigned("1gm vial", cell("2"), cell("80"), cell("160")),
                assigned("Footer text", None, None, None),
            ]
        };
        let merged = build_items(rows(), &ItemConfig { merge_continuation_lines: true });
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].item_name, "Inj. Ceftriaxone 1gm vial");

        let separate = build_items(rows(), &ItemConfig::default());
        assert_eq!(separate.len(), 2);
        assert_eq!(separate[0].item_name, "1gm vial");
        assert_eq!(separate[1].item_name, "Footer text");
    }
}
