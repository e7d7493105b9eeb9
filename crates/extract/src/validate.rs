//! Arithmetic reconciliation of a line item: `quantity * rate ≈ amount`.

use medbill_core::{round_money, BillItem, ItemFlag};
use tracing::debug;

use crate::config::ValidationConfig;

/// Check or complete the item's arithmetic, setting `validated` and the
/// matching flag. Derived and corrected values are rounded to cents.
pub fn validate_item(item: &mut BillItem, config: &ValidationConfig) {
    match (item.item_quantity, item.item_rate, item.item_amount) {
        (Some(q), Some(r), Some(a)) => {
            let product = q * r;
            let tolerance = config.absolute_epsilon.max(config.relative_pct * a.abs());
            if (product - a).abs() <= tolerance {
                item.validated = true;
            } else if trusted(item.field_confidence.quantity, config) && trusted(item.field_confidence.rate, config) {
                debug!(item = %item.item_name, ocr = a, computed = product, "amount replaced by quantity * rate");
                item.item_amount = Some(round_money(product));
                item.field_confidence.amount = None;
                item.validated = true;
                item.flag(ItemFlag::ValidationCorrected);
            } else {
                debug!(item = %item.item_name, ocr = a, computed = product, "amount disagrees with quantity * rate");
                item.validated = false;
                item.flag(ItemFlag::ValidationMismatch);
            }
        }
        (None, Some(r), Some(a)) => {
            item.item_quantity = derive(item, a, r);
        }
        (Some(q), None, Some(a)) => {
            item.item_rate = derive(item, a, q);
        }
        (Some(q), Some(r), None) => {
            item.item_amount = Some(round_money(q * r));
            item.validated = true;
            item.flag(ItemFlag::FieldDerived);
        }
        _ => item.validated = false,
    }
}

fn trusted(confidence: Option<f32>, config: &ValidationConfig) -> bool {
    confidence.is_some_and(|c| c >= config.min_field_confidence)
}

/// `amount / divisor`, or `None` with `DerivationFailed` when the divisor is zero.
fn derive(item: &mut BillItem, amount: f64, divisor: f64) -> Option<f64> {
    if divisor == 0.0 {
        item.validated = false;
        item.flag(ItemFlag::DerivationFailed);
        return None;
    }
    item.validated = true;
    item.flag(ItemFlag::FieldDerived);
    Some(round_money(amount / divisor))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bill(q: Option<f64>, r: Option<f64>, a: Option<f64>, conf: f32) -> BillItem {
        let mut item = BillItem::new("Consultation");
        if let Some(q) = q {
            item = item.with_quantity(q, conf);
        }
        if let Some(r) = r {
            item = item.with_rate(r, conf);
        }
        if let Some(a) = a {
            item = item.with_amount(a, conf);
        }
        item
    }

    fn validated(mut item: BillItem) -> BillItem {
        validate_item(&mut item, &ValidationConfig::default());
        item
    }

    #[test]
    fn consistent_item_validates() {
        let item = validated(bill(Some(1.0), Some(500.0), Some(500.0), 0.9));
        assert!(item.validated);
        assert!(item.confidence_flags.is_empty());
        assert_eq!(item.item_amount, Some(500.0));
    }

    #[test]
    fn tolerance_is_absolute_or_relative() {
        assert!(validated(bill(Some(2.0), Some(100.0), Some(200.4), 0.9)).validated);
        let big = validated(bill(Some(10.0), Some(1000.0), Some(10080.0), 0.3));
        assert!(big.validated);
        assert_eq!(big.item_amount, Some(10080.0));
    }

    #[test]
    fn confident_mismatch_is_corrected() {
        let item = validated(bill(Some(2.0), Some(100.0), Some(150.0), 0.9));
        assert_eq!(item.item_amount, Some(200.0));
        assert!(item.validated);
        assert!(item.has_flag(ItemFlag::ValidationCorrected));
    }

    #[test]
    fn unsure_mismatch_keeps_amount() {
        let item = validated(bill(Some(2.0), Some(100.0), Some(150.0), 0.4));
        assert_eq!(item.item_amount, Some(150.0));
        assert!(!item.validated);
        assert!(item.has_flag(ItemFlag::ValidationMismatch));
    }

    #[test]
    fn derives_missing_quantity_or_rate() {
        let q = validated(bill(None, Some(3.0), Some(100.0), 0.9));
        assert_eq!(q.item_quantity, Some(33.33));
        assert!(q.validated);
        assert!(q.has_flag(ItemFlag::FieldDerived));

        let r = validated(bill(Some(4.0), None, Some(1000.0), 0.9));
        assert_eq!(r.item_rate, Some(250.0));
        assert!(r.has_flag(ItemFlag::FieldDerived));
    }

    #[test]
    fn zero_divisor_fails_derivation() {
        let item = validated(bill(Some(0.0), None, Some(100.0), 0.9));
        assert_eq!(item.item_rate, None);
        assert!(!item.validated);
        assert!(item.has_flag(ItemFlag::DerivationFailed));
    }

    #[test]
    fn derives_missing_amount() {
        let item = validated(bill(Some(3.0), Some(33.33), None, 0.9));
        assert_eq!(item.item_amount, Some(99.99));
        assert!(item.validated);
        assert!(item.has_flag(ItemFlag::FieldDerived));
    }

    #[test]
    fn two_missing_fields_stay_unvalidated() {
        let item = validated(bill(None, None, Some(100.0), 0.9));
        assert!(!item.validated);
        assert_eq!(item.item_amount, Some(100.0));
        assert!(item.confidence_flags.is_empty());

        assert!(!validated(bill(None, None, None, 0.9)).validated);
    }
}
