use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Non-fatal conditions recorded on a single line item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemFlag {
    /// More than one fragment landed in a numeric column; the extras were set aside.
    ColumnAssignmentConflict,
    /// A numeric cell could not be parsed and was left empty.
    NumericParseError,
    /// The item name was not close enough to any vocabulary entry to correct.
    SpellCorrectionSkipped,
    /// `quantity * rate` disagrees with the OCR amount and the amount was kept.
    ValidationMismatch,
    /// `quantity * rate` disagreed with the OCR amount and replaced it.
    ValidationCorrected,
    /// A missing field could not be derived because the divisor was zero.
    DerivationFailed,
    /// A missing field was derived from the other two.
    FieldDerived,
}

impl fmt::Display for ItemFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemFlag::ColumnAssignmentConflict => write!(f, "column_assignment_conflict"),
            ItemFlag::NumericParseError => write!(f, "numeric_parse_error"),
            ItemFlag::SpellCorrectionSkipped => write!(f, "spell_correction_skipped"),
            ItemFlag::ValidationMismatch => write!(f, "validation_mismatch"),
            ItemFlag::ValidationCorrected => write!(f, "validation_corrected"),
            ItemFlag::DerivationFailed => write!(f, "derivation_failed"),
            ItemFlag::FieldDerived => write!(f, "field_derived"),
        }
    }
}

/// OCR confidence of the fragment each numeric field was read from.
/// `None` when the field was absent or derived.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FieldConfidence {
    pub quantity: Option<f32>,
    pub rate: Option<f32>,
    pub amount: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillItem {
    pub item_name: String,
    pub item_amount: Option<f64>,
    pub item_rate: Option<f64>,
    pub item_quantity: Option<f64>,
    #[serde(default)]
    pub validated: bool,
    #[serde(default)]
    pub confidence_flags: BTreeSet<ItemFlag>,
    #[serde(skip)]
    pub field_confidence: FieldConfidence,
}

impl BillItem {
    pub fn new(item_name: impl Into<String>) -> Self {
        Self {
            item_name: item_name.into(),
            item_amount: None,
            item_rate: None,
            item_quantity: None,
            validated: false,
            confidence_flags: BTreeSet::new(),
            field_confidence: FieldConfidence::default(),
        }
    }

    pub fn with_quantity(mut self, value: f64, confidence: f32) -> Self {
        self.item_quantity = Some(value);
        self.field_confidence.quantity = Some(confidence);
        self
    }

    pub fn with_rate(mut self, value: f64, confidence: f32) -> Self {
        self.item_rate = Some(value);
        self.field_confidence.rate = Some(confidence);
        self
    }

    pub fn with_amount(mut self, value: f64, confidence: f32) -> Self {
        self.item_amount = Some(value);
        self.field_confidence.amount = Some(confidence);
        self
    }

    pub fn flag(&mut self, flag: ItemFlag) {
        self.confidence_flags.insert(flag);
    }

    pub fn has_flag(&self, flag: ItemFlag) -> bool {
        self.confidence_flags.contains(&flag)
    }

    /// Number of numeric fields that are present.
    pub fn numeric_field_count(&self) -> usize {
        [self.item_quantity, self.item_rate, self.item_amount]
            .iter()
            .filter(|v| v.is_some())
            .count()
    }
}
