//! Tunables and vocabularies for the extraction pipeline.
//!
//! Every section deserializes with defaults, so a TOML file only needs the
//! keys it wants to override:
//!
//! ```toml
//! [validation]
//! absolute_epsilon = 1.0
//!
//! [spelling]
//! vocabulary = ["Consultation", "Room Rent"]
//! ```

use medbill_core::PageType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use crate::types::ColumnRole;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub rows: RowConfig,
    pub header: HeaderConfig,
    pub columns: ColumnConfig,
    pub items: ItemConfig,
    pub spelling: SpellingConfig,
    pub validation: ValidationConfig,
    pub page: PageConfig,
    pub pipeline: PipelineConfig,
}

impl ExtractionConfig {
    pub fn from_toml(toml_content: &str) -> Result<Self, ConfigError> {
        let config: ExtractionConfig = toml::from_str(toml_content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let unit = [
            ("header.match_threshold", self.header.match_threshold),
            ("columns.min_confidence", self.columns.min_confidence),
            ("spelling.threshold", self.spelling.threshold),
            ("validation.min_field_confidence", self.validation.min_field_confidence),
        ];
        if let Some((name, v)) = unit.iter().find(|(_, v)| !(0.0..=1.0).contains(v)) {
            return Err(ConfigError::Invalid(format!("{name} must be within [0, 1], got {v}")));
        }

        let positive = [
            ("rows.midpoint_tolerance", self.rows.midpoint_tolerance),
            ("rows.tall_fragment_factor", self.rows.tall_fragment_factor),
        ];
        if let Some((name, v)) = positive.iter().find(|(_, v)| *v <= 0.0 || !v.is_finite()) {
            return Err(ConfigError::Invalid(format!("{name} must be positive, got {v}")));
        }

        let non_negative = [
            ("header.numeric_gap_tolerance", self.header.numeric_gap_tolerance),
            ("columns.decimal_merge_gap", self.columns.decimal_merge_gap),
            ("validation.absolute_epsilon", self.validation.absolute_epsilon),
            ("validation.relative_pct", self.validation.relative_pct),
        ];
        if let Some((name, v)) = non_negative.iter().find(|(_, v)| *v < 0.0 || !v.is_finite()) {
            return Err(ConfigError::Invalid(format!("{name} must not be negative, got {v}")));
        }

        if self.pipeline.max_concurrent_pages == 0 {
            return Err(ConfigError::Invalid("pipeline.max_concurrent_pages must be at least 1".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RowConfig {
    /// A fragment whose midpoint is further than this fraction of the row's
    /// average height from the row's average midpoint opens a new row.
    pub midpoint_tolerance: f64,
    /// Fragments taller than this multiple of the page's median fragment
    /// height are treated as merged multi-line boxes.
    pub tall_fragment_factor: f64,
}

impl Default for RowConfig {
    fn default() -> Self {
        Self {
            midpoint_tolerance: 0.5,
            tall_fragment_factor: 1.8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderConfig {
    /// How many rows from the top are searched for the header.
    pub scan_rows: usize,
    pub match_threshold: f32,
    pub item_terms: Vec<String>,
    pub quantity_terms: Vec<String>,
    pub rate_terms: Vec<String>,
    pub amount_terms: Vec<String>,
    /// Horizontal gap (px) under which numeric fragments are considered the
    /// same column when no header row is found.
    pub numeric_gap_tolerance: f64,
}

impl HeaderConfig {
    pub fn terms(&self, role: ColumnRole) -> &[String] {
        match role {
            ColumnRole::Item => &self.item_terms,
            ColumnRole::Quantity => &self.quantity_terms,
            ColumnRole::Rate => &self.rate_terms,
            ColumnRole::Amount => &self.amount_terms,
        }
    }
}

impl Default for HeaderConfig {
    fn default() -> Self {
        Self {
            scan_rows: 10,
            match_threshold: 0.75,
            item_terms: strings(&["item", "description", "particulars", "service"]),
            quantity_terms: strings(&["qty", "quantity", "no", "nos", "hrs", "hours", "days"]),
            rate_terms: strings(&["rate", "price", "unit price", "tariff"]),
            amount_terms: strings(&["amount", "amt", "total", "net amount"]),
            numeric_gap_tolerance: 8.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnConfig {
    /// Minimum OCR confidence for a fragment to win a contested numeric column.
    pub min_confidence: f32,
    /// Max gap (px) between a number and a following two-digit fragment for
    /// the pair to be read as one decimal value.
    pub decimal_merge_gap: f64,
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.6,
            decimal_merge_gap: 18.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemConfig {
    /// Prefix text-only rows onto the next row's item name.
    pub merge_continuation_lines: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpellingConfig {
    pub enabled: bool,
    pub threshold: f32,
    /// Tokens shorter than this are never corrected on their own.
    pub min_token_len: usize,
    pub vocabulary: Vec<String>,
    /// Lowercase OCR misreading → replacement, applied per token.
    pub known_misspellings: BTreeMap<String, String>,
    /// Lowercase OCR phrase → replacement, applied before tokenizing.
    pub phrase_corrections: BTreeMap<String, String>,
}

impl Default for SpellingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 0.8,
            min_token_len: 4,
            vocabulary: strings(&[
                "Consultation",
                "Consultation Charge",
                "Doctor Fee",
                "Investigation",
                "Pharmacy",
                "Procedure",
                "Radiology",
                "Laboratory",
                "Medication",
                "Bed Charges",
                "Surgery",
                "Nursing Charges",
                "Physiotherapy",
                "Medicine",
                "Room Rent",
                "Bed Rent",
                "ICU",
                "Step Down ICU",
                "Bystander Room",
            ]),
            known_misspellings: pairs(&[
                ("cansukation", "consultation"),
                ("consuttation", "consultation"),
                ("cansultation", "consultation"),
                ("cansutation", "consultation"),
                ("consuitation", "consultation"),
                ("mrant", "room rent"),
                ("rant", "rent"),
                ("stzp", "step"),
                ("nersing", "nursing"),
                ("nersmg", "nursing"),
            ]),
            phrase_corrections: pairs(&[
                ("m rant stzp down tou", "Room Rent Step Down ICU"),
                ("rr -2-room rant", "RR -2 Room Rent"),
                ("rr -2-stepdown-nursing charge", "RR -2 Stepdown Nursing Charge"),
                ("room rare bystander roan", "Room Rent Bystander Room"),
            ]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub absolute_epsilon: f64,
    /// Relative tolerance as a fraction of the amount (0.01 = 1%).
    pub relative_pct: f64,
    /// Quantity and rate must both reach this confidence before their
    /// product may overwrite a disagreeing amount.
    pub min_field_confidence: f32,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            absolute_epsilon: 0.5,
            relative_pct: 0.01,
            min_field_confidence: 0.6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageTypeKeyword {
    pub keyword: String,
    pub page_type: PageType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageConfig {
    pub classify_head_rows: usize,
    pub classify_tail_rows: usize,
    /// Checked in order; the first keyword found decides the page type.
    pub page_type_keywords: Vec<PageTypeKeyword>,
    /// Item names that are really subtotal / total lines.
    pub summary_keywords: Vec<String>,
    /// Words that may follow a leading summary keyword on a total line
    /// ("Total Amount", "Grand Total Rs").
    pub summary_filler_words: Vec<String>,
    /// Section headings and page furniture that never form an item.
    pub ignored_phrases: Vec<String>,
}

impl Default for PageConfig {
    fn default() -> Self {
        let kw = |keyword: &str, page_type| PageTypeKeyword {
            keyword: keyword.to_string(),
            page_type,
        };
        Self {
            classify_head_rows: 5,
            classify_tail_rows: 3,
            page_type_keywords: vec![
                kw("final bill", PageType::FinalBill),
                kw("pharmacy", PageType::Pharmacy),
                kw("bill detail", PageType::BillDetail),
                kw("lab", PageType::BillDetail),
            ],
            summary_keywords: strings(&[
                "total",
                "grand total",
                "sub total",
                "subtotal",
                "net amount",
                "amount due",
                "net payable",
            ]),
            summary_filler_words: strings(&[
                "amount", "amt", "rs", "inr", "payable", "due", "bill", "value", "charges", "net", "gross", "of",
            ]),
            ignored_phrases: strings(&[
                "page of",
                "printed on",
                "particulars",
                "amount",
                "rate",
                "qty",
            ]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub document_timeout_secs: u64,
    pub max_concurrent_pages: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            document_timeout_secs: 60,
            max_concurrent_pages: 4,
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn pairs(items: &[(&str, &str)]) -> BTreeMap<String, String> {
    items
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_toml_gives_defaults() {
        let config = ExtractionConfig::from_toml("").unwrap();
        assert_eq!(config, ExtractionConfig::default());
        assert_eq!(config.header.scan_rows, 10);
        assert_eq!(config.validation.absolute_epsilon, 0.5);
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let config = ExtractionConfig::from_toml(
            r#"
            [validation]
            absolute_epsilon = 1.0

            [spelling]
            vocabulary = ["X-Ray"]
            "#,
        )
        .unwrap();
        assert_eq!(config.validation.absolute_epsilon, 1.0);
        assert_eq!(config.validation.relative_pct, 0.01);
        assert_eq!(config.spelling.vocabulary, vec!["X-Ray".to_string()]);
        assert_eq!(config.spelling.threshold, 0.8);
    }

    #[test]
    fn page_type_keywords_from_toml() {
        let config = ExtractionConfig::from_toml(
            r#"
            [[page.page_type_keywords]]
            keyword = "medicines"
            page_type = "Pharmacy"
            "#,
        )
        .unwrap();
        assert_eq!(config.page.page_type_keywords.len(), 1);
        assert_eq!(config.page.page_type_keywords[0].page_type, PageType::Pharmacy);
    }

    #[test]
    fn rejects_threshold_out_of_range() {
        let err = ExtractionConfig::from_toml("[header]\nmatch_threshold = 1.5").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)), "{err}");
    }

    #[test]
    fn rejects_zero_concurrency() {
        let err = ExtractionConfig::from_toml("[pipeline]\nmax_concurrent_pages = 0").unwrap_err();
        assert!(err.to_string().contains("max_concurrent_pages"));
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(matches!(
            ExtractionConfig::from_toml("[rows\nbad"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[columns]\nmin_confidence = 0.9").unwrap();
        let config = ExtractionConfig::load(file.path()).unwrap();
        assert_eq!(config.columns.min_confidence, 0.9);
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let err = ExtractionConfig::load(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn terms_by_role() {
        let config = HeaderConfig::default();
        assert!(config.terms(ColumnRole::Quantity).contains(&"qty".to_string()));
        assert!(config.terms(ColumnRole::Amount).contains(&"amt".to_string()));
    }
}
