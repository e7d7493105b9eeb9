use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;

use crate::item::BillItem;
use crate::money::Amount;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageType {
    #[serde(rename = "Bill Detail")]
    BillDetail,
    #[serde(rename = "Pharmacy")]
    Pharmacy,
    #[serde(rename = "Final Bill")]
    FinalBill,
    #[serde(rename = "Unknown")]
    Unknown,
}

impl fmt::Display for PageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageType::BillDetail => write!(f, "Bill Detail"),
            PageType::Pharmacy => write!(f, "Pharmacy"),
            PageType::FinalBill => write!(f, "Final Bill"),
            PageType::Unknown => write!(f, "Unknown"),
        }
    }
}

impl std::str::FromStr for PageType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['_', '-'], " ").trim() {
            "bill detail" => Ok(PageType::BillDetail),
            "pharmacy" => Ok(PageType::Pharmacy),
            "final bill" => Ok(PageType::FinalBill),
            "unknown" => Ok(PageType::Unknown),
            other => Err(format!("Unknown page type: '{other}'")),
        }
    }
}

/// Non-fatal conditions recorded for a whole page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageFlag {
    /// No rows could be formed from the page's fragments.
    RowClusteringEmpty,
    /// No header row was found; columns came from the positional fallback.
    HeaderNotFound,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResult {
    #[serde(with = "page_no_string")]
    pub page_no: u32,
    pub page_type: PageType,
    pub bill_items: Vec<BillItem>,
    #[serde(skip)]
    pub flags: BTreeSet<PageFlag>,
}

impl PageResult {
    pub fn empty(page_no: u32) -> Self {
        Self {
            page_no,
            page_type: PageType::Unknown,
            bill_items: vec![],
            flags: BTreeSet::new(),
        }
    }

    /// Sum of every non-null item amount on the page.
    pub fn reconciled_amount(&self) -> Amount {
        self.bill_items
            .iter()
            .filter_map(|i| i.item_amount)
            .map(Amount::from_f64)
            .sum()
    }

    pub fn validated_count(&self) -> usize {
        self.bill_items.iter().filter(|i| i.validated).count()
    }
}

/// Document-level result: pages in ascending `page_no` with their totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub pagewise_line_items: Vec<PageResult>,
    pub total_item_count: usize,
    pub reconciled_amount: f64,
}

impl ExtractionResult {
    /// Orders pages by `page_no` and computes the document totals. Input
    /// order does not matter.
    pub fn from_pages(mut pages: Vec<PageResult>) -> Self {
        pages.sort_by_key(|p| p.page_no);
        let total_item_count = pages.iter().map(|p| p.bill_items.len()).sum();
        let reconciled_amount = pages
            .iter()
            .map(PageResult::reconciled_amount)
            .sum::<Amount>()
            .rounded()
            .to_f64();
        Self {
            pagewise_line_items: pages,
            total_item_count,
            reconciled_amount,
        }
    }
}

/// A page that produced no output and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageFailure {
    pub page_no: u32,
    pub reason: String,
}

/// The envelope returned to callers of the extraction service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResponse {
    pub is_success: bool,
    pub data: ExtractionResult,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_pages: Vec<PageFailure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExtractionResponse {
    /// `is_success` holds when at least one page produced output.
    pub fn new(pages: Vec<PageResult>, failed_pages: Vec<PageFailure>) -> Self {
        let is_success = !pages.is_empty();
        let mut failed_pages = failed_pages;
        failed_pages.sort_by_key(|f| f.page_no);
        Self {
            is_success,
            data: ExtractionResult::from_pages(pages),
            failed_pages,
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            is_success: false,
            data: ExtractionResult::from_pages(vec![]),
            failed_pages: vec![],
            error: Some(message.into()),
        }
    }
}

/// `page_no` goes over the wire as a string ("1") but is accepted as either
/// a string or a number.
mod page_no_string {
    use super::*;

    pub fn serialize<S: Serializer>(page_no: &u32, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&page_no.to_string())
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u32),
        Str(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
        match Raw::deserialize(d)? {
            Raw::Num(n) => Ok(n),
            Raw::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
        }
    }
}
