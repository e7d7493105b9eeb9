//! Page assembly: drops summary and furniture lines, tags the page type.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use medbill_core::{BillItem, PageFlag, PageResult, PageType};
use regex::Regex;
use tracing::debug;

use crate::config::PageConfig;
use crate::fuzzy::normalize;
use crate::rows::Row;

fn re_furniture() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| {
        Regex::new(r"(?i)^\s*(?:page\s*\d*\s*of\b|printed\s+on\b|page\s*\d+\s*$)").expect("invalid regex")
    })
}

/// Matches `keyword` as whole words, any run of whitespace between them.
fn keyword_pattern(keyword: &str) -> String {
    let words: Vec<String> = keyword.split_whitespace().map(regex::escape).collect();
    format!(r"(?i)\b{}\b", words.join(r"\s+"))
}

/// `keyword` with its words joined by optional spaces or hyphens, so
/// "sub total" also reads "Subtotal" and "Sub-Total".
fn summary_words(keyword: &str) -> String {
    let words: Vec<String> = keyword.split_whitespace().map(regex::escape).collect();
    words.join(r"[\s\-]*")
}

/// Recognizes total and subtotal lines by item name.
struct SummaryMatcher {
    /// One per keyword: the keyword opens the name, the rest is captured up
    /// to an optional `:`.
    leading: Vec<Regex>,
    /// Any keyword closing the name ("Bill Total").
    trailing: Option<Regex>,
    filler: BTreeSet<String>,
}

impl SummaryMatcher {
    fn new(config: &PageConfig) -> Self {
        let keywords: Vec<String> = config
            .summary_keywords
            .iter()
            .filter(|k| !k.trim().is_empty())
            .map(|k| summary_words(k))
            .collect();

        let leading = keywords
            .iter()
            .filter_map(|kw| Regex::new(&format!(r"(?i)^\s*{kw}\b(?P<rest>[^:]*)(?::.*)?$")).ok())
            .collect();
        let trailing = (!keywords.is_empty())
            .then(|| Regex::new(&format!(r"(?i)\b(?:{})\W*$", keywords.join("|"))).ok())
            .flatten();

        Self {
            leading,
            trailing,
            filler: config.summary_filler_words.iter().map(|w| w.to_lowercase()).collect(),
        }
    }

    /// A name opening with a keyword is a summary line only when nothing but
    /// filler words or numbers follow it, so "Total Knee Replacement" stays.
    fn is_match(&self, name: &str) -> bool {
        if self.trailing.as_ref().is_some_and(|re| re.is_match(name)) {
            return true;
        }
        self.leading.iter().filter_map(|re| re.captures(name)).any(|caps| {
            caps.name("rest")
                .map_or("", |m| m.as_str())
                .split(|c: char| !c.is_alphanumeric())
                .filter(|w| !w.is_empty())
                .all(|w| w.chars().all(|c| c.is_ascii_digit()) || self.filler.contains(&w.to_lowercase()))
        })
    }
}

pub struct PageAggregator {
    classify_head_rows: usize,
    classify_tail_rows: usize,
    page_types: Vec<(Regex, PageType)>,
    summary: SummaryMatcher,
    ignored: BTreeSet<String>,
}

impl PageAggregator {
    pub fn new(config: &PageConfig) -> Self {
        let page_types = config
            .page_type_keywords
            .iter()
            .filter(|k| !k.keyword.trim().is_empty())
            .filter_map(|k| Regex::new(&keyword_pattern(&k.keyword)).ok().map(|re| (re, k.page_type)))
            .collect();

        Self {
            classify_head_rows: config.classify_head_rows,
            classify_tail_rows: config.classify_tail_rows,
            page_types,
            summary: SummaryMatcher::new(config),
            ignored: config.ignored_phrases.iter().map(|p| normalize(p)).collect(),
        }
    }

    /// Subtotal lines, page furniture and stray headings.
    pub fn is_noise(&self, item: &BillItem) -> bool {
        let name = item.item_name.trim();
        self.summary.is_match(name)
            || re_furniture().is_match(name)
            || (!name.is_empty() && self.ignored.contains(&normalize(name)))
    }

    /// Page type from keywords in the first and last few rows. The first
    /// configured keyword found wins; a page with no rows is `Unknown`.
    pub fn classify(&self, rows: &[Row]) -> PageType {
        if rows.is_empty() {
            return PageType::Unknown;
        }
        let tail_start = rows.len().saturating_sub(self.classify_tail_rows).max(self.classify_head_rows);
        let text = rows
            .iter()
            .take(self.classify_head_rows)
            .chain(rows.iter().skip(tail_start))
            .map(Row::text)
            .collect::<Vec<_>>()
            .join("\n");

        self.page_types
            .iter()
            .find(|(re, _)| re.is_match(&text))
            .map_or(PageType::BillDetail, |(_, page_type)| *page_type)
    }

    pub fn aggregate(&self, page_no: u32, rows: &[Row], items: Vec<BillItem>, flags: BTreeSet<PageFlag>) -> PageResult {
        let page_type = self.classify(rows);
        let bill_items = items
            .into_iter()
            .filter(|item| {
                let noise = self.is_noise(item);
                if noise {
                    debug!(page = page_no, item = %item.item_name, "dropping summary or furniture line");
                }
                !noise
            })
            .collect();
        PageResult {
            page_no,
            page_type,
            bill_items,
            flags,
        }
    }
}
