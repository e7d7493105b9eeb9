//! Repairs character-level OCR noise in item names against a vocabulary.
//!
//! Three passes run in order: configured phrase corrections, a per-token
//! pass (known misspellings, then the closest vocabulary word), and a
//! whole-name pass that snaps a close name onto a vocabulary entry.
//! Running the corrector over its own output changes nothing.

use std::collections::{BTreeMap, BTreeSet};

use medbill_core::{BillItem, ItemFlag};
use regex::{NoExpand, Regex};
use tracing::debug;

use crate::config::SpellingConfig;
use crate::fuzzy::{best_match, normalize, similarity};

pub struct SpellCorrector {
    enabled: bool,
    threshold: f32,
    min_token_len: usize,
    vocabulary: Vec<String>,
    entries: BTreeSet<String>,
    words: BTreeSet<String>,
    known: BTreeMap<String, String>,
    phrases: Vec<(Regex, String)>,
}

impl SpellCorrector {
    pub fn new(config: &SpellingConfig) -> Self {
        let phrases: Vec<(Regex, String)> = config
            .phrase_corrections
            .iter()
            .filter_map(|(from, to)| Regex::new(&phrase_pattern(from)).ok().map(|re| (re, to.clone())))
            .collect();

        let known: BTreeMap<String, String> = config
            .known_misspellings
            .iter()
            .map(|(k, v)| (k.to_lowercase(), v.clone()))
            .collect();

        // Every word the corrector can emit counts as already correct.
        let words = config
            .vocabulary
            .iter()
            .chain(known.values())
            .chain(phrases.iter().map(|(_, to)| to))
            .flat_map(|s| normalize(s).split(' ').map(str::to_string).collect::<Vec<_>>())
            .filter(|w| !w.is_empty())
            .collect();

        Self {
            enabled: config.enabled,
            threshold: config.threshold,
            min_token_len: config.min_token_len,
            vocabulary: config.vocabulary.clone(),
            entries: config.vocabulary.iter().map(|v| normalize(v)).collect(),
            words,
            known,
            phrases,
        }
    }

    pub fn is_vocabulary_entry(&self, name: &str) -> bool {
        self.entries.contains(&normalize(name))
    }

    /// The corrected form of `name`; unchanged when nothing is close enough.
    pub fn correct_name(&self, name: &str) -> String {
        let phrased = self
            .phrases
            .iter()
            .fold(name.to_string(), |acc, (re, to)| re.replace_all(&acc, NoExpand(to)).into_owned());

        let tokened = phrased
            .split_whitespace()
            .map(|token| self.correct_token(token))
            .collect::<Vec<_>>()
            .join(" ");

        match best_match(&tokened, self.vocabulary.iter().map(String::as_str)) {
            Some((idx, score)) if score >= self.threshold && !tokened.is_empty() => self.vocabulary[idx].clone(),
            _ => tokened,
        }
    }

    fn correct_token(&self, token: &str) -> String {
        let core = token.trim_matches(|c: char| !c.is_alphanumeric());
        if core.chars().count() < self.min_token_len || !core.chars().all(char::is_alphabetic) {
            return token.to_string();
        }
        let lower = core.to_lowercase();
        if self.words.contains(&lower) {
            return token.to_string();
        }

        let replacement = self
            .known
            .get(&lower)
            .cloned()
            .or_else(|| self.closest_word(&lower));
        match replacement {
            Some(r) => token.replacen(core, &preserve_case(core, &r), 1),
            None => token.to_string(),
        }
    }

    /// Closest vocabulary word at or above the threshold. Ties between
    /// different words are left alone.
    fn closest_word(&self, lower: &str) -> Option<String> {
        let mut best: Option<(&str, f32)> = None;
        let mut tied = false;
        for word in &self.words {
            let score = similarity(lower, word);
            match best {
                Some((_, s)) if score < s => {}
                Some((_, s)) if score == s => tied = true,
                _ => {
                    best = Some((word.as_str(), score));
                    tied = false;
                }
            }
        }
        match best {
            Some((word, score)) if score >= self.threshold && !tied => Some(word.to_string()),
            _ => None,
        }
    }

    /// Correct the item's name in place, flagging names that neither changed
    /// nor already read as a vocabulary entry.
    pub fn apply(&self, item: &mut BillItem) {
        if !self.enabled {
            return;
        }
        let corrected = self.correct_name(&item.item_name);
        if corrected != item.item_name {
            debug!(from = %item.item_name, to = %corrected, "corrected item name");
            item.item_name = corrected;
        } else if !self.is_vocabulary_entry(&item.item_name) {
            item.flag(ItemFlag::SpellCorrectionSkipped);
        }
    }
}

/// Case-insensitive match of `phrase` that cannot start or end inside a
/// word. Ends that are punctuation carry no anchor.
fn phrase_pattern(phrase: &str) -> String {
    let anchor = |c: Option<char>| if c.is_some_and(char::is_alphanumeric) { r"\b" } else { "" };
    format!(
        "(?i){}{}{}",
        anchor(phrase.chars().next()),
        regex::escape(phrase),
        anchor(phrase.chars().last())
    )
}

/// Carry the original token's capitalization over to the replacement:
/// all caps stays all caps, a leading capital capitalizes every word.
fn preserve_case(original: &str, replacement: &str) -> String {
    if original.chars().all(|c| c.is_uppercase() || !c.is_alphabetic()) {
        return replacement.to_uppercase();
    }
    if original.chars().next().is_some_and(char::is_uppercase) {
        return replacement
            .split(' ')
            .map(|w| {
                let mut chars = w.chars();
                match chars.next() {
                    Some(c) => c.to_uppercase().chain(chars).collect(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ");
    }
    replacement.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corrector() -> SpellCorrector {
        SpellCorrector::new(&SpellingConfig::default())
    }

    #[test]
    fn corrects_close_names() {
        let c = corrector();
        assert_eq!(c.correct_name("Consultaton"), "Consultation");
        assert_eq!(c.correct_name("Nursing Chargs"), "Nursing Charges");
        assert_eq!(c.correct_name("Room Rent"), "Room Rent");
    }

    #[test]
    fn leaves_unknown_names_alone() {
        let c = corrector();
        assert_eq!(c.correct_name("Xyzqqq"), "Xyzqqq");
        assert_eq!(c.correct_name("Inj. Ceftriaxone 1gm"), "Inj. Ceftriaxone 1gm");
        assert_eq!(c.correct_name(""), "");
    }

    #[test]
    fn known_misspellings_keep_case() {
        let c = corrector();
        assert_eq!(c.correct_name("Cansukation Charge"), "Consultation Charge");
        assert_eq!(c.correct_name("NERSING"), "NURSING");
        assert_eq!(c.correct_name("ward rant"), "ward rent");
    }

    #[test]
    fn phrase_corrections_are_case_insensitive() {
        let c = corrector();
        assert_eq!(c.correct_name("M Rant Stzp Down Tou"), "Room Rent Step Down ICU");
    }

    #[test]
    fn phrase_corrections_match_whole_words() {
        let c = corrector();
        let out = c.correct_name("Room Rant Stzp Down Tou");
        assert!(!out.contains("Room Rent Step Down ICU"), "{out}");
        assert!(out.starts_with("Room "), "{out}");
        assert_eq!(out.split_whitespace().count(), 5);

        assert_eq!(c.correct_name("IP m rant stzp down tou"), "IP Room Rent Step Down ICU");
    }

    #[test]
    fn short_tokens_are_never_corrected() {
        let c = corrector();
        assert_eq!(c.correct_name("Bid xyz"), "Bid xyz");
    }

    #[test]
    fn ambiguous_tokens_are_skipped() {
        let config = SpellingConfig {
            vocabulary: vec!["bale".into(), "male".into()],
            known_misspellings: BTreeMap::new(),
            phrase_corrections: BTreeMap::new(),
            threshold: 0.7,
            ..SpellingConfig::default()
        };
        let c = SpellCorrector::new(&config);
        // "dale" is one edit from both.
        assert_eq!(c.correct_name("dale kit"), "dale kit");
    }

    #[test]
    fn correction_is_idempotent() {
        let c = corrector();
        for name in [
            "Consultaton",
            "Cansukation Charge",
            "m rant stzp down tou",
            "Nersmg Charges",
            "Xyzqqq",
            "RR -2-room rant",
            "Phisiotherapy session",
        ] {
            let once = c.correct_name(name);
            assert_eq!(c.correct_name(&once), once, "not idempotent for {name:?}");
        }
    }

    #[test]
    fn apply_flags_untouched_names() {
        let c = corrector();
        let mut unknown = BillItem::new("Xyzqqq");
        c.apply(&mut unknown);
        assert!(unknown.has_flag(ItemFlag::SpellCorrectionSkipped));

        let mut known = BillItem::new("Room Rent");
        c.apply(&mut known);
        assert!(known.confidence_flags.is_empty());

        let mut fixed = BillItem::new("Consultaton");
        c.apply(&mut fixed);
        assert_eq!(fixed.item_name, "Consultation");
        assert!(fixed.confidence_flags.is_empty());
    }

    #[test]
    fn disabled_corrector_does_nothing() {
        let c = SpellCorrector::new(&SpellingConfig { enabled: false, ..SpellingConfig::default() });
        let mut item = BillItem::new("Consultaton");
        c.apply(&mut item);
        assert_eq!(item.item_name, "Consultaton");
        assert!(item.confidence_flags.is_empty());
    }

    #[test]
    fn preserve_case_patterns() {
        assert_eq!(preserve_case("CONSULTATON", "consultation"), "CONSULTATION");
        assert_eq!(preserve_case("Mrant", "room rent"), "Room Rent");
        assert_eq!(preserve_case("rant", "rent"), "rent");
    }
}
