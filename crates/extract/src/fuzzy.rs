/// Levenshtein edit distance over chars using the two-row O(min(m,n)) space algorithm.
pub fn levenshtein_distance(s1: &str, s2: &str) -> usize {
    let a: Vec<char> = s1.chars().collect();
    let b: Vec<char> = s2.chars().collect();
    let (m, n) = (a.len(), b.len());

    if m == 0 {
        return n;
    }
    if n == 0 {
        return m;
    }

    // Keep the shorter string in the inner loop to minimise allocation.
    let (a, b, m, n) = if m <= n { (a, b, m, n) } else { (b, a, n, m) };

    let mut prev: Vec<usize> = (0..=m).collect();
    let mut curr = vec![0usize; m + 1];

    for j in 1..=n {
        curr[0] = j;
        for i in 1..=m {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[i] = (prev[i] + 1).min(curr[i - 1] + 1).min(prev[i - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[m]
}

/// Edit-distance ratio in `[0.0, 1.0]`: `1 - distance / max_len`.
/// Two empty strings are identical.
pub fn similarity(s1: &str, s2: &str) -> f32 {
    let max_len = s1.chars().count().max(s2.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - (levenshtein_distance(s1, s2) as f32 / max_len as f32)
}

/// Lowercases and collapses anything that isn't alphanumeric into single
/// spaces, so `"Unit-Price:"` and `"unit price"` compare equal.
pub fn normalize(s: &str) -> String {
    s.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Best `(index, score)` of `candidate` against `vocabulary`, comparing
/// normalized forms. Earlier entries win ties.
pub fn best_match<'a, I>(candidate: &str, vocabulary: I) -> Option<(usize, f32)>
where
    I: IntoIterator<Item = &'a str>,
{
    let needle = normalize(candidate);
    vocabulary
        .into_iter()
        .enumerate()
        .map(|(idx, entry)| (idx, similarity(&needle, &normalize(entry))))
        .fold(None, |best: Option<(usize, f32)>, (idx, score)| match best {
            Some((_, s)) if s >= score => best,
            _ => Some((idx, score)),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_strings_are_zero() {
        assert_eq!(levenshtein_distance("abc", "abc"), 0);
        assert_eq!(levenshtein_distance("", ""), 0);
    }

    #[test]
    fn empty_string_is_length_of_other() {
        assert_eq!(levenshtein_distance("", "abc"), 3);
        assert_eq!(levenshtein_distance("abc", ""), 3);
    }

    #[test]
    fn single_edits() {
        assert_eq!(levenshtein_distance("cat", "bat"), 1);
        assert_eq!(levenshtein_distance("abc", "abcd"), 1);
        assert_eq!(levenshtein_distance("abcd", "abc"), 1);
    }

    #[test]
    fn commutative() {
        assert_eq!(
            levenshtein_distance("consultation", "cansukation"),
            levenshtein_distance("cansukation", "consultation")
        );
    }

    #[test]
    fn counts_chars_not_bytes() {
        assert_eq!(levenshtein_distance("₹500", "$500"), 1);
    }

    #[test]
    fn similarity_ratio() {
        assert_eq!(similarity("qty", "qty"), 1.0);
        let s = similarity("consultaton", "consultation");
        assert!((s - 11.0 / 12.0).abs() < 1e-6, "got {s}");
        assert!(similarity("xyzqqq", "consultation") < 0.5);
    }

    #[test]
    fn normalize_strips_punctuation() {
        assert_eq!(normalize("  Unit-Price: "), "unit price");
        assert_eq!(normalize("QTY."), "qty");
        assert_eq!(normalize("..."), "");
    }

    #[test]
    fn best_match_prefers_earliest_on_tie() {
        let vocab = ["rate", "rate"];
        assert_eq!(best_match("Rate", vocab), Some((0, 1.0)));
        let vocab = ["amount", "quantity"];
        assert_eq!(best_match("Quantlty", vocab).map(|(i, _)| i), Some(1));
        assert_eq!(best_match("x", std::iter::empty::<&str>()), None);
    }
}
