//! OCR-tolerant number parsing for quantity / rate / amount cells.

const CURRENCY_SYMBOLS: &[char] = &['₹', '$', '€', '£', '¥'];
const CURRENCY_PREFIXES: &[&str] = &["inr", "rs.", "rs"];

/// Parse a numeric cell as printed on a bill.
///
/// Handles currency symbols and `Rs`/`INR` prefixes, `1,234.56` and Indian
/// `1,00,000` grouping, a decimal comma (`12,34`), a decimal point read as a
/// space (`448 00`), the `500/-` suffix, and the usual OCR letter/digit
/// confusions (`O`→`0`, `l`/`I`/`|`→`1`, `S`→`5`, `B`→`8`). Returns `None`
/// unless the text holds at least one real digit and nothing else alphabetic.
pub fn parse_number(text: &str) -> Option<f64> {
    let mut s: String = text.trim().chars().filter(|c| !CURRENCY_SYMBOLS.contains(c)).collect();

    let lower = s.to_lowercase();
    if let Some(prefix) = CURRENCY_PREFIXES.iter().find(|p| lower.starts_with(**p)) {
        s = s[prefix.len()..].to_string();
    }

    if !s.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let s: String = s
        .trim_end_matches(|c: char| !c.is_alphanumeric())
        .trim_start_matches(|c: char| !(c.is_alphanumeric() || matches!(c, '-' | '+' | '.')))
        .chars()
        .map(|c| match c {
            'O' | 'o' => '0',
            'l' | 'I' | '|' => '1',
            'S' => '5',
            'B' => '8',
            other => other,
        })
        .collect();
    if s.chars().any(char::is_alphabetic) {
        return None;
    }

    let s = join_space_groups(&s);
    let s = resolve_commas(&s);
    let s = collapse_dots(&s);

    let (sign, digits) = match s.strip_prefix('-') {
        Some(rest) => (-1.0, rest.trim_start()),
        None => (1.0, s.strip_prefix('+').unwrap_or(&s).trim_start()),
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }
    digits
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|v| sign * v)
}

/// Whether the text would parse as a number.
pub fn looks_numeric(text: &str) -> bool {
    parse_number(text).is_some()
}

/// `"448 00"` → `"448.00"`; other internal spaces are dropped (`"1 234"` → `"1234"`).
fn join_space_groups(s: &str) -> String {
    let parts: Vec<&str> = s.split_whitespace().collect();
    match parts.as_slice() {
        [] => String::new(),
        [single] => single.to_string(),
        [head @ .., last]
            if last.len() == 2
                && last.chars().all(|c| c.is_ascii_digit())
                && !head.iter().any(|p| p.contains('.')) =>
        {
            format!("{}.{}", head.concat(), last)
        }
        _ => parts.concat(),
    }
}

/// A lone comma followed by exactly two digits is a decimal comma; every
/// other comma is a thousands separator.
fn resolve_commas(s: &str) -> String {
    let commas = s.matches(',').count();
    if commas == 1 && !s.contains('.') {
        if let Some((_, frac)) = s.split_once(',') {
            if frac.len() == 2 && frac.chars().all(|c| c.is_ascii_digit()) {
                return s.replace(',', ".");
            }
        }
    }
    s.replace(',', "")
}

/// Keeps only the last `.` as the decimal point.
fn collapse_dots(s: &str) -> String {
    match s.rfind('.') {
        Some(pos) => {
            let (int, frac) = s.split_at(pos);
            format!("{}{}", int.replace('.', ""), frac)
        }
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_numbers() {
        assert_eq!(parse_number("500"), Some(500.0));
        assert_eq!(parse_number(" 49.99 "), Some(49.99));
        assert_eq!(parse_number("0.5"), Some(0.5));
    }

    #[test]
    fn thousands_separators() {
        assert_eq!(parse_number("1,234.56"), Some(1234.56));
        assert_eq!(parse_number("1,00,000"), Some(100000.0));
        assert_eq!(parse_number("1,000"), Some(1000.0));
    }

    #[test]
    fn decimal_comma() {
        assert_eq!(parse_number("12,34"), Some(12.34));
    }

    #[test]
    fn decimal_point_read_as_space() {
        assert_eq!(parse_number("448 00"), Some(448.0));
        assert_eq!(parse_number("1 448 50"), Some(1448.5));
        assert_eq!(parse_number("1 234"), Some(1234.0));
    }

    #[test]
    fn currency_and_suffixes() {
        assert_eq!(parse_number("₹1,200.00"), Some(1200.0));
        assert_eq!(parse_number("Rs. 500/-"), Some(500.0));
        assert_eq!(parse_number("INR 75"), Some(75.0));
        assert_eq!(parse_number("$5.50"), Some(5.5));
    }

    #[test]
    fn ocr_confusions() {
        assert_eq!(parse_number("5OO"), Some(500.0));
        assert_eq!(parse_number("1O0.0O"), Some(100.0));
        assert_eq!(parse_number("l2"), Some(12.0));
        assert_eq!(parse_number("2I"), Some(21.0));
        assert_eq!(parse_number("1S0"), Some(150.0));
        assert_eq!(parse_number("B0"), Some(80.0));
        assert_eq!(parse_number("1|0"), Some(110.0));
    }

    #[test]
    fn stray_punctuation() {
        assert_eq!(parse_number("500."), Some(500.0));
        assert_eq!(parse_number(":250"), Some(250.0));
        assert_eq!(parse_number("|120|"), Some(120.0));
        assert_eq!(parse_number("100..50"), Some(100.5));
    }

    #[test]
    fn signs() {
        assert_eq!(parse_number("-50"), Some(-50.0));
        assert_eq!(parse_number("+7"), Some(7.0));
    }

    #[test]
    fn rejects_text() {
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("-"), None);
        assert_eq!(parse_number("Ol"), None);
        assert_eq!(parse_number("Room 1"), None);
        assert_eq!(parse_number("Consultation"), None);
        assert_eq!(parse_number("12/03/2024"), None);
    }

    #[test]
    fn looks_numeric_mirrors_parse() {
        assert!(looks_numeric("1,500.00"));
        assert!(!looks_numeric("Qty"));
    }
}
