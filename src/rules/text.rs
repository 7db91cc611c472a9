//! Numeric extraction from descriptive rule text
//!
//! Bracketed footnotes (`[3]`) and wave labels (`wave 3`, `W5`) are skipped,
//! percentages become fractions and simple fractions (`1/3`) are divided out.

/// Every number in `text`, in order of appearance.
pub fn extract_numbers(text: &str) -> Vec<f64> {
    let chars: Vec<char> = text.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '[' {
            while i < chars.len() && chars[i] != ']' {
                i += 1;
            }
            i += 1;
            continue;
        }
        if !c.is_ascii_digit() {
            i += 1;
            continue;
        }

        let start = i;
        let (mut value, end) = scan_number(&chars, i);
        i = end;
        if is_label(&chars, start) {
            continue;
        }
        if i + 1 < chars.len() && chars[i] == '/' && chars[i + 1].is_ascii_digit() {
            let (den, end) = scan_number(&chars, i + 1);
            i = end;
            if den != 0.0 {
                value /= den;
            }
        }
        let mut j = i;
        while j < chars.len() && chars[j] == ' ' {
            j += 1;
        }
        if j < chars.len() && chars[j] == '%' {
            value /= 100.0;
            i = j + 1;
        }
        out.push(value);
    }
    out
}

fn scan_number(chars: &[char], start: usize) -> (f64, usize) {
    let mut end = start;
    while end < chars.len()
        && (chars[end].is_ascii_digit()
            || (chars[end] == '.' && chars.get(end + 1).is_some_and(|c| c.is_ascii_digit())))
    {
        end += 1;
    }
    let literal: String = chars[start..end].iter().collect();
    (literal.parse().unwrap_or(0.0), end)
}

/// Digits glued to a letter (`W5`) or following the word "wave".
fn is_label(chars: &[char], start: usize) -> bool {
    if start > 0 && chars[start - 1].is_ascii_alphabetic() {
        return true;
    }
    let mut k = start;
    while k > 0 && matches!(chars[k - 1], ' ' | '-') {
        k -= 1;
    }
    if k < 4 {
        return false;
    }
    let word: String = chars[k - 4..k].iter().collect();
    word.eq_ignore_ascii_case("wave") && (k == 4 || !chars[k - 5].is_ascii_alphabetic())
}

/// First number; the value of a single-value field.
pub fn first_number(text: &str) -> Option<f64> {
    extract_numbers(text).first().copied()
}

/// First two numbers as `(low, high)`; the value of a range field.
pub fn first_range(text: &str) -> Option<(f64, f64)> {
    match extract_numbers(text).as_slice() {
        [a, b, ..] => Some((a.min(*b), a.max(*b))),
        _ => None,
    }
}

/// First clause (split on `;` and newlines) mentioning every key.
///
/// Keys match against the clause lowercased with whitespace removed, so
/// `"wave2"` finds "Wave 2 retraces...".
pub fn clause_with<'a>(text: &'a str, keys: &[&str]) -> Option<&'a str> {
    text.split(|c| c == ';' || c == '\n').find(|clause| {
        let squashed: String = clause
            .chars()
            .filter(|c| !c.is_whitespace())
            .flat_map(char::to_lowercase)
            .collect();
        keys.iter().all(|k| squashed.contains(k))
    })
}
