//! Text normalization and fuzzy matching for OCR- and accessibility-tree
//! derived strings. Ported data tables from the original confusable-
//! character mapping; logic re-expressed idiomatically.

/// A normalized view of some recognized text, produced once per string
/// and reused across the several match strategies `smart_text_contains`
/// tries.
#[derive(Debug, Clone, Default)]
pub struct ProcessedText {
    pub original: String,
    pub cleaned: String,
    pub no_spaces: String,
    pub words: Vec<String>,
    pub chars: Vec<char>,
}

impl ProcessedText {
    pub fn new(raw: &str) -> Self {
        let half_width = to_half_width(raw);
        let normalized = normalize_confusions(&half_width).to_lowercase();
        let cleaned = clean(&normalized);
        let no_spaces: String = cleaned.chars().filter(|c| !c.is_whitespace()).collect();
        let words: Vec<String> = cleaned.split_whitespace().map(|s| s.to_string()).collect();
        let chars: Vec<char> = no_spaces.chars().collect();
        ProcessedText {
            original: raw.to_string(),
            cleaned,
            no_spaces,
            words,
            chars,
        }
    }
}

/// Maps the ideographic space and the fullwidth punctuation/letter/digit
/// block (U+FF01..U+FF5E) down to their halfwidth ASCII equivalents.
fn to_half_width(s: &str) -> String {
    s.chars()
        .map(|c| {
            let code = c as u32;
            if code == 0x3000 {
                ' '
            } else if (0xFF01..=0xFF5E).contains(&code) {
                char::from_u32(code - 0xFEE0).unwrap_or(c)
            } else {
                c
            }
        })
        .collect()
}

/// Remaps characters OCR engines commonly confuse with digits:
/// `O/o -> 0`, `l/I/丨/｜ -> 1`, `Z/z -> 2`, `S/s -> 5`, `B -> 8`.
fn normalize_confusions(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            'O' | 'o' => '0',
            'l' | 'I' | '丨' | '｜' => '1',
            'Z' | 'z' => '2',
            'S' | 's' => '5',
            'B' => '8',
            other => other,
        })
        .collect()
}

/// Keeps CJK unified ideographs, word characters, and single-space
/// separators; every other run of characters collapses to one space.
fn clean(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_gap = false;
    for c in s.chars() {
        let keep = is_cjk(c) || c.is_alphanumeric() || c == '_' || c.is_whitespace();
        if keep && !c.is_whitespace() {
            out.push(c);
            in_gap = false;
        } else if !in_gap {
            out.push(' ');
            in_gap = true;
        }
    }
    out.trim().split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_cjk(c: char) -> bool {
    let code = c as u32;
    (0x4E00..=0x9FFF).contains(&code)
}

/// Ratio comparable to Python's `difflib.SequenceMatcher.ratio()`,
/// approximated as `1 - normalized_levenshtein_distance`.
fn similarity_ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let max_len = a.chars().count().max(b.chars().count()).max(1);
    let distance = strsim::levenshtein(a, b);
    1.0 - (distance as f64 / max_len as f64)
}

/// Tries, in order: exact-within-`cleaned`; exact-within-`no_spaces`;
/// every needle word is a substring of some processed word; fuzzy ratio
/// on the `no_spaces` forms >= 0.8.
pub fn smart_text_contains(processed: &ProcessedText, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    let needle_processed = ProcessedText::new(needle);

    if processed.cleaned.contains(&needle_processed.cleaned) {
        return true;
    }
    if processed.no_spaces.contains(&needle_processed.no_spaces) {
        return true;
    }
    if !needle_processed.words.is_empty()
        && needle_processed
            .words
            .iter()
            .all(|nw| processed.words.iter().any(|pw| pw.contains(nw.as_str())))
    {
        return true;
    }
    similarity_ratio(&processed.no_spaces, &needle_processed.no_spaces) >= 0.8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fullwidth_digits_normalize_to_halfwidth() {
        let processed = ProcessedText::new("ＯＫ");
        assert_eq!(processed.cleaned, "0k");
    }

    #[test]
    fn ocr_confusable_letters_normalize_to_digits() {
        let processed = ProcessedText::new("l0gin");
        assert_eq!(processed.cleaned, "10gin");
    }

    #[test]
    fn smart_contains_exact_match() {
        let processed = ProcessedText::new("Login Successful");
        assert!(smart_text_contains(&processed, "login successful"));
    }

    #[test]
    fn smart_contains_word_subset() {
        let processed = ProcessedText::new("welcome back to the dashboard");
        assert!(smart_text_contains(&processed, "dashboard"));
    }

    #[test]
    fn smart_contains_fuzzy_match() {
        let processed = ProcessedText::new("Settings");
        assert!(smart_text_contains(&processed, "Setings"));
    }

    #[test]
    fn smart_contains_rejects_unrelated_text() {
        let processed = ProcessedText::new("Home screen");
        assert!(!smart_text_contains(&processed, "checkout complete"));
    }
}
