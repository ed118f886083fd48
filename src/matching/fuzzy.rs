//! Partial fuzzy similarity.

/// Minimum [`partial_ratio`] for a fuzzy rule to match.
pub const FUZZY_THRESHOLD: u8 = 90;

/// Similarity (0-100) of the shorter string against the best-matching
/// equal-length window of the longer one.
///
/// Each window is scored as `(2m - d) / 2m` where `m` is the window length
/// and `d` the optimal-string-alignment edit distance, so a single typo or
/// transposition in a long word still scores highly.
///
/// ```
/// use papertray::matching::partial_ratio;
///
/// assert_eq!(partial_ratio("Invoice", "Your invoice is attached"), 93);
/// assert_eq!(partial_ratio("invoice", "Your invoice is attached"), 100);
/// ```
#[must_use]
pub fn partial_ratio(a: &str, b: &str) -> u8 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    if short.is_empty() {
        return 0;
    }

    let needle: String = short.iter().collect();
    let width = short.len();
    let mut best = 0u8;
    for window in long.windows(width) {
        let candidate: String = window.iter().collect();
        best = best.max(window_ratio(&needle, &candidate, width));
        if best == 100 {
            break;
        }
    }
    best
}

fn window_ratio(needle: &str, window: &str, width: usize) -> u8 {
    let total = 2 * width;
    let distance = strsim::osa_distance(needle, window).min(total);
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let ratio = ((total - distance) as f64 * 100.0 / total as f64).round() as u8;
    ratio
}

/// Removes everything except word characters and whitespace.
#[must_use]
pub fn strip_punctuation(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect()
}

/// Evaluates a fuzzy rule: punctuation stripped from both sides, optional
/// case folding, then [`partial_ratio`] against [`FUZZY_THRESHOLD`].
#[must_use]
pub fn fuzzy_matches(pattern: &str, text: &str, case_sensitive: bool) -> bool {
    let mut pattern = strip_punctuation(pattern).trim().to_string();
    let mut text = strip_punctuation(text);
    if pattern.is_empty() {
        return false;
    }
    if !case_sensitive {
        pattern = pattern.to_lowercase();
        text = text.to_lowercase();
    }
    partial_ratio(&pattern, &text) >= FUZZY_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_substring_is_100() {
        assert_eq!(partial_ratio("bank", "first national bank ltd"), 100);
        assert_eq!(partial_ratio("first national bank ltd", "bank"), 100);
    }

    #[test]
    fn test_transposition_scores_high() {
        assert_eq!(partial_ratio("invioce", "the invoice"), 93);
    }

    #[test]
    fn test_empty_scores_zero() {
        assert_eq!(partial_ratio("", "anything"), 0);
        assert_eq!(partial_ratio("", ""), 0);
    }

    #[test]
    fn test_fuzzy_strips_punctuation_and_case() {
        assert!(fuzzy_matches("A.C.M.E. Corp", "Letter from acme corp, re: billing", false));
        assert!(!fuzzy_matches("A.C.M.E. Corp", "Letter from acme corp", true));
        assert!(!fuzzy_matches("...", "anything", false));
    }

    #[test]
    fn test_unrelated_text_does_not_match() {
        assert!(!fuzzy_matches("insurance", "grocery receipt", false));
    }
}
