// src/text.rs
//! Text normalization and fuzzy comparison shared by the brand and category
//! matchers.

use unicode_normalization::UnicodeNormalization;

/// Default acceptance threshold for fuzzy matches.
pub const DEFAULT_SIMILARITY_CUTOFF: f64 = 0.90;

pub fn compress_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Brand key: NFKC, trademark glyphs removed, lowercased, whitespace collapsed.
pub fn normalize_text(value: &str) -> String {
    // NFKC rewrites ™ as "TM", so glyphs go before folding.
    let folded: String = value
        .chars()
        .filter(|c| !is_trademark_glyph(*c))
        .nfkc()
        .filter(|c| !is_trademark_glyph(*c))
        .collect::<String>()
        .to_lowercase();
    compress_whitespace(&folded)
}

fn is_trademark_glyph(c: char) -> bool {
    matches!(c, '\u{00ae}' | '\u{2122}' | '\u{00a9}')
}

/// Category key: NFKC, lowercased, whitespace collapsed.
pub fn normalize_label(value: &str) -> String {
    let folded = value.nfkc().collect::<String>().to_lowercase();
    compress_whitespace(&folded)
}

/// Ratcliff/Obershelp similarity: `2 * matched / (len(a) + len(b))`, where
/// `matched` sums the recursively found longest common blocks.
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    let matched = matched_chars(&a, &b);
    2.0 * matched as f64 / total as f64
}

fn matched_chars(a: &[char], b: &[char]) -> usize {
    let mut matched = 0;
    let mut queue = vec![(0, a.len(), 0, b.len())];
    while let Some((alo, ahi, blo, bhi)) = queue.pop() {
        let (i, j, k) = longest_match(a, b, alo, ahi, blo, bhi);
        if k == 0 {
            continue;
        }
        matched += k;
        if alo < i && blo < j {
            queue.push((alo, i, blo, j));
        }
        if i + k < ahi && j + k < bhi {
            queue.push((i + k, ahi, j + k, bhi));
        }
    }
    matched
}

/// Earliest longest common run inside `a[alo..ahi]` and `b[blo..bhi]`.
fn longest_match(
    a: &[char],
    b: &[char],
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let (mut best_i, mut best_j, mut best_k) = (alo, blo, 0);
    // run[j + 1] = length of the match ending at (i - 1, j)
    let mut run = vec![0usize; b.len() + 1];
    for i in alo..ahi {
        let mut next = vec![0usize; b.len() + 1];
        for j in blo..bhi {
            if a[i] != b[j] {
                continue;
            }
            let k = run[j] + 1;
            next[j + 1] = k;
            if k > best_k {
                best_i = i + 1 - k;
                best_j = j + 1 - k;
                best_k = k;
            }
        }
        run = next;
    }
    (best_i, best_j, best_k)
}

/// Index of the candidate with the highest ratio against `query`, if that
/// ratio reaches `cutoff`. Earlier candidates win ties.
pub fn best_match<'a, I>(query: &str, candidates: I, cutoff: f64) -> Option<(usize, f64)>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut best: Option<(usize, f64)> = None;
    for (idx, candidate) in candidates.into_iter().enumerate() {
        let score = similarity_ratio(query, candidate);
        if best.is_none_or(|(_, s)| score > s) {
            best = Some((idx, score));
        }
    }
    best.filter(|(_, score)| *score >= cutoff)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_glyphs_and_width() {
        assert_eq!(normalize_text("Nintendo®"), "nintendo");
        assert_eq!(normalize_text("  ＮＩＫＥ  ™ "), "nike");
        assert_eq!(normalize_text("Nintendo™"), "nintendo");
        assert_eq!(normalize_text("©Sanrio"), "sanrio");
        assert_eq!(normalize_text("Louis   Vuitton"), "louis vuitton");
    }

    #[test]
    fn label_keeps_glyphs_but_folds_width() {
        assert_eq!(normalize_label("ＤＩＹ・工具"), "diy・工具");
        assert_eq!(normalize_label("Brand®"), "brand®");
    }

    #[test]
    fn ratio_matches_reference_values() {
        assert!((similarity_ratio("abcd", "bcde") - 0.75).abs() < 1e-9);
        assert!((similarity_ratio("same", "same") - 1.0).abs() < 1e-9);
        assert_eq!(similarity_ratio("abc", "xyz"), 0.0);
        assert_eq!(similarity_ratio("", ""), 1.0);
    }

    #[test]
    fn ratio_recurses_on_both_sides() {
        // "ab" and "cd" match on either side of the mismatch
        let r = similarity_ratio("abxcd", "abycd");
        assert!((r - 0.8).abs() < 1e-9);
    }

    #[test]
    fn best_match_respects_cutoff() {
        let names = ["nintendo", "sony", "uniqlo"];
        assert_eq!(best_match("nintendo", names, 0.9).map(|m| m.0), Some(0));
        assert_eq!(best_match("nintend", names, 0.9).map(|m| m.0), Some(0));
        assert!(best_match("nin", names, 0.9).is_none());
        assert!(best_match("anything", std::iter::empty(), 0.9).is_none());
    }
}
