//! 文字列類似度
//!
//! - ratio: 編集距離ベースの類似度（0〜100、対称、大文字小文字無視）
//! - contains_whole_word: 単語境界つきの正規表現一致
//! - token_set_overlap: 空白区切りトークンの包含関係

use regex::RegexBuilder;
use std::collections::HashSet;

/// 編集距離ベースの類似度（0〜100の整数値）
///
/// `(1 - レーベンシュタイン距離 / 長い方の文字数) * 100` を四捨五入した値。
/// 置換も1操作と数えるので、挿入・削除だけで数える `2M / (|a| + |b|)` 型の
/// 比率より低めに出る（"kitten" / "sitting" は 57、後者なら 62）。
/// 閾値はこの尺度で設定する。どちらかが空なら0。
pub fn ratio(a: &str, b: &str) -> f64 {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    (strsim::normalized_levenshtein(&a, &b) * 100.0).round()
}

/// `needle` が `haystack` の中に単語として現れるか
pub fn contains_whole_word(needle: &str, haystack: &str) -> bool {
    let needle = needle.trim();
    if needle.is_empty() {
        return false;
    }
    let pattern = format!(r"\b{}\b", regex::escape(needle));
    match RegexBuilder::new(&pattern).case_insensitive(true).build() {
        Ok(re) => re.is_match(haystack),
        Err(_) => false,
    }
}

/// 空白区切りトークンの集合として、一方がもう一方を包含するか
pub fn token_set_overlap(a: &str, b: &str) -> bool {
    let a_tokens = tokens(a);
    let b_tokens = tokens(b);
    if a_tokens.is_empty() || b_tokens.is_empty() {
        return false;
    }
    a_tokens.is_subset(&b_tokens) || b_tokens.is_subset(&a_tokens)
}

fn tokens(text: &str) -> HashSet<String> {
    text.split_whitespace().map(|t| t.to_lowercase()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio_identical_ignores_case() {
        assert_eq!(ratio("Chicken Parmesan", "chicken parmesan"), 100.0);
    }

    #[test]
    fn test_ratio_symmetric() {
        assert_eq!(ratio("lasagna", "lasagne bolognese"), ratio("lasagne bolognese", "lasagna"));
    }

    #[test]
    fn test_ratio_empty_is_zero() {
        assert_eq!(ratio("", "pasta"), 0.0);
        assert_eq!(ratio("   ", "   "), 0.0);
    }

    #[test]
    fn test_ratio_known_value() {
        // kitten → sitting は編集距離3、長さ7
        assert_eq!(ratio("kitten", "sitting"), 57.0);
    }

    #[test]
    fn test_ratio_counts_substitution_as_one_edit() {
        // 1文字置換: 1 - 1/5
        assert_eq!(ratio("pasta", "pesta"), 80.0);
        // 1文字削除: 1 - 1/6
        assert_eq!(ratio("pasta", "pastas"), 83.0);
    }

    #[test]
    fn test_contains_whole_word() {
        assert!(contains_whole_word("egg", "2 large Egg yolks"));
        assert!(!contains_whole_word("egg", "1 eggplant, diced"));
        assert!(contains_whole_word("pine nuts", "1/4 cup pine nuts, toasted"));
        assert!(!contains_whole_word("", "anything"));
    }

    #[test]
    fn test_contains_whole_word_escapes_pattern() {
        assert!(!contains_whole_word("a.b", "axb"));
    }

    #[test]
    fn test_token_set_overlap() {
        assert!(token_set_overlap("mozzarella", "shredded mozzarella"));
        assert!(token_set_overlap("fresh basil leaves", "Basil"));
        assert!(!token_set_overlap("mozzarella cheese", "shredded mozzarella"));
    }
}
