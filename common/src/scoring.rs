//! スコアリングエンジン
//!
//! 料理名のあいまい一致と食材セットの一致度からコーパスの候補を絞り込み、
//! アレルゲンごとの含有率（件数ベース）と確率（スコア重み付き）を集計する。
//!
//! ## 処理フロー
//! 1. 各レシピのタイトル類似度を計算（空タイトルは除外）
//! 2. クエリ食材に対する一致度を計算
//! 3. 閾値で候補を残し、合成スコア降順に並べる（同点はコーパス順）
//! 4. 候補ごとのアレルゲン検出結果を集計

use crate::similarity::{contains_whole_word, ratio, token_set_overlap};
use crate::types::{MatchCandidate, RecipeRecord};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 合成スコアにおけるタイトルの重み
pub const TITLE_WEIGHT: f64 = 0.5;
/// 合成スコアにおける食材の重み
pub const INGREDIENT_WEIGHT: f64 = 0.5;
/// トークン包含判定を行うクエリ食材の最小文字数
const TOKEN_MATCH_MIN_LEN: usize = 4;

/// 照合の閾値（0〜100）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchThresholds {
    pub title: f64,
    pub ingredient: f64,
}

impl Default for MatchThresholds {
    fn default() -> Self {
        Self {
            title: 70.0,
            ingredient: 60.0,
        }
    }
}

/// 小数点以下2桁に丸める（0.5は0から遠い方へ）
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn combined_score(title_score: f64, ingredient_score: f64) -> f64 {
    TITLE_WEIGHT * title_score + INGREDIENT_WEIGHT * ingredient_score
}

/// クエリ食材1件がレシピ食材1件にヒットするか
fn ingredient_hit(query: &str, record_ingredient: &str, threshold: f64) -> bool {
    if contains_whole_word(query, record_ingredient) {
        return true;
    }
    if query.trim().chars().count() >= TOKEN_MATCH_MIN_LEN
        && token_set_overlap(query, record_ingredient)
    {
        return true;
    }
    ratio(query, record_ingredient) >= threshold
}

/// 食材セットの一致度（0〜100）
///
/// クエリ食材のうち、レシピ側のいずれかの食材にヒットした割合。
/// クエリが空なら0。
pub fn score_ingredients<Q: AsRef<str>, R: AsRef<str>>(
    query_ingredients: &[Q],
    record_ingredients: &[R],
    threshold: f64,
) -> f64 {
    if query_ingredients.is_empty() {
        return 0.0;
    }

    let hits = query_ingredients
        .iter()
        .filter(|q| {
            record_ingredients
                .iter()
                .any(|r| ingredient_hit(q.as_ref(), r.as_ref(), threshold))
        })
        .count();

    hits as f64 / query_ingredients.len() as f64 * 100.0
}

/// 料理名（と任意の食材）でコーパスをあいまい照合する
///
/// # Arguments
/// * `query_dish` - 料理名
/// * `query_ingredients` - メイン食材（空可）
/// * `corpus` - 照合対象のレシピ
/// * `thresholds` - タイトル・食材の閾値
///
/// # Returns
/// 残った候補。合成スコア降順、同点はコーパス順
pub fn fuzzy_dish_match<'a, S: AsRef<str> + Sync>(
    query_dish: &str,
    query_ingredients: &[S],
    corpus: &'a [RecipeRecord],
    thresholds: MatchThresholds,
) -> Vec<MatchCandidate<'a>> {
    let mut candidates: Vec<MatchCandidate<'a>> = corpus
        .par_iter()
        .enumerate()
        .filter_map(|(position, record)| {
            if record.title.trim().is_empty() {
                return None;
            }

            let title_score = ratio(query_dish, &record.title);
            let ingredient_score =
                score_ingredients(query_ingredients, &record.ingredients, thresholds.ingredient);

            let keep = title_score >= thresholds.title
                || (!query_ingredients.is_empty() && ingredient_score >= thresholds.ingredient);
            if !keep {
                return None;
            }

            Some(MatchCandidate {
                record,
                position,
                title_score,
                ingredient_score,
                combined_score: combined_score(title_score, ingredient_score),
            })
        })
        .collect();

    // 安定ソート: 同点はコーパス順のまま
    candidates.sort_by(|a, b| b.combined_score.total_cmp(&a.combined_score));
    candidates
}

/// 候補1件分のアレルゲン検出結果
#[derive(Debug, Clone, PartialEq)]
pub struct AllergenHits {
    /// 確率集計での重み（合成スコア）
    pub weight: f64,
    /// アレルゲンごとの検出有無（`allergens` と同じ並び）
    pub hits: Vec<bool>,
}

impl AllergenHits {
    pub fn any(&self) -> bool {
        self.hits.iter().any(|h| *h)
    }
}

/// アレルゲン集計結果（すべて0〜100、小数点以下2桁）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AllergenStats {
    pub total: usize,
    pub recipes_with_any_allergen: usize,
    pub percentage_with_any_allergen: f64,
    /// 件数ベースの含有率
    pub allergen_breakdown: BTreeMap<String, f64>,
    pub probability_with_any_allergen: f64,
    /// スコア重み付きの確率
    pub probability_breakdown: BTreeMap<String, f64>,
}

impl AllergenStats {
    /// 候補ごとの検出結果を集計する
    ///
    /// 重みの総和が0のとき確率はすべて0。
    pub fn from_hits(allergens: &[String], rows: &[AllergenHits]) -> Self {
        let total = rows.len();
        let total_weight: f64 = rows.iter().map(|r| r.weight).sum();

        let percentage = |count: usize| -> f64 {
            if total == 0 {
                0.0
            } else {
                round2(count as f64 / total as f64 * 100.0)
            }
        };
        let probability = |weight: f64| -> f64 {
            if total_weight <= 0.0 {
                0.0
            } else {
                round2((weight / total_weight * 100.0).clamp(0.0, 100.0))
            }
        };

        let mut allergen_breakdown = BTreeMap::new();
        let mut probability_breakdown = BTreeMap::new();
        for (i, allergen) in allergens.iter().enumerate() {
            let matched = rows.iter().filter(|r| r.hits.get(i).copied().unwrap_or(false));
            let (count, weight) = matched.fold((0usize, 0.0f64), |(c, w), r| (c + 1, w + r.weight));
            allergen_breakdown.insert(allergen.clone(), percentage(count));
            probability_breakdown.insert(allergen.clone(), probability(weight));
        }

        let any_rows = rows.iter().filter(|r| r.any());
        let (any_count, any_weight) = any_rows.fold((0usize, 0.0f64), |(c, w), r| (c + 1, w + r.weight));

        Self {
            total,
            recipes_with_any_allergen: any_count,
            percentage_with_any_allergen: percentage(any_count),
            allergen_breakdown,
            probability_with_any_allergen: probability(any_weight),
            probability_breakdown,
        }
    }
}

/// 候補それぞれについて検出関数を適用し、集計する
///
/// `detects` はレシピ1件とアレルゲン一覧（小文字・重複除去済み）を受け取り、
/// 同じ並びで検出有無を返す。
pub fn aggregate_allergens<F>(
    candidates: &[MatchCandidate<'_>],
    allergens: &[String],
    detects: F,
) -> AllergenStats
where
    F: Fn(&RecipeRecord, &[String]) -> Vec<bool> + Sync,
{
    let keys = canonical_allergens(allergens);
    let rows: Vec<AllergenHits> = candidates
        .par_iter()
        .map(|c| AllergenHits {
            weight: c.combined_score,
            hits: detects(c.record, &keys),
        })
        .collect();
    AllergenStats::from_hits(&keys, &rows)
}

/// アレルゲン名を小文字化し、順序を保って重複除去する
pub fn canonical_allergens<S: AsRef<str>>(allergens: &[S]) -> Vec<String> {
    let mut keys: Vec<String> = Vec::with_capacity(allergens.len());
    for allergen in allergens {
        let key = allergen.as_ref().trim().to_lowercase();
        if !key.is_empty() && !keys.contains(&key) {
            keys.push(key);
        }
    }
    keys
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, title: &str, ingredients: &[&str]) -> RecipeRecord {
        RecipeRecord::new(id, title, ingredients.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(100.0 / 3.0), 33.33);
        assert_eq!(round2(200.0 / 3.0), 66.67);
        assert_eq!(round2(12.345), 12.35);
        assert_eq!(round2(0.0), 0.0);
    }

    #[test]
    fn test_score_ingredients_whole_word() {
        let score = score_ingredients(&["egg"], &["2 large eggs", "1 egg yolk"], 90.0);
        assert_eq!(score, 100.0);
    }

    #[test]
    fn test_score_ingredients_token_overlap_needs_length() {
        // "ham" は3文字なのでトークン判定は使わない。単語一致もしない
        assert_eq!(score_ingredients(&["ham"], &["hamburger buns"], 95.0), 0.0);
        assert_eq!(score_ingredients(&["mozzarella"], &["shredded mozzarella"], 95.0), 100.0);
    }

    #[test]
    fn test_score_ingredients_fuzzy_threshold() {
        // "parmesan" vs "parmesean" は類似度89
        assert_eq!(score_ingredients(&["parmesan"], &["parmesean"], 80.0), 100.0);
        assert_eq!(score_ingredients(&["parmesan"], &["parmesean"], 95.0), 0.0);
    }

    #[test]
    fn test_score_ingredients_partial_and_empty() {
        let score = score_ingredients(&["chicken", "saffron", "okra"], &["chicken breast"], 90.0);
        assert_eq!(round2(score), 33.33);
        let empty: [&str; 0] = [];
        assert_eq!(score_ingredients(&empty, &["chicken"], 60.0), 0.0);
    }

    #[test]
    fn test_fuzzy_dish_match_orders_and_filters() {
        let corpus = vec![
            record("1", "Chicken Parmesan", &["chicken", "mozzarella"]),
            record("2", "Beef Stew", &["beef", "carrots"]),
            record("3", "   ", &["chicken"]),
            record("4", "chicken parmesan", &["chicken"]),
            record("5", "Chicken Parmigiana", &["chicken", "mozzarella", "flour"]),
        ];
        let empty: [&str; 0] = [];
        let result = fuzzy_dish_match("chicken parmesan", &empty, &corpus, MatchThresholds::default());

        let ids: Vec<&str> = result.iter().map(|c| c.record.id.as_str()).collect();
        // 同点の1と4はコーパス順
        assert_eq!(ids[0], "1");
        assert_eq!(ids[1], "4");
        assert!(!ids.contains(&"2"));
        assert!(!ids.contains(&"3"));
    }

    #[test]
    fn test_fuzzy_dish_match_ingredient_override() {
        let corpus = vec![record("1", "Weeknight Bake", &["chicken", "shredded mozzarella", "flour"])];
        let thresholds = MatchThresholds::default();
        let result = fuzzy_dish_match("chicken parmesan", &["chicken", "mozzarella"], &corpus, thresholds);

        assert_eq!(result.len(), 1);
        let c = &result[0];
        assert!(c.title_score < thresholds.title);
        assert!(c.ingredient_score >= thresholds.ingredient);
        assert_eq!(c.combined_score, 0.5 * c.title_score + 0.5 * c.ingredient_score);
    }

    #[test]
    fn test_fuzzy_dish_match_no_override_without_ingredients() {
        let corpus = vec![record("1", "Weeknight Bake", &["chicken"])];
        let empty: [&str; 0] = [];
        let result = fuzzy_dish_match("chicken parmesan", &empty, &corpus, MatchThresholds::default());
        assert!(result.is_empty());
    }

    #[test]
    fn test_stats_weighted_and_unweighted() {
        let allergens = vec!["dairy".to_string(), "wheat".to_string()];
        let rows = vec![
            AllergenHits { weight: 100.0, hits: vec![true, false] },
            AllergenHits { weight: 50.0, hits: vec![true, true] },
            AllergenHits { weight: 50.0, hits: vec![false, false] },
        ];
        let stats = AllergenStats::from_hits(&allergens, &rows);

        assert_eq!(stats.total, 3);
        assert_eq!(stats.recipes_with_any_allergen, 2);
        assert_eq!(stats.percentage_with_any_allergen, 66.67);
        assert_eq!(stats.allergen_breakdown["dairy"], 66.67);
        assert_eq!(stats.allergen_breakdown["wheat"], 33.33);
        assert_eq!(stats.probability_with_any_allergen, 75.0);
        assert_eq!(stats.probability_breakdown["dairy"], 75.0);
        assert_eq!(stats.probability_breakdown["wheat"], 25.0);
    }

    #[test]
    fn test_stats_zero_weight_and_empty() {
        let allergens = vec!["soy".to_string()];
        let rows = vec![AllergenHits { weight: 0.0, hits: vec![true] }];
        let stats = AllergenStats::from_hits(&allergens, &rows);
        assert_eq!(stats.percentage_with_any_allergen, 100.0);
        assert_eq!(stats.probability_with_any_allergen, 0.0);
        assert_eq!(stats.probability_breakdown["soy"], 0.0);

        let empty = AllergenStats::from_hits(&allergens, &[]);
        assert_eq!(empty.total, 0);
        assert_eq!(empty.allergen_breakdown["soy"], 0.0);
    }

    #[test]
    fn test_stats_always_within_bounds() {
        let allergens = vec!["a".to_string(), "b".to_string()];
        let rows: Vec<AllergenHits> = (0..7)
            .map(|i| AllergenHits {
                weight: i as f64 * 13.7,
                hits: vec![i % 2 == 0, i % 3 == 0],
            })
            .collect();
        let stats = AllergenStats::from_hits(&allergens, &rows);
        for value in stats
            .allergen_breakdown
            .values()
            .chain(stats.probability_breakdown.values())
            .chain([stats.percentage_with_any_allergen, stats.probability_with_any_allergen].iter())
        {
            assert!((0.0..=100.0).contains(value), "out of range: {}", value);
        }
    }

    #[test]
    fn test_aggregate_allergens_uses_combined_score_as_weight() {
        let corpus = vec![
            record("1", "Pesto Pasta", &["basil", "pine nuts", "parmesan"]),
            record("2", "Pesto Pasta", &["basil", "olive oil"]),
        ];
        let candidates = fuzzy_dish_match("pesto pasta", &["basil", "parmesan"], &corpus, MatchThresholds::default());
        assert_eq!(candidates.len(), 2);

        let stats = aggregate_allergens(&candidates, &["Parmesan".to_string()], |r, keys| {
            keys.iter().map(|k| r.ingredients_text().contains(k.as_str())).collect()
        });
        // 1: 0.5*100 + 0.5*100 = 100, 2: 0.5*100 + 0.5*50 = 75
        assert_eq!(stats.allergen_breakdown["parmesan"], 50.0);
        assert_eq!(stats.probability_breakdown["parmesan"], round2(100.0 / 175.0 * 100.0));
        assert_eq!(stats.probability_breakdown["parmesan"], 57.14);
    }

    #[test]
    fn test_canonical_allergens() {
        let keys = canonical_allergens(&["Dairy", "dairy ", "", "Wheat"]);
        assert_eq!(keys, vec!["dairy", "wheat"]);
    }
}
