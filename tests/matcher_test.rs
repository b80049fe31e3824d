//! 照合サービスのテスト
//!
//! search / detect / match / ingredientAnalysis / batch を小さなコーパスで検証

mod support;

use allergen_scout::analyzer::{EnrichmentCache, RetryPolicy};
use allergen_scout::error::ScoutError;
use allergen_scout::matcher::{
    AllergenMatcher, AnalysisSource, BatchEntry, DishRequest, MatchRequest, MatcherSettings,
};
use allergen_scout::store::MemoryStore;
use allergen_scout_common::{MappingTables, RecipeRecord, Usage, UsageNote};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use support::{record, ScriptedProvider, UnavailableStore};
use tempfile::tempdir;

fn settings() -> MatcherSettings {
    MatcherSettings {
        retry: RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            timeout: Duration::from_secs(5),
        },
        ..Default::default()
    }
}

fn matcher(records: Vec<RecipeRecord>) -> AllergenMatcher {
    AllergenMatcher::new(
        Arc::new(MemoryStore::new(records)),
        Arc::new(MappingTables::builtin()),
        settings(),
    )
}

fn enriched(id: &str, title: &str, ingredients: &[&str], usage: &[(&str, Usage)]) -> RecipeRecord {
    let mut record = record(id, title, ingredients);
    record.ingredient_analysis = Some(
        usage
            .iter()
            .map(|(ingredient, usage)| (ingredient.to_string(), UsageNote::new(*usage, "")))
            .collect(),
    );
    record.enrichment_complete = true;
    record
}

/// Chicken Parmesan: mozzarella → dairy、flour → wheat
#[tokio::test]
async fn test_detect_chicken_parmesan_scenario() {
    let matcher = matcher(vec![record(
        "1",
        "Chicken Parmesan",
        &["chicken", "shredded mozzarella", "flour"],
    )]);

    let report = matcher.detect("chicken parmesan", &["dairy", "wheat"]).await.unwrap();
    assert_eq!(report.total_recipes, 1);
    assert_eq!(report.recipes_with_any_allergen, 1);
    assert_eq!(report.percentage_with_any_allergen, 100.0);
    assert_eq!(report.allergen_breakdown["dairy"], 100.0);
    assert_eq!(report.allergen_breakdown["wheat"], 100.0);
}

/// 該当レシピなしは0件・0%
#[tokio::test]
async fn test_detect_no_recipes() {
    let matcher = matcher(vec![record("1", "Beef Stew", &["beef"])]);
    let report = matcher.detect("sushi", &["Fish"]).await.unwrap();
    assert_eq!(report.total_recipes, 0);
    assert_eq!(report.percentage_with_any_allergen, 0.0);
    assert_eq!(report.allergen_breakdown["fish"], 0.0);
}

/// 件数ベースの内訳
#[tokio::test]
async fn test_detect_breakdown() {
    let matcher = matcher(vec![
        record("1", "Pancakes", &["2 eggs", "1 cup milk", "flour"]),
        record("2", "Vegan Pancakes", &["oat milk", "flour"]),
        record("3", "Banana Pancakes", &["banana", "oats"]),
        record("4", "Potato Pancakes", &["potato", "onion"]),
    ]);
    let report = matcher.detect("pancakes", &["egg", "milk"]).await.unwrap();
    assert_eq!(report.total_recipes, 4);
    assert_eq!(report.recipes_with_any_allergen, 2);
    assert_eq!(report.percentage_with_any_allergen, 50.0);
    assert_eq!(report.allergen_breakdown["egg"], 25.0);
    assert_eq!(report.allergen_breakdown["milk"], 50.0);
}

/// search は入力どおりのアレルゲン名を返す
#[tokio::test]
async fn test_search_detected_allergens() {
    let mut with_picture = record("1", "Chicken Parmesan", &["chicken", "shredded mozzarella", "flour"]);
    with_picture.picture_link = Some("abc.jpg".into());
    let matcher = matcher(vec![
        with_picture,
        record("2", "Grilled Chicken", &["chicken", "olive oil"]),
    ]);

    let results = matcher.search("CHICKEN", &["Dairy", "peanuts"]).await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].detected_allergens, vec!["Dairy"]);
    assert_eq!(results[0].picture_link.as_deref(), Some("abc.jpg"));
    assert!(results[1].detected_allergens.is_empty());
}

/// ストア障害は操作全体の失敗
#[tokio::test]
async fn test_store_unavailable() {
    let matcher = AllergenMatcher::new(
        Arc::new(UnavailableStore),
        Arc::new(MappingTables::builtin()),
        settings(),
    );
    assert!(matches!(
        matcher.detect("soup", &["milk"]).await,
        Err(ScoutError::Store(_))
    ));
}

/// 重み付き確率と上位候補
#[tokio::test]
async fn test_match_scores_and_probability() {
    let matcher = matcher(vec![
        record("1", "Pesto Pasta", &["basil", "pine nuts", "parmesan"]),
        record("2", "Pesto Pasta", &["basil", "olive oil"]),
        record("3", "Beef Stew", &["beef", "carrots"]),
    ]);
    let request = MatchRequest {
        dish: "pesto pasta".into(),
        main_ingredients: vec!["basil".into(), "parmesan".into()],
        user_allergens: vec!["Parmesan".into()],
    };

    let report = matcher.match_dish(&request).await.unwrap();
    assert_eq!(report.total_candidates, 2);
    assert_eq!(report.top_matches[0].id, "1");
    assert_eq!(report.top_matches[0].combined_score, 100.0);
    assert_eq!(report.top_matches[1].combined_score, 75.0);
    assert_eq!(report.allergen_breakdown["parmesan"], 50.0);
    assert_eq!(report.probability_breakdown["parmesan"], 57.14);
    // プロバイダなし・キャッシュなし
    assert!(report.llm_analysis.is_none());
}

fn ambiguous_corpus() -> Vec<RecipeRecord> {
    vec![
        record("1", "Chicken Parmesan", &["chicken", "mozzarella"]),
        record("2", "Chicken Parmesan", &["chicken", "tomatoes"]),
    ]
}

fn dairy_request() -> MatchRequest {
    MatchRequest {
        dish: "Chicken Parmesan".into(),
        main_ingredients: vec![],
        user_allergens: vec!["dairy".into()],
    }
}

/// あいまいな判定ではプロバイダに問い合わせ、2回目はキャッシュから返す
#[tokio::test]
async fn test_match_ambiguous_uses_provider_then_cache() {
    let dir = tempdir().unwrap();
    let cache_path = dir.path().join("cache.json");
    let provider = Arc::new(ScriptedProvider::new());
    let matcher = matcher(ambiguous_corpus())
        .with_provider(provider.clone())
        .with_cache(EnrichmentCache::default(), Some(cache_path.clone()));

    let first = matcher.match_dish(&dairy_request()).await.unwrap();
    assert_eq!(first.percentage_with_any_allergen, 50.0);
    let analysis = first.llm_analysis.expect("意味解析があるはず");
    assert_eq!(analysis.source, AnalysisSource::Provider);
    assert_eq!(analysis.allergens["dairy"].usage, Usage::Central);
    assert_eq!(provider.calls(), 1);

    let second = matcher.match_dish(&dairy_request()).await.unwrap();
    assert_eq!(second.llm_analysis.unwrap().source, AnalysisSource::Cache);
    assert_eq!(provider.calls(), 1);

    // 書き込みのたびに保存される
    assert_eq!(EnrichmentCache::load(&cache_path).len(), 1);
}

/// キャッシュにないアレルゲンだけ問い合わせる
#[tokio::test]
async fn test_match_partial_cache_hit_asks_for_missing() {
    let mut cache = EnrichmentCache::default();
    let mut known = BTreeMap::new();
    known.insert("dairy".to_string(), UsageNote::new(Usage::Garnish, "cached"));
    cache.upsert("chicken parmesan", &Vec::<String>::new(), known, BTreeMap::new());

    let provider = Arc::new(ScriptedProvider::new());
    let matcher = matcher(ambiguous_corpus())
        .with_provider(provider.clone())
        .with_cache(cache, None);

    let request = MatchRequest {
        user_allergens: vec!["dairy".into(), "tomato".into()],
        ..dairy_request()
    };
    let report = matcher.match_dish(&request).await.unwrap();
    // dairy: 1件、tomato: 1件 → 2件とも該当で100%になるためバンド外
    assert_eq!(report.percentage_with_any_allergen, 100.0);
    assert!(report.llm_analysis.is_none());
    assert_eq!(provider.calls(), 0);

    let report = matcher.match_dish(&dairy_request()).await.unwrap();
    let analysis = report.llm_analysis.unwrap();
    assert_eq!(analysis.source, AnalysisSource::Cache);
    assert_eq!(analysis.allergens["dairy"].reason, "cached");
    assert_eq!(provider.calls(), 0);

    let request = MatchRequest {
        user_allergens: vec!["dairy".into(), "egg".into()],
        ..dairy_request()
    };
    let report = matcher.match_dish(&request).await.unwrap();
    let analysis = report.llm_analysis.unwrap();
    assert_eq!(analysis.source, AnalysisSource::Provider);
    assert_eq!(analysis.allergens["dairy"].reason, "cached");
    assert_eq!(analysis.allergens["egg"].reason, "scripted");
    assert_eq!(provider.calls(), 1);
}

/// バンド外（確実）なら問い合わせない
#[tokio::test]
async fn test_match_confident_skips_provider() {
    let provider = Arc::new(ScriptedProvider::new());
    let matcher = matcher(vec![record("1", "Chicken Parmesan", &["chicken", "mozzarella"])])
        .with_provider(provider.clone());

    let report = matcher.match_dish(&dairy_request()).await.unwrap();
    assert_eq!(report.percentage_with_any_allergen, 100.0);
    assert!(report.llm_analysis.is_none());
    assert_eq!(provider.calls(), 0);
}

/// プロバイダが失敗しても照合結果は返す
#[tokio::test]
async fn test_match_provider_failure_degrades() {
    let provider = Arc::new(ScriptedProvider::failing(usize::MAX));
    let matcher = matcher(ambiguous_corpus()).with_provider(provider.clone());

    let report = matcher.match_dish(&dairy_request()).await.unwrap();
    assert_eq!(report.total_candidates, 2);
    assert!(report.llm_analysis.is_none());
    assert_eq!(provider.calls(), 2);
}

fn pad_thai_corpus() -> Vec<RecipeRecord> {
    vec![
        enriched(
            "1",
            "Pad Thai",
            &["rice noodles", "peanuts", "egg"],
            &[("peanuts", Usage::Garnish), ("egg", Usage::Central)],
        ),
        enriched(
            "2",
            "Pad Thai",
            &["rice noodles", "crushed peanuts"],
            &[("crushed peanuts", Usage::Garnish)],
        ),
        enriched(
            "3",
            "Pad Thai",
            &["rice noodles", "peanut sauce"],
            &[("peanut sauce", Usage::Central)],
        ),
    ]
}

/// エンリッチ済みレシピから使われ方を合議する
#[tokio::test]
async fn test_ingredient_analysis_consensus() {
    let matcher = matcher(pad_thai_corpus());
    let dish = DishRequest {
        dish_name: "Pad Thai".into(),
        main_ingredients: vec!["rice noodles".into(), "peanut sauce".into()],
        normalized_ingredients: vec![],
    };

    let report = matcher.ingredient_analysis(&dish, &["Peanut"]).await.unwrap();
    assert_eq!(report.dish, "Pad Thai");
    assert_eq!(report.matched_recipes, 3);
    assert_eq!(report.probability_with_any, 100.0);
    assert_eq!(report.probability_breakdown["peanut"], 100.0);

    let usage = &report.common_usage["peanut"];
    assert_eq!(usage.usage, "garnish");
    assert_eq!(usage.count, 2);

    assert_eq!(report.menu_matches["peanut"], vec!["peanut sauce"]);
    assert!(report.normalized_ingredients.contains(&"peanut sauce".to_string()));
}

/// 一括解析は入力順で、失敗は品ごと
#[tokio::test]
async fn test_batch_ingredient_analysis() {
    let matcher = matcher(pad_thai_corpus());
    let dishes = vec![
        DishRequest {
            dish_name: "Pad Thai".into(),
            main_ingredients: vec!["rice noodles".into()],
            normalized_ingredients: vec![],
        },
        DishRequest {
            dish_name: "Unknown Dish".into(),
            ..Default::default()
        },
    ];

    let report = matcher.batch_ingredient_analysis(&dishes, &["peanut"]).await;
    assert_eq!(report.results.len(), 2);
    assert_eq!(report.results[0].dish(), "Pad Thai");
    assert_eq!(report.results[1].dish(), "Unknown Dish");
    match &report.results[1] {
        BatchEntry::Report(r) => assert_eq!(r.matched_recipes, 0),
        BatchEntry::Failed(f) => panic!("失敗しないはず: {}", f.error),
    }
    assert!(report.processing_time >= 0.0);
}

/// ストア障害は品ごとのエラーになる
#[tokio::test]
async fn test_batch_store_failure_per_dish() {
    let matcher = AllergenMatcher::new(
        Arc::new(UnavailableStore),
        Arc::new(MappingTables::builtin()),
        settings(),
    );
    let dishes = vec![DishRequest {
        dish_name: "Soup".into(),
        ..Default::default()
    }];

    let report = matcher.batch_ingredient_analysis(&dishes, &["milk"]).await;
    match &report.results[0] {
        BatchEntry::Failed(f) => {
            assert_eq!(f.dish, "Soup");
            assert_eq!(f.probability_with_any, 0.0);
            assert!(f.common_usage.is_empty());
        }
        BatchEntry::Report(_) => panic!("失敗するはず"),
    }
}
