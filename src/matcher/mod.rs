//! アレルゲン照合サービス
//!
//! - search / detect: タイトルの部分一致で引いたレシピの件数ベース集計
//! - match_dish: あいまい照合 + スコア重み付き確率。判定があいまいなときだけ
//!   キャッシュ → プロバイダの順に意味解析を足す
//! - ingredient_analysis / batch_ingredient_analysis: メニュー単位の解析

mod types;

pub use types::{
    AnalysisSource, BatchAnalysisReport, BatchEntry, BatchRequest, DetectionReport, DishRequest,
    FailedAnalysis, IngredientAnalysisReport, LlmAnalysis, MatchReport, MatchRequest, RecipeMatch,
    TopMatch,
};

use crate::analyzer::cache::CacheEntry;
use crate::analyzer::{with_retry, AnalysisProvider, DishQuery, EnrichmentCache, RetryPolicy};
use crate::config::Config;
use crate::error::Result;
use crate::store::{Projection, RecipeStore};
use allergen_scout_common::{
    aggregate_allergens, canonical_allergens, fuzzy_dish_match, pick_consensus, round2,
    AllergenHits, AllergenStats, CurrentConclusion, IngredientResolver, MappingTables,
    MatchThresholds, RecipeRecord,
};
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

/// 候補プールを引くときの料理名トークンの最小文字数
const POOL_TOKEN_MIN_LEN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatcherSettings {
    pub thresholds: MatchThresholds,
    pub cache_threshold: f64,
    /// (下限, 上限)。両端を含まない
    pub ambiguous_band: (f64, f64),
    pub retry: RetryPolicy,
    pub analysis_concurrency: usize,
    pub top_matches: usize,
}

impl Default for MatcherSettings {
    fn default() -> Self {
        Self {
            thresholds: MatchThresholds::default(),
            cache_threshold: 80.0,
            ambiguous_band: (30.0, 95.0),
            retry: RetryPolicy::default(),
            analysis_concurrency: 5,
            top_matches: 10,
        }
    }
}

impl MatcherSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            thresholds: config.thresholds(),
            cache_threshold: config.cache_threshold,
            ambiguous_band: (config.ambiguous_low, config.ambiguous_high),
            retry: config.retry_policy(),
            analysis_concurrency: config.analysis_concurrency,
            ..Default::default()
        }
    }

    /// 件数ベースと重み付きの両方がバンド内か
    pub fn is_ambiguous(&self, stats: &AllergenStats) -> bool {
        let (low, high) = self.ambiguous_band;
        let inside = |p: f64| low < p && p < high;
        inside(stats.percentage_with_any_allergen) && inside(stats.probability_with_any_allergen)
    }
}

/// レシピ1件について、各アレルゲンを検出したか
///
/// 食材テキストの部分一致、またはリゾルバでの照合結果が空でないとき検出。
/// `allergens` は小文字化済み。
pub fn detect_allergens(
    resolver: &IngredientResolver<'_>,
    record: &RecipeRecord,
    allergens: &[String],
) -> Vec<bool> {
    let text = record.ingredients_text();
    let matches = resolver.match_allergens(&record.ingredients, allergens);
    allergens
        .iter()
        .map(|a| text.contains(a.as_str()) || matches.is_detected(a))
        .collect()
}

pub struct AllergenMatcher {
    store: Arc<dyn RecipeStore>,
    tables: Arc<MappingTables>,
    provider: Option<Arc<dyn AnalysisProvider>>,
    cache: Arc<RwLock<EnrichmentCache>>,
    cache_path: Option<PathBuf>,
    settings: MatcherSettings,
}

impl AllergenMatcher {
    pub fn new(store: Arc<dyn RecipeStore>, tables: Arc<MappingTables>, settings: MatcherSettings) -> Self {
        Self {
            store,
            tables,
            provider: None,
            cache: Arc::new(RwLock::new(EnrichmentCache::default())),
            cache_path: None,
            settings,
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn AnalysisProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// キャッシュを差し替える。`path` があれば書き込みのたびに保存する
    pub fn with_cache(mut self, cache: EnrichmentCache, path: Option<PathBuf>) -> Self {
        self.cache = Arc::new(RwLock::new(cache));
        self.cache_path = path;
        self
    }

    pub fn cache(&self) -> &Arc<RwLock<EnrichmentCache>> {
        &self.cache
    }

    pub fn settings(&self) -> &MatcherSettings {
        &self.settings
    }

    fn resolver(&self) -> IngredientResolver<'_> {
        IngredientResolver::new(&self.tables)
    }

    /// タイトルに料理名を含むレシピと、その中で見つかったアレルゲン
    pub async fn search<S: AsRef<str>>(&self, dish: &str, user_allergens: &[S]) -> Result<Vec<RecipeMatch>> {
        let records = self.store.query(dish, Projection::Full).await?;
        let resolver = self.resolver();

        // 表示はユーザーの入力のまま、判定は小文字で
        let mut seen = HashSet::new();
        let given: Vec<(&str, String)> = user_allergens
            .iter()
            .map(|a| a.as_ref().trim())
            .filter(|a| !a.is_empty() && seen.insert(a.to_lowercase()))
            .map(|a| (a, a.to_lowercase()))
            .collect();
        let keys: Vec<String> = given.iter().map(|(_, key)| key.clone()).collect();

        Ok(records
            .into_iter()
            .map(|record| {
                let hits = detect_allergens(&resolver, &record, &keys);
                let detected_allergens = given
                    .iter()
                    .zip(hits)
                    .filter(|(_, hit)| *hit)
                    .map(|((name, _), _)| name.to_string())
                    .collect();
                RecipeMatch {
                    title: record.title,
                    ingredients: record.ingredients,
                    instructions: record.instructions,
                    picture_link: record.picture_link,
                    detected_allergens,
                }
            })
            .collect())
    }

    /// タイトルに料理名を含むレシピでの含有率（件数ベース）
    pub async fn detect<S: AsRef<str>>(&self, dish: &str, user_allergens: &[S]) -> Result<DetectionReport> {
        let records = self.store.query(dish, Projection::Summary).await?;
        let keys = canonical_allergens(user_allergens);
        let resolver = self.resolver();

        let rows: Vec<AllergenHits> = records
            .iter()
            .map(|record| AllergenHits {
                weight: 1.0,
                hits: detect_allergens(&resolver, record, &keys),
            })
            .collect();
        let stats = AllergenStats::from_hits(&keys, &rows);

        tracing::debug!(dish, total = stats.total, any = stats.recipes_with_any_allergen, "detect");
        Ok(DetectionReport {
            dish: dish.to_string(),
            total_recipes: stats.total,
            recipes_with_any_allergen: stats.recipes_with_any_allergen,
            percentage_with_any_allergen: stats.percentage_with_any_allergen,
            allergen_breakdown: stats.allergen_breakdown,
        })
    }

    /// 料理名の各トークンでストアを引き、idで重複除去した候補プール
    async fn candidate_pool(&self, dish: &str) -> Result<Vec<RecipeRecord>> {
        let mut patterns = vec![dish.trim().to_string()];
        for token in dish.split_whitespace() {
            let token = token.to_lowercase();
            if token.chars().count() >= POOL_TOKEN_MIN_LEN && !patterns.contains(&token) {
                patterns.push(token);
            }
        }

        let mut seen = HashSet::new();
        let mut pool = Vec::new();
        for pattern in patterns.iter().filter(|p| !p.is_empty()) {
            for record in self.store.query(pattern, Projection::Summary).await? {
                if seen.insert(record.id.clone()) {
                    pool.push(record);
                }
            }
        }
        Ok(pool)
    }

    /// あいまい照合によるアレルゲン確率
    pub async fn match_dish(&self, request: &MatchRequest) -> Result<MatchReport> {
        let allergens = canonical_allergens(&request.user_allergens);
        let pool = self.candidate_pool(&request.dish).await?;
        let candidates = fuzzy_dish_match(
            &request.dish,
            &request.main_ingredients,
            &pool,
            self.settings.thresholds,
        );

        let resolver = self.resolver();
        let stats = aggregate_allergens(&candidates, &allergens, |record, keys| {
            detect_allergens(&resolver, record, keys)
        });

        let top_matches = candidates
            .iter()
            .take(self.settings.top_matches)
            .map(|c| TopMatch {
                id: c.record.id.clone(),
                title: c.record.title.clone(),
                title_score: round2(c.title_score),
                ingredient_score: round2(c.ingredient_score),
                combined_score: round2(c.combined_score),
            })
            .collect();

        let llm_analysis = if !allergens.is_empty() && self.settings.is_ambiguous(&stats) {
            tracing::debug!(
                dish = %request.dish,
                percentage = stats.percentage_with_any_allergen,
                probability = stats.probability_with_any_allergen,
                "判定があいまい、意味解析を参照します"
            );
            self.resolve_analysis(request, &allergens, &stats).await
        } else {
            None
        };

        Ok(MatchReport {
            dish: request.dish.clone(),
            total_candidates: stats.total,
            recipes_with_any_allergen: stats.recipes_with_any_allergen,
            percentage_with_any_allergen: stats.percentage_with_any_allergen,
            allergen_breakdown: stats.allergen_breakdown,
            probability_with_any_allergen: stats.probability_with_any_allergen,
            probability_breakdown: stats.probability_breakdown,
            top_matches,
            llm_analysis,
        })
    }

    /// キャッシュにないアレルゲンだけプロバイダに問い合わせる
    ///
    /// プロバイダが失敗したら手元のキャッシュ分だけ（なければ None）。
    async fn resolve_analysis(
        &self,
        request: &MatchRequest,
        allergens: &[String],
        stats: &AllergenStats,
    ) -> Option<LlmAnalysis> {
        let cached: Option<CacheEntry> = self
            .cache
            .read()
            .await
            .lookup(&request.dish, &request.main_ingredients, self.settings.cache_threshold)
            .cloned();

        let missing = match &cached {
            Some(entry) => entry.missing(allergens),
            None => allergens.to_vec(),
        };
        if missing.is_empty() {
            tracing::debug!(dish = %request.dish, "キャッシュヒット");
            return cached.map(|entry| to_analysis(AnalysisSource::Cache, &entry, allergens));
        }

        let Some(provider) = &self.provider else {
            return cached.map(|entry| to_analysis(AnalysisSource::Cache, &entry, allergens));
        };

        let query = DishQuery {
            dish_name: request.dish.clone(),
            main_ingredients: request.main_ingredients.clone(),
            allergens: missing,
            conclusion: CurrentConclusion {
                probability_with_any_allergen: stats.probability_with_any_allergen,
                probability_breakdown: stats.probability_breakdown.clone(),
            },
        };

        match with_retry("analyze_dish", &self.settings.retry, || provider.analyze_dish(&query)).await {
            Ok(analysis) => {
                let entry = self
                    .cache
                    .write()
                    .await
                    .upsert(
                        &request.dish,
                        &request.main_ingredients,
                        analysis.allergens,
                        analysis.normalized_ingredients,
                    )
                    .clone();
                self.persist_cache().await;

                let mut result = to_analysis(AnalysisSource::Provider, &entry, allergens);
                // あいまい一致で拾った既存エントリの分も返す
                if let Some(previous) = &cached {
                    for (allergen, note) in &previous.allergens {
                        if allergens.contains(allergen) {
                            result.allergens.entry(allergen.clone()).or_insert_with(|| note.clone());
                        }
                    }
                }
                Some(result)
            }
            Err(e) => {
                tracing::warn!(dish = %request.dish, error = %e, "意味解析を取得できませんでした");
                cached.map(|entry| to_analysis(AnalysisSource::Cache, &entry, allergens))
            }
        }
    }

    async fn persist_cache(&self) {
        let Some(path) = &self.cache_path else {
            return;
        };
        if let Err(e) = self.cache.read().await.save(path) {
            tracing::warn!(path = %path.display(), error = %e, "キャッシュを保存できません");
        }
    }

    /// メニューの1品を解析する
    pub async fn ingredient_analysis<S: AsRef<str>>(
        &self,
        dish: &DishRequest,
        user_allergens: &[S],
    ) -> Result<IngredientAnalysisReport> {
        let allergens = canonical_allergens(user_allergens);
        let resolver = self.resolver();

        // メニュー側の食材から直接わかるもの
        let menu_ingredients: Vec<&str> = dish
            .main_ingredients
            .iter()
            .chain(dish.normalized_ingredients.iter())
            .map(String::as_str)
            .collect();
        let menu = resolver.match_allergens(&menu_ingredients, &allergens);
        let menu_matches: BTreeMap<String, Vec<String>> = menu
            .matches
            .iter()
            .filter(|(_, terms)| !terms.is_empty())
            .map(|(allergen, terms)| (allergen.clone(), terms.iter().cloned().collect()))
            .collect();
        let mut seen = HashSet::new();
        let normalized_ingredients: Vec<String> = menu
            .normalized
            .iter()
            .filter(|term| seen.insert(term.as_str()))
            .cloned()
            .collect();

        let query_ingredients = if dish.main_ingredients.is_empty() {
            &dish.normalized_ingredients
        } else {
            &dish.main_ingredients
        };
        let pool = self.candidate_pool(&dish.dish_name).await?;
        let candidates =
            fuzzy_dish_match(&dish.dish_name, query_ingredients, &pool, self.settings.thresholds);
        let stats = aggregate_allergens(&candidates, &allergens, |record, keys| {
            detect_allergens(&resolver, record, keys)
        });

        // エンリッチ済みレシピで、アレルゲンに当たる食材の使われ方を集める
        let mut labels: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for candidate in &candidates {
            let Some(analysis) = &candidate.record.ingredient_analysis else {
                continue;
            };
            for (ingredient, note) in analysis {
                let lower = ingredient.to_lowercase();
                let matches = resolver.match_allergens(&[ingredient.as_str()], &allergens);
                for allergen in &allergens {
                    if lower.contains(allergen.as_str()) || matches.is_detected(allergen) {
                        labels
                            .entry(allergen.clone())
                            .or_default()
                            .push(note.usage.as_str().to_string());
                    }
                }
            }
        }
        let common_usage = labels
            .into_iter()
            .filter_map(|(allergen, labels)| pick_consensus(&labels).map(|c| (allergen, c)))
            .collect();

        Ok(IngredientAnalysisReport {
            dish: dish.dish_name.clone(),
            matched_recipes: stats.total,
            probability_with_any: stats.probability_with_any_allergen,
            probability_breakdown: stats.probability_breakdown,
            common_usage,
            menu_matches,
            normalized_ingredients,
        })
    }

    /// 複数の料理をまとめて解析する（入力順、同時実行数は設定値）
    ///
    /// 1品の失敗はその品だけのエラーとして返す。
    pub async fn batch_ingredient_analysis<S: AsRef<str> + Sync>(
        &self,
        dishes: &[DishRequest],
        user_allergens: &[S],
    ) -> BatchAnalysisReport {
        let started = Instant::now();
        let concurrency = self.settings.analysis_concurrency.max(1);

        let results: Vec<BatchEntry> = stream::iter(dishes)
            .map(|dish| async move {
                match self.ingredient_analysis(dish, user_allergens).await {
                    Ok(report) => BatchEntry::Report(report),
                    Err(e) => {
                        tracing::warn!(dish = %dish.dish_name, error = %e, "解析失敗");
                        BatchEntry::Failed(FailedAnalysis::new(dish.dish_name.clone(), e.to_string()))
                    }
                }
            })
            .buffered(concurrency)
            .collect()
            .await;

        BatchAnalysisReport {
            results,
            processing_time: round2(started.elapsed().as_secs_f64()),
        }
    }
}

fn to_analysis(source: AnalysisSource, entry: &CacheEntry, allergens: &[String]) -> LlmAnalysis {
    LlmAnalysis {
        source,
        normalized_ingredients: entry.normalized_ingredients.clone(),
        allergens: entry
            .allergens
            .iter()
            .filter(|(allergen, _)| allergens.contains(allergen))
            .map(|(allergen, note)| (allergen.clone(), note.clone()))
            .collect(),
    }
}
