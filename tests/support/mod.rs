//! テスト用のスタブ（プロバイダ・ストア）

#![allow(dead_code)]

use allergen_scout::analyzer::{AnalysisProvider, DishQuery};
use allergen_scout::error::{Result, ScoutError};
use allergen_scout::store::{MemoryStore, Projection, RecipeStore, RecordUpdate};
use allergen_scout_common::{
    DishAnalysis, IngredientAnalysis, RecipeRecord, Usage, UsageNote,
};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub fn record(id: &str, title: &str, ingredients: &[&str]) -> RecipeRecord {
    RecipeRecord::new(id, title, ingredients.iter().map(|s| s.to_string()).collect())
}

/// 最初の `failures` 回は一時的エラー、その後は成功するプロバイダ
#[derive(Default)]
pub struct ScriptedProvider {
    pub failures: usize,
    /// 1回の呼び出しにかかる時間
    pub latency: Duration,
    pub calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(failures: usize) -> Self {
        Self {
            failures,
            ..Default::default()
        }
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> Result<()> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if n < self.failures {
            Err(ScoutError::ApiCall(format!("scripted failure {}", n + 1)))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl AnalysisProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn analyze_dish(&self, query: &DishQuery) -> Result<DishAnalysis> {
        self.enter().await?;
        let mut analysis = DishAnalysis::default();
        for ingredient in &query.main_ingredients {
            analysis
                .normalized_ingredients
                .insert(ingredient.clone(), ingredient.to_lowercase());
        }
        for allergen in &query.allergens {
            analysis
                .allergens
                .insert(allergen.clone(), UsageNote::new(Usage::Central, "scripted"));
        }
        Ok(analysis)
    }

    async fn analyze_ingredients(&self, ingredients: &[String]) -> Result<IngredientAnalysis> {
        self.enter().await?;
        if ingredients.iter().any(|i| i == "boom") {
            panic!("provider crashed");
        }
        let mut analysis = IngredientAnalysis::default();
        for ingredient in ingredients {
            analysis.normalized_ingredients.insert(ingredient.to_lowercase());
            analysis
                .ingredient_analysis
                .insert(ingredient.clone(), UsageNote::new(Usage::Central, "scripted"));
        }
        Ok(analysis)
    }
}

/// 呼び出し回数を数えるストア
pub struct CountingStore {
    pub inner: MemoryStore,
    pub fetches: AtomicUsize,
    pub bulk_writes: AtomicUsize,
}

impl CountingStore {
    pub fn new(records: Vec<RecipeRecord>) -> Self {
        Self {
            inner: MemoryStore::new(records),
            fetches: AtomicUsize::new(0),
            bulk_writes: AtomicUsize::new(0),
        }
    }

    pub fn bulk_writes(&self) -> usize {
        self.bulk_writes.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecipeStore for CountingStore {
    async fn query(&self, title_pattern: &str, projection: Projection) -> Result<Vec<RecipeRecord>> {
        self.inner.query(title_pattern, projection).await
    }

    async fn find_unprocessed(
        &self,
        page_size: usize,
        skip: &HashSet<String>,
    ) -> Result<Vec<RecipeRecord>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.inner.find_unprocessed(page_size, skip).await
    }

    async fn bulk_update(&self, updates: Vec<RecordUpdate>) -> Result<usize> {
        self.bulk_writes.fetch_add(1, Ordering::SeqCst);
        self.inner.bulk_update(updates).await
    }
}

/// 常に障害を返すストア
pub struct UnavailableStore;

#[async_trait]
impl RecipeStore for UnavailableStore {
    async fn query(&self, _: &str, _: Projection) -> Result<Vec<RecipeRecord>> {
        Err(ScoutError::Store("connection refused".into()))
    }

    async fn find_unprocessed(&self, _: usize, _: &HashSet<String>) -> Result<Vec<RecipeRecord>> {
        Err(ScoutError::Store("connection refused".into()))
    }

    async fn bulk_update(&self, _: Vec<RecordUpdate>) -> Result<usize> {
        Err(ScoutError::Store("connection refused".into()))
    }
}
