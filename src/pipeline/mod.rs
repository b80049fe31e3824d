//! エンリッチパイプライン
//!
//! ## 処理フロー
//! 1. 未処理レコードを1ページ取得（空なら終了）
//! 2. レコードごとにタスクを立て、セマフォで同時実行数を絞ってプロバイダを呼ぶ
//! 3. 全タスクの完了を待ち、結果を元の並びのスロットに集める
//! 4. 書き込む結果を1回の一括更新でストアに反映
//!
//! 食材なしのレコードは終端エラーとして書き込む。リトライを使い切った
//! レコードは書き込まず、次回の実行で再び取得される。同じ実行の中では
//! 一度取得したidを以降のページから除くので、各レコードは高々1回だけ処理される。

use crate::analyzer::{with_retry, AnalysisProvider, RetryPolicy};
use crate::error::Result;
use crate::store::{RecipeStore, RecordUpdate, UpdateFields};
use allergen_scout_common::{IngredientAnalysis, RecipeRecord};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;

pub const NO_INGREDIENTS: &str = "No ingredients found";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineOptions {
    pub page_size: usize,
    pub max_workers: usize,
    pub retry: RetryPolicy,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            page_size: 50,
            max_workers: 20,
            retry: RetryPolicy::default(),
        }
    }
}

/// 1レコードの処理結果
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    Enriched(IngredientAnalysis),
    /// 終端エラー（完了扱いで理由を書き込む）
    Errored(String),
    /// 一時的な失敗を使い切った（書き込まない）
    Failed(String),
}

impl RecordOutcome {
    fn into_update(self, id: &str) -> Option<RecordUpdate> {
        match self {
            RecordOutcome::Enriched(analysis) => {
                Some(RecordUpdate::new(id, UpdateFields::enriched(analysis)))
            }
            RecordOutcome::Errored(reason) => Some(RecordUpdate::new(id, UpdateFields::errored(reason))),
            RecordOutcome::Failed(_) => None,
        }
    }
}

/// 1バッチの集計
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// 1始まり
    pub batch: usize,
    pub fetched: usize,
    pub enriched: usize,
    pub errored: usize,
    pub failed: usize,
    pub written: usize,
}

/// 実行全体の集計
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineSummary {
    /// 空でないバッチの数
    pub batches: usize,
    /// 処理したレコード数（重複なし）
    pub processed: usize,
    pub enriched: usize,
    pub errored: usize,
    /// 未処理のまま残ったレコード数
    pub failed: usize,
}

impl PipelineSummary {
    fn add(&mut self, report: &BatchReport) {
        self.batches += 1;
        self.processed += report.fetched;
        self.enriched += report.enriched;
        self.errored += report.errored;
        self.failed += report.failed;
    }
}

pub struct EnrichmentPipeline {
    store: Arc<dyn RecipeStore>,
    provider: Arc<dyn AnalysisProvider>,
    options: PipelineOptions,
}

impl EnrichmentPipeline {
    pub fn new(
        store: Arc<dyn RecipeStore>,
        provider: Arc<dyn AnalysisProvider>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            store,
            provider,
            options,
        }
    }

    /// 未処理レコードがなくなるまで実行
    pub async fn run(&self) -> Result<PipelineSummary> {
        self.run_with_progress(|_| {}).await
    }

    /// バッチごとに `on_batch` を呼びながら実行
    ///
    /// ストアの障害は実行全体の失敗として返す。
    pub async fn run_with_progress<F>(&self, mut on_batch: F) -> Result<PipelineSummary>
    where
        F: FnMut(&BatchReport),
    {
        let mut summary = PipelineSummary::default();
        let mut attempted: HashSet<String> = HashSet::new();

        loop {
            let page = self
                .store
                .find_unprocessed(self.options.page_size, &attempted)
                .await?;
            if page.is_empty() {
                break;
            }
            attempted.extend(page.iter().map(|r| r.id.clone()));

            let batch = summary.batches + 1;
            tracing::info!(batch, records = page.len(), "バッチ開始");

            let outcomes = self.process_batch(&page).await;

            let mut report = BatchReport {
                batch,
                fetched: page.len(),
                ..Default::default()
            };
            let mut updates = Vec::with_capacity(page.len());
            for (record, outcome) in page.iter().zip(outcomes) {
                match &outcome {
                    RecordOutcome::Enriched(_) => report.enriched += 1,
                    RecordOutcome::Errored(_) => report.errored += 1,
                    RecordOutcome::Failed(reason) => {
                        report.failed += 1;
                        tracing::warn!(id = %record.id, reason = %reason, "エンリッチ失敗（次回再試行）");
                    }
                }
                if let Some(update) = outcome.into_update(&record.id) {
                    updates.push(update);
                }
            }

            if !updates.is_empty() {
                report.written = self.store.bulk_update(updates).await?;
            }

            tracing::info!(
                batch,
                enriched = report.enriched,
                errored = report.errored,
                failed = report.failed,
                written = report.written,
                "バッチ完了"
            );
            summary.add(&report);
            on_batch(&report);
        }

        if summary.failed > 0 {
            tracing::warn!(failed = summary.failed, "未処理のまま残ったレコードがあります");
        }

        Ok(summary)
    }

    /// 未処理レコードを数件だけ解析して返す（書き込まない）
    pub async fn trial(&self, sample_size: usize) -> Result<Vec<(RecipeRecord, RecordOutcome)>> {
        let page = self.store.find_unprocessed(sample_size, &HashSet::new()).await?;
        let outcomes = self.process_batch(&page).await;
        Ok(page.into_iter().zip(outcomes).collect())
    }

    /// 1ページ分を並行処理し、入力と同じ並びで結果を返す
    async fn process_batch(&self, page: &[RecipeRecord]) -> Vec<RecordOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.options.max_workers.max(1)));

        let handles: Vec<_> = page
            .iter()
            .map(|record| {
                let provider = Arc::clone(&self.provider);
                let semaphore = Arc::clone(&semaphore);
                let policy = self.options.retry;
                let record = record.clone();
                tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await;
                    process_record(provider.as_ref(), &record, &policy).await
                })
            })
            .collect();

        let mut slots: Vec<Option<RecordOutcome>> = vec![None; page.len()];
        for (slot, (record, joined)) in slots
            .iter_mut()
            .zip(page.iter().zip(futures::future::join_all(handles).await))
        {
            *slot = Some(match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(id = %record.id, error = %e, "ワーカーが異常終了しました");
                    RecordOutcome::Failed(format!("worker failed: {}", e))
                }
            });
        }

        slots
            .into_iter()
            .map(|slot| slot.unwrap_or_else(|| RecordOutcome::Failed("no result".into())))
            .collect()
    }
}

/// 1レコードを解析する
pub async fn process_record(
    provider: &dyn AnalysisProvider,
    record: &RecipeRecord,
    policy: &RetryPolicy,
) -> RecordOutcome {
    let ingredients: Vec<String> = record
        .ingredients
        .iter()
        .filter(|i| !i.trim().is_empty())
        .cloned()
        .collect();
    if ingredients.is_empty() {
        return RecordOutcome::Errored(NO_INGREDIENTS.to_string());
    }

    let operation = format!("analyze_ingredients:{}", record.id);
    match with_retry(&operation, policy, || provider.analyze_ingredients(&ingredients)).await {
        Ok(analysis) => RecordOutcome::Enriched(analysis),
        Err(e) => RecordOutcome::Failed(e.to_string()),
    }
}
