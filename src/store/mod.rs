//! コーパスストア
//!
//! - RecipeStore: タイトル検索・未処理レコードの取得・一括更新の境界
//! - memory: JSONファイルを背後に持つインメモリ実装
//! - ingest: 生のレシピJSONの取り込み

mod ingest;
mod memory;

pub use ingest::{clean_ingredients, ingest_path, load_raw_recipes, scan_corpus_folder};
pub use memory::MemoryStore;

use crate::error::Result;
use allergen_scout_common::{IngredientAnalysis, RecipeRecord, UsageNote};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// 検索結果に含めるフィールド
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Projection {
    /// 全フィールド
    #[default]
    Full,
    /// id・タイトル・食材・エンリッチ結果のみ（作り方・画像は省く）
    Summary,
}

impl Projection {
    pub fn apply(self, mut record: RecipeRecord) -> RecipeRecord {
        if self == Projection::Summary {
            record.instructions = None;
            record.picture_link = None;
        }
        record
    }
}

/// 1レコードに書き込むフィールド（None は変更しない）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateFields {
    pub normalized_ingredients: Option<BTreeSet<String>>,
    pub ingredient_analysis: Option<BTreeMap<String, UsageNote>>,
    pub enrichment_complete: Option<bool>,
    /// Some(None) でエラー理由を消す
    pub analysis_error: Option<Option<String>>,
}

impl UpdateFields {
    /// エンリッチ成功: タグと使われ方を置き換え、エラーを消す
    pub fn enriched(analysis: IngredientAnalysis) -> Self {
        Self {
            normalized_ingredients: Some(analysis.normalized_ingredients),
            ingredient_analysis: Some(analysis.ingredient_analysis),
            enrichment_complete: Some(true),
            analysis_error: Some(None),
        }
    }

    /// 終端エラー: 完了扱いにして理由を残す
    pub fn errored(reason: impl Into<String>) -> Self {
        Self {
            enrichment_complete: Some(true),
            analysis_error: Some(Some(reason.into())),
            ..Default::default()
        }
    }

    pub fn apply_to(self, record: &mut RecipeRecord) {
        if let Some(tags) = self.normalized_ingredients {
            record.normalized_ingredients = Some(tags);
        }
        if let Some(analysis) = self.ingredient_analysis {
            record.ingredient_analysis = Some(analysis);
        }
        if let Some(complete) = self.enrichment_complete {
            record.enrichment_complete = complete;
        }
        if let Some(error) = self.analysis_error {
            record.analysis_error = error;
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordUpdate {
    pub id: String,
    pub fields: UpdateFields,
}

impl RecordUpdate {
    pub fn new(id: impl Into<String>, fields: UpdateFields) -> Self {
        Self { id: id.into(), fields }
    }
}

/// レシピコーパスの保存先
///
/// ストアの障害は `ScoutError::Store` で返し、呼び出し側の操作全体を失敗させる。
#[async_trait]
pub trait RecipeStore: Send + Sync {
    /// タイトルに `title_pattern` を含むレコード（大文字小文字無視、コーパス順）
    async fn query(&self, title_pattern: &str, projection: Projection) -> Result<Vec<RecipeRecord>>;

    /// エンリッチ未完了のレコードを先頭から最大 `page_size` 件（`skip` のidは除く）
    async fn find_unprocessed(
        &self,
        page_size: usize,
        skip: &HashSet<String>,
    ) -> Result<Vec<RecipeRecord>>;

    /// まとめて書き込み、更新できた件数を返す（存在しないidは無視）
    async fn bulk_update(&self, updates: Vec<RecordUpdate>) -> Result<usize>;
}
