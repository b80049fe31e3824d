//! 解析プロバイダ
//!
//! - AnalysisProvider: 料理単位・レシピ単位の解析を行うプロバイダの境界
//! - gemini: Gemini API（HTTP）
//! - cli_runner: claude / codex / gemini のCLIを子プロセスで呼ぶ
//! - cache: 料理単位の解析結果キャッシュ
//! - retry: タイムアウト付きリトライ

pub mod cache;
mod cli_runner;
mod gemini;
mod retry;

pub use cache::{CacheEntry, EnrichmentCache};
pub use cli_runner::CliProvider;
pub use gemini::GeminiProvider;
pub use retry::{with_retry, RetryPolicy};

use crate::error::{Result, ScoutError};
use allergen_scout_common::{
    build_dish_prompt, build_ingredient_prompt, parse_dish_analysis, parse_ingredient_analysis,
    CurrentConclusion, DishAnalysis, IngredientAnalysis,
};
use async_trait::async_trait;

/// 料理単位の問い合わせ内容
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DishQuery {
    pub dish_name: String,
    pub main_ingredients: Vec<String>,
    pub allergens: Vec<String>,
    /// ヒューリスティック判定の現状（プロンプトに添える）
    pub conclusion: CurrentConclusion,
}

impl DishQuery {
    pub fn prompt(&self) -> String {
        build_dish_prompt(
            &self.dish_name,
            &self.main_ingredients,
            &self.allergens,
            &self.conclusion,
        )
    }
}

/// 外部の解析プロバイダ
///
/// 実装は1回分の呼び出しだけを行う。リトライとタイムアウトは呼び出し側で掛ける。
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    /// ログ用の名前
    fn name(&self) -> &str;

    /// 料理の各アレルゲンの使われ方を判定
    async fn analyze_dish(&self, query: &DishQuery) -> Result<DishAnalysis>;

    /// レシピの食材リストを正規化し、食材ごとの使われ方を判定
    async fn analyze_ingredients(&self, ingredients: &[String]) -> Result<IngredientAnalysis>;
}

/// テキストを返すバックエンドの共通処理: プロンプト → 応答 → 検証
#[async_trait]
pub(crate) trait TextCompletion: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

pub(crate) async fn complete_dish<C: TextCompletion + ?Sized>(
    backend: &C,
    query: &DishQuery,
) -> Result<DishAnalysis> {
    let response = backend.complete(&query.prompt()).await?;
    parse_dish_analysis(&response).map_err(|e| ScoutError::ApiParse(e.to_string()))
}

pub(crate) async fn complete_ingredients<C: TextCompletion + ?Sized>(
    backend: &C,
    ingredients: &[String],
) -> Result<IngredientAnalysis> {
    let response = backend.complete(&build_ingredient_prompt(ingredients)).await?;
    parse_ingredient_analysis(&response).map_err(|e| ScoutError::ApiParse(e.to_string()))
}
