//! 問い合わせ結果の型（フィールド名はそのままJSONの形になる）

use allergen_scout_common::{AllergenAnalysis, Consensus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// search の1件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeMatch {
    pub title: String,
    pub ingredients: Vec<String>,
    pub instructions: Option<String>,
    pub picture_link: Option<String>,
    pub detected_allergens: Vec<String>,
}

/// detect の結果（件数ベース）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionReport {
    pub dish: String,
    pub total_recipes: usize,
    pub recipes_with_any_allergen: usize,
    pub percentage_with_any_allergen: f64,
    pub allergen_breakdown: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopMatch {
    pub id: String,
    pub title: String,
    pub title_score: f64,
    pub ingredient_score: f64,
    pub combined_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisSource {
    Cache,
    Provider,
}

/// 料理単位の意味解析（キャッシュまたはプロバイダ）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmAnalysis {
    pub source: AnalysisSource,
    pub normalized_ingredients: BTreeMap<String, String>,
    pub allergens: AllergenAnalysis,
}

/// match の問い合わせ
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchRequest {
    pub dish: String,
    #[serde(default)]
    pub main_ingredients: Vec<String>,
    #[serde(default)]
    pub user_allergens: Vec<String>,
}

/// match の結果（あいまい照合 + スコア重み付き確率）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchReport {
    pub dish: String,
    pub total_candidates: usize,
    pub recipes_with_any_allergen: usize,
    pub percentage_with_any_allergen: f64,
    pub allergen_breakdown: BTreeMap<String, f64>,
    pub probability_with_any_allergen: f64,
    pub probability_breakdown: BTreeMap<String, f64>,
    pub top_matches: Vec<TopMatch>,
    pub llm_analysis: Option<LlmAnalysis>,
}

/// メニューの1品
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DishRequest {
    pub dish_name: String,
    #[serde(default)]
    pub main_ingredients: Vec<String>,
    #[serde(default)]
    pub normalized_ingredients: Vec<String>,
}

/// 一括解析の入力ファイル
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub dishes: Vec<DishRequest>,
    #[serde(default)]
    pub user_allergens: Vec<String>,
}

/// ingredientAnalysis の結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngredientAnalysisReport {
    pub dish: String,
    pub matched_recipes: usize,
    pub probability_with_any: f64,
    pub probability_breakdown: BTreeMap<String, f64>,
    /// エンリッチ済みレシピから合議した使われ方
    pub common_usage: BTreeMap<String, Consensus>,
    /// メニューの食材から直接見つかったアレルゲン → 該当語
    pub menu_matches: BTreeMap<String, Vec<String>>,
    pub normalized_ingredients: Vec<String>,
}

/// 一括解析で失敗した1品
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedAnalysis {
    pub dish: String,
    pub error: String,
    pub probability_with_any: f64,
    pub probability_breakdown: BTreeMap<String, f64>,
    pub common_usage: BTreeMap<String, Consensus>,
}

impl FailedAnalysis {
    pub fn new(dish: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            dish: dish.into(),
            error: error.into(),
            probability_with_any: 0.0,
            probability_breakdown: BTreeMap::new(),
            common_usage: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BatchEntry {
    Report(IngredientAnalysisReport),
    Failed(FailedAnalysis),
}

impl BatchEntry {
    pub fn dish(&self) -> &str {
        match self {
            BatchEntry::Report(report) => &report.dish,
            BatchEntry::Failed(failed) => &failed.dish,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, BatchEntry::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchAnalysisReport {
    pub results: Vec<BatchEntry>,
    /// 秒（小数点以下2桁）
    pub processing_time: f64,
}
