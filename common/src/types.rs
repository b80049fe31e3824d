//! レシピ・解析結果の型定義
//!
//! CLIとライブラリで共有される型:
//! - RecipeRecord: コーパスの1レシピ（エンリッチ結果を含む）
//! - Usage / UsageNote: 食材の使われ方の分類
//! - DishAnalysis: 料理単位の解析プロバイダ出力
//! - IngredientAnalysis: レシピ単位の解析プロバイダ出力

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// 食材の使われ方
///
/// 並び順は重大度（central が最も重い）で、合議のタイブレークに使う。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Usage {
    /// その食材なしでは料理が成立しない
    Central,
    /// 風味・食感のために加えるが省略できる
    Garnish,
    /// 意図せず混入しうる、または他の食材の微量成分
    Trace,
    /// 通常は含まれない
    None,
}

impl Usage {
    pub const ALL: [Usage; 4] = [Usage::Central, Usage::Garnish, Usage::Trace, Usage::None];

    pub fn as_str(&self) -> &'static str {
        match self {
            Usage::Central => "central",
            Usage::Garnish => "garnish",
            Usage::Trace => "trace",
            Usage::None => "none",
        }
    }

    /// 重大度（小さいほど重い）。未知のラベルは none と同じ扱い
    pub fn severity_of(label: &str) -> u8 {
        match label.parse::<Usage>() {
            Ok(Usage::Central) => 0,
            Ok(Usage::Garnish) => 1,
            Ok(Usage::Trace) => 2,
            Ok(Usage::None) | Err(_) => 3,
        }
    }
}

impl fmt::Display for Usage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Usage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "central" => Ok(Usage::Central),
            "garnish" => Ok(Usage::Garnish),
            "trace" => Ok(Usage::Trace),
            "none" => Ok(Usage::None),
            other => Err(format!("unknown usage label: {}", other)),
        }
    }
}

/// 使われ方とその理由
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageNote {
    pub usage: Usage,
    #[serde(default)]
    pub reason: String,
}

impl UsageNote {
    pub fn new(usage: Usage, reason: impl Into<String>) -> Self {
        Self {
            usage,
            reason: reason.into(),
        }
    }
}

/// アレルゲン → 使われ方
pub type AllergenAnalysis = BTreeMap<String, UsageNote>;

/// コーパスの1レシピ
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecipeRecord {
    #[serde(alias = "_id")]
    pub id: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub ingredients: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture_link: Option<String>,

    /// 正規化済み食材タグ（エンリッチ結果）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalized_ingredients: Option<BTreeSet<String>>,

    /// 元の食材文字列 → 使われ方（エンリッチ結果）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingredient_analysis: Option<BTreeMap<String, UsageNote>>,

    #[serde(default)]
    pub enrichment_complete: bool,

    /// 終端エラーの理由（食材リストなし等）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_error: Option<String>,
}

impl RecipeRecord {
    pub fn new(id: impl Into<String>, title: impl Into<String>, ingredients: Vec<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            ingredients,
            ..Default::default()
        }
    }

    /// 食材を空白で連結して小文字化したテキスト
    pub fn ingredients_text(&self) -> String {
        self.ingredients.join(" ").to_lowercase()
    }
}

/// 照合候補（1クエリの間だけ存在する）
#[derive(Debug, Clone, Copy)]
pub struct MatchCandidate<'a> {
    pub record: &'a RecipeRecord,
    /// コーパス内の元の位置
    pub position: usize,
    pub title_score: f64,
    pub ingredient_score: f64,
    pub combined_score: f64,
}

/// 料理単位の解析結果（プロバイダ出力を検証済み）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DishAnalysis {
    /// メイン食材 → 広い食品カテゴリ
    #[serde(default)]
    pub normalized_ingredients: BTreeMap<String, String>,
    pub allergens: AllergenAnalysis,
}

/// レシピ単位の解析結果（バッチエンリッチ用）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngredientAnalysis {
    pub normalized_ingredients: BTreeSet<String>,
    pub ingredient_analysis: BTreeMap<String, UsageNote>,
}

/// ヒューリスティック判定の現状（プロンプトに渡す）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurrentConclusion {
    pub probability_with_any_allergen: f64,
    pub probability_breakdown: BTreeMap<String, f64>,
}
