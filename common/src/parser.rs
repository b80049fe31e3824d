//! 解析プロバイダのレスポンスパーサー
//!
//! LLMのレスポンスからJSONを抽出し、期待する形を明示的に検証する。
//! 形が合わないものはすべて `Error::Parse` とし、呼び出し側で一時的な失敗として扱う。

use crate::error::{Error, Result};
use crate::types::{AllergenAnalysis, DishAnalysis, IngredientAnalysis, Usage, UsageNote};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// APIレスポンスからJSONオブジェクト部分を抽出
///
/// 抽出優先順位:
/// 1. ```json ... ``` ブロック
/// 2. 生の {...} オブジェクト
/// 3. エラー
///
/// # Examples
/// ```
/// use allergen_scout_common::extract_json;
///
/// let response = "Here you go: {\"allergens\": {}}";
/// let json = extract_json(response).unwrap();
/// assert_eq!(json, "{\"allergens\": {}}");
/// ```
pub fn extract_json(response: &str) -> Result<&str> {
    if let Some(start_marker) = response.find("```json") {
        let start = start_marker + 7; // "```json" の長さ
        if let Some(end_offset) = response[start..].find("```") {
            let end = start + end_offset;
            return Ok(response[start..end].trim());
        }
    }

    if let Some(start) = response.find('{') {
        if let Some(end) = response.rfind('}') {
            if end >= start {
                return Ok(&response[start..=end]);
            }
        }
    }

    Err(Error::Parse("JSONが見つかりません".into()))
}

fn parse_object(response: &str) -> Result<Map<String, Value>> {
    let json_str = extract_json(response)?;
    match serde_json::from_str::<Value>(json_str.trim()) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(Error::Parse("トップレベルがオブジェクトではありません".into())),
        Err(e) => Err(Error::Parse(format!("JSONパースエラー: {}", e))),
    }
}

/// `{"usage": "...", "reason": "..."}` を検証
fn parse_usage_note(key: &str, value: &Value) -> Result<UsageNote> {
    let obj = value
        .as_object()
        .ok_or_else(|| Error::Parse(format!("{}: オブジェクトではありません", key)))?;

    let usage = obj
        .get("usage")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Parse(format!("{}: usage がありません", key)))?
        .parse::<Usage>()
        .map_err(|e| Error::Parse(format!("{}: {}", key, e)))?;

    let reason = obj
        .get("reason")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Ok(UsageNote { usage, reason })
}

fn parse_usage_map(field: &str, value: Option<&Value>) -> Result<BTreeMap<String, UsageNote>> {
    let obj = value
        .and_then(Value::as_object)
        .ok_or_else(|| Error::Parse(format!("{} キーがないかオブジェクトではありません", field)))?;

    obj.iter()
        .map(|(key, value)| Ok((key.clone(), parse_usage_note(key, value)?)))
        .collect()
}

/// 料理単位の解析レスポンスをパース
///
/// `allergens` は必須、`normalized_ingredients` は省略可（文字列以外の値は無視）。
/// アレルゲン名は小文字に揃える。
pub fn parse_dish_analysis(response: &str) -> Result<DishAnalysis> {
    let root = parse_object(response)?;

    let allergens: AllergenAnalysis = parse_usage_map("allergens", root.get("allergens"))?
        .into_iter()
        .map(|(allergen, note)| (allergen.trim().to_lowercase(), note))
        .collect();

    let normalized_ingredients = match root.get("normalized_ingredients") {
        None | Some(Value::Null) => BTreeMap::new(),
        Some(Value::Object(map)) => map
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.trim().to_lowercase())))
            .collect(),
        Some(_) => {
            return Err(Error::Parse(
                "normalized_ingredients がオブジェクトではありません".into(),
            ))
        }
    };

    Ok(DishAnalysis {
        normalized_ingredients,
        allergens,
    })
}

/// レシピ単位の解析レスポンスをパース
///
/// `normalized_ingredients`（文字列配列）と `ingredient_analysis` の両方が必須。
/// タグは小文字化・重複除去する。
pub fn parse_ingredient_analysis(response: &str) -> Result<IngredientAnalysis> {
    let root = parse_object(response)?;

    let tags = root
        .get("normalized_ingredients")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::Parse("normalized_ingredients キーがないか配列ではありません".into()))?;

    let normalized_ingredients: BTreeSet<String> = tags
        .iter()
        .filter_map(Value::as_str)
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect();

    let ingredient_analysis = parse_usage_map("ingredient_analysis", root.get("ingredient_analysis"))?;

    Ok(IngredientAnalysis {
        normalized_ingredients,
        ingredient_analysis,
    })
}
