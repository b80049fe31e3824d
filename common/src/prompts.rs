//! プロンプト生成モジュール
//!
//! - USAGE_DEFINITIONS: 使われ方の定義
//! - build_dish_prompt: 料理単位のアレルゲン解析用プロンプト
//! - build_ingredient_prompt: レシピ単位の正規化・使われ方解析用プロンプト

use crate::types::CurrentConclusion;

/// 使われ方（usage）の定義
pub const USAGE_DEFINITIONS: &str = r#"- "central": The dish cannot be made without this ingredient. It is fundamental to the recipe.
- "garnish": The ingredient is typically added for flavor or texture but could be omitted upon request.
- "trace": The ingredient is not intentionally part of the recipe but may be present due to cross-contamination or as a minor component of another ingredient.
- "none": The ingredient is not usually present in the dish."#;

fn json_list<S: AsRef<str>>(items: &[S]) -> String {
    let items: Vec<&str> = items.iter().map(|s| s.as_ref()).collect();
    serde_json::to_string(&items).unwrap_or_else(|_| "[]".into())
}

/// 料理単位のプロンプト生成
///
/// # Arguments
/// * `dish_name` - 料理名
/// * `ingredients` - メイン食材
/// * `allergens` - 判定対象のアレルゲン
/// * `conclusion` - ヒューリスティック判定の現状
pub fn build_dish_prompt<S: AsRef<str>, A: AsRef<str>>(
    dish_name: &str,
    ingredients: &[S],
    allergens: &[A],
    conclusion: &CurrentConclusion,
) -> String {
    let ingredients = json_list(ingredients);
    let allergens = json_list(allergens);
    let conclusion = serde_json::to_string(conclusion).unwrap_or_else(|_| "{}".into());
    let dish = serde_json::to_string(dish_name).unwrap_or_else(|_| "\"\"".into());

    format!(
        r#"You are an expert in food science and allergen detection.
Given the following information:
Dish: {dish}
Main Ingredients: {ingredients}
Possible Allergens: {allergens}
Current Conclusion: {conclusion}

Tasks:
1. Normalize each main ingredient to its broadest food category (e.g., "shredded mozzarella" -> "cheese").
2. For each allergen, classify its usage and explain your reasoning. Use these definitions for usage:
{USAGE_DEFINITIONS}

Output your answer as JSON in the following format:
{{
  "normalized_ingredients": {{
    "shredded mozzarella": "cheese",
    "chicken": "chicken"
  }},
  "allergens": {{
    "milk": {{"usage": "central", "reason": "..."}},
    "egg": {{"usage": "garnish", "reason": "..."}}
  }}
}}

Output only the JSON object."#
    )
}

/// レシピ単位のプロンプト生成（バッチエンリッチ用）
pub fn build_ingredient_prompt<S: AsRef<str>>(ingredients: &[S]) -> String {
    let items: Vec<&str> = ingredients.iter().map(|s| s.as_ref()).collect();
    let ingredient_list = serde_json::to_string_pretty(&items).unwrap_or_else(|_| "[]".into());

    format!(
        r#"You are an expert food data processor. Your task is to return a single, valid JSON object and nothing else.
Perform two actions on the following ingredient list: normalization and usage analysis.

**Ingredient List:**
{ingredient_list}

**Task 1: Normalization**
Create a flat list of normalized, categorized terms. Rules:
1. Identify the core food item (e.g., "shredded mozzarella" -> "mozzarella").
2. Add parent categories (e.g., "mozzarella" -> "cheese", "dairy").
3. Deconstruct sauces into key components (e.g., "sambal oelek" -> "chili").
4. Exclude "salt", "pepper", "water".
5. The final list must be unique, lowercase strings.

**Task 2: Usage Analysis**
For each original ingredient, determine its "usage" ("central", "garnish", "trace", or "none") and provide a "reason".
{USAGE_DEFINITIONS}

**Output Format:**
Your response MUST be a single JSON object with two keys: "normalized_ingredients" and "ingredient_analysis".
{{
  "normalized_ingredients": ["mozzarella", "cheese", "dairy", "pecan", "nuts"],
  "ingredient_analysis": {{
    "1/2 cup shredded mozzarella": {{"usage": "central", "reason": "..."}},
    "2 oz finely chopped pecans": {{"usage": "garnish", "reason": "..."}}
  }}
}}"#
    )
}
