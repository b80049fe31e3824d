//! 食材マッピング・アレルゲンカテゴリの静的テーブル
//!
//! 起動時に一度だけ読み込み、以後は参照で渡す（変更しない）。
//! 食材マッピングは宣言順を保持する。部分一致検索は先に宣言されたキーが勝つため、
//! 並び順そのものが出力を左右する。

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 複合食材 → 基本食材（宣言順）
const BUILTIN_INGREDIENT_MAPPINGS: &[(&str, &[&str])] = &[
    // Tomato-based items
    ("marinara", &["tomatoes", "garlic", "onions", "herbs"]),
    ("marinara sauce", &["tomatoes", "garlic", "onions", "herbs"]),
    ("tomato sauce", &["tomatoes", "onions", "garlic"]),
    ("tomato paste", &["tomatoes"]),
    ("ketchup", &["tomatoes", "vinegar", "sugar"]),
    ("pizza sauce", &["tomatoes", "garlic", "herbs"]),
    ("pasta sauce", &["tomatoes", "garlic", "onions"]),
    ("salsa", &["tomatoes", "onions", "peppers", "cilantro"]),
    ("arrabbiata", &["tomatoes", "garlic", "red peppers", "olive oil"]),
    ("puttanesca", &["tomatoes", "olives", "capers", "anchovies", "garlic"]),
    // Dairy-based sauces and items
    ("alfredo", &["butter", "cream", "parmesan cheese", "garlic"]),
    ("alfredo sauce", &["butter", "cream", "parmesan cheese", "garlic"]),
    ("cream sauce", &["cream", "butter"]),
    ("white sauce", &["butter", "flour", "milk"]),
    ("bechamel", &["butter", "flour", "milk"]),
    ("hollandaise", &["egg yolks", "butter", "lemon"]),
    ("caesar dressing", &["anchovies", "parmesan cheese", "egg"]),
    ("ranch dressing", &["mayonnaise", "buttermilk", "herbs"]),
    ("blue cheese dressing", &["blue cheese", "mayonnaise", "buttermilk"]),
    ("mozzarella", &["milk"]),
    ("parmesan", &["milk"]),
    ("cheddar", &["milk"]),
    ("ricotta", &["milk"]),
    ("mascarpone", &["cream"]),
    ("yogurt", &["milk"]),
    ("sour cream", &["cream"]),
    ("butter", &["cream"]),
    ("ghee", &["butter"]),
    // Egg-based items
    ("mayonnaise", &["eggs", "oil"]),
    ("aioli", &["eggs", "garlic", "olive oil"]),
    ("carbonara", &["eggs", "parmesan cheese", "pancetta", "pasta"]),
    ("custard", &["eggs", "milk", "sugar"]),
    ("meringue", &["egg whites", "sugar"]),
    // Nut-based items
    ("pesto", &["basil", "pine nuts", "parmesan cheese", "olive oil", "garlic"]),
    ("almond milk", &["almonds", "water"]),
    ("peanut butter", &["peanuts"]),
    ("nutella", &["hazelnuts", "cocoa", "milk"]),
    ("marzipan", &["almonds", "sugar"]),
    ("praline", &["nuts", "sugar"]),
    ("tahini", &["sesame seeds"]),
    ("hummus", &["chickpeas", "tahini", "garlic", "lemon"]),
    // Soy-based items
    ("soy sauce", &["soybeans", "wheat"]),
    ("teriyaki", &["soy sauce", "sugar", "rice wine", "ginger"]),
    ("miso", &["soybeans"]),
    ("tempeh", &["soybeans"]),
    ("edamame", &["soybeans"]),
    ("soybean oil", &["soybeans"]),
    // Wheat/Gluten items
    ("bread crumbs", &["wheat", "bread"]),
    ("breadcrumbs", &["wheat", "bread"]),
    ("panko", &["wheat", "bread"]),
    ("flour", &["wheat"]),
    ("pasta", &["wheat", "eggs"]),
    ("noodles", &["wheat"]),
    ("couscous", &["wheat"]),
    ("bulgur", &["wheat"]),
    ("semolina", &["wheat"]),
    ("seitan", &["wheat gluten"]),
    ("beer", &["wheat", "barley"]),
    ("malt", &["barley"]),
    // Seafood/Fish items
    ("worcestershire", &["anchovies", "vinegar", "molasses"]),
    ("fish sauce", &["fish", "salt"]),
    ("capers", &["capers"]), // 魚と一緒に加工されることが多い
    ("surimi", &["fish"]),
    ("imitation crab", &["fish"]),
    // Shellfish items
    ("oyster sauce", &["oysters"]),
    ("shrimp paste", &["shrimp"]),
    ("lobster bisque", &["lobster", "cream"]),
    ("crab cake", &["crab", "eggs", "breadcrumbs"]),
    // Complex preparations
    ("parmigiana", &["parmesan cheese", "mozzarella", "eggs", "breadcrumbs", "tomato sauce"]),
    ("quiche", &["eggs", "cream", "cheese", "pastry"]),
    ("risotto", &["rice", "butter", "cheese", "stock"]),
    ("gnocchi", &["potatoes", "flour", "eggs"]),
    ("tempura", &["flour", "eggs", "ice water"]),
    ("batter", &["flour", "eggs", "milk"]),
    ("breaded", &["breadcrumbs", "eggs", "flour"]),
    ("fried", &["oil"]), // 衣由来のアレルゲンを含む場合あり
    // Asian sauces and preparations
    ("hoisin", &["soybeans", "garlic", "chilies"]),
    ("black bean sauce", &["black beans", "garlic"]),
    ("pad thai sauce", &["tamarind", "fish sauce", "palm sugar"]),
    ("curry paste", &["chilies", "lemongrass", "garlic", "shrimp paste"]),
    ("miso soup", &["miso", "seaweed", "tofu"]),
    // Baking and dessert items
    ("chocolate", &["cocoa", "milk", "sugar"]),
    ("white chocolate", &["cocoa butter", "milk", "sugar"]),
    ("milk chocolate", &["cocoa", "milk", "sugar"]),
    ("ice cream", &["milk", "cream", "eggs", "sugar"]),
    ("sorbet", &["fruit", "sugar"]),
    ("gelato", &["milk", "cream", "eggs"]),
    ("pudding", &["milk", "eggs", "sugar"]),
    ("cake", &["flour", "eggs", "butter", "sugar"]),
    ("cookie", &["flour", "butter", "eggs", "sugar"]),
    ("pastry", &["flour", "butter", "eggs"]),
    ("croissant", &["flour", "butter", "eggs"]),
    ("danish", &["flour", "butter", "eggs"]),
];

/// アレルゲンカテゴリ → キーワード
const BUILTIN_ALLERGEN_CATEGORIES: &[(&str, &[&str])] = &[
    ("dairy", &["milk", "cream", "butter", "cheese", "yogurt", "ghee", "lactose", "casein", "whey"]),
    ("eggs", &["egg", "eggs", "egg whites", "egg yolks", "albumin"]),
    (
        "nuts",
        &[
            "almonds", "walnuts", "pecans", "cashews", "pistachios", "hazelnuts", "macadamia",
            "brazil nuts", "pine nuts",
        ],
    ),
    ("peanuts", &["peanuts", "groundnuts"]),
    ("soy", &["soybeans", "soy", "tofu", "tempeh", "miso", "edamame"]),
    ("wheat", &["wheat", "flour", "gluten", "bulgur", "semolina", "spelt", "kamut"]),
    ("fish", &["fish", "salmon", "tuna", "cod", "bass", "anchovy", "anchovies", "sardines"]),
    ("shellfish", &["shrimp", "crab", "lobster", "oysters", "mussels", "clams", "scallops"]),
    ("sesame", &["sesame", "tahini"]),
    ("tomatoes", &["tomatoes", "tomato"]),
];

/// マッピング1件（JSON上の表現）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngredientMapping {
    pub name: String,
    pub components: Vec<String>,
}

/// 上書き用JSONファイルの構造
///
/// ```json
/// {
///   "ingredient_mappings": [{"name": "marinara", "components": ["tomatoes"]}],
///   "allergen_categories": {"dairy": ["milk"]}
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct MappingFile {
    #[serde(default)]
    ingredient_mappings: Vec<IngredientMapping>,
    #[serde(default)]
    allergen_categories: BTreeMap<String, Vec<String>>,
}

/// 静的テーブル一式
#[derive(Debug, Clone, PartialEq)]
pub struct MappingTables {
    ingredient_mappings: Vec<IngredientMapping>,
    allergen_categories: BTreeMap<String, Vec<String>>,
}

impl MappingTables {
    /// 組み込みテーブル
    pub fn builtin() -> Self {
        let mappings = BUILTIN_INGREDIENT_MAPPINGS
            .iter()
            .map(|(name, components)| IngredientMapping {
                name: (*name).to_string(),
                components: components.iter().map(|c| c.to_string()).collect(),
            })
            .collect();

        let categories = BUILTIN_ALLERGEN_CATEGORIES
            .iter()
            .map(|(name, keywords)| {
                (
                    (*name).to_string(),
                    keywords.iter().map(|k| k.to_string()).collect(),
                )
            })
            .collect();

        Self {
            ingredient_mappings: mappings,
            allergen_categories: categories,
        }
    }

    /// エントリ列からテーブルを構築
    ///
    /// 同じキーが複数回現れた場合、位置は最初の宣言、値は最後の宣言を採用する。
    /// カテゴリのキーは小文字でなければならない。
    pub fn from_entries(
        mappings: Vec<IngredientMapping>,
        categories: BTreeMap<String, Vec<String>>,
    ) -> Result<Self> {
        if let Some(bad) = categories.keys().find(|k| **k != k.to_lowercase()) {
            return Err(Error::InvalidTable(format!(
                "アレルゲンカテゴリのキーは小文字で指定してください: {}",
                bad
            )));
        }

        let mut merged: Vec<IngredientMapping> = Vec::with_capacity(mappings.len());
        for mapping in mappings {
            let name = mapping.name.trim().to_lowercase();
            if name.is_empty() {
                return Err(Error::InvalidTable("食材マッピングの名前が空です".into()));
            }
            match merged.iter_mut().find(|m| m.name == name) {
                Some(existing) => existing.components = mapping.components,
                None => merged.push(IngredientMapping {
                    name,
                    components: mapping.components,
                }),
            }
        }

        Ok(Self {
            ingredient_mappings: merged,
            allergen_categories: categories,
        })
    }

    /// JSON文字列から読み込み
    pub fn from_json(json: &str) -> Result<Self> {
        let file: MappingFile = serde_json::from_str(json)?;
        Self::from_entries(file.ingredient_mappings, file.allergen_categories)
    }

    /// JSONファイルから読み込み
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// 食材マッピング（宣言順）
    pub fn ingredient_mappings(&self) -> &[IngredientMapping] {
        &self.ingredient_mappings
    }

    /// 完全一致（小文字化済みのキーで検索）
    pub fn mapping_for(&self, name: &str) -> Option<&IngredientMapping> {
        self.ingredient_mappings.iter().find(|m| m.name == name)
    }

    pub fn allergen_categories(&self) -> &BTreeMap<String, Vec<String>> {
        &self.allergen_categories
    }

    pub fn category(&self, allergen: &str) -> Option<&[String]> {
        self.allergen_categories
            .get(allergen)
            .map(|keywords| keywords.as_slice())
    }

    pub fn category_names(&self) -> impl Iterator<Item = &str> {
        self.allergen_categories.keys().map(|k| k.as_str())
    }
}

impl Default for MappingTables {
    fn default() -> Self {
        Self::builtin()
    }
}
