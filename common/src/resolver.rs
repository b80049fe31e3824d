//! 食材リゾルバ
//!
//! 複合食材（ソース・加工品）を基本食材に展開し、
//! ユーザーのアレルゲンと照合する。I/Oなし、失敗しない。

use crate::mappings::MappingTables;
use std::collections::{BTreeMap, BTreeSet};

/// アレルゲン照合の結果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AllergenMatches {
    /// ユーザー指定のアレルゲン → 一致した正規化済み食材
    pub matches: BTreeMap<String, BTreeSet<String>>,
    /// 全食材を正規化して平坦化したもの（入力順）
    pub normalized: Vec<String>,
}

impl AllergenMatches {
    /// 1件以上一致したアレルゲン
    pub fn detected(&self) -> impl Iterator<Item = &str> {
        self.matches
            .iter()
            .filter(|(_, terms)| !terms.is_empty())
            .map(|(allergen, _)| allergen.as_str())
    }

    pub fn is_detected(&self, allergen: &str) -> bool {
        self.matches
            .get(allergen)
            .map(|terms| !terms.is_empty())
            .unwrap_or(false)
    }
}

/// 静的テーブルを参照する食材リゾルバ
#[derive(Debug, Clone, Copy)]
pub struct IngredientResolver<'a> {
    tables: &'a MappingTables,
}

impl<'a> IngredientResolver<'a> {
    pub fn new(tables: &'a MappingTables) -> Self {
        Self { tables }
    }

    pub fn tables(&self) -> &'a MappingTables {
        self.tables
    }

    /// 食材を基本食材に展開する
    ///
    /// 1. 大文字小文字を無視した完全一致
    /// 2. 宣言順に走査し、キーが入力に含まれるか入力がキーに含まれる最初のマッピング
    /// 3. どれにも該当しなければ小文字化した入力そのもの
    pub fn normalize(&self, ingredient: &str) -> Vec<String> {
        let lower = ingredient.trim().to_lowercase();
        if lower.is_empty() {
            return Vec::new();
        }

        if let Some(mapping) = self.tables.mapping_for(&lower) {
            return mapping.components.clone();
        }

        // 先勝ち。最良一致ではない
        for mapping in self.tables.ingredient_mappings() {
            if lower.contains(mapping.name.as_str()) || mapping.name.contains(lower.as_str()) {
                return mapping.components.clone();
            }
        }

        vec![lower]
    }

    /// 複数食材をまとめて正規化（入力順に平坦化）
    pub fn normalize_all<S: AsRef<str>>(&self, ingredients: &[S]) -> Vec<String> {
        ingredients
            .iter()
            .flat_map(|i| self.normalize(i.as_ref()))
            .collect()
    }

    /// ユーザーのアレルゲンと照合する
    ///
    /// 直接の部分一致（双方向）と、アレルゲン名がカテゴリの場合はカテゴリの
    /// キーワードとの部分一致（双方向）を合わせて重複除去する。
    pub fn match_allergens<S: AsRef<str>, A: AsRef<str>>(
        &self,
        ingredients: &[S],
        user_allergens: &[A],
    ) -> AllergenMatches {
        let normalized = self.normalize_all(ingredients);
        let mut matches = BTreeMap::new();

        for allergen in user_allergens {
            let allergen = allergen.as_ref();
            let lower = allergen.trim().to_lowercase();
            let mut found = BTreeSet::new();
            if lower.is_empty() {
                matches.entry(allergen.to_string()).or_insert_with(BTreeSet::new);
                continue;
            }

            for term in &normalized {
                if overlaps(term, &lower) {
                    found.insert(term.clone());
                }
            }

            if let Some(keywords) = self.tables.category(&lower) {
                for keyword in keywords {
                    for term in &normalized {
                        if overlaps(term, keyword) {
                            found.insert(term.clone());
                        }
                    }
                }
            }

            matches
                .entry(allergen.to_string())
                .or_insert_with(BTreeSet::new)
                .extend(found);
        }

        AllergenMatches { matches, normalized }
    }
}

/// どちらかがもう一方を含むか
fn overlaps(a: &str, b: &str) -> bool {
    a.contains(b) || b.contains(a)
}
