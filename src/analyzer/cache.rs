//! 料理単位の解析結果キャッシュ
//!
//! (料理名, 食材セット) をキーに、アレルゲンごとの使われ方を保存する。
//! 書き込みは正規化したキーの完全一致で統合し、読み出しは食材セットの完全一致と
//! 料理名のあいまい一致（類似度が閾値以上で最大のもの）で引く。

use crate::error::Result;
use allergen_scout_common::similarity::ratio;
use allergen_scout_common::{AllergenAnalysis, UsageNote};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// キャッシュファイルの構造
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentCache {
    /// バージョン（互換性チェック用）
    version: u32,
    /// キーのハッシュ → エントリ
    entries: BTreeMap<String, CacheEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// 正規化済みの料理名
    pub dish: String,
    /// 正規化済みの食材セット
    pub ingredients: BTreeSet<String>,
    /// アレルゲン → 使われ方
    pub allergens: AllergenAnalysis,
    #[serde(default)]
    pub normalized_ingredients: BTreeMap<String, String>,
    pub updated_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn get(&self, allergen: &str) -> Option<&UsageNote> {
        self.allergens.get(&allergen.trim().to_lowercase())
    }

    /// このエントリにまだ無いアレルゲン
    pub fn missing<S: AsRef<str>>(&self, allergens: &[S]) -> Vec<String> {
        allergens
            .iter()
            .map(|a| a.as_ref().trim().to_lowercase())
            .filter(|a| !self.allergens.contains_key(a))
            .collect()
    }
}

/// 料理名の正規化（前後空白除去・小文字化・連続空白の圧縮）
pub fn canonical_dish(dish: &str) -> String {
    dish.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// 食材セットの正規化（順序・大文字小文字・重複・空要素を無視）
pub fn canonical_ingredients<S: AsRef<str>>(ingredients: &[S]) -> BTreeSet<String> {
    ingredients
        .iter()
        .map(|s| s.as_ref().trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// 正規化済みキーのハッシュ
fn entry_key(dish: &str, ingredients: &BTreeSet<String>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(dish.as_bytes());
    for ingredient in ingredients {
        hasher.update([0u8]);
        hasher.update(ingredient.as_bytes());
    }
    hex::encode(hasher.finalize())
}

impl EnrichmentCache {
    const CURRENT_VERSION: u32 = 1;

    /// キャッシュファイルを読み込み
    ///
    /// 無い・壊れている・バージョン違いのときは空のキャッシュ。
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "キャッシュを開けません");
                return Self::default();
            }
        };

        match serde_json::from_reader::<_, EnrichmentCache>(BufReader::new(file)) {
            Ok(cache) if cache.version == Self::CURRENT_VERSION => cache,
            Ok(_) => {
                tracing::warn!("キャッシュバージョン不一致、再生成します");
                Self::default()
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "キャッシュが壊れています、再生成します");
                Self::default()
            }
        }
    }

    /// キャッシュファイルを保存
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// キャッシュファイルを削除（存在した場合 true）
    pub fn remove_file(path: &Path) -> Result<bool> {
        if path.exists() {
            std::fs::remove_file(path)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// あいまい検索
    ///
    /// 食材セットが完全一致するエントリのうち、料理名の類似度が
    /// `threshold` 以上で最大のもの。同点なら `updated_at` が新しい方。
    pub fn lookup<S: AsRef<str>>(
        &self,
        dish: &str,
        ingredients: &[S],
        threshold: f64,
    ) -> Option<&CacheEntry> {
        let dish = canonical_dish(dish);
        let ingredients = canonical_ingredients(ingredients);

        let mut best: Option<(f64, &CacheEntry)> = None;
        for entry in self.entries.values() {
            if entry.ingredients != ingredients {
                continue;
            }
            let score = ratio(&dish, &entry.dish);
            if score < threshold {
                continue;
            }
            let better = match best {
                None => true,
                Some((s, current)) => {
                    score > s || (score == s && entry.updated_at > current.updated_at)
                }
            };
            if better {
                best = Some((score, entry));
            }
        }
        best.map(|(_, entry)| entry)
    }

    /// 完全一致キーで統合して書き込む
    ///
    /// 既存エントリのアレルゲンは残し、同じアレルゲンは新しい値で上書きする。
    pub fn upsert<S: AsRef<str>>(
        &mut self,
        dish: &str,
        ingredients: &[S],
        allergens: AllergenAnalysis,
        normalized_ingredients: BTreeMap<String, String>,
    ) -> &CacheEntry {
        let dish = canonical_dish(dish);
        let ingredients = canonical_ingredients(ingredients);
        let key = entry_key(&dish, &ingredients);
        let now = Utc::now();

        let entry = self.entries.entry(key).or_insert_with(|| CacheEntry {
            dish,
            ingredients,
            allergens: AllergenAnalysis::new(),
            normalized_ingredients: BTreeMap::new(),
            updated_at: now,
        });
        entry
            .allergens
            .extend(allergens.into_iter().map(|(k, v)| (k.trim().to_lowercase(), v)));
        entry.normalized_ingredients.extend(normalized_ingredients);
        entry.updated_at = now;
        entry
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for EnrichmentCache {
    fn default() -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            entries: BTreeMap::new(),
        }
    }
}
