//! 生のレシピJSONの取り込み
//!
//! 形式: `{ "<id>": { "title", "ingredients", "instructions", "picture_link" } }`。
//! 食材行に混ざる "ADVERTISEMENT" を取り除く。

use crate::error::{Result, ScoutError};
use allergen_scout_common::RecipeRecord;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const AD_MARKER: &str = "ADVERTISEMENT";

#[derive(Debug, Default, Deserialize)]
struct RawRecipe {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    ingredients: Option<Vec<Option<String>>>,
    #[serde(default)]
    instructions: Option<String>,
    #[serde(default)]
    picture_link: Option<String>,
}

/// 食材行から広告の残骸を除く（空になった行は捨てる）
pub fn clean_ingredients<I: IntoIterator<Item = String>>(lines: I) -> Vec<String> {
    lines
        .into_iter()
        .map(|line| line.replace(AD_MARKER, "").trim().to_string())
        .filter(|line| !line.is_empty())
        .collect()
}

/// 生のレシピJSONファイル1つを読み込む
pub fn load_raw_recipes(path: &Path) -> Result<Vec<RecipeRecord>> {
    if !path.exists() {
        return Err(ScoutError::FileNotFound(path.display().to_string()));
    }
    let content = std::fs::read_to_string(path)?;
    let raw: BTreeMap<String, Option<RawRecipe>> = serde_json::from_str(&content)
        .map_err(|e| ScoutError::InvalidCorpus(format!("{}: {}", path.display(), e)))?;

    let records = raw
        .into_iter()
        .map(|(id, recipe)| {
            let recipe = recipe.unwrap_or_default();
            let ingredients = clean_ingredients(recipe.ingredients.unwrap_or_default().into_iter().flatten());
            RecipeRecord {
                instructions: recipe.instructions,
                picture_link: recipe.picture_link,
                ..RecipeRecord::new(id, recipe.title.unwrap_or_default(), ingredients)
            }
        })
        .collect();
    Ok(records)
}

/// フォルダ直下の *.json（ファイル名順）
pub fn scan_corpus_folder(folder: &Path) -> Result<Vec<PathBuf>> {
    if !folder.exists() {
        return Err(ScoutError::FolderNotFound(folder.display().to_string()));
    }

    let mut files: Vec<PathBuf> = WalkDir::new(folder)
        .max_depth(1) // 直下のみ（再帰しない）
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.extension()
                .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case("json"))
                .unwrap_or(false)
        })
        .collect();

    files.sort();
    Ok(files)
}

/// ファイルまたはフォルダから取り込む
pub fn ingest_path(path: &Path) -> Result<Vec<RecipeRecord>> {
    if path.is_dir() {
        let mut records = Vec::new();
        for file in scan_corpus_folder(path)? {
            let loaded = load_raw_recipes(&file)?;
            tracing::info!(file = %file.display(), recipes = loaded.len(), "取り込み");
            records.extend(loaded);
        }
        Ok(records)
    } else {
        load_raw_recipes(path)
    }
}
