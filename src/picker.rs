//! 対話式アレルゲン選択
//!
//! カテゴリ一覧から複数選択させる。選択なしは空のリスト。

use crate::error::{Result, ScoutError};
use allergen_scout_common::MappingTables;
use dialoguer::theme::ColorfulTheme;
use dialoguer::MultiSelect;

/// 選択肢として出すアレルゲン名（カテゴリ名の昇順）
pub fn allergen_choices(tables: &MappingTables) -> Vec<String> {
    tables.category_names().map(str::to_string).collect()
}

/// 選ばれた位置を名前に戻す（範囲外は無視）
pub fn selected_names(choices: &[String], indices: &[usize]) -> Vec<String> {
    indices
        .iter()
        .filter_map(|&i| choices.get(i).cloned())
        .collect()
}

pub fn pick_allergens(tables: &MappingTables) -> Result<Vec<String>> {
    let choices = allergen_choices(tables);
    let indices = MultiSelect::with_theme(&ColorfulTheme::default())
        .with_prompt("確認するアレルゲンを選択（スペースで選択、Enterで確定）")
        .items(&choices)
        .interact()
        .map_err(|e| ScoutError::Config(format!("アレルゲン選択エラー: {}", e)))?;
    Ok(selected_names(&choices, &indices))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allergen_choices_from_builtin() {
        let choices = allergen_choices(&MappingTables::builtin());
        assert!(choices.contains(&"dairy".to_string()));
        assert!(choices.contains(&"wheat".to_string()));
        let mut sorted = choices.clone();
        sorted.sort();
        assert_eq!(choices, sorted);
    }

    #[test]
    fn test_selected_names() {
        let choices = vec!["dairy".to_string(), "eggs".to_string(), "fish".to_string()];
        assert_eq!(selected_names(&choices, &[2, 0, 9]), vec!["fish", "dairy"]);
    }
}
