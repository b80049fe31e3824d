use crate::analyzer::RetryPolicy;
use crate::error::{Result, ScoutError};
use allergen_scout_common::{MappingTables, MatchThresholds};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// APIキーを探す環境変数（先勝ち）
const API_KEY_ENV_VARS: &[&str] = &["GOOGLE_API_KEY", "GEMINI_API_KEY"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_key: Option<String>,
    pub model: String,

    /// タイトル類似度の閾値（0〜100）
    pub title_threshold: f64,
    /// 食材一致度の閾値（0〜100）
    pub ingredient_threshold: f64,
    /// キャッシュ照合時の料理名類似度の閾値（0〜100）
    pub cache_threshold: f64,
    /// この範囲（両端を含まない）に収まるときだけLLMに問い合わせる
    pub ambiguous_low: f64,
    pub ambiguous_high: f64,

    /// 1バッチで取得する未処理レシピ数
    pub page_size: usize,
    /// バッチ内の同時呼び出し数
    pub max_workers: usize,
    /// 複数料理の一括解析での同時実行数
    pub analysis_concurrency: usize,

    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub timeout_seconds: u64,

    /// キャッシュファイル（未指定時は設定ディレクトリ）
    pub cache_path: Option<PathBuf>,
    /// 食材マッピングの上書きファイル
    pub mappings_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-1.5-flash".into(),
            title_threshold: 70.0,
            ingredient_threshold: 60.0,
            cache_threshold: 80.0,
            ambiguous_low: 30.0,
            ambiguous_high: 95.0,
            page_size: 50,
            max_workers: 20,
            analysis_concurrency: 5,
            max_attempts: 3,
            base_delay_ms: 2000,
            timeout_seconds: 120,
            cache_path: None,
            mappings_path: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path)
    }

    /// 指定パスから読み込み（存在しなければデフォルト）
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;
        self.save_to(&config_path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_dir() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| ScoutError::Config("ホームディレクトリが見つかりません".into()))?;
        Ok(home.join(".config").join("allergen-scout"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// 値の範囲チェック
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("title_threshold", self.title_threshold),
            ("ingredient_threshold", self.ingredient_threshold),
            ("cache_threshold", self.cache_threshold),
            ("ambiguous_low", self.ambiguous_low),
            ("ambiguous_high", self.ambiguous_high),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(ScoutError::Config(format!(
                    "{} は0〜100で指定してください: {}",
                    name, value
                )));
            }
        }
        if self.ambiguous_low >= self.ambiguous_high {
            return Err(ScoutError::Config(
                "ambiguous_low は ambiguous_high より小さくしてください".into(),
            ));
        }
        if self.page_size == 0 || self.max_workers == 0 || self.analysis_concurrency == 0 {
            return Err(ScoutError::Config(
                "page_size / max_workers / analysis_concurrency は1以上".into(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(ScoutError::Config("max_attempts は1以上".into()));
        }
        Ok(())
    }

    pub fn get_api_key(&self) -> Result<String> {
        // 環境変数を優先
        for var in API_KEY_ENV_VARS {
            if let Ok(key) = std::env::var(var) {
                if !key.trim().is_empty() {
                    return Ok(key);
                }
            }
        }

        self.api_key.clone().ok_or(ScoutError::MissingApiKey)
    }

    pub fn set_api_key(&mut self, key: String) -> Result<()> {
        self.api_key = Some(key);
        self.save()
    }

    pub fn thresholds(&self) -> MatchThresholds {
        MatchThresholds {
            title: self.title_threshold,
            ingredient: self.ingredient_threshold,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            timeout: Duration::from_secs(self.timeout_seconds),
        }
    }

    pub fn cache_file(&self) -> Result<PathBuf> {
        match &self.cache_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::config_dir()?.join("enrichment-cache.json")),
        }
    }

    /// 静的テーブルを読み込む（起動時に一度だけ）
    pub fn load_tables(&self) -> Result<MappingTables> {
        match &self.mappings_path {
            Some(path) => {
                if !path.exists() {
                    return Err(ScoutError::FileNotFound(path.display().to_string()));
                }
                Ok(MappingTables::from_file(path)?)
            }
            None => Ok(MappingTables::builtin()),
        }
    }
}
