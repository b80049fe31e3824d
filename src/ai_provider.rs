use crate::analyzer::{AnalysisProvider, CliProvider, GeminiProvider};
use crate::config::Config;
use crate::error::Result;
use clap::ValueEnum;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum AiProvider {
    /// Gemini API（HTTP、APIキー必須）
    #[default]
    GeminiApi,
    Claude,
    Codex,
    Gemini,
}

impl AiProvider {
    pub fn command_name(&self) -> &'static str {
        match self {
            AiProvider::GeminiApi => "gemini-api",
            AiProvider::Claude => "claude",
            AiProvider::Codex => "codex",
            AiProvider::Gemini => "gemini",
        }
    }

    /// 設定からプロバイダを組み立てる
    pub fn build(&self, config: &Config) -> Result<Arc<dyn AnalysisProvider>> {
        match self {
            AiProvider::GeminiApi => {
                let provider = GeminiProvider::new(
                    config.get_api_key()?,
                    config.model.clone(),
                    Duration::from_secs(config.timeout_seconds),
                )?;
                Ok(Arc::new(provider))
            }
            cli => Ok(Arc::new(CliProvider::new(*cli))),
        }
    }
}
