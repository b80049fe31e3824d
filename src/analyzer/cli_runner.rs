//! AI CLI連携モジュール
//!
//! claude / codex / gemini のCLIにプロンプトを渡し、標準出力を応答として読む。
//! 応答の検証は共通パーサーで行う。

use super::{complete_dish, complete_ingredients, AnalysisProvider, DishQuery, TextCompletion};
use crate::ai_provider::AiProvider;
use crate::error::{Result, ScoutError};
use allergen_scout_common::{DishAnalysis, IngredientAnalysis};
use async_trait::async_trait;
use tokio::process::Command;

pub struct CliProvider {
    provider: AiProvider,
}

impl CliProvider {
    pub fn new(provider: AiProvider) -> Self {
        Self { provider }
    }

    /// 起動するコマンド名
    fn program(&self) -> &'static str {
        match self.provider {
            AiProvider::GeminiApi => AiProvider::Gemini.command_name(),
            other => other.command_name(),
        }
    }

    /// CLIに渡す引数
    fn args(&self, prompt: &str) -> Vec<String> {
        let prompt = prompt.to_string();
        match self.provider {
            AiProvider::Claude => vec!["-p".into(), prompt, "--output-format".into(), "text".into()],
            AiProvider::Codex => vec!["exec".into(), prompt],
            // gemini-api はHTTP経由が本来の経路。CLIに回ってきたら gemini コマンドで代用
            AiProvider::Gemini | AiProvider::GeminiApi => vec!["-p".into(), prompt],
        }
    }

    fn command(&self, prompt: &str) -> Command {
        // Windowsではcmd /c経由
        #[cfg(windows)]
        {
            let mut cmd = Command::new("cmd");
            cmd.arg("/c").arg(self.program()).args(self.args(prompt));
            cmd
        }
        #[cfg(not(windows))]
        {
            let mut cmd = Command::new(self.program());
            cmd.args(self.args(prompt));
            cmd
        }
    }
}

#[async_trait]
impl TextCompletion for CliProvider {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let name = self.program();
        tracing::debug!(cli = name, prompt_len = prompt.len(), "CLI 呼び出し");

        let output = self
            .command(prompt)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ScoutError::CliExecution(format!("{} を起動できません: {}", name, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ScoutError::CliExecution(format!(
                "{} failed (code {:?}): {}",
                name,
                output.status.code(),
                stderr.trim()
            )));
        }

        let response = String::from_utf8_lossy(&output.stdout).to_string();
        let preview: String = response.chars().take(500).collect();
        tracing::trace!(cli = name, response = %preview, "CLI レスポンス");

        Ok(response)
    }
}

#[async_trait]
impl AnalysisProvider for CliProvider {
    fn name(&self) -> &str {
        self.program()
    }

    async fn analyze_dish(&self, query: &DishQuery) -> Result<DishAnalysis> {
        complete_dish(self, query).await
    }

    async fn analyze_ingredients(&self, ingredients: &[String]) -> Result<IngredientAnalysis> {
        complete_ingredients(self, ingredients).await
    }
}
