use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScoutError {
    #[error("設定エラー: {0}")]
    Config(String),

    #[error("APIキーが設定されていません。`allergen-scout config --set-api-key YOUR_KEY` で設定するか GOOGLE_API_KEY を指定してください")]
    MissingApiKey,

    #[error("ファイルが見つかりません: {0}")]
    FileNotFound(String),

    #[error("フォルダが見つかりません: {0}")]
    FolderNotFound(String),

    #[error("API呼び出しエラー: {0}")]
    ApiCall(String),

    #[error("APIレスポンスのパースに失敗: {0}")]
    ApiParse(String),

    #[error("API呼び出しがタイムアウトしました（{0}秒）")]
    Timeout(u64),

    #[error("リトライ上限に達しました（{attempts}回）: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error("コーパスストアエラー: {0}")]
    Store(String),

    #[error("コーパスファイルが不正: {0}")]
    InvalidCorpus(String),

    #[error("JSON解析エラー: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IOエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("CLI実行エラー: {0}")]
    CliExecution(String),

    #[error(transparent)]
    Common(#[from] allergen_scout_common::Error),
}

impl ScoutError {
    /// リトライで回復しうるエラーか
    ///
    /// 通信・タイムアウト・レスポンス不正はリトライ対象。
    /// ストア障害や設定ミスは即座に失敗させる。
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ScoutError::ApiCall(_)
                | ScoutError::ApiParse(_)
                | ScoutError::Timeout(_)
                | ScoutError::JsonParse(_)
                | ScoutError::CliExecution(_)
        )
    }
}

impl From<reqwest::Error> for ScoutError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ScoutError::ApiCall(format!("タイムアウト: {}", e))
        } else {
            ScoutError::ApiCall(e.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, ScoutError>;
