//! マッピング表の読み込みと解析レスポンスのパースで使うエラー

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// 解析レスポンスの形が想定と違う
    #[error("レスポンス不正: {0}")]
    Parse(String),

    /// マッピング表・カテゴリ表の内容が不正
    #[error("マッピング表が不正: {0}")]
    InvalidTable(String),

    #[error("マッピングファイルの読み込みに失敗: {0}")]
    Io(#[from] std::io::Error),

    #[error("マッピングファイルのJSONが不正: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
