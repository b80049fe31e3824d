use crate::ai_provider::AiProvider;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "allergen-scout")]
#[command(about = "料理名とレシピコーパスからアレルゲン含有確率を推定するツール", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// AIプロバイダ (gemini-api/claude/codex/gemini)
    #[arg(long, value_enum, default_value_t = AiProvider::GeminiApi, global = true)]
    pub ai_provider: AiProvider,

    /// コーパス（ストアJSONファイル）
    #[arg(long, global = true, default_value = "corpus.json")]
    pub corpus: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    /// タイトルに料理名を含むレシピを表示
    Search {
        #[arg(required = true)]
        dish: String,

        /// アレルゲン（複数指定可）
        #[arg(short, long = "allergen")]
        allergens: Vec<String>,
    },

    /// タイトルに料理名を含むレシピでのアレルゲン含有率
    Detect {
        #[arg(required = true)]
        dish: String,

        #[arg(short, long = "allergen")]
        allergens: Vec<String>,
    },

    /// あいまい照合でアレルゲン確率を推定（省略時は対話的にアレルゲンを選択）
    Check {
        #[arg(required = true)]
        dish: String,

        #[arg(short, long = "allergen")]
        allergens: Vec<String>,

        /// メイン食材（複数指定可）
        #[arg(short, long = "ingredient")]
        ingredients: Vec<String>,

        /// 意味解析（キャッシュ・プロバイダ）を使わない
        #[arg(long)]
        offline: bool,
    },

    /// メニューの1品を解析
    Analyze {
        #[arg(required = true)]
        dish: String,

        #[arg(short, long = "allergen")]
        allergens: Vec<String>,

        #[arg(short, long = "ingredient")]
        ingredients: Vec<String>,

        /// 正規化済み食材（複数指定可）
        #[arg(short, long = "normalized")]
        normalized: Vec<String>,
    },

    /// メニューJSON（dishes + user_allergens）を一括解析
    Batch {
        #[arg(required = true)]
        input: PathBuf,

        /// 出力JSONファイル（省略時は標準出力）
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// 未処理レシピをエンリッチ
    Enrich {
        /// 数件だけ解析して表示（書き込まない）
        #[arg(long)]
        trial: bool,

        /// トライアルの件数
        #[arg(long, default_value = "3")]
        sample: usize,

        /// 1バッチの件数（省略時は設定値）
        #[arg(long)]
        page_size: Option<usize>,

        /// 同時呼び出し数（省略時は設定値）
        #[arg(long)]
        workers: Option<usize>,
    },

    /// 生のレシピJSON（ファイルまたはフォルダ）をコーパスに取り込む
    Ingest {
        #[arg(required = true)]
        source: PathBuf,
    },

    /// キャッシュ管理
    Cache {
        /// キャッシュを削除
        #[arg(long)]
        clear: bool,

        /// キャッシュ情報を表示
        #[arg(long)]
        info: bool,
    },

    /// 設定を表示/編集
    Config {
        /// APIキーを設定
        #[arg(long)]
        set_api_key: Option<String>,

        /// 設定を表示
        #[arg(long)]
        show: bool,
    },
}
