use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tool-recognition")]
#[command(about = "工具セット認識サービスのクライアント", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 画像1枚を解析
    Analyze {
        /// 画像ファイル (jpg/png)
        #[arg(required = true)]
        image: PathBuf,

        #[command(flatten)]
        thresholds: ThresholdArgs,

        #[command(flatten)]
        save: SaveArgs,
    },

    /// ZIPにまとめた画像を一括解析
    Batch {
        /// ZIPファイル
        #[arg(required = true)]
        archive: PathBuf,

        #[command(flatten)]
        thresholds: ThresholdArgs,

        #[command(flatten)]
        save: SaveArgs,
    },

    /// 保存済みの結果を一覧表示（新しい順）
    List,

    /// 保存済みの結果を表示
    Show {
        /// 保存ID
        id: i64,
    },

    /// 保存済みの結果を削除（画像ファイルも削除）
    Delete {
        /// 保存ID
        id: i64,

        /// 確認せずに削除
        #[arg(short, long)]
        yes: bool,
    },

    /// 設定を表示/編集
    Config {
        /// 検出APIのURLを設定
        #[arg(long)]
        set_api_url: Option<String>,

        /// 注釈付き画像のURLを設定
        #[arg(long)]
        set_images_url: Option<String>,

        /// 設定を表示
        #[arg(long)]
        show: bool,
    },
}

/// 検出しきい値（省略時は設定値）
#[derive(clap::Args, Debug, Clone, Default)]
pub struct ThresholdArgs {
    /// 信頼度しきい値 (0.0-1.0)
    #[arg(short, long)]
    pub confidence: Option<f32>,

    /// IoUしきい値 (0.0-1.0)
    #[arg(short, long)]
    pub iou: Option<f32>,
}

/// 解析後の保存オプション
#[derive(clap::Args, Debug, Clone, Default)]
pub struct SaveArgs {
    /// この名前で結果を保存
    #[arg(long)]
    pub save: Option<String>,

    /// 保存時の説明
    #[arg(short, long, requires = "save")]
    pub description: Option<String>,
}
