use anyhow::{bail, Context};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use tool_recognition::cli::{Cli, Commands, SaveArgs, ThresholdArgs};
use tool_recognition::client::DetectionClient;
use tool_recognition::config::Config;
use tool_recognition::session::{describe_snapshot, CurrentResult, SelectedInput, Session};
use tool_recognition::store::{ResultStore, SavedSnapshot, SnapshotPayload};
use tool_recognition_common::{AnalysisResult, BatchOutcome, SingleAnalysisOutcome};

type ClientSession = Session<DetectionClient>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    let mut config = Config::load()?;

    if let Commands::Config { set_api_url, set_images_url, show } = &cli.command {
        if set_api_url.is_some() || set_images_url.is_some() {
            // 環境変数による上書きはファイルに書き込まない
            let mut stored = Config::load_file()?;
            if let Some(url) = set_api_url {
                stored.set_api_url(url.clone())?;
                println!("✔ 検出APIのURLを設定しました");
            }
            if let Some(url) = set_images_url {
                stored.set_images_url(url.clone())?;
                println!("✔ 画像URLを設定しました");
            }
            config = Config::load()?;
        }
        if *show {
            println!("設定:");
            println!("  検出API: {}", config.api_base_url);
            println!("  画像URL: {}", config.images_base_url);
            println!("  タイムアウト: {}秒", config.timeout_seconds);
            println!("  同時取得枚数: {}", config.download_chunk_size);
            println!("  しきい値: confidence={} iou={}", config.default_confidence, config.default_iou);
            println!("  保存先: {}", config.data_dir()?.display());
        }
        return Ok(());
    }

    let session = Arc::new(open_session(&config).await?);

    match cli.command {
        Commands::Analyze { image, thresholds, save } => {
            println!("🔧 tool-recognition - 画像解析\n");
            apply_thresholds(&session, &thresholds)?;
            let bytes = std::fs::read(&image)
                .with_context(|| format!("画像を読み込めません: {}", image.display()))?;
            session.select_input(Some(SelectedInput::image(file_name_of(&image, "image.jpg"), bytes)));

            println!("[1/2] 解析中...");
            session.analyze().await;
            let state = session.state();
            if let Some(err) = state.error {
                bail!(err);
            }
            if let Some(CurrentResult::Single(outcome)) = &state.result {
                print_single(outcome);
            }

            if let Some(name) = &save.save {
                println!("\n[2/2] 保存中...");
                save_result(&session, name, &save).await?;
            }
        }

        Commands::Batch { archive, thresholds, save } => {
            println!("🔧 tool-recognition - 一括解析\n");
            apply_thresholds(&session, &thresholds)?;
            let bytes = std::fs::read(&archive)
                .with_context(|| format!("ZIPを読み込めません: {}", archive.display()))?;

            println!("[1/2] 一括解析中...");
            session.analyze_batch(&file_name_of(&archive, "images.zip"), &bytes).await;
            let state = session.state();
            if let Some(err) = state.error {
                bail!(err);
            }
            if let Some(CurrentResult::Batch(outcome)) = &state.result {
                print_batch(outcome);
            }

            if let Some(name) = &save.save {
                println!("\n[2/2] 注釈付き画像を取得して保存中... (Ctrl-Cで中止)");
                save_result(&session, name, &save).await?;
            }
        }

        Commands::List => {
            let list = session.saved_results().borrow().clone();
            if list.is_empty() {
                println!("保存済みの結果はありません");
            }
            for snapshot in &list {
                println!("{}", describe_snapshot(snapshot));
            }
        }

        Commands::Show { id } => {
            let Some(snapshot) = find_snapshot(&session, id).await? else {
                bail!("id={} の結果が見つかりません", id);
            };
            print_snapshot(&snapshot);
        }

        Commands::Delete { id, yes } => {
            let Some(snapshot) = find_snapshot(&session, id).await? else {
                bail!("id={} の結果が見つかりません", id);
            };

            let confirmed = yes
                || dialoguer::Confirm::new()
                    .with_prompt(format!("「{}」を削除しますか？", snapshot.name))
                    .default(false)
                    .interact()?;
            if !confirmed {
                println!("中止しました");
                return Ok(());
            }

            if !session.delete_saved(&snapshot).await {
                bail!(session.state().error.unwrap_or_default());
            }
            println!("✔ 削除しました: {}", snapshot.name);
        }

        Commands::Config { .. } => {}
    }

    Ok(())
}

fn init_logger(verbose: bool) {
    let mut builder = if verbose {
        let mut b = env_logger::Builder::new();
        b.filter_level(log::LevelFilter::Debug);
        b
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
    };
    builder.format_timestamp(None).init();
}

async fn open_session(config: &Config) -> anyhow::Result<ClientSession> {
    let client = DetectionClient::new(config)?;
    let data_dir = config.data_dir()?;
    let store = ResultStore::open(&data_dir)
        .await
        .with_context(|| format!("保存先を開けません: {}", data_dir.display()))?;
    Ok(Session::new(client, store, config.default_thresholds()).with_chunk_size(config.download_chunk_size))
}

fn apply_thresholds(session: &ClientSession, args: &ThresholdArgs) -> anyhow::Result<()> {
    let current = session.state().thresholds;
    let confidence = args.confidence.unwrap_or(current.confidence);
    let iou = args.iou.unwrap_or(current.iou);

    session.update_thresholds(confidence, iou);
    if let Some(err) = session.state().error {
        bail!(err);
    }
    Ok(())
}

/// 進捗バーとCtrl-Cを繋いで保存する
async fn save_result(session: &Arc<ClientSession>, name: &str, args: &SaveArgs) -> anyhow::Result<()> {
    let bar = ProgressBar::hidden();
    bar.set_style(
        ProgressStyle::with_template("  {bar:40.cyan/blue} {pos}/{len}枚 ({percent}%)")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let mut progress_rx = session.subscribe_progress();
    let watcher_bar = bar.clone();
    let watcher = tokio::spawn(async move {
        while progress_rx.changed().await.is_ok() {
            let progress = *progress_rx.borrow_and_update();
            if progress.is_downloading {
                if watcher_bar.is_hidden() {
                    watcher_bar.set_draw_target(indicatif::ProgressDrawTarget::stderr());
                }
                watcher_bar.set_length(progress.total_images as u64);
                watcher_bar.set_position(progress.downloaded_images as u64);
            }
        }
    });

    let cancel_session = Arc::clone(session);
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_session.cancel_download();
        }
    });

    let saved = session.save_current(name, args.description.as_deref()).await;

    ctrl_c.abort();
    watcher.abort();
    bar.finish_and_clear();

    let state = session.state();
    match saved {
        Some(id) => {
            println!("✔ 保存しました: {} (id={})", name, id);
            Ok(())
        }
        None => match state.error {
            Some(err) => bail!(err),
            None => {
                println!("保存を中止しました");
                Ok(())
            }
        },
    }
}

async fn find_snapshot(session: &ClientSession, id: i64) -> anyhow::Result<Option<SavedSnapshot>> {
    let snapshot = session.get_saved(id).await;
    if snapshot.is_none() {
        if let Some(err) = session.state().error {
            bail!(err);
        }
    }
    Ok(snapshot)
}

fn file_name_of(path: &Path, fallback: &str) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| fallback.to_string())
}

fn print_analysis(result: &AnalysisResult, indent: &str) {
    println!("{}判定: {} ({})", indent, result.status.label(), result.message);
    println!("{}検出数: {} / 期待数 {}", indent, result.total_detections, result.expected_count);
    if !result.missing_tools.is_empty() {
        println!("{}不足: {}", indent, result.missing_tools.join(", "));
    }
    if !result.extra_tools.is_empty() {
        println!("{}余分: {}", indent, result.extra_tools.join(", "));
    }
    for item in &result.detections {
        let [x1, y1, x2, y2] = item.bbox;
        println!(
            "{}  - {} (#{}) {:.2} [{:.1}, {:.1}, {:.1}, {:.1}]",
            indent, item.class_name, item.class_id, item.confidence, x1, y1, x2, y2
        );
    }
}

fn print_single(outcome: &SingleAnalysisOutcome) {
    println!("✔ 解析完了\n");
    print_analysis(&outcome.analysis_result, "  ");
    println!(
        "  しきい値: confidence={} iou={}",
        outcome.config.confidence_threshold, outcome.config.iou_threshold
    );
}

fn print_batch(outcome: &BatchOutcome) {
    println!(
        "✔ 解析完了: {}/{}枚 ({:.1}秒)\n",
        outcome.processed_images, outcome.total_images, outcome.processing_time
    );
    for (status, count) in &outcome.summary {
        println!("  {}: {}枚", status, count);
    }
    for item in &outcome.results {
        println!("\n  {}", item.filename);
        print_analysis(&item.analysis_result, "    ");
    }
}

fn print_snapshot(snapshot: &SavedSnapshot) {
    println!("{}", describe_snapshot(snapshot));
    if let Some(desc) = &snapshot.description {
        println!("  説明: {}", desc);
    }
    match &snapshot.payload {
        SnapshotPayload::Single { outcome, image_path } => {
            print_analysis(&outcome.analysis_result, "  ");
            if let Some(path) = image_path {
                println!("  画像: {}", path.display());
            }
        }
        SnapshotPayload::Batch { outcome, image_paths } => {
            print_batch(outcome);
            println!();
            for path in image_paths {
                println!("  画像: {}", path.display());
            }
        }
    }
}
