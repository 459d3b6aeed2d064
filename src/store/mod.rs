//! 解析結果の保存
//!
//! SQLiteの1テーブルに名前付きスナップショットを保存し、
//! 注釈付き画像は `saved_images/` 以下にPNGで書き出す。
//! テーブルと画像ディレクトリはこのモジュールだけが書き込む。

mod schema;
mod snapshot;

pub use schema::{LEGACY_TABLE, SCHEMA_VERSION};
pub use snapshot::{SavedSnapshot, SnapshotPayload, PATH_SEPARATOR};

use crate::error::{Result, ToolRecognitionError};
use image::{DynamicImage, ImageFormat};
use snapshot::{join_paths, SavedAnalysisRow};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tool_recognition_common::{BatchOutcome, SingleAnalysisOutcome};

const DB_FILE_NAME: &str = "saved_results.db";
const IMAGES_DIR_NAME: &str = "saved_images";

const SELECT_COLUMNS: &str = "SELECT id, name, description, timestamp, single_analysis_json, \
     batch_analysis_json, local_annotated_image_path, local_annotated_images_batch \
     FROM saved_analysis";

/// 保存済み解析結果のストア
pub struct ResultStore {
    pool: SqlitePool,
    images_dir: PathBuf,
    updates: watch::Sender<Vec<SavedSnapshot>>,
}

impl ResultStore {
    /// データディレクトリを開く（なければ作成）
    pub async fn open(data_dir: &Path) -> Result<Self> {
        let images_dir = data_dir.join(IMAGES_DIR_NAME);
        tokio::fs::create_dir_all(&images_dir).await?;

        let options = SqliteConnectOptions::new()
            .filename(data_dir.join(DB_FILE_NAME))
            .create_if_missing(true);

        // 書き込みは常に1本
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        schema::migrate(&pool).await?;

        let (updates, _) = watch::channel(Vec::new());
        let store = Self {
            pool,
            images_dir,
            updates,
        };
        store.publish().await;
        Ok(store)
    }

    pub fn images_dir(&self) -> &Path {
        &self.images_dir
    }

    /// 単一画像の結果を保存して新しいIDを返す
    pub async fn save_single(
        &self,
        name: &str,
        description: Option<&str>,
        outcome: &SingleAnalysisOutcome,
        image: Option<&DynamicImage>,
    ) -> Result<i64> {
        let name = validate_name(name)?;
        let json = serde_json::to_string(outcome)?;

        let image_path = match image {
            Some(img) => Some(self.write_image(img).await?),
            None => None,
        };
        let written: Vec<PathBuf> = image_path.iter().cloned().collect();

        let inserted = self
            .insert(
                name,
                description,
                Some(json),
                None,
                image_path.map(|p| p.to_string_lossy().to_string()),
                None,
            )
            .await;

        self.finish_insert(inserted, &written).await
    }

    /// 一括解析の結果を保存して新しいIDを返す
    ///
    /// `images` は取得できた分だけでよい（結果数より少なくてもよい）。
    pub async fn save_batch(
        &self,
        name: &str,
        description: Option<&str>,
        outcome: &BatchOutcome,
        images: &[DynamicImage],
    ) -> Result<i64> {
        let name = validate_name(name)?;
        let json = serde_json::to_string(outcome)?;

        let mut written = Vec::with_capacity(images.len());
        for img in images {
            match self.write_image(img).await {
                Ok(path) => written.push(path),
                Err(e) => {
                    remove_files(&written).await;
                    return Err(e);
                }
            }
        }

        let inserted = self
            .insert(name, description, None, Some(json), None, Some(join_paths(&written)))
            .await;

        self.finish_insert(inserted, &written).await
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<SavedSnapshot>> {
        let row: Option<SavedAnalysisRow> = sqlx::query_as(&format!("{} WHERE id = ? LIMIT 1", SELECT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(SavedSnapshot::try_from).transpose()
    }

    /// 新しい順に全件
    ///
    /// 読めない行はログに出して飛ばす。
    pub async fn list_all(&self) -> Result<Vec<SavedSnapshot>> {
        let rows: Vec<SavedAnalysisRow> =
            sqlx::query_as(&format!("{} ORDER BY timestamp DESC, id DESC", SELECT_COLUMNS))
                .fetch_all(&self.pool)
                .await?;

        let snapshots = rows
            .into_iter()
            .filter_map(|row| match SavedSnapshot::try_from(row) {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    log::warn!("保存データをスキップ: {}", e);
                    None
                }
            })
            .collect();
        Ok(snapshots)
    }

    /// 一覧の変更を購読する（挿入・削除のたびに全件が届く）
    pub fn subscribe(&self) -> watch::Receiver<Vec<SavedSnapshot>> {
        self.updates.subscribe()
    }

    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM saved_analysis")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// 画像ファイルを消してから行を削除する
    ///
    /// 画像の削除失敗はログに出すだけで、行の削除は続行する。
    pub async fn delete(&self, snapshot: &SavedSnapshot) -> Result<()> {
        for path in snapshot.image_paths() {
            remove_image(path).await;
        }

        sqlx::query("DELETE FROM saved_analysis WHERE id = ?")
            .bind(snapshot.id)
            .execute(&self.pool)
            .await?;

        log::info!("削除: id={} ({})", snapshot.id, snapshot.name);
        self.publish().await;
        Ok(())
    }

    async fn insert(
        &self,
        name: &str,
        description: Option<&str>,
        single_json: Option<String>,
        batch_json: Option<String>,
        image_path: Option<String>,
        batch_paths: Option<String>,
    ) -> Result<i64> {
        let description = description.map(str::trim).filter(|d| !d.is_empty());
        let timestamp = chrono::Utc::now().timestamp_millis();

        let result = sqlx::query(
            "INSERT INTO saved_analysis (name, description, timestamp, single_analysis_json, \
             batch_analysis_json, local_annotated_image_path, local_annotated_images_batch) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(name)
        .bind(description)
        .bind(timestamp)
        .bind(single_json)
        .bind(batch_json)
        .bind(image_path)
        .bind(batch_paths)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// 挿入に失敗したら書き出した画像を片付ける
    async fn finish_insert(&self, inserted: Result<i64>, written: &[PathBuf]) -> Result<i64> {
        match inserted {
            Ok(id) => {
                log::info!("保存: id={} (画像{}枚)", id, written.len());
                self.publish().await;
                Ok(id)
            }
            Err(e) => {
                remove_files(written).await;
                Err(e)
            }
        }
    }

    /// PNGのエンコードと書き込みはブロッキングスレッドで行う
    async fn write_image(&self, image: &DynamicImage) -> Result<PathBuf> {
        let path = self
            .images_dir
            .join(format!("annotated_{}.png", uuid::Uuid::new_v4().simple()));

        let image = image.clone();
        let target = path.clone();
        tokio::task::spawn_blocking(move || image.save_with_format(&target, ImageFormat::Png))
            .await
            .map_err(|e| ToolRecognitionError::Storage(format!("画像の書き込みタスクが失敗: {}", e)))?
            .map_err(|e| ToolRecognitionError::Storage(format!("画像の書き込みに失敗 {}: {}", path.display(), e)))?;
        Ok(path)
    }

    async fn publish(&self) {
        match self.list_all().await {
            Ok(list) => {
                self.updates.send_replace(list);
            }
            Err(e) => log::warn!("一覧の更新通知に失敗: {}", e),
        }
    }
}

fn validate_name(name: &str) -> Result<&str> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ToolRecognitionError::Validation("名前を入力してください".into()));
    }
    Ok(trimmed)
}

async fn remove_image(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("画像の削除に失敗 {}: {}", path.display(), e),
    }
}

async fn remove_files(paths: &[PathBuf]) {
    for path in paths {
        remove_image(path).await;
    }
}
