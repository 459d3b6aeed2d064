//! テーブル定義とスキーマ移行
//!
//! `PRAGMA user_version` でバージョン管理する。
//! - 0: 未作成、または旧形式（name / description / timestamp / message のみ）
//! - 2: 単一・一括の結果列と画像パス列を持つ現行形式
//!
//! 旧形式のテーブルは `saved_analysis_v1` に退避してから新しく作り直す。
//! 旧データは消さずに残すが、一覧には出さない。

use crate::error::Result;
use sqlx::{Row, SqlitePool};

pub const TABLE: &str = "saved_analysis";
pub const LEGACY_TABLE: &str = "saved_analysis_v1";
pub const SCHEMA_VERSION: i64 = 2;

const CREATE_TABLE: &str = "
CREATE TABLE IF NOT EXISTS saved_analysis (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    description TEXT,
    timestamp INTEGER NOT NULL,
    single_analysis_json TEXT,
    batch_analysis_json TEXT,
    local_annotated_image_path TEXT,
    local_annotated_images_batch TEXT,
    CHECK ((single_analysis_json IS NULL) <> (batch_analysis_json IS NULL))
)";

pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    let version: i64 = sqlx::query_scalar("PRAGMA user_version")
        .fetch_one(pool)
        .await?;

    if version >= SCHEMA_VERSION {
        return Ok(());
    }

    let columns = table_columns(pool, TABLE).await?;
    if columns.is_empty() {
        log::info!("テーブルを作成: {}", TABLE);
    } else if !columns.iter().any(|c| c == "single_analysis_json") {
        log::warn!("旧形式のテーブルを {} に退避します", LEGACY_TABLE);
        sqlx::query(&format!("ALTER TABLE {} RENAME TO {}", TABLE, LEGACY_TABLE))
            .execute(pool)
            .await?;
    }

    sqlx::query(CREATE_TABLE).execute(pool).await?;
    sqlx::query(&format!("PRAGMA user_version = {}", SCHEMA_VERSION))
        .execute(pool)
        .await?;

    log::debug!("スキーマバージョン {} -> {}", version, SCHEMA_VERSION);
    Ok(())
}

pub async fn table_columns(pool: &SqlitePool, table: &str) -> Result<Vec<String>> {
    let rows = sqlx::query(&format!("PRAGMA table_info({})", table))
        .fetch_all(pool)
        .await?;

    let mut names = Vec::with_capacity(rows.len());
    for row in rows {
        names.push(row.try_get::<String, _>("name")?);
    }
    Ok(names)
}
