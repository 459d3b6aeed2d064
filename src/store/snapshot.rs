//! 保存済み解析結果の型
//!
//! 行レベルでは単一/一括の2列だが、読み出し時に `SnapshotPayload` に畳んで
//! 「どちらか一方だけ」を型で保証する。

use crate::error::{Result, ToolRecognitionError};
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use tool_recognition_common::{BatchOutcome, SingleAnalysisOutcome};

/// 一括画像パスの区切り文字
pub const PATH_SEPARATOR: &str = ";;";

/// 保存された解析結果
#[derive(Debug, Clone, PartialEq)]
pub struct SavedSnapshot {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    /// 作成日時（epochミリ秒）
    pub timestamp: i64,
    pub payload: SnapshotPayload,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotPayload {
    Single {
        outcome: SingleAnalysisOutcome,
        image_path: Option<PathBuf>,
    },
    Batch {
        outcome: BatchOutcome,
        /// 取得に失敗した画像の分だけ結果数より少ないことがある
        image_paths: Vec<PathBuf>,
    },
}

impl SavedSnapshot {
    pub fn is_batch(&self) -> bool {
        matches!(self.payload, SnapshotPayload::Batch { .. })
    }

    pub fn single_image_path(&self) -> Option<&Path> {
        match &self.payload {
            SnapshotPayload::Single { image_path, .. } => image_path.as_deref(),
            SnapshotPayload::Batch { .. } => None,
        }
    }

    pub fn batch_image_paths(&self) -> Option<&[PathBuf]> {
        match &self.payload {
            SnapshotPayload::Single { .. } => None,
            SnapshotPayload::Batch { image_paths, .. } => Some(image_paths),
        }
    }

    /// 参照しているローカル画像をすべて列挙
    pub fn image_paths(&self) -> Vec<&Path> {
        match &self.payload {
            SnapshotPayload::Single { image_path, .. } => image_path.iter().map(PathBuf::as_path).collect(),
            SnapshotPayload::Batch { image_paths, .. } => image_paths.iter().map(PathBuf::as_path).collect(),
        }
    }

    pub fn created_at(&self) -> Option<DateTime<Local>> {
        DateTime::from_timestamp_millis(self.timestamp).map(|d| d.with_timezone(&Local))
    }
}

/// `saved_analysis` の1行
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SavedAnalysisRow {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub timestamp: i64,
    pub single_analysis_json: Option<String>,
    pub batch_analysis_json: Option<String>,
    pub local_annotated_image_path: Option<String>,
    pub local_annotated_images_batch: Option<String>,
}

impl TryFrom<SavedAnalysisRow> for SavedSnapshot {
    type Error = ToolRecognitionError;

    fn try_from(row: SavedAnalysisRow) -> Result<Self> {
        let payload = match (row.single_analysis_json, row.batch_analysis_json) {
            (Some(json), None) => SnapshotPayload::Single {
                outcome: decode_payload(row.id, &json)?,
                image_path: row.local_annotated_image_path.map(PathBuf::from),
            },
            (None, Some(json)) => SnapshotPayload::Batch {
                outcome: decode_payload(row.id, &json)?,
                image_paths: split_paths(row.local_annotated_images_batch.as_deref()),
            },
            _ => {
                return Err(ToolRecognitionError::Storage(format!(
                    "id={} は単一/一括のどちらか一方の結果を持つ必要があります",
                    row.id
                )))
            }
        };

        Ok(SavedSnapshot {
            id: row.id,
            name: row.name,
            description: row.description,
            timestamp: row.timestamp,
            payload,
        })
    }
}

fn decode_payload<T: serde::de::DeserializeOwned>(id: i64, json: &str) -> Result<T> {
    serde_json::from_str(json)
        .map_err(|e| ToolRecognitionError::Storage(format!("id={} の結果JSONが壊れています: {}", id, e)))
}

pub fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join(PATH_SEPARATOR)
}

pub fn split_paths(data: Option<&str>) -> Vec<PathBuf> {
    data.map(|s| {
        s.split(PATH_SEPARATOR)
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .collect()
    })
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> SavedAnalysisRow {
        SavedAnalysisRow {
            id: 1,
            name: "Kit A".into(),
            description: None,
            timestamp: 1_700_000_000_000,
            single_analysis_json: None,
            batch_analysis_json: None,
            local_annotated_image_path: None,
            local_annotated_images_batch: None,
        }
    }

    #[test]
    fn test_split_paths_drops_blank() {
        let paths = split_paths(Some("/a/1.png;;;;/a/2.png;; "));
        assert_eq!(paths, vec![PathBuf::from("/a/1.png"), PathBuf::from("/a/2.png")]);
        assert!(split_paths(None).is_empty());
    }

    #[test]
    fn test_join_split_paths() {
        let paths = vec![PathBuf::from("/x/a.png"), PathBuf::from("/x/b.png")];
        assert_eq!(split_paths(Some(&join_paths(&paths))), paths);
    }

    #[test]
    fn test_row_without_payload_rejected() {
        let err = SavedSnapshot::try_from(row()).unwrap_err();
        assert!(matches!(err, ToolRecognitionError::Storage(_)));
    }

    #[test]
    fn test_row_with_both_payloads_rejected() {
        let row = SavedAnalysisRow {
            single_analysis_json: Some("{}".into()),
            batch_analysis_json: Some("{}".into()),
            ..row()
        };
        assert!(SavedSnapshot::try_from(row).is_err());
    }

    #[test]
    fn test_row_with_corrupt_json_rejected() {
        let row = SavedAnalysisRow {
            batch_analysis_json: Some("{ broken".into()),
            ..row()
        };
        let err = SavedSnapshot::try_from(row).unwrap_err();
        assert!(err.to_string().contains("id=1"));
    }
}
