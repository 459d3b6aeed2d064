use crate::store::SavedSnapshot;
use std::sync::Arc;
use tool_recognition_common::{BatchOutcome, SingleAnalysisOutcome, Thresholds};

/// 解析対象として選ばれた入力
#[derive(Debug, Clone, PartialEq)]
pub enum SelectedInput {
    /// 画像1枚
    Image { file_name: String, bytes: Arc<[u8]> },
    /// 画像をまとめたZIP
    Archive { file_name: String, bytes: Arc<[u8]> },
}

impl SelectedInput {
    pub fn image(file_name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        SelectedInput::Image {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn archive(file_name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        SelectedInput::Archive {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn file_name(&self) -> &str {
        match self {
            SelectedInput::Image { file_name, .. } | SelectedInput::Archive { file_name, .. } => file_name,
        }
    }
}

/// 直近の解析結果
#[derive(Debug, Clone, PartialEq)]
pub enum CurrentResult {
    Single(SingleAnalysisOutcome),
    Batch(BatchOutcome),
}

/// セッションの状態
///
/// 更新は常に値ごと置き換える（`watch` 経由）。
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionState {
    pub thresholds: Thresholds,
    pub selected: Option<SelectedInput>,
    pub is_loading: bool,
    pub is_saving: bool,
    /// 表示用のエラーメッセージ
    pub error: Option<String>,
    pub result: Option<CurrentResult>,
    pub saved_message: Option<String>,
    pub last_saved_id: Option<i64>,
}

impl SessionState {
    pub fn with_thresholds(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            ..Self::default()
        }
    }

    /// 入力待ち（解析中・保存中でない）か
    pub fn is_idle(&self) -> bool {
        !self.is_loading && !self.is_saving
    }
}

/// 保存済み一覧の表示用に名前と件数をまとめる
pub fn describe_snapshot(snapshot: &SavedSnapshot) -> String {
    let kind = if snapshot.is_batch() { "一括" } else { "単一" };
    let created = snapshot
        .created_at()
        .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default();
    format!("#{} {} [{}] {} (画像{}枚)", snapshot.id, snapshot.name, kind, created, snapshot.image_paths().len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_idle() {
        let state = SessionState::default();
        assert!(state.is_idle());
        assert_eq!(state.thresholds, Thresholds::default());
        assert!(state.result.is_none());
    }

    #[test]
    fn test_selected_input_file_name() {
        let input = SelectedInput::archive("kits.zip", vec![1u8, 2, 3]);
        assert_eq!(input.file_name(), "kits.zip");
        assert!(matches!(input, SelectedInput::Archive { .. }));
    }
}
