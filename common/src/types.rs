//! 解析結果の型定義
//!
//! 検出サーバーのJSONレスポンスと保存データで共有される型:
//! - DetectionItem: 検出された工具1件
//! - AnalysisResult: 画像1枚の解析結果
//! - SingleAnalysisOutcome: 単一画像解析のレスポンス
//! - BatchOutcome: ZIP一括解析のレスポンス

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// 信頼度しきい値のデフォルト
pub const DEFAULT_CONFIDENCE: f32 = 0.5;
/// IoUしきい値のデフォルト
pub const DEFAULT_IOU: f32 = 0.45;
/// 期待される工具数のデフォルト
pub const DEFAULT_EXPECTED_COUNT: u32 = 11;

/// 検出しきい値（信頼度 / IoU）
///
/// どちらも `[0, 1]` の範囲。リクエストにはそのまま渡される。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub confidence: f32,
    pub iou: f32,
}

impl Thresholds {
    /// 範囲チェック付きで生成
    ///
    /// # Examples
    /// ```
    /// use tool_recognition_common::Thresholds;
    ///
    /// assert!(Thresholds::new(0.25, 0.7).is_ok());
    /// assert!(Thresholds::new(1.5, 0.7).is_err());
    /// ```
    pub fn new(confidence: f32, iou: f32) -> Result<Self> {
        check_unit_range("confidence", confidence)?;
        check_unit_range("iou", iou)?;
        Ok(Self { confidence, iou })
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            confidence: DEFAULT_CONFIDENCE,
            iou: DEFAULT_IOU,
        }
    }
}

fn check_unit_range(name: &str, value: f32) -> Result<()> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "{} は 0.0〜1.0 の範囲で指定してください: {}",
            name, value
        )))
    }
}

/// 解析ステータス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionStatus {
    Complete,
    Missing,
    Extra,
    Mixed,
    Duplicates,
    DuplicatesOnly,
    MissingDuplicates,
    Error,
}

impl DetectionStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, DetectionStatus::Complete)
    }

    /// 表示用ラベル
    pub fn label(&self) -> &'static str {
        match self {
            DetectionStatus::Complete => "完全",
            DetectionStatus::Missing => "不足あり",
            DetectionStatus::Extra => "余分あり",
            DetectionStatus::Mixed => "不足・余分あり",
            DetectionStatus::Duplicates => "重複あり",
            DetectionStatus::DuplicatesOnly => "重複のみ",
            DetectionStatus::MissingDuplicates => "不足・重複あり",
            DetectionStatus::Error => "エラー",
        }
    }
}

/// 検出された物体1件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionItem {
    pub class_id: i32,
    pub class_name: String,
    pub confidence: f32,
    /// バウンディングボックス（サーバー定義の4値）
    pub bbox: [f32; 4],
}

/// 画像1枚の解析結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub status: DetectionStatus,
    pub total_detections: u32,

    #[serde(default = "default_expected_count")]
    pub expected_count: u32,

    #[serde(default)]
    pub missing_tools: Vec<String>,

    #[serde(default)]
    pub extra_tools: Vec<String>,

    #[serde(default)]
    pub detected_tools: Vec<String>,

    pub detections: Vec<DetectionItem>,
    pub message: String,
}

fn default_expected_count() -> u32 {
    DEFAULT_EXPECTED_COUNT
}

impl AnalysisResult {
    /// サーバーが返した値の整合性をチェック
    ///
    /// 違反内容を文字列で返す（空なら問題なし）。呼び出し側でログに出す用途。
    pub fn check_invariants(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.total_detections as usize != self.detections.len() {
            problems.push(format!(
                "total_detections={} だが detections は {}件",
                self.total_detections,
                self.detections.len()
            ));
        }

        for (field, list) in [("missing_tools", &self.missing_tools), ("extra_tools", &self.extra_tools)] {
            let mut seen = HashSet::new();
            for name in list {
                if !seen.insert(name.as_str()) {
                    problems.push(format!("{} に重複: {}", field, name));
                }
            }
        }

        problems
    }
}

/// サーバー側で有効だった設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub confidence_threshold: f32,
    pub iou_threshold: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotated_image_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_directory: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_annotated_images: Option<u32>,
}

impl AnalysisConfig {
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            confidence: self.confidence_threshold,
            iou: self.iou_threshold,
        }
    }
}

/// 単一画像解析のレスポンス
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleAnalysisOutcome {
    pub status: String,
    pub analysis_result: AnalysisResult,
    pub config: AnalysisConfig,
}

impl SingleAnalysisOutcome {
    /// 注釈付き画像のサーバー側パス（空文字は無しとみなす）
    pub fn annotated_image_path(&self) -> Option<&str> {
        self.config
            .annotated_image_path
            .as_deref()
            .filter(|p| !p.trim().is_empty())
    }
}

/// 一括解析内の画像1枚分
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAnalysisResult {
    pub filename: String,
    pub analysis_result: AnalysisResult,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotated_image_path: Option<String>,
}

/// ZIP一括解析のレスポンス
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub status: String,
    pub total_images: u32,
    pub processed_images: u32,
    pub results: Vec<ImageAnalysisResult>,
    /// 処理時間（秒）
    pub processing_time: f32,
    /// ステータス → 件数
    #[serde(default)]
    pub summary: BTreeMap<String, u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<AnalysisConfig>,
}

impl BatchOutcome {
    /// 注釈付き画像の参照を結果順に列挙
    pub fn annotated_image_paths(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter_map(|r| r.annotated_image_path.as_deref())
            .filter(|p| !p.trim().is_empty())
            .collect()
    }

    /// 件数の整合性チェック（サーバー値のため診断用）
    pub fn check_invariants(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.processed_images > self.total_images {
            problems.push(format!(
                "processed_images={} が total_images={} を超えています",
                self.processed_images, self.total_images
            ));
        }
        if self.results.len() != self.processed_images as usize {
            problems.push(format!(
                "processed_images={} だが results は {}件",
                self.processed_images,
                self.results.len()
            ));
        }
        problems
    }
}
