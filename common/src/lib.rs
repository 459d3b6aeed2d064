//! Tool Recognition Common Library
//!
//! 検出クライアントと保存層で共有される型とユーティリティ

pub mod types;
pub mod error;
pub mod parser;
pub mod image_url;

pub use types::{
    AnalysisConfig, AnalysisResult, BatchOutcome, DetectionItem, DetectionStatus,
    ImageAnalysisResult, SingleAnalysisOutcome, Thresholds,
    DEFAULT_CONFIDENCE, DEFAULT_EXPECTED_COUNT, DEFAULT_IOU,
};
pub use error::{Error, Result};
pub use parser::{parse_batch_response, parse_single_response};
pub use image_url::{build_image_url, normalize_image_path};
