//! 検出サーバーのレスポンスパーサー
//!
//! JSON本文を型付きの解析結果に変換する

use crate::error::{Error, Result};
use crate::types::{BatchOutcome, SingleAnalysisOutcome};

/// 単一画像解析レスポンスをパース
///
/// # Arguments
/// * `body` - レスポンス本文（JSON）
///
/// # Returns
/// * `Ok(SingleAnalysisOutcome)` - パース成功
/// * `Err(Error::Parse)` - 期待する形でない場合
pub fn parse_single_response(body: &str) -> Result<SingleAnalysisOutcome> {
    serde_json::from_str(body.trim())
        .map_err(|e| Error::Parse(format!("単一解析レスポンスのパースエラー: {}", e)))
}

/// 一括解析レスポンスをパース
pub fn parse_batch_response(body: &str) -> Result<BatchOutcome> {
    serde_json::from_str(body.trim())
        .map_err(|e| Error::Parse(format!("一括解析レスポンスのパースエラー: {}", e)))
}
