//! 検出サーバーとの通信
//!
//! - `DetectionApi`: セッション・画像取得が依存する境界（テストでは差し替える）
//! - `DetectionClient`: reqwest による実装

mod http;

pub use http::DetectionClient;

use crate::error::Result;
use std::future::Future;
use tool_recognition_common::{BatchOutcome, SingleAnalysisOutcome, Thresholds};

pub trait DetectionApi: Send + Sync {
    /// 画像1枚を解析
    fn analyze_single(
        &self,
        image: &[u8],
        file_name: &str,
        thresholds: Thresholds,
    ) -> impl Future<Output = Result<SingleAnalysisOutcome>> + Send;

    /// ZIPアーカイブを一括解析
    fn analyze_batch(
        &self,
        archive: &[u8],
        file_name: &str,
        thresholds: Thresholds,
    ) -> impl Future<Output = Result<BatchOutcome>> + Send;

    /// 画像を取得（`image_url` で組み立てたURLを渡す）
    fn fetch_image(&self, url: &str) -> impl Future<Output = Result<Vec<u8>>> + Send;

    /// サーバー相対パスから取得先URLを作る
    fn image_url(&self, path: &str) -> String;
}
