//! 注釈付き画像の一括取得
//!
//! 参照リストをチャンクに分け、チャンク内は並行に取得し、
//! チャンク単位で順番に進める。キャンセルはチャンクの境界でのみ確認する。

use crate::client::DetectionApi;
use futures::future::join_all;
use image::DynamicImage;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 同時取得枚数のデフォルト
pub const DEFAULT_CHUNK_SIZE: usize = 3;

/// 協調キャンセル用のフラグ
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// 同じトークン（のクローン）かどうか
    pub fn same_as(&self, other: &CancelToken) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// ダウンロード進捗
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DownloadProgress {
    pub is_downloading: bool,
    pub total_images: usize,
    /// 取得を試みた枚数（成功数ではない）
    pub downloaded_images: usize,
    /// 0.0〜1.0
    pub progress: f32,
}

impl DownloadProgress {
    fn started(total: usize) -> Self {
        Self {
            is_downloading: true,
            total_images: total,
            downloaded_images: 0,
            progress: 0.0,
        }
    }

    fn attempted(attempted: usize, total: usize) -> Self {
        let attempted = attempted.min(total);
        let progress = if total == 0 {
            1.0
        } else {
            (attempted as f32 / total as f32).clamp(0.0, 1.0)
        };
        Self {
            is_downloading: true,
            total_images: total,
            downloaded_images: attempted,
            progress,
        }
    }

    pub fn percent(&self) -> u32 {
        (self.progress * 100.0) as u32
    }
}

/// 取得結果
#[derive(Debug)]
pub enum FetchOutcome {
    /// 全チャンク完了（失敗した画像は含まれない）
    Completed(Vec<DynamicImage>),
    /// 途中でキャンセルされた（取得済みの画像も破棄）
    Cancelled,
}

impl FetchOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchOutcome::Cancelled)
    }

    pub fn into_images(self) -> Vec<DynamicImage> {
        match self {
            FetchOutcome::Completed(images) => images,
            FetchOutcome::Cancelled => Vec::new(),
        }
    }
}

/// URLリストの画像をチャンク単位で取得する
///
/// - チャンク i+1 はチャンク i の取得がすべて終わってから始まる
/// - 取得・デコードに失敗した画像は黙って除外する
/// - 進捗はチャンク完了ごとに `on_progress` へ通知する
pub async fn fetch_images<A, F>(
    api: &A,
    urls: &[String],
    chunk_size: usize,
    cancel: &CancelToken,
    mut on_progress: F,
) -> FetchOutcome
where
    A: DetectionApi,
    F: FnMut(DownloadProgress),
{
    if urls.is_empty() {
        return FetchOutcome::Completed(Vec::new());
    }

    let total = urls.len();
    let chunk_size = chunk_size.max(1);
    on_progress(DownloadProgress::started(total));

    let mut images = Vec::new();
    let mut attempted = 0;

    for (chunk_idx, chunk) in urls.chunks(chunk_size).enumerate() {
        if cancel.is_cancelled() {
            log::info!("画像取得をキャンセル (チャンク {} の前)", chunk_idx + 1);
            return FetchOutcome::Cancelled;
        }

        log::debug!("チャンク {}: {}枚", chunk_idx + 1, chunk.len());
        let results = join_all(chunk.iter().map(|url| fetch_one(api, url))).await;

        // 実行中のチャンクは止められないので、終わった時点で再確認
        if cancel.is_cancelled() {
            log::info!("画像取得をキャンセル (チャンク {} の後)", chunk_idx + 1);
            return FetchOutcome::Cancelled;
        }

        images.extend(results.into_iter().flatten());
        attempted += chunk.len();
        on_progress(DownloadProgress::attempted(attempted, total));
    }

    log::info!("画像取得完了: {}/{}枚", images.len(), total);
    FetchOutcome::Completed(images)
}

async fn fetch_one<A: DetectionApi>(api: &A, url: &str) -> Option<DynamicImage> {
    let bytes = match api.fetch_image(url).await {
        Ok(bytes) => bytes,
        Err(e) => {
            log::warn!("画像取得失敗 {}: {}", url, e);
            return None;
        }
    };

    match image::load_from_memory(&bytes) {
        Ok(img) => Some(img),
        Err(e) => {
            log::warn!("画像デコード失敗 {}: {}", url, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
        assert!(token.same_as(&clone));
        assert!(!token.same_as(&CancelToken::new()));
    }

    #[test]
    fn test_progress_clamped() {
        let p = DownloadProgress::attempted(9, 7);
        assert_eq!(p.downloaded_images, 7);
        assert_eq!(p.progress, 1.0);
        assert_eq!(p.percent(), 100);

        let p = DownloadProgress::attempted(3, 7);
        assert!((p.progress - 3.0 / 7.0).abs() < f32::EPSILON);
        assert_eq!(p.percent(), 42);
    }

    #[test]
    fn test_progress_default_is_idle() {
        let p = DownloadProgress::default();
        assert!(!p.is_downloading);
        assert_eq!(p.progress, 0.0);
    }

    #[test]
    fn test_cancelled_outcome_is_empty() {
        assert!(FetchOutcome::Cancelled.into_images().is_empty());
    }
}
