//! 解析セッション
//!
//! 入力選択 → 解析 → 保存 の流れを1つの状態レコードで管理する。
//! 状態は `watch` で値ごと置き換え、各コンポーネントの失敗は
//! すべてここで表示用メッセージに変換する。

mod state;

pub use state::{describe_snapshot, CurrentResult, SelectedInput, SessionState};

use crate::client::DetectionApi;
use crate::error::{Result, ToolRecognitionError};
use crate::fetcher::{self, CancelToken, DownloadProgress, FetchOutcome, DEFAULT_CHUNK_SIZE};
use crate::store::{ResultStore, SavedSnapshot};
use image::DynamicImage;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::watch;
use tool_recognition_common::{BatchOutcome, SingleAnalysisOutcome, Thresholds};

pub struct Session<A: DetectionApi> {
    api: A,
    store: ResultStore,
    chunk_size: usize,
    state: watch::Sender<SessionState>,
    progress: watch::Sender<DownloadProgress>,
    current_save: Mutex<Option<CancelToken>>,
}

impl<A: DetectionApi> Session<A> {
    pub fn new(api: A, store: ResultStore, thresholds: Thresholds) -> Self {
        let (state, _) = watch::channel(SessionState::with_thresholds(thresholds));
        let (progress, _) = watch::channel(DownloadProgress::default());
        Self {
            api,
            store,
            chunk_size: DEFAULT_CHUNK_SIZE,
            state,
            progress,
            current_save: Mutex::new(None),
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    /// 現在の状態のコピー
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn progress(&self) -> DownloadProgress {
        *self.progress.borrow()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<DownloadProgress> {
        self.progress.subscribe()
    }

    // =============================================
    // 入力・パラメータ
    // =============================================

    pub fn update_thresholds(&self, confidence: f32, iou: f32) {
        match Thresholds::new(confidence, iou) {
            Ok(thresholds) => self.state.send_modify(|s| s.thresholds = thresholds),
            Err(e) => self.set_error(&ToolRecognitionError::from(e)),
        }
    }

    pub fn select_input(&self, input: Option<SelectedInput>) {
        self.state.send_modify(|s| s.selected = input);
    }

    // =============================================
    // 解析
    // =============================================

    /// 選択中の入力を解析する
    ///
    /// 解析中に呼ばれた場合は何もしない。
    pub async fn analyze(&self) {
        let selected = self.state.borrow().selected.clone();
        let Some(input) = selected else {
            self.set_error(&ToolRecognitionError::Validation("画像が選択されていません".into()));
            return;
        };

        if !self.begin_loading() {
            log::debug!("解析中のため要求を無視");
            return;
        }

        let thresholds = self.state.borrow().thresholds;
        log::info!(
            "解析開始: {} (confidence={}, iou={})",
            input.file_name(),
            thresholds.confidence,
            thresholds.iou
        );

        let result = match &input {
            SelectedInput::Image { file_name, bytes } => self
                .api
                .analyze_single(bytes, file_name, thresholds)
                .await
                .map(CurrentResult::Single),
            SelectedInput::Archive { file_name, bytes } => self
                .api
                .analyze_batch(bytes, file_name, thresholds)
                .await
                .map(CurrentResult::Batch),
        };

        match result {
            Ok(result) => self.state.send_modify(|s| {
                s.is_loading = false;
                s.result = Some(result);
            }),
            Err(e) => {
                log::warn!("解析失敗: {}", e);
                self.state.send_modify(|s| {
                    s.is_loading = false;
                    s.error = Some(e.to_string());
                });
            }
        }
    }

    /// ZIPを選択してそのまま一括解析する
    pub async fn analyze_batch(&self, file_name: &str, archive: &[u8]) {
        self.select_input(Some(SelectedInput::archive(file_name, archive)));
        self.analyze().await;
    }

    fn begin_loading(&self) -> bool {
        self.state.send_if_modified(|s| {
            if s.is_loading {
                return false;
            }
            s.is_loading = true;
            s.error = None;
            true
        })
    }

    // =============================================
    // 保存
    // =============================================

    /// 現在の結果を名前を付けて保存する
    ///
    /// 成功時は新しいIDを返す。キャンセル・失敗時は `None`
    /// （失敗内容は状態の `error` に入る）。
    pub async fn save_current(&self, name: &str, description: Option<&str>) -> Option<i64> {
        let name = name.trim();
        if name.is_empty() {
            self.set_error(&ToolRecognitionError::Validation("名前を入力してください".into()));
            return None;
        }
        let current = self.state.borrow().result.clone();
        let Some(current) = current else {
            self.set_error(&ToolRecognitionError::Validation("保存する結果がありません".into()));
            return None;
        };

        let token = self.start_save();
        self.state.send_modify(|s| {
            s.is_saving = true;
            s.error = None;
            s.saved_message = None;
        });

        let saved = match &current {
            CurrentResult::Single(outcome) => self.save_single(name, description, outcome, &token).await,
            CurrentResult::Batch(outcome) => self.save_batch(name, description, outcome, &token).await,
        };

        // 別の保存に置き換えられた・キャンセルされた場合は状態に触らない
        if !self.finish_save(&token) {
            if let Ok(Some(id)) = saved {
                log::info!("置き換え前の保存が完了していました: id={}", id);
            }
            return None;
        }

        self.progress.send_replace(DownloadProgress::default());
        match saved {
            Ok(Some(id)) => {
                self.state.send_modify(|s| {
                    s.is_saving = false;
                    s.saved_message = Some(format!("保存しました (id={})", id));
                    s.last_saved_id = Some(id);
                });
                Some(id)
            }
            Ok(None) => {
                self.state.send_modify(|s| s.is_saving = false);
                None
            }
            Err(e) => {
                log::warn!("保存失敗: {}", e);
                self.state.send_modify(|s| {
                    s.is_saving = false;
                    s.error = Some(format!("保存に失敗しました: {}", e));
                });
                None
            }
        }
    }

    async fn save_single(
        &self,
        name: &str,
        description: Option<&str>,
        outcome: &SingleAnalysisOutcome,
        token: &CancelToken,
    ) -> Result<Option<i64>> {
        let image = self.single_image(outcome).await;
        if token.is_cancelled() {
            return Ok(None);
        }
        let id = self.store.save_single(name, description, outcome, image.as_ref()).await?;
        Ok(Some(id))
    }

    async fn save_batch(
        &self,
        name: &str,
        description: Option<&str>,
        outcome: &BatchOutcome,
        token: &CancelToken,
    ) -> Result<Option<i64>> {
        let urls: Vec<String> = outcome
            .annotated_image_paths()
            .into_iter()
            .map(|p| self.api.image_url(p))
            .collect();

        let fetched = fetcher::fetch_images(&self.api, &urls, self.chunk_size, token, |p| {
            self.progress.send_replace(p);
        })
        .await;

        let images = match fetched {
            FetchOutcome::Completed(images) => images,
            FetchOutcome::Cancelled => return Ok(None),
        };
        let id = self.store.save_batch(name, description, outcome, &images).await?;
        Ok(Some(id))
    }

    /// 単一結果に添える画像
    ///
    /// サーバーの注釈付き画像を優先し、取れなければ選択中の入力画像を使う。
    async fn single_image(&self, outcome: &SingleAnalysisOutcome) -> Option<DynamicImage> {
        if let Some(path) = outcome.annotated_image_path() {
            let url = self.api.image_url(path);
            match self.api.fetch_image(&url).await {
                Ok(bytes) => match image::load_from_memory(&bytes) {
                    Ok(img) => return Some(img),
                    Err(e) => log::warn!("注釈付き画像のデコード失敗 {}: {}", url, e),
                },
                Err(e) => log::warn!("注釈付き画像の取得失敗 {}: {}", url, e),
            }
        }

        let selected = self.state.borrow().selected.clone();
        match selected {
            Some(SelectedInput::Image { bytes, file_name }) => match image::load_from_memory(&bytes) {
                Ok(img) => Some(img),
                Err(e) => {
                    log::warn!("入力画像のデコード失敗 {}: {}", file_name, e);
                    None
                }
            },
            _ => None,
        }
    }

    fn lock_current_save(&self) -> MutexGuard<'_, Option<CancelToken>> {
        self.current_save.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 新しい保存を登録し、進行中の保存があればキャンセルする
    fn start_save(&self) -> CancelToken {
        let token = CancelToken::new();
        if let Some(previous) = self.lock_current_save().replace(token.clone()) {
            log::info!("進行中の保存をキャンセルします");
            previous.cancel();
        }
        token
    }

    /// 自分がまだ現在の保存なら登録を外して `true`
    fn finish_save(&self, token: &CancelToken) -> bool {
        let mut current = self.lock_current_save();
        if !current.as_ref().is_some_and(|t| t.same_as(token)) {
            return false;
        }
        *current = None;
        !token.is_cancelled()
    }

    /// 進行中の画像取得をキャンセルする
    ///
    /// 実行中のチャンクは最後まで走り、次のチャンクから止まる。
    pub fn cancel_download(&self) {
        if let Some(token) = self.lock_current_save().take() {
            token.cancel();
        }
        self.progress.send_replace(DownloadProgress::default());
        self.state.send_modify(|s| s.is_saving = false);
    }

    // =============================================
    // 状態リセット
    // =============================================

    pub fn clear_error(&self) {
        self.state.send_modify(|s| s.error = None);
    }

    pub fn clear_results(&self) {
        self.state.send_modify(|s| {
            s.result = None;
            s.selected = None;
        });
    }

    pub fn reset(&self) {
        self.state.send_modify(|s| {
            s.selected = None;
            s.result = None;
            s.error = None;
            s.saved_message = None;
            s.last_saved_id = None;
        });
        self.progress.send_replace(DownloadProgress::default());
    }

    fn set_error(&self, e: &ToolRecognitionError) {
        self.state.send_modify(|s| s.error = Some(e.to_string()));
    }

    // =============================================
    // 保存済み結果
    // =============================================

    pub fn saved_results(&self) -> watch::Receiver<Vec<SavedSnapshot>> {
        self.store.subscribe()
    }

    pub async fn get_saved(&self, id: i64) -> Option<SavedSnapshot> {
        match self.store.get_by_id(id).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.set_error(&e);
                None
            }
        }
    }

    pub async fn delete_saved(&self, snapshot: &SavedSnapshot) -> bool {
        match self.store.delete(snapshot).await {
            Ok(()) => true,
            Err(e) => {
                self.set_error(&e);
                false
            }
        }
    }
}
