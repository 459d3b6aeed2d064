use crate::error::{Result, ToolRecognitionError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tool_recognition_common::{Thresholds, DEFAULT_CONFIDENCE, DEFAULT_IOU};

const API_URL_ENV: &str = "TOOL_RECOGNITION_API_URL";
const IMAGES_URL_ENV: &str = "TOOL_RECOGNITION_IMAGES_URL";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 検出APIのベースURL（末尾 `/` 付き）
    pub api_base_url: String,
    /// 注釈付き画像のベースURL
    pub images_base_url: String,
    pub timeout_seconds: u64,
    /// 注釈付き画像を同時に取得する枚数
    pub download_chunk_size: usize,
    /// 保存先（省略時はOSのデータディレクトリ）
    pub data_dir: Option<PathBuf>,
    pub default_confidence: f32,
    pub default_iou: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000/".into(),
            images_base_url: "http://localhost:8000/results/".into(),
            timeout_seconds: 120,
            download_chunk_size: 3,
            data_dir: None,
            default_confidence: DEFAULT_CONFIDENCE,
            default_iou: DEFAULT_IOU,
        }
    }
}

impl Config {
    /// 設定ファイルを読み、環境変数の上書きを反映した実行時の設定
    pub fn load() -> Result<Self> {
        let mut config = Self::load_file()?;
        config.apply_overrides(std::env::var(API_URL_ENV).ok(), std::env::var(IMAGES_URL_ENV).ok());
        config.validate()?;
        Ok(config)
    }

    /// 設定ファイルの内容だけを読む（環境変数は反映しない）
    ///
    /// 設定を書き換えて保存するときはこちらを使う。
    pub fn load_file() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// なければデフォルト値で作成する
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            return Ok(serde_json::from_str::<Config>(&content)?);
        }

        let config = Self::default();
        if let Err(e) = config.save_to(path) {
            log::warn!("設定ファイルを作成できません {}: {}", path.display(), e);
        }
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        self.validate()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn apply_overrides(&mut self, api_url: Option<String>, images_url: Option<String>) {
        if let Some(url) = api_url {
            self.api_base_url = url;
        }
        if let Some(url) = images_url {
            self.images_base_url = url;
        }
    }

    pub fn config_path() -> Result<PathBuf> {
        let dir = dirs::config_dir()
            .ok_or_else(|| ToolRecognitionError::Config("設定ディレクトリが見つかりません".into()))?;
        Ok(dir.join("tool-recognition").join("config.json"))
    }

    /// 保存データのルート（DBと画像キャッシュ）
    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        dirs::data_dir()
            .map(|d| d.join("tool-recognition"))
            .ok_or_else(|| ToolRecognitionError::Config("データディレクトリが見つかりません".into()))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn default_thresholds(&self) -> Thresholds {
        Thresholds {
            confidence: self.default_confidence,
            iou: self.default_iou,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.download_chunk_size == 0 {
            return Err(ToolRecognitionError::Config(
                "download_chunk_size は1以上にしてください".into(),
            ));
        }
        if self.api_base_url.trim().is_empty() {
            return Err(ToolRecognitionError::Config("api_base_url が空です".into()));
        }
        Thresholds::new(self.default_confidence, self.default_iou)
            .map_err(|e| ToolRecognitionError::Config(e.to_string()))?;
        Ok(())
    }

    pub fn set_api_url(&mut self, url: String) -> Result<()> {
        self.api_base_url = with_trailing_slash(url);
        self.save()
    }

    pub fn set_images_url(&mut self, url: String) -> Result<()> {
        self.images_base_url = with_trailing_slash(url);
        self.save()
    }
}

fn with_trailing_slash(url: String) -> String {
    if url.ends_with('/') {
        url
    } else {
        format!("{}/", url)
    }
}
