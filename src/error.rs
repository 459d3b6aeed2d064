use thiserror::Error;

#[derive(Error, Debug)]
pub enum ToolRecognitionError {
    #[error("入力エラー: {0}")]
    Validation(String),

    #[error("通信エラー: {0}")]
    Transport(String),

    #[error("レスポンスの解析に失敗: {0}")]
    Decode(String),

    #[error("保存エラー: {0}")]
    Storage(String),

    #[error("設定エラー: {0}")]
    Config(String),

    #[error("JSON解析エラー: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IOエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("データベースエラー: {0}")]
    Database(#[from] sqlx::Error),

    #[error("画像エラー: {0}")]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Common(#[from] tool_recognition_common::Error),
}

/// エラーの大分類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Transport,
    Decode,
    Storage,
    Config,
}

impl ToolRecognitionError {
    pub fn kind(&self) -> ErrorKind {
        use tool_recognition_common::Error as CommonError;

        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Decode(_) | Self::JsonParse(_) => ErrorKind::Decode,
            Self::Storage(_) | Self::Io(_) | Self::Database(_) | Self::Image(_) => ErrorKind::Storage,
            Self::Config(_) => ErrorKind::Config,
            Self::Common(inner) => match inner {
                CommonError::Validation(_) => ErrorKind::Validation,
                CommonError::Parse(_) => ErrorKind::Decode,
            },
        }
    }
}

impl From<reqwest::Error> for ToolRecognitionError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, ToolRecognitionError>;
