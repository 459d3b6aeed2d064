//! エラー型定義

use thiserror::Error;

/// 共通エラー型
#[derive(Error, Debug)]
pub enum Error {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Result型エイリアス
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_parse() {
        let error = Error::Parse("レスポンスが不正です".to_string());
        assert_eq!(format!("{}", error), "Parse error: レスポンスが不正です");
    }

    #[test]
    fn test_error_display_validation() {
        let error = Error::Validation("confidence は 0.0〜1.0".to_string());
        assert!(format!("{}", error).starts_with("Validation error"));
    }

    #[test]
    fn test_error_debug() {
        let error = Error::Parse("テスト".to_string());
        let debug = format!("{:?}", error);
        assert!(debug.contains("Parse"));
        assert!(debug.contains("テスト"));
    }
}
