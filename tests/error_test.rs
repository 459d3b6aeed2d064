//! エラーケーステスト
//!
//! エラーの分類・表示・変換を検証

use tempfile::tempdir;
use tool_recognition::error::{ErrorKind, ToolRecognitionError};
use tool_recognition::store::ResultStore;

/// ToolRecognitionErrorのDisplay実装確認
#[test]
fn test_error_display() {
    let errors = vec![
        ToolRecognitionError::Validation("名前が空です".to_string()),
        ToolRecognitionError::Transport("500 Internal Server Error".to_string()),
        ToolRecognitionError::Decode("missing field".to_string()),
        ToolRecognitionError::Storage("disk full".to_string()),
        ToolRecognitionError::Config("URLが空です".to_string()),
    ];

    for err in errors {
        let display = format!("{}", err);
        assert!(!display.is_empty(), "エラーメッセージが空: {:?}", err);
    }
}

/// 大分類
#[test]
fn test_error_kinds() {
    assert_eq!(ToolRecognitionError::Validation(String::new()).kind(), ErrorKind::Validation);
    assert_eq!(ToolRecognitionError::Transport(String::new()).kind(), ErrorKind::Transport);
    assert_eq!(ToolRecognitionError::Decode(String::new()).kind(), ErrorKind::Decode);
    assert_eq!(ToolRecognitionError::Storage(String::new()).kind(), ErrorKind::Storage);
    assert_eq!(ToolRecognitionError::Config(String::new()).kind(), ErrorKind::Config);
}

/// IOエラーは保存エラーに分類される
#[test]
fn test_io_error_conversion() {
    let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
    let err: ToolRecognitionError = io_err.into();

    assert!(matches!(err, ToolRecognitionError::Io(_)));
    assert_eq!(err.kind(), ErrorKind::Storage);
    assert!(format!("{}", err).contains("IO"));
}

/// JSONエラーはデコードエラーに分類される
#[test]
fn test_json_error_conversion() {
    let json_err = serde_json::from_str::<serde_json::Value>("{ invalid }").unwrap_err();
    let err: ToolRecognitionError = json_err.into();

    assert!(matches!(err, ToolRecognitionError::JsonParse(_)));
    assert_eq!(err.kind(), ErrorKind::Decode);
}

/// common::Errorからの変換は中身で分類する
#[test]
fn test_common_error_conversion() {
    let err: ToolRecognitionError = tool_recognition_common::Error::Parse("パースエラー".to_string()).into();
    assert!(matches!(err, ToolRecognitionError::Common(_)));
    assert_eq!(err.kind(), ErrorKind::Decode);

    let err: ToolRecognitionError = tool_recognition_common::Error::Validation("範囲外".to_string()).into();
    assert_eq!(err.kind(), ErrorKind::Validation);

    // 透過的エラーなのでメッセージがそのまま表示される
    assert!(err.to_string().contains("範囲外"));
}

/// 画像デコードエラーからの変換
#[test]
fn test_image_error_conversion() {
    let image_err = image::load_from_memory(b"not an image").unwrap_err();
    let err: ToolRecognitionError = image_err.into();

    assert!(matches!(err, ToolRecognitionError::Image(_)));
}

/// 保存先がファイルだと開けない
#[tokio::test]
async fn test_store_open_on_file_fails() {
    let dir = tempdir().expect("Failed to create temp dir");
    let file = dir.path().join("not_a_dir");
    std::fs::write(&file, "x").unwrap();

    let result = ResultStore::open(&file).await;

    let err = result.err().expect("open should fail");
    assert_eq!(err.kind(), ErrorKind::Storage);
}
