//! 注釈付き画像のURL組み立て
//!
//! サーバーは `results\batch\x.jpg` のような相対パスを返すので、
//! 区切りを `/` に揃え、先頭の `results/` を外して画像ベースURLに連結する。

const RESULTS_PREFIX: &str = "results/";

/// サーバー相対パスを正規化
pub fn normalize_image_path(path: &str) -> String {
    let slashed = path.trim().replace('\\', "/");
    let relative = slashed.trim_start_matches('/');
    relative
        .strip_prefix(RESULTS_PREFIX)
        .unwrap_or(relative)
        .to_string()
}

/// 画像ベースURLと相対パスから取得先URLを作る
///
/// # Examples
/// ```
/// use tool_recognition_common::build_image_url;
///
/// let url = build_image_url("http://localhost:8000/results/", "results\\batch\\a.jpg");
/// assert_eq!(url, "http://localhost:8000/results/batch/a.jpg");
/// ```
pub fn build_image_url(images_base_url: &str, path: &str) -> String {
    let clean = normalize_image_path(path);
    if images_base_url.ends_with('/') {
        format!("{}{}", images_base_url, clean)
    } else {
        format!("{}/{}", images_base_url, clean)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_backslashes_and_prefix() {
        assert_eq!(normalize_image_path("results\\batch_1\\img.jpg"), "batch_1/img.jpg");
        assert_eq!(normalize_image_path("results/img.jpg"), "img.jpg");
        assert_eq!(normalize_image_path("/results/img.jpg"), "img.jpg");
    }

    #[test]
    fn test_normalize_keeps_other_paths() {
        assert_eq!(normalize_image_path("outputs/img.jpg"), "outputs/img.jpg");
        // 途中の results/ は外さない
        assert_eq!(normalize_image_path("a/results/img.jpg"), "a/results/img.jpg");
    }

    #[test]
    fn test_build_image_url_base_without_slash() {
        assert_eq!(
            build_image_url("http://host/results", "results/x.png"),
            "http://host/results/x.png"
        );
    }
}
