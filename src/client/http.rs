use super::DetectionApi;
use crate::config::Config;
use crate::error::{Result, ToolRecognitionError};
use reqwest::multipart::{Form, Part};
use reqwest::Response;
use tool_recognition_common::{
    build_image_url, parse_batch_response, parse_single_response, BatchOutcome,
    SingleAnalysisOutcome, Thresholds,
};

const ANALYZE_PATH: &str = "tools/analyze";
const ANALYZE_BATCH_PATH: &str = "tools/analyze-batch";
const FILE_PART: &str = "file";
const ERROR_PREVIEW_CHARS: usize = 200;

/// 検出APIクライアント
///
/// リトライはしない。失敗はそのまま呼び出し側に返す。
#[derive(Debug, Clone)]
pub struct DetectionClient {
    http: reqwest::Client,
    api_base_url: String,
    images_base_url: String,
}

impl DetectionClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ToolRecognitionError::Config(format!("HTTPクライアント初期化エラー: {}", e)))?;

        Ok(Self {
            http,
            api_base_url: config.api_base_url.clone(),
            images_base_url: config.images_base_url.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        if self.api_base_url.ends_with('/') {
            format!("{}{}", self.api_base_url, path)
        } else {
            format!("{}/{}", self.api_base_url, path)
        }
    }

    async fn post_file(
        &self,
        path: &str,
        bytes: &[u8],
        file_name: &str,
        mime: &str,
        thresholds: Thresholds,
    ) -> Result<String> {
        let url = self.endpoint(path);
        log::debug!(
            "POST {} ({} bytes, confidence={}, iou={})",
            url,
            bytes.len(),
            thresholds.confidence,
            thresholds.iou
        );

        let part = Part::bytes(bytes.to_vec())
            .file_name(file_name.to_string())
            .mime_str(mime)?;
        let form = Form::new().part(FILE_PART, part);

        let response = self
            .http
            .post(&url)
            .query(&[("confidence", thresholds.confidence), ("iou", thresholds.iou)])
            .multipart(form)
            .send()
            .await?;

        let response = ensure_success(response).await?;
        let body = response.text().await?;
        log::debug!("レスポンス: {} chars", body.len());
        Ok(body)
    }
}

impl DetectionApi for DetectionClient {
    async fn analyze_single(
        &self,
        image: &[u8],
        file_name: &str,
        thresholds: Thresholds,
    ) -> Result<SingleAnalysisOutcome> {
        let body = self
            .post_file(ANALYZE_PATH, image, file_name, image_mime(file_name), thresholds)
            .await?;
        let outcome = parse_single_response(&body).map_err(|e| ToolRecognitionError::Decode(e.to_string()))?;

        for problem in outcome.analysis_result.check_invariants() {
            log::warn!("解析結果の不整合: {}", problem);
        }
        Ok(outcome)
    }

    async fn analyze_batch(
        &self,
        archive: &[u8],
        file_name: &str,
        thresholds: Thresholds,
    ) -> Result<BatchOutcome> {
        let body = self
            .post_file(ANALYZE_BATCH_PATH, archive, file_name, "application/zip", thresholds)
            .await?;
        let outcome = parse_batch_response(&body).map_err(|e| ToolRecognitionError::Decode(e.to_string()))?;

        for problem in outcome.check_invariants() {
            log::warn!("一括解析結果の不整合: {}", problem);
        }
        Ok(outcome)
    }

    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>> {
        log::debug!("GET {}", url);
        let response = self.http.get(url).send().await?;
        let response = ensure_success(response).await?;
        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }

    fn image_url(&self, path: &str) -> String {
        build_image_url(&self.images_base_url, path)
    }
}

/// 2xx以外は本文の先頭を添えて通信エラーにする
async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().to_string();
    let text = response.text().await.unwrap_or_default();
    let preview: String = text.chars().take(ERROR_PREVIEW_CHARS).collect();
    Err(ToolRecognitionError::Transport(format!(
        "{} {} ({}): {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or(""),
        url,
        preview
    )))
}

fn image_mime(file_name: &str) -> &'static str {
    let lower = file_name.to_lowercase();
    if lower.ends_with(".png") {
        "image/png"
    } else {
        "image/jpeg"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_with(api: &str, images: &str) -> DetectionClient {
        let config = Config {
            api_base_url: api.into(),
            images_base_url: images.into(),
            ..Config::default()
        };
        DetectionClient::new(&config).unwrap()
    }

    #[test]
    fn test_endpoint_join() {
        let client = client_with("http://host:8000/", "http://host:8000/results/");
        assert_eq!(client.endpoint(ANALYZE_PATH), "http://host:8000/tools/analyze");

        let client = client_with("http://host:8000/api", "http://host:8000/results/");
        assert_eq!(client.endpoint(ANALYZE_BATCH_PATH), "http://host:8000/api/tools/analyze-batch");
    }

    #[test]
    fn test_image_url() {
        let client = client_with("http://host/", "http://host/results/");
        assert_eq!(client.image_url("results\\b1\\x.jpg"), "http://host/results/b1/x.jpg");
    }

    #[test]
    fn test_image_mime() {
        assert_eq!(image_mime("photo.PNG"), "image/png");
        assert_eq!(image_mime("photo.jpg"), "image/jpeg");
        assert_eq!(image_mime("image"), "image/jpeg");
    }
}
