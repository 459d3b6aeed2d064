//! テスト共通: 偽の検出APIとサンプルデータ

#![allow(dead_code)]

use image::{DynamicImage, ImageFormat, RgbImage};
use std::collections::{BTreeMap, HashMap};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tool_recognition::client::DetectionApi;
use tool_recognition::error::{Result, ToolRecognitionError};
use tool_recognition_common::{
    normalize_image_path, AnalysisConfig, AnalysisResult, BatchOutcome, DetectionItem,
    DetectionStatus, ImageAnalysisResult, SingleAnalysisOutcome, Thresholds,
};

pub const FAKE_IMAGES_BASE: &str = "http://fake-server/results/";

/// 画像URLごとの応答
#[derive(Clone)]
pub enum FakeImage {
    Png,
    Garbage,
    NotFound,
}

#[derive(Default)]
pub struct FakeApi {
    pub single: Option<SingleAnalysisOutcome>,
    pub batch: Option<BatchOutcome>,
    /// 指定がないURLはPNGを返す
    pub images: HashMap<String, FakeImage>,
    pub fetch_delay_ms: u64,
    pub analyze_calls: Mutex<Vec<(String, Thresholds)>>,
    pub fetch_calls: Mutex<Vec<String>>,
    /// 取得の開始・終了の記録 ("start:URL" / "end:URL")
    pub events: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl FakeApi {
    pub fn new() -> Self {
        Self {
            fetch_delay_ms: 5,
            ..Self::default()
        }
    }

    pub fn with_single(mut self, outcome: SingleAnalysisOutcome) -> Self {
        self.single = Some(outcome);
        self
    }

    pub fn with_batch(mut self, outcome: BatchOutcome) -> Self {
        self.batch = Some(outcome);
        self
    }

    pub fn with_image(mut self, url: &str, image: FakeImage) -> Self {
        self.images.insert(url.to_string(), image);
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_calls.lock().unwrap().len()
    }

    pub fn analyze_count(&self) -> usize {
        self.analyze_calls.lock().unwrap().len()
    }
}

impl DetectionApi for FakeApi {
    async fn analyze_single(&self, _image: &[u8], file_name: &str, thresholds: Thresholds) -> Result<SingleAnalysisOutcome> {
        self.analyze_calls.lock().unwrap().push((file_name.to_string(), thresholds));
        tokio::time::sleep(Duration::from_millis(1)).await;
        self.single
            .clone()
            .ok_or_else(|| ToolRecognitionError::Transport("503 Service Unavailable".into()))
    }

    async fn analyze_batch(&self, _archive: &[u8], file_name: &str, thresholds: Thresholds) -> Result<BatchOutcome> {
        self.analyze_calls.lock().unwrap().push((file_name.to_string(), thresholds));
        tokio::time::sleep(Duration::from_millis(1)).await;
        self.batch
            .clone()
            .ok_or_else(|| ToolRecognitionError::Decode("unexpected body".into()))
    }

    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>> {
        self.fetch_calls.lock().unwrap().push(url.to_string());
        self.events.lock().unwrap().push(format!("start:{}", url));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(self.fetch_delay_ms)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.events.lock().unwrap().push(format!("end:{}", url));

        match self.images.get(url).cloned().unwrap_or(FakeImage::Png) {
            FakeImage::Png => Ok(png_bytes()),
            FakeImage::Garbage => Ok(b"not an image".to_vec()),
            FakeImage::NotFound => Err(ToolRecognitionError::Transport("404 Not Found".into())),
        }
    }

    fn image_url(&self, path: &str) -> String {
        format!("{}{}", FAKE_IMAGES_BASE, normalize_image_path(path))
    }
}

pub fn png_bytes() -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, image::Rgb([200, 30, 30])));
    let mut cursor = Cursor::new(Vec::new());
    img.write_to(&mut cursor, ImageFormat::Png).unwrap();
    cursor.into_inner()
}

pub fn sample_image() -> DynamicImage {
    image::load_from_memory(&png_bytes()).unwrap()
}

pub fn sample_result(status: DetectionStatus) -> AnalysisResult {
    AnalysisResult {
        status,
        total_detections: 1,
        expected_count: 11,
        missing_tools: vec!["hammer".into()],
        extra_tools: vec![],
        detected_tools: vec!["wrench".into()],
        detections: vec![DetectionItem {
            class_id: 4,
            class_name: "wrench".into(),
            confidence: 0.87,
            bbox: [12.0, 34.5, 120.0, 98.25],
        }],
        message: "hammer is missing".into(),
    }
}

pub fn sample_single(annotated: Option<&str>) -> SingleAnalysisOutcome {
    SingleAnalysisOutcome {
        status: "success".into(),
        analysis_result: sample_result(DetectionStatus::Missing),
        config: AnalysisConfig {
            confidence_threshold: 0.5,
            iou_threshold: 0.45,
            annotated_image_path: annotated.map(str::to_string),
            output_directory: None,
            total_annotated_images: None,
        },
    }
}

/// 注釈付き画像 `results\batch\img_{i}.jpg` を持つ一括結果
pub fn sample_batch(count: usize) -> BatchOutcome {
    let results = (0..count)
        .map(|i| ImageAnalysisResult {
            filename: format!("img_{}.jpg", i),
            analysis_result: sample_result(DetectionStatus::Missing),
            annotated_image_path: Some(format!("results\\batch\\img_{}.jpg", i)),
        })
        .collect();

    BatchOutcome {
        status: "success".into(),
        total_images: count as u32,
        processed_images: count as u32,
        results,
        processing_time: 2.5,
        summary: BTreeMap::from([("missing".to_string(), count as u32)]),
        config: Some(AnalysisConfig {
            confidence_threshold: 0.5,
            iou_threshold: 0.45,
            annotated_image_path: None,
            output_directory: Some("results/batch".into()),
            total_annotated_images: Some(count as u32),
        }),
    }
}

/// `sample_batch` の i 番目の画像URL
pub fn batch_image_url(i: usize) -> String {
    format!("{}batch/img_{}.jpg", FAKE_IMAGES_BASE, i)
}
