//! Per-variation post-processing with an in-flight guard.
//!
//! Each variation id is processed at most once. Only finished results are
//! exposed, so a raw generated image is never shown in place of its
//! print-ready form.

use super::aspect::{AspectPostProcessor, Processed, PNG_MIME};
use super::spec::DocumentType;
use crate::job::VariationResult;
use crate::metrics::PipelineMetrics;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// A variation whose image has been replaced by its print-ready form.
#[derive(Debug, Clone, PartialEq)]
pub struct PostProcessedResult {
    pub result: VariationResult,
    /// BLAKE3 of the generated bytes this was derived from.
    pub source_digest: blake3::Hash,
    /// Whether the image was actually cropped and stamped.
    pub stamped: bool,
}

impl PostProcessedResult {
    pub fn variation_id(&self) -> u32 {
        self.result.variation_id
    }
}

#[derive(Default)]
struct QueueState {
    in_flight: HashSet<u32>,
    processed: BTreeMap<u32, PostProcessedResult>,
}

/// Runs the post-processor over variations as they arrive.
#[derive(Clone)]
pub struct PostProcessQueue {
    document_type: DocumentType,
    state: Arc<Mutex<QueueState>>,
    metrics: Option<Arc<PipelineMetrics>>,
}

impl PostProcessQueue {
    pub fn new(document_type: DocumentType) -> Self {
        Self {
            document_type,
            state: Arc::new(Mutex::new(QueueState::default())),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn document_type(&self) -> DocumentType {
        self.document_type
    }

    /// Starts processing `result` unless its id is in flight or done.
    pub fn enqueue(&self, result: &VariationResult) -> Option<JoinHandle<()>> {
        let spec = self.document_type.spec();
        self.enqueue_with(result, move |bytes| AspectPostProcessor::run(bytes, &spec))
    }

    fn enqueue_with<F>(&self, result: &VariationResult, pipeline: F) -> Option<JoinHandle<()>>
    where
        F: FnOnce(&[u8]) -> Processed + Send + 'static,
    {
        let id = result.variation_id;
        {
            let mut state = self.state.lock();
            if state.processed.contains_key(&id) || !state.in_flight.insert(id) {
                tracing::trace!(variation_id = id, "Already processing, skipped");
                return None;
            }
        }

        let result = result.clone();
        let queue = self.clone();
        Some(tokio::spawn(async move {
            let source = result.image.clone();
            let outcome = match tokio::task::spawn_blocking(move || pipeline(&source)).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::warn!(
                        variation_id = id,
                        error = %e,
                        "Post-processing task failed, keeping original"
                    );
                    Processed::Fallback
                }
            };
            let (done, fell_back) = finish_variation(result, outcome);

            if let Some(m) = &queue.metrics {
                m.record_postprocess(done.stamped, fell_back);
            }
            tracing::debug!(variation_id = id, stamped = done.stamped, "Variation ready");

            let mut state = queue.state.lock();
            state.in_flight.remove(&id);
            state.processed.entry(id).or_insert(done);
        }))
    }

    /// Enqueues every result not yet seen. Returns the spawned tasks.
    pub fn enqueue_all<'a>(
        &self,
        results: impl IntoIterator<Item = &'a VariationResult>,
    ) -> Vec<JoinHandle<()>> {
        results
            .into_iter()
            .filter_map(|result| self.enqueue(result))
            .collect()
    }

    /// Finished results, ordered by variation id.
    pub fn ready(&self) -> Vec<PostProcessedResult> {
        self.state.lock().processed.values().cloned().collect()
    }

    pub fn get(&self, variation_id: u32) -> Option<PostProcessedResult> {
        self.state.lock().processed.get(&variation_id).cloned()
    }

    pub fn is_in_flight(&self, variation_id: u32) -> bool {
        self.state.lock().in_flight.contains(&variation_id)
    }

    pub fn ready_count(&self) -> usize {
        self.state.lock().processed.len()
    }
}

/// Returns the processed result and whether processing fell back.
fn finish_variation(mut result: VariationResult, outcome: Processed) -> (PostProcessedResult, bool) {
    let source_digest = blake3::hash(&result.image);
    let fell_back = outcome == Processed::Fallback;
    let stamped = match outcome {
        Processed::Stamped(png) => {
            result.image = png;
            result.mime_type = PNG_MIME.to_string();
            result.filename = with_png_extension(&result.filename);
            true
        }
        Processed::Unchanged | Processed::Fallback => false,
    };

    let done = PostProcessedResult {
        result,
        source_digest,
        stamped,
    };
    (done, fell_back)
}

fn with_png_extension(filename: &str) -> String {
    Path::new(filename)
        .with_extension("png")
        .to_string_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbaImage};
    use std::io::Cursor;

    fn variation(id: u32, width: u32, height: u32) -> VariationResult {
        let image = RgbaImage::from_pixel(width, height, image::Rgba([200, 180, 170, 255]));
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, ImageFormat::Png).unwrap();
        VariationResult {
            variation_id: id,
            image: out.into_inner(),
            filename: format!("variation-{id}.jpg"),
            mime_type: "image/jpeg".to_string(),
            photo_type: "4 x 6 Photo".to_string(),
            compliance: None,
        }
    }

    async fn join(handles: Vec<JoinHandle<()>>) {
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_same_id_processed_once() {
        let queue = PostProcessQueue::new(DocumentType::Passport);
        let first = variation(1, 160, 120);

        let handle = queue.enqueue(&first).unwrap();
        assert!(queue.is_in_flight(1));
        assert!(queue.enqueue(&first).is_none());
        handle.await.unwrap();

        assert!(!queue.is_in_flight(1));
        // Done ids are not reprocessed either, even with new bytes.
        assert!(queue.enqueue(&variation(1, 320, 120)).is_none());
        assert_eq!(queue.ready_count(), 1);
        assert_eq!(queue.get(1).unwrap().source_digest, blake3::hash(&first.image));
    }

    #[tokio::test]
    async fn test_ready_is_ordered_and_stamped() {
        let queue = PostProcessQueue::new(DocumentType::Passport);
        let results = [variation(3, 160, 120), variation(1, 160, 120), variation(2, 60, 120)];
        join(queue.enqueue_all(results.iter())).await;

        let ready = queue.ready();
        let ids: Vec<_> = ready.iter().map(|r| r.variation_id()).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        let wide = &ready[0];
        assert!(wide.stamped);
        assert_eq!(wide.result.mime_type, "image/png");
        assert_eq!(wide.result.filename, "variation-1.png");
        let decoded = image::load_from_memory(&wide.result.image).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (1200, 1800));

        // Already narrower than 4:6, left alone.
        let narrow = &ready[1];
        assert!(!narrow.stamped);
        assert_eq!(narrow.result.mime_type, "image/jpeg");
    }

    #[tokio::test]
    async fn test_visa_results_pass_through() {
        let queue = PostProcessQueue::new(DocumentType::Visa);
        let source = variation(1, 160, 120);
        join(queue.enqueue_all([&source])).await;

        let ready = queue.get(1).unwrap();
        assert!(!ready.stamped);
        assert_eq!(ready.result, source);
    }

    #[tokio::test]
    async fn test_failed_task_keeps_original() {
        let metrics = Arc::new(PipelineMetrics::new().unwrap());
        let queue = PostProcessQueue::new(DocumentType::Passport).with_metrics(Arc::clone(&metrics));
        let source = variation(2, 160, 120);

        let handle = queue
            .enqueue_with(&source, |_| panic!("resampler crashed"))
            .unwrap();
        handle.await.unwrap();

        assert!(!queue.is_in_flight(2));
        assert_eq!(queue.ready_count(), 1);
        let ready = queue.get(2).unwrap();
        assert!(!ready.stamped);
        assert_eq!(ready.result, source);
        assert_eq!(ready.source_digest, blake3::hash(&source.image));

        let text = metrics.encode().unwrap();
        assert!(text.contains("passport_photo_postprocess_fallbacks_total 1"));
    }

    #[test]
    fn test_png_extension() {
        assert_eq!(with_png_extension("a.jpg"), "a.png");
        assert_eq!(with_png_extension("variation"), "variation.png");
    }
}
