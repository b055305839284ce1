//! Scripted engine for tests.
//!
//! Records every call and answers from a prepared script, so tests can
//! assert both on protocol behavior (what the service sent back) and on
//! engine usage (what ran, in what order, and that nothing overlapped).

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::{PageLink, Rect, RenderEngine};
use crate::error::{Error, Result};

/// One recorded engine call.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    SetViewport(u32, u32),
    Open(String),
    Count(String),
    CropRects(String, usize),
    Crop(PathBuf),
    ExtractLinks(String, usize),
    Release,
}

/// A scripted [`RenderEngine`] double.
///
/// `count` answers are popped from a script queue, falling back to
/// `fallback_count` once exhausted; `crop` writes a small marker file so
/// tests can check for output on disk; `open` can be slowed down to make
/// serialization observable.
pub struct MockEngine {
    counts: Mutex<VecDeque<usize>>,
    fallback_count: usize,
    rects: Vec<Rect>,
    links: Vec<PageLink>,
    open_delay: Duration,
    fail_open: bool,
    calls: Mutex<Vec<EngineCall>>,
    open_spans: Mutex<Vec<(Instant, Instant)>>,
}

impl MockEngine {
    /// An engine whose page always has exactly one matching element and
    /// one full-viewport rect.
    pub fn new() -> Self {
        Self {
            counts: Mutex::new(VecDeque::new()),
            fallback_count: 1,
            rects: vec![Rect::new(0.0, 0.0, 1920.0, 1200.0)],
            links: Vec::new(),
            open_delay: Duration::ZERO,
            fail_open: false,
            calls: Mutex::new(Vec::new()),
            open_spans: Mutex::new(Vec::new()),
        }
    }

    /// Script the next `count` answers, in order.
    pub fn with_counts(mut self, counts: impl IntoIterator<Item = usize>) -> Self {
        self.counts = Mutex::new(counts.into_iter().collect());
        self
    }

    /// Answer once the count script is exhausted (default 1).
    pub fn with_fallback_count(mut self, count: usize) -> Self {
        self.fallback_count = count;
        self
    }

    /// Rects returned by `crop_rects` (before `max_count` truncation).
    pub fn with_rects(mut self, rects: Vec<Rect>) -> Self {
        self.rects = rects;
        self
    }

    /// Links returned by `extract_links` (before `max_count` truncation).
    pub fn with_links(mut self, links: Vec<PageLink>) -> Self {
        self.links = links;
        self
    }

    /// Make every `open` take this long.
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    /// Make every `open` fail.
    pub fn with_failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// All calls recorded so far.
    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().expect("mock calls lock poisoned").clone()
    }

    /// URLs passed to `open`, in call order.
    pub fn opened_urls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                EngineCall::Open(url) => Some(url),
                _ => None,
            })
            .collect()
    }

    /// Paths passed to `crop`, in call order.
    pub fn cropped_paths(&self) -> Vec<PathBuf> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                EngineCall::Crop(path) => Some(path),
                _ => None,
            })
            .collect()
    }

    /// (start, end) of every `open`, for overlap assertions.
    pub fn open_spans(&self) -> Vec<(Instant, Instant)> {
        self.open_spans
            .lock()
            .expect("mock spans lock poisoned")
            .clone()
    }

    /// Panics if any two `open` calls overlapped in time.
    pub fn assert_opens_serialized(&self) {
        let mut spans = self.open_spans();
        spans.sort_by_key(|(start, _)| *start);

        for pair in spans.windows(2) {
            let (_, first_end) = pair[0];
            let (second_start, _) = pair[1];
            assert!(
                second_start >= first_end,
                "engine open calls overlapped: {:?}",
                spans
            );
        }
    }

    fn record(&self, call: EngineCall) {
        self.calls.lock().expect("mock calls lock poisoned").push(call);
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RenderEngine for MockEngine {
    async fn set_viewport(&self, width: u32, height: u32) -> Result<()> {
        self.record(EngineCall::SetViewport(width, height));
        Ok(())
    }

    async fn open(&self, url: &str) -> Result<()> {
        self.record(EngineCall::Open(url.to_string()));

        let start = Instant::now();
        if !self.open_delay.is_zero() {
            tokio::time::sleep(self.open_delay).await;
        }
        self.open_spans
            .lock()
            .expect("mock spans lock poisoned")
            .push((start, Instant::now()));

        if self.fail_open {
            return Err(Error::Engine(format!("open failed: {url}")));
        }
        Ok(())
    }

    async fn count(&self, selector: &str) -> Result<usize> {
        self.record(EngineCall::Count(selector.to_string()));

        let scripted = self
            .counts
            .lock()
            .expect("mock counts lock poisoned")
            .pop_front();
        Ok(scripted.unwrap_or(self.fallback_count))
    }

    async fn crop_rects(&self, selector: &str, max_count: usize) -> Result<Vec<Rect>> {
        self.record(EngineCall::CropRects(selector.to_string(), max_count));
        Ok(self.rects.iter().take(max_count).copied().collect())
    }

    async fn crop(&self, _rect: &Rect, out: &Path) -> Result<()> {
        self.record(EngineCall::Crop(out.to_path_buf()));
        tokio::fs::write(out, b"\x89PNG mock image").await?;
        Ok(())
    }

    async fn extract_links(&self, selector: &str, max_count: usize) -> Result<Vec<PageLink>> {
        self.record(EngineCall::ExtractLinks(selector.to_string(), max_count));
        Ok(self.links.iter().take(max_count).cloned().collect())
    }

    async fn release(&self) -> Result<()> {
        self.record(EngineCall::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_counts_then_fallback() {
        let engine = MockEngine::new().with_counts([0, 0, 3]).with_fallback_count(7);

        assert_eq!(engine.count(".x").await.unwrap(), 0);
        assert_eq!(engine.count(".x").await.unwrap(), 0);
        assert_eq!(engine.count(".x").await.unwrap(), 3);
        assert_eq!(engine.count(".x").await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_crop_writes_marker_file() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("shot.png");

        let engine = MockEngine::new();
        engine
            .crop(&Rect::new(0.0, 0.0, 10.0, 10.0), &out)
            .await
            .unwrap();

        assert!(out.is_file());
        assert_eq!(engine.cropped_paths(), vec![out]);
    }

    #[tokio::test]
    async fn test_crop_rects_bounded_by_max_count() {
        let rects = vec![
            Rect::new(0.0, 0.0, 1.0, 1.0),
            Rect::new(0.0, 1.0, 1.0, 1.0),
            Rect::new(0.0, 2.0, 1.0, 1.0),
        ];
        let engine = MockEngine::new().with_rects(rects);

        let got = engine.crop_rects(".item", 2).await.unwrap();
        assert_eq!(got.len(), 2);
    }

    #[tokio::test]
    async fn test_records_call_order() {
        let engine = MockEngine::new();
        engine.set_viewport(800, 600).await.unwrap();
        engine.open("http://example.com").await.unwrap();
        engine.release().await.unwrap();

        assert_eq!(
            engine.calls(),
            vec![
                EngineCall::SetViewport(800, 600),
                EngineCall::Open("http://example.com".to_string()),
                EngineCall::Release,
            ]
        );
        assert_eq!(engine.opened_urls(), vec!["http://example.com"]);
    }
}
