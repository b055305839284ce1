//! Rendering engine boundary.
//!
//! The engine is the external collaborator that loads content and
//! produces pixels. It is one shared, stateful resource (one logical
//! page/session): two overlapping `open` calls against the same instance
//! would race, which is exactly why the scheduler admits one job at a
//! time. This module only defines the seam; drivers live outside the
//! crate.
//!
//! [`MockEngine`] is a scripted stand-in for tests.

mod mock;

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use mock::{EngineCall, MockEngine};

/// Bounding rectangle of a page element, in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }
}

/// One link extracted from a rendered page, for image-map generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageLink {
    /// Link target.
    pub href: String,
    /// Element geometry.
    pub rect: Rect,
}

/// The shared headless rendering engine.
///
/// All methods operate on the engine's single current page. Callers must
/// only reach the engine through the scheduler's execution slot; the
/// trait itself carries no locking.
#[async_trait]
pub trait RenderEngine: Send + Sync {
    /// Resize the page viewport.
    async fn set_viewport(&self, width: u32, height: u32) -> Result<()>;

    /// Navigate the page to a URL or local file path.
    async fn open(&self, url: &str) -> Result<()>;

    /// Count elements currently matching `selector`.
    async fn count(&self, selector: &str) -> Result<usize>;

    /// Bounding rectangles of elements matching `selector`, at most
    /// `max_count` of them, in document order.
    async fn crop_rects(&self, selector: &str, max_count: usize) -> Result<Vec<Rect>>;

    /// Capture the region `rect` of the current page into an image file
    /// at `out`.
    async fn crop(&self, rect: &Rect, out: &Path) -> Result<()>;

    /// Extract link geometry for elements matching `selector`, at most
    /// `max_count` entries.
    async fn extract_links(&self, selector: &str, max_count: usize) -> Result<Vec<PageLink>>;

    /// Release the current page so the next job starts clean.
    async fn release(&self) -> Result<()>;
}
