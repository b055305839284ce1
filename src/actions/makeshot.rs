//! `makeshot` - render a page and capture cropped screenshots.
//!
//! Pipeline: materialize the job config (output dir, optional template
//! fill), point the engine at the url, wait for the wrap selector to
//! show enough elements, locate the crop regions, give rendering a
//! moment to settle, then crop one image per region. The page is
//! released whatever happens so the next job starts clean.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde_json::json;

use super::{ActionContext, Reply};
use crate::config::{self, OutConfig, ShotConfig};
use crate::engine::RenderEngine;
use crate::error::{Error, Result};
use crate::protocol::FrameKind;

/// Readiness-wait polling interval.
pub const POLL_INTERVAL: Duration = Duration::from_millis(160);

/// Readiness-wait state.
///
/// `Waiting -> Found` when the polled element count meets the minimum;
/// `Waiting -> TimedOut` once elapsed time exceeds the configured
/// timeout. Nothing leaves a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitState {
    Waiting,
    Found,
    TimedOut,
}

pub(crate) async fn run(ctx: &ActionContext<'_>, cfg: &ShotConfig) -> Result<Reply> {
    let (out, url) = config::materialize(cfg).await?;

    let shot = shoot(ctx.engine, cfg, &out, &url).await;

    if let Err(release_err) = ctx.engine.release().await {
        tracing::warn!(job_id = %cfg.id, error = %release_err, "engine release failed");
    }

    let images = shot?;

    Ok(Reply::Json {
        kind: FrameKind::Result,
        body: json!({
            "id": cfg.id,
            "outName": cfg.out_name,
            "outFile": out.image,
            "images": images,
        }),
    })
}

/// Everything between "page requested" and "images on disk".
async fn shoot(
    engine: &dyn RenderEngine,
    cfg: &ShotConfig,
    out: &OutConfig,
    url: &str,
) -> Result<Vec<PathBuf>> {
    engine
        .set_viewport(cfg.viewport.width, cfg.viewport.height)
        .await?;
    engine.open(url).await?;

    wait_for_wrap(engine, cfg).await?;

    let rects = engine
        .crop_rects(&cfg.wrap_selector, cfg.wrap_max_count)
        .await?;

    if !cfg.render_delay.is_zero() {
        tokio::time::sleep(cfg.render_delay).await;
    }

    let mut images = Vec::with_capacity(rects.len());
    for (index, rect) in rects.iter().enumerate() {
        let path = out.image_for_index(index);
        engine.crop(rect, &path).await?;
        images.push(path);
    }

    Ok(images)
}

/// Poll until the wrap selector matches at least `wrap_min_count`
/// elements, bounded by `wrap_find_timeout`.
pub(crate) async fn wait_for_wrap(engine: &dyn RenderEngine, cfg: &ShotConfig) -> Result<()> {
    let started = Instant::now();
    let mut state = WaitState::Waiting;

    while state == WaitState::Waiting {
        tokio::time::sleep(POLL_INTERVAL).await;

        let count = engine.count(&cfg.wrap_selector).await?;

        if count >= cfg.wrap_min_count {
            state = WaitState::Found;
        } else if started.elapsed() > cfg.wrap_find_timeout {
            state = WaitState::TimedOut;
        }
    }

    match state {
        WaitState::Found => Ok(()),
        _ => Err(Error::WaitTimeout {
            selector: cfg.wrap_selector.clone(),
            waited_ms: started.elapsed().as_millis() as u64,
        }),
    }
}
