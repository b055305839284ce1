//! Configuration surface and per-job config materialization.
//!
//! Two layers:
//! - [`ServiceConfig`] - process-wide settings plus default job
//!   parameters. How the struct gets populated (file, env, hardcoded) is
//!   the embedding application's business; this module only defines the
//!   boundary.
//! - [`JobOverrides`] - the job-specific fields decoded from a request
//!   payload, merged over the defaults into a [`ShotConfig`] at dispatch
//!   time.
//!
//! [`materialize`] derives the output layout for a job (directory keyed
//! by job id, image/html paths) and, when the job carries inline
//! `content`, fills the named HTML template and rewrites the job's `url`
//! to point at the written file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::{self, IgnoredAny, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use tokio::fs;

use crate::error::{Error, Result};

/// Template placeholder replaced by the job's `content`.
const CONTENT_PLACEHOLDER: &str = "{content}";

/// Page viewport in CSS pixels.
///
/// Accepts either `[width, height]` or a `"width,height"` string on the
/// wire; missing or unparseable components fall back to 1920x1200.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    /// Parse from a `"width,height"` string, tolerating brackets and
    /// whitespace.
    pub fn parse(value: &str) -> Self {
        let trimmed = value.trim_matches(|c| c == '[' || c == ']' || c == ' ');
        let mut parts = trimmed.split(',');

        let width = parts
            .next()
            .and_then(|p| p.trim().parse().ok())
            .unwrap_or(Self::default().width);
        let height = parts
            .next()
            .and_then(|p| p.trim().parse().ok())
            .unwrap_or(Self::default().height);

        Self { width, height }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1200,
        }
    }
}

impl<'de> Deserialize<'de> for Viewport {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ViewportVisitor;

        impl<'de> Visitor<'de> for ViewportVisitor {
            type Value = Viewport;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a [width, height] pair or a \"width,height\" string")
            }

            fn visit_seq<A>(self, mut seq: A) -> std::result::Result<Viewport, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let defaults = Viewport::default();
                let width = seq.next_element::<u32>()?.unwrap_or(defaults.width);
                let height = seq.next_element::<u32>()?.unwrap_or(defaults.height);

                // Drain extra elements so trailing junk is not an error.
                while seq.next_element::<IgnoredAny>()?.is_some() {}

                Ok(Viewport { width, height })
            }

            fn visit_str<E>(self, value: &str) -> std::result::Result<Viewport, E>
            where
                E: de::Error,
            {
                Ok(Viewport::parse(value))
            }
        }

        deserializer.deserialize_any(ViewportVisitor)
    }
}

/// Default job parameters, overridable per job.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JobDefaults {
    /// Page viewport.
    pub viewport: Viewport,
    /// Selector of the element(s) to capture.
    pub wrap_selector: String,
    /// How long the readiness wait polls before giving up, in ms.
    pub wrap_find_timeout: u64,
    /// Minimum matched-element count for the wait to succeed.
    pub wrap_min_count: usize,
    /// Upper bound on captured regions per job.
    pub wrap_max_count: usize,
    /// Settle delay between locating regions and cropping, in ms.
    pub render_delay: u64,
    /// Output image type when no explicit extension is given.
    pub image_type: String,
    /// Template file used to materialize inline `content`.
    pub html_tpl: String,
    /// Base name for output files.
    pub name: String,
}

impl Default for JobDefaults {
    fn default() -> Self {
        Self {
            viewport: Viewport::default(),
            wrap_selector: "body".to_string(),
            wrap_find_timeout: 10_000,
            wrap_min_count: 1,
            wrap_max_count: 10,
            render_delay: 0,
            image_type: "png".to_string(),
            html_tpl: "default.html".to_string(),
            name: "out".to_string(),
        }
    }
}

/// Process-wide service configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Listen address.
    pub listen_host: String,
    /// Listen port.
    pub listen_port: u16,
    /// Root directory for per-job output directories.
    pub out_path: PathBuf,
    /// Directory holding HTML templates.
    pub tpl_path: PathBuf,
    /// Maximum accepted inbound frame payload, in bytes.
    pub max_payload: u32,
    /// Default job parameters.
    pub job: JobDefaults,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_host: "127.0.0.1".to_string(),
            listen_port: 7979,
            out_path: PathBuf::from("out"),
            tpl_path: PathBuf::from("tpl"),
            max_payload: crate::protocol::DEFAULT_MAX_PAYLOAD_SIZE,
            job: JobDefaults::default(),
        }
    }
}

/// Job-specific fields decoded from a request payload.
///
/// Everything is optional; absent fields take the service defaults at
/// merge time. Field names follow the wire protocol (camelCase).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobOverrides {
    pub url: Option<String>,
    pub content: Option<String>,
    pub html_tpl: Option<String>,
    pub viewport: Option<Viewport>,
    pub wrap_selector: Option<String>,
    pub wrap_find_timeout: Option<u64>,
    pub wrap_min_count: Option<usize>,
    pub wrap_max_count: Option<usize>,
    pub render_delay: Option<u64>,
    pub image_type: Option<String>,
    pub image_extname: Option<String>,
    pub name: Option<String>,
}

/// The fully merged configuration one job runs with.
#[derive(Debug, Clone)]
pub struct ShotConfig {
    pub id: String,
    pub url: Option<String>,
    pub content: Option<String>,
    pub html_tpl: String,
    pub viewport: Viewport,
    pub wrap_selector: String,
    pub wrap_find_timeout: Duration,
    pub wrap_min_count: usize,
    pub wrap_max_count: usize,
    pub render_delay: Duration,
    /// Resolved image extension, including the leading dot.
    pub image_extname: String,
    pub out_name: String,
    pub out_path: PathBuf,
    pub tpl_path: PathBuf,
}

impl ShotConfig {
    /// Merge service defaults with per-job overrides. Override wins per
    /// field; `wrap_min_count` is floored at 1.
    pub fn merge(service: &ServiceConfig, id: &str, o: &JobOverrides) -> Self {
        let d = &service.job;

        let image_extname = o.image_extname.clone().unwrap_or_else(|| {
            image_ext_for_type(o.image_type.as_deref().unwrap_or(&d.image_type))
        });

        Self {
            id: id.to_string(),
            url: o.url.clone(),
            content: o.content.clone(),
            html_tpl: o.html_tpl.clone().unwrap_or_else(|| d.html_tpl.clone()),
            viewport: o.viewport.unwrap_or(d.viewport),
            wrap_selector: o
                .wrap_selector
                .clone()
                .unwrap_or_else(|| d.wrap_selector.clone()),
            wrap_find_timeout: Duration::from_millis(
                o.wrap_find_timeout.unwrap_or(d.wrap_find_timeout),
            ),
            wrap_min_count: o.wrap_min_count.unwrap_or(d.wrap_min_count).max(1),
            wrap_max_count: o.wrap_max_count.unwrap_or(d.wrap_max_count),
            render_delay: Duration::from_millis(o.render_delay.unwrap_or(d.render_delay)),
            image_extname,
            out_name: o.name.clone().unwrap_or_else(|| d.name.clone()),
            out_path: service.out_path.clone(),
            tpl_path: service.tpl_path.clone(),
        }
    }

    /// The job's exclusive output directory.
    pub fn out_dir(&self) -> PathBuf {
        self.out_path.join(&self.id)
    }
}

/// Map an image type to a file extension.
fn image_ext_for_type(image_type: &str) -> String {
    match image_type {
        "jpeg" | "jpg" => ".jpg",
        _ => ".png",
    }
    .to_string()
}

/// Derived output layout for one job.
#[derive(Debug, Clone)]
pub struct OutConfig {
    /// Directory name, equal to the job id.
    pub dirname: String,
    /// Absolute/relative output directory path.
    pub path: PathBuf,
    /// Path of the materialized HTML file.
    pub html: PathBuf,
    /// Path of the primary output image.
    pub image: PathBuf,
}

impl OutConfig {
    /// Image path for the region at `index`.
    ///
    /// The first region takes the primary image path; extras get an
    /// index suffix inserted before the extension (`out-2.png`,
    /// `out-3.png`, ...).
    pub fn image_for_index(&self, index: usize) -> PathBuf {
        if index == 0 {
            return self.image.clone();
        }

        let stem = self
            .image
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("out");
        let ext = self
            .image
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("png");

        self.image
            .with_file_name(format!("{stem}-{}.{ext}", index + 1))
    }
}

/// Derive the job's output layout and resolve its effective URL.
///
/// Creates the per-job output directory. When the job carries inline
/// `content`, reads the configured template, substitutes the content
/// placeholder, writes the result next to the other outputs, and uses
/// that file as the URL.
///
/// # Errors
///
/// [`Error::NoUrl`] when the job has neither `url` nor `content`;
/// [`Error::Io`] on directory/template/file failures.
pub async fn materialize(cfg: &ShotConfig) -> Result<(OutConfig, String)> {
    let path = cfg.out_dir();
    fs::create_dir_all(&path).await?;

    let out = OutConfig {
        dirname: cfg.id.clone(),
        path: path.clone(),
        html: path.join(format!("{}.html", cfg.out_name)),
        image: path.join(format!("{}{}", cfg.out_name, cfg.image_extname)),
    };

    if let Some(content) = &cfg.content {
        let tpl_file = cfg.tpl_path.join(&cfg.html_tpl);
        let tpl = fs::read_to_string(&tpl_file).await?;
        let html = tpl.replace(CONTENT_PLACEHOLDER, content);

        fs::write(&out.html, html).await?;

        let url = path_to_url(&out.html);
        return Ok((out, url));
    }

    match &cfg.url {
        Some(url) => Ok((out, url.clone())),
        None => Err(Error::NoUrl),
    }
}

fn path_to_url(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
