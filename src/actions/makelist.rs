//! `makelist` - extract link geometry from a rendered page.
//!
//! Same prepare-and-wait path as `makeshot`, but instead of cropping
//! pixels it pulls out the matched elements' link targets and bounding
//! rectangles, for downstream image-map generation.

use serde_json::json;

use super::makeshot::wait_for_wrap;
use super::{ActionContext, Reply};
use crate::config::{self, ShotConfig};
use crate::engine::{PageLink, RenderEngine};
use crate::error::Result;
use crate::protocol::FrameKind;

pub(crate) async fn run(ctx: &ActionContext<'_>, cfg: &ShotConfig) -> Result<Reply> {
    let (_out, url) = config::materialize(cfg).await?;

    let links = collect(ctx.engine, cfg, &url).await;

    if let Err(release_err) = ctx.engine.release().await {
        tracing::warn!(job_id = %cfg.id, error = %release_err, "engine release failed");
    }

    let links = links?;

    Ok(Reply::Json {
        kind: FrameKind::MakelistResult,
        body: json!({
            "id": cfg.id,
            "outName": cfg.out_name,
            "links": links,
        }),
    })
}

async fn collect(
    engine: &dyn RenderEngine,
    cfg: &ShotConfig,
    url: &str,
) -> Result<Vec<PageLink>> {
    engine
        .set_viewport(cfg.viewport.width, cfg.viewport.height)
        .await?;
    engine.open(url).await?;

    wait_for_wrap(engine, cfg).await?;

    engine
        .extract_links(&cfg.wrap_selector, cfg.wrap_max_count)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{JobOverrides, ServiceConfig};
    use crate::engine::{MockEngine, Rect};
    use crate::error::Error;

    #[tokio::test]
    async fn test_collects_links_into_result() {
        let tmp = tempfile::tempdir().unwrap();
        let mut service = ServiceConfig::default();
        service.out_path = tmp.path().join("out");

        let links = vec![
            PageLink {
                href: "https://a.example".to_string(),
                rect: Rect::new(0.0, 0.0, 10.0, 10.0),
            },
            PageLink {
                href: "https://b.example".to_string(),
                rect: Rect::new(0.0, 10.0, 10.0, 10.0),
            },
        ];
        let engine = MockEngine::new().with_links(links);
        let ctx = ActionContext { engine: &engine };

        let overrides = JobOverrides {
            url: Some("http://example.com".to_string()),
            wrap_selector: Some("a".to_string()),
            ..Default::default()
        };
        let cfg = ShotConfig::merge(&service, "list1", &overrides);

        let reply = run(&ctx, &cfg).await.unwrap();

        let body = match reply {
            Reply::Json { kind, body } => {
                assert_eq!(kind, FrameKind::MakelistResult);
                body
            }
            other => panic!("expected Json reply, got {other:?}"),
        };

        assert_eq!(body["id"], "list1");
        let result_links = body["links"].as_array().unwrap();
        assert_eq!(result_links.len(), 2);
        assert_eq!(result_links[0]["href"], "https://a.example");
    }

    #[tokio::test]
    async fn test_wait_timeout_fails_the_job() {
        let tmp = tempfile::tempdir().unwrap();
        let mut service = ServiceConfig::default();
        service.out_path = tmp.path().join("out");

        let engine = MockEngine::new().with_fallback_count(0);
        let ctx = ActionContext { engine: &engine };

        let overrides = JobOverrides {
            url: Some("http://example.com".to_string()),
            wrap_find_timeout: Some(200),
            ..Default::default()
        };
        let cfg = ShotConfig::merge(&service, "list2", &overrides);

        let err = run(&ctx, &cfg).await.unwrap_err();
        assert!(matches!(err, Error::WaitTimeout { .. }));
    }
}
