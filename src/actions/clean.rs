//! `clean` - remove a job's output directory.
//!
//! The result code distinguishes "not_found" from "failed" from
//! "removed"; a failed removal is reported in the result rather than
//! failing the job, so the client can tell the three apart.

use serde_json::json;

use super::{ActionContext, Reply};
use crate::config::ShotConfig;
use crate::error::Result;
use crate::protocol::FrameKind;

pub(crate) async fn run(_ctx: &ActionContext<'_>, cfg: &ShotConfig) -> Result<Reply> {
    let dir = cfg.out_dir();

    let status = match tokio::fs::metadata(&dir).await {
        Err(_) => "not_found",
        Ok(_) => match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => "removed",
            Err(err) => {
                tracing::warn!(job_id = %cfg.id, dir = %dir.display(), error = %err, "clean failed");
                "failed"
            }
        },
    };

    Ok(Reply::Json {
        kind: FrameKind::CleanResult,
        body: json!({
            "id": cfg.id,
            "status": status,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{JobOverrides, ServiceConfig};
    use crate::engine::MockEngine;

    fn cfg(tmp: &tempfile::TempDir, id: &str) -> ShotConfig {
        let mut service = ServiceConfig::default();
        service.out_path = tmp.path().join("out");
        ShotConfig::merge(&service, id, &JobOverrides::default())
    }

    fn status_of(reply: Reply) -> String {
        match reply {
            Reply::Json { kind, body } => {
                assert_eq!(kind, FrameKind::CleanResult);
                body["status"].as_str().unwrap().to_string()
            }
            other => panic!("expected Json reply, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_dir_reports_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = MockEngine::new();
        let ctx = ActionContext { engine: &engine };

        let reply = run(&ctx, &cfg(&tmp, "ghost")).await.unwrap();
        assert_eq!(status_of(reply), "not_found");
    }

    #[tokio::test]
    async fn test_present_dir_is_removed() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = cfg(&tmp, "job1");

        let dir = cfg.out_dir();
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("out.png"), b"img").unwrap();
        std::fs::create_dir_all(dir.join("nested")).unwrap();

        let engine = MockEngine::new();
        let ctx = ActionContext { engine: &engine };

        let reply = run(&ctx, &cfg).await.unwrap();
        assert_eq!(status_of(reply), "removed");
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn test_second_clean_reports_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = cfg(&tmp, "job2");
        std::fs::create_dir_all(cfg.out_dir()).unwrap();

        let engine = MockEngine::new();
        let ctx = ActionContext { engine: &engine };

        let first = run(&ctx, &cfg).await.unwrap();
        assert_eq!(status_of(first), "removed");

        let second = run(&ctx, &cfg).await.unwrap();
        assert_eq!(status_of(second), "not_found");
    }
}
