//! Action registry and handlers.
//!
//! The registry is a closed enum: every action the service defines is a
//! variant, resolved from the payload's `action` field or the frame
//! kind, so "no action defined" is caught at decode time and dispatch is
//! exhaustive at compile time.
//!
//! Every handler is an async fn from `(context, merged config)` to
//! `Result<Reply>`; the sum type makes the exactly-once completion
//! contract structural.

mod clean;
mod getfile;
mod makelist;
mod makeshot;

use std::path::PathBuf;

use serde_json::Value;

use crate::config::ShotConfig;
use crate::engine::RenderEngine;
use crate::error::Result;
use crate::protocol::FrameKind;

pub use makeshot::POLL_INTERVAL;

/// What a handler hands back to the dispatcher.
#[derive(Debug)]
pub enum Reply {
    /// A structured result, sent as one JSON frame of `kind`.
    Json { kind: FrameKind, body: Value },
    /// A file whose bytes are streamed as chunked `file` frames.
    FileStream(PathBuf),
}

/// Capabilities a handler runs with.
///
/// Handlers are only ever invoked from the dispatcher's admission path,
/// which is what makes the borrowed engine safe to touch.
pub struct ActionContext<'a> {
    /// The shared rendering engine.
    pub engine: &'a dyn RenderEngine,
}

/// The closed set of actions this service defines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Fixed acknowledgement; the minimal handler contract.
    Hello,
    /// Capture cropped screenshots of a rendered page.
    Makeshot,
    /// Extract link geometry from a rendered page.
    Makelist,
    /// Stream a file's bytes back.
    Getfile,
    /// Remove a job's output directory.
    Clean,
}

impl Action {
    /// Resolve an action from its wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "hello" => Some(Self::Hello),
            "makeshot" => Some(Self::Makeshot),
            "makelist" => Some(Self::Makelist),
            "getfile" => Some(Self::Getfile),
            "clean" => Some(Self::Clean),
            _ => None,
        }
    }

    /// Resolve an action from a request frame kind (the transport-level
    /// hint used when the payload omits `action`).
    pub fn from_kind(kind: FrameKind) -> Option<Self> {
        match kind {
            FrameKind::Hello => Some(Self::Hello),
            FrameKind::Makeshot => Some(Self::Makeshot),
            FrameKind::Makelist => Some(Self::Makelist),
            FrameKind::Getfile => Some(Self::Getfile),
            FrameKind::Clean => Some(Self::Clean),
            _ => None,
        }
    }

    /// Wire name of this action.
    pub fn name(self) -> &'static str {
        match self {
            Self::Hello => "hello",
            Self::Makeshot => "makeshot",
            Self::Makelist => "makelist",
            Self::Getfile => "getfile",
            Self::Clean => "clean",
        }
    }

    /// Run the handler for this action.
    pub async fn dispatch(self, ctx: &ActionContext<'_>, cfg: &ShotConfig) -> Result<Reply> {
        tracing::info!(action = self.name(), job_id = %cfg.id, "action start");

        let reply = match self {
            Self::Hello => hello(ctx, cfg).await,
            Self::Makeshot => makeshot::run(ctx, cfg).await,
            Self::Makelist => makelist::run(ctx, cfg).await,
            Self::Getfile => getfile::run(ctx, cfg).await,
            Self::Clean => clean::run(ctx, cfg).await,
        }?;

        tracing::info!(action = self.name(), job_id = %cfg.id, "action done");
        Ok(reply)
    }
}

/// Fixed acknowledgement payload.
async fn hello(_ctx: &ActionContext<'_>, _cfg: &ShotConfig) -> Result<Reply> {
    Ok(Reply::Json {
        kind: FrameKind::Result,
        body: Value::String("Hello~".to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{JobOverrides, ServiceConfig};
    use crate::engine::MockEngine;

    fn cfg(id: &str) -> ShotConfig {
        ShotConfig::merge(&ServiceConfig::default(), id, &JobOverrides::default())
    }

    #[test]
    fn test_action_names_roundtrip() {
        for action in [
            Action::Hello,
            Action::Makeshot,
            Action::Makelist,
            Action::Getfile,
            Action::Clean,
        ] {
            assert_eq!(Action::from_name(action.name()), Some(action));
        }

        assert_eq!(Action::from_name("nope"), None);
    }

    #[test]
    fn test_action_from_request_kinds() {
        assert_eq!(Action::from_kind(FrameKind::Hello), Some(Action::Hello));
        assert_eq!(Action::from_kind(FrameKind::Clean), Some(Action::Clean));
        assert_eq!(Action::from_kind(FrameKind::Result), None);
        assert_eq!(Action::from_kind(FrameKind::File), None);
    }

    #[tokio::test]
    async fn test_hello_replies_fixed_payload() {
        let engine = MockEngine::new();
        let ctx = ActionContext { engine: &engine };

        let reply = Action::Hello.dispatch(&ctx, &cfg("h1")).await.unwrap();

        match reply {
            Reply::Json { kind, body } => {
                assert_eq!(kind, FrameKind::Result);
                assert_eq!(body, Value::String("Hello~".to_string()));
            }
            other => panic!("expected Json reply, got {other:?}"),
        }

        // hello never touches the engine
        assert!(engine.calls().is_empty());
    }
}
