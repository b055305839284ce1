//! # shotwire
//!
//! Socket service that serializes rendering/screenshot jobs onto a
//! single shared headless rendering engine and streams typed results
//! back over the requesting connection.
//!
//! ## Architecture
//!
//! - **Protocol**: length-prefixed binary framing (6-byte header: kind,
//!   flags, payload length) carrying JSON job requests in and JSON
//!   results or chunked file streams out.
//! - **Scheduler**: one process-wide job queue with a single execution
//!   slot. The engine is one stateful page/session; the queue is the
//!   only thing standing between it and two overlapping `open` calls.
//! - **Actions**: a closed registry - `hello`, `makeshot`, `makelist`,
//!   `getfile`, `clean`.
//! - **Engine**: a trait boundary. Drivers (PhantomJS, Chromium, ...)
//!   live outside this crate; tests use the scripted [`MockEngine`].
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use shotwire::{FailurePolicy, Server, ServiceConfig};
//!
//! #[tokio::main]
//! async fn main() -> shotwire::Result<()> {
//!     let engine = Arc::new(my_engine_driver());
//!     let server = Server::bind(
//!         ServiceConfig::default(),
//!         engine,
//!         FailurePolicy::ExitProcess,
//!     )
//!     .await?;
//!
//!     server.serve().await
//! }
//! ```

pub mod actions;
pub mod codec;
pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod protocol;
pub mod queue;
pub mod server;
pub mod writer;

pub use actions::{Action, ActionContext, Reply};
pub use config::{JobDefaults, JobOverrides, OutConfig, ServiceConfig, ShotConfig, Viewport};
pub use connection::ConnectionHandle;
pub use engine::{MockEngine, PageLink, Rect, RenderEngine};
pub use error::{Error, Result};
pub use queue::{CountersSnapshot, FailurePolicy, Job, Scheduler, SchedulerHandle};
pub use server::Server;
