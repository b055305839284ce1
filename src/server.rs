//! Server assembly - listening socket, accept loop, scheduler wiring.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::config::ServiceConfig;
use crate::connection;
use crate::engine::RenderEngine;
use crate::error::Result;
use crate::queue::{FailurePolicy, Scheduler, SchedulerHandle};

/// The socket service: one listener, one scheduler, many connections.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use shotwire::{FailurePolicy, Server, ServiceConfig};
///
/// let engine = Arc::new(my_engine_driver());
/// let server = Server::bind(ServiceConfig::default(), engine, FailurePolicy::ExitProcess).await?;
/// server.serve().await?;
/// ```
pub struct Server {
    listener: TcpListener,
    scheduler: Scheduler,
    handle: SchedulerHandle,
    max_payload: u32,
    next_uid: AtomicU64,
}

impl Server {
    /// Bind the listening socket and build the scheduler.
    ///
    /// Nothing runs until [`serve`](Self::serve); binding early lets the
    /// caller read [`local_addr`](Self::local_addr) (port 0 picks a free
    /// port).
    pub async fn bind(
        config: ServiceConfig,
        engine: Arc<dyn RenderEngine>,
        policy: FailurePolicy,
    ) -> Result<Self> {
        let listener =
            TcpListener::bind((config.listen_host.as_str(), config.listen_port)).await?;
        let max_payload = config.max_payload;

        let (scheduler, handle) = Scheduler::new(config, engine, policy);

        Ok(Self {
            listener,
            scheduler,
            handle,
            max_payload,
            next_uid: AtomicU64::new(1),
        })
    }

    /// The bound address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Enqueue-side handle to the scheduler, for introspection.
    pub fn scheduler(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    /// Run the accept loop forever.
    ///
    /// The scheduler is spawned once; every accepted connection gets its
    /// own uid and read/write tasks. New connections are accepted (and
    /// may enqueue jobs) at any time, independent of job completion.
    pub async fn serve(self) -> Result<()> {
        let Self {
            listener,
            scheduler,
            handle,
            max_payload,
            next_uid,
        } = self;

        tokio::spawn(scheduler.run());

        let addr = listener.local_addr()?;
        tracing::info!(%addr, "server listening");

        loop {
            let (stream, peer) = listener.accept().await?;
            let uid = next_uid.fetch_add(1, Ordering::Relaxed);

            tracing::debug!(conn_uid = uid, %peer, "connection accepted");
            connection::spawn(stream, uid, handle.clone(), max_payload);
        }
    }
}
