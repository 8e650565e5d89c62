//! Byte relay between an admitted client and the upstream service.
//!
//! Two independent copy tasks run per connection, one per direction. When a
//! direction's source reaches EOF it shuts down its destination's write side
//! and ends; the other direction is left alone and may stay open until its
//! own source closes. Payload bytes are never inspected.

use geofwd_core::FwdResult;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// Dials the upstream and pumps bytes in both directions.
///
/// Cheap to clone; all clones share one active-relay gauge.
#[derive(Clone)]
pub struct RelayEngine {
    upstream: SocketAddr,
    active: Arc<AtomicUsize>,
}

/// Counts one relay as live until every copy task holding it has ended.
struct RelayGuard {
    counter: Arc<AtomicUsize>,
}

impl Drop for RelayGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::Relaxed);
    }
}

impl RelayEngine {
    pub fn new(upstream: SocketAddr) -> Self {
        Self {
            upstream,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn upstream(&self) -> SocketAddr {
        self.upstream
    }

    /// Relays currently holding at least one running copy task.
    ///
    /// `Relaxed` loads; for logging, not synchronisation.
    pub fn active_relays(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    fn acquire(&self) -> RelayGuard {
        self.active.fetch_add(1, Ordering::Relaxed);
        RelayGuard {
            counter: self.active.clone(),
        }
    }

    /// Dial the upstream and start both copy tasks.
    ///
    /// Returns once the tasks are spawned, not when the relay ends.
    ///
    /// # Errors
    ///
    /// The dial error. `client` is dropped and nothing is retried.
    pub async fn relay(&self, client: TcpStream, peer: SocketAddr) -> FwdResult<()> {
        let upstream = TcpStream::connect(self.upstream).await?;
        let _ = upstream.set_nodelay(true);
        let _ = client.set_nodelay(true);

        let guard = Arc::new(self.acquire());
        info!(
            peer = %peer,
            upstream = %self.upstream,
            active = self.active_relays(),
            "relay started"
        );

        let (client_read, client_write) = client.into_split();
        let (upstream_read, upstream_write) = upstream.into_split();

        let outbound = guard.clone();
        tokio::spawn(async move {
            let _guard = outbound;
            pipe(client_read, upstream_write, peer, "client->upstream").await;
        });
        tokio::spawn(async move {
            let _guard = guard;
            pipe(upstream_read, client_write, peer, "upstream->client").await;
        });
        Ok(())
    }
}

/// Copy `src` into `dst` until EOF or an I/O error, then shut `dst` down.
async fn pipe<R, W>(mut src: R, mut dst: W, peer: SocketAddr, direction: &'static str)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    match tokio::io::copy(&mut src, &mut dst).await {
        Ok(bytes) => debug!(peer = %peer, direction, bytes, "relay direction finished"),
        Err(e) => warn!(peer = %peer, direction, error = %e, "relay direction failed"),
    }
    let _ = dst.shutdown().await;
}
