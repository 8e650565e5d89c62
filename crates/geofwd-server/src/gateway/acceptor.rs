//! The accept loop.
//!
//! Admission runs inline on the accepting task, one connection at a time;
//! only admitted connections are handed to a spawned relay task.

use super::pipeline::AdmissionPipeline;
use super::relay::RelayEngine;
use crate::auth::PushProvider;
use crate::geoip::GeoLocator;
use geofwd_core::{FwdError, FwdResult};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, info_span, warn, Instrument};

pub struct Acceptor<G, P> {
    listener: TcpListener,
    pipeline: AdmissionPipeline<G, P>,
    relay: RelayEngine,
}

impl<G: GeoLocator, P: PushProvider> Acceptor<G, P> {
    /// Bind the listen address.
    ///
    /// # Errors
    ///
    /// [`FwdError::Io`] when the address cannot be bound.
    pub async fn bind(
        listen: SocketAddr,
        pipeline: AdmissionPipeline<G, P>,
        relay: RelayEngine,
    ) -> FwdResult<Self> {
        let listener = TcpListener::bind(listen).await?;
        Ok(Self {
            listener,
            pipeline,
            relay,
        })
    }

    pub fn local_addr(&self) -> FwdResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept and admit connections until `accept` itself fails.
    ///
    /// # Errors
    ///
    /// The accept error; the listener is unusable after it.
    pub async fn run(&mut self) -> FwdResult<()> {
        loop {
            let (stream, peer) = self
                .listener
                .accept()
                .await
                .map_err(|e| FwdError::Other(format!("accept failed: {e}")))?;
            self.handle(stream, peer)
                .instrument(info_span!("conn", peer = %peer))
                .await;
        }
    }

    async fn handle(&mut self, stream: TcpStream, peer: SocketAddr) {
        let decision = self.pipeline.decide(peer.ip()).await;

        if !decision.is_admitted() {
            warn!(reason = decision.reason.code(), "{decision}");
            return;
        }
        info!(reason = decision.reason.code(), "{decision}");

        let relay = self.relay.clone();
        tokio::spawn(
            async move {
                if let Err(e) = relay.relay(stream, peer).await {
                    warn!(upstream = %relay.upstream(), error = %e, "upstream dial failed");
                }
            }
            .instrument(info_span!("relay", peer = %peer)),
        );
    }
}
