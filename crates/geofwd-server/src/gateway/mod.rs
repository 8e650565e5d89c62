//! Gateway: admission and relaying for every accepted TCP connection.
//!
//! - **[`pipeline`]**: [`AdmissionPipeline`] turns a peer address into an
//!   [`AdmissionDecision`](geofwd_core::AdmissionDecision), consulting the
//!   prefix filter, geofence and second factor in a fixed order.
//! - **[`relay`]**: [`RelayEngine`] dials the upstream and copies bytes in
//!   both directions, tracking live relays with a gauge.
//! - **[`acceptor`]**: [`Acceptor`] owns the listener and the pipeline,
//!   admits connections serially and spawns a relay for each admitted one.
//!
//! ```text
//! accept -> AdmissionPipeline::decide -> DENIED: drop
//!                                     -> ESTABLISHED: spawn RelayEngine::relay
//!                                                       -> client->upstream task
//!                                                       -> upstream->client task
//! ```

pub mod acceptor;
pub mod pipeline;
pub mod relay;

pub use acceptor::Acceptor;
pub use pipeline::{AdmissionPipeline, AdmissionPolicy};
pub use relay::RelayEngine;
