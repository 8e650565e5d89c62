//! Second-factor authentication: the provider seam, the Duo client, and the
//! cached gate that decides whether a live push is needed.

pub mod duo;
pub mod gate;
pub mod provider;

pub use duo::DuoClient;
pub use gate::{GateOutcome, SecondFactorGate};
pub use provider::PushProvider;
