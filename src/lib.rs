//! Receiver-driven, credit-based admission control for an RPC fabric.
//!
//! A server-side control loop watches a sampled queueing-delay signal and
//! grows or shrinks an aggregate credit pool (`C_total`) to keep that delay
//! near a target SLO. Callers are issued a share of the pool and may only
//! send as many outstanding RPCs as they currently hold credits for; a
//! client-side gate enforces that locally so overload is caught before a
//! request ever reaches the wire.
//!
//! [`Instance`] is the crate's single public entry point: one instance per
//! endpoint, holding whichever side(s) of the protocol apply to it.

pub mod client;
pub mod config;
pub mod controller;
pub mod error;
pub mod instance;
pub mod metadata;
pub mod registry;
pub mod sampler;
pub mod server;
pub mod stats;

pub use client::ClientGate;
pub use config::BreakwaterConfig;
pub use controller::CreditController;
pub use error::{BreakwaterError, Result};
pub use instance::Instance;
pub use metadata::{ClientId, Metadata};
pub use registry::ClientRegistry;
pub use sampler::{DelaySampler, FixedDelaySampler, TokioSchedulerDelaySampler};
pub use server::ServerState;
pub use stats::{Stats, StatsSnapshot};
