use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::client::ClientGate;
use crate::config::BreakwaterConfig;
use crate::controller::spawn_control_loop;
use crate::error::Result;
use crate::metadata::Metadata;
use crate::sampler::{DelaySampler, TokioSchedulerDelaySampler};
use crate::server::ServerState;
use crate::stats::StatsSnapshot;

/// A single admission-control endpoint: the server-side credit controller and
/// admission filter when `config.server_side` is set, and always the
/// client-side outgoing gate used for calls this process places on others.
///
/// Mirrors `ws_connection::core::connection::Connection`'s role as the one
/// owning handle apps hold onto: construction wires up shared state and
/// spawns background work, `Drop` tears it down.
#[derive(Debug)]
pub struct Instance {
	config: BreakwaterConfig,
	server: Option<ServerState>,
	client: ClientGate,
	stats: Arc<crate::stats::Stats>,
	shutdown: CancellationToken,
	control_loop: Option<tokio::task::JoinHandle<()>>,
}

impl Instance {
	/// Builds an [`Instance`] from `config`. If `config.server_side` is set,
	/// spawns the credit-controller control loop using the default
	/// [`TokioSchedulerDelaySampler`].
	#[must_use]
	pub fn init(config: BreakwaterConfig) -> Self {
		Self::init_with_sampler(config, Arc::new(TokioSchedulerDelaySampler))
	}

	/// As [`Instance::init`], but with an explicit [`DelaySampler`] (the seam
	/// tests use to inject [`crate::sampler::FixedDelaySampler`] instead of
	/// measuring real scheduler latency).
	#[must_use]
	pub fn init_with_sampler(config: BreakwaterConfig, sampler: Arc<dyn DelaySampler>) -> Self {
		let shutdown = CancellationToken::new();
		let stats = Arc::new(crate::stats::Stats::new(config.track_credits));
		let client = ClientGate::new(config.pending_queue_capacity, config.client_expiration_us, config.credits_on_fail, stats.clone());

		let (server, control_loop) = if config.server_side {
			let server = ServerState::with_stats(config.initial_credits, stats.clone());
			let handle = spawn_control_loop(config.clone(), server.controller.clone(), server.registry.clone(), sampler, stats.clone(), shutdown.clone());
			(Some(server), Some(handle))
		} else {
			(None, None)
		};

		info!(server_side = config.server_side, "breakwater instance initialized");
		Self {
			config,
			server,
			client,
			stats,
			shutdown,
			control_loop,
		}
	}

	#[must_use]
	pub const fn config(&self) -> &BreakwaterConfig {
		&self.config
	}

	/// Server-side admission filter. Panics-free no-op if this instance was
	/// built without `server_side`; callers that only use the client gate
	/// should never reach this path.
	///
	/// # Errors
	///
	/// See [`ServerState::server_intercept`].
	pub async fn server_intercept<Req, Resp, Fut>(&self, inbound: &Metadata, request: Req, handler: impl FnOnce(Req) -> Fut) -> Result<(Resp, Metadata)>
	where
		Fut: Future<Output = Result<Resp>>,
	{
		match &self.server {
			Some(server) => server.server_intercept(inbound, request, handler).await,
			None => handler(request).await.map(|response| (response, Metadata::new())),
		}
	}

	/// Client-side outgoing gate.
	///
	/// # Errors
	///
	/// See [`ClientGate::client_intercept`].
	pub async fn client_intercept<Req, Resp, Fut>(&self, request: Req, transport: impl FnOnce(Req, Metadata) -> Fut) -> Result<Resp>
	where
		Fut: Future<Output = Result<(Resp, Metadata)>>,
	{
		self.client.client_intercept(request, transport).await
	}

	/// Snapshot of the observability counters (populated only when
	/// `config.track_credits` is set). Covers both the client-side gate and,
	/// when present, the server-side admission filter and control loop.
	#[must_use]
	pub fn stats(&self) -> StatsSnapshot {
		self.stats.snapshot()
	}

	#[must_use]
	pub fn client_outgoing_credits(&self) -> i64 {
		self.client.outgoing_credits()
	}

	#[must_use]
	pub fn c_total(&self) -> Option<f64> {
		self.server.as_ref().map(|server| server.controller.c_total())
	}

	/// Size of the server-side client registry, or `None` on a client-only
	/// instance. Exposed for observing garbage collection from outside the
	/// crate without reaching into private server state.
	#[must_use]
	pub fn registry_len(&self) -> Option<usize> {
		self.server.as_ref().map(|server| server.registry.len())
	}
}

impl Drop for Instance {
	fn drop(&mut self) {
		self.shutdown.cancel();
		if let Some(handle) = self.control_loop.take() {
			handle.abort();
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::metadata::{encode_request, ClientId};
	use crate::sampler::FixedDelaySampler;

	async fn noop_handler(req: &'static str) -> Result<&'static str> {
		Ok(req)
	}

	#[tokio::test]
	async fn test_client_only_instance_has_no_control_loop() {
		let instance = Instance::init(BreakwaterConfig {
			server_side: false,
			..BreakwaterConfig::test()
		});
		assert!(instance.c_total().is_none());
		assert!(instance.control_loop.is_none());
	}

	#[tokio::test]
	async fn test_server_side_instance_spawns_control_loop() {
		let sampler: Arc<dyn DelaySampler> = Arc::new(FixedDelaySampler::new(0));
		let instance = Instance::init_with_sampler(BreakwaterConfig::test(), sampler);
		assert!(instance.c_total().is_some());
		assert!(instance.control_loop.is_some());
	}

	#[tokio::test]
	async fn test_server_intercept_delegates_to_server_state() {
		// Empty pool: the bootstrap credit admits the first call, but with
		// `C_total == 0` the issuance it computes is itself zero, so the
		// second call has nothing left and must be rejected.
		let sampler: Arc<dyn DelaySampler> = Arc::new(FixedDelaySampler::new(0));
		let config = BreakwaterConfig {
			initial_credits: 0,
			..BreakwaterConfig::test()
		};
		let instance = Instance::init_with_sampler(config, sampler);
		let id = ClientId::from("client-a");
		let inbound = encode_request(&id, 1);

		instance.server_intercept(&inbound, "payload", noop_handler).await.unwrap();
		let err = instance.server_intercept(&inbound, "payload", noop_handler).await.unwrap_err();
		assert!(matches!(err, crate::error::BreakwaterError::ResourceExhausted(_)));
	}

	#[tokio::test]
	async fn test_client_only_server_intercept_is_transparent() {
		let instance = Instance::init(BreakwaterConfig {
			server_side: false,
			..BreakwaterConfig::test()
		});
		let inbound = Metadata::new();
		let (response, _) = instance.server_intercept(&inbound, "payload", noop_handler).await.unwrap();
		assert_eq!(response, "payload");
	}

	#[tokio::test]
	async fn test_drop_cancels_control_loop() {
		let sampler: Arc<dyn DelaySampler> = Arc::new(FixedDelaySampler::new(0));
		let instance = Instance::init_with_sampler(BreakwaterConfig::test(), sampler);
		let token = instance.shutdown.clone();
		drop(instance);
		assert!(token.is_cancelled());
	}
}
