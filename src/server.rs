use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use crate::controller::CreditController;
use crate::error::{BreakwaterError, Result};
use crate::metadata::{decode_request, encode_response, Metadata};
use crate::registry::ClientRegistry;
use crate::stats::Stats;

/// Server-side state shared by every inbound RPC on this instance: the
/// per-client registry and the aggregate credit pool it is issued against.
#[derive(Debug)]
pub struct ServerState {
	pub registry: Arc<ClientRegistry>,
	pub controller: Arc<CreditController>,
	pub stats: Arc<Stats>,
}

impl ServerState {
	#[must_use]
	pub fn new(initial_credits: u64, track_credits: bool) -> Self {
		Self::with_stats(initial_credits, Arc::new(Stats::new(track_credits)))
	}

	/// As [`ServerState::new`], but sharing a pre-built [`Stats`] instead of
	/// allocating its own (used by [`crate::instance::Instance`] so the
	/// server and client sides of one instance report through one counter
	/// set).
	#[must_use]
	pub fn with_stats(initial_credits: u64, stats: Arc<Stats>) -> Self {
		Self {
			registry: Arc::new(ClientRegistry::new()),
			controller: Arc::new(CreditController::new(initial_credits)),
			stats,
		}
	}

	/// Server-side admission filter: validate, admit-or-reject, attach the
	/// new issuance, and invoke the handler.
	///
	/// # Errors
	///
	/// Returns [`BreakwaterError::InvalidArgument`] if the inbound metadata
	/// is missing `id`, or [`BreakwaterError::ResourceExhausted`] if the
	/// client has no issued credits left to admit this call.
	pub async fn server_intercept<Req, Resp, Fut>(&self, inbound: &Metadata, request: Req, handler: impl FnOnce(Req) -> Fut) -> Result<(Resp, Metadata)>
	where
		Fut: Future<Output = Result<Resp>>,
	{
		let (id, demand) = match decode_request(inbound) {
			Ok(parsed) => parsed,
			Err(err) => {
				self.stats.record_rejected_protocol();
				warn!(?err, "rejecting RPC with missing or malformed id metadata");
				return Err(err);
			}
		};

		let now = Instant::now();
		self.registry.record_arrival(&id, demand, now);

		if !self.registry.try_admit(&id) {
			self.stats.record_rejected_no_credits();
			debug!(client_id = %id, "rejecting RPC: no credits issued");
			return Err(BreakwaterError::no_credits());
		}
		self.stats.record_admitted();

		// Compute and attach the new issuance before invoking the handler,
		// so it reflects C_total at issuance time.
		let issuance = self.controller.issuance_for(demand);
		self.registry.set_issued(&id, issuance);
		let outbound = encode_response(issuance);

		debug!(client_id = %id, demand, issuance, "admitted RPC");
		let response = handler(request).await?;
		Ok((response, outbound))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::metadata::{encode_request, ClientId};

	async fn noop_handler(req: &'static str) -> Result<&'static str> {
		Ok(req)
	}

	#[tokio::test]
	async fn test_missing_id_rejected_as_invalid_argument() {
		let state = ServerState::new(10, false);
		let inbound = Metadata::new();

		let err = state.server_intercept(&inbound, "payload", noop_handler).await.unwrap_err();
		assert_eq!(err, BreakwaterError::missing_id());
	}

	#[tokio::test]
	async fn test_no_credits_rejected_as_resource_exhausted() {
		// An empty pool: the bootstrap credit admits the first call, but the
		// issuance it computes from `C_total == 0` is itself zero, so without
		// a control tick to replenish the pool the very next call has none left.
		let state = ServerState::new(0, false);
		let id = ClientId::from("client-a");
		let inbound = encode_request(&id, 1);

		state.server_intercept(&inbound, "payload", noop_handler).await.unwrap();
		let err = state.server_intercept(&inbound, "payload", noop_handler).await.unwrap_err();
		assert_eq!(err, BreakwaterError::no_credits());
	}

	#[tokio::test]
	async fn test_admits_when_credits_issued() {
		let state = ServerState::new(10, true);
		let id = ClientId::from("client-a");
		let inbound = encode_request(&id, 1);
		state.registry.set_issued(&id, 5);

		let (response, outbound) = state.server_intercept(&inbound, "payload", noop_handler).await.unwrap();
		assert_eq!(response, "payload");
		assert!(outbound.get("credits").is_some());
		assert_eq!(state.stats.snapshot().admitted, 1);
	}

	#[tokio::test]
	async fn test_handler_error_forwarded_unchanged() {
		let state = ServerState::new(10, false);
		let id = ClientId::from("client-a");
		let inbound = encode_request(&id, 1);
		state.registry.set_issued(&id, 5);

		async fn failing_handler(_req: &'static str) -> Result<&'static str> {
			Err(BreakwaterError::InvalidArgument("downstream failure".to_string()))
		}

		let err = state.server_intercept(&inbound, "payload", failing_handler).await.unwrap_err();
		assert_eq!(err, BreakwaterError::InvalidArgument("downstream failure".to_string()));
	}
}
