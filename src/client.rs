#![allow(clippy::cast_possible_truncation)]

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::{Notify, Semaphore};
use tracing::{debug, warn};

use crate::error::{BreakwaterError, Result};
use crate::metadata::{decode_response, encode_request, ClientId, Metadata};
use crate::stats::Stats;

/// Client-side outgoing gate: a locally tracked credit counter, a bounded
/// pending-request queue, and a binary wake-up signal.
///
/// Grounded on `ws-conn-manager::ConnectionGuard`'s admission pattern (a
/// `Semaphore` for the bounded queue and an async wake primitive for staged
/// waiters), adapted from per-client connection slots to a single shared
/// credit counter, since here there is exactly one gate per downstream
/// server rather than one slot pool per connecting client.
#[derive(Debug)]
pub struct ClientGate {
	id: ClientId,
	outgoing_credits: Mutex<i64>,
	no_credit_blocker: Notify,
	queue_slots: Semaphore,
	queue_depth: AtomicUsize,
	client_expiration: Option<Duration>,
	credits_on_fail: bool,
	stats: Arc<Stats>,
}

impl ClientGate {
	#[must_use]
	pub fn new(pending_queue_capacity: usize, client_expiration_us: u64, credits_on_fail: bool, stats: Arc<Stats>) -> Self {
		Self {
			id: ClientId::new(),
			// Bootstrapped with one credit so the very first send on a fresh
			// instance doesn't deadlock waiting for a grant it can only
			// receive by sending.
			outgoing_credits: Mutex::new(1),
			no_credit_blocker: Notify::new(),
			queue_slots: Semaphore::new(pending_queue_capacity),
			queue_depth: AtomicUsize::new(0),
			client_expiration: (client_expiration_us > 0).then(|| Duration::from_micros(client_expiration_us)),
			credits_on_fail,
			stats,
		}
	}

	#[must_use]
	pub fn id(&self) -> &ClientId {
		&self.id
	}

	#[must_use]
	pub fn outgoing_credits(&self) -> i64 {
		*self.outgoing_credits.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
	}

	/// Client-side outgoing gate.
	///
	/// # Errors
	///
	/// Returns [`BreakwaterError::ResourceExhausted`] if the local queue is
	/// full, or if the wait for a credit exceeds `client_expiration_us`.
	/// Otherwise forwards whatever `transport` itself returns.
	pub async fn client_intercept<Req, Resp, Fut>(&self, request: Req, transport: impl FnOnce(Req, Metadata) -> Fut) -> Result<Resp>
	where
		Fut: Future<Output = Result<(Resp, Metadata)>>,
	{
		// Bounded local queue.
		let permit = match self.queue_slots.try_acquire() {
			Ok(permit) => permit,
			Err(_) => {
				self.stats.record_client_queue_full();
				return Err(BreakwaterError::queue_full());
			}
		};
		self.queue_depth.fetch_add(1, Ordering::AcqRel);

		// Wait for a credit, honoring client_expiration_us.
		if let Err(err) = self.wait_for_credit().await {
			self.queue_depth.fetch_sub(1, Ordering::AcqRel);
			drop(permit);
			// Re-signal so the next waiter isn't starved by our exit.
			self.no_credit_blocker.notify_one();
			return Err(err);
		}

		// Advisory demand snapshot (still counts this request).
		let demand = self.queue_depth.load(Ordering::Acquire) as u64;
		let outbound = encode_request(&self.id, demand);

		// Dequeue.
		self.queue_depth.fetch_sub(1, Ordering::AcqRel);
		drop(permit);

		debug!(client_id = %self.id, demand, "sending RPC");

		// Invoke transport and ingest the reply's credit grant.
		match transport(request, outbound).await {
			Ok((response, inbound)) => {
				match decode_response(&inbound) {
					Some(v) => self.replace_credits(v.max(1)),
					None => self.floor_credits_at_one(),
				}
				Ok(response)
			}
			Err(err) => {
				if self.credits_on_fail {
					self.restore_one_credit();
					self.stats.record_client_credit_restored();
				}
				Err(err)
			}
		}
	}

	/// Loops waiting on the binary wake signal until a credit is available
	/// or the configured expiration elapses.
	///
	/// Registers interest via `Notify::notified()` *before* re-checking the
	/// credit counter, per `tokio::sync::Notify`'s documented pattern, so a
	/// grant delivered between the check and the await is never lost.
	async fn wait_for_credit(&self) -> Result<()> {
		let deadline = self.client_expiration.map(|expiration| Instant::now() + expiration);

		loop {
			let notified = self.no_credit_blocker.notified();

			if self.try_take_credit() {
				return Ok(());
			}

			match deadline {
				None => notified.await,
				Some(deadline) => {
					let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
						self.stats.record_client_expired_wait();
						return Err(BreakwaterError::expired());
					};
					if tokio::time::timeout(remaining, notified).await.is_err() {
						self.stats.record_client_expired_wait();
						return Err(BreakwaterError::expired());
					}
				}
			}
		}
	}

	/// Atomic read-decrement-cascade, pulled out so the wait loop above can
	/// retry it after every wake-up.
	fn try_take_credit(&self) -> bool {
		let mut credits = self.outgoing_credits.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
		if *credits > 0 {
			*credits -= 1;
			let remainder = *credits;
			drop(credits);
			if remainder > 0 {
				// Cascade wake: drain the queue without waiting for a fresh grant.
				self.no_credit_blocker.notify_one();
			}
			true
		} else {
			false
		}
	}

	fn replace_credits(&self, value: u64) {
		let mut credits = self.outgoing_credits.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
		*credits = i64::try_from(value).unwrap_or(i64::MAX);
		drop(credits);
		self.no_credit_blocker.notify_one();
	}

	fn floor_credits_at_one(&self) {
		let mut credits = self.outgoing_credits.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
		if *credits < 1 {
			*credits = 1;
		}
		drop(credits);
		self.no_credit_blocker.notify_one();
	}

	fn restore_one_credit(&self) {
		let mut credits = self.outgoing_credits.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
		*credits += 1;
		drop(credits);
		self.no_credit_blocker.notify_one();
		warn!(client_id = %self.id, "restored credit after transport failure");
	}
}
