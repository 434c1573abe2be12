use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

use crate::metadata::ClientId;

/// Per-client registration record: last reported demand, currently issued
/// credits, and the last time this client was seen on the serving path.
#[derive(Debug, Clone)]
pub struct ClientRecord {
	pub demand: u64,
	pub issued: u64,
	pub last_seen: Instant,
	pub reg_seq: u64,
}

/// Server-side per-client registry. Modeled on `ws-conn-manager`'s
/// `DashMap<String, ClientState>` registry: a sharded concurrent map gives
/// per-id locking with short critical sections, without a single global
/// mutex.
#[derive(Debug, Default)]
pub struct ClientRegistry {
	clients: DashMap<ClientId, ClientRecord>,
	reg_seq: AtomicU64,
}

impl ClientRegistry {
	#[must_use]
	pub fn new() -> Self {
		Self {
			clients: DashMap::new(),
			reg_seq: AtomicU64::new(0),
		}
	}

	/// Upserts `registry[id]` with a new demand reading and `last_seen = now`.
	/// Returns the client's currently issued credits from before this call
	/// updated the record, which the admission decision is based on.
	///
	/// A brand-new client is seeded with one bootstrap credit rather than
	/// zero: issuance is otherwise purely reactive to a prior response, so a
	/// never-before-seen id would have no way to ever clear admission on its
	/// first call.
	pub fn record_arrival(&self, id: &ClientId, demand: u64, now: Instant) -> u64 {
		let mut entry = self.clients.entry(id.clone()).or_insert_with(|| {
			let reg_seq = self.reg_seq.fetch_add(1, Ordering::Relaxed);
			ClientRecord {
				demand: 0,
				issued: 1,
				last_seen: now,
				reg_seq,
			}
		});
		let issued_before = entry.issued;
		entry.demand = demand;
		entry.last_seen = now;
		issued_before
	}

	/// Admits the current RPC by decrementing the client's issued credits by
	/// one, provided it has any. Returns whether admission succeeded.
	pub fn try_admit(&self, id: &ClientId) -> bool {
		match self.clients.get_mut(id) {
			Some(mut record) if record.issued > 0 => {
				record.issued -= 1;
				true
			}
			_ => false,
		}
	}

	/// Records the new issuance computed for this client, replacing the
	/// prior value.
	pub fn set_issued(&self, id: &ClientId, issued: u64) {
		if let Some(mut record) = self.clients.get_mut(id) {
			record.issued = issued;
		}
	}

	pub fn last_demand(&self, id: &ClientId) -> u64 {
		self.clients.get(id).map_or(0, |record| record.demand)
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.clients.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.clients.is_empty()
	}

	#[must_use]
	pub fn contains(&self, id: &ClientId) -> bool {
		self.clients.contains_key(id)
	}

	/// Removes every client whose `last_seen` predates `now - expiration`.
	/// Does *not* adjust `C_total` (the removed credits were already
	/// accounted for there).
	pub fn garbage_collect(&self, now: Instant, expiration: Duration) -> usize {
		if expiration.is_zero() {
			return 0;
		}
		let stale: Vec<ClientId> = self
			.clients
			.iter()
			.filter(|entry| now.saturating_duration_since(entry.last_seen) > expiration)
			.map(|entry| entry.key().clone())
			.collect();
		for id in &stale {
			self.clients.remove(id);
			debug!(client_id = %id, "garbage collected expired client registration");
		}
		stale.len()
	}
}
