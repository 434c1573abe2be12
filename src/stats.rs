#![allow(clippy::cast_possible_truncation)]

use std::sync::atomic::{AtomicU64, Ordering};

/// Observability counters, populated only when `BreakwaterConfig::track_credits`
/// is set. Modeled on `ws-connection::core::monitor::MonitorStats`: a plain
/// snapshot struct updated by atomics rather than a full metrics pipeline,
/// since wiring a metrics exporter is explicitly out of this core's scope.
#[derive(Debug, Default)]
pub struct Stats {
	enabled: bool,
	ticks_completed: AtomicU64,
	clients_expired: AtomicU64,
	admitted: AtomicU64,
	rejected_no_credits: AtomicU64,
	rejected_protocol: AtomicU64,
	client_queue_full: AtomicU64,
	client_expired_waits: AtomicU64,
	client_credits_restored: AtomicU64,
}

/// Point-in-time snapshot of [`Stats`], safe to hand out by value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
	pub ticks_completed: u64,
	pub clients_expired: u64,
	pub admitted: u64,
	pub rejected_no_credits: u64,
	pub rejected_protocol: u64,
	pub client_queue_full: u64,
	pub client_expired_waits: u64,
	pub client_credits_restored: u64,
}

impl Stats {
	#[must_use]
	pub fn new(enabled: bool) -> Self {
		Self { enabled, ..Self::default() }
	}

	pub fn record_tick(&self, clients_expired: usize) {
		if !self.enabled {
			return;
		}
		self.ticks_completed.fetch_add(1, Ordering::Relaxed);
		self.clients_expired.fetch_add(clients_expired as u64, Ordering::Relaxed);
	}

	pub fn record_admitted(&self) {
		if self.enabled {
			self.admitted.fetch_add(1, Ordering::Relaxed);
		}
	}

	pub fn record_rejected_no_credits(&self) {
		if self.enabled {
			self.rejected_no_credits.fetch_add(1, Ordering::Relaxed);
		}
	}

	pub fn record_rejected_protocol(&self) {
		if self.enabled {
			self.rejected_protocol.fetch_add(1, Ordering::Relaxed);
		}
	}

	pub fn record_client_queue_full(&self) {
		if self.enabled {
			self.client_queue_full.fetch_add(1, Ordering::Relaxed);
		}
	}

	pub fn record_client_expired_wait(&self) {
		if self.enabled {
			self.client_expired_waits.fetch_add(1, Ordering::Relaxed);
		}
	}

	pub fn record_client_credit_restored(&self) {
		if self.enabled {
			self.client_credits_restored.fetch_add(1, Ordering::Relaxed);
		}
	}

	#[must_use]
	pub fn snapshot(&self) -> StatsSnapshot {
		StatsSnapshot {
			ticks_completed: self.ticks_completed.load(Ordering::Relaxed),
			clients_expired: self.clients_expired.load(Ordering::Relaxed),
			admitted: self.admitted.load(Ordering::Relaxed),
			rejected_no_credits: self.rejected_no_credits.load(Ordering::Relaxed),
			rejected_protocol: self.rejected_protocol.load(Ordering::Relaxed),
			client_queue_full: self.client_queue_full.load(Ordering::Relaxed),
			client_expired_waits: self.client_expired_waits.load(Ordering::Relaxed),
			client_credits_restored: self.client_credits_restored.load(Ordering::Relaxed),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_disabled_stats_stay_zero() {
		let stats = Stats::new(false);
		stats.record_admitted();
		stats.record_tick(3);
		assert_eq!(stats.snapshot(), StatsSnapshot::default());
	}

	#[test]
	fn test_enabled_stats_accumulate() {
		let stats = Stats::new(true);
		stats.record_admitted();
		stats.record_admitted();
		stats.record_rejected_no_credits();
		stats.record_tick(2);

		let snapshot = stats.snapshot();
		assert_eq!(snapshot.admitted, 2);
		assert_eq!(snapshot.rejected_no_credits, 1);
		assert_eq!(snapshot.ticks_completed, 1);
		assert_eq!(snapshot.clients_expired, 2);
	}
}
