#![allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::BreakwaterConfig;
use crate::registry::ClientRegistry;
use crate::sampler::DelaySampler;
use crate::stats::Stats;

/// Server-side aggregate credit pool and its AIMD update law.
///
/// `c_total` never crosses an `.await` while locked, so a plain
/// `std::sync::Mutex` is the right primitive here.
#[derive(Debug)]
pub struct CreditController {
	c_total: Mutex<f64>,
	num_clients: AtomicUsize,
}

impl CreditController {
	#[must_use]
	pub fn new(initial_credits: u64) -> Self {
		Self {
			c_total: Mutex::new(initial_credits as f64),
			num_clients: AtomicUsize::new(0),
		}
	}

	#[must_use]
	pub fn c_total(&self) -> f64 {
		*self.c_total.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
	}

	#[must_use]
	pub fn num_clients(&self) -> usize {
		self.num_clients.load(Ordering::Acquire)
	}

	/// One AIMD update. `d` is the sampled delay signal in microseconds.
	fn tick_credit_pool(&self, config: &BreakwaterConfig, d_us: u64) {
		let overcommit = self.num_clients().max(1) as f64;
		let mut c_total = self.c_total.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

		if d_us <= config.slo_us {
			*c_total += config.a_factor * overcommit;
		} else if config.load_shedding {
			let slo = config.slo_us as f64;
			let d = d_us as f64;
			let decreased = *c_total * (1.0 - config.b_factor * (d - slo) / slo);
			*c_total = decreased.max(overcommit);
		}
		*c_total = c_total.max(0.0);
	}

	/// Runs one control-loop tick: sample the delay signal, update `C_total`,
	/// then garbage-collect stale registrations and refresh `num_clients`
	/// for the next tick's issuance math.
	async fn tick(&self, config: &BreakwaterConfig, registry: &ClientRegistry, sampler: &dyn DelaySampler, stats: &Stats) {
		let d_us = sampler.sample_delay_us().await;
		self.tick_credit_pool(config, d_us);

		let expiration = Duration::from_micros(config.client_expiration_us);
		let removed = registry.garbage_collect(Instant::now(), expiration);
		self.num_clients.store(registry.len(), Ordering::Release);
		stats.record_tick(removed);

		debug!(
			c_total = self.c_total(),
			num_clients = self.num_clients(),
			d_us,
			removed,
			"credit controller tick"
		);
	}

	/// Per-client issuance: `share = max(1, floor(C_total / max(1,
	/// num_clients)))`, biased upward to the client's last reported demand,
	/// capped at `C_total` (so an empty pool issues `0`, not a manufactured
	/// credit).
	#[must_use]
	pub fn issuance_for(&self, demand: u64) -> u64 {
		let c_total = self.c_total();
		let overcommit = self.num_clients().max(1) as f64;
		let share = (c_total / overcommit).floor().max(1.0);
		let biased = share.max(demand as f64);
		biased.min(c_total) as u64
	}
}

/// Spawns the server-side control loop, the sole writer of `C_total`.
/// Ticks on an interval and exits on cancellation, `tokio::select!`-style.
pub fn spawn_control_loop(
	config: BreakwaterConfig,
	controller: std::sync::Arc<CreditController>,
	registry: std::sync::Arc<ClientRegistry>,
	sampler: std::sync::Arc<dyn DelaySampler>,
	stats: std::sync::Arc<Stats>,
	shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
	tokio::spawn(async move {
		let mut interval = tokio::time::interval(Duration::from_micros(config.rtt_us.max(1)));
		info!(rtt_us = config.rtt_us, slo_us = config.slo_us, "credit controller starting");

		loop {
			tokio::select! {
				() = shutdown.cancelled() => {
					info!("credit controller shutting down");
					break;
				}
				_ = interval.tick() => {
					controller.tick(&config, &registry, sampler.as_ref(), &stats).await;
				}
			}
		}
	})
}
