use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use async_trait::async_trait;

/// Source of the control loop's delay signal `d`: the mean recent time a
/// server-side handler unit spent queued in the OS scheduler before running.
/// Treated as an external, OS-provided input; this trait is the seam a host
/// uses to plug in a platform-specific probe.
#[async_trait]
pub trait DelaySampler: Send + Sync {
	/// Returns the current delay estimate, in microseconds.
	async fn sample_delay_us(&self) -> u64;
}

/// Default sampler: measures the wall-clock gap between scheduling a
/// trivial `tokio::spawn` task and that task actually running. This is a
/// direct measurement of executor queueing delay, portable across any
/// platform the `tokio` multi-threaded runtime supports, and needs no
/// privileged access (unlike reading `/proc/self/schedstat`).
#[derive(Debug, Default)]
pub struct TokioSchedulerDelaySampler;

#[async_trait]
impl DelaySampler for TokioSchedulerDelaySampler {
	async fn sample_delay_us(&self) -> u64 {
		let start = Instant::now();
		let (tx, rx) = tokio::sync::oneshot::channel();
		tokio::spawn(async move {
			let _ = tx.send(());
		});
		let _ = rx.await;
		u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX)
	}
}

/// A sampler whose reading can be set by a test, used by end-to-end
/// scenarios to drive synthetic `d` values deterministically.
#[derive(Debug, Default)]
pub struct FixedDelaySampler {
	delay_us: AtomicU64,
}

impl FixedDelaySampler {
	#[must_use]
	pub fn new(delay_us: u64) -> Self {
		Self {
			delay_us: AtomicU64::new(delay_us),
		}
	}

	pub fn set(&self, delay_us: u64) {
		self.delay_us.store(delay_us, Ordering::Release);
	}
}

#[async_trait]
impl DelaySampler for FixedDelaySampler {
	async fn sample_delay_us(&self) -> u64 {
		self.delay_us.load(Ordering::Acquire)
	}
}
