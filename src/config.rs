use clap::Parser;
use serde::{Deserialize, Serialize};

/// Instance configuration, immutable for the lifetime of an [`Instance`](crate::Instance).
///
/// The server-side credit controller, the server-side admission filter, and
/// the client-side outgoing gate all read from the same frozen
/// `BreakwaterConfig`.
#[derive(Parser, Clone, Debug, Serialize, Deserialize)]
#[command(author, version, about, long_about = None)]
pub struct BreakwaterConfig {
	/// Target scheduler-queueing delay, in microseconds.
	#[arg(long, env = "BREAKWATER_SLO_US", default_value = "200")]
	pub slo_us: u64,

	/// Control-loop tick period, in microseconds. Also the assumed round-trip time.
	#[arg(long, env = "BREAKWATER_RTT_US", default_value = "1000")]
	pub rtt_us: u64,

	/// Bootstrap value of the aggregate credit pool.
	#[arg(long, env = "BREAKWATER_INITIAL_CREDITS", default_value = "100")]
	pub initial_credits: u64,

	/// Max time, in microseconds, a client-side request may wait for a credit
	/// before being dropped. `0` disables expiration.
	#[arg(long, env = "BREAKWATER_CLIENT_EXPIRATION_US", default_value = "100000")]
	pub client_expiration_us: u64,

	/// Additive-increase coefficient.
	#[arg(long, env = "BREAKWATER_A_FACTOR", default_value = "1.0")]
	pub a_factor: f64,

	/// Multiplicative-decrease coefficient.
	#[arg(long, env = "BREAKWATER_B_FACTOR", default_value = "0.5")]
	pub b_factor: f64,

	/// Enables multiplicative-decrease credit shedding when the measured delay
	/// exceeds `slo_us`.
	#[arg(long, env = "BREAKWATER_LOAD_SHEDDING")]
	pub load_shedding: bool,

	/// Whether this instance owns the control loop (server side of an
	/// endpoint) or only the outgoing gate (client side).
	#[arg(long, env = "BREAKWATER_SERVER_SIDE")]
	pub server_side: bool,

	/// Enables the observability counters exposed via `Instance::stats`.
	#[arg(long, env = "BREAKWATER_TRACK_CREDITS")]
	pub track_credits: bool,

	/// Whether a client-side transport failure restores the credit consumed
	/// for the attempt.
	#[arg(long, env = "BREAKWATER_CREDITS_ON_FAIL")]
	pub credits_on_fail: bool,

	/// Capacity of the client-side pending-outgoing queue.
	#[arg(long, env = "BREAKWATER_PENDING_QUEUE_CAPACITY", default_value = "50")]
	pub pending_queue_capacity: usize,
}

impl Default for BreakwaterConfig {
	fn default() -> Self {
		Self {
			slo_us: 200,
			rtt_us: 1_000,
			initial_credits: 100,
			client_expiration_us: 100_000,
			a_factor: 1.0,
			b_factor: 0.5,
			load_shedding: false,
			server_side: false,
			track_credits: false,
			credits_on_fail: false,
			pending_queue_capacity: 50,
		}
	}
}

impl BreakwaterConfig {
	#[must_use]
	pub fn new() -> Self {
		Self::parse()
	}

	/// Fast-ticking configuration for tests: microsecond fields are kept but
	/// scaled down so scenario tests finish in well under a second.
	#[cfg(test)]
	#[must_use]
	pub fn test() -> Self {
		Self {
			slo_us: 200,
			rtt_us: 2_000,
			initial_credits: 10,
			client_expiration_us: 20_000,
			a_factor: 1.0,
			b_factor: 0.5,
			load_shedding: false,
			server_side: true,
			track_credits: true,
			credits_on_fail: false,
			pending_queue_capacity: 50,
		}
	}
}
