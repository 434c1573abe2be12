//! Black-box end-to-end scenarios exercised against the public
//! [`breakwater::Instance`] API, the way `ws-connection` splits unit tests
//! in `src/` from scenario tests under `tests/`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use breakwater::{BreakwaterConfig, BreakwaterError, ClientId, DelaySampler, FixedDelaySampler, Instance, Metadata};

async fn noop_handler(req: &'static str) -> breakwater::Result<&'static str> {
	Ok(req)
}

fn server_only(mut config: BreakwaterConfig, sampler: Arc<dyn DelaySampler>) -> Instance {
	config.server_side = true;
	Instance::init_with_sampler(config, sampler)
}

#[tokio::test]
async fn warm_path_succeeds_for_one_hundred_sequential_calls() {
	let config = BreakwaterConfig {
		initial_credits: 10,
		slo_us: 200,
		..BreakwaterConfig::test()
	};
	let sampler: Arc<dyn DelaySampler> = Arc::new(FixedDelaySampler::new(50));
	let instance = server_only(config, sampler);
	let id = ClientId::from("warm-client");

	for _ in 0..100 {
		let mut inbound = Metadata::default();
		inbound.insert("id", id.to_string());
		inbound.insert("demand", "1");

		let (response, outbound) = instance.server_intercept(&inbound, "payload", noop_handler).await.expect("warm path call must succeed");
		assert_eq!(response, "payload");
		assert!(outbound.get("credits").is_some());
	}
}

#[tokio::test]
async fn overload_shedding_decreases_c_total_and_admission_rate() {
	let config = BreakwaterConfig {
		initial_credits: 100,
		slo_us: 200,
		a_factor: 0.5,
		b_factor: 0.5,
		load_shedding: true,
		rtt_us: 2_000,
		..BreakwaterConfig::test()
	};
	let sampler = Arc::new(FixedDelaySampler::new(400));
	let dyn_sampler: Arc<dyn DelaySampler> = sampler.clone();
	let instance = server_only(config, dyn_sampler);

	let client_ids: Vec<ClientId> = (0..10).map(|i| ClientId::from(format!("client-{i}").as_str())).collect();

	let mut previous_c_total = instance.c_total().unwrap();
	let mut previous_admitted_fraction = 1.0_f64;

	for _round in 0..5 {
		// Let at least one control tick elapse between rounds.
		tokio::time::sleep(Duration::from_millis(5)).await;

		let mut admitted = 0usize;
		for id in &client_ids {
			let mut inbound = Metadata::default();
			inbound.insert("id", id.to_string());
			inbound.insert("demand", "1");
			if instance.server_intercept(&inbound, "payload", noop_handler).await.is_ok() {
				admitted += 1;
			}
		}

		let current_c_total = instance.c_total().unwrap();
		assert!(current_c_total <= previous_c_total, "C_total must not increase while shedding above SLO");
		previous_c_total = current_c_total;

		let admitted_fraction = admitted as f64 / client_ids.len() as f64;
		assert!(admitted_fraction <= previous_admitted_fraction + f64::EPSILON, "admission rate must not increase while shedding");
		previous_admitted_fraction = admitted_fraction;
	}
}

#[tokio::test(start_paused = true)]
async fn expiry_under_stall_fails_within_slack_of_configured_expiration() {
	let instance = Arc::new(Instance::init(BreakwaterConfig {
		server_side: false,
		client_expiration_us: 5_000,
		..BreakwaterConfig::test()
	}));

	async fn stalling_transport(_req: &'static str, _meta: Metadata) -> breakwater::Result<(&'static str, Metadata)> {
		std::future::pending::<()>().await;
		unreachable!()
	}

	// Consumes the lone bootstrap credit and never returns, so outgoing
	// credits stay at 0 for the duration of this test.
	let stalled = instance.clone();
	tokio::spawn(async move {
		let _ = stalled.client_intercept("first", stalling_transport).await;
	});
	tokio::task::yield_now().await;
	assert_eq!(instance.client_outgoing_credits(), 0);

	let start = Instant::now();
	let err = instance.client_intercept("second", stalling_transport).await.unwrap_err();
	assert_eq!(err, BreakwaterError::expired());
	let elapsed = start.elapsed();
	assert!(elapsed >= Duration::from_micros(5_000), "expired too early: {elapsed:?}");
	assert!(elapsed <= Duration::from_micros(5_500), "expired too late: {elapsed:?}");
}

#[tokio::test]
async fn credit_restoration_on_transport_failure() {
	let instance = Instance::init(BreakwaterConfig {
		server_side: false,
		credits_on_fail: true,
		..BreakwaterConfig::test()
	});
	assert_eq!(instance.client_outgoing_credits(), 1);

	async fn failing_transport(_req: &'static str, _meta: Metadata) -> breakwater::Result<(&'static str, Metadata)> {
		Err(BreakwaterError::ResourceExhausted("unavailable".to_string()))
	}

	let err = instance.client_intercept("hi", failing_transport).await.unwrap_err();
	assert!(matches!(err, BreakwaterError::ResourceExhausted(_)));
	assert_eq!(instance.client_outgoing_credits(), 1);
	assert_eq!(instance.stats().client_credits_restored, 1);
}

#[tokio::test]
async fn client_gc_removes_silent_clients_without_touching_c_total() {
	let config = BreakwaterConfig {
		client_expiration_us: 2_000,
		rtt_us: 1_000,
		slo_us: 200,
		load_shedding: false,
		..BreakwaterConfig::test()
	};
	// Above SLO with load shedding off: ticks run (so GC runs) but the
	// "else: unchanged" branch of the AIMD rule keeps C_total fixed, so any
	// drop we observe is attributable only to GC, not concurrent AIMD math.
	let sampler: Arc<dyn DelaySampler> = Arc::new(FixedDelaySampler::new(1_000));
	let instance = server_only(config, sampler);

	let id = ClientId::from("lone-client");
	let mut inbound = Metadata::default();
	inbound.insert("id", id.to_string());
	inbound.insert("demand", "1");
	instance.server_intercept(&inbound, "payload", noop_handler).await.unwrap();
	assert_eq!(instance.registry_len(), Some(1));

	let c_total_before = instance.c_total().unwrap();

	// Go silent well past client_expiration_us and let a control tick run.
	tokio::time::sleep(Duration::from_millis(10)).await;

	assert_eq!(instance.registry_len(), Some(0), "expired client must be garbage collected");
	assert!((instance.c_total().unwrap() - c_total_before).abs() < f64::EPSILON, "GC must not mutate C_total");
}

#[tokio::test]
async fn protocol_violation_missing_id_is_rejected_before_handler_runs() {
	let instance = server_only(BreakwaterConfig::test(), Arc::new(FixedDelaySampler::new(0)));
	let inbound = Metadata::default();

	async fn panicking_handler(_req: &'static str) -> breakwater::Result<&'static str> {
		panic!("handler must not run for a protocol violation");
	}

	let err = instance.server_intercept(&inbound, "payload", panicking_handler).await.unwrap_err();
	assert_eq!(err, BreakwaterError::missing_id());
}
