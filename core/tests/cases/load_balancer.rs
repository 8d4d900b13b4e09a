use crate::common::TestHarness;
use lbsim_core::{
    BalancingStrategy, Bounds, LoadBalancerConfig, SimError, Simulation, SimulationConfig,
};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

#[test]
fn test_generates_at_configured_rate() {
    let mut h = TestHarness::new();
    let config = LoadBalancerConfig {
        rps: 10.0,
        rps_variance: 0.0,
        ..Default::default()
    };
    let lb = h.add_lb(config, BalancingStrategy::RoundRobin);
    let server = h.add_server(100.0, 10);
    h.connect(lb, server);

    h.run_for(1000.0);
    assert_eq!(h.sim.load_balancer(lb).unwrap().sent, 10);
}

#[test]
fn test_rate_jitter_stays_within_variance() {
    let mut h = TestHarness::with_seed(5);
    let config = LoadBalancerConfig {
        rps: 20.0,
        rps_variance: 0.5,
        ..Default::default()
    };
    let lb = h.add_lb(config, BalancingStrategy::RoundRobin);
    let server = h.add_server(100.0, 10);
    h.connect(lb, server);

    h.run_for(10_000.0);
    // Gaps between 25ms and 75ms.
    let sent = h.sim.load_balancer(lb).unwrap().sent;
    assert!((134..=401).contains(&sent), "sent {sent}");
}

#[test]
fn test_zero_rps_generates_nothing() {
    let mut h = TestHarness::new();
    let lb = h.add_manual_lb(10.0, BalancingStrategy::RoundRobin);
    let server = h.add_server(1.0, 10);
    h.connect(lb, server);
    h.run_for(500.0);
    assert_eq!(h.sim.load_balancer(lb).unwrap().sent, 0);
}

#[test]
fn test_no_servers_is_a_no_op() {
    let mut h = TestHarness::new();
    let lb = h.add_lb(LoadBalancerConfig::default(), BalancingStrategy::LeastConnections);
    assert_eq!(h.sim.send_request(lb).unwrap(), None);
    h.run_for(1000.0);
    assert_eq!(h.sim.load_balancer(lb).unwrap().sent, 0);
    assert_eq!(h.sim.live_count(), 1);
    assert!(h.finished().is_empty());
}

#[test]
fn test_round_robin_end_to_end() {
    let mut h = TestHarness::new();
    let lb = h.add_manual_lb(1.0, BalancingStrategy::RoundRobin);
    let servers: Vec<u64> = (0..3).map(|_| h.add_server(10.0, 10)).collect();
    for &s in &servers {
        h.connect(lb, s);
    }
    let picks: Vec<u64> = (0..6)
        .map(|_| {
            let id = h.send(lb);
            h.destination_of(id)
        })
        .collect();
    let expected: Vec<u64> = servers.iter().chain(servers.iter()).copied().collect();
    assert_eq!(picks, expected);
}

fn loaded_pair(h: &mut TestHarness) -> (u64, u64, u64) {
    let lb = h.add_manual_lb(100.0, BalancingStrategy::RoundRobin);
    let a = h.add_server(0.001, 10);
    let b = h.add_server(0.001, 10);
    h.connect(lb, a);
    h.connect(lb, b);
    for _ in 0..3 {
        h.send(lb);
    }
    (lb, a, b)
}

#[test]
fn test_swapped_strategy_recovers_connection_counts() {
    for strategy in [
        BalancingStrategy::LeastConnections,
        BalancingStrategy::PeakEwma,
    ] {
        let mut h = TestHarness::new();
        let (lb, a, b) = loaded_pair(&mut h);
        assert_eq!(h.sim.connection_counts(), HashMap::from([(a, 2), (b, 1)]));

        h.sim.set_strategy(lb, strategy).unwrap();
        assert_eq!(h.sim.load_balancer(lb).unwrap().strategy_name(), strategy.name());

        let next = h.send(lb);
        assert_eq!(h.destination_of(next), b, "{strategy} must see a's backlog");
    }
}

#[test]
fn test_set_strategy_by_name() {
    let mut h = TestHarness::new();
    let lb = h.add_manual_lb(1.0, BalancingStrategy::RoundRobin);
    h.sim.set_strategy_by_name(lb, "weighted-random").unwrap();
    assert_eq!(h.sim.load_balancer(lb).unwrap().strategy_name(), "weighted-random");

    let err = h.sim.set_strategy_by_name(lb, "fastest").unwrap_err();
    assert!(matches!(err, SimError::UnknownAlgorithm { .. }));
    assert_eq!(h.sim.load_balancer(lb).unwrap().strategy_name(), "weighted-random");
}

#[test]
fn test_feedback_reaches_strategy_active_at_completion() {
    let mut h = TestHarness::new();
    let lb = h.add_manual_lb(5.0, BalancingStrategy::RoundRobin);
    let server = h.add_server(1.0, 10);
    h.connect(lb, server);
    h.send(lb);

    h.sim
        .set_strategy(lb, BalancingStrategy::DynamicWeightedRoundRobin)
        .unwrap();
    assert_eq!(h.sim.load_balancer(lb).unwrap().server_label(server), None);

    h.run_for(5.0);
    assert_eq!(h.served(), 1);
    assert_eq!(
        h.sim.load_balancer(lb).unwrap().server_label(server).as_deref(),
        Some("0.0s")
    );

    h.sim.set_strategy(lb, BalancingStrategy::RoundRobin).unwrap();
    assert_eq!(h.sim.load_balancer(lb).unwrap().server_label(server), None);
}

#[test]
fn test_shared_servers_across_load_balancers() {
    let config = SimulationConfig {
        load_balancers: 2,
        num_servers: 3,
        seed: Some(11),
        ..Default::default()
    };
    let sim = Simulation::from_config(&config).unwrap();
    let lbs = sim.load_balancer_ids();
    assert_eq!(lbs.len(), 2);
    let servers = sim.server_ids();
    assert_eq!(servers.len(), 3);
    for lb in lbs {
        assert_eq!(sim.load_balancer(lb).unwrap().servers(), servers.as_slice());
    }
}

#[test]
fn test_observers_only_see_their_own_requests() {
    let mut h = TestHarness::new();
    let mine = h.add_manual_lb(1.0, BalancingStrategy::RoundRobin);
    let quiet = LoadBalancerConfig {
        rps: 0.0,
        ..Default::default()
    };
    let other = h
        .sim
        .add_load_balancer("Other", quiet, BalancingStrategy::RoundRobin)
        .unwrap();
    let server = h.add_server(100.0, 10);
    h.connect(mine, server);
    h.connect(other, server);

    let other_seen = Rc::new(RefCell::new(0));
    let counter = Rc::clone(&other_seen);
    h.sim
        .on_request_destroyed(other, move |_| *counter.borrow_mut() += 1)
        .unwrap();

    h.send(mine);
    h.send(mine);
    h.sim.send_request(other).unwrap();
    h.run_for(5.0);

    assert_eq!(h.finished().len(), 2);
    assert_eq!(*other_seen.borrow(), 1);
}

#[test]
fn test_live_reconfiguration() {
    let config = SimulationConfig {
        num_servers: 2,
        seed: Some(3),
        ..Default::default()
    };
    let mut sim = Simulation::from_config(&config).unwrap();
    let lb = sim.load_balancer_ids()[0];

    sim.set_rps(lb, 50.0).unwrap();
    sim.set_rps_variance(lb, 0.25).unwrap();
    sim.set_request_cost(lb, Bounds::new(5.0, 20.0)).unwrap();
    let cfg = &sim.load_balancer(lb).unwrap().config;
    assert_eq!(cfg.rps, 50.0);
    assert_eq!(cfg.rps_variance, 0.25);
    assert_eq!(cfg.request_cost, Bounds::new(5.0, 20.0));

    assert!(sim.set_rps(lb, -1.0).is_err());
    assert!(sim.set_rps_variance(lb, 1.5).is_err());
    assert!(sim.set_request_cost(lb, Bounds::new(10.0, 1.0)).is_err());

    let powers = sim.set_server_power(Bounds::new(2.0, 5.0)).unwrap();
    assert_eq!(powers.len(), 2);
    assert!(powers.iter().all(|p| (2.0..5.0).contains(p)));
    for (id, power) in sim.server_ids().into_iter().zip(&powers) {
        assert_eq!(sim.server(id).unwrap().power(), *power);
    }

    sim.set_num_servers(4).unwrap();
    assert_eq!(sim.server_ids().len(), 4);
    assert_eq!(sim.load_balancer(lb).unwrap().servers().len(), 4);

    sim.set_num_servers(1).unwrap();
    assert_eq!(sim.server_ids().len(), 1);
    assert_eq!(sim.load_balancer(lb).unwrap().servers().len(), 1);

    sim.set_num_servers(0).unwrap();
    assert!(sim.set_num_servers(2).is_err());
}

#[test]
fn test_bad_ranges_rejected_at_runtime() {
    let mut h = TestHarness::new();
    let lb = h.add_manual_lb(10.0, BalancingStrategy::RoundRobin);
    let server = h.add_server(1.0, 5);
    h.connect(lb, server);

    let bad = [
        Bounds::new(-2.0, -2.0),
        Bounds::new(-1.0, 3.0),
        Bounds::new(1.0, f64::INFINITY),
        Bounds::new(f64::NAN, 2.0),
        Bounds::new(1.0, f64::NAN),
    ];
    for range in bad {
        assert!(
            matches!(h.sim.set_request_cost(lb, range), Err(SimError::InvalidArgument { .. })),
            "request cost {range:?}"
        );
        assert!(
            matches!(h.sim.set_server_power(range), Err(SimError::InvalidArgument { .. })),
            "server power {range:?}"
        );
        assert!(
            matches!(
                h.sim.add_server("Bad", range, 5),
                Err(SimError::InvalidArgument { .. })
            ),
            "new server power {range:?}"
        );
        let config = LoadBalancerConfig {
            request_cost: range,
            ..Default::default()
        };
        assert!(
            matches!(
                h.sim.add_load_balancer("Bad", config, BalancingStrategy::Random),
                Err(SimError::InvalidArgument { .. })
            ),
            "new load balancer cost {range:?}"
        );
    }

    // Nothing changed, so the pipeline still serves normally.
    assert_eq!(h.sim.server(server).unwrap().power(), 1.0);
    assert_eq!(h.sim.server_ids(), vec![server]);
    assert_eq!(h.sim.load_balancer_ids(), vec![lb]);
    h.send(lb);
    h.run_for(10.0);
    assert_eq!(h.served(), 1);
    assert!(h.finished()[0].cost <= 0.0);
}

#[test]
fn test_bad_generator_settings_rejected_at_creation() {
    let mut h = TestHarness::new();
    for config in [
        LoadBalancerConfig {
            rps: f64::NAN,
            ..Default::default()
        },
        LoadBalancerConfig {
            rps_variance: 1.5,
            ..Default::default()
        },
        LoadBalancerConfig {
            travel_ms: -1.0,
            ..Default::default()
        },
    ] {
        assert!(h
            .sim
            .add_load_balancer("Bad", config, BalancingStrategy::RoundRobin)
            .is_err());
    }
    assert_eq!(h.sim.live_count(), 0);
}
