use lbsim_core::{
    BalancingStrategy, Bounds, RequestRecord, ServerPower, Simulation, SimulationConfig,
    DEFAULT_TICK_MS,
};
use std::cell::RefCell;
use std::rc::Rc;

fn run(config: &SimulationConfig) -> Vec<RequestRecord> {
    let mut sim = Simulation::from_config(config).unwrap();
    let records = Rc::new(RefCell::new(Vec::new()));
    for lb in sim.load_balancer_ids() {
        let sink = Rc::clone(&records);
        sim.on_request_destroyed(lb, move |r| sink.borrow_mut().push(r.record()))
            .unwrap();
    }
    sim.run_for(3000.0, DEFAULT_TICK_MS).unwrap();
    let out = records.borrow().clone();
    out
}

fn busy_config(algorithm: BalancingStrategy, seed: u64) -> SimulationConfig {
    SimulationConfig {
        rps: 40.0,
        rps_variance: 0.5,
        num_servers: 3,
        queue_max_length: 3,
        server_power: ServerPower::Range(Bounds::new(1.0, 3.0)),
        request_cost: Bounds::new(20.0, 120.0),
        load_balancers: 2,
        algorithm,
        seed: Some(seed),
        ..Default::default()
    }
}

#[test]
fn test_same_seed_same_outcome() {
    for &algorithm in BalancingStrategy::ALL {
        let first = run(&busy_config(algorithm, 17));
        let second = run(&busy_config(algorithm, 17));
        assert!(!first.is_empty(), "{algorithm} finished nothing");
        assert_eq!(first, second, "{algorithm} diverged");
    }
}

#[test]
fn test_different_seed_different_outcome() {
    let first = run(&busy_config(BalancingStrategy::Random, 1));
    let second = run(&busy_config(BalancingStrategy::Random, 2));
    assert_ne!(first, second);
}

#[test]
fn test_overload_drops_and_every_request_is_accounted() {
    let config = SimulationConfig {
        rps: 200.0,
        num_servers: 2,
        queue_max_length: 2,
        request_cost: Bounds::fixed(50.0),
        seed: Some(9),
        ..Default::default()
    };
    let records = run(&config);
    let served = records.iter().filter(|r| r.served_ms.is_some()).count();
    let dropped = records.iter().filter(|r| r.dropped).count();
    assert!(dropped > 0);
    assert!(served > 0);
    assert_eq!(served + dropped, records.len());
    for record in records.iter().filter(|r| r.served_ms.is_some()) {
        assert!(record.cost <= 0.0);
        assert!(record.work_started_ms.is_some());
    }
}
