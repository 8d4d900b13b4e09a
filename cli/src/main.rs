//! Headless runner: builds a simulation from a JSON config, runs it for a
//! fixed span of simulated time and reports what happened to the requests.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::Parser;
use env_logger::{Builder, Env};
use lbsim_core::{
    Agent, BalancingStrategy, MetricPoint, MetricsCollector, PercentileCalculator, Request,
    Simulation, SimulationConfig, DEFAULT_TICK_MS,
};
use serde::Serialize;

/// History points kept by the metrics collector, one per 200ms.
const HISTORY_POINTS: usize = 300;

#[derive(Parser)]
#[command(name = "lbsim")]
#[command(about = "Discrete-time load balancer simulator")]
struct Cli {
    /// JSON simulation config; missing fields take their defaults
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Routing algorithm, overriding the config
    #[arg(short, long)]
    algorithm: Option<BalancingStrategy>,
    /// Simulated time to run for
    #[arg(short, long, default_value_t = 10_000.0)]
    duration_ms: f64,
    /// Length of one tick
    #[arg(long, default_value_t = DEFAULT_TICK_MS)]
    tick_ms: f64,
    /// RNG seed, overriding the config
    #[arg(short, long)]
    seed: Option<u64>,
    /// Run every algorithm against the same seed
    #[arg(long)]
    compare: bool,
    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Default)]
struct Tally {
    ages: PercentileCalculator,
    served: u64,
    dropped: u64,
    abandoned: u64,
}

impl Tally {
    fn record(&mut self, request: &Request) {
        if request.dropped {
            self.dropped += 1;
        } else if request.served.is_some() {
            self.served += 1;
            self.ages.add(request.age);
        } else {
            self.abandoned += 1;
        }
    }
}

#[derive(Serialize)]
struct ServerReport {
    name: String,
    power: f64,
    served: u64,
    dropped: u64,
    label: Option<String>,
}

#[derive(Serialize)]
struct Report {
    algorithm: BalancingStrategy,
    seed: Option<u64>,
    duration_ms: f64,
    sent: u64,
    served: u64,
    dropped: u64,
    abandoned: u64,
    p50_ms: Option<f64>,
    p90_ms: Option<f64>,
    p99_ms: Option<f64>,
    servers: Vec<ServerReport>,
    history: Vec<MetricPoint>,
}

fn run(config: &SimulationConfig, duration_ms: f64, tick_ms: f64) -> lbsim_core::Result<Report> {
    let mut sim = Simulation::from_config(config)?;
    let tally = Rc::new(RefCell::new(Tally::default()));
    let metrics = Rc::new(RefCell::new(MetricsCollector::new(HISTORY_POINTS)?));

    for lb in sim.load_balancer_ids() {
        let tally = Rc::clone(&tally);
        let metrics = Rc::clone(&metrics);
        sim.on_request_destroyed(lb, move |request| {
            tally.borrow_mut().record(request);
            metrics.borrow_mut().record(request);
        })?;
    }

    let mut remaining = duration_ms;
    while remaining > 0.0 {
        let step = tick_ms.min(remaining);
        sim.run_for(step, tick_ms)?;
        metrics.borrow_mut().update(sim.time_ms());
        remaining -= step;
    }

    let lbs = sim.load_balancer_ids();
    let sent = lbs
        .iter()
        .filter_map(|&lb| sim.load_balancer(lb))
        .map(|lb| lb.sent)
        .sum();
    let first_lb = lbs.first().and_then(|&lb| sim.load_balancer(lb));
    let servers = sim
        .server_ids()
        .into_iter()
        .filter_map(|id| sim.server(id))
        .map(|server| ServerReport {
            name: server.name.clone(),
            power: server.power(),
            served: server.served,
            dropped: server.dropped,
            label: first_lb.and_then(|lb| lb.server_label(server.id())),
        })
        .collect();

    let tally = tally.borrow();
    let history = metrics.borrow().history.iter().copied().collect();
    Ok(Report {
        algorithm: config.algorithm,
        seed: config.seed,
        duration_ms,
        sent,
        served: tally.served,
        dropped: tally.dropped,
        abandoned: tally.abandoned,
        p50_ms: tally.ages.percentile(50.0).ok(),
        p90_ms: tally.ages.percentile(90.0).ok(),
        p99_ms: tally.ages.percentile(99.0).ok(),
        servers,
        history,
    })
}

fn fmt_ms(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.1}ms"))
}

fn print_report(report: &Report) {
    println!("== {} ==", report.algorithm);
    println!(
        "sent {} | served {} | dropped {} | abandoned {}",
        report.sent, report.served, report.dropped, report.abandoned
    );
    println!(
        "age p50 {} | p90 {} | p99 {}",
        fmt_ms(report.p50_ms),
        fmt_ms(report.p90_ms),
        fmt_ms(report.p99_ms)
    );
    for server in &report.servers {
        println!(
            "  {:<10} power {:>6.2} | served {:>6} | dropped {:>6}{}",
            server.name,
            server.power,
            server.served,
            server.dropped,
            server
                .label
                .as_deref()
                .map(|label| format!(" | {label}"))
                .unwrap_or_default()
        );
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => SimulationConfig::load(path)?,
        None => SimulationConfig::default(),
    };
    if let Some(algorithm) = cli.algorithm {
        config.algorithm = algorithm;
    }
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }

    let algorithms: Vec<BalancingStrategy> = if cli.compare {
        if config.seed.is_none() {
            let seed = SystemTime::now().duration_since(UNIX_EPOCH)?.as_nanos() as u64;
            log::info!("comparing with seed {seed}");
            config.seed = Some(seed);
        }
        BalancingStrategy::ALL.to_vec()
    } else {
        vec![config.algorithm]
    };

    let mut reports = Vec::with_capacity(algorithms.len());
    for algorithm in algorithms {
        config.algorithm = algorithm;
        reports.push(run(&config, cli.duration_ms, cli.tick_ms)?);
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for report in &reports {
            print_report(report);
        }
    }
    Ok(())
}
