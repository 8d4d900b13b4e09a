mod determinism;
mod load_balancer;
mod queue;
