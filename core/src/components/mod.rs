pub mod load_balancer;
pub mod queue;
pub mod request;
pub mod server;
