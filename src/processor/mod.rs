pub mod circuit_breaker;
pub mod client;
pub mod health_poller;
pub mod retry;

pub use circuit_breaker::CircuitBreaker;
pub use client::ProcessorClient;
pub use health_poller::HealthPoller;
pub use retry::RetryCoordinator;
