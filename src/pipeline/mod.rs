// Workers and scheduling: the conductor supervises a fetcher pool and a
// processor pool over the shared durable queue.

pub mod conductor;
pub mod fetcher;
pub mod processor;
pub mod rate_limit;

pub use conductor::Conductor;
pub use fetcher::Fetcher;
pub use processor::Processor;
pub use rate_limit::VendorRateLimiter;
