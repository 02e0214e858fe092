pub mod invoker;
pub mod metrics;

pub use invoker::{InvocationResult, Invoker, Outcome};
pub use metrics::{get_metrics, init_metrics};
