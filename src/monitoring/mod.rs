/*!
 * Monitoring
 * Tracing subscriber setup for library consumers and the demo binary
 */

pub mod tracer;

pub use tracer::{init_tracing, TracingFormat};
