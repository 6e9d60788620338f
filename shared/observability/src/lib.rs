//! Logging and request tracing shared by the assistant service and the chat
//! client.

pub mod init;
pub mod macros;
pub mod middleware;
pub mod trace_context;

pub use init::{init_tracing, LogFormat, TracingConfig};
pub use middleware::{observability, RequestLogging, RequestLoggingService};
pub use trace_context::{TraceContext, TraceContextExt, TRACEPARENT_HEADER, TRACE_ID_HEADER};
