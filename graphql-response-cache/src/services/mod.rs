//! Pipeline stages the host exposes to plugins.

pub mod execution;
pub mod parse;

pub use execution::Request as ExecutionRequest;
pub use execution::Response as ExecutionResponse;
pub use parse::Request as ParseRequest;
pub use parse::Response as ParseResponse;
