//! Plugin contract between the host pipeline and its extensions.
//!
//! The host builds its parse and execution stages as boxed [`tower`] services, then hands each of
//! them to every plugin, which returns a (possibly) wrapped service in its place.

use crate::services::execution;
use crate::services::parse;

/// A pipeline extension.
pub trait Plugin: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Wrap the parse stage. The returned service is called once per incoming document.
    fn parse_service(&self, service: parse::BoxService) -> parse::BoxService {
        service
    }

    /// Wrap the execution stage.
    fn execution_service(&self, service: execution::BoxService) -> execution::BoxService {
        service
    }
}
