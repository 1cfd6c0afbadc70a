//! Shared error plumbing.
//!
//! Every crate owns its error enums; fallible operations return
//! `Report<E>` through the [`Result`] alias. When a lower layer's report
//! crosses into a layer with a different error type, its innermost context
//! is flattened into the new error with [`ReportExt::context_message`].

use rootcause::Report;
use std::fmt;

/// A Result type alias using rootcause's Report for error handling.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;

/// Helpers for turning a report into another layer's error.
pub trait ReportExt {
    /// Renders the report's current context as a single line.
    fn context_message(&self) -> String;
}

impl<C> ReportExt for Report<C>
where
    C: fmt::Display + fmt::Debug + Send + Sync + 'static,
{
    fn context_message(&self) -> String {
        self.current_context().to_string()
    }
}
