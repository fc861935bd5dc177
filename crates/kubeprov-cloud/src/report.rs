//! Operator-facing progress reporting
//!
//! Library code reports progress through [`Reporter`]; the binary renders it
//! on the terminal. Diagnostics that are not meant for the operator go
//! through `tracing` directly.

use std::sync::Arc;

/// Receives operator-facing progress messages
pub trait Reporter: Send + Sync {
    /// Section heading
    fn banner(&self, message: &str);
    fn info(&self, message: &str);
    fn success(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
}

impl<T: Reporter + ?Sized> Reporter for Arc<T> {
    fn banner(&self, message: &str) {
        (**self).banner(message)
    }

    fn info(&self, message: &str) {
        (**self).info(message)
    }

    fn success(&self, message: &str) {
        (**self).success(message)
    }

    fn warn(&self, message: &str) {
        (**self).warn(message)
    }

    fn error(&self, message: &str) {
        (**self).error(message)
    }
}
