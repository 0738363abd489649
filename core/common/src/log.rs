//! Caller-supplied logging sink.
//!
//! Every mutating operation reports through a [`Logger`]. The logger always
//! emits a `tracing` event and, when a callback is attached, forwards the
//! message and label to it as well.

use std::fmt;
use tracing::{error, info};

/// Callback shape: `(message, label)`.
pub type LogCallback<'a> = &'a (dyn Fn(&str, Option<&str>) + 'a);

/// Verbosity, label and callback for one operation.
#[derive(Clone, Copy)]
pub struct Logger<'a> {
    verbose: bool,
    label: Option<&'a str>,
    callback: Option<LogCallback<'a>>,
}

impl<'a> Logger<'a> {
    /// Verbose logger with no label and no callback.
    pub fn new() -> Self {
        Self {
            verbose: true,
            label: None,
            callback: None,
        }
    }

    /// Logger that only reports errors.
    pub fn quiet() -> Self {
        Self {
            verbose: false,
            ..Self::new()
        }
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_label(mut self, label: &'a str) -> Self {
        self.label = Some(label);
        self
    }

    pub fn with_callback(mut self, callback: LogCallback<'a>) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    pub fn label(&self) -> Option<&'a str> {
        self.label
    }

    /// Report a successful operation. Dropped unless verbose.
    pub fn info(&self, message: &str) {
        if !self.verbose {
            return;
        }
        info!(label = self.label, "{}", message);
        self.forward(message);
    }

    /// Report a failure. Always delivered.
    pub fn error(&self, message: &str) {
        error!(label = self.label, "{}", message);
        self.forward(message);
    }

    fn forward(&self, message: &str) {
        if let Some(callback) = self.callback {
            callback(message, self.label);
        }
    }
}

impl Default for Logger<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Logger<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("verbose", &self.verbose)
            .field("label", &self.label)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}
