use std::collections::BTreeSet;

/// Collects configuration diagnostics for one pipeline context. Each distinct
/// key is reported (and logged) once, however many components hit it.
#[derive(Debug, Default)]
pub struct Diagnostics {
    seen: BTreeSet<String>,
    messages: Vec<String>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` the first time `key` is reported.
    pub fn warn_once(&mut self, key: &str, message: impl Into<String>) -> bool {
        if !self.seen.insert(key.to_string()) {
            return false;
        }
        let message = message.into();
        tracing::warn!(event = "config.deprecated", key, "{}", message);
        self.messages.push(message);
        true
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }
}
