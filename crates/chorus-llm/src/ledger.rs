//! Per-call record of provider failures.
//!
//! An [`ExceptionLedger`] is created when an orchestration call starts,
//! filled as candidates fail before producing output, and consumed once to
//! build the terminal error when every attempt is exhausted.

use std::fmt;

use crate::error::ProviderError;

/// One failed attempt.
#[derive(Debug)]
pub struct LedgerEntry {
    /// Name of the provider that failed.
    pub provider: String,
    /// 1-based attempt number within the call.
    pub attempt: u32,
    pub error: ProviderError,
}

/// Ordered failures recorded during a single orchestration call.
#[derive(Debug, Default)]
pub struct ExceptionLedger {
    entries: Vec<LedgerEntry>,
}

impl ExceptionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a failure.
    pub fn record(&mut self, provider: impl Into<String>, attempt: u32, error: ProviderError) {
        self.entries.push(LedgerEntry {
            provider: provider.into(),
            attempt,
            error,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &LedgerEntry> {
        self.entries.iter()
    }

    /// Provider names in the order they failed.
    pub fn provider_names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.provider.as_str()).collect()
    }

    /// The most recent error recorded for `provider`.
    pub fn get(&self, provider: &str) -> Option<&ProviderError> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.provider == provider)
            .map(|e| &e.error)
    }

    /// One `name: Kind: message` line per entry.
    pub fn summary_lines(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| format!("{}: {}: {}", e.provider, e.error.kind(), e.error))
            .collect()
    }

    /// Turn the ledger into the call's terminal error.
    ///
    /// An empty ledger means nothing was attempted, which is reported as
    /// [`ProviderError::NoEligibleProvider`] rather than as an aggregate.
    pub fn into_error(self) -> ProviderError {
        if self.entries.is_empty() {
            ProviderError::NoEligibleProvider
        } else {
            ProviderError::AllProvidersFailed { ledger: self }
        }
    }
}

impl fmt::Display for ExceptionLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "all providers failed:")?;
        for line in self.summary_lines() {
            write!(f, "\n{line}")?;
        }
        Ok(())
    }
}
