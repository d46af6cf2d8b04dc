//! Ordered strategy chains that probe the environment on every call.

use std::fmt;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{AdapterError, AdapterResult, StrategyAttempt};

/// Result of a strategy's availability probe.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Availability {
    /// The backend looks usable.
    Available,
    /// The backend is missing, with the reason.
    Missing(String),
}

/// One way of serving an adapter operation.
#[async_trait]
pub trait Strategy<Req, Out>: Send + Sync
where
    Req: Sync + ?Sized,
{
    /// Short identifier used in logs and diagnostics.
    fn name(&self) -> &'static str;

    /// What an operator must install or configure to enable this strategy.
    fn remediation(&self) -> &'static str;

    /// Cheap check run before [`execute`](Self::execute), e.g. a PATH lookup.
    fn probe(&self, request: &Req) -> Availability;

    /// Serves the request.
    ///
    /// # Errors
    ///
    /// [`AdapterError::Unavailable`] makes the chain move on to the next
    /// strategy. Any other error ends the chain and reaches the caller.
    async fn execute(&self, request: &Req) -> AdapterResult<Out>;
}

/// Ordered list of strategies for a single operation.
pub struct FallbackChain<Req: Sync + ?Sized, Out> {
    operation: &'static str,
    strategies: Vec<Box<dyn Strategy<Req, Out>>>,
}

impl<Req: Sync + ?Sized, Out> fmt::Debug for FallbackChain<Req, Out> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.strategies.iter().map(|s| s.name()).collect();
        f.debug_struct("FallbackChain")
            .field("operation", &self.operation)
            .field("strategies", &names)
            .finish()
    }
}

impl<Req: Sync + ?Sized, Out> FallbackChain<Req, Out> {
    /// Creates an empty chain for `operation`.
    #[must_use]
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            strategies: Vec::new(),
        }
    }

    /// Appends a strategy; strategies run in the order they are added.
    #[must_use]
    pub fn then(mut self, strategy: impl Strategy<Req, Out> + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    /// Operation name reported in diagnostics.
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        self.operation
    }

    /// Runs the chain until a strategy succeeds or all are exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::BackendUnavailable`] listing every skipped
    /// strategy when none could serve the request, or the first error a
    /// strategy reports other than [`AdapterError::Unavailable`].
    pub async fn run(&self, request: &Req) -> AdapterResult<Out> {
        let mut attempts = Vec::with_capacity(self.strategies.len());

        for strategy in &self.strategies {
            let reason = match strategy.probe(request) {
                Availability::Missing(reason) => reason,
                Availability::Available => match strategy.execute(request).await {
                    Err(AdapterError::Unavailable { reason }) => reason,
                    outcome => {
                        debug!(
                            operation = self.operation,
                            strategy = strategy.name(),
                            ok = outcome.is_ok(),
                            "strategy finished"
                        );
                        return outcome;
                    }
                },
            };

            debug!(
                operation = self.operation,
                strategy = strategy.name(),
                reason = %reason,
                "strategy skipped"
            );
            attempts.push(StrategyAttempt {
                strategy: strategy.name(),
                reason,
                remediation: strategy.remediation(),
            });
        }

        Err(AdapterError::BackendUnavailable {
            operation: self.operation,
            attempts,
        })
    }
}
