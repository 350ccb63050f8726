//! Fail-fast wiring: cancel the run on the first error diagnostic.

use anyhow::Result;
use tracing::info;

use crate::cancellation::{CancelReason, CancellationToken};
use crate::diagnostic::has_errors;
use crate::events::{Event, EventBus, EventHandler, SubscriptionId};

/// Subscriber that reacts to published error diagnostics. It never polls.
#[derive(Debug, Clone)]
pub struct FailFast {
    token: CancellationToken,
}

impl FailFast {
    pub fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Subscribe a fail-fast handler for `token` onto `bus`.
    pub fn install(bus: &mut EventBus, token: &CancellationToken) -> SubscriptionId {
        let mut handler = Self::new(token.clone());
        bus.subscribe(move |event| handler.handle(event))
    }
}

impl EventHandler for FailFast {
    fn handle(&mut self, event: &Event) -> Result<()> {
        if let Some(diagnostics) = event.diagnostics()
            && has_errors(diagnostics)
            && !self.token.is_cancellation_requested()
        {
            info!(event = event.name(), "error reported, cancelling run");
            self.token.cancel(CancelReason::FailFast);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::Diagnostic;

    #[test]
    fn cancels_only_on_error_severity() {
        let token = CancellationToken::new();
        let mut bus = EventBus::new();
        FailFast::install(&mut bus, &token);

        bus.publish(Event::DeprecationInfo {
            diagnostics: vec![Diagnostic::warning("old matcher")],
        })
        .expect("publish");
        assert!(!token.is_cancellation_requested());

        bus.publish(Event::ExpectFail {
            diagnostics: vec![Diagnostic::error("mismatch")],
        })
        .expect("publish");
        assert_eq!(token.reason(), Some(CancelReason::FailFast));
    }

    #[test]
    fn earlier_reason_is_kept() {
        let token = CancellationToken::new();
        token.cancel(CancelReason::ConfigChange);
        let mut handler = FailFast::new(token.clone());
        handler
            .handle(&Event::CaseError {
                name: "c".to_string(),
                diagnostics: vec![Diagnostic::error("broken")],
            })
            .expect("handle");
        assert_eq!(token.reason(), Some(CancelReason::ConfigChange));
    }
}
