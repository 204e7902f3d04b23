use std::sync::Arc;

use generic_indexer::signal::{ProviderErrorHeuristic, SignalSender};
use tracing::{debug, error};

use crate::{
    decoder::{ContractFamily, Decoded, EventDecoder},
    error::ProviderError,
    progress::ReplayFloor,
    router::EventRouter,
    types::ChainLog,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Handled,
    /// Not applied, and replaying it would not change that.
    Skipped,
    /// A provider call failed while applying the event. Its block is marked on the
    /// replay floor so the next checkpoint replays it.
    Deferred,
}

/// Decode then route, shared by replay and the live feed. Never fails: a bad log is
/// logged and skipped so it cannot halt the stream.
#[derive(Clone)]
pub struct LogProcessor {
    decoder: EventDecoder,
    router: EventRouter,
    signals: SignalSender,
    heuristic: ProviderErrorHeuristic,
    floor: Arc<ReplayFloor>,
}

impl LogProcessor {
    pub fn new(
        decoder: EventDecoder,
        router: EventRouter,
        signals: SignalSender,
        heuristic: ProviderErrorHeuristic,
        floor: Arc<ReplayFloor>,
    ) -> Self {
        Self {
            decoder,
            router,
            signals,
            heuristic,
            floor,
        }
    }

    #[cfg(test)]
    pub(crate) fn router(&self) -> &EventRouter {
        &self.router
    }

    pub async fn process(&self, log: ChainLog) -> ProcessOutcome {
        let block = log.block_number;
        let tx = log.transaction_hash;

        let event = match self.decoder.decode(log) {
            Ok(Decoded::Event(event)) => event,
            Ok(Decoded::NoMatch { family }) => {
                if family != ContractFamily::Other {
                    debug!(%family, block, %tx, "No schema matched log");
                }
                return ProcessOutcome::Skipped;
            }
            Err(e) => {
                error!(block, %tx, "Decode anomaly: {}", e);
                return ProcessOutcome::Skipped;
            }
        };

        match self.router.route(&event).await {
            Ok(true) => {
                debug!(event = event.name, family = %event.family, block, "Event routed");
                ProcessOutcome::Handled
            }
            Ok(false) => {
                debug!(event = event.name, family = %event.family, block, "Event not handled");
                ProcessOutcome::Skipped
            }
            Err(e) => {
                error!(event = event.name, block, %tx, "Failed to apply event: {:?}", e);
                match e.downcast_ref::<ProviderError>() {
                    Some(provider_error) => {
                        self.floor.mark_failed(block);
                        self.escalate(provider_error);
                        ProcessOutcome::Deferred
                    }
                    None => ProcessOutcome::Skipped,
                }
            }
        }
    }

    fn escalate(&self, e: &ProviderError) {
        if let Some(channel) = e.failure_channel(&self.heuristic) {
            self.signals.send(channel, e.to_string());
        }
    }
}
