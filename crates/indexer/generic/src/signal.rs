use std::fmt;

use tokio::sync::mpsc;

/// Independent failure sources. Each drives its own probe cycle with its own counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FailureChannel {
    /// The RPC provider stopped answering or returned a provider-level fatal error.
    Connectivity,
    /// Progress markers or registry backfills could not be written.
    RegistryWrite,
}

impl fmt::Display for FailureChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureChannel::Connectivity => write!(f, "connectivity"),
            FailureChannel::RegistryWrite => write!(f, "registry-write"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureSignal {
    pub channel: FailureChannel,
    pub reason: String,
}

pub type SignalReceiver = mpsc::UnboundedReceiver<FailureSignal>;

#[derive(Debug, Clone)]
pub struct SignalSender {
    tx: mpsc::UnboundedSender<FailureSignal>,
}

pub fn failure_channel() -> (SignalSender, SignalReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (SignalSender { tx }, rx)
}

impl SignalSender {
    pub fn send(&self, channel: FailureChannel, reason: impl Into<String>) {
        let signal = FailureSignal {
            channel,
            reason: reason.into(),
        };
        if self.tx.send(signal).is_err() {
            tracing::debug!(%channel, "Supervisor is gone, dropping failure signal");
        }
    }

    pub fn connectivity(&self, reason: impl Into<String>) {
        self.send(FailureChannel::Connectivity, reason)
    }

    pub fn registry_write(&self, reason: impl Into<String>) {
        self.send(FailureChannel::RegistryWrite, reason)
    }
}

/// Recognises provider-fatal RPC error text: it must name a JSON-RPC method and one of
/// the configured upstream provider names.
#[derive(Debug, Clone)]
pub struct ProviderErrorHeuristic {
    markers: Vec<String>,
}

const RPC_METHOD_PREFIXES: &[&str] = &["eth_", "net_", "web3_"];

impl ProviderErrorHeuristic {
    pub fn new(markers: &[String]) -> Self {
        Self {
            markers: markers.iter().map(|m| m.to_ascii_lowercase()).collect(),
        }
    }

    pub fn is_fatal(&self, message: &str) -> bool {
        let message = message.to_ascii_lowercase();
        let names_method = RPC_METHOD_PREFIXES.iter().any(|p| message.contains(p));
        names_method && self.markers.iter().any(|m| message.contains(m.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heuristic_needs_method_and_brand() {
        let heuristic = ProviderErrorHeuristic::new(&["Forno".to_string(), "infura".to_string()]);

        assert!(heuristic.is_fatal("eth_getLogs failed: https://forno.celo.org 503"));
        assert!(heuristic.is_fatal("request eth_blockNumber to mainnet.infura.io timed out"));
        assert!(!heuristic.is_fatal("eth_getLogs: execution reverted"));
        assert!(!heuristic.is_fatal("forno is down"));
    }

    #[tokio::test]
    async fn signals_reach_the_receiver() {
        let (tx, mut rx) = failure_channel();
        tx.connectivity("ws closed");
        tx.registry_write("sync_state write failed");

        assert_eq!(rx.recv().await.map(|s| s.channel), Some(FailureChannel::Connectivity));
        assert_eq!(rx.recv().await.map(|s| s.channel), Some(FailureChannel::RegistryWrite));
    }
}
