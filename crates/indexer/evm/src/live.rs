use std::sync::Arc;

use futures_util::StreamExt;
use generic_indexer::signal::SignalSender;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::{
    error::ProviderError, filter::LogFilter, processor::LogProcessor, progress::BlockProgress,
    provider::ChainProvider, store::MetadataStore,
};

/// A standing log subscription feeding the shared processor.
pub struct LiveSubscription {
    task: JoinHandle<()>,
}

impl LiveSubscription {
    /// Resolves once the provider has accepted the subscription.
    pub async fn arm(
        provider: Arc<dyn ChainProvider>,
        filter: &LogFilter,
        processor: LogProcessor,
        metadata: Arc<dyn MetadataStore>,
        progress: Arc<BlockProgress>,
        signals: SignalSender,
    ) -> Result<Self, ProviderError> {
        let mut stream = provider.subscribe_logs(filter).await?;
        info!(endpoint = provider.endpoint(), "Subscribed to live logs");

        let task = tokio::spawn(async move {
            // a deferred log is held on the replay floor, so progress may move past it
            while let Some(log) = stream.next().await {
                let block = log.block_number;
                processor.process(log).await;

                if progress.advance(block) {
                    if let Err(e) = metadata.set_last_processed_block(block).await {
                        error!(block, "Failed to persist last processed block: {:?}", e);
                        signals.registry_write(format!("last processed block {block}: {e}"));
                    }
                }
            }

            warn!(endpoint = provider.endpoint(), "Live log subscription closed");
            signals.connectivity(format!(
                "eth_subscribe via {}: log subscription closed",
                provider.endpoint()
            ));
        });

        Ok(Self { task })
    }

    /// The task is aborted at its next await point; a log mid-flight does not advance
    /// the progress marker.
    pub async fn cancel(self) {
        self.task.abort();
        let _ = self.task.await;
    }
}
