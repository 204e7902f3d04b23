use std::{collections::VecDeque, sync::Arc, time::Duration};

use common::config::SupervisorSettings;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{interval, timeout, MissedTickBehavior},
};
use tracing::{debug, error, info, instrument, warn};

use crate::{
    pipeline::IngestionPipeline,
    signal::{FailureChannel, SignalReceiver},
    state::{Action, ConnectionState, FailoverMachine, ProviderSlot, Thresholds},
};

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub probe_interval: Duration,
    pub probe_timeout: Duration,
    pub thresholds: Thresholds,
}

impl From<&SupervisorSettings> for SupervisorConfig {
    fn from(settings: &SupervisorSettings) -> Self {
        Self {
            probe_interval: Duration::from_millis(settings.probe_interval_ms),
            probe_timeout: Duration::from_millis(settings.probe_timeout_ms),
            thresholds: Thresholds {
                success: settings.success_threshold,
                failure: settings.failure_threshold,
                return_to_primary_after: Duration::from_secs(settings.return_to_primary_after_secs),
            },
        }
    }
}

/// Keeps one ingestion pipeline alive across provider failures by driving a
/// [`FailoverMachine`] from failure signals, probe results and the return-to-primary timer.
pub struct ConnectionSupervisor<P: IngestionPipeline> {
    pipeline: Arc<P>,
    machine: FailoverMachine,
    config: SupervisorConfig,
    signals: SignalReceiver,
    return_tx: mpsc::UnboundedSender<()>,
    return_rx: mpsc::UnboundedReceiver<()>,
    return_task: Option<JoinHandle<()>>,
    state_tx: watch::Sender<ConnectionState>,
}

impl<P: IngestionPipeline> ConnectionSupervisor<P> {
    pub fn new(pipeline: Arc<P>, config: SupervisorConfig, signals: SignalReceiver) -> Self {
        let machine = FailoverMachine::new(config.thresholds);
        let (state_tx, _) = watch::channel(machine.state());
        let (return_tx, return_rx) = mpsc::unbounded_channel();

        Self {
            pipeline,
            machine,
            config,
            signals,
            return_tx,
            return_rx,
            return_task: None,
            state_tx,
        }
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Runs until `shutdown` flips to true (or its sender is dropped), then stops the
    /// pipeline so its checkpoint is persisted.
    #[instrument(skip_all)]
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> eyre::Result<()> {
        info!("starting subscribers");
        if let Err(e) = self.pipeline.recover(ProviderSlot::Primary).await {
            error!("Initial recover on primary failed: {:?}", e);
            let actions = self.machine.on_failure(FailureChannel::Connectivity);
            self.apply(actions).await;
        }

        let mut ticker = interval(self.config.probe_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }

                Some(signal) = self.signals.recv() => {
                    if self.machine.cycle(signal.channel).is_some() {
                        debug!(channel = %signal.channel, reason = %signal.reason, "Probe cycle already running, ignoring signal");
                        continue;
                    }
                    warn!(channel = %signal.channel, reason = %signal.reason, "Fatal provider signal");
                    let actions = self.machine.on_failure(signal.channel);
                    self.apply(actions).await;
                }

                Some(()) = self.return_rx.recv() => {
                    self.return_task = None;
                    info!("Cool-down elapsed, probing primary provider");
                    let actions = self.machine.on_return_due();
                    self.apply(actions).await;
                }

                _ = ticker.tick(), if self.machine.is_probing() => {
                    for (channel, slot) in self.machine.probe_targets() {
                        let healthy = self.probe(slot).await;
                        let actions = self.machine.on_probe(channel, healthy);
                        self.apply(actions).await;
                    }
                }
            }
        }

        info!("Shutting down connection supervisor");
        self.cancel_return();
        self.pipeline.stop().await
    }

    async fn probe(&self, slot: ProviderSlot) -> bool {
        match timeout(self.config.probe_timeout, self.pipeline.probe(slot)).await {
            Ok(Ok(head)) => {
                debug!(%slot, head, "Probe succeeded");
                true
            }
            Ok(Err(e)) => {
                debug!(%slot, "Probe failed: {:?}", e);
                false
            }
            Err(_) => {
                debug!(%slot, "Probe timed out");
                false
            }
        }
    }

    async fn apply(&mut self, actions: Vec<Action>) {
        let mut queue: VecDeque<Action> = actions.into();

        while let Some(action) = queue.pop_front() {
            match action {
                Action::StopPipeline => {
                    if let Err(e) = self.pipeline.stop().await {
                        error!("Failed to stop pipeline: {:?}", e);
                    }
                }
                Action::Recover(slot) => {
                    if let Err(e) = self.pipeline.stop().await {
                        error!("Failed to stop pipeline before recover: {:?}", e);
                    }
                    info!(%slot, "Re-arming pipeline");
                    if let Err(e) = self.pipeline.recover(slot).await {
                        error!(%slot, "Recover failed: {:?}", e);
                        queue.extend(self.machine.on_failure(FailureChannel::Connectivity));
                    }
                }
                Action::ScheduleReturnToPrimary(delay) => {
                    self.cancel_return();
                    let tx = self.return_tx.clone();
                    self.return_task = Some(tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = tx.send(());
                    }));
                    info!("Scheduled return to primary provider in {:?}", delay);
                }
                Action::CancelReturnToPrimary => self.cancel_return(),
            }
        }

        self.publish_state();
    }

    fn cancel_return(&mut self) {
        if let Some(task) = self.return_task.take() {
            task.abort();
        }
        // a timer that fired before the abort may have left a tick in the channel
        while self.return_rx.try_recv().is_ok() {}
    }

    fn publish_state(&self) {
        let next = self.machine.state();
        let previous = *self.state_tx.borrow();
        if !previous.same_phase(&next) {
            info!(from = %previous, to = %next, "Connection state changed");
        }
        self.state_tx.send_replace(next);
    }
}
