use std::{collections::BTreeMap, fmt, time::Duration};

use tokio::time::Instant;

use crate::signal::FailureChannel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderSlot {
    Primary,
    Fallback,
}

impl ProviderSlot {
    pub fn other(self) -> Self {
        match self {
            ProviderSlot::Primary => ProviderSlot::Fallback,
            ProviderSlot::Fallback => ProviderSlot::Primary,
        }
    }
}

impl fmt::Display for ProviderSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderSlot::Primary => write!(f, "primary"),
            ProviderSlot::Fallback => write!(f, "fallback"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeCycle {
    pub slot: ProviderSlot,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
}

impl ProbeCycle {
    fn new(slot: ProviderSlot) -> Self {
        Self {
            slot,
            consecutive_successes: 0,
            consecutive_failures: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    PrimaryActive,
    RecoveringViaProbe(ProbeCycle),
    FallbackActive,
    ScheduledReturnToPrimary { at: Instant },
}

impl ConnectionState {
    /// Equal variants on the same provider; probe counter changes do not count.
    pub fn same_phase(&self, other: &ConnectionState) -> bool {
        match (self, other) {
            (ConnectionState::RecoveringViaProbe(a), ConnectionState::RecoveringViaProbe(b)) => {
                a.slot == b.slot
            }
            _ => std::mem::discriminant(self) == std::mem::discriminant(other),
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::PrimaryActive => write!(f, "primary-active"),
            ConnectionState::RecoveringViaProbe(cycle) => write!(f, "probing {}", cycle.slot),
            ConnectionState::FallbackActive => write!(f, "fallback-active"),
            ConnectionState::ScheduledReturnToPrimary { .. } => {
                write!(f, "return-to-primary-scheduled")
            }
        }
    }
}

/// Side effects the supervisor must carry out after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    StopPipeline,
    Recover(ProviderSlot),
    ScheduleReturnToPrimary(Duration),
    CancelReturnToPrimary,
}

#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub success: u32,
    pub failure: u32,
    pub return_to_primary_after: Duration,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            success: 5,
            failure: 5,
            return_to_primary_after: Duration::from_secs(60),
        }
    }
}

/// Primary/fallback failover. Pure: it only computes transitions and the actions they
/// require; the supervisor performs them.
#[derive(Debug)]
pub struct FailoverMachine {
    thresholds: Thresholds,
    active: ProviderSlot,
    return_at: Option<Instant>,
    cycles: BTreeMap<FailureChannel, ProbeCycle>,
}

impl FailoverMachine {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            active: ProviderSlot::Primary,
            return_at: None,
            cycles: BTreeMap::new(),
        }
    }

    pub fn active(&self) -> ProviderSlot {
        self.active
    }

    pub fn state(&self) -> ConnectionState {
        if let Some(cycle) = self.cycles.values().next() {
            return ConnectionState::RecoveringViaProbe(*cycle);
        }
        match (self.active, self.return_at) {
            (ProviderSlot::Primary, _) => ConnectionState::PrimaryActive,
            (ProviderSlot::Fallback, Some(at)) => ConnectionState::ScheduledReturnToPrimary { at },
            (ProviderSlot::Fallback, None) => ConnectionState::FallbackActive,
        }
    }

    pub fn is_probing(&self) -> bool {
        !self.cycles.is_empty()
    }

    pub fn probe_targets(&self) -> Vec<(FailureChannel, ProviderSlot)> {
        self.cycles
            .iter()
            .map(|(channel, cycle)| (*channel, cycle.slot))
            .collect()
    }

    pub fn cycle(&self, channel: FailureChannel) -> Option<ProbeCycle> {
        self.cycles.get(&channel).copied()
    }

    /// A fatal signal arrived. Ignored while a cycle of the same channel is in flight.
    pub fn on_failure(&mut self, channel: FailureChannel) -> Vec<Action> {
        if self.cycles.contains_key(&channel) {
            return Vec::new();
        }

        let mut actions = Vec::new();
        if self.return_at.take().is_some() {
            actions.push(Action::CancelReturnToPrimary);
        }
        self.cycles.insert(channel, ProbeCycle::new(self.active));
        actions.push(Action::StopPipeline);
        actions
    }

    pub fn on_probe(&mut self, channel: FailureChannel, healthy: bool) -> Vec<Action> {
        let Some(cycle) = self.cycles.get_mut(&channel) else {
            return Vec::new();
        };

        if healthy {
            cycle.consecutive_successes += 1;
            cycle.consecutive_failures = 0;
        } else {
            cycle.consecutive_failures += 1;
            cycle.consecutive_successes = 0;
        }

        if cycle.consecutive_successes >= self.thresholds.success {
            let slot = cycle.slot;
            self.cycles.remove(&channel);
            self.active = slot;
            return self.resume(slot);
        }

        if cycle.consecutive_failures >= self.thresholds.failure {
            *cycle = ProbeCycle::new(cycle.slot.other());
        }

        Vec::new()
    }

    /// The deferred return-to-primary task fired.
    pub fn on_return_due(&mut self) -> Vec<Action> {
        if self.return_at.take().is_none() {
            return Vec::new();
        }
        if self.active == ProviderSlot::Fallback
            && !self.cycles.contains_key(&FailureChannel::Connectivity)
        {
            self.cycles.insert(
                FailureChannel::Connectivity,
                ProbeCycle::new(ProviderSlot::Primary),
            );
        }
        Vec::new()
    }

    fn resume(&mut self, slot: ProviderSlot) -> Vec<Action> {
        // another channel is still probing; it resumes the pipeline when it settles
        if !self.cycles.is_empty() {
            return Vec::new();
        }

        let mut actions = vec![Action::Recover(slot)];
        if slot == ProviderSlot::Fallback {
            let delay = self.thresholds.return_to_primary_after;
            self.return_at = Some(Instant::now() + delay);
            actions.push(Action::ScheduleReturnToPrimary(delay));
        }
        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> FailoverMachine {
        FailoverMachine::new(Thresholds::default())
    }

    fn feed(machine: &mut FailoverMachine, channel: FailureChannel, results: &[bool]) -> Vec<Action> {
        results
            .iter()
            .flat_map(|ok| machine.on_probe(channel, *ok))
            .collect()
    }

    #[test]
    fn starts_on_primary() {
        assert_eq!(machine().state(), ConnectionState::PrimaryActive);
    }

    #[test]
    fn states_display_without_timestamps() {
        let probing = ConnectionState::RecoveringViaProbe(ProbeCycle::new(ProviderSlot::Fallback));
        let scheduled = ConnectionState::ScheduledReturnToPrimary { at: Instant::now() };

        assert_eq!(ConnectionState::PrimaryActive.to_string(), "primary-active");
        assert_eq!(probing.to_string(), "probing fallback");
        assert_eq!(ConnectionState::FallbackActive.to_string(), "fallback-active");
        assert_eq!(scheduled.to_string(), "return-to-primary-scheduled");
    }

    #[test]
    fn fatal_signal_stops_pipeline_and_probes_primary() {
        let mut m = machine();
        let actions = m.on_failure(FailureChannel::Connectivity);

        assert_eq!(actions, vec![Action::StopPipeline]);
        assert_eq!(
            m.state(),
            ConnectionState::RecoveringViaProbe(ProbeCycle::new(ProviderSlot::Primary))
        );
    }

    #[test]
    fn five_successes_return_to_primary() {
        let mut m = machine();
        m.on_failure(FailureChannel::Connectivity);

        let actions = feed(&mut m, FailureChannel::Connectivity, &[true; 5]);

        assert_eq!(actions, vec![Action::Recover(ProviderSlot::Primary)]);
        assert_eq!(m.state(), ConnectionState::PrimaryActive);
    }

    #[test]
    fn a_failure_resets_the_success_streak() {
        let mut m = machine();
        m.on_failure(FailureChannel::Connectivity);

        let actions = feed(
            &mut m,
            FailureChannel::Connectivity,
            &[true, true, true, true, false],
        );

        assert!(actions.is_empty());
        let cycle = m.cycle(FailureChannel::Connectivity).unwrap();
        assert_eq!(cycle.consecutive_successes, 0);
        assert_eq!(cycle.consecutive_failures, 1);
        assert_eq!(cycle.slot, ProviderSlot::Primary);
    }

    #[test]
    fn five_failures_on_primary_switch_probing_to_fallback() {
        let mut m = machine();
        m.on_failure(FailureChannel::Connectivity);

        feed(&mut m, FailureChannel::Connectivity, &[false; 5]);
        assert_eq!(
            m.cycle(FailureChannel::Connectivity).map(|c| c.slot),
            Some(ProviderSlot::Fallback)
        );

        let actions = feed(&mut m, FailureChannel::Connectivity, &[true; 5]);
        assert_eq!(
            actions,
            vec![
                Action::Recover(ProviderSlot::Fallback),
                Action::ScheduleReturnToPrimary(Duration::from_secs(60)),
            ]
        );
        assert!(matches!(
            m.state(),
            ConnectionState::ScheduledReturnToPrimary { .. }
        ));
        assert_eq!(m.active(), ProviderSlot::Fallback);
    }

    #[test]
    fn failing_fallback_hands_probing_back_to_primary() {
        let mut m = machine();
        m.on_failure(FailureChannel::Connectivity);
        feed(&mut m, FailureChannel::Connectivity, &[false; 10]);

        assert_eq!(
            m.cycle(FailureChannel::Connectivity).map(|c| c.slot),
            Some(ProviderSlot::Primary)
        );
    }

    #[test]
    fn return_timer_probes_primary_again() {
        let mut m = machine();
        m.on_failure(FailureChannel::Connectivity);
        feed(&mut m, FailureChannel::Connectivity, &[false; 5]);
        feed(&mut m, FailureChannel::Connectivity, &[true; 5]);

        assert!(m.on_return_due().is_empty());
        assert_eq!(
            m.state(),
            ConnectionState::RecoveringViaProbe(ProbeCycle::new(ProviderSlot::Primary))
        );

        let actions = feed(&mut m, FailureChannel::Connectivity, &[true; 5]);
        assert_eq!(actions, vec![Action::Recover(ProviderSlot::Primary)]);
        assert_eq!(m.state(), ConnectionState::PrimaryActive);
    }

    #[test]
    fn failure_on_fallback_cancels_pending_return() {
        let mut m = machine();
        m.on_failure(FailureChannel::Connectivity);
        feed(&mut m, FailureChannel::Connectivity, &[false; 5]);
        feed(&mut m, FailureChannel::Connectivity, &[true; 5]);

        let actions = m.on_failure(FailureChannel::Connectivity);
        assert_eq!(
            actions,
            vec![Action::CancelReturnToPrimary, Action::StopPipeline]
        );
        assert!(m.on_return_due().is_empty());
        assert_eq!(
            m.cycle(FailureChannel::Connectivity).map(|c| c.slot),
            Some(ProviderSlot::Fallback)
        );
    }

    #[test]
    fn same_channel_signals_are_ignored_while_probing() {
        let mut m = machine();
        m.on_failure(FailureChannel::Connectivity);
        feed(&mut m, FailureChannel::Connectivity, &[true, true]);

        assert!(m.on_failure(FailureChannel::Connectivity).is_empty());
        assert_eq!(
            m.cycle(FailureChannel::Connectivity).map(|c| c.consecutive_successes),
            Some(2)
        );
    }

    #[test]
    fn channels_keep_separate_counters() {
        let mut m = machine();
        m.on_failure(FailureChannel::Connectivity);
        assert_eq!(
            m.on_failure(FailureChannel::RegistryWrite),
            vec![Action::StopPipeline]
        );

        feed(&mut m, FailureChannel::RegistryWrite, &[true; 3]);
        feed(&mut m, FailureChannel::Connectivity, &[false; 2]);

        let connectivity = m.cycle(FailureChannel::Connectivity).unwrap();
        let registry = m.cycle(FailureChannel::RegistryWrite).unwrap();
        assert_eq!(connectivity.consecutive_failures, 2);
        assert_eq!(connectivity.consecutive_successes, 0);
        assert_eq!(registry.consecutive_successes, 3);

        // registry settles first but the pipeline waits for connectivity
        assert!(feed(&mut m, FailureChannel::RegistryWrite, &[true; 2]).is_empty());
        assert_eq!(
            feed(&mut m, FailureChannel::Connectivity, &[true; 5]),
            vec![Action::Recover(ProviderSlot::Primary)]
        );
    }
}
