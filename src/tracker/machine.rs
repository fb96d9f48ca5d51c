use tokio::time::{Instant, sleep, timeout_at};

use super::job::{JobStatus, Strategy, TrackOutcome, TrackReport, TrackerConfig};
use super::sink::ProgressSink;
use super::state::TrackerState;
use crate::comfy::messages::ExecutingData;
use crate::comfy::{EventChannel, HistorySource, JobHandle, ServerMessage};

/// Follows one submitted job to a terminal outcome.
///
/// Events from the push channel are preferred; when the channel is missing,
/// closes or errors, the tracker falls back to polling the history endpoint
/// until the deadline. Channel trouble never fails the job by itself.
pub struct ProgressTracker<'a, H: ?Sized, S: ?Sized> {
    history: &'a H,
    sink: &'a S,
    config: TrackerConfig,
}

enum StreamEnd {
    Finished(TrackOutcome),
    /// Completion was announced but the history entry is not there yet.
    Unrecorded,
    Lost,
    DeadlineReached,
}

struct Run {
    transitions: Vec<TrackerState>,
    polls: u32,
}

impl<'a, H, S> ProgressTracker<'a, H, S>
where
    H: HistorySource + ?Sized,
    S: ProgressSink + ?Sized,
{
    pub fn new(history: &'a H, sink: &'a S, config: TrackerConfig) -> Self {
        Self {
            history,
            sink,
            config,
        }
    }

    /// Tracks `handle`. `channel` must have been opened with the handle's
    /// client id before submission; `None` means polling only.
    pub async fn track<C: EventChannel>(
        &self,
        handle: &JobHandle,
        channel: Option<C>,
    ) -> TrackReport {
        let started = Instant::now();
        let deadline = started + self.config.timeout;
        let mut run = Run {
            transitions: vec![TrackerState::Connecting],
            polls: 0,
        };

        let (status, strategy) = match channel {
            Some(mut channel) => {
                self.enter(&mut run, TrackerState::Streaming);
                match self.stream(handle, &mut channel, deadline).await {
                    StreamEnd::Finished(outcome) => (outcome, Strategy::Push),
                    StreamEnd::Unrecorded => {
                        self.enter(&mut run, TrackerState::Polling);
                        (self.poll(handle, deadline, &mut run).await, Strategy::Polling)
                    }
                    StreamEnd::Lost => {
                        tracing::warn!(prompt_id = %handle.id, "push channel lost; falling back to polling");
                        self.enter(&mut run, TrackerState::ChannelLost);
                        self.enter(&mut run, TrackerState::Polling);
                        (self.poll(handle, deadline, &mut run).await, Strategy::Polling)
                    }
                    StreamEnd::DeadlineReached => {
                        tracing::debug!(prompt_id = %handle.id, "deadline reached while streaming");
                        self.enter(&mut run, TrackerState::Polling);
                        let outcome = self
                            .poll_once(handle, &mut run)
                            .await
                            .unwrap_or(TrackOutcome::TimedOut);
                        (outcome, Strategy::Polling)
                    }
                }
            }
            None => {
                self.enter(&mut run, TrackerState::ChannelLost);
                self.enter(&mut run, TrackerState::Polling);
                (self.poll(handle, deadline, &mut run).await, Strategy::Polling)
            }
        };

        let terminal = match &status {
            TrackOutcome::Succeeded(_) => TrackerState::Succeeded,
            TrackOutcome::Failed(_) => TrackerState::Failed,
            TrackOutcome::TimedOut => TrackerState::TimedOut,
        };
        self.enter(&mut run, terminal);

        TrackReport {
            job_id: handle.id.clone(),
            status,
            transitions: run.transitions,
            polls: run.polls,
            strategy,
            elapsed: started.elapsed(),
            timeout: self.config.timeout,
        }
    }

    async fn stream<C: EventChannel>(
        &self,
        handle: &JobHandle,
        channel: &mut C,
        deadline: Instant,
    ) -> StreamEnd {
        loop {
            let event = match timeout_at(deadline, channel.next_event()).await {
                Err(_) => return StreamEnd::DeadlineReached,
                Ok(Ok(Some(event))) => event,
                Ok(Ok(None)) => return StreamEnd::Lost,
                Ok(Err(e)) => {
                    tracing::warn!(prompt_id = %handle.id, error = %e, "push channel error");
                    return StreamEnd::Lost;
                }
            };

            if event.prompt_id().is_some_and(|id| id != handle.id) {
                tracing::trace!(prompt_id = ?event.prompt_id(), "ignoring event for another job");
                continue;
            }

            match event {
                ServerMessage::Progress(p) => self.sink.progress(p.value, p.max),
                ServerMessage::ExecutionStart(_) => {
                    tracing::debug!(prompt_id = %handle.id, "execution started");
                    self.sink.status(&JobStatus::Executing { node: None });
                }
                ServerMessage::Executing(ExecutingData {
                    node: Some(node), ..
                }) => {
                    tracing::debug!(prompt_id = %handle.id, %node, "executing node");
                    self.sink.status(&JobStatus::Executing { node: Some(node) });
                }
                ServerMessage::Executing(ExecutingData { node: None, .. }) => {
                    tracing::debug!(prompt_id = %handle.id, "completion announced");
                    return self.completion(handle).await;
                }
                ServerMessage::ExecutionError(e) => {
                    tracing::debug!(prompt_id = %handle.id, node = ?e.node_id, "execution error event");
                    return StreamEnd::Finished(TrackOutcome::Failed(e.exception_message));
                }
                ServerMessage::ExecutionCached(c) => {
                    tracing::debug!(prompt_id = %handle.id, cached = c.nodes.len(), "nodes served from cache");
                }
                ServerMessage::Executed(d) => {
                    tracing::debug!(prompt_id = %handle.id, node = %d.node, "node produced output");
                }
                ServerMessage::Status(s) => {
                    tracing::trace!(queue_remaining = s.status.exec_info.queue_remaining, "queue status");
                }
            }
        }
    }

    /// The single history read after a completion event. Not a poll.
    async fn completion(&self, handle: &JobHandle) -> StreamEnd {
        match self.history.history(&handle.id).await {
            Ok(Some(entry)) => match entry.job_status() {
                JobStatus::Succeeded(outputs) => StreamEnd::Finished(TrackOutcome::Succeeded(outputs)),
                JobStatus::Failed(message) => StreamEnd::Finished(TrackOutcome::Failed(message)),
                _ => StreamEnd::Unrecorded,
            },
            Ok(None) => StreamEnd::Unrecorded,
            Err(e) => {
                tracing::warn!(prompt_id = %handle.id, error = %e, "history lookup after completion failed");
                StreamEnd::Unrecorded
            }
        }
    }

    async fn poll(&self, handle: &JobHandle, deadline: Instant, run: &mut Run) -> TrackOutcome {
        loop {
            if let Some(outcome) = self.poll_once(handle, run).await {
                return outcome;
            }
            let now = Instant::now();
            if now >= deadline {
                return TrackOutcome::TimedOut;
            }
            sleep(self.config.poll_interval.min(deadline - now)).await;
        }
    }

    async fn poll_once(&self, handle: &JobHandle, run: &mut Run) -> Option<TrackOutcome> {
        run.polls += 1;
        tracing::debug!(prompt_id = %handle.id, attempt = run.polls, "polling history");

        let status = match self.history.history(&handle.id).await {
            Ok(Some(entry)) => entry.job_status(),
            Ok(None) => JobStatus::Queued,
            Err(e) => {
                tracing::warn!(prompt_id = %handle.id, attempt = run.polls, error = %e, "history poll failed");
                return None;
            }
        };
        self.sink.status(&status);

        match status {
            JobStatus::Succeeded(outputs) => Some(TrackOutcome::Succeeded(outputs)),
            JobStatus::Failed(message) => Some(TrackOutcome::Failed(message)),
            JobStatus::Queued | JobStatus::Executing { .. } => None,
        }
    }

    fn enter(&self, run: &mut Run, next: TrackerState) {
        let from = run
            .transitions
            .last()
            .copied()
            .unwrap_or(TrackerState::Connecting);
        debug_assert!(
            from.can_transition_to(next),
            "illegal tracker transition {from} -> {next}"
        );
        tracing::debug!(%from, to = %next, "tracker state");
        self.sink.state_changed(from, next);
        run.transitions.push(next);
    }
}
