//! Discussion engine
//!
//! Drives a multi-agent discussion end to end: per-round speaker dispatch
//! through the resource dispatcher, consensus scoring, termination checks,
//! and cleanup of every sub-conversation the run created. Runtime failures
//! never escape `run`; callers always get a `DiscussionResult` whose status
//! tells them how the run ended.

mod handle;
mod prompt;

pub use handle::EngineHandle;

use crate::dispatch::{DispatchError, DispatchOptions, ResourceDispatcher, ShutdownOptions};
use crate::ports::{AgentGateway, GatewayError};
use crate::retry::{RetryError, RetryPolicy, with_retry};
use conclave_domain::{
    CompactorConfig, ConsensusConfig, ConsensusEvaluator, ConsensusReport, ContextBuildOptions,
    ContextCompactor, DiscussionError, DiscussionMode, DiscussionResult, DiscussionSettings,
    DiscussionState, DiscussionStatus, DomainError, Message, Participant, TRANSCRIPT_MIRROR_KEY,
    TerminationConfig, TerminationContext, TerminationManager, layer_consensus,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Errors raised at engine construction. Everything after `new` is reported
/// through the result's status instead.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid settings: {0}")]
    Config(#[from] DomainError),

    #[error("too many reference files: {count} (max {max})")]
    ReferenceFilesTooMany { count: usize, max: usize },

    #[error("reference file {path} too large: {size} bytes (max {max})")]
    ReferenceFileTooLarge {
        path: PathBuf,
        size: u64,
        max: u64,
    },

    #[error("reference files exceed the total budget: {total} bytes (max {max})")]
    ReferenceFilesTotalTooLarge { total: u64, max: u64 },

    #[error("failed to read reference file {path}: {source}")]
    ReferenceFileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Agent kind used for transcript mirror digests
const MIRROR_AGENT_KIND: &str = "general";

pub struct DiscussionEngine<G: AgentGateway + 'static> {
    gateway: Arc<G>,
    root_session: String,
    settings: DiscussionSettings,
    mode: Box<dyn DiscussionMode>,
    dispatcher: Arc<ResourceDispatcher>,
    evaluator: ConsensusEvaluator,
    termination: TerminationManager,
    compactor: ContextCompactor,
    state: DiscussionState,
    base_context: String,
    handle: EngineHandle,
    retry_policy: RetryPolicy,
    latest_report: Option<ConsensusReport>,
    termination_reason: Option<String>,
    early_termination: bool,
}

impl<G: AgentGateway + 'static> DiscussionEngine<G> {
    /// Validate settings, sandbox reference files, and wire up the
    /// sub-components. Fails closed before any transport call is made.
    pub fn new(
        gateway: Arc<G>,
        root_session: impl Into<String>,
        settings: DiscussionSettings,
    ) -> Result<Self, EngineError> {
        settings.validate()?;
        let files = prompt::load_reference_files(&settings)?;
        let base_context = prompt::base_context(&settings, &files);

        let mode = settings.mode.resolve();
        let mut consensus_overrides = settings.consensus.clone();
        layer_consensus(&mut consensus_overrides, &mode.consensus_overrides());
        let evaluator =
            ConsensusEvaluator::new(ConsensusConfig::default().merged(&consensus_overrides));
        let termination = TerminationManager::new(
            mode.termination_rules(),
            TerminationConfig::merged(&settings.termination),
        );
        let compactor = ContextCompactor::new(CompactorConfig::merged(&settings.compactor));
        let dispatcher = Arc::new(ResourceDispatcher::new(settings.concurrency));

        let root_session = root_session.into();
        let state = DiscussionState::new(
            root_session.clone(),
            settings.topic.clone(),
            settings.participants.clone(),
            settings.max_rounds,
        );
        let retry_policy = RetryPolicy::default().with_retries(settings.max_retries);

        Ok(Self {
            gateway,
            root_session,
            settings,
            mode,
            dispatcher,
            evaluator,
            termination,
            compactor,
            state,
            base_context,
            handle: EngineHandle::new(),
            retry_policy,
            latest_report: None,
            termination_reason: None,
            early_termination: false,
        })
    }

    /// Replace the backoff policy, mainly to shorten delays under test
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    pub fn state(&self) -> &DiscussionState {
        &self.state
    }

    /// Run the discussion to completion, early termination, or cancellation.
    /// Cleanup always runs, whatever way the round loop exits.
    pub async fn run(&mut self) -> DiscussionResult {
        let started = Instant::now();
        self.state.set_status(DiscussionStatus::Running);
        info!(topic = %self.state.topic, mode = %self.settings.mode, rounds = self.settings.max_rounds, "discussion started");

        if self.settings.transcript_mirror {
            self.ensure_transcript_mirror().await;
        }

        let loop_result = self.run_rounds(started).await;

        let conclusion = if self.state.messages.is_empty() {
            String::new()
        } else {
            self.mode
                .generate_conclusion(&self.state.messages, &self.state.topic)
        };

        match &loop_result {
            Err(err) => {
                warn!(error = %err, "round loop failed");
                self.state.stop_reason = Some(err.to_string());
                self.state.set_status(DiscussionStatus::Failed);
            }
            Ok(()) if self.handle.is_cancelled() => {
                self.state.stop_reason = self.handle.stop_reason();
                self.state.set_status(DiscussionStatus::Cancelled);
            }
            Ok(()) => {
                self.state.set_status(DiscussionStatus::Completed);
            }
        }

        self.cleanup().await;

        info!(
            status = %self.state.status,
            rounds = self.state.current_round,
            messages = self.state.messages.len(),
            "discussion finished"
        );

        DiscussionResult {
            topic: self.state.topic.clone(),
            messages: self.state.messages.clone(),
            conclusion,
            consensus_score: self
                .latest_report
                .as_ref()
                .map(|r| r.overall_score)
                .unwrap_or(0.0),
            rounds: self.state.current_round,
            duration_ms: started.elapsed().as_millis() as u64,
            status: self.state.status,
            stop_reason: self.state.stop_reason.clone(),
            errors: self.state.errors.clone(),
            consensus_report: self.latest_report.clone(),
            termination_reason: self.termination_reason.clone(),
            early_termination: self.early_termination,
            created_session_ids: self.state.created_session_ids(),
        }
    }

    async fn run_rounds(&mut self, started: Instant) -> Result<(), DomainError> {
        for round in 1..=self.settings.max_rounds {
            if self.handle.is_cancelled() {
                break;
            }
            if self.handle.is_paused() {
                self.state.set_status(DiscussionStatus::Paused);
                while self.handle.is_paused() && !self.handle.is_cancelled() {
                    tokio::time::sleep(Duration::from_millis(25)).await;
                }
                self.state.set_status(DiscussionStatus::Running);
            }
            if self.handle.is_cancelled() {
                break;
            }

            self.state.begin_round(round)?;
            self.run_round(round).await?;

            if self.handle.is_cancelled() {
                break;
            }

            let report = self.evaluator.evaluate(&self.state.messages);
            let context = TerminationContext {
                messages: self.state.messages.clone(),
                current_round: round,
                max_rounds: self.settings.max_rounds,
                consensus_report: report.clone(),
                mode: self.mode.name().to_string(),
                elapsed: started.elapsed(),
            };
            self.latest_report = Some(report);

            let signal = self.termination.should_terminate(&context);
            if signal.should_stop {
                info!(reason = ?signal.reason, confidence = signal.confidence, "early termination");
                self.termination_reason = signal.reason;
                self.early_termination = round < self.settings.max_rounds;
                break;
            }
        }
        Ok(())
    }

    async fn run_round(&mut self, round: u32) -> Result<(), DomainError> {
        let speakers = self
            .mode
            .speakers(round, self.settings.max_rounds, &self.state.participants);
        debug!(round, speakers = ?speakers, "round speakers");

        // Contexts are built sequentially up front; the compactor is
        // engine-owned and never crosses a task boundary
        let mut jobs = Vec::new();
        for name in speakers {
            let Some(participant) = self.state.participant(&name).cloned() else {
                self.state.record_error(
                    DiscussionError::new("speaker not found among participants")
                        .for_agent(name, round)
                        .with_code("unknown_speaker"),
                );
                continue;
            };
            let compacted = self.compactor.build_context(
                &self.state.messages,
                &ContextBuildOptions {
                    current_round: round,
                    agent_name: Some(name.clone()),
                    base_context: Some(self.base_context.clone()),
                    topic: self.state.topic.clone(),
                },
            );
            let role = self.mode.agent_role(&participant);
            let prompt_text = prompt::speaker_prompt(
                &participant,
                &role,
                &self.state.topic,
                &compacted.content,
                self.settings.mode,
            );
            let existing = self.state.sub_conversation_ids.get(&name).cloned();
            jobs.push(SpeakerJob {
                participant,
                prompt: prompt_text,
                existing_session: existing,
            });
        }

        let mut set: JoinSet<SpeakerOutcome> = JoinSet::new();
        for job in jobs {
            let gateway = self.gateway.clone();
            let dispatcher = self.dispatcher.clone();
            let policy = self.retry_policy.clone();
            let external = self.handle.token();
            let root = self.root_session.clone();
            let timeout = self.settings.call_timeout;
            set.spawn(async move {
                execute_speaker(gateway, dispatcher, policy, external, root, timeout, round, job)
                    .await
            });
        }

        // Insertion order is completion order, not speaker-list order
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(outcome) => self.absorb_outcome(outcome)?,
                Err(join_err) => {
                    self.state.record_error(
                        DiscussionError::new(format!("speaker task panicked: {join_err}"))
                            .with_code("panic"),
                    );
                }
            }
        }

        if self.settings.transcript_mirror {
            self.mirror_round(round).await;
        }
        Ok(())
    }

    fn absorb_outcome(&mut self, outcome: SpeakerOutcome) -> Result<(), DomainError> {
        if let Some(id) = outcome.created_session {
            self.state
                .sub_conversation_ids
                .insert(outcome.speaker.clone(), id);
        }
        if let Some(content) = outcome.reply {
            info!(agent = %outcome.speaker, round = outcome.round, "message received");
            self.state
                .append_message(Message::new(outcome.speaker.clone(), content, outcome.round))?;
        }
        if let Some(error) = outcome.error {
            warn!(agent = %outcome.speaker, round = outcome.round, message = %error.message, "speaker failed");
            self.state.record_error(error);
        }
        Ok(())
    }

    /// Best effort: a failed mirror never affects the run
    async fn ensure_transcript_mirror(&mut self) {
        let gateway = self.gateway.clone();
        let root = self.root_session.clone();
        let title = format!("Discussion Transcript: {}", self.state.topic);
        let token = self.handle.token();
        let created = with_retry(&self.retry_policy, &token, move |t| {
            let gateway = gateway.clone();
            let root = root.clone();
            let title = title.clone();
            async move { gateway.create_sub_conversation(&root, &title, &t).await }
        })
        .await;
        match created {
            Ok(id) => {
                debug!(id = %id, "transcript mirror created");
                self.state
                    .sub_conversation_ids
                    .insert(TRANSCRIPT_MIRROR_KEY.to_string(), id);
            }
            Err(err) => warn!(error = %err, "transcript mirror unavailable"),
        }
    }

    async fn mirror_round(&mut self, round: u32) {
        let Some(mirror_id) = self
            .state
            .sub_conversation_ids
            .get(TRANSCRIPT_MIRROR_KEY)
            .cloned()
        else {
            return;
        };
        let digest = prompt::round_digest(round, &self.state.messages);
        let token = self.handle.token();
        if let Err(err) = self
            .gateway
            .prompt_agent(MIRROR_AGENT_KIND, &digest, &mirror_id, &token)
            .await
        {
            warn!(round, error = %err, "transcript digest failed");
        }
    }

    /// Shut the dispatcher down and delete created sub-conversations.
    /// The whole phase is bounded; per-id failures are logged and never
    /// block the siblings.
    async fn cleanup(&mut self) {
        let window = self.settings.cleanup_timeout;
        if tokio::time::timeout(window, self.cleanup_inner())
            .await
            .is_err()
        {
            warn!(window_ms = window.as_millis() as u64, "cleanup window elapsed");
        }
    }

    async fn cleanup_inner(&mut self) {
        let drain = ShutdownOptions {
            await_idle: true,
            timeout: self.settings.cleanup_timeout / 2,
        };
        if let Err(DispatchError::ShutdownTimeout) = self.dispatcher.shutdown(drain).await {
            warn!("dispatcher drain incomplete, proceeding with cleanup");
        }

        if self.settings.keep_sessions {
            info!("keep_sessions set, leaving sub-conversations in place");
            return;
        }
        let ids = self.state.created_session_ids();
        if ids.is_empty() {
            return;
        }
        info!(count = ids.len(), "deleting sub-conversations");
        let deletions = ids.into_iter().map(|id| {
            let gateway = self.gateway.clone();
            async move {
                if let Err(err) = gateway.delete_sub_conversation(&id).await {
                    warn!(id = %id, error = %err, "failed to delete sub-conversation");
                }
            }
        });
        futures::future::join_all(deletions).await;
    }
}

struct SpeakerJob {
    participant: Participant,
    prompt: String,
    existing_session: Option<String>,
}

struct SpeakerOutcome {
    speaker: String,
    round: u32,
    reply: Option<String>,
    /// Sub-conversation created by this task, recorded even when the
    /// prompt itself failed so cleanup can find it
    created_session: Option<String>,
    error: Option<DiscussionError>,
}

struct TaskResult {
    created: Option<String>,
    reply: Result<String, RetryError<GatewayError>>,
}

#[allow(clippy::too_many_arguments)]
async fn execute_speaker<G: AgentGateway>(
    gateway: Arc<G>,
    dispatcher: Arc<ResourceDispatcher>,
    policy: RetryPolicy,
    external: CancellationToken,
    root_session: String,
    timeout: Duration,
    round: u32,
    job: SpeakerJob,
) -> SpeakerOutcome {
    let speaker = job.participant.name.clone();
    let options = DispatchOptions {
        timeout: Some(timeout),
        external: Some(external),
    };

    let dispatched = dispatcher
        .dispatch(options, move |token| async move {
            let (session_id, created) = match job.existing_session {
                Some(id) => (id, None),
                None => {
                    // Sub-conversation creation is a remote call and is
                    // itself retried
                    let title = format!("Discussion Agent: {}", job.participant.name);
                    let create = with_retry(&policy, &token, |t| {
                        let gateway = gateway.clone();
                        let root = root_session.clone();
                        let title = title.clone();
                        async move { gateway.create_sub_conversation(&root, &title, &t).await }
                    })
                    .await;
                    match create {
                        Ok(id) => (id.clone(), Some(id)),
                        Err(err) => {
                            return TaskResult {
                                created: None,
                                reply: Err(err),
                            };
                        }
                    }
                }
            };

            let kind = job.participant.agent_kind.clone();
            let prompt = job.prompt.clone();
            let reply = with_retry(&policy, &token, |t| {
                let gateway = gateway.clone();
                let kind = kind.clone();
                let prompt = prompt.clone();
                let session = session_id.clone();
                async move { gateway.prompt_agent(&kind, &prompt, &session, &t).await }
            })
            .await;
            TaskResult { created, reply }
        })
        .await;

    match dispatched {
        Ok(TaskResult { created, reply }) => match reply {
            Ok(content) => SpeakerOutcome {
                speaker,
                round,
                reply: Some(content),
                created_session: created,
                error: None,
            },
            // Cancellation means "no message", not a user-facing failure
            Err(RetryError::Cancelled { .. }) => SpeakerOutcome {
                speaker,
                round,
                reply: None,
                created_session: created,
                error: None,
            },
            Err(RetryError::Failed { source, attempts }) => {
                let error = if source.is_cancelled() {
                    None
                } else {
                    Some(
                        DiscussionError::new(source.to_string())
                            .for_agent(speaker.clone(), round)
                            .with_code(source.code())
                            .with_retry_count(attempts),
                    )
                };
                SpeakerOutcome {
                    speaker,
                    round,
                    reply: None,
                    created_session: created,
                    error,
                }
            }
        },
        Err(DispatchError::Timeout(deadline)) => SpeakerOutcome {
            speaker: speaker.clone(),
            round,
            reply: None,
            created_session: None,
            error: Some(
                DiscussionError::new(format!("agent call timed out after {deadline:?}"))
                    .for_agent(speaker, round)
                    .with_code("timeout"),
            ),
        },
        // Shutdown during dispatch is cancellation from the task's view
        Err(DispatchError::ShuttingDown | DispatchError::ShutdownTimeout) => SpeakerOutcome {
            speaker,
            round,
            reply: None,
            created_session: None,
            error: None,
        },
    }
}
