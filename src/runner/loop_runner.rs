//! LoopRunner - drives a registered loop until it finishes, is aborted or
//! runs out of steps.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::coordination::SharedCoordinator;
use crate::delegation::RenderOptions;
use crate::domain::{InjectedMessage, LoopKey, LoopOutcome, MessageType};
use crate::error::{ConvoyError, Result};
use crate::transport::DelegationTransport;
use crate::worktree::WorkingDirectoryResolver;

/// What a loop wants to do next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Record messages and keep going
    Continue { messages: Vec<String> },
    /// Record messages, then delegate and wait for every recipient
    Delegate {
        recipients: Vec<String>,
        request: String,
        phase: Option<String>,
        /// Branch whose worktree the delegated work happens in
        branch: Option<String>,
        messages: Vec<String>,
    },
    /// Record final messages and complete the loop
    Finish { messages: Vec<String> },
}

/// Inputs handed to the executor for one step
#[derive(Debug, Clone)]
pub struct StepContext {
    pub key: LoopKey,
    /// Zero-based step index
    pub step: u32,
    /// Messages injected since the previous step, oldest first
    pub injected: Vec<InjectedMessage>,
    /// Rendered XML of the most recently resolved delegation
    pub delegation_context: Option<String>,
    pub working_directory: Option<PathBuf>,
}

/// Produces the next step of a loop, typically by calling a language model
#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn next_step(&self, context: &StepContext) -> Result<Step>;
}

#[derive(Debug, Clone)]
pub struct LoopRunnerConfig {
    /// Upper bound on executor calls per loop
    pub max_steps: u32,
    pub render: RenderOptions,
}

impl Default for LoopRunnerConfig {
    fn default() -> Self {
        Self {
            max_steps: 50,
            render: RenderOptions::default(),
        }
    }
}

pub struct LoopRunner<E, T>
where
    E: StepExecutor,
    T: DelegationTransport,
{
    coordinator: SharedCoordinator,
    executor: Arc<E>,
    transport: Arc<T>,
    resolver: Option<Arc<dyn WorkingDirectoryResolver>>,
    config: LoopRunnerConfig,
}

impl<E, T> LoopRunner<E, T>
where
    E: StepExecutor,
    T: DelegationTransport,
{
    pub fn new(coordinator: SharedCoordinator, executor: Arc<E>, transport: Arc<T>) -> Self {
        Self {
            coordinator,
            executor,
            transport,
            resolver: None,
            config: LoopRunnerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: LoopRunnerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn WorkingDirectoryResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Drive `key` until it completes, is aborted or hits the step bound
    ///
    /// The loop must already be registered. The coordinator lock is never
    /// held across an await on the executor or transport. An executor or
    /// transport error ends the run but leaves the loop registered and
    /// running, so it can still be aborted or driven again.
    pub async fn run(&self, key: &LoopKey) -> Result<LoopOutcome> {
        if self.coordinator.lock().await.loop_status(key).is_none() {
            return Err(ConvoyError::LoopNotFound(key.to_string()));
        }

        tracing::info!(loop_key = %key, max_steps = self.config.max_steps, "Loop started");
        let mut delegation_context = None;
        let mut working_directory = None;

        for step in 0..self.config.max_steps {
            let injected = {
                let mut coordinator = self.coordinator.lock().await;
                if coordinator.is_aborted(key) {
                    drop(coordinator);
                    return self.finish_aborted(key, step).await;
                }
                let injected = coordinator.drain_injections(key);
                for message in &injected {
                    coordinator.add_message(
                        key,
                        format!("[Message from {}] {}", message.from, message.content),
                        MessageType::Injected,
                    )?;
                }
                injected
            };

            let context = StepContext {
                key: key.clone(),
                step,
                injected,
                delegation_context: delegation_context.take(),
                working_directory: working_directory.clone(),
            };
            let next = self.executor.next_step(&context).await?;
            tracing::debug!(loop_key = %key, step, "Executor returned step");

            match next {
                Step::Continue { messages } => {
                    let mut coordinator = self.coordinator.lock().await;
                    if coordinator.is_aborted(key) {
                        drop(coordinator);
                        return self.finish_aborted(key, step).await;
                    }
                    for message in messages {
                        coordinator.add_message(key, message, MessageType::Text)?;
                    }
                }
                Step::Delegate {
                    recipients,
                    request,
                    phase,
                    branch,
                    messages,
                } => {
                    if let (Some(branch), Some(resolver)) = (&branch, &self.resolver) {
                        working_directory = Some(resolver.resolve_working_directory(branch)?);
                    }

                    let (delegation_id, record) = {
                        let mut coordinator = self.coordinator.lock().await;
                        if coordinator.is_aborted(key) {
                            drop(coordinator);
                            return self.finish_aborted(key, step).await;
                        }
                        for message in messages {
                            coordinator.add_message(key, message, MessageType::Text)?;
                        }
                        let id = coordinator.delegate(key, recipients, &request, phase)?;
                        let record = coordinator
                            .ledger()
                            .get(&id)
                            .cloned()
                            .ok_or_else(|| ConvoyError::DelegationNotFound(id.clone()))?;
                        (id, record)
                    };

                    let event_id = match self.transport.publish_request(&record).await {
                        Ok(event_id) => event_id,
                        Err(e) => {
                            self.coordinator
                                .lock()
                                .await
                                .cancel_delegation(&delegation_id, &e.to_string())?;
                            return Err(e);
                        }
                    };
                    self.coordinator
                        .lock()
                        .await
                        .set_request_event_id(&delegation_id, event_id)?;

                    tracing::info!(loop_key = %key, delegation_id = %delegation_id, "Waiting for delegation");
                    self.wait_for_resolution(&delegation_id).await;

                    let mut coordinator = self.coordinator.lock().await;
                    let rendered = coordinator.render_delegation(&delegation_id, self.config.render);
                    if let Some(rendered) = &rendered {
                        coordinator.add_message(key, rendered.clone(), MessageType::DelegationResponse)?;
                    }
                    delegation_context = rendered;
                }
                Step::Finish { messages } => {
                    let mut coordinator = self.coordinator.lock().await;
                    if coordinator.is_aborted(key) {
                        drop(coordinator);
                        return self.finish_aborted(key, step).await;
                    }
                    for message in messages {
                        coordinator.add_message(key, message, MessageType::Text)?;
                    }
                    coordinator.complete_loop(key)?;
                    coordinator.save(&key.conversation)?;
                    tracing::info!(loop_key = %key, steps = step + 1, "Loop completed");
                    return Ok(LoopOutcome::Completed);
                }
            }
        }

        log::warn!("Loop {} reached its step limit of {}", key, self.config.max_steps);
        let mut coordinator = self.coordinator.lock().await;
        coordinator.complete_loop(key)?;
        coordinator.save(&key.conversation)?;
        Ok(LoopOutcome::StepLimit(self.config.max_steps))
    }

    async fn finish_aborted(&self, key: &LoopKey, step: u32) -> Result<LoopOutcome> {
        tracing::info!(loop_key = %key, step, "Loop observed abort");
        self.coordinator.lock().await.save(&key.conversation)?;
        Ok(LoopOutcome::Aborted)
    }

    async fn wait_for_resolution(&self, delegation_id: &str) {
        let changes = self.coordinator.lock().await.changes();
        loop {
            let notified = changes.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.coordinator.lock().await.is_resolved(delegation_id) {
                return;
            }
            notified.await;
        }
    }
}
