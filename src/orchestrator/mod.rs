//! The generate/verify control loop.
//!
//! A run alternates two steps until the program exits cleanly or the
//! attempt budget is spent:
//! - generate: ask the models for a program, feeding back the last failure
//! - verify: run that program in a fresh sandbox session
//!
//! Every per-attempt failure is folded into the run's logs; nothing raised
//! inside an attempt ends the run early.

mod prompt;

use std::sync::Arc;
use tracing::{info, warn};

use crate::extract::{extract, Confidence};
use crate::model::FallbackInvoker;
use crate::sandbox::{run_in_session, Sandbox, SessionOutcome};
use crate::state::{RunState, RunStatus};

pub(crate) use prompt::{build_user_prompt, SYSTEM_INSTRUCTION};

/// Hard ceiling on attempts per run.
pub(crate) const MAX_ATTEMPTS: u32 = 3;

/// Log entry written when generation yields nothing to run.
pub(crate) const EMPTY_CODE_LOG: &str = "Error: model returned empty code.";

/// What the loop does after a verify step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Route {
    Finish,
    Regenerate,
}

/// Decides whether the run is over.
pub(crate) fn route(state: &RunState, max_attempts: u32) -> Route {
    if state.status() == RunStatus::Success || state.attempts() >= max_attempts {
        Route::Finish
    } else {
        Route::Regenerate
    }
}

/// Details of a successful generate step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Generation {
    pub model: String,
    pub confidence: Confidence,
}

/// Progress notifications emitted while a run advances.
#[derive(Debug)]
pub(crate) enum LoopEvent<'a> {
    AttemptStarted { attempt: u32, max_attempts: u32 },
    Generated { generation: &'a Generation, code: &'a str },
    Verified { state: &'a RunState },
}

pub(crate) struct Orchestrator {
    invoker: FallbackInvoker,
    sandbox: Arc<dyn Sandbox>,
    max_attempts: u32,
}

impl Orchestrator {
    /// `max_attempts` is clamped to `1..=MAX_ATTEMPTS`; every run generates
    /// at least once.
    pub fn new(invoker: FallbackInvoker, sandbox: Arc<dyn Sandbox>, max_attempts: u32) -> Self {
        if max_attempts > MAX_ATTEMPTS {
            warn!(
                "Attempt budget {} exceeds the limit, using {}",
                max_attempts, MAX_ATTEMPTS
            );
        }

        Self {
            invoker,
            sandbox,
            max_attempts: max_attempts.clamp(1, MAX_ATTEMPTS),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub async fn run(&self, task: &str) -> RunState {
        self.run_with(task, |_| {}).await
    }

    /// Runs the loop to a terminal state, reporting progress to `observe`.
    pub async fn run_with<F>(&self, task: &str, mut observe: F) -> RunState
    where
        F: FnMut(LoopEvent<'_>) + Send,
    {
        let mut state = RunState::new(task);

        info!(
            event = "loop_start",
            max_attempts = self.max_attempts,
            models = self.invoker.models().len(),
            provider = self.invoker.provider(),
        );

        loop {
            observe(LoopEvent::AttemptStarted {
                attempt: state.attempts() + 1,
                max_attempts: self.max_attempts,
            });

            if let Some(generation) = self.generate_step(&mut state).await {
                observe(LoopEvent::Generated {
                    generation: &generation,
                    code: state.code(),
                });
            }

            self.verify_step(&mut state).await;
            observe(LoopEvent::Verified { state: &state });

            match route(&state, self.max_attempts) {
                Route::Finish => break,
                Route::Regenerate => info!("Retrying with the last failure as feedback"),
            }
        }

        state.finish();

        let reason = match state.status() {
            RunStatus::Success => "success",
            _ => "max_attempts_reached",
        };
        info!(
            event = "loop_end",
            attempts = state.attempts(),
            status = %state.status(),
            reason,
        );

        state
    }

    /// Asks the models for a program and stores the extracted code.
    ///
    /// Returns `None` when every model failed; the failure is already logged
    /// into `state` with empty code.
    pub(crate) async fn generate_step(&self, state: &mut RunState) -> Option<Generation> {
        let feedback = state.last_failure().map(ToString::to_string);
        let attempt = state.begin_attempt();

        info!(
            event = "attempt_start",
            attempt,
            with_feedback = feedback.is_some(),
        );

        let user_prompt = build_user_prompt(state.task(), feedback.as_deref());

        match self.invoker.invoke(SYSTEM_INSTRUCTION, &user_prompt).await {
            Ok(invocation) => {
                let extraction = extract(&invocation.content);
                if extraction.confidence == Confidence::Raw {
                    warn!(
                        "No code fence in response from {}; using the whole answer",
                        invocation.model
                    );
                }
                state.set_code(extraction.code);
                Some(Generation {
                    model: invocation.model,
                    confidence: extraction.confidence,
                })
            }
            Err(e) => {
                warn!(event = "generation_failed", attempt, error = %e);
                state.set_code(String::new());
                state.record_failure(format!("Generation failed: {e}"));
                None
            }
        }
    }

    /// Runs the current code in a fresh session and records the outcome.
    pub(crate) async fn verify_step(&self, state: &mut RunState) {
        if state.code().is_empty() {
            state.record_failure(EMPTY_CODE_LOG.to_string());
            return;
        }

        let outcome = run_in_session(self.sandbox.as_ref(), state.code()).await;

        match outcome {
            SessionOutcome::Completed(result) if result.succeeded() => {
                state.record_success(format!(
                    "Execution Successful.\nOutput:\n{}",
                    result.output.trim()
                ));
            }
            SessionOutcome::Completed(result) => {
                state.record_failure(format!(
                    "Runtime Error (exit {}):\n{}",
                    result.exit_code,
                    result.output.trim()
                ));
            }
            SessionOutcome::Crashed(message) => {
                state.record_failure(format!("System Error: {message}"));
            }
        }

        info!(
            event = "attempt_end",
            attempt = state.attempts(),
            status = %state.status(),
        );
    }
}
