//! Bounded compile, call and validate loop around a single agent call.
//!
//! A format violation is retried at once with a corrective note appended to
//! the instruction. A retryable backend failure is retried unchanged after
//! an exponential backoff. Anything else ends the call immediately. Only a
//! validated reply is ever written to the agent's history.

use crate::agent::Agent;
use crate::backend::LlmBackend;
use crate::error::{StoryError, StoryResult};
use crate::prompt::{correction, PromptCompiler};
use crate::validate::OutputContract;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// How many times to try a call and how long to wait between backend failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Must be at least 1.
    pub max_attempts: usize,
    /// Wait after the first backend failure.
    pub initial_backoff: Duration,
    /// Upper bound on any single wait.
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(8),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Default backoff with the given attempt budget.
    pub fn new(max_attempts: usize) -> StoryResult<Self> {
        let policy = Self {
            max_attempts,
            ..Self::default()
        };
        policy.validate()?;
        Ok(policy)
    }

    /// A policy that never sleeps. Useful against mock backends.
    pub fn immediate(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    pub fn validate(&self) -> StoryResult<()> {
        if self.max_attempts == 0 {
            return Err(StoryError::Config(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(StoryError::Config(
                "backoff_multiplier must be a finite number of at least 1.0".to_string(),
            ));
        }
        Ok(())
    }

    /// Wait before retrying after the `failures`-th backend failure in a row.
    ///
    /// A reply that reaches validation ends the run of failures.
    pub fn backoff(&self, failures: usize) -> Duration {
        let exponent = failures.saturating_sub(1).min(i32::MAX as usize) as i32;
        let secs = self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

/// A validated reply and how many attempts it took.
#[derive(Debug, Clone)]
pub struct Attempted<T> {
    pub output: T,
    /// The reply text as committed to history.
    pub raw: String,
    pub attempts: usize,
}

/// Where a call stands between attempts.
#[derive(Debug)]
pub enum RetryState<T> {
    Attempting { attempt: usize, instruction: String },
    Succeeded(Attempted<T>),
    ExhaustedFailure { attempts: usize, last_error: String },
}

/// Runs agent calls against a backend under a retry policy.
pub struct RetryController<'a> {
    backend: &'a dyn LlmBackend,
    policy: &'a RetryPolicy,
    compiler: PromptCompiler,
}

impl<'a> RetryController<'a> {
    pub fn new(backend: &'a dyn LlmBackend, policy: &'a RetryPolicy, compiler: PromptCompiler) -> Self {
        Self {
            backend,
            policy,
            compiler,
        }
    }

    /// Call `agent` with `instruction` until a reply satisfies `contract` or
    /// the attempt budget runs out.
    ///
    /// On success the uncorrected instruction and the reply are appended to
    /// the agent's history as one turn.
    pub async fn run<C: OutputContract>(
        &self,
        agent: &mut Agent,
        instruction: &str,
        contract: &C,
    ) -> StoryResult<Attempted<C::Output>> {
        self.policy.validate()?;

        let mut backend_failures = 0;
        let mut state = RetryState::Attempting {
            attempt: 1,
            instruction: instruction.to_string(),
        };

        loop {
            state = match state {
                RetryState::Attempting {
                    attempt,
                    instruction: current,
                } => {
                    self.attempt(agent, contract, instruction, attempt, current, &mut backend_failures)
                        .await?
                }
                RetryState::Succeeded(done) => return Ok(done),
                RetryState::ExhaustedFailure {
                    attempts,
                    last_error,
                } => {
                    warn!(
                        agent = agent.name(),
                        call_site = %contract.call_site(),
                        attempts,
                        "giving up"
                    );
                    return Err(StoryError::ExhaustedRetries {
                        call_site: contract.call_site(),
                        attempts,
                        last_error,
                    });
                }
            };
        }
    }

    async fn attempt<C: OutputContract>(
        &self,
        agent: &mut Agent,
        contract: &C,
        original: &str,
        attempt: usize,
        current: String,
        backend_failures: &mut usize,
    ) -> StoryResult<RetryState<C::Output>> {
        let call_site = contract.call_site();
        let messages = self.compiler.compile(agent, &current)?;

        debug!(
            agent = agent.name(),
            %call_site,
            attempt,
            max_attempts = self.policy.max_attempts,
            messages = messages.len(),
            backend = self.backend.name(),
            "sending request"
        );

        let last_error = match self.backend.complete(messages).await {
            Ok(reply) => {
                *backend_failures = 0;
                match contract.validate(&reply) {
                    Ok(output) => {
                        agent.record(original, reply.clone());
                        info!(agent = agent.name(), %call_site, attempt, "response accepted");
                        return Ok(RetryState::Succeeded(Attempted {
                            output,
                            raw: reply,
                            attempts: attempt,
                        }));
                    }
                    Err(violation) => {
                        warn!(
                            agent = agent.name(),
                            %call_site,
                            attempt,
                            reason = %violation,
                            "response failed validation"
                        );
                        if attempt < self.policy.max_attempts {
                            return Ok(RetryState::Attempting {
                                attempt: attempt + 1,
                                instruction: correction(original, &violation.reason),
                            });
                        }
                        violation.reason
                    }
                }
            }
            Err(e) if e.is_retryable() => {
                *backend_failures += 1;
                warn!(agent = agent.name(), %call_site, attempt, error = %e, "backend call failed");
                if attempt < self.policy.max_attempts {
                    let delay = self.policy.backoff(*backend_failures);
                    debug!(delay_ms = delay.as_millis() as u64, "backing off");
                    sleep(delay).await;
                    return Ok(RetryState::Attempting {
                        attempt: attempt + 1,
                        instruction: current,
                    });
                }
                e.to_string()
            }
            Err(e) => return Err(StoryError::Backend(e)),
        };

        Ok(RetryState::ExhaustedFailure {
            attempts: attempt,
            last_error,
        })
    }
}
