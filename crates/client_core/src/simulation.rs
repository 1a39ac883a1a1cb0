//! Branching-scenario player.
//!
//! ```text
//! Loading -> Ready(i) -> Answered(i) -> continue -> Ready(i + 1)
//!                   \-> Finished (answer on the last step)
//! restart: any loaded state -> Ready(0)
//! ```

use std::sync::Arc;

use shared::{
    domain::{completion_percent, ContentId, ModuleId, OptionId},
    protocol::{SimulationAttempt, SimulationStateRecord, SimulationStep, StepOption},
};
use thiserror::Error;
use tracing::{info, warn};

use crate::{error::ClientError, SimulationApi};

pub const CORRECT_SCORE: u32 = 100;

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error(transparent)]
    Api(#[from] ClientError),
    #[error("no simulation steps available for module {0}")]
    NoSimulation(ModuleId),
    #[error("simulation is not loaded")]
    NotLoaded,
    #[error("step {} is already answered; restart to answer again", .step + 1)]
    StepLocked { step: usize },
    #[error("option {0} does not belong to the current step")]
    UnknownOption(OptionId),
    #[error("answer the current step before continuing")]
    NotAnswered,
    #[error("simulation already finished")]
    AlreadyFinished,
}

/// Whether the server holds the attempt behind a local lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptSync {
    Recorded,
    /// The write failed; the lock stands locally but the server may not
    /// have the answer.
    Failed(String),
    /// Lock restored from persisted state on load.
    Resumed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockedAnswer {
    pub option_id: OptionId,
    pub is_correct: bool,
    pub feedback: String,
    pub sync: AttemptSync,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerState {
    Loading,
    Unavailable { reason: String },
    Ready { step_index: usize },
    Answered { step_index: usize, answer: LockedAnswer },
    Finished { step_index: usize, answer: LockedAnswer },
}

#[derive(Debug, Clone)]
pub struct Scenario {
    pub module_id: ModuleId,
    pub module_title: String,
    pub content_id: ContentId,
    pub content_title: String,
    pub content_body: String,
    pub steps: Vec<SimulationStep>,
}

pub struct SimulationPlayer {
    api: Arc<dyn SimulationApi>,
    scenario: Option<Scenario>,
    state: PlayerState,
}

impl SimulationPlayer {
    pub fn new(api: Arc<dyn SimulationApi>) -> Self {
        Self {
            api,
            scenario: None,
            state: PlayerState::Loading,
        }
    }

    /// Loads the module, then resumes from persisted state. Load failures
    /// leave the player `Unavailable`; there is no retry.
    pub async fn load(&mut self, module_id: ModuleId) -> Result<(), PlayerError> {
        self.scenario = None;
        self.state = PlayerState::Loading;

        let module = match self.api.module_detail(module_id).await {
            Ok(module) => module,
            Err(err) => return Err(self.unavailable(err.into())),
        };

        let Some(content) = module.simulation_content() else {
            return Err(self.unavailable(PlayerError::NoSimulation(module_id)));
        };
        let mut steps = content.steps.clone();
        steps.sort_by_key(|step| step.order);
        let scenario = Scenario {
            module_id,
            module_title: module.title.clone(),
            content_id: content.id,
            content_title: content.title.clone(),
            content_body: content.body.clone(),
            steps,
        };

        let record = match self.api.simulation_state(scenario.content_id).await {
            Ok(record) => record.unwrap_or_default(),
            Err(err) => return Err(self.unavailable(err.into())),
        };

        self.state = resume_state(&scenario, &record);
        info!(
            module_id = module_id.0,
            content_id = scenario.content_id.0,
            steps = scenario.steps.len(),
            state = ?self.state,
            "simulation: loaded"
        );
        self.scenario = Some(scenario);
        Ok(())
    }

    fn unavailable(&mut self, err: PlayerError) -> PlayerError {
        self.state = PlayerState::Unavailable {
            reason: err.to_string(),
        };
        err
    }

    /// Locks `option_id` as the answer of the current step and records the
    /// attempt. A failed write is logged and does not undo the lock.
    pub async fn select_option(
        &mut self,
        option_id: OptionId,
    ) -> Result<LockedAnswer, PlayerError> {
        let scenario = self.scenario.as_ref().ok_or(PlayerError::NotLoaded)?;
        let step_index = match &self.state {
            PlayerState::Ready { step_index } => *step_index,
            PlayerState::Answered { step_index, .. } | PlayerState::Finished { step_index, .. } => {
                return Err(PlayerError::StepLocked { step: *step_index })
            }
            PlayerState::Loading | PlayerState::Unavailable { .. } => {
                return Err(PlayerError::NotLoaded)
            }
        };
        let step = &scenario.steps[step_index];
        let option = step
            .option(option_id)
            .ok_or(PlayerError::UnknownOption(option_id))?;

        let attempt = SimulationAttempt {
            content_id: scenario.content_id,
            step_id: step.id,
            is_correct: option.is_correct,
            score: if option.is_correct { CORRECT_SCORE } else { 0 },
            selected_option_id: option.id,
        };
        let mut answer = LockedAnswer {
            option_id: option.id,
            is_correct: option.is_correct,
            feedback: option.feedback.clone(),
            sync: AttemptSync::Recorded,
        };
        let is_last = step_index + 1 == scenario.steps.len();

        if let Err(err) = self.api.submit_attempt(&attempt).await {
            warn!(
                content_id = attempt.content_id.0,
                step_id = attempt.step_id.0,
                "simulation: attempt write failed, keeping local lock: {err}"
            );
            answer.sync = AttemptSync::Failed(err.to_string());
        }

        self.state = if is_last {
            PlayerState::Finished {
                step_index,
                answer: answer.clone(),
            }
        } else {
            PlayerState::Answered {
                step_index,
                answer: answer.clone(),
            }
        };
        Ok(answer)
    }

    /// Advances past an answered step. Never writes to the backend.
    pub fn continue_to_next(&mut self) -> Result<usize, PlayerError> {
        let step_index = match &self.state {
            PlayerState::Answered { step_index, .. } => *step_index,
            PlayerState::Ready { .. } => return Err(PlayerError::NotAnswered),
            PlayerState::Finished { .. } => return Err(PlayerError::AlreadyFinished),
            PlayerState::Loading | PlayerState::Unavailable { .. } => {
                return Err(PlayerError::NotLoaded)
            }
        };
        let next = step_index + 1;
        self.state = PlayerState::Ready { step_index: next };
        Ok(next)
    }

    /// Clears persisted state, then every local lock. Callers confirm with
    /// the user first. On failure the local state is left untouched.
    pub async fn restart(&mut self) -> Result<(), PlayerError> {
        let scenario = self.scenario.as_ref().ok_or(PlayerError::NotLoaded)?;
        self.api.reset_simulation(scenario.content_id).await?;
        info!(content_id = scenario.content_id.0, "simulation: restarted");
        self.state = PlayerState::Ready { step_index: 0 };
        Ok(())
    }

    pub fn state(&self) -> &PlayerState {
        &self.state
    }

    pub fn scenario(&self) -> Option<&Scenario> {
        self.scenario.as_ref()
    }

    pub fn total_steps(&self) -> usize {
        self.scenario
            .as_ref()
            .map(|scenario| scenario.steps.len())
            .unwrap_or(0)
    }

    pub fn step_index(&self) -> Option<usize> {
        match &self.state {
            PlayerState::Ready { step_index }
            | PlayerState::Answered { step_index, .. }
            | PlayerState::Finished { step_index, .. } => Some(*step_index),
            PlayerState::Loading | PlayerState::Unavailable { .. } => None,
        }
    }

    pub fn current_step(&self) -> Option<&SimulationStep> {
        let index = self.step_index()?;
        self.scenario.as_ref()?.steps.get(index)
    }

    pub fn locked_answer(&self) -> Option<&LockedAnswer> {
        match &self.state {
            PlayerState::Answered { answer, .. } | PlayerState::Finished { answer, .. } => {
                Some(answer)
            }
            _ => None,
        }
    }

    pub fn selected_option(&self) -> Option<&StepOption> {
        let answer = self.locked_answer()?;
        self.current_step()?.option(answer.option_id)
    }

    pub fn is_locked(&self) -> bool {
        self.locked_answer().is_some()
    }

    pub fn can_continue(&self) -> bool {
        matches!(self.state, PlayerState::Answered { .. })
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, PlayerState::Finished { .. })
    }

    /// Share of steps already answered, rounded to a whole percent.
    pub fn completion_percent(&self) -> u8 {
        let completed = match &self.state {
            PlayerState::Ready { step_index } => *step_index,
            PlayerState::Answered { step_index, .. } | PlayerState::Finished { step_index, .. } => {
                step_index + 1
            }
            PlayerState::Loading | PlayerState::Unavailable { .. } => 0,
        };
        completion_percent(completed, self.total_steps())
    }
}

/// Display letter for the option at `position` (A, B, C, ...).
pub fn option_label(position: usize) -> char {
    u8::try_from(position)
        .ok()
        .filter(|offset| *offset < 26)
        .map(|offset| char::from(b'A' + offset))
        .unwrap_or('?')
}

fn resume_state(scenario: &Scenario, record: &SimulationStateRecord) -> PlayerState {
    let last = scenario.steps.len() - 1;
    let step_index = record.current_step_index.min(last);
    let step = &scenario.steps[step_index];

    let Some(option_id) = record.locked_option_id else {
        return PlayerState::Ready { step_index };
    };
    let Some(option) = step.option(option_id) else {
        warn!(
            step_index,
            option_id = option_id.0,
            "simulation: persisted lock names an unknown option, ignoring it"
        );
        return PlayerState::Ready { step_index };
    };

    let answer = LockedAnswer {
        option_id,
        is_correct: option.is_correct,
        feedback: option.feedback.clone(),
        sync: AttemptSync::Resumed,
    };
    if step_index == last {
        PlayerState::Finished { step_index, answer }
    } else {
        PlayerState::Answered { step_index, answer }
    }
}

#[cfg(test)]
#[path = "tests/simulation_tests.rs"]
mod tests;
