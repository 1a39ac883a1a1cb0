use super::*;
use async_trait::async_trait;
use shared::{
    domain::{ContentType, StepId},
    protocol::{Content, Module},
};
use tokio::sync::Mutex;

struct TestSimulationApi {
    module: Option<Module>,
    state: Option<SimulationStateRecord>,
    fail_attempts: bool,
    fail_reset: bool,
    attempts: Mutex<Vec<SimulationAttempt>>,
    resets: Mutex<u32>,
}

impl TestSimulationApi {
    fn with_module(module: Module) -> Self {
        Self {
            module: Some(module),
            state: None,
            fail_attempts: false,
            fail_reset: false,
            attempts: Mutex::new(Vec::new()),
            resets: Mutex::new(0),
        }
    }

    fn with_state(mut self, step: usize, locked: Option<i64>) -> Self {
        self.state = Some(SimulationStateRecord {
            current_step_index: step,
            locked_option_id: locked.map(OptionId),
        });
        self
    }
}

#[async_trait]
impl SimulationApi for TestSimulationApi {
    async fn module_detail(&self, _module_id: ModuleId) -> Result<Module, ClientError> {
        self.module.clone().ok_or(ClientError::NotFound {
            endpoint: "/api/modulos/1".to_string(),
        })
    }

    async fn simulation_state(
        &self,
        _content_id: ContentId,
    ) -> Result<Option<SimulationStateRecord>, ClientError> {
        Ok(self.state.clone())
    }

    async fn submit_attempt(&self, attempt: &SimulationAttempt) -> Result<(), ClientError> {
        if self.fail_attempts {
            return Err(ClientError::Http {
                status: 500,
                message: "database down".to_string(),
            });
        }
        self.attempts.lock().await.push(attempt.clone());
        Ok(())
    }

    async fn reset_simulation(&self, _content_id: ContentId) -> Result<(), ClientError> {
        if self.fail_reset {
            return Err(ClientError::Http {
                status: 500,
                message: "database down".to_string(),
            });
        }
        *self.resets.lock().await += 1;
        Ok(())
    }
}

fn option(id: i64, correct: bool) -> StepOption {
    StepOption {
        id: OptionId(id),
        text: format!("option {id}"),
        is_correct: correct,
        feedback: if correct { "well done" } else { "not quite" }.to_string(),
        branch_video: None,
    }
}

fn step(id: i64, order: i32) -> SimulationStep {
    SimulationStep {
        id: StepId(id),
        description: format!("step {id}"),
        order,
        scenario: String::new(),
        video: Some(format!("C:\\videos\\step{id}.mp4")),
        options: vec![option(id * 10 + 1, true), option(id * 10 + 2, false)],
    }
}

/// Three steps delivered out of order.
fn fire_drill() -> Module {
    Module {
        id: ModuleId(1),
        title: "Fire drill".to_string(),
        description: String::new(),
        category: None,
        difficulty: None,
        estimated_minutes: None,
        contents: vec![
            Content {
                id: ContentId(4),
                title: "Intro".to_string(),
                content_type: ContentType::Text,
                resource_url: None,
                body: "read me".to_string(),
                order: 1,
                steps: Vec::new(),
            },
            Content {
                id: ContentId(5),
                title: "Evacuation".to_string(),
                content_type: ContentType::Simulation,
                resource_url: None,
                body: String::new(),
                order: 2,
                steps: vec![step(3, 3), step(1, 1), step(2, 2)],
            },
        ],
    }
}

async fn loaded(api: TestSimulationApi) -> (Arc<TestSimulationApi>, SimulationPlayer) {
    let api = Arc::new(api);
    let mut player = SimulationPlayer::new(api.clone());
    player.load(ModuleId(1)).await.expect("load");
    (api, player)
}

#[tokio::test]
async fn load_picks_simulation_content_and_orders_steps() {
    let (_api, player) = loaded(TestSimulationApi::with_module(fire_drill())).await;

    let scenario = player.scenario().expect("scenario");
    assert_eq!(scenario.content_id, ContentId(5));
    let ids: Vec<_> = scenario.steps.iter().map(|step| step.id).collect();
    assert_eq!(ids, vec![StepId(1), StepId(2), StepId(3)]);
    assert_eq!(player.state(), &PlayerState::Ready { step_index: 0 });
    assert_eq!(player.completion_percent(), 0);
}

#[tokio::test]
async fn module_without_steps_is_unavailable() {
    let mut module = fire_drill();
    module.contents.truncate(1);
    let mut player = SimulationPlayer::new(Arc::new(TestSimulationApi::with_module(module)));

    let err = player.load(ModuleId(1)).await.expect_err("no steps");

    assert!(matches!(err, PlayerError::NoSimulation(ModuleId(1))));
    assert!(matches!(player.state(), PlayerState::Unavailable { .. }));
    assert!(player.current_step().is_none());
}

#[tokio::test]
async fn failed_module_fetch_is_unavailable() {
    let mut api = TestSimulationApi::with_module(fire_drill());
    api.module = None;
    let mut player = SimulationPlayer::new(Arc::new(api));

    let err = player.load(ModuleId(1)).await.expect_err("fetch failed");

    assert!(matches!(err, PlayerError::Api(ClientError::NotFound { .. })));
    match player.state() {
        PlayerState::Unavailable { reason } => assert!(reason.contains("404")),
        other => panic!("unexpected state: {other:?}"),
    }
}

#[tokio::test]
async fn selecting_locks_the_step_and_records_the_attempt() {
    let (api, mut player) = loaded(TestSimulationApi::with_module(fire_drill())).await;

    let answer = player.select_option(OptionId(12)).await.expect("select");
    assert!(!answer.is_correct);
    assert_eq!(answer.feedback, "not quite");
    assert_eq!(answer.sync, AttemptSync::Recorded);
    assert!(player.is_locked());
    assert!(player.can_continue());

    let again = player.select_option(OptionId(11)).await.expect_err("locked");
    assert!(matches!(again, PlayerError::StepLocked { step: 0 }));
    assert_eq!(again.to_string(), "step 1 is already answered; restart to answer again");

    let attempts = api.attempts.lock().await;
    assert_eq!(
        attempts.as_slice(),
        [SimulationAttempt {
            content_id: ContentId(5),
            step_id: StepId(1),
            is_correct: false,
            score: 0,
            selected_option_id: OptionId(12),
        }]
    );
}

#[tokio::test]
async fn correct_answers_score_full_points() {
    let (api, mut player) = loaded(TestSimulationApi::with_module(fire_drill())).await;
    player.select_option(OptionId(11)).await.expect("select");
    assert_eq!(api.attempts.lock().await[0].score, CORRECT_SCORE);
}

#[tokio::test]
async fn options_from_other_steps_are_rejected() {
    let (api, mut player) = loaded(TestSimulationApi::with_module(fire_drill())).await;

    let err = player.select_option(OptionId(21)).await.expect_err("wrong step");

    assert!(matches!(err, PlayerError::UnknownOption(OptionId(21))));
    assert!(!player.is_locked());
    assert!(api.attempts.lock().await.is_empty());
}

#[tokio::test]
async fn continue_requires_an_answer_and_never_writes() {
    let (api, mut player) = loaded(TestSimulationApi::with_module(fire_drill())).await;
    assert!(matches!(
        player.continue_to_next(),
        Err(PlayerError::NotAnswered)
    ));

    player.select_option(OptionId(11)).await.expect("select");
    assert_eq!(player.continue_to_next().expect("continue"), 1);

    assert_eq!(player.state(), &PlayerState::Ready { step_index: 1 });
    assert_eq!(player.current_step().map(|step| step.id), Some(StepId(2)));
    assert_eq!(api.attempts.lock().await.len(), 1);
}

#[tokio::test]
async fn answering_the_last_step_finishes_the_scenario() {
    let (_api, mut player) = loaded(TestSimulationApi::with_module(fire_drill())).await;
    let mut percents = vec![player.completion_percent()];

    for option_id in [11, 21, 31] {
        player
            .select_option(OptionId(option_id))
            .await
            .expect("select");
        percents.push(player.completion_percent());
        if !player.is_finished() {
            player.continue_to_next().expect("continue");
            percents.push(player.completion_percent());
        }
    }

    assert!(player.is_finished());
    assert!(!player.can_continue());
    assert!(matches!(
        player.continue_to_next(),
        Err(PlayerError::AlreadyFinished)
    ));
    assert_eq!(player.completion_percent(), 100);
    assert!(percents.windows(2).all(|pair| pair[0] <= pair[1]));
}

#[tokio::test]
async fn failed_attempt_write_keeps_the_local_lock() {
    let mut api = TestSimulationApi::with_module(fire_drill());
    api.fail_attempts = true;
    let (_api, mut player) = loaded(api).await;

    let answer = player.select_option(OptionId(11)).await.expect("select");

    assert!(matches!(answer.sync, AttemptSync::Failed(ref reason) if reason.contains("500")));
    assert!(player.is_locked());
    assert!(player.can_continue());
}

#[tokio::test]
async fn restart_clears_every_lock() {
    let (api, mut player) = loaded(TestSimulationApi::with_module(fire_drill())).await;
    player.select_option(OptionId(11)).await.expect("select");
    player.continue_to_next().expect("continue");
    player.select_option(OptionId(22)).await.expect("select");

    player.restart().await.expect("restart");

    assert_eq!(player.state(), &PlayerState::Ready { step_index: 0 });
    assert!(!player.is_locked());
    assert_eq!(*api.resets.lock().await, 1);
    player
        .select_option(OptionId(11))
        .await
        .expect("step 1 answerable again");
}

#[tokio::test]
async fn failed_restart_leaves_progress_untouched() {
    let mut api = TestSimulationApi::with_module(fire_drill());
    api.fail_reset = true;
    let (_api, mut player) = loaded(api).await;
    player.select_option(OptionId(11)).await.expect("select");
    let before = player.state().clone();

    player.restart().await.expect_err("reset fails");

    assert_eq!(player.state(), &before);
}

#[tokio::test]
async fn resumes_a_locked_middle_step() {
    let (_api, player) =
        loaded(TestSimulationApi::with_module(fire_drill()).with_state(1, Some(22))).await;

    let answer = player.locked_answer().expect("lock restored");
    assert_eq!(answer.sync, AttemptSync::Resumed);
    assert!(!answer.is_correct);
    assert!(player.can_continue());
    assert_eq!(player.selected_option().map(|option| option.id), Some(OptionId(22)));
}

#[tokio::test]
async fn resumes_a_finished_scenario_and_clamps_stale_positions() {
    let (_api, finished) =
        loaded(TestSimulationApi::with_module(fire_drill()).with_state(2, Some(31))).await;
    assert!(finished.is_finished());

    let (_api, clamped) =
        loaded(TestSimulationApi::with_module(fire_drill()).with_state(9, None)).await;
    assert_eq!(clamped.state(), &PlayerState::Ready { step_index: 2 });
}

#[tokio::test]
async fn persisted_lock_on_unknown_option_is_ignored() {
    let (_api, player) =
        loaded(TestSimulationApi::with_module(fire_drill()).with_state(0, Some(99))).await;
    assert_eq!(player.state(), &PlayerState::Ready { step_index: 0 });
}

#[tokio::test]
async fn actions_before_load_are_rejected() {
    let mut player = SimulationPlayer::new(Arc::new(TestSimulationApi::with_module(fire_drill())));
    assert!(matches!(
        player.select_option(OptionId(11)).await,
        Err(PlayerError::NotLoaded)
    ));
    assert!(matches!(player.restart().await, Err(PlayerError::NotLoaded)));
    assert_eq!(player.total_steps(), 0);
}

#[test]
fn option_labels_are_letters() {
    assert_eq!(option_label(0), 'A');
    assert_eq!(option_label(2), 'C');
    assert_eq!(option_label(25), 'Z');
    assert_eq!(option_label(26), '?');
}
