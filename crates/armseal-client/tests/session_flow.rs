use armseal_client::{
    ChatExit, ChatLimits, ClientError, ExperimentApi, HttpExperimentApi, InProcessApi, Instrument,
    ParticipantSession, Phase, PhaseError, DEFAULT_CHAT_BUDGET,
};
use armseal_core::{
    ChatMessage, StartRequest, StartResponse, TemplatesResponse, TurnRequest, TurnResponse,
};
use armseal_test_utils::{
    experiment_with, stub_experiment, test_key, FailingModel, ManualClock, StubModel, TEST_NOW_MS,
};
use async_trait::async_trait;
use armseal_token::{SessionToken, TurnGate};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

const ANSWERS: [&str; 5] = [
    "overwhelmed",
    "I'm not good enough",
    "the deadlines",
    "some clarity",
    "making lists / it helped a bit",
];

fn in_process(reply: &str) -> (InProcessApi, Arc<StubModel>) {
    let (experiment, model) = stub_experiment(reply);
    (InProcessApi::new(Arc::new(experiment)), model)
}

#[tokio::test]
async fn full_session_in_process() {
    let (api, model) = in_process("I hear you. What feels hardest right now?");
    let mut session = ParticipantSession::new(api);

    session.record(Instrument::PreMeasure, "mood", 3).unwrap();
    assert_eq!(session.advance().unwrap(), Phase::ScenarioSelection);

    let templates = session.templates().await.unwrap();
    assert_eq!(templates.templates.len(), 4);

    let opening = session.choose_scenario("T2").await.unwrap().to_string();
    assert!(opening.contains("Relationship Anxiety"));
    assert_eq!(session.phase(), Phase::StructuredIntake);

    let token = session.machine().token().cloned().unwrap();
    let condition = TurnGate::new(test_key())
        .authorize(token.as_str())
        .unwrap()
        .condition();

    session.submit_intake(&ANSWERS).await.unwrap();
    assert_eq!(session.phase(), Phase::TimedChat);

    session.send("It's been a rough week.").await.unwrap();
    session.send("Mostly at night.").await.unwrap();
    assert_eq!(session.machine().chat_turns(), 2);
    assert_eq!(session.machine().history().len(), 7);

    // Every turn replayed the same token.
    assert_eq!(session.machine().token(), Some(&token));
    let after = TurnGate::new(test_key())
        .authorize(token.as_str())
        .unwrap()
        .condition();
    assert_eq!(after, condition);
    assert_eq!(model.requests().len(), 3);

    session.exit_chat().unwrap();
    assert_eq!(session.machine().chat_exit(), Some(ChatExit::EarlyExit));
    session
        .record(Instrument::ManipulationCheck, "felt_supported", 5)
        .unwrap();
    assert_eq!(session.advance().unwrap(), Phase::PostMeasure);
    session.record(Instrument::PostMeasure, "mood", 5).unwrap();
    assert_eq!(session.advance().unwrap(), Phase::Done);
}

#[tokio::test]
async fn turn_limit_moves_to_manipulation_check() {
    let (api, _) = in_process("ok");
    let limits = ChatLimits {
        budget: DEFAULT_CHAT_BUDGET,
        max_turns: 3,
    };
    let mut session = ParticipantSession::with_limits(api, limits);
    session.advance().unwrap();
    session.choose_scenario("T1").await.unwrap();
    session.submit_intake(&ANSWERS).await.unwrap();

    for i in 0..3 {
        session.send(&format!("message {i}")).await.unwrap();
    }
    assert_eq!(session.phase(), Phase::ManipulationCheck);
    assert_eq!(session.machine().chat_exit(), Some(ChatExit::TurnLimit));

    let err = session.send("one more").await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Phase(PhaseError::WrongPhase { .. })
    ));
}

/// In-process API whose turns take `delay` on the shared clock
struct SlowApi {
    inner: InProcessApi,
    clock: Arc<ManualClock>,
    delay: Duration,
}

#[async_trait]
impl ExperimentApi for SlowApi {
    async fn templates(&self) -> Result<TemplatesResponse, ClientError> {
        self.inner.templates().await
    }

    async fn start(&self, request: StartRequest) -> Result<StartResponse, ClientError> {
        self.inner.start(request).await
    }

    async fn turn(&self, request: TurnRequest) -> Result<TurnResponse, ClientError> {
        let response = self.inner.turn(request).await;
        self.clock.advance(self.delay);
        response
    }
}

#[tokio::test]
async fn reply_landing_after_deadline_is_dropped() {
    let (api, _) = in_process("ok");
    let clock = Arc::new(ManualClock::new(TEST_NOW_MS));
    let slow = SlowApi {
        inner: api,
        clock: clock.clone(),
        delay: Duration::from_secs(1),
    };
    let mut session = ParticipantSession::new(slow).with_clock(clock.clone());
    session.advance().unwrap();
    session.choose_scenario("T1").await.unwrap();
    session.submit_intake(&ANSWERS).await.unwrap();
    let before = session.machine().history().to_vec();

    // The turn is sent with time left and answered after the deadline.
    clock.advance(DEFAULT_CHAT_BUDGET - Duration::from_millis(500));
    let err = session.send("still there?").await.unwrap_err();

    assert!(matches!(err, ClientError::Phase(PhaseError::Stale)));
    assert_eq!(session.machine().history(), before.as_slice());
    assert_eq!(session.machine().chat_turns(), 0);
    assert_eq!(session.phase(), Phase::ManipulationCheck);
    assert_eq!(session.machine().chat_exit(), Some(ChatExit::TimeUp));
}

#[tokio::test]
async fn failed_turn_leaves_state_untouched() {
    let api = InProcessApi::new(Arc::new(experiment_with(Arc::new(FailingModel {
        status: 500,
    }))));
    let mut session = ParticipantSession::new(api);
    session.advance().unwrap();
    session.choose_scenario("T3").await.unwrap();
    let before = session.machine().history().to_vec();

    let err = session.submit_intake(&ANSWERS).await.unwrap_err();
    assert_eq!(err.api_kind(), Some("UPSTREAM_ERROR"));
    assert_eq!(session.phase(), Phase::StructuredIntake);
    assert_eq!(session.machine().history(), before.as_slice());
    assert!(!session.machine().is_busy());
}

#[tokio::test]
async fn unknown_scenario_keeps_selection_phase() {
    let (api, _) = in_process("ok");
    let mut session = ParticipantSession::new(api);
    session.advance().unwrap();

    let err = session.choose_scenario("T9").await.unwrap_err();
    assert_eq!(err.api_kind(), Some("INVALID_SCENARIO"));
    assert_eq!(session.phase(), Phase::ScenarioSelection);
    assert!(session.machine().token().is_none());
    assert!(session.choose_scenario("T1").await.is_ok());
}

#[tokio::test]
async fn tampered_token_is_unauthorized() {
    let (api, _) = in_process("ok");
    let started = api
        .start(StartRequest {
            scenario_id: "T1".into(),
            session_id: Some("sess".into()),
        })
        .await
        .unwrap();

    let mut raw = started.token.into_string();
    let last = raw.pop().unwrap();
    raw.push(if last == 'A' { 'B' } else { 'A' });

    let err = api
        .turn(TurnRequest {
            token: SessionToken::new(raw),
            messages: vec![ChatMessage::user("test")],
        })
        .await
        .unwrap_err();
    assert!(err.is_unauthorized());
}

async fn spawn_server(
    status: StatusCode,
    body: Value,
) -> (SocketAddr, oneshot::Sender<()>, tokio::task::JoinHandle<()>) {
    let app = Router::new().route(
        "/api/chat",
        post(move |Json(_): Json<Value>| {
            let body = body.clone();
            async move { (status, Json(body)) }
        }),
    );

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind should succeed");
    let addr = listener.local_addr().expect("local_addr should succeed");

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await;
    });

    (addr, shutdown_tx, handle)
}

#[tokio::test]
async fn http_api_decodes_success_and_error_bodies() {
    let (addr, shutdown, task) = spawn_server(
        StatusCode::OK,
        json!({"templates": [{"id": "T1", "title": "A", "text": "a"}]}),
    )
    .await;
    let api = HttpExperimentApi::new(&format!("http://{addr}/"));
    assert_eq!(api.endpoint(), format!("http://{addr}/api/chat"));
    let templates = api.templates().await.unwrap();
    assert_eq!(templates.templates[0].id, "T1");
    shutdown.send(()).ok();
    let _ = task.await;

    let (addr, shutdown, task) = spawn_server(
        StatusCode::UNAUTHORIZED,
        json!({"error": "UNAUTHORIZED", "message": "unauthorized"}),
    )
    .await;
    let api = HttpExperimentApi::new(&format!("http://{addr}"));
    let err = api
        .turn(TurnRequest {
            token: SessionToken::new("a.b"),
            messages: vec![ChatMessage::user("hi")],
        })
        .await
        .unwrap_err();
    shutdown.send(()).ok();
    let _ = task.await;

    assert!(err.is_unauthorized());
    assert_eq!(err.api_kind(), Some("UNAUTHORIZED"));
}
