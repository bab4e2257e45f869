use armseal_core::{
    parse_request, ChatMessage, ExperimentError, ExperimentResponse, Scenario, ScenarioCatalog,
    UpstreamError,
};
use armseal_test_utils::{
    experiment_with, other_key, stub_experiment, test_key, FailingModel, StubModel, TEST_NOW_MS,
};
use armseal_token::{
    AssignmentRecord, Condition, SessionToken, TokenSigner, TurnGate, Unauthorized,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn condition_of(token: &SessionToken) -> Condition {
    TurnGate::new(test_key())
        .authorize(token.as_str())
        .unwrap()
        .condition()
}

#[tokio::test]
async fn start_then_two_turns_keep_condition() {
    let (experiment, model) = stub_experiment("That sounds hard. What helped before?");

    let started = experiment.start("T2", Some("sess-1")).unwrap();
    assert_eq!(started.scenario_id, "T2");
    assert_eq!(started.session_id, "sess-1");
    assert_eq!(started.condition, None);
    let condition = condition_of(&started.token);

    let messages = vec![ChatMessage::user("test")];
    for _ in 0..2 {
        let reply = experiment.turn(&started.token, &messages).await.unwrap();
        assert!(!reply.reply.is_empty());
        assert_eq!(condition_of(&started.token), condition);
    }

    let requests = model.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0], requests[1]);

    let expected_prompt = armseal_core::PromptAssembler::default().build_system_prompt(
        condition,
        &Scenario::new(
            "T2",
            "Relationship Anxiety",
            "Emotional strain in a romantic relationship.",
        ),
    );
    assert_eq!(model.last_system_prompt().unwrap(), expected_prompt);
}

#[tokio::test]
async fn record_carries_issue_time() {
    let (experiment, _) = stub_experiment("ok");
    let started = experiment.start("T1", Some("s")).unwrap();
    let authorized = TurnGate::new(test_key())
        .authorize(started.token.as_str())
        .unwrap();
    assert_eq!(authorized.record().issued_at, TEST_NOW_MS);
}

#[tokio::test]
async fn disclosure_flag_returns_condition() {
    let (experiment, _) = stub_experiment("ok");
    assert!(!experiment.discloses_condition());
    let experiment = experiment.with_disclose_condition(true);
    assert!(experiment.discloses_condition());
    let started = experiment.start("T1", None).unwrap();
    assert_eq!(started.condition, Some(condition_of(&started.token)));
}

#[tokio::test]
async fn unknown_scenario_twice_has_no_side_effects() {
    let (experiment, model) = stub_experiment("ok");
    for _ in 0..2 {
        let err = experiment.start("T9", Some("sess-1")).unwrap_err();
        assert_eq!(err.kind(), "INVALID_SCENARIO");
    }
    assert!(model.requests().is_empty());
}

#[tokio::test]
async fn forged_condition_is_unauthorized() {
    let (experiment, model) = stub_experiment("ok");
    let started = experiment.start("T1", Some("s")).unwrap();
    let original = condition_of(&started.token);

    // Re-sign the flipped record under a different key.
    let flipped = match original {
        Condition::Supportive => Condition::Informational,
        Condition::Informational => Condition::Supportive,
    };
    let forged = TokenSigner::new(other_key())
        .issue(&AssignmentRecord::new("s", "T1", flipped, TEST_NOW_MS))
        .unwrap();

    let err = experiment
        .turn(&forged, &[ChatMessage::user("hi")])
        .await
        .unwrap_err();
    assert!(matches!(err, ExperimentError::Unauthorized(Unauthorized)));

    // Swap in the forged payload with the genuine signature.
    let (_, signature) = started.token.as_str().split_once('.').unwrap();
    let (payload, _) = forged.as_str().split_once('.').unwrap();
    let spliced = SessionToken::new(format!("{payload}.{signature}"));
    let err = experiment
        .turn(&spliced, &[ChatMessage::user("hi")])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "UNAUTHORIZED");
    assert!(model.requests().is_empty());
}

#[tokio::test]
async fn invalid_history_is_rejected_before_the_model() {
    let (experiment, model) = stub_experiment("ok");
    let started = experiment.start("T1", Some("s")).unwrap();

    for messages in [
        vec![],
        vec![ChatMessage::user("a"), ChatMessage::assistant("b")],
        vec![ChatMessage::user("  ")],
    ] {
        let err = experiment.turn(&started.token, &messages).await.unwrap_err();
        assert_eq!(err.kind(), "BAD_REQUEST");
    }
    assert!(model.requests().is_empty());
}

#[tokio::test]
async fn scenario_removed_from_catalog_is_bad_request() {
    let (experiment, _) = stub_experiment("ok");
    let started = experiment.start("T4", Some("s")).unwrap();

    let narrowed = experiment.with_catalog(Arc::new(
        ScenarioCatalog::new(vec![Scenario::new("T1", "Academic Pressure", "x")]).unwrap(),
    ));
    let err = narrowed
        .turn(&started.token, &[ChatMessage::user("hi")])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "BAD_REQUEST");
}

#[tokio::test]
async fn upstream_failures_surface_as_upstream_error() {
    let experiment = experiment_with(Arc::new(FailingModel { status: 503 }));
    let started = experiment.start("T1", Some("s")).unwrap();
    let err = experiment
        .turn(&started.token, &[ChatMessage::user("hi")])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "UPSTREAM_ERROR");
    match err {
        ExperimentError::Upstream(upstream) => {
            assert!(upstream.is_retryable());
            assert!(upstream.details().is_some());
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn empty_reply_is_upstream_error() {
    let experiment = experiment_with(Arc::new(StubModel::new("   ")));
    let started = experiment.start("T1", Some("s")).unwrap();
    let err = experiment
        .turn(&started.token, &[ChatMessage::user("hi")])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ExperimentError::Upstream(UpstreamError::EmptyCompletion { .. })
    ));
}

#[tokio::test]
async fn handle_dispatches_raw_bodies() {
    let (experiment, _) = stub_experiment("reply text");

    let templates = experiment
        .handle(parse_request(br#"{"type":"templates"}"#).unwrap())
        .await
        .unwrap();
    match templates {
        ExperimentResponse::Templates(list) => assert_eq!(list.templates.len(), 4),
        other => panic!("unexpected response: {other:?}"),
    }

    let started = experiment
        .handle(parse_request(br#"{"type":"start","templateId":"T3","sessionId":"x"}"#).unwrap())
        .await
        .unwrap();
    let ExperimentResponse::Start(started) = started else {
        panic!("expected start response");
    };

    let body = serde_json::json!({
        "type": "turn",
        "token": started.token,
        "messages": [{"role": "user", "content": "test"}],
    });
    let turn = experiment
        .handle(parse_request(body.to_string().as_bytes()).unwrap())
        .await
        .unwrap();
    assert!(matches!(turn, ExperimentResponse::Turn(ref t) if t.reply == "reply text"));
}
