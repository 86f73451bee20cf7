use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde_json::json;
use tokio::time::{sleep, timeout, Duration};

use salesflow::{
    handler_fn, payload, A2aMessage, A2aRouter, Agent, AgentContext, Envelope, HistoryFilter,
    MessageKind, Payload, Reply, SalesFlowError,
};

fn echo_router() -> A2aRouter {
    let router = A2aRouter::default();
    router.register(
        "echo",
        handler_fn(|message: A2aMessage, _router: A2aRouter| async move {
            Ok::<_, SalesFlowError>(Some(Reply::ok(payload!({ "echo": message.payload() }))))
        }),
    );
    router
}

fn silent(router: &A2aRouter, name: &str) {
    router.register(
        name.to_string(),
        handler_fn(|_message: A2aMessage, _router: A2aRouter| async move {
            Ok::<_, SalesFlowError>(None)
        }),
    );
}

/// Registers `name` as an agent that keeps every message it receives.
fn collector(router: &A2aRouter, name: &str) -> Arc<Mutex<Vec<A2aMessage>>> {
    let inbox: Arc<Mutex<Vec<A2aMessage>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&inbox);
    router.register(
        name.to_string(),
        handler_fn(move |message: A2aMessage, _router: A2aRouter| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().push(message);
                Ok::<_, SalesFlowError>(None)
            }
        }),
    );
    inbox
}

/// Answers every request from a background task after `delay`.
fn deferred(router: &A2aRouter, name: &str, delay: Duration) {
    router.register(
        name.to_string(),
        handler_fn(move |message: A2aMessage, router: A2aRouter| async move {
            tokio::spawn(async move {
                sleep(delay).await;
                let _ = router
                    .send_response(&message, payload!({ "late": true }), true)
                    .await;
            });
            Ok::<_, SalesFlowError>(None)
        }),
    );
}

#[tokio::test]
async fn blocking_request_returns_correlated_echo() {
    let router = echo_router();

    let response = router
        .request("tester", "echo", payload!({ "x": 1 }), None, Some(Duration::from_secs(1)))
        .await
        .expect("echo reply");

    assert_eq!(response.kind(), MessageKind::Response);
    assert_eq!(response.payload()["echo"], json!({ "x": 1 }));
    assert_eq!(response.from_agent(), "echo");
    assert_eq!(response.to_agent(), "tester");

    let history = router.get_history(&HistoryFilter::all());
    assert_eq!(history.len(), 2);
    let request = &history[0];
    assert_eq!(request.kind(), MessageKind::Request);
    assert_eq!(response.correlation_id(), Some(request.id()));
    assert_eq!(router.pending_count(), 0);
}

#[tokio::test]
async fn unknown_agent_fails_without_blocking() {
    let router = A2aRouter::default();

    let outcome = timeout(
        Duration::from_millis(100),
        router.request("tester", "missing", Payload::new(), None, Some(Duration::from_secs(10))),
    )
    .await
    .expect("must not block");

    assert!(matches!(outcome, Err(SalesFlowError::AgentNotRegistered(ref agent)) if agent == "missing"));
    assert_eq!(router.pending_count(), 0);
}

#[tokio::test]
async fn silent_agent_times_out_and_leaves_no_waiter() {
    let router = A2aRouter::default();
    silent(&router, "slow");

    let started = Instant::now();
    let outcome = router
        .request("tester", "slow", Payload::new(), None, Some(Duration::from_millis(100)))
        .await;

    assert!(started.elapsed() >= Duration::from_millis(100));
    let err = outcome.expect_err("should time out");
    assert!(err.is_protocol());
    let message_id = match err {
        SalesFlowError::ResponseTimeout { message_id, .. } => message_id,
        other => panic!("expected ResponseTimeout, got {other:?}"),
    };
    assert!(!router.is_pending(&message_id));
    assert_eq!(router.pending_count(), 0);
}

#[tokio::test]
async fn asynchronous_response_wakes_waiter() {
    let router = A2aRouter::default();
    deferred(&router, "worker", Duration::from_millis(20));

    let response = router
        .request("tester", "worker", Payload::new(), Some("conv-1"), Some(Duration::from_secs(1)))
        .await
        .expect("deferred reply");

    assert_eq!(response.payload()["late"], true);
    assert_eq!(response.conversation_id(), Some("conv-1"));
    assert_eq!(router.pending_count(), 0);
}

#[tokio::test]
async fn second_response_is_recorded_but_not_delivered() {
    let router = echo_router();
    let inbox = collector(&router, "desk");
    let request: Arc<Mutex<Option<A2aMessage>>> = Arc::new(Mutex::new(None));
    let captured = Arc::clone(&request);
    router.register(
        "worker",
        handler_fn(move |message: A2aMessage, router: A2aRouter| {
            let captured = Arc::clone(&captured);
            async move {
                *captured.lock() = Some(message.clone());
                router.send_response(&message, payload!({ "n": 1 }), true).await?;
                Ok::<_, SalesFlowError>(None)
            }
        }),
    );

    let first = router
        .request("desk", "worker", Payload::new(), None, Some(Duration::from_secs(1)))
        .await
        .expect("first reply");
    assert_eq!(first.payload()["n"], 1);

    let original = request.lock().clone().expect("request captured");
    let before = router.history_len();
    router
        .send_response(&original, payload!({ "n": 2 }), true)
        .await
        .expect("duplicate answer is a no-op");
    assert_eq!(router.history_len(), before + 1);
    assert!(inbox.lock().is_empty());

    // Plenty of unrelated traffic must not make the old request answerable again.
    for n in 0..5000 {
        router
            .request("tester", "echo", payload!({ "n": n }), None, Some(Duration::from_secs(1)))
            .await
            .unwrap();
    }
    router
        .send_response(&original, payload!({ "n": 3 }), true)
        .await
        .expect("still a no-op");
    assert!(inbox.lock().is_empty());
    assert_eq!(router.pending_count(), 0);
}

#[tokio::test]
async fn late_response_after_timeout_is_ignored() {
    let router = A2aRouter::default();
    let inbox = collector(&router, "desk");
    deferred(&router, "sluggish", Duration::from_millis(120));

    let outcome = router
        .request("desk", "sluggish", Payload::new(), None, Some(Duration::from_millis(40)))
        .await;
    assert!(matches!(outcome, Err(SalesFlowError::ResponseTimeout { .. })));

    sleep(Duration::from_millis(200)).await;
    let responses: Vec<_> = router
        .get_history(&HistoryFilter::all())
        .into_iter()
        .filter(|message| message.kind() == MessageKind::Response)
        .collect();
    assert_eq!(responses.len(), 1);
    assert!(inbox.lock().is_empty());
    assert_eq!(router.pending_count(), 0);
}

#[tokio::test]
async fn first_answer_wins_over_a_synchronous_reply() {
    let router = A2aRouter::default();
    let inbox = collector(&router, "desk");
    router.register(
        "eager",
        handler_fn(|message: A2aMessage, router: A2aRouter| async move {
            router.send_response(&message, payload!({ "answer": "first" }), true).await?;
            Ok::<_, SalesFlowError>(Some(Reply::ok(payload!({ "answer": "second" }))))
        }),
    );

    let reply = router
        .request("desk", "eager", Payload::new(), None, Some(Duration::from_secs(1)))
        .await
        .unwrap();

    assert_eq!(reply.payload()["answer"], "first");
    let answers: Vec<_> = router
        .get_history(&HistoryFilter::all())
        .into_iter()
        .filter(|message| message.kind() == MessageKind::Response)
        .map(|message| message.payload()["answer"].clone())
        .collect();
    assert_eq!(answers, vec![json!("first"), json!("second")]);
    assert!(inbox.lock().is_empty());
    assert_eq!(router.pending_count(), 0);
}

#[tokio::test]
async fn notified_request_answered_twice_reaches_the_sender_once() {
    let router = A2aRouter::default();
    let inbox = collector(&router, "desk");
    router.register(
        "eager",
        handler_fn(|message: A2aMessage, router: A2aRouter| async move {
            router.send_response(&message, payload!({ "answer": "first" }), true).await?;
            Ok::<_, SalesFlowError>(Some(Reply::ok(payload!({ "answer": "second" }))))
        }),
    );

    router
        .notify(Envelope::request("desk", "eager", Payload::new()))
        .unwrap();
    sleep(Duration::from_millis(100)).await;

    let received = inbox.lock().clone();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].payload()["answer"], "first");
}

#[tokio::test]
async fn unregistered_agent_stops_receiving() {
    let router = echo_router();
    router
        .request("tester", "echo", Payload::new(), None, Some(Duration::from_secs(1)))
        .await
        .unwrap();

    router.unregister("echo");
    assert!(!router.is_registered("echo"));

    let err = router
        .request("tester", "echo", Payload::new(), None, Some(Duration::from_secs(1)))
        .await
        .expect_err("echo is gone");
    assert!(matches!(err, SalesFlowError::AgentNotRegistered(ref agent) if agent == "echo"));
    assert!(router
        .notify(Envelope::notification("tester", "echo", Payload::new()))
        .is_err());
    assert_eq!(router.pending_count(), 0);
}

#[tokio::test]
async fn responding_to_a_notification_is_rejected() {
    let router = A2aRouter::default();
    let notification = A2aMessage::new(
        "tester",
        "echo",
        MessageKind::Notification,
        Payload::new(),
        None,
    );

    let err = router
        .send_response(&notification, Payload::new(), true)
        .await
        .expect_err("not a request");
    assert!(matches!(err, SalesFlowError::InvalidCorrelation(_)));
    assert_eq!(router.history_len(), 0);
}

#[tokio::test]
async fn history_filters_by_conversation_in_send_order() {
    let router = echo_router();
    let wait = Some(Duration::from_secs(1));

    router.request("tester", "echo", payload!({ "n": 1 }), Some("c1"), wait).await.unwrap();
    router.request("tester", "echo", payload!({ "n": 2 }), Some("c2"), wait).await.unwrap();
    router.request("tester", "echo", payload!({ "n": 3 }), Some("c1"), wait).await.unwrap();

    let c1 = router.get_history(&HistoryFilter::all().conversation("c1"));
    assert_eq!(c1.len(), 4);
    assert!(c1.iter().all(|message| message.conversation_id() == Some("c1")));
    let kinds: Vec<_> = c1.iter().map(|message| message.kind()).collect();
    assert_eq!(
        kinds,
        vec![MessageKind::Request, MessageKind::Response, MessageKind::Request, MessageKind::Response]
    );
    assert_eq!(c1[0].payload()["n"], 1);
    assert_eq!(c1[2].payload()["n"], 3);
    assert!(c1.windows(2).all(|pair| pair[0].timestamp() < pair[1].timestamp()));

    let everything = router.get_history(&HistoryFilter::all());
    assert_eq!(everything.len(), 6);
    let by_agent = router.get_history(&HistoryFilter::all().agent("echo"));
    assert_eq!(by_agent.len(), 6);
}

#[tokio::test]
async fn notify_routes_the_reply_to_the_sender() {
    let router = echo_router();
    let inbox = collector(&router, "collector");

    router
        .notify(Envelope::request("collector", "echo", payload!({ "ping": true })).conversation("c9"))
        .expect("target registered");

    let mut received = Vec::new();
    for _ in 0..50 {
        received = inbox.lock().clone();
        if !received.is_empty() {
            break;
        }
        sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].kind(), MessageKind::Response);
    assert_eq!(received[0].payload()["echo"], json!({ "ping": true }));
    assert_eq!(received[0].conversation_id(), Some("c9"));
}

#[tokio::test]
async fn notify_to_unknown_agent_fails_immediately() {
    let router = A2aRouter::default();
    let err = router
        .notify(Envelope::request("tester", "ghost", Payload::new()))
        .expect_err("ghost is not registered");
    assert!(matches!(err, SalesFlowError::AgentNotRegistered(_)));
}

#[tokio::test]
async fn fan_out_keeps_partial_results_in_order() {
    let router = echo_router();
    silent(&router, "slow");

    let results = router
        .request_all(
            "tester",
            vec![
                ("echo".to_string(), payload!({ "a": 1 })),
                ("missing".to_string(), Payload::new()),
                ("slow".to_string(), Payload::new()),
            ],
            Some("fan"),
            Duration::from_millis(80),
        )
        .await;

    let agents: Vec<&str> = results.iter().map(|result| result.agent.as_str()).collect();
    assert_eq!(agents, vec!["echo", "missing", "slow"]);
    assert_eq!(results[0].outcome.as_ref().unwrap().payload()["echo"]["a"], 1);
    assert!(matches!(results[1].outcome, Err(SalesFlowError::AgentNotRegistered(_))));
    assert!(matches!(results[2].outcome, Err(SalesFlowError::ResponseTimeout { .. })));
    assert_eq!(router.pending_count(), 0);
}

struct Picky;

#[async_trait::async_trait]
impl Agent for Picky {
    fn name(&self) -> &str {
        "picky"
    }

    async fn process(&self, input: Payload, _ctx: &AgentContext<'_>) -> salesflow::Result<Payload> {
        match input.get("question").and_then(|value| value.as_str()) {
            None => Err(SalesFlowError::Validation("No question provided".into())),
            Some("explode") => Err(SalesFlowError::Other(anyhow::anyhow!("boom"))),
            Some(question) => Ok(payload!({ "answer": question.len() })),
        }
    }
}

#[tokio::test]
async fn agent_failures_become_error_replies() {
    let router = A2aRouter::default();
    router.register_agent(Arc::new(Picky));
    let wait = Some(Duration::from_secs(1));

    let ok = router
        .request("tester", "picky", payload!({ "question": "four" }), None, wait)
        .await
        .unwrap();
    assert!(!ok.is_error());
    assert_eq!(ok.payload()["answer"], 4);

    let invalid = router
        .request("tester", "picky", Payload::new(), None, wait)
        .await
        .expect("validation failure is data, not a protocol error");
    assert_eq!(invalid.kind(), MessageKind::Error);
    assert_eq!(invalid.error_text(), Some("No question provided"));

    let failed = router
        .request("tester", "picky", payload!({ "question": "explode" }), None, wait)
        .await
        .unwrap();
    assert!(failed.is_error());
    assert_eq!(failed.error_text(), Some("boom"));
}

#[tokio::test]
async fn concurrent_requests_are_each_answered_once() {
    let router = A2aRouter::default();
    deferred(&router, "worker", Duration::from_millis(5));

    let calls = (0..32).map(|_| {
        let router = router.clone();
        async move {
            router
                .request("tester", "worker", Payload::new(), None, Some(Duration::from_secs(2)))
                .await
        }
    });
    let outcomes = futures::future::join_all(calls).await;

    assert!(outcomes.iter().all(|outcome| outcome.is_ok()));
    let mut correlations: Vec<String> = outcomes
        .iter()
        .filter_map(|outcome| outcome.as_ref().ok())
        .filter_map(|message| message.correlation_id().map(str::to_string))
        .collect();
    correlations.sort();
    correlations.dedup();
    assert_eq!(correlations.len(), 32);
    assert_eq!(router.pending_count(), 0);
}
