//! End-to-end scenarios exercising the full control plane.

use lattice_admission::Estimate;
use lattice_audit::CustodyLog;
use lattice_config::Config;
use lattice_core::{ClusterId, ModelId, QosTier, SessionId, StreamId};
use lattice_dispatch::testing::ScriptedAdapter;
use lattice_frame::{fragment, Frame, Payload};
use lattice_integration_tests::{model_entry, test_kernel, test_kernel_with_config};
use lattice_kernel::ServeRequest;
use lattice_router::{ModelStatus, SafetyGrade};
use std::sync::Arc;

fn serve_request(session: &str, prompt: &str) -> ServeRequest {
    ServeRequest {
        session_id: SessionId::from_string(session),
        stream_id: StreamId::from_string("r1"),
        tenant: "acme".to_string(),
        qos: QosTier::Silver,
        prompt: prompt.to_string(),
        task_type: "qa.short".to_string(),
        cluster_hint: ClusterId::new("qa.short"),
        quality_target: "fast".to_string(),
        latency_slo_ms: 2000.0,
        cost_ceiling_usd: 5.0,
        safety_level: SafetyGrade::D,
        speculative_enabled: true,
        deadline: None,
        cancel: None,
    }
}

// Scenario 1: a single-candidate plan streams partials and a final, with a
// positive cost and a non-negative saving against the plan frontier.
#[tokio::test]
async fn single_candidate_success() {
    let (kernel, _dir) = test_kernel(vec![model_entry(
        "fast-slm",
        ModelStatus::Active,
        0.2,
        100.0,
    )]);
    kernel
        .pool()
        .register(Arc::new(ScriptedAdapter::healthy("fast-adapter")))
        .unwrap();
    kernel.bind_model(
        ModelId::new("fast-slm"),
        lattice_core::AdapterId::new("fast-adapter"),
    );

    let outcome = kernel
        .serve(serve_request("s1", "Explain RAG simply"))
        .await
        .unwrap();

    assert_eq!(
        outcome.plan_payload["candidates"].as_array().unwrap().len(),
        1
    );
    assert_eq!(outcome.model_id, ModelId::new("fast-slm"));
    assert!(!outcome.partials.is_empty());
    assert!(!outcome.final_text.is_empty());
    assert!(outcome.cost_usd > 0.0);
    assert!(outcome.savings_pct >= 0.0);
}

// Scenario 2: low adapter confidence past the probe window escalates; the
// first candidate is cancelled, the second serves, and the speculative
// counters move.
#[tokio::test]
async fn escalation_on_low_confidence() {
    let (kernel, _dir) = test_kernel(vec![
        model_entry("wobbly-slm", ModelStatus::Active, 0.1, 100.0),
        model_entry("steady-llm", ModelStatus::Active, 0.8, 300.0),
    ]);
    let wobbly = Arc::new(ScriptedAdapter::low_confidence("wobbly-adapter"));
    let steady = Arc::new(ScriptedAdapter::healthy("steady-adapter"));
    let steady_calls = steady.stream_calls();
    kernel.pool().register(wobbly).unwrap();
    kernel.pool().register(steady).unwrap();
    kernel.bind_model(
        ModelId::new("wobbly-slm"),
        lattice_core::AdapterId::new("wobbly-adapter"),
    );
    kernel.bind_model(
        ModelId::new("steady-llm"),
        lattice_core::AdapterId::new("steady-adapter"),
    );

    let outcome = kernel
        .serve(serve_request("s2", "Summarize the incident report"))
        .await
        .unwrap();

    assert_eq!(outcome.model_id, ModelId::new("steady-llm"));
    assert_eq!(steady_calls.load(std::sync::atomic::Ordering::Relaxed), 1);
    let snapshot = kernel.metrics().snapshot();
    assert_eq!(snapshot.counters["speculative_attempted"], 1);
    assert_eq!(snapshot.counters["speculative_accepted"], 1);
}

// Scenario 3: a three-fragment message arriving [1, 0, 2] reassembles with
// the documented ACK sequence and no NACKs; losing fragment 1 until after
// the terminal yields exactly one NACK for it.
#[test]
fn fragmented_reassembly_and_nacks() {
    let (kernel, _dir) = test_kernel(Vec::new());

    let text = "x".repeat(200);
    let mut original = Frame::new(
        SessionId::from_string("s3"),
        StreamId::from_string("r1"),
        1,
        QosTier::Silver,
        Payload::partial(&text, 0.9),
    );
    original.flags.syn = true;
    let frags = fragment(&original, 100).unwrap();
    assert_eq!(frags.len(), 3);
    let as_text =
        |f: &Frame| serde_json::to_string(f).unwrap();

    // In-order [1, 0, 2].
    let e1 = kernel.ingest_frame(&as_text(&frags[1])).unwrap();
    assert_eq!(e1.ack_advanced_to, None);
    assert!(e1.nacks.is_empty());
    let e0 = kernel.ingest_frame(&as_text(&frags[0])).unwrap();
    assert_eq!(e0.ack_advanced_to, Some(1));
    let e2 = kernel.ingest_frame(&as_text(&frags[2])).unwrap();
    assert_eq!(e2.ack_advanced_to, Some(2));
    assert!(e2.nacks.is_empty());
    let completed = e2.completed.unwrap();
    assert_eq!(completed.payload.text(), Some(text.as_str()));

    // Lost fragment 1: the terminal triggers exactly one NACK for it.
    let mut lossy = original.clone();
    lossy.msg_seq = 2;
    let frags = fragment(&lossy, 100).unwrap();
    kernel.ingest_frame(&as_text(&frags[0])).unwrap();
    let e_terminal = kernel.ingest_frame(&as_text(&frags[2])).unwrap();
    assert_eq!(e_terminal.nacks, vec![1]);
    // A duplicate terminal must not re-NACK; the replay guard already
    // rejects the identical frame, which is the stronger property.
    assert!(kernel.ingest_frame(&as_text(&frags[2])).is_err());
    let done = kernel.ingest_frame(&as_text(&frags[1])).unwrap();
    assert!(done.completed.is_some());
}

// Scenario 4: a session over its token budget is rejected in preflight,
// the denial counter moves, and no adapter stream is opened.
#[tokio::test]
async fn budget_preflight_reject() {
    let mut config = Config::default();
    config.budget.default_tokens = 1000;
    let (kernel, _dir) = test_kernel_with_config(
        vec![model_entry("fast-slm", ModelStatus::Active, 0.2, 100.0)],
        config,
    );
    let adapter = Arc::new(ScriptedAdapter::healthy("fast-adapter"));
    let calls = adapter.stream_calls();
    kernel.pool().register(adapter).unwrap();
    kernel.bind_model(
        ModelId::new("fast-slm"),
        lattice_core::AdapterId::new("fast-adapter"),
    );

    // 800 tokens already used in this session.
    let session = SessionId::from_string("s4");
    kernel
        .budget_for(&session)
        .reserve(Estimate {
            tokens: 800,
            usd_micros: 0,
            parallel: 0,
        })
        .unwrap();

    // A ~250-token request (1000 chars at ~4 chars/token) must bounce.
    let mut request = serve_request("s4", &"p".repeat(1000));
    request.session_id = session;
    let err = kernel.serve(request).await.unwrap_err();
    assert_eq!(err.code(), lattice_core::ErrorCode::Backpressure);
    assert_eq!(
        kernel.metrics().counter_value("window_denied_tokens_total"),
        1
    );
    assert_eq!(calls.load(std::sync::atomic::Ordering::Relaxed), 0);
}

// Scenario 5: loop prevention rejects a path containing the local ADN and
// a cluster list containing the local cluster, counting each rejection.
#[test]
fn agp_loop_prevention() {
    use lattice_agp::{Prefix, Rib, Route, RouteCapacity, RouteCost, RouteHealth};
    use lattice_core::{Adn, RouterId};
    use lattice_telemetry::MetricsRegistry;

    let metrics = Arc::new(MetricsRegistry::new());
    let rib = Rib::new(
        Adn(64512),
        RouterId::new("local-router"),
        Some(11),
        Arc::clone(&metrics),
    );
    let base = Route {
        prefix: Prefix::new("reviewer.*"),
        path: vec![Adn(65001)],
        next_hop: RouterId::new("peer-1"),
        local_pref: 100,
        med: 0,
        qos_supported: vec![QosTier::Silver],
        capacity: RouteCapacity::default(),
        health: RouteHealth::default(),
        cost: RouteCost { usd_per_1k: 0.3 },
        predictability: lattice_agp::RoutePredictability::default(),
        security_groups: Vec::new(),
        communities: Vec::new(),
        regions: Vec::new(),
        valid_until: chrono_now_plus_hour(),
        metrics_timestamp: chrono::Utc::now(),
        metrics_half_life_s: 300.0,
        stability_class: None,
        originator_id: None,
        cluster_list: Vec::new(),
    };

    let peer = RouterId::new("peer-1");
    let mut looped = base.clone();
    looped.path = vec![Adn(64512), Adn(65001)];
    assert!(rib.insert(&peer, looped).is_err());
    assert_eq!(metrics.counter_value("agp_loops_prevented_total"), 1);

    let mut clustered = base.clone();
    clustered.cluster_list = vec![11];
    assert!(rib.insert(&peer, clustered).is_err());
    assert_eq!(metrics.counter_value("agp_loops_prevented_total"), 2);

    // The clean route installs.
    rib.insert(&peer, base).unwrap();
    assert_eq!(rib.candidates_for("reviewer.code").len(), 1);
}

fn chrono_now_plus_hour() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now() + chrono::Duration::hours(1)
}

// Scenario 6: a shadow beating the active's cost frontier over enough
// calls is promoted, the custody chain records it, and later plans rank
// it first.
#[test]
fn shadow_promotion_end_to_end() {
    use lattice_config::{DemoteSection, PromoteSection};
    use lattice_router::{plan, LifecycleEngine, ModelRegistry, RoutingRequest, StatsStore};
    use lattice_telemetry::MetricsRegistry;

    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(ModelRegistry::in_memory(vec![
        model_entry("active-a", ModelStatus::Active, 0.5, 200.0),
        model_entry("shadow-s", ModelStatus::Shadow, 0.3, 200.0),
    ]));
    let stats = Arc::new(StatsStore::in_memory());
    let custody = Arc::new(CustodyLog::open(dir.path().join("custody.jsonl"), b"key").unwrap());
    let metrics = Arc::new(MetricsRegistry::new());
    let engine = LifecycleEngine::new(
        Arc::clone(&registry),
        Arc::clone(&stats),
        Arc::clone(&custody),
        Arc::clone(&metrics),
        PromoteSection::default(),
        DemoteSection::default(),
        0,
    );

    let cluster = ClusterId::new("qa.short");
    for _ in 0..6 {
        stats.record(&cluster, &ModelId::new("active-a"), true, 0.005, 0.5);
        stats.record(&cluster, &ModelId::new("shadow-s"), true, 0.003, 0.4);
    }

    let changed = engine.evaluate(&cluster).unwrap();
    assert_eq!(changed, vec![ModelId::new("shadow-s")]);
    assert_eq!(metrics.counter_value("promotions_total"), 1);

    let records = custody.verify_chain().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].event, lattice_audit::CustodyEvent::Promote);

    // The promoted model is now the cheapest active and leads the plan.
    let request = RoutingRequest {
        task_type: "qa.short".to_string(),
        cluster_hint: cluster,
        quality_target: "fast".to_string(),
        latency_slo_ms: 2000.0,
        cost_ceiling_usd: 5.0,
        safety_level: SafetyGrade::D,
        expected_tokens: 1000,
    };
    let plan = plan(&registry, &request).unwrap();
    assert_eq!(plan.primary().model_id, ModelId::new("shadow-s"));
}

// A policy deny surfaces EPOLICY with a sanitized reason and never
// reaches an adapter.
#[tokio::test]
async fn policy_deny_is_final() {
    use lattice_audit::{CustodyLog, ObservationStore};
    use lattice_core::{PolicyDecision, PolicyEngine, PolicyInput};
    use lattice_kernel::Kernel;
    use lattice_router::ModelRegistry;

    struct DenyTenant;
    impl PolicyEngine for DenyTenant {
        fn check(&self, input: &PolicyInput) -> PolicyDecision {
            if input.tenant == "blocked" {
                PolicyDecision::deny("tenant not permitted for this task type")
            } else {
                PolicyDecision::allow()
            }
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let kernel = Kernel::builder(Config::default())
        .registry(Arc::new(ModelRegistry::in_memory(vec![model_entry(
            "fast-slm",
            ModelStatus::Active,
            0.2,
            100.0,
        )])))
        .custody(Arc::new(
            CustodyLog::open(dir.path().join("custody.jsonl"), b"key").unwrap(),
        ))
        .observations(Arc::new(
            ObservationStore::open(dir.path().join("obs")).unwrap(),
        ))
        .policy(Arc::new(DenyTenant))
        .build()
        .unwrap();
    let adapter = Arc::new(ScriptedAdapter::healthy("fast-adapter"));
    let calls = adapter.stream_calls();
    kernel.pool().register(adapter).unwrap();
    kernel.bind_model(
        ModelId::new("fast-slm"),
        lattice_core::AdapterId::new("fast-adapter"),
    );

    let mut request = serve_request("s5", "do the thing");
    request.tenant = "blocked".to_string();
    let err = kernel.serve(request).await.unwrap_err();
    assert_eq!(err.code(), lattice_core::ErrorCode::PolicyDenied);
    assert!(err.to_string().contains("not permitted"));
    assert_eq!(calls.load(std::sync::atomic::Ordering::Relaxed), 0);
    assert_eq!(
        kernel.metrics().counter_value("error_code_EPOLICY_total"),
        1
    );
}

// Parallel candidate outputs are merged by consensus; cited claims must
// be backed by provided evidence.
#[test]
fn consensus_and_evidence_over_parallel_outputs() {
    use lattice_consensus::{
        evaluate, record_agreement, validate_evidence, Citation, ConsensusOutcome,
        ConsensusStrategy,
    };
    use lattice_telemetry::MetricsRegistry;

    let metrics = MetricsRegistry::new();
    let outputs = vec![
        "the fix is to bound the queue [1]".to_string(),
        "bound the queue to fix it [1]".to_string(),
        "restart the router".to_string(),
    ];
    let outcome = evaluate(ConsensusStrategy::TwoPhase { threshold_pm: 300 }, &outputs);
    let ConsensusOutcome::Accepted { text, agreement } = outcome else {
        panic!("two-phase should accept the central answer");
    };
    assert!(text.contains("queue"));
    record_agreement(&metrics, agreement);

    assert!(validate_evidence(
        &text,
        &[Citation {
            index: 1,
            source: "incident-42".to_string()
        }],
        &metrics
    )
    .is_ok());
    assert!(validate_evidence(&text, &[], &metrics).is_err());
    assert_eq!(metrics.counter_value("evidence_fail_total"), 1);
}

// Observation files must carry both the primary record and the shadow
// seeds after a served request.
#[tokio::test]
async fn observations_recorded_for_primary_and_shadows() {
    use lattice_audit::{ObservationPhase, ObservationStore};

    let (kernel, dir) = test_kernel(vec![
        model_entry("fast-slm", ModelStatus::Active, 0.2, 100.0),
        model_entry("shadow-s", ModelStatus::Shadow, 0.1, 100.0),
    ]);
    kernel
        .pool()
        .register(Arc::new(ScriptedAdapter::healthy("fast-adapter")))
        .unwrap();
    kernel.bind_model(
        ModelId::new("fast-slm"),
        lattice_core::AdapterId::new("fast-adapter"),
    );

    kernel
        .serve(serve_request("s7", "Explain RAG simply"))
        .await
        .unwrap();
    // Let the background shadow append land.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let store = ObservationStore::open(dir.path().join("observations")).unwrap();
    let records = store.read_day(None).unwrap();
    assert!(records
        .iter()
        .any(|r| r.phase == ObservationPhase::Primary));
    assert!(records
        .iter()
        .any(|r| r.phase == ObservationPhase::ShadowSeed));
}
