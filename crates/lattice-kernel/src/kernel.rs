//! The root context: construction and frame ingest.

use dashmap::DashMap;
use lattice_admission::{
    AimdController, QosScheduler, TripletBudget, Watermark, WindowUpdateEmitter,
};
use lattice_audit::{CustodyLog, ObservationStore};
use lattice_config::Config;
use lattice_core::{AdapterId, AllowAllPolicy, ModelId, PolicyEngine, QosTier, SessionId};
use lattice_dispatch::AdapterPool;
use lattice_frame::{Frame, FrameFlags, KeyManager, NonceStore, Payload, TripletWindow};
use lattice_router::{BasicValidator, ModelRegistry, StatsStore, SuccessValidator};
use lattice_session::{
    FragmentEvent, HeartbeatAction, ResumeTokenStore, SessionMap,
};
use lattice_telemetry::{MetricsRegistry, SpanSampler};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::error::{KernelError, KernelResult};

/// Builder for [`Kernel`].
pub struct KernelBuilder {
    config: Config,
    registry: Option<Arc<ModelRegistry>>,
    stats: Option<Arc<StatsStore>>,
    custody: Option<Arc<CustodyLog>>,
    observations: Option<Arc<ObservationStore>>,
    validator: Option<Arc<dyn SuccessValidator>>,
    keys: Option<Arc<KeyManager>>,
    policy: Option<Arc<dyn PolicyEngine>>,
}

impl KernelBuilder {
    /// Start a builder from config.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            registry: None,
            stats: None,
            custody: None,
            observations: None,
            validator: None,
            keys: None,
            policy: None,
        }
    }

    /// Use this model registry.
    #[must_use]
    pub fn registry(mut self, registry: Arc<ModelRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Use this stats store.
    #[must_use]
    pub fn stats(mut self, stats: Arc<StatsStore>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Use this custody log.
    #[must_use]
    pub fn custody(mut self, custody: Arc<CustodyLog>) -> Self {
        self.custody = Some(custody);
        self
    }

    /// Use this observation store.
    #[must_use]
    pub fn observations(mut self, observations: Arc<ObservationStore>) -> Self {
        self.observations = Some(observations);
        self
    }

    /// Use this success validator.
    #[must_use]
    pub fn validator(mut self, validator: Arc<dyn SuccessValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Use this key manager.
    #[must_use]
    pub fn keys(mut self, keys: Arc<KeyManager>) -> Self {
        self.keys = Some(keys);
        self
    }

    /// Use this policy engine.
    #[must_use]
    pub fn policy(mut self, policy: Arc<dyn PolicyEngine>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Construct the kernel.
    pub fn build(self) -> KernelResult<Kernel> {
        let config = self.config;
        let metrics = Arc::new(MetricsRegistry::new());
        // Pre-register every stable error counter so dashboards see zeros.
        for code in lattice_core::ErrorCode::ALL {
            let _ = metrics.counter(&code.metric_name());
        }

        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(ModelRegistry::in_memory(Vec::new())));
        let stats = self.stats.unwrap_or_else(|| Arc::new(StatsStore::in_memory()));
        let custody = match self.custody {
            Some(custody) => custody,
            None => {
                return Err(KernelError::Internal(
                    "a custody log is required".to_string(),
                ))
            },
        };
        let observations = match self.observations {
            Some(observations) => observations,
            None => {
                return Err(KernelError::Internal(
                    "an observation store is required".to_string(),
                ))
            },
        };
        let validator = self
            .validator
            .unwrap_or_else(|| Arc::new(BasicValidator::new()));
        let keys = self.keys.unwrap_or_else(|| Arc::new(KeyManager::random()));
        let policy = self.policy.unwrap_or_else(|| Arc::new(AllowAllPolicy));

        let sessions = Arc::new(SessionMap::new(
            Arc::clone(&metrics),
            Duration::from_secs(config.frame.gap_ttl_s),
            config.heartbeat.interval_s,
            config.heartbeat.idle_fin_s,
        ));
        let lifecycle = Arc::new(lattice_router::LifecycleEngine::new(
            Arc::clone(&registry),
            Arc::clone(&stats),
            Arc::clone(&custody),
            Arc::clone(&metrics),
            config.promote.clone(),
            config.demote.clone(),
            config.promo_demo_hysteresis_sec,
        ));

        info!("kernel constructed");
        Ok(Kernel {
            nonces: Arc::new(NonceStore::new(Duration::from_secs(config.frame.replay_ttl_s))),
            scheduler: Arc::new(QosScheduler::new(1024, Arc::clone(&metrics))),
            aimd: Arc::new(AimdController::new(&config.aimd, 1000.0)),
            watermark: Arc::new(Watermark::new(&config.watermark)),
            window_updates: Arc::new(WindowUpdateEmitter::new(
                &config.window_update,
                Arc::clone(&metrics),
            )),
            pool: Arc::new(AdapterPool::new(config.circuit.clone(), Arc::clone(&metrics))),
            resume_tokens: Arc::new(ResumeTokenStore::new(Duration::from_secs(
                config.frame.replay_ttl_s,
            ))),
            sampler: SpanSampler::default(),
            bindings: DashMap::new(),
            budgets: DashMap::new(),
            config,
            metrics,
            keys,
            sessions,
            registry,
            stats,
            lifecycle,
            custody,
            observations,
            validator,
            policy,
        })
    }
}

/// The root context owning every store and component.
pub struct Kernel {
    pub(crate) config: Config,
    pub(crate) metrics: Arc<MetricsRegistry>,
    pub(crate) sampler: SpanSampler,
    pub(crate) keys: Arc<KeyManager>,
    pub(crate) nonces: Arc<NonceStore>,
    pub(crate) sessions: Arc<SessionMap>,
    pub(crate) scheduler: Arc<QosScheduler>,
    pub(crate) aimd: Arc<AimdController>,
    pub(crate) watermark: Arc<Watermark>,
    pub(crate) window_updates: Arc<WindowUpdateEmitter>,
    pub(crate) pool: Arc<AdapterPool>,
    pub(crate) registry: Arc<ModelRegistry>,
    pub(crate) stats: Arc<StatsStore>,
    pub(crate) lifecycle: Arc<lattice_router::LifecycleEngine>,
    pub(crate) custody: Arc<CustodyLog>,
    pub(crate) observations: Arc<ObservationStore>,
    pub(crate) validator: Arc<dyn SuccessValidator>,
    pub(crate) policy: Arc<dyn PolicyEngine>,
    pub(crate) resume_tokens: Arc<ResumeTokenStore>,
    /// Model → adapter bindings.
    pub(crate) bindings: DashMap<ModelId, AdapterId>,
    /// Per-session budgets (also referenced by the session records).
    pub(crate) budgets: DashMap<SessionId, Arc<TripletBudget>>,
}

impl Kernel {
    /// Start building a kernel.
    #[must_use]
    pub fn builder(config: Config) -> KernelBuilder {
        KernelBuilder::new(config)
    }

    /// The metric registry.
    #[must_use]
    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// The adapter pool (for registration at startup).
    #[must_use]
    pub fn pool(&self) -> &Arc<AdapterPool> {
        &self.pool
    }

    /// The session map.
    #[must_use]
    pub fn sessions(&self) -> &Arc<SessionMap> {
        &self.sessions
    }

    /// The lifecycle engine.
    #[must_use]
    pub fn lifecycle(&self) -> &Arc<lattice_router::LifecycleEngine> {
        &self.lifecycle
    }

    /// The resume token store.
    #[must_use]
    pub fn resume_tokens(&self) -> &Arc<ResumeTokenStore> {
        &self.resume_tokens
    }

    /// Bind a model to the adapter that serves it.
    pub fn bind_model(&self, model: ModelId, adapter: AdapterId) {
        self.bindings.insert(model, adapter);
    }

    /// Reload the model registry from disk (SIGHUP-style trigger).
    /// Manifest hashes are revalidated; failure keeps the old snapshot.
    pub fn reload_registry(&self) -> KernelResult<usize> {
        self.registry.reload().map_err(|e| {
            self.count_error(lattice_core::ErrorCode::ConfigFailure);
            e.into()
        })
    }

    /// Budget for a session, created on first touch from config defaults.
    pub fn budget_for(&self, session_id: &SessionId) -> Arc<TripletBudget> {
        Arc::clone(
            &self
                .budgets
                .entry(session_id.clone())
                .or_insert_with(|| {
                    Arc::new(TripletBudget::new(
                        self.default_window(),
                        Duration::from_secs(self.config.budget.burn_window_s),
                    ))
                }),
        )
    }

    pub(crate) fn default_window(&self) -> TripletWindow {
        TripletWindow {
            max_parallel: self.config.budget.default_parallel,
            max_tokens: self.config.budget.default_tokens,
            max_usd_micros: self.config.budget.default_usd_micros,
        }
    }

    /// Count an error code emission.
    pub(crate) fn count_error(&self, code: lattice_core::ErrorCode) {
        self.metrics.counter(&code.metric_name()).inc();
    }

    /// Ingest one raw frame from the wire: decode, replay-guard, verify
    /// signature when present, then hand it to the session layer. The
    /// owning session is created on first contact.
    pub fn ingest_frame(&self, text: &str) -> KernelResult<FragmentEvent> {
        let frame = Frame::decode(text).inspect_err(|e| self.count_error(e.code()))?;

        if !self.nonces.check_and_insert(&frame.replay_key()) {
            self.metrics.counter("replay_reject_total").inc();
            self.count_error(lattice_core::ErrorCode::BadFrame);
            return Err(KernelError::Replay);
        }

        if frame.sig.is_some() {
            if let Err(e) = self.keys.verify(&frame) {
                self.metrics.counter("frame_signature_fail_total").inc();
                self.count_error(e.code());
                return Err(e.into());
            }
        }

        if self.sessions.get(&frame.session_id).is_none() {
            let budget = self.budget_for(&frame.session_id);
            self.sessions.create(
                frame.session_id.clone(),
                frame.qos,
                self.default_window(),
                budget,
            );
        }

        self.sessions
            .handle_frame(&frame)
            .inspect_err(|e| self.count_error(e.code()))
            .map_err(Into::into)
    }

    /// Drive timers: heartbeats, idle FINs, session sweep, window updates.
    /// Returns the control frames to emit.
    pub fn tick(&self, now: Instant) -> Vec<Frame> {
        let mut out = Vec::new();
        let ecn = self.watermark.ecn_marking();

        for entry in self.sessions.preemption_candidates() {
            let Some(record) = self.sessions.get(&entry.session_id) else {
                continue;
            };
            let Ok(mut session) = record.lock() else {
                continue;
            };
            let session_id = session.id.clone();
            let qos = session.qos;
            let window = session.effective_window();
            let mut actions = Vec::new();
            for (stream_id, hb) in &mut session.heartbeats {
                if let Some(action) = hb.tick(now) {
                    actions.push((stream_id.clone(), action));
                }
            }
            for (stream_id, action) in actions {
                let mut frame = Frame::new(
                    session_id.clone(),
                    stream_id.clone(),
                    0,
                    qos,
                    Payload::heartbeat(),
                );
                frame.flags = FrameFlags::default();
                frame.flags.ecn = ecn;
                match action {
                    HeartbeatAction::EmitHeartbeat => {
                        frame.flags.hb = true;
                        self.metrics.counter("heartbeats_tx").inc();
                    },
                    HeartbeatAction::EmitFin => {
                        frame.flags.fin = true;
                        if let Some(machine) = session.streams.get_mut(&stream_id) {
                            if machine.finalize().is_err() {
                                warn!(stream = %stream_id, "idle FIN on non-live stream");
                            }
                        }
                    },
                }
                out.push(frame);
            }
            drop(session);
            // Window updates per session, on delta or interval.
            if self.window_updates.offer(window, now) {
                let mut frame = Frame::new(
                    session_id,
                    lattice_core::StreamId::from_string("ctrl"),
                    0,
                    qos,
                    Payload::new(
                        lattice_frame::PayloadKind::ControlStatus,
                        serde_json::json!({
                            "status": "WINDOW_UPDATE",
                            "window": window,
                        }),
                    ),
                );
                frame.flags.ctrl = true;
                frame.flags.ecn = ecn;
                out.push(frame);
            }
        }

        let idle = Duration::from_secs(self.config.heartbeat.idle_fin_s.saturating_mul(4));
        for destroyed in self.sessions.sweep_idle(idle, now) {
            self.budgets.remove(&destroyed);
        }
        out
    }

    /// Preempt enough low-tier sessions to free `needed` slots when the
    /// scheduler is configured for it. Returns the drained sessions.
    pub fn preempt(&self, needed: usize) -> Vec<SessionId> {
        if !self.config.qos.scheduler.preempt.enabled {
            return Vec::new();
        }
        let candidates: Vec<_> = self
            .sessions
            .preemption_candidates()
            .into_iter()
            .filter(|c| c.qos != QosTier::Gold)
            .collect();
        let victims = lattice_admission::select_victims(&candidates, needed);
        for victim in &victims {
            if self.sessions.mark_draining(victim).is_err() {
                warn!(session = %victim, "preemption victim vanished");
            }
        }
        victims
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_core::{SessionId, StreamId};

    fn kernel() -> (Kernel, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let custody =
            Arc::new(CustodyLog::open(dir.path().join("custody.jsonl"), b"key").unwrap());
        let observations = Arc::new(ObservationStore::open(dir.path().join("obs")).unwrap());
        let kernel = Kernel::builder(Config::default())
            .custody(custody)
            .observations(observations)
            .build()
            .unwrap();
        (kernel, dir)
    }

    fn signed_frame(kernel: &Kernel, session: &str, msg_seq: u64) -> String {
        let mut frame = Frame::new(
            SessionId::from_string(session),
            StreamId::from_string("r1"),
            msg_seq,
            QosTier::Silver,
            Payload::partial("hello", 0.9),
        );
        frame.flags.syn = true;
        frame.sig = Some(kernel.keys.sign(&frame).unwrap());
        serde_json::to_string(&frame).unwrap()
    }

    #[test]
    fn test_ingest_creates_session_and_delivers() {
        let (kernel, _dir) = kernel();
        let event = kernel.ingest_frame(&signed_frame(&kernel, "s1", 1)).unwrap();
        assert!(event.completed.is_some());
        assert_eq!(kernel.sessions.len(), 1);
    }

    #[test]
    fn test_replayed_frame_rejected_and_counted() {
        let (kernel, _dir) = kernel();
        let text = signed_frame(&kernel, "s1", 1);
        kernel.ingest_frame(&text).unwrap();
        assert!(matches!(
            kernel.ingest_frame(&text),
            Err(KernelError::Replay)
        ));
        assert_eq!(kernel.metrics.counter_value("replay_reject_total"), 1);
    }

    #[test]
    fn test_bad_signature_counted() {
        let (kernel, _dir) = kernel();
        let mut frame = Frame::new(
            SessionId::from_string("s1"),
            StreamId::from_string("r1"),
            1,
            QosTier::Silver,
            Payload::partial("hello", 0.9),
        );
        frame.sig = Some(kernel.keys.sign(&frame).unwrap());
        frame.msg_seq = 2;
        let text = serde_json::to_string(&frame).unwrap();
        assert!(kernel.ingest_frame(&text).is_err());
        assert_eq!(
            kernel.metrics.counter_value("frame_signature_fail_total"),
            1
        );
    }

    #[test]
    fn test_malformed_frame_counts_ebadframe() {
        let (kernel, _dir) = kernel();
        assert!(kernel.ingest_frame("{not json").is_err());
        assert_eq!(
            kernel.metrics.counter_value("error_code_EBADFRAME_total"),
            1
        );
    }

    #[test]
    fn test_tick_emits_heartbeats() {
        let (kernel, _dir) = kernel();
        kernel.ingest_frame(&signed_frame(&kernel, "s1", 1)).unwrap();
        // Default heartbeat interval is 10s.
        let frames = kernel.tick(Instant::now() + Duration::from_secs(11));
        assert!(frames.iter().any(|f| f.flags.hb));
        assert!(kernel.metrics.counter_value("heartbeats_tx") >= 1);
    }

    #[test]
    fn test_preemption_prefers_bronze() {
        let (kernel, _dir) = kernel();
        for (name, qos) in [("b", QosTier::Bronze), ("s", QosTier::Silver), ("g", QosTier::Gold)] {
            let budget = kernel.budget_for(&SessionId::from_string(name));
            kernel.sessions.create(
                SessionId::from_string(name),
                qos,
                kernel.default_window(),
                budget,
            );
        }
        let victims = kernel.preempt(1);
        assert_eq!(victims, vec![SessionId::from_string("b")]);
        let record = kernel.sessions.get(&SessionId::from_string("b")).unwrap();
        assert!(record.lock().unwrap().draining);
    }
}
