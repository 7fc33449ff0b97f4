//! The serve pipeline: admit → plan → dispatch → validate → finalize.

use futures::StreamExt;
use lattice_admission::{Estimate, QueuedRequest};
use lattice_audit::{ObservationPhase, ObservationRecord};
use lattice_core::{ClusterId, ModelId, PolicyInput, QosTier, SessionId, StreamId, Timestamp};
use lattice_dispatch::DispatchError;
use lattice_router::{
    plan as build_plan, reorder_by_ucb, shadow_observation, EscalationConfig, ModelStatus,
    RoutingRequest, SafetyGrade, StreamProbe,
};
use sha2::{Digest, Sha256};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{KernelError, KernelResult};
use crate::kernel::Kernel;

/// One inference request entering the pipeline.
#[derive(Debug, Clone)]
pub struct ServeRequest {
    /// Owning session.
    pub session_id: SessionId,
    /// Stream to serve on.
    pub stream_id: StreamId,
    /// Requesting tenant (policy input).
    pub tenant: String,
    /// QoS tier.
    pub qos: QosTier,
    /// The prompt text.
    pub prompt: String,
    /// Task type.
    pub task_type: String,
    /// Task cluster for statistics.
    pub cluster_hint: ClusterId,
    /// Quality target.
    pub quality_target: String,
    /// Latency SLO in milliseconds.
    pub latency_slo_ms: f64,
    /// Cost ceiling in USD.
    pub cost_ceiling_usd: f64,
    /// Minimum safety grade.
    pub safety_level: SafetyGrade,
    /// Whether escalation may race candidates speculatively.
    pub speculative_enabled: bool,
    /// Hard deadline: expired-in-queue yields `backpressure`, expired
    /// after dispatch yields `request_cancelled`.
    pub deadline: Option<Instant>,
    /// Cancellation signal; firing mid-stream closes the adapter stream
    /// and surfaces `request_cancelled`.
    pub cancel: Option<tokio_util::sync::CancellationToken>,
}

/// The finalized outcome of a served request.
#[derive(Debug, Clone)]
pub struct ServeOutcome {
    /// The accepted final text.
    pub final_text: String,
    /// The model that produced it.
    pub model_id: ModelId,
    /// The `plan` payload that was emitted to the client.
    pub plan_payload: serde_json::Value,
    /// Actual cost in USD.
    pub cost_usd: f64,
    /// Input tokens.
    pub tokens_in: u64,
    /// Output tokens.
    pub tokens_out: u64,
    /// Wall latency in seconds.
    pub latency_s: f64,
    /// Saving against the plan's cost frontier, in percent (>= 0).
    pub savings_pct: f64,
    /// Partial payload texts streamed before the final.
    pub partials: Vec<String>,
}

struct CandidateRun {
    text: String,
    partials: Vec<String>,
    tokens_in: u64,
    tokens_out: u64,
    usd_micros: u64,
    escalated: bool,
    finished: bool,
}

impl Kernel {
    /// Serve a request end to end.
    pub async fn serve(&self, request: ServeRequest) -> KernelResult<ServeOutcome> {
        let started = Instant::now();
        let mut span = self
            .sampler
            .start("serve", request.qos, request.session_id.as_str());

        if request.prompt.len() > self.config.frame.max_prompt_bytes {
            let err = KernelError::PromptTooLarge {
                size: request.prompt.len(),
                limit: self.config.frame.max_prompt_bytes,
            };
            self.count_error(err.code());
            return Err(err);
        }

        // Policy first: a deny is final and is never escalated around.
        let decision = self.policy.check(&PolicyInput {
            tenant: request.tenant.clone(),
            task_type: request.task_type.clone(),
            data_scope: None,
            tool_permissions: Vec::new(),
            security_groups: Vec::new(),
            metadata: serde_json::Value::Null,
        });
        if !decision.allow {
            let err = KernelError::PolicyDenied {
                reason: decision.reasons.join("; "),
            };
            self.count_error(err.code());
            return Err(err);
        }

        // Queue under the request's tier; strict priority drains gold
        // first. Queue delay feeds the watermark.
        let enqueued_at = Instant::now();
        self.scheduler
            .enqueue(QueuedRequest {
                session_id: request.session_id.clone(),
                stream_id: request.stream_id.clone(),
                qos: request.qos,
                enqueued_at,
                deadline: request.deadline,
            })
            .inspect_err(|e| self.count_error(e.code()))?;
        let (picked, expired) = self
            .scheduler
            .dequeue(Instant::now())
            .inspect_err(|e| self.count_error(e.code()))?;
        if picked.is_none() {
            if expired
                .iter()
                .any(|r| r.session_id == request.session_id && r.stream_id == request.stream_id)
            {
                let err = KernelError::DeadlineExpiredQueued;
                self.count_error(err.code());
                return Err(err);
            }
            // Another worker drained our entry; in this single-threaded
            // pipeline that is a logic error.
            return Err(KernelError::Internal("queue drained unexpectedly".to_string()));
        }
        let delay_ms = enqueued_at.elapsed().as_secs_f64() * 1000.0;
        self.watermark.observe(delay_ms);

        // Plan before spending: registry filter, cost sort, UCB reorder.
        let routing = RoutingRequest {
            task_type: request.task_type.clone(),
            cluster_hint: request.cluster_hint.clone(),
            quality_target: request.quality_target.clone(),
            latency_slo_ms: request.latency_slo_ms,
            cost_ceiling_usd: request.cost_ceiling_usd,
            safety_level: request.safety_level,
            expected_tokens: estimate_tokens(&request.prompt),
        };
        // Preflight against the triplet budget before any adapter is
        // touched: a session already out of tokens never reaches Estimate.
        let budget = self.budget_for(&request.session_id);
        let local_estimate = Estimate {
            tokens: routing.expected_tokens,
            usd_micros: 0,
            parallel: 1,
        };
        if let Err(e) = budget.preflight(local_estimate) {
            if matches!(
                e,
                lattice_admission::AdmissionError::Backpressure {
                    dimension: lattice_admission::BudgetDimension::Tokens
                }
            ) {
                self.metrics.counter("window_denied_tokens_total").inc();
            }
            self.count_error(e.code());
            return Err(e.into());
        }

        let mut plan = build_plan(&self.registry, &routing)
            .inspect_err(|e| self.count_error(e.code()))?;
        reorder_by_ucb(
            &mut plan,
            &self.stats,
            lattice_router::ucb::DEFAULT_EXPLORATION,
            &self.metrics,
        );
        let plan_payload = plan.to_payload_body();
        let prompt_hash = hash_prompt(&request.prompt);
        let prompt_json = serde_json::json!({
            "prompt": request.prompt,
            "task_type": request.task_type,
        });

        // Walk the candidate chain; each failed or escalated candidate
        // hands over to the next.
        let mut speculative_pending = false;
        let mut last_error: Option<KernelError> = None;
        for candidate in plan.candidates.clone() {
            let adapter_id = match self.bindings.get(&candidate.model_id) {
                Some(adapter) => adapter.clone(),
                None => {
                    warn!(model = %candidate.model_id, "no adapter bound, skipping candidate");
                    continue;
                },
            };

            // Estimate, then admit against the triplet budget.
            let estimate = match self
                .pool
                .estimate(&adapter_id, &request.stream_id, &request.task_type, &prompt_json)
                .await
            {
                Ok(estimate) => estimate,
                Err(e) => {
                    self.count_error(e.code());
                    last_error = Some(e.into());
                    continue;
                },
            };
            let booked = Estimate {
                tokens: estimate.total_tokens(),
                usd_micros: estimate.usd_micros,
                parallel: 1,
            };
            if let Err(e) = budget.reserve(booked) {
                if matches!(
                    e,
                    lattice_admission::AdmissionError::Backpressure {
                        dimension: lattice_admission::BudgetDimension::Tokens
                    }
                ) {
                    self.metrics.counter("window_denied_tokens_total").inc();
                }
                self.count_error(e.code());
                return Err(e.into());
            }

            let run = self
                .run_candidate(&adapter_id, &request, &prompt_json)
                .await;
            match run {
                Ok(run) if run.finished && !run.escalated => {
                    let verdict = self.validator.validate(
                        &run.text,
                        &request.prompt,
                        &candidate.model_id,
                    );
                    lattice_router::record_verdict(
                        &self.metrics,
                        &candidate.model_id,
                        &verdict,
                    );
                    budget.reconcile(booked, run.tokens_in + run.tokens_out, run.usd_micros);
                    budget.on_ack(1);
                    self.aimd.feedback(
                        request.session_id.as_str(),
                        started.elapsed().as_secs_f64() * 1000.0,
                        true,
                        self.watermark.ecn_marking(),
                    );

                    if !verdict.success() {
                        debug!(model = %candidate.model_id, "validator rejected, escalating");
                        self.stats.record(
                            &request.cluster_hint,
                            &candidate.model_id,
                            false,
                            run.usd_micros as f64 / 1e6,
                            started.elapsed().as_secs_f64(),
                        );
                        last_error = Some(KernelError::CandidatesExhausted);
                        continue;
                    }

                    let latency_s = started.elapsed().as_secs_f64();
                    let cost_usd = run.usd_micros as f64 / 1e6;
                    if speculative_pending {
                        self.metrics.counter("speculative_accepted").inc();
                    }
                    self.stats.record(
                        &request.cluster_hint,
                        &candidate.model_id,
                        true,
                        cost_usd,
                        latency_s,
                    );
                    self.record_observations(
                        &request,
                        &prompt_hash,
                        &plan.candidate_ids(),
                        &candidate.model_id,
                        latency_s,
                        run.tokens_in,
                        run.tokens_out,
                        cost_usd,
                        verdict.quality_score,
                    );
                    if let Err(e) = self.lifecycle.evaluate(&request.cluster_hint) {
                        warn!(error = %e, "lifecycle evaluation failed");
                    }

                    let frontier = plan.frontier_price(&routing).max(cost_usd);
                    let savings_pct = if frontier > 0.0 {
                        ((frontier - cost_usd) / frontier * 100.0).max(0.0)
                    } else {
                        0.0
                    };
                    if let Some(span) = span.as_mut() {
                        span.record("model", &candidate.model_id);
                        span.record("cost_usd", cost_usd);
                    }
                    info!(
                        session = %request.session_id,
                        model = %candidate.model_id,
                        cost_usd,
                        savings_pct,
                        "request finalized"
                    );
                    return Ok(ServeOutcome {
                        final_text: run.text,
                        model_id: candidate.model_id,
                        plan_payload,
                        cost_usd,
                        tokens_in: run.tokens_in,
                        tokens_out: run.tokens_out,
                        latency_s,
                        savings_pct,
                        partials: run.partials,
                    });
                },
                Ok(run) if run.escalated => {
                    // Escalation fired mid-stream: the candidate is
                    // cancelled. Spend so far stays booked; only the
                    // unspent remainder of the estimate is refunded.
                    budget.reconcile(booked, run.tokens_in + run.tokens_out, run.usd_micros);
                    budget.on_ack(1);
                    self.stats.record(
                        &request.cluster_hint,
                        &candidate.model_id,
                        false,
                        run.usd_micros as f64 / 1e6,
                        started.elapsed().as_secs_f64(),
                    );
                    if request.speculative_enabled {
                        self.metrics.counter("speculative_attempted").inc();
                        speculative_pending = true;
                    }
                    debug!(model = %candidate.model_id, "candidate cancelled, escalating");
                },
                Ok(run) => {
                    // Stream ended without a terminal chunk: adapter-side
                    // truncation. Refund the unspent estimate and move on.
                    budget.reconcile(booked, run.tokens_in + run.tokens_out, run.usd_micros);
                    budget.on_ack(1);
                    warn!(model = %candidate.model_id, "stream truncated, trying next candidate");
                    last_error = Some(KernelError::Dispatch(DispatchError::Transport(
                        "stream truncated".to_string(),
                    )));
                },
                Err(e) => {
                    budget.release(booked);
                    self.aimd.feedback(
                        request.session_id.as_str(),
                        started.elapsed().as_secs_f64() * 1000.0,
                        false,
                        false,
                    );
                    self.count_error(e.code());
                    if matches!(e, DispatchError::Cancelled) {
                        // Cancellation ends the whole request, not just
                        // this candidate.
                        return Err(e.into());
                    }
                    last_error = Some(e.into());
                },
            }
        }

        let err = last_error.unwrap_or_else(|| {
            let e = KernelError::CandidatesExhausted;
            self.count_error(e.code());
            e
        });
        Err(err)
    }

    async fn run_candidate(
        &self,
        adapter_id: &lattice_core::AdapterId,
        request: &ServeRequest,
        prompt_json: &serde_json::Value,
    ) -> Result<CandidateRun, DispatchError> {
        let mut stream = self
            .pool
            .open_stream(adapter_id, &request.stream_id, prompt_json)
            .await?;

        let mut probe = StreamProbe::new(EscalationConfig::default());
        let mut run = CandidateRun {
            text: String::new(),
            partials: Vec::new(),
            tokens_in: 0,
            tokens_out: 0,
            usd_micros: 0,
            escalated: false,
            finished: false,
        };

        loop {
            if request.deadline.is_some_and(|d| Instant::now() >= d) {
                // Dispatched but out of time: close the adapter stream.
                return Err(DispatchError::Cancelled);
            }
            let next = match &request.cancel {
                Some(cancel) => {
                    tokio::select! {
                        () = cancel.cancelled() => {
                            // Close the adapter stream by dropping it.
                            return Err(DispatchError::Cancelled);
                        },
                        next = stream.next() => next,
                    }
                },
                None => stream.next().await,
            };
            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk?;
            run.tokens_in = run.tokens_in.max(chunk.partial_in_tokens);
            run.tokens_out = run.tokens_out.max(chunk.partial_out_tokens);
            run.usd_micros = run.usd_micros.max(chunk.partial_usd_micros);
            let text = chunk.text().map(str::to_string);
            if let Some(t) = &text {
                run.text.push_str(t);
                if chunk.more {
                    run.partials.push(t.clone());
                }
            }
            if probe
                .observe(text.as_deref(), chunk.confidence, chunk.partial_out_tokens)
                .is_some()
            {
                // Cancel this candidate: drop the stream mid-flight.
                run.escalated = true;
                return Ok(run);
            }
            if !chunk.more {
                run.finished = true;
                break;
            }
        }
        Ok(run)
    }

    #[allow(clippy::too_many_arguments)]
    fn record_observations(
        &self,
        request: &ServeRequest,
        prompt_hash: &str,
        plan_ids: &[ModelId],
        served_model: &ModelId,
        latency_s: f64,
        tokens_in: u64,
        tokens_out: u64,
        cost_usd: f64,
        quality: f64,
    ) {
        let primary = ObservationRecord {
            ts: Timestamp::now(),
            prompt_hash: prompt_hash.to_string(),
            cluster_hint: request.cluster_hint.clone(),
            model_plan: plan_ids.to_vec(),
            primary_model: served_model.clone(),
            latency_s,
            tokens_in,
            tokens_out,
            cost_usd,
            phase: ObservationPhase::Primary,
            schema_version: lattice_audit::observation::SCHEMA_VERSION,
            quality: Some(quality),
        };
        if let Err(e) = self.observations.append(&primary) {
            warn!(error = %e, "primary observation append failed");
        }

        // Shadow evaluation: per shadow model, one synchronous seed
        // observation plus a background one. Both are observation events
        // only; neither feeds UCB stats.
        let mut background = Vec::new();
        for entry in self
            .registry
            .snapshot()
            .iter()
            .filter(|e| e.status == ModelStatus::Shadow)
        {
            let obs = shadow_observation(prompt_hash, entry);
            let record = ObservationRecord {
                ts: Timestamp::now(),
                prompt_hash: prompt_hash.to_string(),
                cluster_hint: request.cluster_hint.clone(),
                model_plan: plan_ids.to_vec(),
                primary_model: entry.model_id.clone(),
                latency_s: obs.shadow_latency_s,
                tokens_in,
                tokens_out,
                cost_usd: obs.shadow_cost_usd,
                phase: ObservationPhase::ShadowSeed,
                schema_version: lattice_audit::observation::SCHEMA_VERSION,
                quality: Some(obs.shadow_quality),
            };
            if let Err(e) = self.observations.append(&record) {
                warn!(error = %e, "shadow observation append failed");
            }
            let mut bg = record;
            bg.ts = Timestamp::now();
            bg.phase = ObservationPhase::Shadow;
            background.push(bg);
        }
        if !background.is_empty() {
            let store = std::sync::Arc::clone(&self.observations);
            tokio::spawn(async move {
                for record in background {
                    if let Err(e) = store.append(&record) {
                        warn!(error = %e, "background shadow append failed");
                    }
                }
            });
        }
    }
}

fn hash_prompt(prompt: &str) -> String {
    hex::encode(Sha256::digest(prompt.as_bytes()))[..16].to_string()
}

fn estimate_tokens(prompt: &str) -> u64 {
    // Rough approximation: ~4 chars per token, floor of 16.
    (prompt.len() as u64 / 4).max(16)
}
