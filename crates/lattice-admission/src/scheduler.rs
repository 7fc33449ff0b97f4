//! Strict-priority QoS scheduler.
//!
//! Three bounded FIFO queues, one per tier. Dequeue drains gold before
//! silver before bronze; within a tier, arrival order. Overflow rejects
//! with `backpressure` rather than dropping silently. Queue depth gauges
//! and per-dequeue delay observations feed the watermark.

use lattice_core::{QosTier, SessionId, StreamId};
use lattice_telemetry::MetricsRegistry;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::error::{AdmissionError, AdmissionResult};

/// One queued dispatch request.
#[derive(Debug, Clone)]
pub struct QueuedRequest {
    /// Owning session.
    pub session_id: SessionId,
    /// Stream to serve.
    pub stream_id: StreamId,
    /// QoS tier.
    pub qos: QosTier,
    /// When the request entered the queue.
    pub enqueued_at: Instant,
    /// Hard deadline; expired requests are rejected at dequeue.
    pub deadline: Option<Instant>,
}

/// Strict-priority, bounded, FIFO-per-tier scheduler.
pub struct QosScheduler {
    queues: Mutex<[VecDeque<QueuedRequest>; 3]>,
    capacity: usize,
    metrics: Arc<MetricsRegistry>,
}

impl QosScheduler {
    /// Create a scheduler with a per-tier queue bound.
    #[must_use]
    pub fn new(capacity: usize, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            queues: Mutex::new([VecDeque::new(), VecDeque::new(), VecDeque::new()]),
            capacity,
            metrics,
        }
    }

    /// Enqueue a request under its tier.
    pub fn enqueue(&self, request: QueuedRequest) -> AdmissionResult<()> {
        let mut queues = self.queues.lock().map_err(|_| AdmissionError::poisoned())?;
        let queue = &mut queues[request.qos.rank()];
        if queue.len() >= self.capacity {
            self.metrics
                .counter_with("queue_rejects_total", &[("qos", request.qos.as_str())])
                .inc();
            return Err(AdmissionError::QueueFull { qos: request.qos });
        }
        queue.push_back(request);
        self.update_depth_gauges(&queues);
        Ok(())
    }

    /// Dequeue the next request: strict priority across tiers, FIFO within.
    ///
    /// Expired requests are skipped and reported via the returned
    /// `expired` list so the caller can surface `request_cancelled`.
    pub fn dequeue(&self, now: Instant) -> AdmissionResult<(Option<QueuedRequest>, Vec<QueuedRequest>)> {
        let mut queues = self.queues.lock().map_err(|_| AdmissionError::poisoned())?;
        let mut expired = Vec::new();
        let mut picked = None;
        'tiers: for queue in queues.iter_mut() {
            while let Some(request) = queue.pop_front() {
                if request.deadline.is_some_and(|d| d <= now) {
                    expired.push(request);
                    continue;
                }
                picked = Some(request);
                break 'tiers;
            }
        }
        if let Some(request) = &picked {
            let delay_ms = now.duration_since(request.enqueued_at).as_secs_f64() * 1000.0;
            self.metrics
                .histogram(
                    "queue_delay_ms",
                    &[1.0, 5.0, 25.0, 100.0, 250.0, 1000.0, 5000.0],
                )
                .observe(delay_ms);
        }
        self.update_depth_gauges(&queues);
        Ok((picked, expired))
    }

    /// Queue depth for a tier.
    #[must_use]
    pub fn depth(&self, qos: QosTier) -> usize {
        self.queues
            .lock()
            .map(|q| q[qos.rank()].len())
            .unwrap_or(0)
    }

    /// Oldest enqueue time across the given tier, used by preemption.
    #[must_use]
    pub fn oldest(&self, qos: QosTier) -> Option<Instant> {
        self.queues
            .lock()
            .ok()
            .and_then(|q| q[qos.rank()].front().map(|r| r.enqueued_at))
    }

    fn update_depth_gauges(&self, queues: &[VecDeque<QueuedRequest>; 3]) {
        for tier in QosTier::ALL {
            self.metrics
                .gauge_with("queue_depth", &[("qos", tier.as_str())])
                .set(queues[tier.rank()].len() as f64);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(qos: QosTier, tag: &str) -> QueuedRequest {
        QueuedRequest {
            session_id: SessionId::from_string(tag),
            stream_id: StreamId::from_string("r"),
            qos,
            enqueued_at: Instant::now(),
            deadline: None,
        }
    }

    fn scheduler(capacity: usize) -> QosScheduler {
        QosScheduler::new(capacity, Arc::new(MetricsRegistry::new()))
    }

    #[test]
    fn test_strict_priority_across_tiers() {
        let s = scheduler(10);
        s.enqueue(request(QosTier::Bronze, "b1")).unwrap();
        s.enqueue(request(QosTier::Gold, "g1")).unwrap();
        s.enqueue(request(QosTier::Silver, "s1")).unwrap();
        let order: Vec<String> = (0..3)
            .map(|_| {
                s.dequeue(Instant::now())
                    .unwrap()
                    .0
                    .unwrap()
                    .session_id
                    .0
            })
            .collect();
        assert_eq!(order, vec!["g1", "s1", "b1"]);
    }

    #[test]
    fn test_fifo_within_tier() {
        let s = scheduler(10);
        s.enqueue(request(QosTier::Silver, "a")).unwrap();
        s.enqueue(request(QosTier::Silver, "b")).unwrap();
        assert_eq!(s.dequeue(Instant::now()).unwrap().0.unwrap().session_id.0, "a");
        assert_eq!(s.dequeue(Instant::now()).unwrap().0.unwrap().session_id.0, "b");
    }

    #[test]
    fn test_overflow_rejects_with_backpressure() {
        let s = scheduler(1);
        s.enqueue(request(QosTier::Bronze, "x")).unwrap();
        let err = s.enqueue(request(QosTier::Bronze, "y")).unwrap_err();
        assert!(matches!(err, AdmissionError::QueueFull { qos: QosTier::Bronze }));
        assert_eq!(err.code(), lattice_core::ErrorCode::Backpressure);
        // Other tiers are unaffected.
        assert!(s.enqueue(request(QosTier::Gold, "g")).is_ok());
    }

    #[test]
    fn test_expired_requests_skipped() {
        let s = scheduler(10);
        let mut expired = request(QosTier::Gold, "old");
        expired.deadline = Some(Instant::now());
        s.enqueue(expired).unwrap();
        s.enqueue(request(QosTier::Gold, "fresh")).unwrap();
        let (picked, dropped) = s.dequeue(Instant::now()).unwrap();
        assert_eq!(picked.unwrap().session_id.0, "fresh");
        assert_eq!(dropped.len(), 1);
        assert_eq!(dropped[0].session_id.0, "old");
    }

    #[test]
    fn test_empty_dequeue_returns_none() {
        let s = scheduler(4);
        let (picked, expired) = s.dequeue(Instant::now()).unwrap();
        assert!(picked.is_none());
        assert!(expired.is_empty());
    }
}
