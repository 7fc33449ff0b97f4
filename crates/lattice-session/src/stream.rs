//! The per-stream state machine and ACK bookkeeping.

use lattice_frame::{ControlStatus, Frame, Reassembler, TripletWindow};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, trace};

use crate::error::{SessionError, SessionResult};

/// Stream lifecycle phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    /// Created on first SYN; not yet admitted.
    Init,
    /// Passed admission.
    Admitted,
    /// Actively streaming.
    Streaming,
    /// Paused by adapter control status or ECN.
    Paused,
    /// Completed normally.
    Finalized,
    /// Completed with an error.
    Failed,
    /// Refused at admission.
    Rejected,
}

impl StreamPhase {
    /// Whether the stream has reached a terminal phase.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finalized | Self::Failed | Self::Rejected)
    }
}

/// What a fragment arrival produced.
#[derive(Debug, Default)]
pub struct FragmentEvent {
    /// New `ack_up_to` when it advanced (each step counts one ACK tx).
    pub ack_advanced_to: Option<u32>,
    /// Number of ACK steps taken by this arrival.
    pub ack_steps: u32,
    /// Missing indices to NACK, each emitted at most once per message.
    pub nacks: Vec<u32>,
    /// The reassembled message, when this arrival completed it.
    pub completed: Option<Frame>,
    /// True when the fragment was a duplicate or late and was dropped.
    pub dropped: bool,
}

/// Per-stream state: phase, sequence tracking, reassembly, ACK/NACK.
pub struct StreamMachine {
    phase: StreamPhase,
    reassembler: Reassembler,
    /// Highest msg_seq observed on this stream.
    current_msg: Option<u64>,
    /// Highest msg_seq fully delivered; later messages must exceed it.
    completed_msg: Option<u64>,
    /// Highest contiguous frag_seq ACKed for the current message.
    ack_up_to: Option<u32>,
    /// `(msg_seq, frag_seq)` pairs already NACKed.
    nacked: HashSet<(u64, u32)>,
    /// Effective window while streaming.
    effective_window: TripletWindow,
    /// Window stashed on pause, restored on resume.
    stashed_window: Option<TripletWindow>,
    acks_tx: u64,
    retransmit_requests: u64,
}

impl StreamMachine {
    /// Create a stream in INIT with the given effective window.
    #[must_use]
    pub fn new(window: TripletWindow, gap_ttl: Duration) -> Self {
        Self {
            phase: StreamPhase::Init,
            reassembler: Reassembler::new(gap_ttl),
            current_msg: None,
            completed_msg: None,
            ack_up_to: None,
            nacked: HashSet::new(),
            effective_window: window,
            stashed_window: None,
            acks_tx: 0,
            retransmit_requests: 0,
        }
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    /// Current effective window.
    #[must_use]
    pub fn effective_window(&self) -> TripletWindow {
        self.effective_window
    }

    /// ACK high-water mark for the current message.
    #[must_use]
    pub fn ack_up_to(&self) -> Option<u32> {
        self.ack_up_to
    }

    /// ACKs transmitted so far.
    #[must_use]
    pub fn acks_tx(&self) -> u64 {
        self.acks_tx
    }

    /// Retransmit requests (NACK entries) emitted so far.
    #[must_use]
    pub fn retransmit_requests(&self) -> u64 {
        self.retransmit_requests
    }

    // -- Lifecycle transitions --

    /// INIT → ADMITTED.
    pub fn admit(&mut self) -> SessionResult<()> {
        self.transition(StreamPhase::Init, StreamPhase::Admitted)
    }

    /// INIT → REJECTED (budget, window, or policy refusal).
    pub fn reject(&mut self) -> SessionResult<()> {
        self.transition(StreamPhase::Init, StreamPhase::Rejected)
    }

    /// ADMITTED → STREAMING.
    pub fn start_streaming(&mut self) -> SessionResult<()> {
        self.transition(StreamPhase::Admitted, StreamPhase::Streaming)
    }

    /// STREAMING → PAUSED under an adapter control status or ECN mark.
    ///
    /// Returns the new effective window: zero for BUSY, the currently
    /// advertised window for PAUSE (the caller zeroes it when the grace
    /// period lapses), and a parallel clamp of one for DRAINING.
    pub fn pause(&mut self, status: ControlStatus) -> SessionResult<TripletWindow> {
        if self.phase != StreamPhase::Streaming {
            return Err(SessionError::InvalidTransition {
                from: format!("{:?}", self.phase),
                to: "Paused".to_string(),
            });
        }
        self.stashed_window = Some(self.effective_window);
        self.effective_window = match status {
            ControlStatus::Busy => TripletWindow::zero(),
            ControlStatus::Pause => self.effective_window,
            ControlStatus::Draining => self.effective_window.clamp_parallel(1),
            ControlStatus::Resume => {
                return Err(SessionError::InvalidTransition {
                    from: "Streaming".to_string(),
                    to: "Paused(RESUME)".to_string(),
                })
            },
        };
        self.phase = StreamPhase::Paused;
        debug!(?status, "stream paused");
        Ok(self.effective_window)
    }

    /// Grace period after PAUSE lapsed: drop the window to zero.
    pub fn grace_elapsed(&mut self) {
        if self.phase == StreamPhase::Paused {
            self.effective_window = TripletWindow::zero();
        }
    }

    /// PAUSED → STREAMING, restoring the pre-pause window.
    pub fn resume(&mut self) -> SessionResult<TripletWindow> {
        if self.phase != StreamPhase::Paused {
            return Err(SessionError::InvalidTransition {
                from: format!("{:?}", self.phase),
                to: "Streaming".to_string(),
            });
        }
        if let Some(window) = self.stashed_window.take() {
            self.effective_window = window;
        }
        self.phase = StreamPhase::Streaming;
        Ok(self.effective_window)
    }

    /// Any live phase → FINALIZED.
    pub fn finalize(&mut self) -> SessionResult<()> {
        if self.phase.is_terminal() {
            return Err(SessionError::InvalidTransition {
                from: format!("{:?}", self.phase),
                to: "Finalized".to_string(),
            });
        }
        self.phase = StreamPhase::Finalized;
        Ok(())
    }

    /// Any live phase → FAILED.
    pub fn fail(&mut self) {
        if !self.phase.is_terminal() {
            self.phase = StreamPhase::Failed;
        }
    }

    // -- Fragment handling --

    /// Process one inbound fragment: sequence checks, reassembly, ACK
    /// advancement, NACK computation.
    pub fn handle_fragment(&mut self, frame: &Frame) -> SessionResult<FragmentEvent> {
        if self.phase.is_terminal() {
            return Err(SessionError::StreamClosed);
        }
        // msg_seq strictly monotonic: anything at or below the last fully
        // delivered message is a protocol violation.
        if let Some(done) = self.completed_msg {
            if frame.msg_seq <= done {
                return Err(SessionError::SequenceRegression {
                    msg_seq: frame.msg_seq,
                    delivered: done,
                });
            }
        }

        let is_new_current = self.current_msg.map_or(true, |cur| frame.msg_seq > cur);
        if is_new_current {
            self.current_msg = Some(frame.msg_seq);
            self.ack_up_to = None;
        }
        let is_current = self.current_msg == Some(frame.msg_seq);

        let outcome = self.reassembler.insert(frame)?;
        let mut event = FragmentEvent {
            dropped: outcome.duplicate || outcome.late,
            ..FragmentEvent::default()
        };

        // ACK state tracks only the current message; `ack_up_to` never
        // decreases within it.
        if is_current {
            if let Some(contiguous) = outcome.contiguous_up_to {
                let prev = self.ack_up_to;
                let advanced = match prev {
                    None => true,
                    Some(p) => contiguous > p,
                };
                if advanced {
                    let steps = match prev {
                        None => contiguous + 1,
                        Some(p) => contiguous - p,
                    };
                    self.ack_up_to = Some(contiguous);
                    self.acks_tx += u64::from(steps);
                    event.ack_advanced_to = Some(contiguous);
                    event.ack_steps = steps;
                    trace!(
                        msg_seq = frame.msg_seq,
                        ack_up_to = contiguous,
                        "ack advanced"
                    );
                }
            }

            // NACKs only once the terminal fragment is known, and each
            // missing index only once per message.
            for missing in outcome.missing {
                if self.nacked.insert((frame.msg_seq, missing)) {
                    event.nacks.push(missing);
                }
            }
            self.retransmit_requests += event.nacks.len() as u64;
        }

        if let Some(completed) = outcome.complete {
            self.completed_msg = Some(frame.msg_seq);
            self.nacked.retain(|(seq, _)| *seq != frame.msg_seq);
            event.completed = Some(completed);
        }
        Ok(event)
    }

    fn transition(&mut self, from: StreamPhase, to: StreamPhase) -> SessionResult<()> {
        if self.phase != from {
            return Err(SessionError::InvalidTransition {
                from: format!("{:?}", self.phase),
                to: format!("{to:?}"),
            });
        }
        self.phase = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_core::{QosTier, SessionId, StreamId};
    use lattice_frame::{fragment, Payload};

    fn machine() -> StreamMachine {
        let mut m = StreamMachine::new(TripletWindow::default(), Duration::from_secs(30));
        m.admit().unwrap();
        m.start_streaming().unwrap();
        m
    }

    fn fragments(text: &str, max: usize) -> Vec<Frame> {
        let frame = Frame::new(
            SessionId::from_string("s"),
            StreamId::from_string("r"),
            1,
            QosTier::Silver,
            Payload::partial(text, 0.9),
        );
        fragment(&frame, max).unwrap()
    }

    #[test]
    fn test_lifecycle_happy_path() {
        let mut m = StreamMachine::new(TripletWindow::default(), Duration::from_secs(30));
        assert_eq!(m.phase(), StreamPhase::Init);
        m.admit().unwrap();
        m.start_streaming().unwrap();
        m.finalize().unwrap();
        assert!(m.phase().is_terminal());
    }

    #[test]
    fn test_rejected_is_terminal() {
        let mut m = StreamMachine::new(TripletWindow::default(), Duration::from_secs(30));
        m.reject().unwrap();
        assert_eq!(m.phase(), StreamPhase::Rejected);
        assert!(m.admit().is_err());
    }

    #[test]
    fn test_pause_busy_zeroes_window() {
        let mut m = machine();
        let w = m.pause(ControlStatus::Busy).unwrap();
        assert_eq!(w, TripletWindow::zero());
        let restored = m.resume().unwrap();
        assert_eq!(restored, TripletWindow::default());
    }

    #[test]
    fn test_pause_keeps_window_until_grace() {
        let mut m = machine();
        let w = m.pause(ControlStatus::Pause).unwrap();
        assert_eq!(w, TripletWindow::default());
        m.grace_elapsed();
        assert_eq!(m.effective_window(), TripletWindow::zero());
        assert_eq!(m.resume().unwrap(), TripletWindow::default());
    }

    #[test]
    fn test_draining_clamps_parallel_to_one() {
        let mut m = machine();
        let w = m.pause(ControlStatus::Draining).unwrap();
        assert_eq!(w.max_parallel, 1);
        assert_eq!(w.max_tokens, TripletWindow::default().max_tokens);
    }

    #[test]
    fn test_ack_sequence_for_out_of_order_arrival() {
        // Three fragments arriving [1, 0, 2]: ack stays unset on frag 1,
        // jumps to 1 on frag 0, reaches 2 on frag 2. No NACKs (no gaps at
        // terminal time... frag 2 is terminal and 0/1 are present).
        let frags = fragments("three part message for ack ordering test", 33);
        assert_eq!(frags.len(), 3);
        let mut m = machine();

        let e1 = m.handle_fragment(&frags[1]).unwrap();
        assert_eq!(e1.ack_advanced_to, None);
        assert!(e1.nacks.is_empty());

        let e0 = m.handle_fragment(&frags[0]).unwrap();
        assert_eq!(e0.ack_advanced_to, Some(1));
        assert_eq!(e0.ack_steps, 2);

        let e2 = m.handle_fragment(&frags[2]).unwrap();
        assert_eq!(e2.ack_advanced_to, Some(2));
        assert!(e2.completed.is_some());
        assert!(e2.nacks.is_empty());
        assert_eq!(m.acks_tx(), 3);
        assert_eq!(m.retransmit_requests(), 0);
    }

    #[test]
    fn test_nack_emitted_once_for_lost_fragment() {
        let frags = fragments("three part message of nack emission test", 33);
        assert_eq!(frags.len(), 3);
        let mut m = machine();

        m.handle_fragment(&frags[0]).unwrap();
        // Fragment 1 lost; terminal arrives.
        let e2 = m.handle_fragment(&frags[2]).unwrap();
        assert_eq!(e2.nacks, vec![1]);
        assert_eq!(m.retransmit_requests(), 1);

        // A duplicate terminal does not re-NACK.
        let dup = m.handle_fragment(&frags[2]).unwrap();
        assert!(dup.nacks.is_empty());
        assert!(dup.dropped);

        // The retransmitted fragment completes the message.
        let e1 = m.handle_fragment(&frags[1]).unwrap();
        assert!(e1.completed.is_some());
    }

    #[test]
    fn test_msg_seq_regression_rejected() {
        let mut m = machine();
        let frags = fragments("tiny", 10_000);
        m.handle_fragment(&frags[0]).unwrap();
        // msg_seq 1 delivered; a replayed msg_seq 1 frame is a violation.
        let err = m.handle_fragment(&frags[0]).unwrap_err();
        assert!(matches!(err, SessionError::SequenceRegression { .. }));
    }

    #[test]
    fn test_ack_resets_for_next_message() {
        let mut m = machine();
        let first = fragments("tiny", 10_000);
        m.handle_fragment(&first[0]).unwrap();

        let mut frame2 = first[0].clone();
        frame2.msg_seq = 2;
        let e = m.handle_fragment(&frame2).unwrap();
        assert_eq!(e.ack_advanced_to, Some(0));
        assert_eq!(m.ack_up_to(), Some(0));
    }

    #[test]
    fn test_terminal_stream_refuses_fragments() {
        let mut m = machine();
        m.finalize().unwrap();
        let frags = fragments("tiny", 10_000);
        assert!(matches!(
            m.handle_fragment(&frags[0]),
            Err(SessionError::StreamClosed)
        ));
    }
}
