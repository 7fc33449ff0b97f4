//! Fragmentation and reassembly.
//!
//! Large payloads are split across frames sharing `(session_id, stream_id,
//! msg_seq)` with incrementing `frag_seq`. Non-terminal fragments carry the
//! MORE flag; the terminal fragment omits it. Each fragment body carries a
//! checksum (first 16 hex of SHA-256 of the fragment text) so corruption is
//! caught before completion.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::canonical::canonical_string;
use crate::error::{FrameError, FrameResult};
use crate::frame::{Frame, Payload};

/// First 16 hex characters of SHA-256 over the fragment text.
#[must_use]
pub fn fragment_checksum(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    hex::encode(digest)[..16].to_string()
}

/// Split a frame into `n ≥ 1` fragments of at most `max_bytes` of payload
/// text each.
///
/// A frame whose canonical payload fits in one fragment is returned
/// unchanged. Larger payloads are serialized to their canonical JSON text
/// and split on character boundaries; each fragment carries
/// `{chunk, checksum}` in its body with the original payload kind
/// preserved.
pub fn fragment(frame: &Frame, max_bytes: usize) -> FrameResult<Vec<Frame>> {
    let max_bytes = max_bytes.max(1);
    let full_text = canonical_string_of_payload(&frame.payload)?;
    if full_text.len() <= max_bytes {
        let mut single = frame.clone();
        single.frag_seq = 0;
        single.flags.more = false;
        return Ok(vec![single]);
    }

    let chunks = split_utf8(&full_text, max_bytes);
    let last = chunks.len() - 1;
    let frames = chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| {
            let mut f = frame.clone();
            f.frag_seq = u32::try_from(i).unwrap_or(u32::MAX);
            f.flags.more = i != last;
            f.payload = Payload {
                kind: frame.payload.kind.clone(),
                body: serde_json::json!({
                    "chunk": chunk,
                    "checksum": fragment_checksum(&chunk),
                }),
            };
            f
        })
        .collect();
    Ok(frames)
}

fn canonical_string_of_payload(payload: &Payload) -> FrameResult<String> {
    let value =
        serde_json::to_value(payload).map_err(|e| FrameError::BadFrame(e.to_string()))?;
    Ok(value.to_string())
}

fn split_utf8(text: &str, max_bytes: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        if current.len() + ch.len_utf8() > max_bytes && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        current.push(ch);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Result of inserting one fragment into the reassembler.
#[derive(Debug)]
pub struct ReassembleOutcome {
    /// The fully reassembled frame, when this insert completed the message.
    pub complete: Option<Frame>,
    /// True when the fragment was an idempotent duplicate.
    pub duplicate: bool,
    /// True when the fragment arrived after its message's gap TTL expired
    /// and was dropped.
    pub late: bool,
    /// Largest contiguous fragment index from 0 after this insert, if
    /// fragment 0 has arrived.
    pub contiguous_up_to: Option<u32>,
    /// Missing indices below the terminal; empty until the terminal
    /// fragment has been observed.
    pub missing: Vec<u32>,
}

impl ReassembleOutcome {
    fn dropped(late: bool) -> Self {
        Self {
            complete: None,
            duplicate: !late,
            late,
            contiguous_up_to: None,
            missing: Vec::new(),
        }
    }
}

#[derive(Debug)]
struct PartialMessage {
    fragments: BTreeMap<u32, Frame>,
    expected_last: Option<u32>,
    last_arrival: Instant,
}

impl PartialMessage {
    fn new() -> Self {
        Self {
            fragments: BTreeMap::new(),
            expected_last: None,
            last_arrival: Instant::now(),
        }
    }

    /// Largest contiguous fragment index observed from 0, or `None` when
    /// fragment 0 has not arrived.
    fn contiguous_up_to(&self) -> Option<u32> {
        let mut expect = 0u32;
        for &seq in self.fragments.keys() {
            if seq != expect {
                break;
            }
            expect = expect.saturating_add(1);
        }
        expect.checked_sub(1)
    }

    /// Missing indices below the terminal; empty until the terminal is
    /// observed.
    fn missing(&self) -> Vec<u32> {
        let Some(last) = self.expected_last else {
            return Vec::new();
        };
        (0..=last)
            .filter(|seq| !self.fragments.contains_key(seq))
            .collect()
    }

    fn is_complete(&self) -> bool {
        match self.expected_last {
            Some(last) => self.fragments.len() as u64 == u64::from(last) + 1,
            None => false,
        }
    }
}

/// Per-message reassembly state for one stream.
///
/// Keys are `msg_seq`; each open message holds its fragments in `frag_seq`
/// order. Messages whose gap TTL expires are pruned; fragments for pruned
/// messages are counted late and dropped.
pub struct Reassembler {
    open: BTreeMap<u64, PartialMessage>,
    pruned: BTreeMap<u64, Instant>,
    gap_ttl: Duration,
    late_fragments_dropped: AtomicU64,
}

impl Reassembler {
    /// Create a reassembler with the given gap TTL.
    #[must_use]
    pub fn new(gap_ttl: Duration) -> Self {
        Self {
            open: BTreeMap::new(),
            pruned: BTreeMap::new(),
            gap_ttl,
            late_fragments_dropped: AtomicU64::new(0),
        }
    }

    /// Insert one fragment.
    ///
    /// Duplicates (same `frag_seq`, same text) are discarded idempotently.
    /// A fragment whose checksum does not match its chunk is rejected.
    pub fn insert(&mut self, frame: &Frame) -> FrameResult<ReassembleOutcome> {
        self.prune(Instant::now());

        if self.pruned.contains_key(&frame.msg_seq) {
            self.late_fragments_dropped.fetch_add(1, Ordering::Relaxed);
            debug!(
                msg_seq = frame.msg_seq,
                frag_seq = frame.frag_seq,
                "late fragment dropped"
            );
            return Ok(ReassembleOutcome::dropped(true));
        }

        verify_chunk_checksum(frame)?;

        let partial = self
            .open
            .entry(frame.msg_seq)
            .or_insert_with(PartialMessage::new);
        partial.last_arrival = Instant::now();

        if partial.fragments.contains_key(&frame.frag_seq) {
            trace!(
                msg_seq = frame.msg_seq,
                frag_seq = frame.frag_seq,
                "duplicate fragment discarded"
            );
            let mut outcome = ReassembleOutcome::dropped(false);
            outcome.contiguous_up_to = partial.contiguous_up_to();
            outcome.missing = partial.missing();
            return Ok(outcome);
        }

        if frame.is_last_fragment() {
            partial.expected_last = Some(frame.frag_seq);
        }
        partial.fragments.insert(frame.frag_seq, frame.clone());

        let contiguous_up_to = partial.contiguous_up_to();
        let missing = partial.missing();

        if !partial.is_complete() {
            return Ok(ReassembleOutcome {
                complete: None,
                duplicate: false,
                late: false,
                contiguous_up_to,
                missing,
            });
        }

        let partial = self
            .open
            .remove(&frame.msg_seq)
            .ok_or_else(|| FrameError::BadFrame("reassembly state vanished".to_string()))?;
        let assembled = assemble(partial)?;
        Ok(ReassembleOutcome {
            complete: Some(assembled),
            duplicate: false,
            late: false,
            contiguous_up_to,
            missing,
        })
    }

    /// Largest contiguous fragment index from 0 for an open message.
    #[must_use]
    pub fn contiguous_up_to(&self, msg_seq: u64) -> Option<u32> {
        self.open.get(&msg_seq).and_then(PartialMessage::contiguous_up_to)
    }

    /// Missing fragment indices for an open message; empty until the
    /// terminal fragment has been observed.
    #[must_use]
    pub fn missing(&self, msg_seq: u64) -> Vec<u32> {
        self.open
            .get(&msg_seq)
            .map(PartialMessage::missing)
            .unwrap_or_default()
    }

    /// Drop open messages whose gap TTL has expired.
    pub fn prune(&mut self, now: Instant) {
        let gap_ttl = self.gap_ttl;
        let expired: Vec<u64> = self
            .open
            .iter()
            .filter(|(_, p)| now.duration_since(p.last_arrival) >= gap_ttl)
            .map(|(&seq, _)| seq)
            .collect();
        for seq in expired {
            if let Some(partial) = self.open.remove(&seq) {
                self.late_fragments_dropped
                    .fetch_add(partial.fragments.len() as u64, Ordering::Relaxed);
                self.pruned.insert(seq, now);
                debug!(msg_seq = seq, "reassembly gap ttl expired, message pruned");
            }
        }
        // Tombstones live for one further TTL so stragglers are counted.
        self.pruned
            .retain(|_, pruned_at| now.duration_since(*pruned_at) <= gap_ttl.saturating_mul(2));
    }

    /// Count of fragments dropped as late.
    #[must_use]
    pub fn late_fragments_dropped(&self) -> u64 {
        self.late_fragments_dropped.load(Ordering::Relaxed)
    }

    /// Number of messages currently being reassembled.
    #[must_use]
    pub fn open_messages(&self) -> usize {
        self.open.len()
    }
}

fn verify_chunk_checksum(frame: &Frame) -> FrameResult<()> {
    let Some(chunk) = frame.payload.body.get("chunk").and_then(Value::as_str) else {
        return Ok(());
    };
    let Some(checksum) = frame.payload.body.get("checksum").and_then(Value::as_str) else {
        return Ok(());
    };
    if fragment_checksum(chunk) != checksum {
        return Err(FrameError::ChecksumMismatch {
            frag_seq: frame.frag_seq,
        });
    }
    Ok(())
}

fn assemble(partial: PartialMessage) -> FrameResult<Frame> {
    // Single unfragmented frame: the payload is already whole.
    if partial.fragments.len() == 1 {
        let (_, frame) = partial
            .fragments
            .into_iter()
            .next()
            .ok_or_else(|| FrameError::BadFrame("empty reassembly".to_string()))?;
        if frame.payload.body.get("chunk").is_none() {
            return Ok(frame);
        }
        return assemble_from_chunks(vec![frame]);
    }
    assemble_from_chunks(partial.fragments.into_values().collect())
}

fn assemble_from_chunks(frames: Vec<Frame>) -> FrameResult<Frame> {
    let mut text = String::new();
    for frame in &frames {
        let chunk = frame
            .payload
            .body
            .get("chunk")
            .and_then(Value::as_str)
            .ok_or_else(|| FrameError::BadFrame("fragment missing chunk".to_string()))?;
        text.push_str(chunk);
    }
    let payload: Payload =
        serde_json::from_str(&text).map_err(|e| FrameError::BadFrame(e.to_string()))?;
    let mut assembled = frames
        .into_iter()
        .last()
        .ok_or_else(|| FrameError::BadFrame("empty reassembly".to_string()))?;
    assembled.frag_seq = 0;
    assembled.flags.more = false;
    assembled.payload = payload;
    Ok(assembled)
}
