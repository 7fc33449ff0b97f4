//! The ATP frame model.
//!
//! A frame is the unit of the data plane. Fields follow the canonical wire
//! schema; unknown optional fields are ignored on decode for forward
//! compatibility, and unknown payload types are carried through unchanged.

use lattice_core::{QosTier, SessionId, StreamId};
use serde::de::{SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

use crate::error::{FrameError, FrameResult};
use crate::signing::FrameSignature;

/// Current (and only) protocol major version.
pub const PROTOCOL_VERSION: u8 = 1;

/// The set of frame flags.
///
/// Serialized as an array of flag names in a fixed order so that the
/// canonical form is deterministic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameFlags {
    /// Stream open.
    pub syn: bool,
    /// Acknowledgement piggyback present.
    pub ack: bool,
    /// Graceful stream end.
    pub fin: bool,
    /// Abortive stream reset.
    pub rst: bool,
    /// More fragments follow for this `msg_seq` (absence ≡ LAST).
    pub more: bool,
    /// Heartbeat.
    pub hb: bool,
    /// Control channel frame.
    pub ctrl: bool,
    /// Explicit congestion notification mark.
    pub ecn: bool,
}

impl FrameFlags {
    const NAMES: [(&'static str, fn(&FrameFlags) -> bool); 8] = [
        ("SYN", |f| f.syn),
        ("ACK", |f| f.ack),
        ("FIN", |f| f.fin),
        ("RST", |f| f.rst),
        ("MORE", |f| f.more),
        ("HB", |f| f.hb),
        ("CTRL", |f| f.ctrl),
        ("ECN", |f| f.ecn),
    ];

    /// No flags set.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Flags with SYN set.
    #[must_use]
    pub fn syn() -> Self {
        Self {
            syn: true,
            ..Self::default()
        }
    }

    /// Set a flag by its wire name. Unknown names are ignored.
    pub fn set(&mut self, name: &str) {
        match name {
            "SYN" => self.syn = true,
            "ACK" => self.ack = true,
            "FIN" => self.fin = true,
            "RST" => self.rst = true,
            // FRAG is a historical alias for MORE.
            "MORE" | "FRAG" => self.more = true,
            "HB" => self.hb = true,
            "CTRL" => self.ctrl = true,
            "ECN" => self.ecn = true,
            _ => {},
        }
    }

    /// True when no flag is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl Serialize for FrameFlags {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(_, get)| get(self))
            .map(|(name, _)| *name)
            .collect();
        let mut seq = serializer.serialize_seq(Some(names.len()))?;
        for name in names {
            seq.serialize_element(name)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for FrameFlags {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FlagsVisitor;

        impl<'de> Visitor<'de> for FlagsVisitor {
            type Value = FrameFlags;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an array of flag names")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut flags = FrameFlags::default();
                while let Some(name) = seq.next_element::<String>()? {
                    flags.set(&name);
                }
                Ok(flags)
            }
        }

        deserializer.deserialize_seq(FlagsVisitor)
    }
}

impl fmt::Display for FrameFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(_, get)| get(self))
            .map(|(name, _)| *name)
            .collect();
        write!(f, "[{}]", names.join("|"))
    }
}

/// The three simultaneous limits advertised on a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripletWindow {
    /// Maximum concurrent streams.
    pub max_parallel: u32,
    /// Maximum tokens in flight.
    pub max_tokens: u64,
    /// Maximum USD-micros in flight.
    pub max_usd_micros: u64,
}

impl TripletWindow {
    /// A zero window (fully paused).
    #[must_use]
    pub const fn zero() -> Self {
        Self {
            max_parallel: 0,
            max_tokens: 0,
            max_usd_micros: 0,
        }
    }

    /// Component-wise minimum of two windows (router-advertised vs agent
    /// suggested → effective).
    #[must_use]
    pub fn min(self, other: TripletWindow) -> Self {
        Self {
            max_parallel: self.max_parallel.min(other.max_parallel),
            max_tokens: self.max_tokens.min(other.max_tokens),
            max_usd_micros: self.max_usd_micros.min(other.max_usd_micros),
        }
    }

    /// Clamp the parallel dimension (used for DRAINING sessions).
    #[must_use]
    pub fn clamp_parallel(mut self, max: u32) -> Self {
        self.max_parallel = self.max_parallel.min(max);
        self
    }
}

impl Default for TripletWindow {
    fn default() -> Self {
        Self {
            max_parallel: 4,
            max_tokens: 16_384,
            max_usd_micros: 1_000_000,
        }
    }
}

/// Frame metadata block.
///
/// All fields are optional on the wire; absent fields are omitted from the
/// canonical form entirely.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameMetadata {
    /// Task type (e.g. `"qa.short"`, `"code.review"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_type: Option<String>,
    /// Languages involved in the request.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub languages: Vec<String>,
    /// Declared risk level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk: Option<String>,
    /// Tool permissions requested.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_permissions: Vec<String>,
    /// Execution environment hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    /// Security groups of the requesting tenant.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub security_groups: Vec<String>,
    /// W3C trace parent for distributed tracing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_parent: Option<String>,
    /// Replay nonce; when present the replay guard keys on it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

/// Reserved payload kinds.
///
/// The wire carries the kind as a free string; unknown kinds are accepted
/// and forwarded unchanged (they affect admission only through reported
/// estimates).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// Partial agent result.
    Partial,
    /// Final agent result.
    Final,
    /// Provisional agent result (may be superseded).
    Provisional,
    /// Agent asks the user a question.
    Question,
    /// Log record.
    Log,
    /// Adapter control status (BUSY/PAUSE/RESUME/...).
    ControlStatus,
    /// Tool invocation request.
    ToolRequest,
    /// Tool invocation result.
    ToolResult,
    /// Candidate plan emitted to the client.
    Plan,
    /// Heartbeat.
    Heartbeat,
    /// Stream completion summary.
    Completion,
    /// Error report.
    Error,
}

impl PayloadKind {
    /// The wire string for this kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Partial => "agent.result.partial",
            Self::Final => "agent.result.final",
            Self::Provisional => "agent.result.provisional",
            Self::Question => "agent.result.question",
            Self::Log => "log",
            Self::ControlStatus => "control.status",
            Self::ToolRequest => "tool.request",
            Self::ToolResult => "tool.result",
            Self::Plan => "plan",
            Self::Heartbeat => "heartbeat",
            Self::Completion => "completion",
            Self::Error => "error",
        }
    }

    /// Parse a wire string into a known kind.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "agent.result.partial" => Some(Self::Partial),
            "agent.result.final" => Some(Self::Final),
            "agent.result.provisional" => Some(Self::Provisional),
            "agent.result.question" => Some(Self::Question),
            "log" => Some(Self::Log),
            "control.status" => Some(Self::ControlStatus),
            "tool.request" => Some(Self::ToolRequest),
            "tool.result" => Some(Self::ToolResult),
            "plan" => Some(Self::Plan),
            "heartbeat" => Some(Self::Heartbeat),
            "completion" => Some(Self::Completion),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// Adapter control status values that pause or resume a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ControlStatus {
    /// Adapter is busy: effective window drops to zero.
    Busy,
    /// Adapter requests a pause: grace period, then zero window.
    Pause,
    /// Resume: previous effective window restored.
    Resume,
    /// Session is draining: window clamped to one.
    Draining,
}

/// A frame payload: a kind string plus a free-form JSON body.
///
/// Known kinds get typed constructors and accessors; unknown kinds pass
/// through the routing layer untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    /// Payload kind string.
    #[serde(rename = "type")]
    pub kind: String,
    /// Free-form body fields.
    #[serde(flatten)]
    pub body: Value,
}

impl Payload {
    /// Build a payload with a known kind and body.
    #[must_use]
    pub fn new(kind: PayloadKind, body: Value) -> Self {
        Self {
            kind: kind.as_str().to_string(),
            body,
        }
    }

    /// A partial result carrying text and a confidence estimate.
    #[must_use]
    pub fn partial(text: impl Into<String>, confidence: f64) -> Self {
        Self::new(
            PayloadKind::Partial,
            serde_json::json!({ "text": text.into(), "confidence": confidence }),
        )
    }

    /// A final result.
    #[must_use]
    pub fn final_result(text: impl Into<String>) -> Self {
        Self::new(
            PayloadKind::Final,
            serde_json::json!({ "text": text.into() }),
        )
    }

    /// A heartbeat payload.
    #[must_use]
    pub fn heartbeat() -> Self {
        Self::new(PayloadKind::Heartbeat, serde_json::json!({}))
    }

    /// A control-status payload.
    #[must_use]
    pub fn control_status(status: ControlStatus) -> Self {
        Self::new(
            PayloadKind::ControlStatus,
            serde_json::json!({ "status": status }),
        )
    }

    /// An error payload with a stable code and sanitized detail.
    #[must_use]
    pub fn error(detail: &lattice_core::ErrorDetail) -> Self {
        Self::new(
            PayloadKind::Error,
            serde_json::json!({ "code": detail.code, "detail": detail.detail.clone() }),
        )
    }

    /// The known kind, if this payload uses a reserved type string.
    #[must_use]
    pub fn known_kind(&self) -> Option<PayloadKind> {
        PayloadKind::parse(&self.kind)
    }

    /// The `text` body field, if present.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.body.get("text").and_then(Value::as_str)
    }

    /// The `confidence` body field, if present.
    #[must_use]
    pub fn confidence(&self) -> Option<f64> {
        self.body.get("confidence").and_then(Value::as_f64)
    }

    /// The control status, if this is a `control.status` payload.
    #[must_use]
    pub fn status(&self) -> Option<ControlStatus> {
        if self.known_kind() != Some(PayloadKind::ControlStatus) {
            return None;
        }
        self.body
            .get("status")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// The ATP wire unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Protocol major version.
    pub v: u8,
    /// Owning session.
    pub session_id: SessionId,
    /// Stream within the session.
    pub stream_id: StreamId,
    /// Message sequence, strictly monotonic per `(session_id, stream_id)`.
    pub msg_seq: u64,
    /// Fragment index within `msg_seq`, contiguous from 0.
    pub frag_seq: u32,
    /// Frame flags.
    #[serde(default, skip_serializing_if = "FrameFlags::is_empty")]
    pub flags: FrameFlags,
    /// QoS tier.
    pub qos: QosTier,
    /// Hop budget, decremented per hop.
    pub ttl: u8,
    /// Advertised triplet window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<TripletWindow>,
    /// Metadata block.
    #[serde(default)]
    pub meta: FrameMetadata,
    /// Payload.
    pub payload: Payload,
    /// Signature over the canonical form with this field excluded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sig: Option<FrameSignature>,
}

impl Frame {
    /// Default hop budget for locally originated frames.
    pub const DEFAULT_TTL: u8 = 16;

    /// Build a data frame with defaults for the optional fields.
    #[must_use]
    pub fn new(
        session_id: SessionId,
        stream_id: StreamId,
        msg_seq: u64,
        qos: QosTier,
        payload: Payload,
    ) -> Self {
        Self {
            v: PROTOCOL_VERSION,
            session_id,
            stream_id,
            msg_seq,
            frag_seq: 0,
            flags: FrameFlags::default(),
            qos,
            ttl: Self::DEFAULT_TTL,
            window: None,
            meta: FrameMetadata::default(),
            payload,
            sig: None,
        }
    }

    /// Decode a frame from its JSON text, validating the schema.
    pub fn decode(text: &str) -> FrameResult<Self> {
        let frame: Frame =
            serde_json::from_str(text).map_err(|e| FrameError::BadFrame(e.to_string()))?;
        frame.validate()?;
        Ok(frame)
    }

    /// Validate schema-level invariants.
    pub fn validate(&self) -> FrameResult<()> {
        if self.v != PROTOCOL_VERSION {
            return Err(FrameError::BadFrame(format!(
                "unsupported protocol version {}",
                self.v
            )));
        }
        if self.session_id.as_str().is_empty() {
            return Err(FrameError::BadFrame("empty session_id".to_string()));
        }
        if self.stream_id.as_str().is_empty() {
            return Err(FrameError::BadFrame("empty stream_id".to_string()));
        }
        if self.payload.kind.is_empty() {
            return Err(FrameError::BadFrame("empty payload type".to_string()));
        }
        Ok(())
    }

    /// The replay-guard key for this frame: the explicit nonce when present,
    /// otherwise the sequence coordinates.
    #[must_use]
    pub fn replay_key(&self) -> String {
        if let Some(nonce) = &self.meta.nonce {
            return nonce.clone();
        }
        format!(
            "{}/{}/{}/{}",
            self.session_id.as_str(),
            self.stream_id.as_str(),
            self.msg_seq,
            self.frag_seq
        )
    }

    /// True when this frame carries the terminal fragment of its message.
    #[must_use]
    pub fn is_last_fragment(&self) -> bool {
        !self.flags.more
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> Frame {
        Frame::new(
            SessionId::from_string("s1"),
            StreamId::from_string("r1"),
            0,
            QosTier::Silver,
            Payload::partial("hello", 0.9),
        )
    }

    #[test]
    fn test_decode_round_trip() {
        let f = frame();
        let text = serde_json::to_string(&f).unwrap();
        let back = Frame::decode(&text).unwrap();
        assert_eq!(back, f);
    }

    #[test]
    fn test_unknown_optional_fields_ignored() {
        let f = frame();
        let mut value = serde_json::to_value(&f).unwrap();
        value["future_field"] = serde_json::json!("ignored");
        let back = Frame::decode(&value.to_string()).unwrap();
        assert_eq!(back, f);
    }

    #[test]
    fn test_unknown_qos_rejected() {
        let f = frame();
        let mut value = serde_json::to_value(&f).unwrap();
        value["qos"] = serde_json::json!("platinum");
        assert!(Frame::decode(&value.to_string()).is_err());
    }

    #[test]
    fn test_missing_required_field_rejected() {
        let f = frame();
        let mut value = serde_json::to_value(&f).unwrap();
        value.as_object_mut().unwrap().remove("msg_seq");
        assert!(Frame::decode(&value.to_string()).is_err());
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let mut f = frame();
        f.v = 2;
        let text = serde_json::to_string(&f).unwrap();
        assert!(Frame::decode(&text).is_err());
    }

    #[test]
    fn test_unknown_payload_kind_carried_through() {
        let mut f = frame();
        f.payload = Payload {
            kind: "vendor.custom".to_string(),
            body: serde_json::json!({ "blob": [1, 2, 3] }),
        };
        let text = serde_json::to_string(&f).unwrap();
        let back = Frame::decode(&text).unwrap();
        assert_eq!(back.payload.kind, "vendor.custom");
        assert_eq!(back.payload.body["blob"], serde_json::json!([1, 2, 3]));
        assert!(back.payload.known_kind().is_none());
    }

    #[test]
    fn test_flags_serialize_as_names() {
        let mut f = frame();
        f.flags.syn = true;
        f.flags.more = true;
        let value = serde_json::to_value(&f).unwrap();
        assert_eq!(value["flags"], serde_json::json!(["SYN", "MORE"]));
    }

    #[test]
    fn test_frag_alias_for_more() {
        let mut flags = FrameFlags::default();
        flags.set("FRAG");
        assert!(flags.more);
    }

    #[test]
    fn test_window_min() {
        let a = TripletWindow {
            max_parallel: 4,
            max_tokens: 1000,
            max_usd_micros: 50,
        };
        let b = TripletWindow {
            max_parallel: 2,
            max_tokens: 2000,
            max_usd_micros: 25,
        };
        let m = a.min(b);
        assert_eq!(m.max_parallel, 2);
        assert_eq!(m.max_tokens, 1000);
        assert_eq!(m.max_usd_micros, 25);
    }

    #[test]
    fn test_control_status_accessor() {
        let p = Payload::control_status(ControlStatus::Busy);
        assert_eq!(p.status(), Some(ControlStatus::Busy));
        assert_eq!(Payload::heartbeat().status(), None);
    }
}
