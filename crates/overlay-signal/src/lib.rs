//! Overlay Signal - process-lifetime state behind the JSON API
//!
//! Two peers negotiate a session out of band through a single offer/answer
//! pair, and a sender relays its latest position through the telemetry slot.
//!
//! # Protocol
//!
//! 1. Sender posts an offer (any previous answer is discarded)
//! 2. Receiver polls the offer and posts an answer
//! 3. Sender polls the answer and the peers connect directly
//!
//! Telemetry is independent: every post replaces the previous value, and
//! reads only see values younger than the freshness window.

pub mod messages;
pub mod store;

pub use messages::{
    parse_answer, parse_offer, parse_telemetry, AnswerReply, BodyError, ErrorReply, OfferReply,
    StatusReply, TelemetryReply,
};
pub use store::{SignalingStore, TelemetrySnapshot, TelemetryStore};
