//! Push-frame decoding
//!
//! The feed sends JSON arrays whose first element carries a `data` field;
//! `data` is a JSON object (usually string-encoded) with integer fields `i`
//! (queue id) and `u` (account id). Everything else on the wire is noise.

use chrono::Utc;
use serde_json::Value;

use crate::types::{AccountId, PushEvent, QueueId};

/// Decode one text frame into a [`PushEvent`].
///
/// Returns `None` for malformed or irrelevant payloads; the feed carries
/// plenty of frames the watcher does not care about.
#[must_use]
pub fn decode_frame(text: &str) -> Option<PushEvent> {
    let frames: Vec<Value> = serde_json::from_str(text).ok()?;
    let data = frames.first()?.get("data")?;

    // `data` is normally a string of JSON, but tolerate an inline object.
    let payload: Value = match data {
        Value::String(inner) => serde_json::from_str(inner).ok()?,
        Value::Object(_) => data.clone(),
        _ => return None,
    };

    let queue = payload.get("i")?.as_u64()?;
    let account = payload.get("u")?.as_u64()?;

    Some(PushEvent {
        queue: QueueId(queue),
        account_id: AccountId(account),
        arrived_at: Utc::now(),
    })
}
