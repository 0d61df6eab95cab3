/*
 * complete_reply.rs
 *
 * Copyright (C) 2022 Posit Software, PBC. All rights reserved.
 *
 */

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::wire::jupyter_message::MessageType;
use crate::wire::jupyter_message::Status;
use crate::wire::message_kind::MessageKind;

/// Represents a reply to a completion request
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CompleteReply {
    /// The status of the request
    pub status: Status,

    /// The completion matches
    pub matches: Vec<String>,

    /// The starting position of the text the matches replace
    pub cursor_start: u32,

    /// The ending position of the text the matches replace
    pub cursor_end: u32,

    /// Extra information about the matches
    pub metadata: Value,
}

impl CompleteReply {
    /// A reply with no matches at the given cursor position.
    pub fn empty(cursor_pos: u32) -> Self {
        Self {
            status: Status::Ok,
            matches: vec![],
            cursor_start: cursor_pos,
            cursor_end: cursor_pos,
            metadata: serde_json::json!({}),
        }
    }
}

impl MessageType for CompleteReply {
    fn kind() -> MessageKind {
        MessageKind::CompleteReply
    }
}
