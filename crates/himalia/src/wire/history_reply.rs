/*
 * history_reply.rs
 *
 * Copyright (C) 2022 Posit Software, PBC. All rights reserved.
 *
 */

use serde::Deserialize;
use serde::Serialize;

use crate::wire::jupyter_message::MessageType;
use crate::wire::jupyter_message::Status;
use crate::wire::message_kind::MessageKind;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HistoryReply {
    pub status: Status,

    /// The matching history entries, oldest first
    pub history: Vec<HistoryEntry>,
}

/// A history entry is serialized as a tuple of `(session, line, input)`, or
/// `(session, line, (input, output))` when output was requested.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum HistoryEntry {
    InputOutput(i32, u32, (String, Option<String>)),
    Input(i32, u32, String),
}

impl HistoryEntry {
    pub fn line(&self) -> u32 {
        match self {
            HistoryEntry::InputOutput(_, line, _) | HistoryEntry::Input(_, line, _) => *line,
        }
    }

    pub fn input(&self) -> &str {
        match self {
            HistoryEntry::InputOutput(_, _, (input, _)) | HistoryEntry::Input(_, _, input) => input,
        }
    }
}

impl MessageType for HistoryReply {
    fn kind() -> MessageKind {
        MessageKind::HistoryReply
    }
}
