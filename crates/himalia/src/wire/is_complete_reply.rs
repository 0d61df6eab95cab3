/*
 * is_complete_reply.rs
 *
 * Copyright (C) 2022 Posit Software, PBC. All rights reserved.
 *
 */

use serde::Deserialize;
use serde::Serialize;

use crate::wire::jupyter_message::MessageType;
use crate::wire::message_kind::MessageKind;

/// Represents a reply to an is_complete_request.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct IsCompleteReply {
    /// The status of the code that was tested for completeness
    pub status: IsComplete,

    /// Characters to use to indent the next line (for 'incomplete' only)
    #[serde(default)]
    pub indent: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IsComplete {
    /// The code is complete and ready to be executed
    Complete,

    /// More input is needed, e.g. a block was opened and not closed
    Incomplete,

    /// The code will produce a syntax error
    Invalid,

    /// The kernel cannot determine the completeness of the code
    Unknown,
}

impl MessageType for IsCompleteReply {
    fn kind() -> MessageKind {
        MessageKind::IsCompleteReply
    }
}
