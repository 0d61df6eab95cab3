/*
 * debug_reply.rs
 *
 * Copyright (C) 2022 Posit Software, PBC. All rights reserved.
 *
 */

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::wire::jupyter_message::MessageType;
use crate::wire::message_kind::MessageKind;

/// A Debug Adapter Protocol response. The content is an opaque DAP object.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(transparent)]
pub struct DebugReply(pub Value);

impl MessageType for DebugReply {
    fn kind() -> MessageKind {
        MessageKind::DebugReply
    }
}
