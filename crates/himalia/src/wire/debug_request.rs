/*
 * debug_request.rs
 *
 * Copyright (C) 2022 Posit Software, PBC. All rights reserved.
 *
 */

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::wire::jupyter_message::MessageType;
use crate::wire::message_kind::MessageKind;

/// A Debug Adapter Protocol request, forwarded verbatim. The content is an opaque DAP object.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(transparent)]
pub struct DebugRequest(pub Value);

impl MessageType for DebugRequest {
    fn kind() -> MessageKind {
        MessageKind::DebugRequest
    }
}
