/*
 * inspect_request.rs
 *
 * Copyright (C) 2022 Posit Software, PBC. All rights reserved.
 *
 */

use serde::Deserialize;
use serde::Serialize;

use crate::wire::jupyter_message::MessageType;
use crate::wire::message_kind::MessageKind;

/// Represents a request from the frontend to inspect code
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct InspectRequest {
    /// The code context in which introspection is requested
    pub code: String,

    /// The cursor position within 'code' (in unicode characters) where
    /// inspection is requested
    pub cursor_pos: u32,

    /// The level of detail desired (0 or 1)
    #[serde(default)]
    pub detail_level: u32,
}

impl MessageType for InspectRequest {
    fn kind() -> MessageKind {
        MessageKind::InspectRequest
    }
}
