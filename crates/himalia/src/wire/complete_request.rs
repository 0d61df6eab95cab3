/*
 * complete_request.rs
 *
 * Copyright (C) 2022 Posit Software, PBC. All rights reserved.
 *
 */

use serde::Deserialize;
use serde::Serialize;

use crate::wire::jupyter_message::MessageType;
use crate::wire::message_kind::MessageKind;

/// Represents a request from the frontend to show possible code completions
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CompleteRequest {
    /// The code to complete
    pub code: String,

    /// The position of the cursor in the code
    pub cursor_pos: u32,
}

impl MessageType for CompleteRequest {
    fn kind() -> MessageKind {
        MessageKind::CompleteRequest
    }
}
