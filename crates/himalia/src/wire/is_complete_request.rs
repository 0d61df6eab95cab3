/*
 * is_complete_request.rs
 *
 * Copyright (C) 2022 Posit Software, PBC. All rights reserved.
 *
 */

use serde::Deserialize;
use serde::Serialize;

use crate::wire::jupyter_message::MessageType;
use crate::wire::message_kind::MessageKind;

/// Represents a request from the frontend to test a code fragment for
/// completeness.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct IsCompleteRequest {
    /// The code to test for completeness
    pub code: String,
}

impl MessageType for IsCompleteRequest {
    fn kind() -> MessageKind {
        MessageKind::IsCompleteRequest
    }
}
