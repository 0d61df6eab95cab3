/*
 * interrupt_request.rs
 *
 * Copyright (C) 2022 Posit Software, PBC. All rights reserved.
 *
 */

use serde::Deserialize;
use serde::Serialize;

use crate::wire::jupyter_message::MessageType;
use crate::wire::message_kind::MessageKind;

/// Represents a request from the frontend to the kernel to interrupt
/// execution
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct InterruptRequest {}

impl MessageType for InterruptRequest {
    fn kind() -> MessageKind {
        MessageKind::InterruptRequest
    }
}
