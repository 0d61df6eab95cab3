/*
 * status.rs
 *
 * Copyright (C) 2022 Posit Software, PBC. All rights reserved.
 *
 */

use serde::Deserialize;
use serde::Serialize;
use strum_macros::Display;

use crate::wire::jupyter_message::MessageType;
use crate::wire::message_kind::MessageKind;

/// Represents a message the kernel sends to all clients to indicate its
/// execution status
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct KernelStatus {
    /// The kernel's current status
    pub execution_state: ExecutionState,
}

impl MessageType for KernelStatus {
    fn kind() -> MessageKind {
        MessageKind::Status
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExecutionState {
    /// The kernel is currently processing a request or executing code.
    Busy,

    /// The kernel is waiting for instructions.
    Idle,

    /// The kernel is starting up (sent only once!)
    Starting,
}
