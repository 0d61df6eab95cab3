/*
 * execute_input.rs
 *
 * Copyright (C) 2022 Posit Software, PBC. All rights reserved.
 *
 */

use serde::Deserialize;
use serde::Serialize;

use crate::wire::jupyter_message::MessageType;
use crate::wire::message_kind::MessageKind;

/// Broadcast on IOPub to tell observers which code is about to run
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ExecuteInput {
    /// The code to be executed
    pub code: String,

    /// The count of executions that have occurred so far
    pub execution_count: u32,
}

impl MessageType for ExecuteInput {
    fn kind() -> MessageKind {
        MessageKind::ExecuteInput
    }
}
