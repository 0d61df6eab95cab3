/*
 * execute_result.rs
 *
 * Copyright (C) 2022 Posit Software, PBC. All rights reserved.
 *
 */

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::wire::jupyter_message::MessageType;
use crate::wire::message_kind::MessageKind;

/// Represents the result of an execution, published on IOPub
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ExecuteResult {
    /// The data giving the result of the execution, keyed by MIME type
    pub data: Value,

    /// A monotonically increasing execution counter
    pub execution_count: u32,

    /// Optional additional metadata
    #[serde(default)]
    pub metadata: Value,
}

impl MessageType for ExecuteResult {
    fn kind() -> MessageKind {
        MessageKind::ExecuteResult
    }
}
