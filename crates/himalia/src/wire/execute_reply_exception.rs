/*
 * execute_reply_exception.rs
 *
 * Copyright (C) 2022 Posit Software, PBC. All rights reserved.
 *
 */

use serde::Deserialize;
use serde::Serialize;

use crate::wire::exception::Exception;
use crate::wire::jupyter_message::MessageType;
use crate::wire::jupyter_message::Status;
use crate::wire::message_kind::MessageKind;

/// Represents an exception that occurred while executing code. The error is
/// duplicated here from the IOPub `error` message for clients that only
/// watch the Shell channel.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ExecuteReplyException {
    /// The status; always Error
    pub status: Status,

    /// Execution counter
    pub execution_count: u32,

    /// The exception that occurred during execution
    #[serde(flatten)]
    pub exception: Exception,
}

impl MessageType for ExecuteReplyException {
    fn kind() -> MessageKind {
        MessageKind::ExecuteReply
    }
}
