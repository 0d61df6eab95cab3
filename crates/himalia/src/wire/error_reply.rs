/*
 * error_reply.rs
 *
 * Copyright (C) 2022 Posit Software, PBC. All rights reserved.
 *
 */

use serde::Deserialize;
use serde::Serialize;

use crate::wire::exception::Exception;
use crate::wire::jupyter_message::Status;

/// An error reply, sent with the message type of the reply the request
/// expected, when a handler fails.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ErrorReply {
    /// The status; always Error
    pub status: Status,

    /// The exception that occurred during execution
    #[serde(flatten)]
    pub exception: Exception,
}
