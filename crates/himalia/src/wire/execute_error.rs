/*
 * execute_error.rs
 *
 * Copyright (C) 2022 Posit Software, PBC. All rights reserved.
 *
 */

use serde::Deserialize;
use serde::Serialize;

use crate::wire::exception::Exception;
use crate::wire::jupyter_message::MessageType;
use crate::wire::message_kind::MessageKind;

/// Represents an exception that occurred while executing code, published on
/// IOPub as an `error` message
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ExecuteError {
    #[serde(flatten)]
    pub exception: Exception,
}

impl MessageType for ExecuteError {
    fn kind() -> MessageKind {
        MessageKind::Error
    }
}
