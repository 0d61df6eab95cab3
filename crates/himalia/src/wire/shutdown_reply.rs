/*
 * shutdown_reply.rs
 *
 * Copyright (C) 2022 Posit Software, PBC. All rights reserved.
 *
 */

use serde::Deserialize;
use serde::Serialize;

use crate::wire::jupyter_message::MessageType;
use crate::wire::jupyter_message::Status;
use crate::wire::message_kind::MessageKind;

/// Sent once the kernel has drained its in-flight request and is about to
/// stop
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ShutdownReply {
    pub status: Status,

    /// Echoes the `restart` flag of the request
    pub restart: bool,
}

impl MessageType for ShutdownReply {
    fn kind() -> MessageKind {
        MessageKind::ShutdownReply
    }
}
