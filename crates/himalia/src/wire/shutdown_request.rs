/*
 * shutdown_request.rs
 *
 * Copyright (C) 2022 Posit Software, PBC. All rights reserved.
 *
 */

use serde::Deserialize;
use serde::Serialize;

use crate::wire::jupyter_message::MessageType;
use crate::wire::message_kind::MessageKind;

/// Represents a request from the frontend to the kernel to shut down
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ShutdownRequest {
    /// False if final shutdown, or True if shutdown precedes a restart
    pub restart: bool,
}

impl MessageType for ShutdownRequest {
    fn kind() -> MessageKind {
        MessageKind::ShutdownRequest
    }
}
