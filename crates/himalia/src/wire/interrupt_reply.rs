/*
 * interrupt_reply.rs
 *
 * Copyright (C) 2022 Posit Software, PBC. All rights reserved.
 *
 */

use serde::Deserialize;
use serde::Serialize;

use crate::wire::jupyter_message::MessageType;
use crate::wire::jupyter_message::Status;
use crate::wire::message_kind::MessageKind;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct InterruptReply {
    pub status: Status,
}

impl MessageType for InterruptReply {
    fn kind() -> MessageKind {
        MessageKind::InterruptReply
    }
}
