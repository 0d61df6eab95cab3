/*
 * comm_msg.rs
 *
 * Copyright (C) 2022 Posit Software, PBC. All rights reserved.
 *
 */

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::wire::jupyter_message::MessageType;
use crate::wire::message_kind::MessageKind;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CommWireMsg {
    pub comm_id: String,

    pub data: Value,
}

impl MessageType for CommWireMsg {
    fn kind() -> MessageKind {
        MessageKind::CommMsg
    }
}
