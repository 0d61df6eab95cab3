/*
 * comm_info_reply.rs
 *
 * Copyright (C) 2022 Posit Software, PBC. All rights reserved.
 *
 */

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::wire::jupyter_message::MessageType;
use crate::wire::jupyter_message::Status;
use crate::wire::message_kind::MessageKind;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CommInfoReply {
    /// The status of the request
    pub status: Status,

    /// Dictionary of comms, keyed by comm ID; each value is a dictionary
    /// holding the `target_name`
    pub comms: serde_json::Map<String, Value>,
}

impl MessageType for CommInfoReply {
    fn kind() -> MessageKind {
        MessageKind::CommInfoReply
    }
}
