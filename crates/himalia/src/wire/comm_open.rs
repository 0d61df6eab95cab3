/*
 * comm_open.rs
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
pub struct CommOpen {
    pub comm_id: String,

    pub target_name: String,

    #[serde(default)]
    pub data: Value,
}

impl MessageType for CommOpen {
    fn kind() -> MessageKind {
        MessageKind::CommOpen
    }
}
