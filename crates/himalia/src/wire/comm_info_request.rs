/*
 * comm_info_request.rs
 *
 * Copyright (C) 2022 Posit Software, PBC. All rights reserved.
 *
 */

use serde::Deserialize;
use serde::Serialize;

use crate::wire::jupyter_message::MessageType;
use crate::wire::message_kind::MessageKind;

/// Asks for the comms currently open, optionally filtered by target name
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CommInfoRequest {
    #[serde(default)]
    pub target_name: Option<String>,
}

impl MessageType for CommInfoRequest {
    fn kind() -> MessageKind {
        MessageKind::CommInfoRequest
    }
}
