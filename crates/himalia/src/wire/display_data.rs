/*
 * display_data.rs
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
pub struct DisplayData {
    /// The data giving the MIME key/value pairs to display
    pub data: Value,

    /// Optional additional metadata
    #[serde(default)]
    pub metadata: Value,

    /// Optional transient data; `display_id` lives here
    #[serde(default)]
    pub transient: Value,
}

impl MessageType for DisplayData {
    fn kind() -> MessageKind {
        MessageKind::DisplayData
    }
}
