/*
 * clear_output.rs
 *
 * Copyright (C) 2022 Posit Software, PBC. All rights reserved.
 *
 */

use serde::Deserialize;
use serde::Serialize;

use crate::wire::jupyter_message::MessageType;
use crate::wire::message_kind::MessageKind;

/// Asks frontends to clear the output of the current cell
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ClearOutput {
    /// Wait to clear the output until new output is available
    pub wait: bool,
}

impl MessageType for ClearOutput {
    fn kind() -> MessageKind {
        MessageKind::ClearOutput
    }
}
