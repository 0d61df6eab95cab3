/*
 * history_request.rs
 *
 * Copyright (C) 2022 Posit Software, PBC. All rights reserved.
 *
 */

use serde::Deserialize;
use serde::Serialize;
use serde_with::skip_serializing_none;

use crate::wire::jupyter_message::MessageType;
use crate::wire::message_kind::MessageKind;

/// Represents a request for the kernel's input history
#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HistoryRequest {
    /// Whether to return the output of each input as well
    #[serde(default)]
    pub output: bool,

    /// Whether to return the raw input rather than the transformed one
    #[serde(default)]
    pub raw: bool,

    /// How the history is accessed
    pub hist_access_type: HistAccessType,

    /// For `range`: the session number; 0 is the current session and
    /// negative numbers count back from it
    #[serde(default)]
    pub session: i32,

    /// For `range`: the first line (inclusive)
    #[serde(default)]
    pub start: u32,

    /// For `range`: the last line (exclusive); all lines when absent
    pub stop: Option<u32>,

    /// For `tail` and `search`: the number of entries to return
    pub n: Option<u32>,

    /// For `search`: a glob pattern (`*` and `?`) matched against inputs
    pub pattern: Option<String>,

    /// For `search`: skip duplicate inputs
    #[serde(default)]
    pub unique: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HistAccessType {
    Range,
    Tail,
    Search,
}

impl MessageType for HistoryRequest {
    fn kind() -> MessageKind {
        MessageKind::HistoryRequest
    }
}
