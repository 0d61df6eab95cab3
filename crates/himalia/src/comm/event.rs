/*
 * event.rs
 *
 * Copyright (C) 2023 Posit Software, PBC. All rights reserved.
 *
 */

use crossbeam::channel::Sender;
use serde_json::Value;

use crate::socket::comm::CommMsg;
use crate::socket::comm::CommSocket;
use crate::wire::header::JupyterHeader;

/**
 * Enumeration of events that can be received by the comm manager.
 */
pub enum CommManagerEvent {
    /// A new comm was opened, with the data of its `comm_open` and the
    /// request it was opened during, if any
    Opened(CommSocket, Value, Option<JupyterHeader>),

    /// A message was received on a comm; the first value is the comm ID, and
    /// the second value is the message.
    Message(String, CommMsg),

    /// An RPC was received from the frontend; replies to it use this header
    /// as their parent
    PendingRpc(JupyterHeader),

    /// A comm was closed by the frontend
    Closed(String),

    /// Asks for the list of open comms
    Info(Sender<Vec<CommInfo>>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommInfo {
    pub id: String,
    pub name: String,
}
