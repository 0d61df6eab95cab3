/*
 * comm.rs
 *
 * Copyright (C) 2023 Posit Software, PBC. All rights reserved.
 *
 */

use crossbeam::channel::Receiver;
use crossbeam::channel::Sender;
use serde_json::Value;

use crate::error::Error;

/// A message exchanged between the two ends of a comm.
#[derive(Debug, Clone, PartialEq)]
pub enum CommMsg {
    /// Data sent without expecting an answer
    Data(Value),

    /// A request from the frontend, or the backend's response to it. The
    /// first value is the id of the frontend's `comm_msg`.
    Rpc(String, Value),

    /// The comm was closed by the other end, or is to be closed
    Close,
}

/**
 * A `CommSocket` is a relay between the back end and the front end of a comm.
 * It stores the comm's metadata and handles sending and receiving messages.
 *
 * The terms `incoming` and `outgoing` refer to the direction of the message
 * flow: `incoming` messages are received from the front end, and `outgoing`
 * messages are sent to the front end.
 */
#[derive(Debug, Clone)]
pub struct CommSocket {
    /// The comm's unique identifier.
    pub comm_id: String,

    /// The comm's target name.
    pub comm_name: String,

    /// Whether the comm is owned by the front end or the back end.
    pub initiator: CommInitiator,

    /// Messages from the back end to be relayed to the front end (ultimately
    /// via IOPub)
    pub outgoing_rx: Receiver<CommMsg>,
    pub outgoing_tx: Sender<CommMsg>,

    /// Messages from the front end to be relayed to the back end
    pub incoming_tx: Sender<CommMsg>,
    pub incoming_rx: Receiver<CommMsg>,
}

/// Describes the identity of the comm's initiator.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CommInitiator {
    /// The comm was initiated by the front end (user interface).
    FrontEnd,

    /// The comm was initiated by the back end (kernel).
    BackEnd,
}

impl CommSocket {
    pub fn new(initiator: CommInitiator, comm_id: String, comm_name: String) -> Self {
        let (outgoing_tx, outgoing_rx) = crossbeam::channel::unbounded();
        let (incoming_tx, incoming_rx) = crossbeam::channel::unbounded();

        Self {
            comm_id,
            comm_name,
            initiator,
            outgoing_tx,
            outgoing_rx,
            incoming_tx,
            incoming_rx,
        }
    }

    /// Sends data to the front end.
    pub fn send(&self, data: Value) -> crate::Result<()> {
        self.outgoing(CommMsg::Data(data))
    }

    /// Answers an RPC received from the front end.
    pub fn reply(&self, request_id: String, data: Value) -> crate::Result<()> {
        self.outgoing(CommMsg::Rpc(request_id, data))
    }

    /// Closes the comm from the back end side.
    pub fn close(&self) -> crate::Result<()> {
        self.outgoing(CommMsg::Close)
    }

    fn outgoing(&self, msg: CommMsg) -> crate::Result<()> {
        self.outgoing_tx
            .send(msg)
            .map_err(|_| Error::ChannelClosed(format!("comm '{}'", self.comm_name)))
    }
}
