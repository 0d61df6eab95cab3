/*
 * originator.rs
 *
 * Copyright (C) 2022 Posit Software, PBC. All rights reserved.
 *
 */

use crate::wire::header::JupyterHeader;
use crate::wire::jupyter_message::JupyterMessage;
use crate::wire::wire_message::WireMessage;

/// The request a message was sent in response to, along with the routing
/// identities needed to address its sender.
#[derive(Debug, Clone, PartialEq)]
pub struct Originator {
    pub zmq_identities: Vec<Vec<u8>>,
    pub header: JupyterHeader,
}

impl<T> From<&JupyterMessage<T>> for Originator {
    fn from(msg: &JupyterMessage<T>) -> Originator {
        Originator {
            zmq_identities: msg.zmq_identities.clone(),
            header: msg.header.clone(),
        }
    }
}

impl From<&WireMessage> for Originator {
    fn from(msg: &WireMessage) -> Originator {
        Originator {
            zmq_identities: msg.zmq_identities.clone(),
            header: msg.header.clone(),
        }
    }
}
