/*
 * socket.rs
 *
 * Copyright (C) 2022 Posit Software, PBC. All rights reserved.
 *
 */

use std::time::Duration;

use log::trace;

use crate::error::Error;
use crate::session::Session;
use crate::socket::transport::Transport;

/// Converts a poll interval to the millisecond timeout `poll_incoming()`
/// takes. Intervals too long to express wait as long as possible rather than
/// wrapping around to a negative timeout, which would wait forever.
pub fn poll_timeout(interval: Duration) -> i64 {
    i64::try_from(interval.as_millis()).unwrap_or(i64::MAX)
}

/// Represents a socket that sends and receives messages that are optionally
/// signed with an HMAC.
pub struct Socket {
    /// The Jupyter session information associated with the socket, including
    /// the session ID and HMAC signing key
    pub session: Session,

    /// The name of the socket; used only to give context to debugging/trace
    /// messages
    pub name: String,

    /// The transport over which signed messages are to be sent/received
    transport: Box<dyn Transport>,
}

impl Socket {
    /// Create a new ZeroMQ-backed Socket from a kernel session and a ZeroMQ
    /// context.
    pub fn new(
        session: Session,
        ctx: zmq::Context,
        name: String,
        kind: zmq::SocketType,
        identity: Option<&[u8]>,
        endpoint: String,
    ) -> Result<Self, Error> {
        let transport = ZmqTransport::new(ctx, name.clone(), kind, identity, endpoint)?;
        Ok(Self::from_transport(session, name, transport))
    }

    /// Create a Socket over any transport.
    pub fn from_transport(session: Session, name: String, transport: impl Transport + 'static) -> Self {
        Self {
            session,
            name,
            transport: Box::new(transport),
        }
    }

    /// Receive a multi-part message from the socket.
    ///
    /// **Note**: This will block until a message is delivered on the socket.
    pub fn recv_multipart(&self) -> Result<Vec<Vec<u8>>, Error> {
        self.transport.recv_multipart()
    }

    /// Send a multi-part message on the socket.
    pub fn send_multipart(&self, data: &[Vec<u8>]) -> Result<(), Error> {
        self.transport.send_multipart(data)
    }

    pub fn poll_incoming(&self, timeout_ms: i64) -> Result<bool, Error> {
        self.transport.poll_incoming(timeout_ms)
    }

    pub fn has_incoming_data(&self) -> Result<bool, Error> {
        self.poll_incoming(0)
    }

    /// Subscribes a SUB socket to all the published messages from a PUB socket.
    ///
    /// Note that this needs to be called *after* the socket connection is
    /// established on both ends.
    pub fn subscribe(&self) -> Result<(), Error> {
        self.transport.subscribe()
    }

    /// The port the socket is bound to. Sockets asked to bind to port 0 are
    /// given one by the system.
    pub fn port(&self) -> crate::Result<u16> {
        let name = self.name.as_str();
        let Some(address) = self.transport.last_endpoint() else {
            return Err(crate::anyhow!("Can't access last endpoint of '{name}' socket."));
        };

        // We've got the full address but we only want the port at the very end
        let Some(loc) = address.rfind(':') else {
            return Err(crate::anyhow!(
                "Failed to find port in the '{name}' socket address."
            ));
        };

        address[(loc + 1)..].parse::<u16>().map_err(|err| {
            crate::anyhow!("Can't parse port in the '{name}' socket address '{address}': {err}")
        })
    }
}

/// A ZeroMQ socket. Kernels bind ROUTER (Shell, Control, Stdin), XPUB (IOPub)
/// and REP (Heartbeat) sockets; frontends connect DEALER, SUB and REQ ones.
pub struct ZmqTransport {
    name: String,
    socket: zmq::Socket,
}

impl ZmqTransport {
    pub fn new(
        ctx: zmq::Context,
        name: String,
        kind: zmq::SocketType,
        identity: Option<&[u8]>,
        endpoint: String,
    ) -> Result<Self, Error> {
        // Create the underlying ZeroMQ socket
        let socket = match ctx.socket(kind) {
            Ok(s) => s,
            Err(err) => return Err(Error::CreateSocketFailed(name, err)),
        };

        // IOPub is fairly high traffic, so we up the "high water mark" from
        // the default of 1k to 100k to avoid dropping messages if the
        // subscriber is processing them too slowly. This has to be set before
        // the call to `bind()`.
        if name == "IOPub" {
            if let Err(error) = socket.set_sndhwm(100000) {
                return Err(Error::CreateSocketFailed(name, error));
            }
        }

        // Set the socket's identity, if supplied
        if let Some(identity) = identity {
            if let Err(err) = socket.set_identity(identity) {
                return Err(Error::CreateSocketFailed(name, err));
            }
        }

        // Input requests must fail loudly when the frontend has no stdin
        // socket connected, rather than being silently dropped.
        if kind == zmq::ROUTER && name == "Stdin" {
            if let Err(err) = socket.set_router_mandatory(true) {
                return Err(Error::CreateSocketFailed(name, err));
            }
        }

        // One side of a socket must `bind()` to its endpoint, and the other
        // side must `connect()` to the same endpoint. The `bind()` side
        // will be the server, and the `connect()` side will be the client.
        match kind {
            zmq::SocketType::ROUTER | zmq::SocketType::XPUB | zmq::SocketType::REP => {
                trace!("Binding to ZeroMQ '{}' socket at {}", name, endpoint);
                if let Err(err) = socket.bind(&endpoint) {
                    return Err(Error::SocketBindError(name, endpoint, err));
                }
            },
            zmq::SocketType::DEALER | zmq::SocketType::SUB | zmq::SocketType::REQ => {
                trace!("Connecting to ZeroMQ '{}' socket at {}", name, endpoint);
                if let Err(err) = socket.connect(&endpoint) {
                    return Err(Error::SocketConnectError(name, endpoint, err));
                }
            },
            _ => return Err(Error::UnsupportedSocketType(kind)),
        }

        Ok(Self { name, socket })
    }
}

impl Transport for ZmqTransport {
    fn recv_multipart(&self) -> crate::Result<Vec<Vec<u8>>> {
        match self.socket.recv_multipart(0) {
            Ok(data) => Ok(data),
            Err(err) => Err(Error::ZmqError(self.name.clone(), err)),
        }
    }

    fn send_multipart(&self, parts: &[Vec<u8>]) -> crate::Result<()> {
        match self.socket.send_multipart(parts, 0) {
            Ok(data) => Ok(data),
            Err(err) => Err(Error::ZmqError(self.name.clone(), err)),
        }
    }

    fn poll_incoming(&self, timeout_ms: i64) -> crate::Result<bool> {
        match self.socket.poll(zmq::PollEvents::POLLIN, timeout_ms) {
            Ok(n) => Ok(n != 0),
            Err(err) => Err(Error::ZmqError(self.name.clone(), err)),
        }
    }

    fn subscribe(&self) -> crate::Result<()> {
        // All known Jupyter frontends subscribe to all topics
        match self.socket.set_subscribe(b"") {
            Ok(_) => Ok(()),
            Err(err) => Err(Error::ZmqError(self.name.clone(), err)),
        }
    }

    fn last_endpoint(&self) -> Option<String> {
        match self.socket.get_last_endpoint() {
            Ok(Ok(address)) => Some(address),
            _ => None,
        }
    }
}
