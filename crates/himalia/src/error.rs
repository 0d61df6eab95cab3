/*
 * error.rs
 *
 * Copyright (C) 2022 Posit Software, PBC. All rights reserved.
 *
 */

use std::fmt;
use std::time::Duration;

use crate::wire::exception::Exception;
use crate::wire::status::ExecutionState;

/// Type representing all errors that can occur inside the protocol core.
///
/// Errors fall into a handful of categories that drive how the receive loops
/// react to them; see `is_malformed()`, `is_signature()` and `is_transport()`.
#[derive(Debug)]
pub enum Error {
    // Malformed envelopes; the offending message is dropped
    MissingDelimiter,
    InsufficientParts(usize, usize),
    Utf8Error(String, Vec<u8>, std::str::Utf8Error),
    JsonParseError(String, String, serde_json::Error),
    InvalidPart(String, serde_json::Value, serde_json::Error),
    InvalidMessage(String, serde_json::Value, serde_json::Error),

    // Authentication failures; the offending message is dropped
    MissingSignature,
    InvalidHmac(Vec<u8>, hex::FromHexError),
    BadSignature(String),

    // Message types we don't know about, or have nothing registered for
    UnknownMessageType(String),
    UnhandledMessageType(String, String),

    // Session setup
    HmacKeyInvalid(String),
    UnsignedSession,
    UnsupportedSignatureScheme(String),

    // Execution
    ShellErrorReply(Exception),
    StdinUnavailable(String),
    Interrupted,
    ExecutionAbandoned(Duration),
    ShuttingDown,
    InvalidTransition(ExecutionState, ExecutionState),
    KernelFailed(String),

    // Transport
    CreateSocketFailed(String, zmq::Error),
    SocketBindError(String, String, zmq::Error),
    SocketConnectError(String, String, zmq::Error),
    UnsupportedSocketType(zmq::SocketType),
    ZmqError(String, zmq::Error),
    ChannelClosed(String),
    PublishFailed(String, Box<Error>),
    CannotSerialize(serde_json::Error),

    // Configuration files
    ReadFileFailed(String, std::io::Error),
    ParseFileFailed(String, serde_json::Error),

    Anyhow(anyhow::Error),
}

impl Error {
    /// Whether the error describes an envelope that could not be decoded.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            Error::MissingDelimiter |
                Error::InsufficientParts(..) |
                Error::Utf8Error(..) |
                Error::JsonParseError(..) |
                Error::InvalidPart(..) |
                Error::InvalidMessage(..)
        )
    }

    /// Whether the error is an authentication failure.
    pub fn is_signature(&self) -> bool {
        matches!(
            self,
            Error::MissingSignature | Error::InvalidHmac(..) | Error::BadSignature(..)
        )
    }

    /// Whether the error is a forward-compatible message we can't handle.
    pub fn is_unknown_message(&self) -> bool {
        matches!(
            self,
            Error::UnknownMessageType(..) | Error::UnhandledMessageType(..)
        )
    }

    /// Whether the error comes from the underlying transport. These are
    /// fatal on every channel but Heartbeat.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::ZmqError(..) | Error::ChannelClosed(..) | Error::PublishFailed(..)
        )
    }
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::MissingDelimiter => {
                write!(f, "Message did not include expected <IDS|MSG> delimiter")
            },
            Error::InsufficientParts(found, expected) => {
                write!(
                    f,
                    "Message did not contain sufficient parts (found {found}, expected {expected})"
                )
            },
            Error::Utf8Error(part, data, err) => {
                write!(
                    f,
                    "Message part '{part}' was not valid UTF-8: {err} (raw: {data:?})"
                )
            },
            Error::JsonParseError(part, str, err) => {
                write!(f, "Message part '{part}' is invalid JSON: {err} (raw: {str})")
            },
            Error::InvalidPart(part, json, err) => {
                write!(
                    f,
                    "Message part '{part}' does not match schema: {err} (raw: {json})"
                )
            },
            Error::InvalidMessage(kind, json, err) => {
                write!(f, "Invalid '{kind}' message: {err} (raw: {json})")
            },
            Error::MissingSignature => {
                write!(f, "Message is not signed but the session requires signatures")
            },
            Error::InvalidHmac(data, err) => {
                write!(
                    f,
                    "Message HMAC signature {:?} is not a valid hexadecimal value: {err}",
                    String::from_utf8_lossy(data)
                )
            },
            Error::BadSignature(sig) => {
                write!(f, "Message HMAC signature '{sig}' is incorrect")
            },
            Error::UnknownMessageType(kind) => {
                write!(f, "Unknown message type '{kind}'")
            },
            Error::UnhandledMessageType(kind, channel) => {
                write!(f, "No handler for '{kind}' messages on the {channel} channel")
            },
            Error::HmacKeyInvalid(err) => {
                write!(f, "The supplied HMAC signing key cannot be used: {err}")
            },
            Error::UnsignedSession => {
                write!(
                    f,
                    "The signing key is empty; refusing to run unsigned unless explicitly allowed"
                )
            },
            Error::UnsupportedSignatureScheme(scheme) => {
                write!(f, "Unsupported signature scheme '{scheme}'")
            },
            Error::ShellErrorReply(exception) => {
                write!(f, "{}: {}", exception.ename, exception.evalue)
            },
            Error::StdinUnavailable(reason) => {
                write!(f, "Standard input is not available: {reason}")
            },
            Error::Interrupted => {
                write!(f, "Interrupted")
            },
            Error::ExecutionAbandoned(grace) => {
                write!(
                    f,
                    "Backend did not yield within {}ms of an interrupt; result abandoned",
                    grace.as_millis()
                )
            },
            Error::ShuttingDown => {
                write!(f, "The kernel is shutting down")
            },
            Error::InvalidTransition(from, to) => {
                write!(f, "Invalid kernel status transition from '{from}' to '{to}'")
            },
            Error::KernelFailed(reason) => {
                write!(f, "The kernel stopped after a fatal error: {reason}")
            },
            Error::CreateSocketFailed(name, err) => {
                write!(f, "Could not create ZeroMQ socket '{name}': {err}")
            },
            Error::SocketBindError(name, endpoint, err) => {
                write!(
                    f,
                    "Could not bind to ZeroMQ socket '{name}' at '{endpoint}': {err}"
                )
            },
            Error::SocketConnectError(name, endpoint, err) => {
                write!(
                    f,
                    "Could not connect to ZeroMQ socket '{name}' at '{endpoint}': {err}"
                )
            },
            Error::UnsupportedSocketType(kind) => {
                write!(f, "Unsupported socket type: {kind:?}")
            },
            Error::ZmqError(name, err) => {
                write!(f, "ZeroMQ protocol error on {name} socket: {err}")
            },
            Error::ChannelClosed(name) => {
                write!(f, "The {name} channel is closed")
            },
            Error::PublishFailed(name, err) => {
                write!(f, "Could not publish on {name} after retrying: {err}")
            },
            Error::CannotSerialize(err) => {
                write!(f, "Cannot serialize message: {err}")
            },
            Error::ReadFileFailed(path, err) => {
                write!(f, "Could not read '{path}': {err}")
            },
            Error::ParseFileFailed(path, err) => {
                write!(f, "Could not parse '{path}': {err}")
            },
            Error::Anyhow(err) => {
                write!(f, "{err:?}")
            },
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(error: anyhow::Error) -> Self {
        Self::Anyhow(error)
    }
}

#[macro_export]
macro_rules! anyhow {
    ($($rest: expr),*) => {{
        let message = anyhow::anyhow!($($rest, )*);
        $crate::error::Error::Anyhow(message)
    }}
}
