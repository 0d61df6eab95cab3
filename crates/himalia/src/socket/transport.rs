/*
 * transport.rs
 *
 * Copyright (C) 2024 Posit Software, PBC. All rights reserved.
 *
 */

use strum_macros::Display;

/// The five logical channels of a kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Channel {
    Shell,
    Control,
    IOPub,
    Stdin,
    Heartbeat,
}

/// Moves framed multipart messages for one channel. Implementations know
/// nothing about the Jupyter envelope; signing and parsing happen above
/// this layer.
pub trait Transport: Send {
    /// Receive a multi-part message.
    ///
    /// **Note**: This will block until a message is delivered.
    fn recv_multipart(&self) -> crate::Result<Vec<Vec<u8>>>;

    /// Send a multi-part message.
    fn send_multipart(&self, parts: &[Vec<u8>]) -> crate::Result<()>;

    /// Wait up to `timeout_ms` for an incoming message; `-1` waits forever.
    /// Returns whether a message can be received without blocking.
    fn poll_incoming(&self, timeout_ms: i64) -> crate::Result<bool>;

    /// Subscribes a subscriber endpoint to everything its publisher sends.
    fn subscribe(&self) -> crate::Result<()> {
        Ok(())
    }

    /// The address the transport ended up bound to, if it is a bound socket.
    fn last_endpoint(&self) -> Option<String> {
        None
    }
}
