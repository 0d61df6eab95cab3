/*
 * wire_message.rs
 *
 * Copyright (C) 2022 Posit Software, PBC. All rights reserved.
 *
 */

use std::str::FromStr;

use log::trace;
use serde_json::json;
use serde_json::Value;

use crate::error::Error;
use crate::session::Session;
use crate::socket::socket::Socket;
use crate::wire::header::JupyterHeader;
use crate::wire::message_kind::MessageKind;

/// This delimiter separates the ZeroMQ socket identities (IDS) from the message
/// body payload (MSG).
pub const MSG_DELIM: &[u8] = b"<IDS|MSG>";

/// Number of parts in the signed region: the signature, then the header, the
/// parent header, the metadata and the content.
const SIGNED_PARTS: usize = 5;

/// Represents an untyped Jupyter message delivered over the wire. A WireMessage
/// can represent any kind of Jupyter message; typically its header will be
/// examined and it will be converted into a typed JupyterMessage.
#[derive(Debug, Clone, PartialEq)]
pub struct WireMessage {
    /// The ZeroMQ identities. These store the peer identity for messages
    /// delivered request-reply style over ROUTER sockets (like the shell)
    pub zmq_identities: Vec<Vec<u8>>,

    /// The header for this message
    pub header: JupyterHeader,

    /// The header of the message from which this message originated, if any.
    /// If none, it's serialized as an empty dict as required by the Jupyter
    /// protocol.
    pub parent_header: Option<JupyterHeader>,

    /// Additional metadata, if any
    pub metadata: Value,

    /// The body (payload) of the message
    pub content: Value,

    /// Raw binary attachments. They follow the signed region and are not
    /// covered by the signature.
    pub buffers: Vec<Vec<u8>>,
}

impl WireMessage {
    /// Read a WireMessage from a socket, verifying it with the socket's
    /// session.
    pub fn read_from_socket(socket: &Socket) -> Result<WireMessage, Error> {
        let bufs = socket.recv_multipart()?;
        let msg = Self::from_buffers(bufs, &socket.session)?;
        trace!(
            "Received '{}' message via {} socket",
            msg.header.msg_type,
            socket.name
        );
        Ok(msg)
    }

    /// Return the Jupyter type of the message.
    pub fn message_type(&self) -> &str {
        &self.header.msg_type
    }

    /// Return the kind of the message, if it belongs to the known vocabulary.
    pub fn kind(&self) -> Result<MessageKind, Error> {
        MessageKind::from_str(&self.header.msg_type)
            .map_err(|_| Error::UnknownMessageType(self.header.msg_type.clone()))
    }

    /// Parse a Jupyter message from an array of buffers (from a ZeroMQ message)
    ///
    /// The signature is checked before any of the JSON parts are parsed, so
    /// unauthenticated payloads are never interpreted.
    pub fn from_buffers(mut bufs: Vec<Vec<u8>>, session: &Session) -> Result<WireMessage, Error> {
        // Find the position of the <IDS|MSG> delimiter in the message, which
        // separates the socket identities (IDS) from the body of the message
        // (MSG).
        let Some(pos) = bufs.iter().position(|buf| &buf[..] == MSG_DELIM) else {
            return Err(Error::MissingDelimiter);
        };

        // Form a collection of the remaining parts, and remove the delimiter.
        let mut parts: Vec<_> = bufs.drain(pos + 1..).collect();
        bufs.pop();

        if parts.len() < SIGNED_PARTS {
            return Err(Error::InsufficientParts(parts.len(), SIGNED_PARTS));
        }
        let buffers = parts.split_off(SIGNED_PARTS);

        WireMessage::validate_signature(&parts, session)?;

        // Parse the message header
        let header_val = WireMessage::parse_buffer("header", &parts[1])?;
        let header: JupyterHeader = match serde_json::from_value(header_val.clone()) {
            Ok(h) => h,
            Err(err) => return Err(Error::InvalidPart(String::from("header"), header_val, err)),
        };

        // Parse the parent header. An empty dict means there's no parent,
        // which is OK per the wire protocol.
        let parent_val = WireMessage::parse_buffer("parent header", &parts[2])?;
        let parent_header = match &parent_val {
            Value::Object(map) if map.is_empty() => None,
            _ => match serde_json::from_value(parent_val.clone()) {
                Ok(h) => Some(h),
                Err(err) => {
                    return Err(Error::InvalidPart(
                        String::from("parent header"),
                        parent_val,
                        err,
                    ))
                },
            },
        };

        Ok(Self {
            zmq_identities: bufs,
            header,
            parent_header,
            metadata: WireMessage::parse_buffer("metadata", &parts[3])?,
            content: WireMessage::parse_buffer("content", &parts[4])?,
            buffers,
        })
    }

    /// Validates the signature part against the four JSON parts that follow
    /// it.
    fn validate_signature(parts: &[Vec<u8>], session: &Session) -> Result<(), Error> {
        // Without a signer the session runs unsigned, which it can only do
        // when that was explicitly requested at creation.
        let Some(signer) = &session.signer else {
            return Ok(());
        };

        let signature = &parts[0];
        if signature.is_empty() {
            return Err(Error::MissingSignature);
        }

        // Decode the hexadecimal representation of the signature
        let decoded = match hex::decode(signature) {
            Ok(decoded_bytes) => decoded_bytes,
            Err(error) => return Err(Error::InvalidHmac(signature.to_vec(), error)),
        };

        if !signer.verify(&parts[1..SIGNED_PARTS], &decoded) {
            return Err(Error::BadSignature(
                String::from_utf8_lossy(signature).to_string(),
            ));
        }

        Ok(())
    }

    /// Parse raw buffer data from a single part of a multipart message into a
    /// JSON value.
    fn parse_buffer(desc: &str, buf: &[u8]) -> Result<Value, Error> {
        // Convert the raw byte sequence into UTF-8
        let str = match std::str::from_utf8(buf) {
            Ok(s) => s,
            Err(err) => return Err(Error::Utf8Error(String::from(desc), buf.to_vec(), err)),
        };

        // Parse the UTF-8 string as JSON
        match serde_json::from_str(str) {
            Ok(v) => Ok(v),
            Err(err) => Err(Error::JsonParseError(String::from(desc), String::from(str), err)),
        }
    }

    /// Encodes this message into the frames sent over the wire. The signature
    /// is always computed afresh from the session's key.
    pub fn to_buffers(&self, session: &Session) -> Result<Vec<Vec<u8>>, Error> {
        // Serialize JSON values into byte parts in preparation for transmission
        let mut parts = self.to_raw_parts().map_err(Error::CannotSerialize)?;

        let signature = match &session.signer {
            Some(signer) => signer.sign(&parts),
            None => String::new(),
        };

        // Start with the socket identities, if any, then the delimiter and
        // the signed region
        let mut msg: Vec<Vec<u8>> = self.zmq_identities.clone();
        msg.push(MSG_DELIM.to_vec());
        msg.push(signature.into_bytes());
        msg.append(&mut parts);
        msg.extend(self.buffers.iter().cloned());
        Ok(msg)
    }

    /// Send this message to the given socket.
    pub fn send(&self, socket: &Socket) -> Result<(), Error> {
        match &self.parent_header {
            Some(parent) => {
                trace!(
                    "Sending '{}' message (reply to '{}') via {} socket",
                    self.msg_type(),
                    parent.msg_type,
                    socket.name
                );
            },
            None => {
                trace!(
                    "Sending '{}' message via {} socket",
                    self.msg_type(),
                    socket.name
                );
            },
        }

        let msg = self.to_buffers(&socket.session)?;
        socket.send_multipart(&msg)
    }

    /// Returns a vector containing the raw parts of the message
    fn to_raw_parts(&self) -> Result<Vec<Vec<u8>>, serde_json::Error> {
        // The Jupyter protocol states that orphan messages should have an
        // empty dict as parent
        let parent = match &self.parent_header {
            Some(parent) => serde_json::to_vec(parent)?,
            None => serde_json::to_vec(&json!({}))?,
        };

        Ok(vec![
            serde_json::to_vec(&self.header)?,
            parent,
            serde_json::to_vec(&self.metadata)?,
            serde_json::to_vec(&self.content)?,
        ])
    }

    /// A more descriptive type for trace records; status messages include
    /// the state they announce.
    fn msg_type(&self) -> String {
        if self.header.msg_type == "status" {
            if let Some(state) = self.content.get("execution_state").and_then(Value::as_str) {
                return format!("status/{state}");
            }
        }
        self.header.msg_type.clone()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;
    use crate::wire::execute_request::ExecuteRequest;
    use crate::wire::jupyter_message::JupyterMessage;

    fn session() -> Session {
        Session::create("a8a8f3c1-5ab4-4f0a-9c57-0a0ed1fcbf0c").unwrap()
    }

    fn sample(session: &Session) -> WireMessage {
        let parent = session.header(MessageKind::KernelInfoRequest);
        let msg = JupyterMessage::create(ExecuteRequest::new("1 + 1"), Some(parent), session);
        let mut wire = WireMessage::try_from(&msg).unwrap();
        wire.zmq_identities = vec![b"client-1".to_vec(), b"client-2".to_vec()];
        wire.metadata = json!({ "cell_id": "abc" });
        wire.buffers = vec![vec![0, 1, 2, 255], vec![]];
        wire
    }

    #[test]
    fn test_round_trip() {
        let session = session();
        let msg = sample(&session);
        let bufs = msg.to_buffers(&session).unwrap();
        assert_eq!(WireMessage::from_buffers(bufs, &session).unwrap(), msg);
    }

    #[test]
    fn test_frame_layout() {
        let session = session();
        let bufs = sample(&session).to_buffers(&session).unwrap();

        // Two identities, the delimiter, five signed parts, two buffers
        assert_eq!(bufs.len(), 10);
        assert_eq!(bufs[2], MSG_DELIM);
        let signature = String::from_utf8(bufs[3].clone()).unwrap();
        assert_eq!(signature.len(), 64);
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(bufs[9], Vec::<u8>::new());
    }

    #[test]
    fn test_orphan_message_has_empty_parent() {
        let session = session();
        let mut msg = sample(&session);
        msg.parent_header = None;
        let bufs = msg.to_buffers(&session).unwrap();
        assert_eq!(bufs[5], b"{}".to_vec());
        assert_eq!(
            WireMessage::from_buffers(bufs, &session).unwrap().parent_header,
            None
        );
    }

    #[test]
    fn test_mutating_any_signed_byte_fails_verification() {
        let session = session();
        let bufs = sample(&session).to_buffers(&session).unwrap();

        // Header, parent, metadata and content are parts 4 to 7
        for part in 4..8 {
            for index in 0..bufs[part].len() {
                let mut mutated = bufs.clone();
                mutated[part][index] ^= 0x01;
                assert_matches!(
                    WireMessage::from_buffers(mutated, &session),
                    Err(Error::BadSignature(_))
                );
            }
        }
    }

    #[test]
    fn test_buffers_are_not_signed() {
        let session = session();
        let mut bufs = sample(&session).to_buffers(&session).unwrap();
        bufs[8][0] = 42;
        let msg = WireMessage::from_buffers(bufs, &session).unwrap();
        assert_eq!(msg.buffers[0], vec![42, 1, 2, 255]);
    }

    #[test]
    fn test_wrong_key_is_rejected() {
        let session = session();
        let other = Session::create("another-key").unwrap();
        let bufs = sample(&session).to_buffers(&other).unwrap();
        assert_matches!(
            WireMessage::from_buffers(bufs, &session),
            Err(err) if err.is_signature()
        );
    }

    #[test]
    fn test_signature_is_checked_before_parsing() {
        let session = session();
        let mut bufs = sample(&session).to_buffers(&session).unwrap();
        bufs[7] = b"this is not json".to_vec();
        assert_matches!(
            WireMessage::from_buffers(bufs, &session),
            Err(Error::BadSignature(_))
        );
    }

    #[test]
    fn test_unsigned_messages() {
        let signed = session();
        let unsigned = Session::unsigned();
        let bufs = sample(&unsigned).to_buffers(&unsigned).unwrap();
        assert!(bufs[3].is_empty());

        // Unsigned sessions accept them; signed sessions never do
        assert!(WireMessage::from_buffers(bufs.clone(), &unsigned).is_ok());
        assert_matches!(
            WireMessage::from_buffers(bufs, &signed),
            Err(Error::MissingSignature)
        );
    }

    #[test]
    fn test_invalid_hex_signature() {
        let session = session();
        let mut bufs = sample(&session).to_buffers(&session).unwrap();
        bufs[3] = b"not-hex".to_vec();
        assert_matches!(
            WireMessage::from_buffers(bufs, &session),
            Err(Error::InvalidHmac(..))
        );
    }

    #[test]
    fn test_malformed_envelopes() {
        let session = session();
        let bufs = sample(&session).to_buffers(&session).unwrap();

        let mut missing_delimiter = bufs.clone();
        missing_delimiter.remove(2);
        assert_matches!(
            WireMessage::from_buffers(missing_delimiter, &session),
            Err(Error::MissingDelimiter)
        );

        let truncated = bufs[..6].to_vec();
        assert_matches!(
            WireMessage::from_buffers(truncated, &session),
            Err(Error::InsufficientParts(3, 5))
        );

        // A correctly signed message whose content isn't JSON
        let mut msg = sample(&session).to_buffers(&session).unwrap();
        msg[7] = b"{".to_vec();
        let signer = session.signer.as_ref().unwrap();
        msg[3] = signer.sign(&msg[4..8]).into_bytes();
        assert_matches!(
            WireMessage::from_buffers(msg, &session),
            Err(err) if err.is_malformed()
        );
    }

    #[test]
    fn test_unknown_message_type() {
        let session = session();
        let mut msg = sample(&session);
        msg.header.msg_type = String::from("frobnicate_request");
        let bufs = msg.to_buffers(&session).unwrap();

        // Decoding succeeds; only the type lookup fails
        let msg = WireMessage::from_buffers(bufs, &session).unwrap();
        assert_matches!(msg.kind(), Err(Error::UnknownMessageType(kind)) if kind == "frobnicate_request");
    }
}
