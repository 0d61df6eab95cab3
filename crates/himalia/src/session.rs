/*
 * session.rs
 *
 * Copyright (C) 2022 Posit Software, PBC. All rights reserved.
 *
 */

use std::fmt;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use hmac::digest::KeyInit;
use hmac::Hmac;
use hmac::Mac;
use sha2::Sha256;
use sha2::Sha384;
use sha2::Sha512;

use crate::connection_file::ConnectionFile;
use crate::error::Error;
use crate::wire::header::JupyterHeader;
use crate::wire::jupyter_message::JupyterMessage;
use crate::wire::jupyter_message::ProtocolMessage;
use crate::wire::message_kind::MessageKind;

pub const DEFAULT_SIGNATURE_SCHEME: &str = "hmac-sha256";

/// Computes and checks message signatures with one of the HMAC schemes
/// Jupyter clients may ask for.
#[derive(Clone, Debug)]
pub enum Signer {
    Sha256(Hmac<Sha256>),
    Sha384(Hmac<Sha384>),
    Sha512(Hmac<Sha512>),
}

impl Signer {
    pub fn new(scheme: &str, key: &[u8]) -> Result<Self, Error> {
        let invalid = |err: hmac::digest::InvalidLength| Error::HmacKeyInvalid(err.to_string());
        match scheme {
            "hmac-sha256" => Ok(Signer::Sha256(
                <Hmac<Sha256> as KeyInit>::new_from_slice(key).map_err(invalid)?,
            )),
            "hmac-sha384" => Ok(Signer::Sha384(
                <Hmac<Sha384> as KeyInit>::new_from_slice(key).map_err(invalid)?,
            )),
            "hmac-sha512" => Ok(Signer::Sha512(
                <Hmac<Sha512> as KeyInit>::new_from_slice(key).map_err(invalid)?,
            )),
            _ => Err(Error::UnsupportedSignatureScheme(String::from(scheme))),
        }
    }

    /// Returns the hex-encoded signature of the given parts, in order.
    pub fn sign(&self, parts: &[Vec<u8>]) -> String {
        match self {
            Signer::Sha256(mac) => sign_parts(mac, parts),
            Signer::Sha384(mac) => sign_parts(mac, parts),
            Signer::Sha512(mac) => sign_parts(mac, parts),
        }
    }

    /// Checks a decoded signature in constant time.
    pub fn verify(&self, parts: &[Vec<u8>], signature: &[u8]) -> bool {
        match self {
            Signer::Sha256(mac) => verify_parts(mac, parts, signature),
            Signer::Sha384(mac) => verify_parts(mac, parts, signature),
            Signer::Sha512(mac) => verify_parts(mac, parts, signature),
        }
    }
}

fn sign_parts<M: Mac + Clone>(mac: &M, parts: &[Vec<u8>]) -> String {
    let mut mac = mac.clone();
    for part in parts {
        mac.update(part);
    }
    hex::encode(mac.finalize().into_bytes().as_slice())
}

fn verify_parts<M: Mac + Clone>(mac: &M, parts: &[Vec<u8>], signature: &[u8]) -> bool {
    let mut mac = mac.clone();
    for part in parts {
        mac.update(part);
    }
    mac.verify_slice(signature).is_ok()
}

/// A Jupyter session: the kernel's identity on the wire, the key used to
/// sign messages, and the counters shared by every channel.
///
/// Clones share their counters, so message ids stay unique and the execution
/// count stays consistent across threads.
#[derive(Clone)]
pub struct Session {
    /// Signs and verifies messages; `None` when running unsigned
    pub signer: Option<Signer>,

    /// The username for this session
    pub username: String,

    /// The unique identifier of the session
    pub session_id: String,

    message_count: Arc<AtomicU64>,

    execution_count: Arc<AtomicU32>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &self.session_id)
            .field("username", &self.username)
            .field("signed", &self.signer.is_some())
            .finish()
    }
}

impl Session {
    /// Create a new session signing with HMAC-SHA256.
    pub fn create(key: &str) -> Result<Self, Error> {
        Self::create_with_scheme(key, DEFAULT_SIGNATURE_SCHEME)
    }

    /// Create a new session signing with the named scheme. An empty key is
    /// refused; use `unsigned()` to run without signatures.
    pub fn create_with_scheme(key: &str, scheme: &str) -> Result<Self, Error> {
        if key.is_empty() {
            return Err(Error::UnsignedSession);
        }
        let signer = Signer::new(scheme, key.as_bytes())?;
        Ok(Self::new(Some(signer)))
    }

    /// Create a session that neither signs nor verifies messages. Only meant
    /// for testing and local development.
    pub fn unsigned() -> Self {
        log::warn!("Creating an unsigned session; messages will not be authenticated");
        Self::new(None)
    }

    /// Create the kernel's session from a connection file. An empty key is
    /// only accepted when `allow_unsigned` is set.
    pub fn from_connection_file(file: &ConnectionFile, allow_unsigned: bool) -> Result<Self, Error> {
        if file.key.is_empty() {
            return match allow_unsigned {
                true => Ok(Self::unsigned()),
                false => Err(Error::UnsignedSession),
            };
        }
        Self::create_with_scheme(&file.key, &file.signature_scheme)
    }

    fn new(signer: Option<Signer>) -> Self {
        Self {
            signer,
            username: String::from("kernel"),
            session_id: uuid::Uuid::new_v4().to_string(),
            message_count: Arc::new(AtomicU64::new(0)),
            execution_count: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn is_signed(&self) -> bool {
        self.signer.is_some()
    }

    /// Returns an id no other message of this session carries.
    pub fn new_message_id(&self) -> String {
        let n = self.message_count.fetch_add(1, Ordering::Relaxed);
        format!("{}_{n}", self.session_id)
    }

    /// Creates a fresh header for a message of the given kind.
    pub fn header(&self, kind: MessageKind) -> JupyterHeader {
        JupyterHeader::create(
            kind.to_string(),
            self.new_message_id(),
            self.session_id.clone(),
            self.username.clone(),
        )
    }

    /// Wraps `content` in a message stamped with this session's identity and
    /// a fresh message id.
    pub fn stamp<T: ProtocolMessage>(
        &self,
        content: T,
        parent: Option<JupyterHeader>,
    ) -> JupyterMessage<T> {
        JupyterMessage {
            zmq_identities: Vec::new(),
            header: self.header(T::kind()),
            parent_header: parent,
            metadata: serde_json::json!({}),
            content,
            buffers: Vec::new(),
        }
    }

    /// Increments the execution counter and returns its new value.
    pub fn next_execution_count(&self) -> u32 {
        self.execution_count.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// The current value of the execution counter.
    pub fn execution_count(&self) -> u32 {
        self.execution_count.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use assert_matches::assert_matches;

    use super::*;
    use crate::wire::kernel_info_request::KernelInfoRequest;

    #[test]
    fn test_message_ids_are_unique_across_clones() {
        let session = Session::create("key").unwrap();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let session = session.clone();
                std::thread::spawn(move || {
                    (0..250)
                        .map(|_| session.new_message_id())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut ids = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(ids.insert(id));
            }
        }
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_execution_count() {
        let session = Session::create("key").unwrap();
        assert_eq!(session.execution_count(), 0);
        assert_eq!(session.next_execution_count(), 1);
        assert_eq!(session.clone().next_execution_count(), 2);
        assert_eq!(session.execution_count(), 2);
    }

    #[test]
    fn test_stamp() {
        let session = Session::create("key").unwrap();
        let parent = session.header(MessageKind::ExecuteRequest);
        let msg = session.stamp(KernelInfoRequest {}, Some(parent.clone()));
        assert_eq!(msg.header.msg_type, "kernel_info_request");
        assert_eq!(msg.header.session, session.session_id);
        assert_eq!(msg.header.username, "kernel");
        assert_eq!(msg.header.version, "5.4");
        assert_ne!(msg.header.msg_id, parent.msg_id);
        assert_eq!(msg.parent_header, Some(parent));
    }

    #[test]
    fn test_signature_schemes() {
        let parts = vec![b"{}".to_vec(), b"{}".to_vec()];
        for (scheme, len) in [("hmac-sha256", 64), ("hmac-sha384", 96), ("hmac-sha512", 128)] {
            let signer = Signer::new(scheme, b"secret").unwrap();
            let signature = signer.sign(&parts);
            assert_eq!(signature.len(), len);
            assert!(signer.verify(&parts, &hex::decode(&signature).unwrap()));
        }
        assert_matches!(
            Signer::new("hmac-md5", b"secret"),
            Err(Error::UnsupportedSignatureScheme(_))
        );
    }

    #[test]
    fn test_empty_key_requires_opt_in() {
        assert_matches!(Session::create(""), Err(Error::UnsignedSession));
        assert!(!Session::unsigned().is_signed());
    }
}
