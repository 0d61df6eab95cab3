/*
 * connection_file.rs
 *
 * Copyright (C) 2022 Posit Software, PBC. All rights reserved.
 *
 */

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::Deserialize;
use serde::Serialize;

use crate::error::Error;
use crate::session::DEFAULT_SIGNATURE_SCHEME;

/// The connection parameters a kernel is started with: where each channel
/// lives and how messages are signed.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ConnectionFile {
    // ZeroMQ ports
    pub control_port: u16,
    pub shell_port: u16,
    pub stdin_port: u16,
    pub iopub_port: u16,
    pub hb_port: u16,

    /// Usually "tcp"
    #[serde(default = "default_transport")]
    pub transport: String,

    /// One of "hmac-sha256", "hmac-sha384" or "hmac-sha512"
    #[serde(default = "default_signature_scheme")]
    pub signature_scheme: String,

    #[serde(default = "default_ip")]
    pub ip: String,

    /// The signing key; empty to run unsigned
    pub key: String,
}

fn default_transport() -> String {
    String::from("tcp")
}

fn default_signature_scheme() -> String {
    String::from(DEFAULT_SIGNATURE_SCHEME)
}

fn default_ip() -> String {
    String::from("127.0.0.1")
}

impl ConnectionFile {
    /// Create a ConnectionFile by parsing the contents of a connection file.
    pub fn from_file<P: AsRef<Path>>(connection_file: P) -> Result<ConnectionFile, Error> {
        let path = connection_file.as_ref().display().to_string();
        let file = File::open(&connection_file).map_err(|err| Error::ReadFileFailed(path.clone(), err))?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader).map_err(|err| Error::ParseFileFailed(path, err))
    }

    /// Given a port, return a URI-like string that can be used to connect to
    /// the port, given the other parameters in the connection file.
    ///
    /// Example: `32` => `"tcp://127.0.0.1:32"`
    pub fn endpoint(&self, port: u16) -> String {
        format!("{}://{}:{}", self.transport, self.ip, port)
    }
}
