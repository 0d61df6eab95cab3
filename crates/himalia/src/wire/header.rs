/*
 * header.rs
 *
 * Copyright (C) 2022 Posit Software, PBC. All rights reserved.
 *
 */

use serde::Deserialize;
use serde::Serialize;

/// Version of the Jupyter messaging protocol spoken by the kernel
pub const PROTOCOL_VERSION: &str = "5.4";

/// Represents the header of a Jupyter message
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct JupyterHeader {
    /// The message identifier; must be unique per message
    pub msg_id: String,

    /// Session ID; must be unique per session
    pub session: String,

    /// Username; must be unique per user
    pub username: String,

    /// Date/time when message was created in ISO 8601 format
    #[serde(default)]
    pub date: String,

    /// The message type
    pub msg_type: String,

    /// The message protocol version
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_version() -> String {
    String::from(PROTOCOL_VERSION)
}

impl JupyterHeader {
    /// Creates a new header for the given message type, timestamped now.
    pub fn create(msg_type: String, msg_id: String, session: String, username: String) -> Self {
        Self {
            msg_id,
            session,
            username,
            date: chrono::Utc::now().to_rfc3339(),
            msg_type,
            version: default_version(),
        }
    }
}
