/*
 * kernel_info_reply.rs
 *
 * Copyright (C) 2022 Posit Software, PBC. All rights reserved.
 *
 */

use serde::Deserialize;
use serde::Serialize;

use crate::wire::header::PROTOCOL_VERSION;
use crate::wire::help_link::HelpLink;
use crate::wire::jupyter_message::MessageType;
use crate::wire::jupyter_message::Status;
use crate::wire::language_info::LanguageInfo;
use crate::wire::message_kind::MessageKind;

/// Kernel information supplied by the execution backend. The protocol-level
/// fields are filled in when it's turned into a `KernelInfoReply`.
#[derive(Debug, Clone)]
pub struct KernelInfo {
    /// The name of the kernel implementation
    pub implementation: String,

    /// The version of the kernel implementation
    pub implementation_version: String,

    /// Information about the language the kernel supports
    pub language_info: LanguageInfo,

    /// A startup banner
    pub banner: String,

    /// Whether debugging is supported
    pub debugger: bool,

    /// A list of help links
    pub help_links: Vec<HelpLink>,
}

/// Complete information about the kernel, as sent over the wire
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct KernelInfoReply {
    /// The execution status ("ok" or "error")
    pub status: Status,

    /// Version of messaging protocol
    pub protocol_version: String,

    pub implementation: String,

    pub implementation_version: String,

    pub language_info: LanguageInfo,

    pub banner: String,

    #[serde(default)]
    pub debugger: bool,

    #[serde(default)]
    pub help_links: Vec<HelpLink>,
}

impl MessageType for KernelInfoReply {
    fn kind() -> MessageKind {
        MessageKind::KernelInfoReply
    }
}

impl From<KernelInfo> for KernelInfoReply {
    fn from(info: KernelInfo) -> Self {
        Self {
            status: Status::Ok,
            protocol_version: String::from(PROTOCOL_VERSION),
            implementation: info.implementation,
            implementation_version: info.implementation_version,
            language_info: info.language_info,
            banner: info.banner,
            debugger: info.debugger,
            help_links: info.help_links,
        }
    }
}
