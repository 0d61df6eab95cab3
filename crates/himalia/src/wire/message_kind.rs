/*
 * message_kind.rs
 *
 * Copyright (C) 2022 Posit Software, PBC. All rights reserved.
 *
 */

use strum_macros::AsRefStr;
use strum_macros::Display;
use strum_macros::EnumIter;
use strum_macros::EnumString;

/// The closed vocabulary of Jupyter message types. The wire name of each
/// variant is its snake_case form, e.g. `ExecuteRequest` is `execute_request`.
///
/// Parsing a `msg_type` that is not listed here fails, which is how unknown
/// (future) message types are detected and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display, AsRefStr, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum MessageKind {
    KernelInfoRequest,
    KernelInfoReply,
    ExecuteRequest,
    ExecuteReply,
    InspectRequest,
    InspectReply,
    CompleteRequest,
    CompleteReply,
    HistoryRequest,
    HistoryReply,
    IsCompleteRequest,
    IsCompleteReply,
    CommInfoRequest,
    CommInfoReply,
    ShutdownRequest,
    ShutdownReply,
    InterruptRequest,
    InterruptReply,
    DebugRequest,
    DebugReply,
    Stream,
    DisplayData,
    UpdateDisplayData,
    ExecuteInput,
    ExecuteResult,
    Error,
    Status,
    ClearOutput,
    DebugEvent,
    InputRequest,
    InputReply,
    CommOpen,
    CommMsg,
    CommClose,
}

impl MessageKind {
    /// The kind of the reply expected for a request, if this is a request.
    pub fn reply_kind(&self) -> Option<MessageKind> {
        let reply = match self {
            MessageKind::KernelInfoRequest => MessageKind::KernelInfoReply,
            MessageKind::ExecuteRequest => MessageKind::ExecuteReply,
            MessageKind::InspectRequest => MessageKind::InspectReply,
            MessageKind::CompleteRequest => MessageKind::CompleteReply,
            MessageKind::HistoryRequest => MessageKind::HistoryReply,
            MessageKind::IsCompleteRequest => MessageKind::IsCompleteReply,
            MessageKind::CommInfoRequest => MessageKind::CommInfoReply,
            MessageKind::ShutdownRequest => MessageKind::ShutdownReply,
            MessageKind::InterruptRequest => MessageKind::InterruptReply,
            MessageKind::DebugRequest => MessageKind::DebugReply,
            MessageKind::InputRequest => MessageKind::InputReply,
            _ => return None,
        };
        Some(reply)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn test_wire_names() {
        assert_eq!(MessageKind::ExecuteRequest.to_string(), "execute_request");
        assert_eq!(MessageKind::Error.as_ref(), "error");
        assert_eq!(
            MessageKind::from_str("update_display_data").unwrap(),
            MessageKind::UpdateDisplayData
        );
        assert!(MessageKind::from_str("frobnicate_request").is_err());
    }

    #[test]
    fn test_every_kind_parses_from_its_wire_name() {
        for kind in MessageKind::iter() {
            assert_eq!(MessageKind::from_str(kind.as_ref()).unwrap(), kind);
        }
    }

    #[test]
    fn test_reply_kinds() {
        assert_eq!(
            MessageKind::ExecuteRequest.reply_kind(),
            Some(MessageKind::ExecuteReply)
        );
        assert_eq!(
            MessageKind::InputRequest.reply_kind(),
            Some(MessageKind::InputReply)
        );
        assert_eq!(MessageKind::Status.reply_kind(), None);

        // Every reply kind is named after its request
        for kind in MessageKind::iter() {
            if let Some(reply) = kind.reply_kind() {
                let request = kind.to_string();
                let stem = request.strip_suffix("_request").unwrap();
                assert_eq!(reply.to_string(), format!("{stem}_reply"));
            }
        }
    }
}
