/*
 * jupyter_message.rs
 *
 * Copyright (C) 2022 Posit Software, PBC. All rights reserved.
 *
 */

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::error::Error;
use crate::session::Session;
use crate::socket::socket::Socket;
use crate::wire::clear_output::ClearOutput;
use crate::wire::comm_close::CommClose;
use crate::wire::comm_info_reply::CommInfoReply;
use crate::wire::comm_info_request::CommInfoRequest;
use crate::wire::comm_msg::CommWireMsg;
use crate::wire::comm_open::CommOpen;
use crate::wire::complete_reply::CompleteReply;
use crate::wire::complete_request::CompleteRequest;
use crate::wire::debug_event::DebugEvent;
use crate::wire::debug_reply::DebugReply;
use crate::wire::debug_request::DebugRequest;
use crate::wire::display_data::DisplayData;
use crate::wire::error_reply::ErrorReply;
use crate::wire::exception::Exception;
use crate::wire::execute_error::ExecuteError;
use crate::wire::execute_input::ExecuteInput;
use crate::wire::execute_reply::ExecuteReply;
use crate::wire::execute_reply_exception::ExecuteReplyException;
use crate::wire::execute_request::ExecuteRequest;
use crate::wire::execute_result::ExecuteResult;
use crate::wire::header::JupyterHeader;
use crate::wire::history_reply::HistoryReply;
use crate::wire::history_request::HistoryRequest;
use crate::wire::input_reply::InputReply;
use crate::wire::input_request::InputRequest;
use crate::wire::inspect_reply::InspectReply;
use crate::wire::inspect_request::InspectRequest;
use crate::wire::interrupt_reply::InterruptReply;
use crate::wire::interrupt_request::InterruptRequest;
use crate::wire::is_complete_reply::IsCompleteReply;
use crate::wire::is_complete_request::IsCompleteRequest;
use crate::wire::kernel_info_reply::KernelInfoReply;
use crate::wire::kernel_info_request::KernelInfoRequest;
use crate::wire::message_kind::MessageKind;
use crate::wire::originator::Originator;
use crate::wire::shutdown_reply::ShutdownReply;
use crate::wire::shutdown_request::ShutdownRequest;
use crate::wire::status::KernelStatus;
use crate::wire::stream::StreamOutput;
use crate::wire::update_display_data::UpdateDisplayData;
use crate::wire::wire_message::WireMessage;

/// Represents a Jupyter message
#[derive(Debug, Clone)]
pub struct JupyterMessage<T> {
    /// The ZeroMQ identities (for ROUTER sockets)
    pub zmq_identities: Vec<Vec<u8>>,

    /// The header for this message
    pub header: JupyterHeader,

    /// The header of the message from which this message originated. Optional;
    /// not all messages have a parent.
    pub parent_header: Option<JupyterHeader>,

    /// Auxiliary data; its meaning depends on the message type
    pub metadata: Value,

    /// The body (payload) of the message
    pub content: T,

    /// Binary attachments, in order
    pub buffers: Vec<Vec<u8>>,
}

/// Trait used to extract the wire message type from a Jupyter message
pub trait MessageType {
    fn kind() -> MessageKind;

    fn message_type() -> String {
        Self::kind().to_string()
    }
}

/// Convenience trait for grouping traits that must be present on all Jupyter
/// protocol messages
pub trait ProtocolMessage: MessageType + Serialize + std::fmt::Debug + Clone {}
impl<T> ProtocolMessage for T where T: MessageType + Serialize + std::fmt::Debug + Clone {}

/// List of all known messages
#[derive(Debug, Clone)]
pub enum Message {
    // Shell
    KernelInfoRequest(JupyterMessage<KernelInfoRequest>),
    KernelInfoReply(JupyterMessage<KernelInfoReply>),
    ExecuteRequest(JupyterMessage<ExecuteRequest>),
    ExecuteReply(JupyterMessage<ExecuteReply>),
    ExecuteReplyException(JupyterMessage<ExecuteReplyException>),
    InspectRequest(JupyterMessage<InspectRequest>),
    InspectReply(JupyterMessage<InspectReply>),
    CompleteRequest(JupyterMessage<CompleteRequest>),
    CompleteReply(JupyterMessage<CompleteReply>),
    HistoryRequest(JupyterMessage<HistoryRequest>),
    HistoryReply(JupyterMessage<HistoryReply>),
    IsCompleteRequest(JupyterMessage<IsCompleteRequest>),
    IsCompleteReply(JupyterMessage<IsCompleteReply>),
    CommInfoRequest(JupyterMessage<CommInfoRequest>),
    CommInfoReply(JupyterMessage<CommInfoReply>),
    // Control
    ShutdownRequest(JupyterMessage<ShutdownRequest>),
    ShutdownReply(JupyterMessage<ShutdownReply>),
    InterruptRequest(JupyterMessage<InterruptRequest>),
    InterruptReply(JupyterMessage<InterruptReply>),
    DebugRequest(JupyterMessage<DebugRequest>),
    DebugReply(JupyterMessage<DebugReply>),
    // IOPub
    Stream(JupyterMessage<StreamOutput>),
    DisplayData(JupyterMessage<DisplayData>),
    UpdateDisplayData(JupyterMessage<UpdateDisplayData>),
    ExecuteInput(JupyterMessage<ExecuteInput>),
    ExecuteResult(JupyterMessage<ExecuteResult>),
    ExecuteError(JupyterMessage<ExecuteError>),
    Status(JupyterMessage<KernelStatus>),
    ClearOutput(JupyterMessage<ClearOutput>),
    DebugEvent(JupyterMessage<DebugEvent>),
    // Stdin
    InputRequest(JupyterMessage<InputRequest>),
    InputReply(JupyterMessage<InputReply>),
    // IOPub/Shell
    CommOpen(JupyterMessage<CommOpen>),
    CommMsg(JupyterMessage<CommWireMsg>),
    CommClose(JupyterMessage<CommClose>),
}

/// Represents status returned from kernel inside messages.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Ok,
    Error,
    #[serde(alias = "abort")]
    Aborted,
}

macro_rules! for_each_message {
    ($msg:expr, $inner:ident => $body:expr) => {
        match $msg {
            Message::KernelInfoRequest($inner) => $body,
            Message::KernelInfoReply($inner) => $body,
            Message::ExecuteRequest($inner) => $body,
            Message::ExecuteReply($inner) => $body,
            Message::ExecuteReplyException($inner) => $body,
            Message::InspectRequest($inner) => $body,
            Message::InspectReply($inner) => $body,
            Message::CompleteRequest($inner) => $body,
            Message::CompleteReply($inner) => $body,
            Message::HistoryRequest($inner) => $body,
            Message::HistoryReply($inner) => $body,
            Message::IsCompleteRequest($inner) => $body,
            Message::IsCompleteReply($inner) => $body,
            Message::CommInfoRequest($inner) => $body,
            Message::CommInfoReply($inner) => $body,
            Message::ShutdownRequest($inner) => $body,
            Message::ShutdownReply($inner) => $body,
            Message::InterruptRequest($inner) => $body,
            Message::InterruptReply($inner) => $body,
            Message::DebugRequest($inner) => $body,
            Message::DebugReply($inner) => $body,
            Message::Stream($inner) => $body,
            Message::DisplayData($inner) => $body,
            Message::UpdateDisplayData($inner) => $body,
            Message::ExecuteInput($inner) => $body,
            Message::ExecuteResult($inner) => $body,
            Message::ExecuteError($inner) => $body,
            Message::Status($inner) => $body,
            Message::ClearOutput($inner) => $body,
            Message::DebugEvent($inner) => $body,
            Message::InputRequest($inner) => $body,
            Message::InputReply($inner) => $body,
            Message::CommOpen($inner) => $body,
            Message::CommMsg($inner) => $body,
            Message::CommClose($inner) => $body,
        }
    };
}

/// Conversion from a `Message` to a `WireMessage`; used to send messages over a
/// socket
impl TryFrom<&Message> for WireMessage {
    type Error = crate::error::Error;

    fn try_from(msg: &Message) -> Result<Self, Error> {
        for_each_message!(msg, msg => WireMessage::try_from(msg))
    }
}

impl TryFrom<&WireMessage> for Message {
    type Error = crate::error::Error;

    /// Converts from a wire message to a Jupyter message by examining the
    /// message type and coercing the content into the matching structure.
    /// Content that doesn't have the shape its type calls for is an
    /// `InvalidMessage` error.
    fn try_from(msg: &WireMessage) -> Result<Self, Error> {
        let message = match msg.kind()? {
            MessageKind::KernelInfoRequest => Message::KernelInfoRequest(msg.try_into()?),
            MessageKind::KernelInfoReply => Message::KernelInfoReply(msg.try_into()?),
            MessageKind::ExecuteRequest => Message::ExecuteRequest(msg.try_into()?),
            MessageKind::ExecuteReply => {
                // Error replies share the message type of successful ones
                match msg.content.get("status").and_then(Value::as_str) {
                    Some("error") => Message::ExecuteReplyException(msg.try_into()?),
                    _ => Message::ExecuteReply(msg.try_into()?),
                }
            },
            MessageKind::InspectRequest => Message::InspectRequest(msg.try_into()?),
            MessageKind::InspectReply => Message::InspectReply(msg.try_into()?),
            MessageKind::CompleteRequest => Message::CompleteRequest(msg.try_into()?),
            MessageKind::CompleteReply => Message::CompleteReply(msg.try_into()?),
            MessageKind::HistoryRequest => Message::HistoryRequest(msg.try_into()?),
            MessageKind::HistoryReply => Message::HistoryReply(msg.try_into()?),
            MessageKind::IsCompleteRequest => Message::IsCompleteRequest(msg.try_into()?),
            MessageKind::IsCompleteReply => Message::IsCompleteReply(msg.try_into()?),
            MessageKind::CommInfoRequest => Message::CommInfoRequest(msg.try_into()?),
            MessageKind::CommInfoReply => Message::CommInfoReply(msg.try_into()?),
            MessageKind::ShutdownRequest => Message::ShutdownRequest(msg.try_into()?),
            MessageKind::ShutdownReply => Message::ShutdownReply(msg.try_into()?),
            MessageKind::InterruptRequest => Message::InterruptRequest(msg.try_into()?),
            MessageKind::InterruptReply => Message::InterruptReply(msg.try_into()?),
            MessageKind::DebugRequest => Message::DebugRequest(msg.try_into()?),
            MessageKind::DebugReply => Message::DebugReply(msg.try_into()?),
            MessageKind::Stream => Message::Stream(msg.try_into()?),
            MessageKind::DisplayData => Message::DisplayData(msg.try_into()?),
            MessageKind::UpdateDisplayData => Message::UpdateDisplayData(msg.try_into()?),
            MessageKind::ExecuteInput => Message::ExecuteInput(msg.try_into()?),
            MessageKind::ExecuteResult => Message::ExecuteResult(msg.try_into()?),
            MessageKind::Error => Message::ExecuteError(msg.try_into()?),
            MessageKind::Status => Message::Status(msg.try_into()?),
            MessageKind::ClearOutput => Message::ClearOutput(msg.try_into()?),
            MessageKind::DebugEvent => Message::DebugEvent(msg.try_into()?),
            MessageKind::InputRequest => Message::InputRequest(msg.try_into()?),
            MessageKind::InputReply => Message::InputReply(msg.try_into()?),
            MessageKind::CommOpen => Message::CommOpen(msg.try_into()?),
            MessageKind::CommMsg => Message::CommMsg(msg.try_into()?),
            MessageKind::CommClose => Message::CommClose(msg.try_into()?),
        };
        Ok(message)
    }
}

impl Message {
    pub fn read_from_socket(socket: &Socket) -> Result<Self, Error> {
        let msg = WireMessage::read_from_socket(socket)?;
        Message::try_from(&msg)
    }

    pub fn send(&self, socket: &Socket) -> Result<(), Error> {
        let msg = WireMessage::try_from(self)?;
        msg.send(socket)?;
        Ok(())
    }

    pub fn header(&self) -> &JupyterHeader {
        for_each_message!(self, msg => &msg.header)
    }

    pub fn parent_header(&self) -> Option<&JupyterHeader> {
        for_each_message!(self, msg => msg.parent_header.as_ref())
    }

    pub fn kind(&self) -> MessageKind {
        for_each_message!(self, msg => msg.kind())
    }

    /// Describes the message and its request for log records.
    pub fn describe(&self) -> String {
        match self.parent_header() {
            Some(parent) => format!("'{}' (reply to '{}')", self.kind(), parent.msg_type),
            None => format!("'{}'", self.kind()),
        }
    }
}

impl<T: MessageType> JupyterMessage<T> {
    pub fn kind(&self) -> MessageKind {
        T::kind()
    }
}

impl<T> JupyterMessage<T>
where
    T: ProtocolMessage,
{
    /// Sends this Jupyter message to the designated socket.
    pub fn send(self, socket: &Socket) -> Result<(), Error> {
        let msg = WireMessage::try_from(&self)?;
        msg.send(socket)?;
        Ok(())
    }

    /// Create a new Jupyter message, optionally as a child (reply) to an
    /// existing message.
    pub fn create(content: T, parent: Option<JupyterHeader>, session: &Session) -> Self {
        session.stamp(content, parent)
    }

    /// Create a new Jupyter message addressed to the sender of `originator`.
    pub fn create_with_identity(originator: Originator, content: T, session: &Session) -> Self {
        let mut msg = session.stamp(content, Some(originator.header));
        msg.zmq_identities = originator.zmq_identities;
        msg
    }

    /// Sends a reply to the message; convenience method combining creating the
    /// reply and sending it.
    pub fn send_reply<R: ProtocolMessage>(&self, content: R, socket: &Socket) -> crate::Result<()> {
        self.create_reply(content, &socket.session).send(socket)
    }

    /// Create a reply to this message with the given content.
    pub fn create_reply<R: ProtocolMessage>(&self, content: R, session: &Session) -> JupyterMessage<R> {
        // The reply is stamped with the kernel session, not the client
        // session the request carries
        JupyterMessage::create_with_identity(Originator::from(self), content, session)
    }
}

/// Builds the error reply to a request: it uses the message type of the
/// reply the request expected, but its content is an exception.
pub fn error_reply(
    originator: &Originator,
    kind: MessageKind,
    exception: Exception,
    session: &Session,
) -> crate::Result<WireMessage> {
    let content = ErrorReply {
        status: Status::Error,
        exception,
    };
    let content = serde_json::to_value(content).map_err(Error::CannotSerialize)?;
    Ok(WireMessage {
        zmq_identities: originator.zmq_identities.clone(),
        header: session.header(kind),
        parent_header: Some(originator.header.clone()),
        metadata: serde_json::json!({}),
        content,
        buffers: vec![],
    })
}

// Conversion: WireMessage (untyped) -> JupyterMessage (typed); used on
// messages we receive over the wire to parse into the correct type.
impl<T: ProtocolMessage + DeserializeOwned> TryFrom<&WireMessage> for JupyterMessage<T> {
    type Error = crate::error::Error;

    fn try_from(msg: &WireMessage) -> Result<JupyterMessage<T>, Error> {
        let content = match serde_json::from_value(msg.content.clone()) {
            Ok(val) => val,
            Err(err) => {
                return Err(Error::InvalidMessage(
                    T::message_type(),
                    msg.content.clone(),
                    err,
                ))
            },
        };
        Ok(JupyterMessage {
            zmq_identities: msg.zmq_identities.clone(),
            header: msg.header.clone(),
            parent_header: msg.parent_header.clone(),
            metadata: msg.metadata.clone(),
            content,
            buffers: msg.buffers.clone(),
        })
    }
}

// Conversion: JupyterMessage (typed) -> WireMessage (untyped); used prior to
// sending messages to get them ready for dispatch.
impl<T: ProtocolMessage> TryFrom<&JupyterMessage<T>> for WireMessage {
    type Error = crate::error::Error;

    fn try_from(msg: &JupyterMessage<T>) -> Result<Self, Error> {
        let content = serde_json::to_value(&msg.content).map_err(Error::CannotSerialize)?;
        Ok(Self {
            zmq_identities: msg.zmq_identities.clone(),
            header: msg.header.clone(),
            parent_header: msg.parent_header.clone(),
            metadata: msg.metadata.clone(),
            content,
            buffers: msg.buffers.clone(),
        })
    }
}
