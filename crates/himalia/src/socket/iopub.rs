/*
 * iopub.rs
 *
 * Copyright (C) 2022 Posit Software, PBC. All rights reserved.
 *
 */

use std::time::Duration;

use crossbeam::channel::tick;
use crossbeam::channel::Receiver;
use crossbeam::channel::Sender;
use crossbeam::select;
use log::debug;
use log::trace;
use log::warn;

use crate::config::RetryPolicy;
use crate::error::Error;
use crate::socket::socket::Socket;
use crate::wire::clear_output::ClearOutput;
use crate::wire::comm_close::CommClose;
use crate::wire::comm_msg::CommWireMsg;
use crate::wire::comm_open::CommOpen;
use crate::wire::debug_event::DebugEvent;
use crate::wire::display_data::DisplayData;
use crate::wire::execute_error::ExecuteError;
use crate::wire::execute_input::ExecuteInput;
use crate::wire::execute_result::ExecuteResult;
use crate::wire::header::JupyterHeader;
use crate::wire::jupyter_message::JupyterMessage;
use crate::wire::jupyter_message::ProtocolMessage;
use crate::wire::status::KernelStatus;
use crate::wire::stream::Stream;
use crate::wire::stream::StreamOutput;
use crate::wire::update_display_data::UpdateDisplayData;
use crate::wire::wire_message::WireMessage;

/// Enumeration of all messages that can be delivered from the IOPub XPUB/SUB
/// socket. These messages generally are created on other threads and then sent
/// via a channel to the IOPub thread.
///
/// Each message names its parent explicitly: the header of the request that
/// caused it, or `None` for unsolicited messages.
#[derive(Debug)]
pub enum IOPubMessage {
    Status(Option<JupyterHeader>, KernelStatus),
    ExecuteInput(JupyterHeader, ExecuteInput),
    ExecuteResult(JupyterHeader, ExecuteResult),
    ExecuteError(JupyterHeader, ExecuteError),
    Stream(JupyterHeader, StreamOutput),
    DisplayData(Option<JupyterHeader>, DisplayData),
    UpdateDisplayData(Option<JupyterHeader>, UpdateDisplayData),
    ClearOutput(JupyterHeader, ClearOutput),
    CommOpen(Option<JupyterHeader>, CommOpen),
    CommMsg(Option<JupyterHeader>, CommWireMsg),
    CommClose(Option<JupyterHeader>, CommClose),
    DebugEvent(Option<JupyterHeader>, DebugEvent),
    Flush(Flush),
}

/// A special IOPub message used to force a flush of the active stream buffer,
/// optionally waiting on a response that responds once the request has actually
/// been forwarded to the frontend.
#[derive(Debug)]
pub struct Flush {
    pub flush_tx: Option<Sender<()>>,
}

pub struct IOPub {
    /// The underlying IOPub socket
    socket: Socket,

    /// A channel that receives IOPub messages from other threads
    receiver: Receiver<IOPubMessage>,

    /// Notified when a frontend subscribes to the socket
    subscription_tx: Sender<()>,

    /// Disconnected when the kernel halts
    shutdown_rx: Receiver<()>,

    /// A buffer for the active stdout/stderr stream to batch stream messages
    /// that we send to the frontend, since this can be extremely high traffic.
    buffer: StreamBuffer,

    retry: RetryPolicy,

    flush_interval: Duration,
}

impl IOPub {
    pub fn new(
        socket: Socket,
        receiver: Receiver<IOPubMessage>,
        subscription_tx: Sender<()>,
        shutdown_rx: Receiver<()>,
        retry: RetryPolicy,
        flush_interval: Duration,
    ) -> Self {
        Self {
            socket,
            receiver,
            subscription_tx,
            shutdown_rx,
            buffer: StreamBuffer::default(),
            retry,
            flush_interval,
        }
    }

    /// Publishes IOPub messages from other threads until the kernel halts.
    /// Returns an error when publishing failed for good, which is fatal for
    /// the kernel.
    pub fn listen(&mut self) -> crate::Result<()> {
        // Flush the active stream at regular intervals, and look for new
        // subscribers at the same pace
        let flush_interval = tick(self.flush_interval);

        loop {
            select! {
                recv(self.receiver) -> message => {
                    let Ok(message) = message else {
                        // Every publisher is gone
                        return self.flush_stream();
                    };
                    self.process_message(message)?;
                },
                recv(flush_interval) -> _ => {
                    self.flush_stream()?;
                    self.process_subscriptions()?;
                },
                recv(self.shutdown_rx) -> _ => {
                    // Deliver what was published before the halt
                    while let Ok(message) = self.receiver.try_recv() {
                        self.process_message(message)?;
                    }
                    return self.flush_stream();
                },
            }
        }
    }

    /// Process an IOPub message from another thread.
    fn process_message(&mut self, message: IOPubMessage) -> crate::Result<()> {
        // Flush the stream if we are processing anything other than a `Stream`
        // message, so output stays in order with the messages around it.
        // Particularly important for `ExecuteError`s and for the final `idle`
        // status of a request.
        if !matches!(message, IOPubMessage::Stream(..)) {
            self.flush_stream()?;
        }

        let result = match message {
            IOPubMessage::Status(parent, msg) => self.send_message(parent, msg),
            IOPubMessage::ExecuteInput(parent, msg) => self.send_message(Some(parent), msg),
            IOPubMessage::ExecuteResult(parent, msg) => self.send_message(Some(parent), msg),
            IOPubMessage::ExecuteError(parent, msg) => self.send_message(Some(parent), msg),
            IOPubMessage::Stream(parent, msg) => self.process_stream_message(parent, msg),
            IOPubMessage::DisplayData(parent, msg) => self.send_message(parent, msg),
            IOPubMessage::UpdateDisplayData(parent, msg) => self.send_message(parent, msg),
            IOPubMessage::ClearOutput(parent, msg) => self.send_message(Some(parent), msg),
            IOPubMessage::CommOpen(parent, msg) => self.send_message(parent, msg),
            IOPubMessage::CommMsg(parent, msg) => self.send_message(parent, msg),
            IOPubMessage::CommClose(parent, msg) => self.send_message(parent, msg),
            IOPubMessage::DebugEvent(parent, msg) => self.send_message(parent, msg),
            IOPubMessage::Flush(msg) => {
                if let Some(flush_tx) = msg.flush_tx {
                    // The requester may have stopped waiting
                    let _ = flush_tx.send(());
                }
                Ok(())
            },
        };

        match result {
            Err(err) if !err.is_transport() => {
                warn!("Error delivering iopub message: {err}");
                Ok(())
            },
            result => result,
        }
    }

    fn send_message<T: ProtocolMessage>(
        &self,
        parent: Option<JupyterHeader>,
        content: T,
    ) -> crate::Result<()> {
        let msg = JupyterMessage::<T>::create(content, parent, &self.socket.session);
        let msg = WireMessage::try_from(&msg)?;
        self.send_with_retry(&msg)
    }

    /// Sends a message, retrying transport failures as the retry policy
    /// allows. Publishing never waits for subscribers: the socket drops
    /// messages nobody is subscribed to.
    fn send_with_retry(&self, msg: &WireMessage) -> crate::Result<()> {
        let mut attempt = 0;
        loop {
            match msg.send(&self.socket) {
                Ok(()) => return Ok(()),
                Err(err) if err.is_transport() && attempt < self.retry.attempts => {
                    attempt += 1;
                    warn!(
                        "Failed to publish '{}' (attempt {attempt} of {}): {err}",
                        msg.message_type(),
                        self.retry.attempts + 1
                    );
                    std::thread::sleep(self.retry.delay());
                },
                Err(err) if err.is_transport() => {
                    return Err(Error::PublishFailed(self.socket.name.clone(), Box::new(err)));
                },
                Err(err) => return Err(err),
            }
        }
    }

    /// Flushes the active stream, sending along the message if the buffer
    /// wasn't empty.
    fn flush_stream(&mut self) -> crate::Result<()> {
        let Some((parent, message)) = self.buffer.flush() else {
            return Ok(());
        };
        self.send_message(Some(parent), message)
    }

    /// Processes a `Stream` message by appending it to the stream buffer. The
    /// buffer will be flushed on the next tick interval unless it is manually
    /// flushed before then.
    fn process_stream_message(
        &mut self,
        parent: JupyterHeader,
        message: StreamOutput,
    ) -> crate::Result<()> {
        match self.buffer.push(parent, message) {
            Some((parent, previous)) => self.send_message(Some(parent), previous),
            None => Ok(()),
        }
    }

    /// Reads the subscription frames an XPUB socket receives. The first byte
    /// is 1 for a subscription and 0 for an unsubscription.
    fn process_subscriptions(&mut self) -> crate::Result<()> {
        while self.socket.has_incoming_data()? {
            let frames = self.socket.recv_multipart()?;
            match frames.first().and_then(|frame| frame.first()) {
                Some(1) => {
                    debug!("IOPub: Received subscription");
                    // Only the first subscription matters
                    let _ = self.subscription_tx.try_send(());
                },
                Some(0) => debug!("IOPub: Received unsubscription"),
                _ => warn!("IOPub: Unexpected message on socket: {frames:?}"),
            }
        }
        Ok(())
    }
}

/// Batches consecutive output of one stream for one request.
#[derive(Default)]
struct StreamBuffer {
    pending: Option<(JupyterHeader, Stream)>,
    text: String,
}

impl StreamBuffer {
    /// Appends output; returns the previously buffered output when it has to
    /// be sent first because the stream or the request changed.
    fn push(
        &mut self,
        parent: JupyterHeader,
        output: StreamOutput,
    ) -> Option<(JupyterHeader, StreamOutput)> {
        let switched = match &self.pending {
            Some((header, name)) => header.msg_id != parent.msg_id || *name != output.name,
            None => false,
        };
        let previous = if switched { self.flush() } else { None };

        if self.pending.is_none() {
            trace!("Buffering '{:?}' output", output.name);
            self.pending = Some((parent, output.name));
        }
        self.text.push_str(&output.text);

        previous
    }

    fn flush(&mut self) -> Option<(JupyterHeader, StreamOutput)> {
        let (parent, name) = self.pending.take()?;
        let text = std::mem::take(&mut self.text);
        if text.is_empty() {
            return None;
        }
        Some((parent, StreamOutput { name, text }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    use assert_matches::assert_matches;
    use crossbeam::channel::bounded;
    use crossbeam::channel::unbounded;

    use super::*;
    use crate::session::Session;
    use crate::socket::transport::Transport;
    use crate::wire::message_kind::MessageKind;
    use crate::wire::status::ExecutionState;
    use crate::wire::status::KernelStatus;

    /// Fails the first `failures` sends, then hands messages to `sent_tx`.
    struct FlakyTransport {
        failures: Arc<AtomicU32>,
        sent_tx: Sender<Vec<Vec<u8>>>,
    }

    impl Transport for FlakyTransport {
        fn recv_multipart(&self) -> crate::Result<Vec<Vec<u8>>> {
            Err(Error::ChannelClosed(String::from("IOPub")))
        }

        fn send_multipart(&self, parts: &[Vec<u8>]) -> crate::Result<()> {
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(Error::ZmqError(String::from("IOPub"), zmq::Error::EAGAIN));
            }
            self.sent_tx
                .send(parts.to_vec())
                .map_err(|_| Error::ChannelClosed(String::from("IOPub")))
        }

        fn poll_incoming(&self, _timeout_ms: i64) -> crate::Result<bool> {
            Ok(false)
        }
    }

    fn flaky_iopub(failures: u32, attempts: u32) -> (IOPub, Receiver<Vec<Vec<u8>>>) {
        let (sent_tx, sent_rx) = unbounded();
        let transport = FlakyTransport {
            failures: Arc::new(AtomicU32::new(failures)),
            sent_tx,
        };
        let socket = Socket::from_transport(
            Session::create("key").unwrap(),
            String::from("IOPub"),
            transport,
        );
        let (_tx, receiver) = unbounded();
        let (subscription_tx, _) = bounded(1);
        let (_, shutdown_rx) = bounded(0);
        let iopub = IOPub::new(
            socket,
            receiver,
            subscription_tx,
            shutdown_rx,
            RetryPolicy {
                attempts,
                delay_ms: 0,
            },
            Duration::from_millis(10),
        );
        (iopub, sent_rx)
    }

    fn idle() -> KernelStatus {
        KernelStatus {
            execution_state: ExecutionState::Idle,
        }
    }

    #[test]
    fn test_publish_retries_transient_failures() {
        let (iopub, sent_rx) = flaky_iopub(2, 3);
        iopub.send_message(None, idle()).unwrap();
        assert!(sent_rx.try_recv().is_ok());
    }

    #[test]
    fn test_publish_fails_once_retries_are_exhausted() {
        let (iopub, sent_rx) = flaky_iopub(5, 2);
        assert_matches!(
            iopub.send_message(None, idle()),
            Err(Error::PublishFailed(name, _)) => {
                assert_eq!(name, "IOPub");
            }
        );
        assert!(sent_rx.try_recv().is_err());
    }

    fn output(name: Stream, text: &str) -> StreamOutput {
        StreamOutput {
            name,
            text: String::from(text),
        }
    }

    #[test]
    fn test_stream_buffer_batches_same_stream() {
        let session = Session::create("key").unwrap();
        let parent = session.header(MessageKind::ExecuteRequest);
        let mut buffer = StreamBuffer::default();

        assert!(buffer.push(parent.clone(), output(Stream::Stdout, "a")).is_none());
        assert!(buffer.push(parent.clone(), output(Stream::Stdout, "b")).is_none());
        let (flushed_parent, flushed) = buffer.flush().unwrap();
        assert_eq!(flushed_parent, parent);
        assert_eq!(flushed, output(Stream::Stdout, "ab"));
        assert!(buffer.flush().is_none());
    }

    #[test]
    fn test_stream_buffer_flushes_on_switch() {
        let session = Session::create("key").unwrap();
        let first = session.header(MessageKind::ExecuteRequest);
        let second = session.header(MessageKind::ExecuteRequest);
        let mut buffer = StreamBuffer::default();

        buffer.push(first.clone(), output(Stream::Stdout, "out"));
        let (parent, previous) = buffer.push(first.clone(), output(Stream::Stderr, "err")).unwrap();
        assert_eq!(parent, first);
        assert_eq!(previous, output(Stream::Stdout, "out"));

        let (parent, previous) = buffer.push(second.clone(), output(Stream::Stderr, "more")).unwrap();
        assert_eq!(parent, first);
        assert_eq!(previous, output(Stream::Stderr, "err"));

        let (parent, last) = buffer.flush().unwrap();
        assert_eq!(parent, second);
        assert_eq!(last, output(Stream::Stderr, "more"));
    }
}
