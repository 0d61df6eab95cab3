/*
 * comm_manager.rs
 *
 * Copyright (C) 2023 Posit Software, PBC. All rights reserved.
 *
 */

use std::collections::HashMap;
use std::thread::JoinHandle;

use crossbeam::channel::Receiver;
use crossbeam::channel::RecvError;
use crossbeam::channel::Select;
use crossbeam::channel::Sender;
use log::info;
use log::warn;
use serde_json::json;
use stdext::result::ResultOrLog;
use stdext::spawn;

use crate::comm::event::CommInfo;
use crate::comm::event::CommManagerEvent;
use crate::socket::comm::CommInitiator;
use crate::socket::comm::CommMsg;
use crate::socket::comm::CommSocket;
use crate::socket::iopub::IOPubMessage;
use crate::wire::comm_close::CommClose;
use crate::wire::comm_msg::CommWireMsg;
use crate::wire::comm_open::CommOpen;
use crate::wire::header::JupyterHeader;

enum Selected {
    Halt,
    Event(Result<CommManagerEvent, RecvError>),
    Outgoing(usize, Result<CommMsg, RecvError>),
}

pub struct CommManager {
    open_comms: Vec<CommSocket>,
    iopub_tx: Sender<IOPubMessage>,
    comm_event_rx: Receiver<CommManagerEvent>,
    halt_rx: Receiver<()>,
    pending_rpcs: HashMap<String, JupyterHeader>,
}

impl CommManager {
    /**
     * Starts the comm manager on a dedicated thread. The comm manager listens
     * for messages on all of the open comms, attaches the comm's metadata, and
     * relays them to the front end. It runs until the kernel halts.
     *
     * - `iopub_tx`: The channel to send messages to the frontend.
     * - `comm_event_rx`: The channel to receive messages about changes to the
     *   set (or state) of open comms.
     * - `halt_rx`: Disconnected when the kernel halts.
     */
    pub fn start(
        iopub_tx: Sender<IOPubMessage>,
        comm_event_rx: Receiver<CommManagerEvent>,
        halt_rx: Receiver<()>,
    ) -> JoinHandle<()> {
        spawn!("comm-manager", move || {
            let mut comm_manager = CommManager::new(iopub_tx, comm_event_rx, halt_rx);
            while comm_manager.process_next() {}
            log::trace!("Comm manager exiting");
        })
    }

    pub fn new(
        iopub_tx: Sender<IOPubMessage>,
        comm_event_rx: Receiver<CommManagerEvent>,
        halt_rx: Receiver<()>,
    ) -> Self {
        Self {
            iopub_tx,
            comm_event_rx,
            halt_rx,
            open_comms: Vec::new(),
            pending_rpcs: HashMap::new(),
        }
    }

    /**
     * Waits for the next comm event or outgoing comm message and processes
     * it. Returns false once the manager should stop.
     */
    pub fn process_next(&mut self) -> bool {
        match self.select() {
            Selected::Halt => false,
            Selected::Event(Ok(event)) => {
                self.process_event(event);
                true
            },
            // Every sender is gone
            Selected::Event(Err(_)) => false,
            Selected::Outgoing(index, Ok(msg)) => {
                self.process_outgoing(index, msg);
                true
            },
            Selected::Outgoing(_, Err(err)) => {
                warn!("Error receiving comm message: {err}");
                true
            },
        }
    }

    /// Blocks until one of the open comms, the event channel, or the halt
    /// signal is ready.
    fn select(&self) -> Selected {
        let mut sel = Select::new();

        // Listen for messages from each of the open comms that are destined for
        // the frontend
        for comm_socket in &self.open_comms {
            sel.recv(&comm_socket.outgoing_rx);
        }

        // The event channel also unblocks the select when a comm is added or
        // removed, so the next round selects over the updated set of comms
        let events = sel.recv(&self.comm_event_rx);
        let halt = sel.recv(&self.halt_rx);

        let oper = sel.select();
        let index = oper.index();

        if index == halt {
            let _ = oper.recv(&self.halt_rx);
            Selected::Halt
        } else if index == events {
            Selected::Event(oper.recv(&self.comm_event_rx))
        } else {
            Selected::Outgoing(index, oper.recv(&self.open_comms[index].outgoing_rx))
        }
    }

    fn process_event(&mut self, event: CommManagerEvent) {
        match event {
            CommManagerEvent::Opened(comm_socket, data, parent) => {
                // Notify the frontend, if this comm originated from the back end
                if comm_socket.initiator == CommInitiator::BackEnd {
                    self.publish(IOPubMessage::CommOpen(parent, CommOpen {
                        comm_id: comm_socket.comm_id.clone(),
                        target_name: comm_socket.comm_name.clone(),
                        data,
                    }));
                }

                self.open_comms.push(comm_socket);
                info!(
                    "Comm channel opened; there are now {} open comms",
                    self.open_comms.len()
                );
            },

            CommManagerEvent::PendingRpc(header) => {
                self.pending_rpcs.insert(header.msg_id.clone(), header);
            },

            CommManagerEvent::Message(comm_id, msg) => {
                match self.open_comms.iter().find(|comm| comm.comm_id == comm_id) {
                    Some(comm) => {
                        log::trace!("Comm manager: Sending message to comm '{}'", comm.comm_name);
                        comm.incoming_tx
                            .send(msg)
                            .or_log_warning("Failed to deliver message to comm");
                    },
                    None => warn!("Received message for unknown comm channel {comm_id}: {msg:?}"),
                }
            },

            CommManagerEvent::Closed(comm_id) => {
                let index = self
                    .open_comms
                    .iter()
                    .position(|comm_socket| comm_socket.comm_id == comm_id);

                match index {
                    Some(index) => {
                        // Notify the comm that it's been closed
                        let comm = self.open_comms.remove(index);
                        comm.incoming_tx
                            .send(CommMsg::Close)
                            .or_log_error("Failed to send comm_close to comm");
                        info!(
                            "Comm channel closed; there are now {} open comms",
                            self.open_comms.len()
                        );
                    },
                    None => warn!("Received close message for unknown comm channel {comm_id}"),
                }
            },

            CommManagerEvent::Info(tx) => {
                let comms = self
                    .open_comms
                    .iter()
                    .map(|comm| CommInfo {
                        id: comm.comm_id.clone(),
                        name: comm.comm_name.clone(),
                    })
                    .collect();
                tx.send(comms)
                    .or_log_warning("Failed to send comm info");
            },
        }
    }

    /// Relays a message from the back end of a comm to the frontend.
    fn process_outgoing(&mut self, index: usize, msg: CommMsg) {
        let comm_id = self.open_comms[index].comm_id.clone();

        let msg = match msg {
            CommMsg::Data(data) => IOPubMessage::CommMsg(None, CommWireMsg { comm_id, data }),

            CommMsg::Rpc(request_id, data) => {
                // Replies are parented to the request they answer
                let parent = self.pending_rpcs.remove(&request_id);
                if parent.is_none() {
                    warn!("Received RPC response for unknown message ID {request_id}");
                }
                IOPubMessage::CommMsg(parent, CommWireMsg { comm_id, data })
            },

            CommMsg::Close => {
                self.open_comms.remove(index);
                info!(
                    "Comm channel closed by the backend; there are now {} open comms",
                    self.open_comms.len()
                );
                IOPubMessage::CommClose(None, CommClose {
                    comm_id,
                    data: json!({}),
                })
            },
        };

        self.publish(msg);
    }

    fn publish(&self, msg: IOPubMessage) {
        self.iopub_tx
            .send(msg)
            .or_log_warning("Failed to publish comm message");
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use crossbeam::channel::bounded;
    use crossbeam::channel::unbounded;

    use super::*;
    use crate::session::Session;
    use crate::wire::message_kind::MessageKind;

    struct Fixture {
        manager: CommManager,
        events_tx: Sender<CommManagerEvent>,
        iopub_rx: Receiver<IOPubMessage>,
        _halt_tx: Sender<()>,
    }

    fn fixture() -> Fixture {
        let (iopub_tx, iopub_rx) = unbounded();
        let (events_tx, events_rx) = unbounded();
        let (halt_tx, halt_rx) = bounded(0);
        Fixture {
            manager: CommManager::new(iopub_tx, events_rx, halt_rx),
            events_tx,
            iopub_rx,
            _halt_tx: halt_tx,
        }
    }

    fn comm(initiator: CommInitiator) -> CommSocket {
        CommSocket::new(initiator, String::from("comm-1"), String::from("test.target"))
    }

    #[test]
    fn test_backend_comm_open_is_announced() {
        let mut fixture = fixture();
        let comm = comm(CommInitiator::BackEnd);
        fixture
            .events_tx
            .send(CommManagerEvent::Opened(comm.clone(), json!({"x": 1}), None))
            .unwrap();
        assert!(fixture.manager.process_next());

        assert_matches!(fixture.iopub_rx.try_recv().unwrap(), IOPubMessage::CommOpen(None, open) => {
            assert_eq!(open.comm_id, "comm-1");
            assert_eq!(open.target_name, "test.target");
            assert_eq!(open.data, json!({"x": 1}));
        });

        comm.send(json!("hello")).unwrap();
        assert!(fixture.manager.process_next());
        assert_matches!(fixture.iopub_rx.try_recv().unwrap(), IOPubMessage::CommMsg(None, msg) => {
            assert_eq!(msg.data, json!("hello"));
        });
    }

    #[test]
    fn test_frontend_messages_and_close() {
        let mut fixture = fixture();
        let comm = comm(CommInitiator::FrontEnd);
        let events = &fixture.events_tx;
        events
            .send(CommManagerEvent::Opened(comm.clone(), json!({}), None))
            .unwrap();
        events
            .send(CommManagerEvent::Message(
                String::from("comm-1"),
                CommMsg::Data(json!(42)),
            ))
            .unwrap();
        events
            .send(CommManagerEvent::Closed(String::from("comm-1")))
            .unwrap();
        for _ in 0..3 {
            assert!(fixture.manager.process_next());
        }

        // Frontend-opened comms aren't announced back
        assert!(fixture.iopub_rx.try_recv().is_err());
        assert_eq!(comm.incoming_rx.try_recv().unwrap(), CommMsg::Data(json!(42)));
        assert_eq!(comm.incoming_rx.try_recv().unwrap(), CommMsg::Close);

        let (tx, rx) = bounded(1);
        fixture.events_tx.send(CommManagerEvent::Info(tx)).unwrap();
        assert!(fixture.manager.process_next());
        assert!(rx.recv().unwrap().is_empty());
    }

    #[test]
    fn test_rpc_reply_is_parented() {
        let mut fixture = fixture();
        let session = Session::create("key").unwrap();
        let request = session.header(MessageKind::CommMsg);
        let comm = comm(CommInitiator::FrontEnd);

        fixture
            .events_tx
            .send(CommManagerEvent::Opened(comm.clone(), json!({}), None))
            .unwrap();
        fixture
            .events_tx
            .send(CommManagerEvent::PendingRpc(request.clone()))
            .unwrap();
        assert!(fixture.manager.process_next());
        assert!(fixture.manager.process_next());

        comm.reply(request.msg_id.clone(), json!({"result": 1}))
            .unwrap();
        assert!(fixture.manager.process_next());
        assert_matches!(fixture.iopub_rx.try_recv().unwrap(), IOPubMessage::CommMsg(Some(parent), _) => {
            assert_eq!(parent, request);
        });

        comm.close().unwrap();
        assert!(fixture.manager.process_next());
        assert_matches!(
            fixture.iopub_rx.try_recv().unwrap(),
            IOPubMessage::CommClose(None, _)
        );
    }

    #[test]
    fn test_stops_on_halt() {
        let mut fixture = fixture();
        drop(fixture._halt_tx);
        assert!(!fixture.manager.process_next());
    }
}
