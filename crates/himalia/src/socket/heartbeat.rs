/*
 * heartbeat.rs
 *
 * Copyright (C) 2022 Posit Software, PBC. All rights reserved.
 *
 */

use std::time::Duration;

use crossbeam::channel::Receiver;
use crossbeam::channel::TryRecvError;
use log::debug;
use log::trace;
use log::warn;

use crate::socket::socket::poll_timeout;
use crate::socket::socket::Socket;

/// Structure used for heartbeat messages
pub struct Heartbeat {
    socket: Socket,

    /// Disconnected when the kernel halts
    halt_rx: Receiver<()>,

    poll_interval: Duration,
}

impl Heartbeat {
    /// Create a new heartbeat handler from the given heartbeat socket
    pub fn new(socket: Socket, halt_rx: Receiver<()>, poll_interval: Duration) -> Self {
        Self {
            socket,
            halt_rx,
            poll_interval,
        }
    }

    /// Echoes heartbeats until the kernel halts. Heartbeats are opaque bytes,
    /// not Jupyter messages, and errors never stop the loop.
    ///
    /// Over ZeroMQ the socket is a ROUTER, so a peer's identity frames come
    /// first and are echoed with the rest. Unlike REP, a ROUTER has no
    /// receive/send lockstep that a failed echo could leave stuck.
    pub fn listen(&self) {
        debug!("Listening for heartbeats");
        let timeout = poll_timeout(self.poll_interval);

        loop {
            if let Err(TryRecvError::Disconnected) = self.halt_rx.try_recv() {
                debug!("Heartbeat exiting");
                return;
            }

            match self.socket.poll_incoming(timeout) {
                Ok(true) => {},
                Ok(false) => continue,
                Err(err) => {
                    self.recover(&err);
                    continue;
                },
            }

            let msg = match self.socket.recv_multipart() {
                Ok(msg) => msg,
                Err(err) => {
                    self.recover(&err);
                    continue;
                },
            };
            trace!("Heartbeat message: {msg:?}");

            // Echo the message right back!
            if let Err(err) = self.socket.send_multipart(&msg) {
                warn!("Error replying to heartbeat: {err}");
            } else {
                trace!("Heartbeat message replied");
            }
        }
    }

    fn recover(&self, err: &crate::Error) {
        warn!("Error receiving heartbeat: {err}");

        // Wait before trying to receive another heartbeat. This keeps us from
        // flooding the logs when the socket isn't working.
        std::thread::sleep(Duration::from_secs(1));
    }
}

#[cfg(test)]
mod tests {
    use crossbeam::channel::bounded;

    use super::*;
    use crate::session::Session;
    use crate::socket::memory::MemoryTransport;

    fn zmq_socket(ctx: &zmq::Context, kind: zmq::SocketType, endpoint: String) -> Socket {
        Socket::new(
            Session::unsigned(),
            ctx.clone(),
            String::from("Heartbeat"),
            kind,
            None,
            endpoint,
        )
        .unwrap()
    }

    #[test]
    fn test_heartbeat_echoes_bytes() {
        let session = Session::unsigned();
        let (kernel, frontend) = MemoryTransport::pair("Heartbeat");
        let frontend = Socket::from_transport(session.clone(), String::from("Heartbeat"), frontend);
        let (halt_tx, halt_rx) = bounded::<()>(0);

        let heartbeat = Heartbeat::new(
            Socket::from_transport(session, String::from("Heartbeat"), kernel),
            halt_rx,
            Duration::from_millis(10),
        );
        let handle = std::thread::spawn(move || heartbeat.listen());

        let ping = vec![vec![0, 159, 146, 150], b"ping".to_vec()];
        frontend.send_multipart(&ping).unwrap();
        assert_eq!(frontend.recv_multipart().unwrap(), ping);

        drop(halt_tx);
        handle.join().unwrap();
    }

    #[test]
    fn test_heartbeat_echoes_to_each_peer() {
        let ctx = zmq::Context::new();
        let kernel = zmq_socket(&ctx, zmq::ROUTER, String::from("tcp://127.0.0.1:0"));
        let endpoint = format!("tcp://127.0.0.1:{}", kernel.port().unwrap());
        let (halt_tx, halt_rx) = bounded::<()>(0);

        let heartbeat = Heartbeat::new(kernel, halt_rx, Duration::from_millis(10));
        let handle = std::thread::spawn(move || heartbeat.listen());

        // A peer that never reads its echo doesn't hold up the others
        let silent = zmq_socket(&ctx, zmq::REQ, endpoint.clone());
        silent.send_multipart(&[b"silent".to_vec()]).unwrap();

        let first = zmq_socket(&ctx, zmq::REQ, endpoint.clone());
        let second = zmq_socket(&ctx, zmq::REQ, endpoint);
        first.send_multipart(&[b"first".to_vec()]).unwrap();
        second.send_multipart(&[b"second".to_vec()]).unwrap();
        assert_eq!(second.recv_multipart().unwrap(), vec![b"second".to_vec()]);
        assert_eq!(first.recv_multipart().unwrap(), vec![b"first".to_vec()]);

        // Each peer can keep going once answered
        first.send_multipart(&[b"again".to_vec()]).unwrap();
        assert_eq!(first.recv_multipart().unwrap(), vec![b"again".to_vec()]);

        drop(halt_tx);
        handle.join().unwrap();
    }
}
