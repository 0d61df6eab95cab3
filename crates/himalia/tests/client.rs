/*
 * client.rs
 *
 * Copyright (C) 2022-2024 Posit Software, PBC. All rights reserved.
 *
 */

use assert_matches::assert_matches;
use himalia::config::KernelConfig;
use himalia::connection_file::ConnectionFile;
use himalia::fixtures::dummy_frontend::DummyFrontend;
use himalia::kernel::Kernel;
use himalia::session::Session;
use himalia::wire::jupyter_message::Message;
use himalia::wire::kernel_info_request::KernelInfoRequest;
use himalia::wire::shutdown_request::ShutdownRequest;

mod shell;

#[test]
fn test_kernel() {
    // Let's skip this test on Windows for now to see if the Host Unreachable
    // error only happens here
    #[cfg(target_os = "windows")]
    return;

    let _ = env_logger::builder().is_test(true).try_init();

    let key = hex::encode(uuid::Uuid::new_v4().as_bytes());
    let connection_file = ConnectionFile {
        control_port: 0,
        shell_port: 0,
        stdin_port: 0,
        iopub_port: 0,
        hb_port: 0,
        transport: String::from("tcp"),
        signature_scheme: String::from("hmac-sha256"),
        ip: String::from("127.0.0.1"),
        key: key.clone(),
    };

    log::info!("Starting test kernel");
    let session = Session::from_connection_file(&connection_file, false).unwrap();
    let config = KernelConfig {
        poll_interval_ms: 10,
        stream_flush_interval_ms: 10,
        ..Default::default()
    };
    let handle = Kernel::new("himalia", session, Box::new(shell::StubBackend::new()))
        .with_config(config)
        .connect(&connection_file)
        .unwrap();

    let bound = handle.connection_file().unwrap().clone();
    assert_ne!(bound.shell_port, 0);
    assert_ne!(bound.hb_port, 0);

    // Complete client initialization
    log::info!("Creating frontend");
    let frontend = DummyFrontend::connect(&bound, Session::create(&key).unwrap());
    frontend.recv_iopub_startup();

    // Ask the kernel for the kernel info. This should return an object with the
    // language "Test" defined by the stub backend.
    log::info!("Requesting kernel information");
    let id = frontend.send_shell(KernelInfoRequest {});
    frontend.recv_iopub_busy(&id);
    assert_matches!(frontend.recv_shell(), Message::KernelInfoReply(reply) => {
        assert_eq!(reply.content.language_info.name, "Test");
    });
    frontend.recv_iopub_idle(&id);

    // Ask the kernel to execute some code
    log::info!("Requesting execution of code '42'");
    let id = frontend.send_execute_request("42");
    frontend.recv_iopub_busy(&id);
    let input = frontend.recv_iopub_execute_input(&id);
    assert_eq!(input.code, "42");
    assert_eq!(frontend.recv_iopub_execute_result(&id), "42");
    assert_eq!(frontend.recv_shell_execute_reply(), input.execution_count);
    frontend.recv_iopub_idle(&id);

    // Input requests travel over Stdin, which shares the Shell identity
    log::info!("Sending request to generate an input prompt");
    let id = frontend.send_execute_request("prompt");
    frontend.recv_iopub_busy(&id);
    frontend.recv_iopub_execute_input(&id);
    let request = frontend.recv_stdin_input_request();
    assert_eq!(request.content.prompt, "Echo> ");
    frontend.send_stdin_input_reply(&request, "42");
    assert_eq!(frontend.recv_iopub_stream_stdout(), "42");
    assert_eq!(frontend.recv_iopub_execute_result(&id), "prompt");
    frontend.recv_shell_execute_reply();
    frontend.recv_iopub_idle(&id);

    // Heartbeats are echoed as is
    log::info!("Sending heartbeat to the kernel");
    frontend.send_heartbeat(b"Heartbeat");
    assert_eq!(frontend.recv_heartbeat(), vec![b"Heartbeat".to_vec()]);

    frontend.assert_no_incoming();

    log::info!("Shutting down the kernel");
    frontend.send_control(ShutdownRequest { restart: false });
    assert_matches!(frontend.recv_control(), Message::ShutdownReply(_));
    handle.wait().unwrap();
}
