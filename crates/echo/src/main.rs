/*
 * main.rs
 *
 * Copyright (C) 2022 Posit Software, PBC. All rights reserved.
 *
 */

mod backend;

use himalia::config::KernelConfig;
use himalia::connection_file::ConnectionFile;
use himalia::kernel::Kernel;
use himalia::session::Session;

use crate::backend::EchoBackend;

fn start_kernel(connection_file: ConnectionFile, config: KernelConfig) -> himalia::Result<()> {
    let session = Session::from_connection_file(&connection_file, config.allow_unsigned)?;

    let handle = Kernel::new("echo", session, Box::new(EchoBackend::default()))
        .with_config(config)
        .connect(&connection_file)?;

    println!("Kernel activated, waiting for the frontend to shut it down");

    // Returns once a `shutdown_request` has been handled
    handle.wait()
}

fn usage() {
    println!("Usage: echo --connection_file /path/to/file [--config /path/to/config.json]");
}

fn main() {
    // Initialize logging system; the env_logger lets you configure logging with
    // the RUST_LOG env var
    env_logger::init();

    // Get an iterator over all the command-line arguments
    let mut argv = std::env::args();

    // Skip the first "argument" as it's the path/name to this executable
    argv.next();

    let mut connection_file: Option<String> = None;
    let mut config_file: Option<String> = None;

    // Process remaining arguments
    while let Some(arg) = argv.next() {
        match arg.as_str() {
            "--connection_file" => {
                connection_file = argv.next();
                if connection_file.is_none() {
                    eprintln!(
                        "A connection file must be specified with the --connection_file argument."
                    );
                    return;
                }
            },
            "--config" => {
                config_file = argv.next();
                if config_file.is_none() {
                    eprintln!("A path must be specified with the --config argument.");
                    return;
                }
            },
            "--version" => {
                println!("Echo {}", env!("CARGO_PKG_VERSION"));
                return;
            },
            other => {
                eprintln!("Argument '{other}' unknown");
                usage();
                return;
            },
        }
    }

    let Some(connection_file) = connection_file else {
        usage();
        return;
    };

    let connection_file = match ConnectionFile::from_file(&connection_file) {
        Ok(file) => file,
        Err(err) => {
            eprintln!("Couldn't read connection file: {err}");
            std::process::exit(1);
        },
    };

    let config = match config_file {
        Some(path) => match KernelConfig::from_file(&path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("Couldn't read kernel configuration: {err}");
                std::process::exit(1);
            },
        },
        None => KernelConfig::default(),
    };

    if let Err(err) = start_kernel(connection_file, config) {
        log::error!("Kernel exited with an error: {err}");
        std::process::exit(1);
    }
}
