/*
 * lib.rs
 *
 * Copyright (C) 2022 Posit Software, PBC. All rights reserved.
 *
 */

pub mod comm;
pub mod config;
pub mod connection_file;
pub mod error;
pub mod execution;
pub mod fixtures;
pub mod history;
pub mod kernel;
pub mod kernel_state;
pub mod language;
pub mod session;
pub mod socket;
pub mod wire;

pub use error::Error;
pub type Result<T> = std::result::Result<T, error::Error>;
