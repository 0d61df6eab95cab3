/*
 * mod.rs
 *
 * Copyright (C) 2022 Posit Software, PBC. All rights reserved.
 *
 */

pub mod comm;
pub mod control;
pub mod dispatcher;
pub mod heartbeat;
pub mod iopub;
pub mod memory;
pub mod shell;
pub mod socket;
pub mod stdin;
pub mod transport;
