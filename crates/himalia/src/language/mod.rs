/*
 * mod.rs
 *
 * Copyright (C) 2022 Posit Software, PBC. All rights reserved.
 *
 */

pub mod backend;
pub mod control_handler;
