/*
 * mod.rs
 *
 * Copyright (C) 2023 Posit Software, PBC. All rights reserved.
 *
 */

pub mod comm_manager;
pub mod event;
