/*
 * exception.rs
 *
 * Copyright (C) 2022 Posit Software, PBC. All rights reserved.
 *
 */

use serde::Deserialize;
use serde::Serialize;

/// Represents a runtime exception raised by the execution backend
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Exception {
    /// The name of the exception
    pub ename: String,

    /// The value/description of the exception
    pub evalue: String,

    /// List of traceback frames, as strings
    pub traceback: Vec<String>,
}

impl Exception {
    pub fn new(ename: impl Into<String>, evalue: impl Into<String>) -> Self {
        Self {
            ename: ename.into(),
            evalue: evalue.into(),
            traceback: vec![],
        }
    }

    pub fn internal_error(evalue: String) -> Self {
        Self::new("InternalError", evalue)
    }

    pub fn interrupted() -> Self {
        Self::new("KeyboardInterrupt", "Execution interrupted")
    }
}

impl From<&crate::Error> for Exception {
    fn from(error: &crate::Error) -> Self {
        match error {
            crate::Error::ShellErrorReply(exception) => exception.clone(),
            crate::Error::Interrupted => Self::interrupted(),
            crate::Error::StdinUnavailable(_) => Self::new("StdinNotImplementedError", error.to_string()),
            _ => Self::internal_error(error.to_string()),
        }
    }
}
