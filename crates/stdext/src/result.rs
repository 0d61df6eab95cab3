//
// result.rs
//
// Copyright (C) 2023 Posit Software, PBC. All rights reserved.
//
//

use std::fmt::Display;

pub trait ResultExt<T, E> {
    /// Calls the provided closure with the contained error (if [`Err`]).
    ///
    /// Consumes the Result, unlike `inspect_err()` which propagates it and
    /// still requires you to handle the Result in some way.
    fn on_err<F: FnOnce(E)>(self, f: F);
}

impl<T, E> ResultExt<T, E> for Result<T, E> {
    fn on_err<F: FnOnce(E)>(self, f: F) {
        if let Err(e) = self {
            f(e);
        }
    }
}

/// Consumes a Result whose error can't be propagated any further, leaving a
/// log record behind instead.
pub trait ResultOrLog {
    fn or_log_error(self, prefix: &str);
    fn or_log_warning(self, prefix: &str);
    fn or_log_info(self, prefix: &str);
}

impl<T, E: Display> ResultOrLog for Result<T, E> {
    fn or_log_error(self, prefix: &str) {
        self.on_err(|err| log::error!("{prefix}: {err}"));
    }

    fn or_log_warning(self, prefix: &str) {
        self.on_err(|err| log::warn!("{prefix}: {err}"));
    }

    fn or_log_info(self, prefix: &str) {
        self.on_err(|err| log::info!("{prefix}: {err}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_on_err_only_runs_on_errors() {
        let mut seen = Vec::new();
        Ok::<i32, String>(1).on_err(|err| seen.push(err));
        Err::<i32, String>(String::from("boom")).on_err(|err| seen.push(err));
        assert_eq!(seen, vec![String::from("boom")]);
    }
}
