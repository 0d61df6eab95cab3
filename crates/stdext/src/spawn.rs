//
// spawn.rs
//
// Copyright (C) 2022 Posit Software, PBC. All rights reserved.
//
//

/// Spawns a named thread and returns its join handle.
///
/// Thread names show up in debuggers and in panic messages, so every
/// long-lived thread of the kernel is spawned through this macro.
///
/// ```
/// let handle = stdext::spawn!("worker", || 40 + 2);
/// assert_eq!(handle.join().unwrap(), 42);
/// ```
#[macro_export]
macro_rules! spawn {
    ($name:expr, $body:expr) => {{
        std::thread::Builder::new()
            .name(String::from($name))
            .spawn($body)
            .unwrap()
    }};
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_spawn_names_thread() {
        let handle = crate::spawn!("stdext-test", || {
            std::thread::current().name().map(String::from)
        });
        assert_eq!(handle.join().unwrap().as_deref(), Some("stdext-test"));
    }
}
