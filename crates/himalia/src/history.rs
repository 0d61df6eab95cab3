/*
 * history.rs
 *
 * Copyright (C) 2024 Posit Software, PBC. All rights reserved.
 *
 */

use std::collections::HashSet;

use log::warn;
use regex::Regex;

use crate::wire::history_reply::HistoryEntry;
use crate::wire::history_request::HistAccessType;
use crate::wire::history_request::HistoryRequest;

/// Number of entries a `tail` request returns when it doesn't say.
const DEFAULT_TAIL_LENGTH: usize = 10;

#[derive(Debug, Clone)]
struct HistoryRecord {
    line: u32,
    input: String,
    output: Option<String>,
}

/// The inputs executed in this session, along with the plain text of their
/// results. Lines are execution counts.
#[derive(Debug, Default)]
pub struct History {
    records: Vec<HistoryRecord>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, line: u32, input: &str, output: Option<String>) {
        self.records.push(HistoryRecord {
            line,
            input: String::from(input),
            output,
        });
    }

    /// Answers a `history_request`. Only the current session (0) has a
    /// history; requests for other sessions get no entries.
    pub fn query(&self, request: &HistoryRequest) -> Vec<HistoryEntry> {
        let records = match request.hist_access_type {
            HistAccessType::Tail => {
                let n = request.n.map_or(DEFAULT_TAIL_LENGTH, |n| n as usize);
                self.tail(n)
            },
            HistAccessType::Range => {
                if request.session != 0 {
                    return vec![];
                }
                self.range(request.start, request.stop)
            },
            HistAccessType::Search => {
                let pattern = request.pattern.as_deref().unwrap_or("*");
                self.search(pattern, request.n.map(|n| n as usize), request.unique)
            },
        };

        records
            .into_iter()
            .map(|record| match request.output {
                true => HistoryEntry::InputOutput(
                    0,
                    record.line,
                    (record.input.clone(), record.output.clone()),
                ),
                false => HistoryEntry::Input(0, record.line, record.input.clone()),
            })
            .collect()
    }

    fn tail(&self, n: usize) -> Vec<&HistoryRecord> {
        let skip = self.records.len().saturating_sub(n);
        self.records.iter().skip(skip).collect()
    }

    fn range(&self, start: u32, stop: Option<u32>) -> Vec<&HistoryRecord> {
        self.records
            .iter()
            .filter(|record| record.line >= start)
            .filter(|record| stop.is_none_or(|stop| record.line < stop))
            .collect()
    }

    fn search(&self, pattern: &str, n: Option<usize>, unique: bool) -> Vec<&HistoryRecord> {
        let glob = match glob_regex(pattern) {
            Ok(glob) => glob,
            Err(err) => {
                warn!("Invalid history search pattern '{pattern}': {err}");
                return vec![];
            },
        };

        let mut matches: Vec<&HistoryRecord> = self
            .records
            .iter()
            .filter(|record| glob.is_match(&record.input))
            .collect();

        if unique {
            // Keep the most recent occurrence of each input
            let mut seen = HashSet::new();
            matches.reverse();
            matches.retain(|record| seen.insert(record.input.as_str()));
            matches.reverse();
        }

        if let Some(n) = n {
            let skip = matches.len().saturating_sub(n);
            matches.drain(..skip);
        }
        matches
    }
}

/// Translates a glob pattern into an anchored regex. `*` stands for any
/// sequence of characters, `?` for exactly one, and `[...]` for one character
/// of a set, which may hold ranges like `a-z` and is negated by a leading `!`
/// or `^`. A `[` without a closing `]` is matched literally.
pub fn glob_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut translated = String::from("(?s)^");

    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => translated.push_str(".*"),
            '?' => translated.push('.'),
            '[' => match set_end(&chars, i) {
                Some(end) => {
                    push_set(&mut translated, &chars[i + 1..end]);
                    i = end;
                },
                None => translated.push_str(r"\["),
            },
            c => translated.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
        i += 1;
    }

    translated.push('$');
    Regex::new(&translated)
}

/// Finds the `]` closing the set opened at `start`. A `]` first in the set
/// is a member, not the end.
fn set_end(chars: &[char], start: usize) -> Option<usize> {
    let mut i = start + 1;
    if matches!(chars.get(i), Some(&('!' | '^'))) {
        i += 1;
    }
    if chars.get(i) == Some(&']') {
        i += 1;
    }
    (i..chars.len()).find(|&j| chars[j] == ']')
}

fn push_set(translated: &mut String, members: &[char]) {
    translated.push('[');
    let members = match members.split_first() {
        Some((&('!' | '^'), rest)) => {
            translated.push('^');
            rest
        },
        _ => members,
    };
    for &c in members {
        if matches!(c, '\\' | '[' | ']' | '^' | '&' | '~') {
            translated.push('\\');
        }
        translated.push(c);
    }
    translated.push(']');
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(hist_access_type: HistAccessType) -> HistoryRequest {
        HistoryRequest {
            output: false,
            raw: true,
            hist_access_type,
            session: 0,
            start: 0,
            stop: None,
            n: None,
            pattern: None,
            unique: false,
        }
    }

    fn history() -> History {
        let mut history = History::new();
        history.record(1, "x = 1", None);
        history.record(2, "x + 1", Some(String::from("2")));
        history.record(3, "print(x)", None);
        history.record(4, "x + 1", Some(String::from("2")));
        history
    }

    fn lines(entries: &[HistoryEntry]) -> Vec<u32> {
        entries.iter().map(HistoryEntry::line).collect()
    }

    fn glob_match(pattern: &str, text: &str) -> bool {
        glob_regex(pattern).unwrap().is_match(text)
    }

    #[test]
    fn test_glob_match() {
        assert!(glob_match("*", ""));
        assert!(glob_match("x*", "x + 1"));
        assert!(glob_match("?rint(*)", "print(x)"));
        assert!(!glob_match("x", "x + 1"));
        assert!(!glob_match("?", ""));
        assert!(glob_match("*1", "x = 1"));
        assert!(glob_match("*", "a\nb"));

        // Regex syntax is matched literally
        assert!(glob_match("x + 1", "x + 1"));
        assert!(!glob_match("x.1", "x+1"));
    }

    #[test]
    fn test_glob_sets() {
        assert!(glob_match("[xp]*", "x = 1"));
        assert!(glob_match("[xp]*", "print(x)"));
        assert!(!glob_match("[xp]*", "y = 1"));

        assert!(glob_match("[a-z]rint*", "print(x)"));
        assert!(!glob_match("[a-o]rint*", "print(x)"));

        assert!(glob_match("[^x]*", "print(x)"));
        assert!(glob_match("[!x]*", "print(x)"));
        assert!(!glob_match("[^x]*", "x = 1"));

        // A leading `]` is a member; an unclosed `[` is literal
        assert!(glob_match("[]]", "]"));
        assert!(glob_match("x[0", "x[0"));
        assert!(glob_match("[[]*", "[1]"));
    }

    #[test]
    fn test_search_with_invalid_pattern() {
        let history = history();
        let mut req = request(HistAccessType::Search);
        req.pattern = Some(String::from("[z-a]*"));
        assert!(history.query(&req).is_empty());
    }

    #[test]
    fn test_tail() {
        let history = history();
        let mut req = request(HistAccessType::Tail);
        req.n = Some(2);
        assert_eq!(lines(&history.query(&req)), vec![3, 4]);

        req.n = Some(100);
        assert_eq!(lines(&history.query(&req)), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_range() {
        let history = history();
        let mut req = request(HistAccessType::Range);
        req.start = 2;
        req.stop = Some(4);
        assert_eq!(lines(&history.query(&req)), vec![2, 3]);

        req.stop = None;
        assert_eq!(lines(&history.query(&req)), vec![2, 3, 4]);

        req.session = -1;
        assert!(history.query(&req).is_empty());
    }

    #[test]
    fn test_search() {
        let history = history();
        let mut req = request(HistAccessType::Search);
        req.pattern = Some(String::from("x*"));
        assert_eq!(lines(&history.query(&req)), vec![1, 2, 4]);

        req.unique = true;
        assert_eq!(lines(&history.query(&req)), vec![1, 4]);

        req.n = Some(1);
        assert_eq!(lines(&history.query(&req)), vec![4]);
    }

    #[test]
    fn test_output_pairs() {
        let history = history();
        let mut req = request(HistAccessType::Tail);
        req.output = true;
        req.n = Some(1);
        assert_eq!(history.query(&req), vec![HistoryEntry::InputOutput(
            0,
            4,
            (String::from("x + 1"), Some(String::from("2")))
        )]);
    }
}
