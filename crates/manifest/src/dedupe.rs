//! Pre-parse duplicate-key scan.
//!
//! `serde_json` (like most JSON parsers) silently lets a later key win when
//! an object re-declares one. This scanner walks the raw text itself,
//! tracking object-property names within a stack of nesting scopes keyed by
//! `{` depth, so a duplicate at *any* depth is caught before a lenient
//! parser can paper over it.

use std::collections::HashSet;

use crate::error::DuplicateKey;

enum Scope {
    Object { keys: HashSet<String>, expecting_key: bool },
    Array,
}

/// Scan raw JSON text for duplicate object keys.
///
/// Returns every `(line, key)` offense found, in the order encountered.
/// An empty result means the text is clean with respect to this check
/// (it says nothing about whether the text is otherwise valid JSON).
pub fn scan_duplicate_keys(text: &str) -> Vec<DuplicateKey> {
    let mut offenses = Vec::new();
    let mut stack: Vec<Scope> = Vec::new();
    let mut line = 1usize;

    let mut in_string = false;
    let mut escape = false;
    let mut buf = String::new();

    for ch in text.chars() {
        if ch == '\n' {
            line += 1;
        }

        if in_string {
            if escape {
                escape = false;
                buf.push(ch);
                continue;
            }
            match ch {
                '\\' => escape = true,
                '"' => {
                    in_string = false;
                    on_string_closed(&mut stack, &buf, line, &mut offenses);
                    buf.clear();
                }
                _ => buf.push(ch),
            }
            continue;
        }

        match ch {
            '"' => {
                in_string = true;
                buf.clear();
            }
            '{' => stack.push(Scope::Object {
                keys: HashSet::new(),
                expecting_key: true,
            }),
            '[' => stack.push(Scope::Array),
            '}' | ']' => {
                stack.pop();
            }
            ',' => {
                if let Some(Scope::Object { expecting_key, .. }) = stack.last_mut() {
                    *expecting_key = true;
                }
            }
            ':' => {
                if let Some(Scope::Object { expecting_key, .. }) = stack.last_mut() {
                    *expecting_key = false;
                }
            }
            _ => {}
        }
    }

    offenses
}

fn on_string_closed(
    stack: &mut [Scope],
    key: &str,
    line: usize,
    offenses: &mut Vec<DuplicateKey>,
) {
    if let Some(Scope::Object { keys, expecting_key }) = stack.last_mut() {
        if *expecting_key {
            if !keys.insert(key.to_string()) {
                offenses.push(DuplicateKey {
                    line,
                    key: key.to_string(),
                });
            }
        }
    }
}
