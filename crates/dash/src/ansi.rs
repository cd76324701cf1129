// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ANSI/VT escape stripping for consumers that do not render a terminal.

use regex::Regex;

/// OSC strings (BEL or ST terminated), CSI sequences, single-character
/// escapes, and finally a bare ESC so that no escape byte survives a pass.
const ESCAPE_PATTERN: &str = r"\x1b(?:\][^\x07\x1b]*(?:\x07|\x1b\\)|\[[0-?]*[ -/]*[@-~]|[@-Z\x5C-_])?";

/// Longest unterminated escape tail held back between chunks.
const MAX_HELD_ESCAPE: usize = 64;

/// Strips terminal control sequences from decoded text.
#[derive(Debug, Clone)]
pub struct AnsiFilter {
    pattern: Regex,
}

impl AnsiFilter {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self { pattern: Regex::new(ESCAPE_PATTERN)? })
    }

    /// Remove escape sequences, leaving printable text and newlines intact.
    pub fn strip(&self, text: &str) -> String {
        self.pattern.replace_all(text, "").into_owned()
    }

    /// Lossily decode `bytes` and strip them in one step.
    pub fn strip_bytes(&self, bytes: &[u8]) -> String {
        self.strip(&String::from_utf8_lossy(bytes))
    }
}

/// Incremental decoder for a raw shell byte stream.
///
/// Multi-byte UTF-8 characters and escape sequences split across read
/// boundaries are carried into the next chunk instead of being mangled.
/// Invalid bytes decode to U+FFFD.
#[derive(Debug, Default)]
pub struct ShellDecoder {
    bytes: Vec<u8>,
    text: String,
}

impl ShellDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the next chunk, returning every character that is complete.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.bytes.extend_from_slice(chunk);
        let mut out = std::mem::take(&mut self.text);
        let consumed = decode_lossy_prefix(&self.bytes, &mut out);
        self.bytes.drain(..consumed);

        let cut = incomplete_escape_start(&out);
        self.text = out.split_off(cut);
        out
    }

    /// Flush anything held back, e.g. when the stream closes.
    pub fn finish(&mut self) -> String {
        let mut out = std::mem::take(&mut self.text);
        out.push_str(&String::from_utf8_lossy(&self.bytes));
        self.bytes.clear();
        out
    }
}

/// Append the decodable prefix of `buf` to `out`; returns bytes consumed.
/// A truncated character at the very end is left unconsumed.
fn decode_lossy_prefix(buf: &[u8], out: &mut String) -> usize {
    let mut rest = buf;
    loop {
        match std::str::from_utf8(rest) {
            Ok(s) => {
                out.push_str(s);
                return buf.len();
            }
            Err(e) => {
                let (valid, after) = rest.split_at(e.valid_up_to());
                out.push_str(&String::from_utf8_lossy(valid));
                match e.error_len() {
                    Some(n) => {
                        out.push(char::REPLACEMENT_CHARACTER);
                        rest = &after[n..];
                    }
                    None => return buf.len() - after.len(),
                }
            }
        }
    }
}

/// Byte offset where an unterminated trailing escape begins, or `text.len()`.
fn incomplete_escape_start(text: &str) -> usize {
    let Some(idx) = text.rfind('\x1b') else {
        return text.len();
    };
    let tail = &text[idx..];
    if tail.len() > MAX_HELD_ESCAPE {
        return text.len();
    }
    let body = &tail[1..];
    let incomplete = if body.is_empty() {
        true
    } else if let Some(params) = body.strip_prefix('[') {
        params.bytes().all(|b| (0x20..=0x3f).contains(&b))
    } else if let Some(osc) = body.strip_prefix(']') {
        !osc.contains('\x07')
    } else {
        false
    };
    if incomplete {
        idx
    } else {
        text.len()
    }
}

#[cfg(test)]
#[path = "ansi_tests.rs"]
mod tests;
