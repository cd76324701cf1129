// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use proptest::prelude::*;

use super::{AnsiFilter, ShellDecoder};

fn filter() -> anyhow::Result<AnsiFilter> {
    Ok(AnsiFilter::new()?)
}

#[yare::parameterized(
    cursor_move   = { "\x1b[2;5HOK", "OK" },
    color         = { "\x1b[1;31mred\x1b[0m plain", "red plain" },
    private_mode  = { "\x1b[?2004hprompt$ ", "prompt$ " },
    osc_title_bel = { "\x1b]0;user@host: ~\x07$ ", "$ " },
    osc_title_st  = { "\x1b]2;title\x1b\\done", "done" },
    single_char   = { "a\x1bMb", "ab" },
    bare_escape   = { "tail\x1b", "tail" },
    keeps_lines   = { "one\r\ntwo\n", "one\r\ntwo\n" },
    plain         = { "nothing to strip", "nothing to strip" },
)]
fn strips(input: &str, expected: &str) {
    let Ok(filter) = AnsiFilter::new() else {
        unreachable!("escape pattern compiles");
    };
    assert_eq!(filter.strip(input), expected);
}

#[test]
fn strip_bytes_substitutes_invalid_utf8() -> anyhow::Result<()> {
    let filter = filter()?;
    let out = filter.strip_bytes(b"ok\xff\x1b[0m!");
    assert_eq!(out, "ok\u{FFFD}!");
    Ok(())
}

#[test]
fn nested_escape_residue_is_not_an_escape() -> anyhow::Result<()> {
    let filter = filter()?;
    let once = filter.strip("\x1b\x1b[0m[31m");
    assert!(!once.contains('\x1b'));
    assert_eq!(filter.strip(&once), once);
    Ok(())
}

#[test]
fn decoder_carries_split_utf8() {
    let mut decoder = ShellDecoder::new();
    let bytes = "héllo".as_bytes();
    // Split inside the two-byte 'é'.
    assert_eq!(decoder.decode(&bytes[..2]), "h");
    assert_eq!(decoder.decode(&bytes[2..]), "éllo");
    assert_eq!(decoder.finish(), "");
}

#[test]
fn decoder_holds_split_escape() -> anyhow::Result<()> {
    let filter = filter()?;
    let mut decoder = ShellDecoder::new();
    let first = decoder.decode(b"abc\x1b[3");
    assert_eq!(first, "abc");
    let second = decoder.decode(b"1mred");
    assert_eq!(filter.strip(&second), "red");
    Ok(())
}

#[test]
fn decoder_replaces_invalid_bytes_midstream() {
    let mut decoder = ShellDecoder::new();
    assert_eq!(decoder.decode(b"a\xffb"), "a\u{FFFD}b");
}

#[test]
fn decoder_finish_flushes_truncated_tail() {
    let mut decoder = ShellDecoder::new();
    assert_eq!(decoder.decode(b"x\xe2\x82"), "x");
    assert_eq!(decoder.finish(), "\u{FFFD}");
}

proptest! {
    #[test]
    fn strip_is_idempotent(input in "(\\PC|\x1b|\\[|;|[0-9]|\x07|\\]|\\\\)*") {
        let Ok(filter) = AnsiFilter::new() else {
            return Err(TestCaseError::fail("escape pattern compiles"));
        };
        let once = filter.strip(&input);
        prop_assert!(!once.contains('\x1b'));
        prop_assert_eq!(filter.strip(&once), once);
    }

    #[test]
    fn decoder_matches_whole_decode(text in "\\PC{0,40}", split in 0usize..64) {
        let bytes = text.as_bytes();
        let at = split.min(bytes.len());
        let mut decoder = ShellDecoder::new();
        let mut out = decoder.decode(&bytes[..at]);
        out.push_str(&decoder.decode(&bytes[at..]));
        out.push_str(&decoder.finish());
        prop_assert_eq!(out, text);
    }
}
