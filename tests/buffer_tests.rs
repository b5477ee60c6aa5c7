//! Serial Line Buffer Tests
//!
//! Tests line assembly from arbitrary packet boundaries, terminator
//! handling and abandonment of overlong lines.
//! Run with: cargo test --no-default-features --features std --test buffer_tests

use lora_node::config::{MAX_LINE_LEN, SERIAL_BUFFER_SIZE};
use lora_node::serial::LineBuffer;

fn drain(buf: &mut LineBuffer) -> Vec<String> {
    std::iter::from_fn(|| buf.read_line().map(|line| line.as_str().to_owned())).collect()
}

// =============================================================================
// Basic Assembly Tests
// =============================================================================

#[test]
fn new_buffer_empty() {
    let mut buf = LineBuffer::new();
    assert_eq!(buf.available(), 0);
    assert_eq!(buf.read_line(), None);
}

#[test]
fn single_line() {
    let mut buf = LineBuffer::new();
    assert_eq!(buf.push(b"data 12.5,3.2\n"), 14);
    assert_eq!(drain(&mut buf), ["data 12.5,3.2"]);
}

#[test]
fn several_lines_in_one_packet() {
    let mut buf = LineBuffer::new();
    buf.push(b"help\ndata 1\nflash\n");
    assert_eq!(drain(&mut buf), ["help", "data 1", "flash"]);
}

#[test]
fn line_split_across_packets() {
    let mut buf = LineBuffer::new();
    for chunk in [&b"com"[..], b"mand upd", b"ate gain", b" 22\n"] {
        buf.push(chunk);
    }
    assert_eq!(drain(&mut buf), ["command update gain 22"]);
}

#[test]
fn partial_line_is_kept() {
    let mut buf = LineBuffer::new();
    buf.push(b"done\npart");
    assert_eq!(drain(&mut buf), ["done"]);
    assert_eq!(buf.available(), 4);
}

#[test]
fn carriage_returns_dropped() {
    let mut buf = LineBuffer::new();
    buf.push(b"a\r\nb\rc\r\n");
    assert_eq!(drain(&mut buf), ["a", "bc"]);
}

#[test]
fn empty_and_blank_lines_skipped() {
    let mut buf = LineBuffer::new();
    buf.push(b"\n\n  \t\nhelp\n\r\n");
    assert_eq!(drain(&mut buf), ["help"]);
}

#[test]
fn invalid_utf8_line_skipped() {
    let mut buf = LineBuffer::new();
    buf.push(&[0xFF, 0xFE, b'\n']);
    buf.push(b"ok\n");
    assert_eq!(drain(&mut buf), ["ok"]);
}

#[test]
fn clear_discards_pending() {
    let mut buf = LineBuffer::new();
    buf.push(b"half a li");
    buf.clear();
    buf.push(b"ne\nwhole\n");
    assert_eq!(drain(&mut buf), ["ne", "whole"]);
}

// =============================================================================
// Overflow Tests
// =============================================================================

#[test]
fn longest_line_accepted() {
    let mut buf = LineBuffer::new();
    let line = "x".repeat(MAX_LINE_LEN);
    buf.push(line.as_bytes());
    buf.push(b"\n");
    assert_eq!(drain(&mut buf), [line]);
}

#[test]
fn terminated_overlong_line_dropped() {
    let mut buf = LineBuffer::new();
    let line = "x".repeat(MAX_LINE_LEN + 1);
    buf.push(line.as_bytes());
    buf.push(b"\nnext\n");
    assert_eq!(drain(&mut buf), ["next"]);
}

#[test]
fn unterminated_overlong_line_abandoned() {
    let mut buf = LineBuffer::new();
    buf.push(&[b'x'; MAX_LINE_LEN + 10]);
    assert_eq!(buf.read_line(), None);
    assert_eq!(buf.available(), 0);

    // The rest of the abandoned line is discarded up to its terminator
    buf.push(b"still the same line\nhelp\n");
    assert_eq!(drain(&mut buf), ["help"]);
}

#[test]
fn push_stops_when_full() {
    let mut buf = LineBuffer::new();
    assert_eq!(buf.push(&[b'x'; SERIAL_BUFFER_SIZE + 44]), SERIAL_BUFFER_SIZE);
    assert_eq!(buf.read_line(), None);
    // Abandoned: the leftover bytes are swallowed
    assert_eq!(buf.push(&[b'x'; 44]), 44);
    assert_eq!(buf.available(), 0);
}

#[test]
fn long_stream_compacts() {
    let mut buf = LineBuffer::new();
    for i in 0..1_000 {
        let line = format!("data {i}\n");
        assert_eq!(buf.push(line.as_bytes()), line.len());
        assert_eq!(buf.read_line().as_deref(), Some(&line[..line.len() - 1]));
    }
    assert_eq!(buf.available(), 0);
}

#[test]
fn many_lines_before_read() {
    let mut buf = LineBuffer::new();
    let mut expected = Vec::new();
    for i in 0..20 {
        let line = format!("status {i}");
        buf.push(line.as_bytes());
        buf.push(b"\n");
        expected.push(line);
    }
    assert_eq!(drain(&mut buf), expected);
}
