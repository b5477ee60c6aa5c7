//! Data Log Tests
//!
//! Tests session markers, capacity accounting, line reads and removal over
//! the in-memory backend.
//! Run with: cargo test --no-default-features --features std --test storage_tests

use heapless::Vec;

use lora_node::storage::{
    DataLog, LogStats, MemoryStorage, MAX_LOG_LINE, SESSION_MARKER, TORN_BYTE,
};

fn opened<const N: usize>() -> DataLog<MemoryStorage<N>> {
    let mut log = DataLog::new(MemoryStorage::<N>::new());
    assert!(log.begin());
    log
}

fn lines<const N: usize>(log: &mut DataLog<MemoryStorage<N>>) -> std::vec::Vec<std::string::String> {
    let mut cursor = 0;
    let mut line: Vec<u8, MAX_LOG_LINE> = Vec::new();
    let mut out = std::vec::Vec::new();
    while log.read_line(&mut cursor, &mut line) {
        out.push(std::string::String::from_utf8(line.to_vec()).unwrap());
    }
    out
}

// =============================================================================
// Session Tests
// =============================================================================

#[test]
fn begin_writes_marker() {
    let log = opened::<256>();
    assert!(log.is_mounted());
    assert_eq!(log.storage().contents(), b"New Log\n");
}

#[test]
fn begin_twice_does_not_stack_markers() {
    let mut log = opened::<256>();
    assert!(log.begin());
    assert_eq!(log.storage().contents(), b"New Log\n");
}

#[test]
fn begin_after_data_adds_marker() {
    let mut log = opened::<256>();
    assert!(log.write_line("12.5,3.2"));
    assert!(log.begin());
    assert_eq!(log.storage().contents(), b"New Log\n12.5,3.2\nNew Log\n");
}

#[test]
fn begin_formats_unformatted_store() {
    let mut log = DataLog::new(MemoryStorage::<256>::unformatted());
    assert!(log.begin());
    assert!(log.is_mounted());
    assert_eq!(log.storage().contents(), b"New Log\n");
}

#[test]
fn unmounted_log_refuses_everything() {
    let mut log = DataLog::new(MemoryStorage::<256>::new());
    assert!(!log.write_line("data"));
    assert!(!log.remove_file());
    let mut cursor = 0;
    let mut line: Vec<u8, 16> = Vec::new();
    assert!(!log.read_line(&mut cursor, &mut line));
}

// =============================================================================
// Capacity Tests
// =============================================================================

#[test]
fn stats_track_usage() {
    let mut log = opened::<256>();
    assert_eq!(
        log.stats(),
        LogStats {
            total: 256,
            used: SESSION_MARKER.len() + 1,
            free: 256 - SESSION_MARKER.len() - 1,
        }
    );
    log.write_line("abc");
    assert_eq!(log.stats().used, SESSION_MARKER.len() + 1 + 4);
    assert_eq!(log.file_len(), log.stats().used);
}

#[test]
fn write_refused_when_it_would_fill_the_store() {
    // 8 bytes of marker leave 24 free
    let mut log = opened::<32>();
    assert_eq!(log.stats().free, 24);

    let exact = "x".repeat(23);
    assert!(!log.write_line(&exact));
    assert_eq!(log.file_len(), 8);

    let fits = "x".repeat(22);
    assert!(log.write_line(&fits));
    assert_eq!(log.stats().free, 1);
    assert!(!log.write_line(""));
}

#[test]
fn overlong_line_refused() {
    let mut log = opened::<1024>();
    let long = "y".repeat(MAX_LOG_LINE + 1);
    assert!(!log.write_line(&long));

    let longest = "y".repeat(MAX_LOG_LINE);
    assert!(log.write_line(&longest));
}

// =============================================================================
// Read Tests
// =============================================================================

#[test]
fn read_lines_in_order() {
    let mut log = opened::<256>();
    log.write_line("first");
    log.write_line("second");
    log.write_line("status ID:1 RSSI:-40");
    assert_eq!(
        lines(&mut log),
        ["New Log", "first", "second", "status ID:1 RSSI:-40"]
    );
}

#[test]
fn read_line_advances_cursor() {
    let mut log = opened::<256>();
    log.write_line("abc");

    let mut cursor = 0;
    let mut line: Vec<u8, 32> = Vec::new();
    assert!(log.read_line(&mut cursor, &mut line));
    assert_eq!(cursor, 8);
    assert!(log.read_line(&mut cursor, &mut line));
    assert_eq!(line.as_slice(), b"abc");
    assert_eq!(cursor, 12);
    assert!(!log.read_line(&mut cursor, &mut line));
}

#[test]
fn read_skips_lines_longer_than_buffer() {
    let mut log = opened::<256>();
    log.write_line("abc");

    // "New Log" does not fit four bytes and is skipped
    let mut cursor = 0;
    let mut line: Vec<u8, 4> = Vec::new();
    assert!(log.read_line(&mut cursor, &mut line));
    assert_eq!(line.as_slice(), b"abc");
}

#[test]
fn read_lines_across_chunks() {
    let mut log = opened::<512>();
    let long = "z".repeat(100);
    log.write_line(&long);
    log.write_line("tail");
    assert_eq!(lines(&mut log), ["New Log", long.as_str(), "tail"]);
}

// =============================================================================
// Removal Tests
// =============================================================================

#[test]
fn remove_empties_file() {
    let mut log = opened::<256>();
    log.write_line("data");
    assert!(log.remove_file());
    assert_eq!(log.file_len(), 0);
    assert_eq!(log.stats().free, 256);
    assert!(lines(&mut log).is_empty());
}

#[test]
fn begin_after_remove_starts_new_session() {
    let mut log = opened::<256>();
    log.write_line("data");
    log.remove_file();
    assert!(log.begin());
    assert_eq!(log.storage().contents(), b"New Log\n");
}

// =============================================================================
// Torn Append Tests
// =============================================================================

#[test]
fn failed_append_is_sealed_and_skipped() {
    let mut log = opened::<256>();
    assert!(log.write_line("one"));
    log.storage_mut().fail_next_append_after(3);
    assert!(!log.write_line("second line"));
    assert_eq!(log.storage().contents(), b"New Log\none\nsec\x18\n");

    assert!(log.write_line("three"));
    assert_eq!(lines(&mut log), ["New Log", "one", "three"]);
}

#[test]
fn torn_tail_sealed_at_begin() {
    let mut log = DataLog::new(MemoryStorage::<256>::with_contents(b"New Log\nhalf a li"));
    assert!(log.begin());
    assert_eq!(
        log.storage().contents(),
        b"New Log\nhalf a li\x18\nNew Log\n"
    );
    assert_eq!(lines(&mut log), ["New Log", "New Log"]);
}

#[test]
fn clean_tail_left_alone_at_begin() {
    let mut log = DataLog::new(MemoryStorage::<256>::with_contents(b"New Log\nx\n"));
    assert!(log.begin());
    assert!(!log.storage().contents().contains(&TORN_BYTE));
    assert_eq!(lines(&mut log), ["New Log", "x", "New Log"]);
}
