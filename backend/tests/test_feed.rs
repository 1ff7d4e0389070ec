//! Feed cursor tests
//!
//! End-of-data policies, sorting and the delimited file source.

use queuesim_core_rs::feed::{
    parse_number, DelimitedFile, EofPolicy, FeedCursor, FeedError, FeedRead, FeedSettings,
    MemoryTable, RowSource, SortMode,
};
use std::fs;
use std::path::PathBuf;
use uuid::Uuid;

// ============================================================================
// Test Helpers
// ============================================================================

fn values() -> MemoryTable {
    MemoryTable::single_column("amount", &["10", "20", "30"])
}

fn read_all(cursor: &mut FeedCursor, n: usize) -> Vec<FeedRead> {
    (0..n).map(|_| cursor.next()).collect()
}

fn value(s: &str) -> FeedRead {
    FeedRead::Value(s.to_string())
}

fn temp_file(contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("queuesim-feed-{}.csv", Uuid::new_v4()));
    fs::write(&path, contents).unwrap();
    path
}

// ============================================================================
// EOF policies
// ============================================================================

#[test]
fn test_loop_returns_first_row_after_last() {
    let mut cursor = FeedCursor::open(&values(), FeedSettings::new("amount", EofPolicy::Loop));
    assert_eq!(
        read_all(&mut cursor, 5),
        vec![value("10"), value("20"), value("30"), value("10"), value("20")]
    );
    assert!(cursor.is_exhausted());
}

#[test]
fn test_skip_after_last_row() {
    let mut cursor = FeedCursor::open(&values(), FeedSettings::new("amount", EofPolicy::Skip));
    assert_eq!(
        read_all(&mut cursor, 5),
        vec![value("10"), value("20"), value("30"), FeedRead::Skip, FeedRead::Skip]
    );
}

#[test]
fn test_default_value_every_time_once_exhausted() {
    let mut settings = FeedSettings::new("amount", EofPolicy::DefaultValue);
    settings.default_value = "0".into();
    let mut cursor = FeedCursor::open(&values(), settings);
    assert_eq!(
        read_all(&mut cursor, 5),
        vec![value("10"), value("20"), value("30"), value("0"), value("0")]
    );
}

#[test]
fn test_terminate_after_last_row() {
    let mut cursor = FeedCursor::open(&values(), FeedSettings::new("amount", EofPolicy::Terminate));
    read_all(&mut cursor, 3);
    assert!(!cursor.is_exhausted());
    assert_eq!(cursor.next(), FeedRead::Terminate);
    assert!(cursor.is_exhausted());
}

#[test]
fn test_empty_table_loop_behaves_as_skip() {
    let empty = MemoryTable::single_column("amount", &[]);
    let mut cursor = FeedCursor::open(&empty, FeedSettings::new("amount", EofPolicy::Loop));
    assert!(cursor.is_empty());
    assert_eq!(cursor.next(), FeedRead::Skip);
    assert_eq!(cursor.next(), FeedRead::Skip);
}

// ============================================================================
// Open failures
// ============================================================================

#[test]
fn test_unknown_column_maps_onto_policy() {
    let mut cursor = FeedCursor::open(&values(), FeedSettings::new("missing", EofPolicy::Terminate));
    assert_eq!(
        cursor.open_error(),
        Some(&FeedError::UnknownColumn("missing".into()))
    );
    assert!(cursor.is_exhausted());
    assert_eq!(cursor.next(), FeedRead::Terminate);

    let mut cursor = FeedCursor::open(&values(), FeedSettings::new("missing", EofPolicy::Skip));
    assert_eq!(cursor.next(), FeedRead::Skip);
}

#[test]
fn test_missing_file_maps_onto_policy() {
    let file = DelimitedFile::new(std::env::temp_dir().join("queuesim-does-not-exist.csv"));
    let mut settings = FeedSettings::new("v", EofPolicy::DefaultValue);
    settings.default_value = "7".into();
    let mut cursor = FeedCursor::open(&file, settings);

    assert!(matches!(cursor.open_error(), Some(FeedError::Io { .. })));
    assert_eq!(cursor.next(), value("7"));
}

#[test]
fn test_ragged_memory_table_rejected() {
    let table = MemoryTable::new(
        vec!["a".into(), "b".into()],
        vec![vec!["1".into(), "2".into()], vec!["3".into()]],
    );
    assert_eq!(
        table.load().unwrap_err(),
        FeedError::RaggedRow {
            row: 1,
            found: 1,
            expected: 2
        }
    );
}

// ============================================================================
// Sorting
// ============================================================================

#[test]
fn test_sorted_by_other_column() {
    let table = MemoryTable::new(
        vec!["name".into(), "priority".into()],
        vec![
            vec!["c".into(), "10".into()],
            vec!["a".into(), "2".into()],
            vec!["b".into(), "9".into()],
        ],
    );

    let mut settings = FeedSettings::new("name", EofPolicy::Skip);
    settings.sort_column = Some("priority".into());
    settings.sort = SortMode::Ascending;
    let mut cursor = FeedCursor::open(&table, settings.clone());
    // Numeric order, not text order
    assert_eq!(read_all(&mut cursor, 3), vec![value("a"), value("b"), value("c")]);

    settings.sort = SortMode::Descending;
    let mut cursor = FeedCursor::open(&table, settings);
    assert_eq!(read_all(&mut cursor, 3), vec![value("c"), value("b"), value("a")]);
}

#[test]
fn test_close_releases_rows() {
    let mut cursor = FeedCursor::open(&values(), FeedSettings::new("amount", EofPolicy::Loop));
    cursor.next();
    cursor.close();
    assert!(cursor.is_closed());
    assert!(cursor.is_empty());
}

// ============================================================================
// Delimited files
// ============================================================================

#[test]
fn test_delimited_file_round_trip() {
    let path = temp_file("day;demand\n1;12,5\n2;8\n3;\n");
    let file = DelimitedFile::new(path.clone());
    let mut cursor = FeedCursor::open(&file, FeedSettings::new("Demand", EofPolicy::Skip));
    fs::remove_file(&path).unwrap();

    assert!(cursor.open_error().is_none());
    assert_eq!(cursor.len(), 3);
    let reads = read_all(&mut cursor, 4);
    assert_eq!(reads, vec![value("12,5"), value("8"), value(""), FeedRead::Skip]);
}

#[test]
fn test_parse_number_accepts_decimal_comma() {
    assert_eq!(parse_number(" 12.5 ").unwrap(), 12.5);
    assert_eq!(parse_number("12,5").unwrap(), 12.5);
    assert_eq!(
        parse_number("n/a").unwrap_err(),
        FeedError::NotANumber("n/a".into())
    );
}

#[test]
fn test_settings_from_json() {
    let settings: FeedSettings =
        serde_json::from_str(r#"{"load_column": "v", "eof": "loop", "sort": "descending"}"#).unwrap();
    assert_eq!(settings.eof, EofPolicy::Loop);
    assert_eq!(settings.sort, SortMode::Descending);
    assert_eq!(settings.sort_column, None);
}
