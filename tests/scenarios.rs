//! End-to-end scenarios, at a reduced-but-representative scale.

use bitable::{BitableError, BitableReader, BitableWriter, CloseOption, FindOp, OpenHint};
use std::path::Path;
use std::sync::Once;

static LOG_INIT: Once = Once::new();

fn init_logging() {
    LOG_INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

fn le4(v: i32) -> [u8; 4] {
    v.to_le_bytes()
}

/// Scenario 1: an empty table still has one leaf page and depth 0.
#[test]
fn empty_table() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("empty");

    let writer = BitableWriter::create(&base, 4096, 4, 4).unwrap();
    writer.close(CloseOption::None).unwrap();

    let reader = BitableReader::open(
        &base,
        OpenHint::None,
        bitable::LexicographicComparator,
    )
    .unwrap();
    assert!(reader.first().is_none());
    let stats = reader.stats();
    assert_eq!(stats.item_count, 0);
    assert_eq!(stats.depth, 0);
    assert_eq!(stats.leaf_pages, 1);
}

/// Scenario 2: small i32 keys with inline 4-byte values, at reduced scale
/// (8,192 pairs rather than 524,288) to keep the test fast.
#[test]
fn small_keys_inline_values() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("small");

    let count = 8192i32;
    let mut writer = BitableWriter::create(&base, 4096, 4, 4).unwrap();
    for k in (0..count * 2).step_by(2) {
        writer.append(&le4(k), &le4(k)).unwrap();
    }
    writer.close(CloseOption::None).unwrap();

    let reader = BitableReader::open(
        &base,
        OpenHint::None,
        bitable::LexicographicComparator,
    )
    .unwrap();

    let mut cursor = reader.first();
    let mut seen = 0;
    while let Some(c) = cursor {
        let k = i32::from_le_bytes(reader.key(&c).unwrap().try_into().unwrap());
        let v = i32::from_le_bytes(reader.value(&c).unwrap().try_into().unwrap());
        assert_eq!(k, v);
        assert_eq!(k, seen * 2);
        seen += 1;
        cursor = reader.next(&c);
    }
    assert_eq!(seen, count);

    for q in (1..count * 2).step_by(2).take(500) {
        let upper = reader.find(&le4(q), FindOp::Upper).unwrap().unwrap();
        assert_eq!(
            i32::from_le_bytes(reader.key(&upper).unwrap().try_into().unwrap()),
            q - 1
        );
        let lower = reader.find(&le4(q), FindOp::Lower).unwrap().unwrap();
        assert_eq!(
            i32::from_le_bytes(reader.key(&lower).unwrap().try_into().unwrap()),
            q + 1
        );
    }

    assert!(reader
        .find(&le4(count * 2 + 1), FindOp::Lower)
        .unwrap()
        .is_none());
    assert!(reader.find(&le4(-1), FindOp::Upper).unwrap().is_none());
}

/// Scenario 3: large values triggering the side store, at reduced scale.
#[test]
fn large_values_trigger_side_store() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("large");

    let page_size = 4096u32;
    let mut writer = BitableWriter::create(&base, page_size, 4, 4).unwrap();
    let max_k = 512i32;
    for k in 0..max_k {
        let value: Vec<u8> = (0..=k).flat_map(i32::to_le_bytes).collect();
        writer.append(&le4(k), &value).unwrap();
    }
    writer.close(CloseOption::None).unwrap();

    let reader = BitableReader::open(
        &base,
        OpenHint::None,
        bitable::LexicographicComparator,
    )
    .unwrap();
    assert!(reader.stats().large_value_store_size > 0);

    let mut cursor = reader.first();
    let mut k = 0i32;
    while let Some(c) = cursor {
        let value = reader.value(&c).unwrap();
        let expected: Vec<u8> = (0..=k).flat_map(i32::to_le_bytes).collect();
        assert_eq!(value, expected.as_slice());
        k += 1;
        cursor = reader.next(&c);
    }
    assert_eq!(k, max_k);
}

/// Scenario 4: branch cascade over many keys, at reduced scale.
#[test]
fn branch_cascade() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("cascade");

    let total = 40_000i32;
    let mut writer = BitableWriter::create(&base, 2048, 4, 4).unwrap();
    for k in 0..total {
        writer.append(&le4(k), &le4(k)).unwrap();
    }
    writer.close(CloseOption::None).unwrap();

    let reader = BitableReader::open(
        &base,
        OpenHint::None,
        bitable::LexicographicComparator,
    )
    .unwrap();
    assert!(reader.stats().depth >= 2);

    let mut seen_indices: Vec<u64> = Vec::with_capacity(total as usize / 50);
    for k in (0..total).step_by(50) {
        let cursor = reader.find(&le4(k), FindOp::Exact).unwrap().unwrap();
        let indice = reader.indice(&cursor).unwrap();
        assert_eq!(indice, k as u64);
        seen_indices.push(indice);
    }
    let mut sorted = seen_indices.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(sorted.len(), seen_indices.len());
}

/// Scenario 5: durability ordering. A table truncated after the header
/// write but with the rest of the content present still opens fine; a
/// table whose leaf file never received a valid header fails to open.
#[test]
fn durability_of_header_write() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("durable");

    let mut writer = BitableWriter::create(&base, 4096, 4, 4).unwrap();
    for k in 0..1000i32 {
        writer.append(&le4(k), &le4(k)).unwrap();
    }
    writer.close(CloseOption::Durable).unwrap();

    // A clean close reopens fine.
    let reader = BitableReader::open(
        &base,
        OpenHint::None,
        bitable::LexicographicComparator,
    )
    .unwrap();
    assert_eq!(reader.stats().item_count, 1000);
    drop(reader);

    // Corrupting just the header (simulating a crash before step 6 of
    // finish_writes completed) must be rejected at open, never partially
    // accepted.
    corrupt_header_marker(&base);
    let result = BitableReader::open(&base, OpenHint::None, bitable::LexicographicComparator);
    assert!(matches!(result, Err(BitableError::HeaderCorrupt)));
}

fn corrupt_header_marker(base: &Path) {
    use std::io::{Seek, SeekFrom, Write};
    let mut file = std::fs::OpenOptions::new().write(true).open(base).unwrap();
    file.seek(SeekFrom::Start(0)).unwrap();
    file.write_all(&[0u8; 8]).unwrap();
}

/// Scenario 6: invalid inputs are rejected with the documented errors.
#[test]
fn invalid_inputs() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("invalid");

    assert!(matches!(
        BitableWriter::create(&base, 1024, 4, 4),
        Err(BitableError::PagesizeInvalid)
    ));
    assert!(matches!(
        BitableWriter::create(&base, 4096, 3, 4),
        Err(BitableError::AlignmentInvalid)
    ));

    let mut writer = BitableWriter::create(&base, 4096, 4, 4).unwrap();
    let oversized_key = vec![0u8; 800];
    assert!(matches!(
        writer.append(&oversized_key, b"v"),
        Err(BitableError::KeyInvalid)
    ));
    writer.append(&le4(1), &le4(1)).unwrap();
    writer.close(CloseOption::None).unwrap();

    let reader = BitableReader::open(
        &base,
        OpenHint::None,
        bitable::LexicographicComparator,
    )
    .unwrap();
    let bogus = bitable::Cursor {
        page: reader.stats().leaf_pages,
        item: 0,
    };
    assert!(matches!(
        reader.key(&bogus),
        Err(BitableError::InvalidCursorLocation)
    ));
}
