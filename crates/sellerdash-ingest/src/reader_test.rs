use super::*;
use sellerdash_core::{ReportType, TypeRegistry};

const BUSINESS_HEADER: &str = "store_id,date,sku,asin,title,sessions,units_ordered,ordered_product_sales,total_order_items,conversion_rate";

fn business_csv(rows: usize) -> String {
    let mut csv = format!("{BUSINESS_HEADER}\n");
    for i in 0..rows {
        csv.push_str(&format!(
            "1,2025-01-01,SKU{i},B00000000{i},Title,100,10,$500.00,15,0.15\n"
        ));
    }
    csv
}

fn registry() -> TypeRegistry {
    TypeRegistry::default()
}

fn encode_utf16le(text: &str, bom: bool) -> Vec<u8> {
    let mut bytes = if bom { vec![0xFF, 0xFE] } else { Vec::new() };
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_le_bytes());
    }
    bytes
}

// ---------------------------------------------------------------------------
// Encoding detection
// ---------------------------------------------------------------------------

#[test]
fn detects_utf8_with_and_without_bom() {
    assert_eq!(detect_encoding(b"\xEF\xBB\xBFa,b\n"), UTF_8);
    assert_eq!(detect_encoding("caf\u{e9},b\n".as_bytes()), UTF_8);
}

#[test]
fn truncated_multibyte_at_prefix_end_is_still_utf8() {
    // First byte of a two-byte sequence with its continuation cut off.
    assert_eq!(detect_encoding(b"abc\xC3"), UTF_8);
}

#[test]
fn detects_utf16_from_bom_and_nul_pattern() {
    assert_eq!(detect_encoding(&encode_utf16le("a,b\n", true)), UTF_16LE);
    assert_eq!(detect_encoding(&encode_utf16le("a,b\n", false)), UTF_16LE);
    assert_eq!(detect_encoding(&[0xFE, 0xFF, 0x00, 0x61]), UTF_16BE);
    assert_eq!(detect_encoding(&[0x00, 0x61, 0x00, 0x2C]), UTF_16BE);
}

#[test]
fn falls_back_to_windows_1252() {
    // 0xE9 is "é" in Windows-1252 and invalid as standalone UTF-8.
    assert_eq!(detect_encoding(b"caf\xE9,b\n"), WINDOWS_1252);
}

#[test]
fn transcodes_windows_1252_to_utf8() {
    let mut out = String::new();
    open_transcoded(&b"caf\xE9"[..])
        .unwrap()
        .read_to_string(&mut out)
        .unwrap();
    assert_eq!(out, "caf\u{e9}");
}

#[test]
fn strips_bom_before_header_parsing() {
    let mut bytes = vec![0xEF, 0xBB, 0xBF];
    bytes.extend_from_slice(business_csv(1).as_bytes());
    let descriptor = registry();
    let descriptor = descriptor.descriptor_for(ReportType::Business).unwrap();
    let reader = read_chunks(&bytes[..], descriptor, 10).unwrap();
    assert_eq!(reader.headers()[0], "store_id");
}

#[test]
fn utf16_file_reads_like_utf8() {
    let bytes = encode_utf16le(&business_csv(2), true);
    let registry = registry();
    let descriptor = registry.descriptor_for(ReportType::Business).unwrap();
    let chunks: Vec<RowChunk> = read_chunks(&bytes[..], descriptor, 10)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].rows[1].get("sku"), "SKU1");
}

#[test]
fn malformed_utf8_after_prefix_is_an_encoding_error() {
    let mut bytes = business_csv(1).into_bytes();
    bytes.resize(SNIFF_LEN + 10, b'\n');
    bytes.extend_from_slice(b"1,2025-01-01,SKU\xFF,B1,T,1,1,1,1,0.1\n");
    let registry = registry();
    let descriptor = registry.descriptor_for(ReportType::Business).unwrap();
    let results: Vec<_> = read_chunks(&bytes[..], descriptor, 1000).unwrap().collect();
    assert!(
        results
            .iter()
            .any(|r| matches!(r, Err(ReadError::Encoding { .. }))),
        "expected an encoding error, got {results:?}"
    );
}

// ---------------------------------------------------------------------------
// Header validation
// ---------------------------------------------------------------------------

#[test]
fn business_header_is_order_insensitive() {
    let registry = registry();
    let descriptor = registry.descriptor_for(ReportType::Business).unwrap();
    let csv = "conversion_rate,total_order_items,ordered_product_sales,units_ordered,sessions,title,asin,sku,date,store_id,extra\n\
               0.15,15,$500.00,10,100,Title,B000000001,SKU1,2025-01-01,1,x\n";
    let chunks: Vec<_> = read_chunks(csv.as_bytes(), descriptor, 10).unwrap().collect();
    let chunk = chunks[0].as_ref().unwrap();
    assert_eq!(chunk.rows[0].get("store_id"), "1");
    assert_eq!(chunk.rows[0].get("extra"), "x");
}

#[test]
fn missing_required_column_is_a_header_mismatch() {
    let registry = registry();
    let descriptor = registry.descriptor_for(ReportType::Business).unwrap();
    let csv = "store_id,date,sku\n1,2025-01-01,SKU1\n";
    let Err(ReadError::HeaderMismatch { missing, .. }) = read_chunks(csv.as_bytes(), descriptor, 10)
    else {
        panic!("expected header mismatch");
    };
    assert!(missing.contains(&"asin".to_string()));
    assert!(missing.contains(&"conversion_rate".to_string()));
}

#[test]
fn order_significant_header_must_match_exactly() {
    let registry = registry();
    let descriptor = registry.descriptor_for(ReportType::Returns).unwrap();
    let mut names = descriptor.column_names();
    names.swap(2, 3);
    let csv = format!("{}\n", names.join(","));
    let err = read_chunks(csv.as_bytes(), descriptor, 10).err().unwrap();
    let ReadError::HeaderMismatch { missing, .. } = err else {
        panic!("expected header mismatch, got {err:?}");
    };
    assert!(missing.is_empty(), "all columns present, only order differs");
}

#[test]
fn header_cells_are_trimmed() {
    let registry = registry();
    let descriptor = registry.descriptor_for(ReportType::Returns).unwrap();
    let header: Vec<String> = descriptor
        .column_names()
        .iter()
        .map(|c| format!(" {c} "))
        .collect();
    let csv = format!(
        "{}\n1,2025-01-01,ORD-1,SKU1,B1,T,1,Damaged,Pending,10.00,FBA,UPS,1Z999\n",
        header.join(",")
    );
    let reader = read_chunks(csv.as_bytes(), descriptor, 10).unwrap();
    assert_eq!(reader.headers()[1], "return_date");
}

// ---------------------------------------------------------------------------
// Chunking
// ---------------------------------------------------------------------------

#[test]
fn splits_rows_into_bounded_chunks_with_file_row_indexes() {
    let registry = registry();
    let descriptor = registry.descriptor_for(ReportType::Business).unwrap();
    let csv = business_csv(5);
    let chunks: Vec<RowChunk> = read_chunks(csv.as_bytes(), descriptor, 2)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    let sizes: Vec<usize> = chunks.iter().map(|c| c.rows.len()).collect();
    assert_eq!(sizes, vec![2, 2, 1]);
    assert_eq!(chunks[2].index, 2);
    assert_eq!(chunks[2].rows[0].row_index, 5);
}

#[test]
fn ragged_rows_read_missing_cells_as_empty() {
    let registry = registry();
    let descriptor = registry.descriptor_for(ReportType::Business).unwrap();
    let csv = format!("{BUSINESS_HEADER}\n1,2025-01-01,SKU1\n");
    let chunks: Vec<RowChunk> = read_chunks(csv.as_bytes(), descriptor, 10)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(chunks[0].rows[0].get("sku"), "SKU1");
    assert_eq!(chunks[0].rows[0].get("asin"), "");
}

#[test]
fn header_only_file_is_empty() {
    let registry = registry();
    let descriptor = registry.descriptor_for(ReportType::Business).unwrap();
    let csv = format!("{BUSINESS_HEADER}\n");
    let results: Vec<_> = read_chunks(csv.as_bytes(), descriptor, 10).unwrap().collect();
    assert_eq!(results.len(), 1);
    assert!(matches!(results[0], Err(ReadError::EmptyFile)));
}

#[test]
fn zero_byte_file_is_empty() {
    let registry = registry();
    let descriptor = registry.descriptor_for(ReportType::Business).unwrap();
    assert!(matches!(
        read_chunks(&b""[..], descriptor, 10),
        Err(ReadError::EmptyFile)
    ));
}

#[test]
fn count_rows_counts_data_rows_only() {
    assert_eq!(count_rows(business_csv(7).as_bytes()).unwrap(), 7);
    assert_eq!(count_rows(format!("{BUSINESS_HEADER}\n").as_bytes()).unwrap(), 0);
    assert!(matches!(count_rows(&b""[..]), Err(ReadError::EmptyFile)));
}
