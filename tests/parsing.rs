//! Unit tests for the section catalog, registry and codec building blocks.

use mud_file::catalog::*;
use mud_file::*;

#[test]
fn test_header_constants() {
    assert_eq!(header::SECTION_HEADER_SIZE, 12);
    assert_eq!(header::GROUP_COUNT_SIZE, 4);
}

#[test]
fn test_default_header_layout() {
    let layout = HeaderLayout::default();
    assert_eq!(layout.endian, Endian::Little);
    assert_eq!(
        layout.words(),
        [HeaderWord::Length, HeaderWord::TypeId, HeaderWord::Instance]
    );
    assert!(layout.group_count);
}

#[test]
fn test_field_kind_sizes() {
    assert_eq!(FieldKind::U8.size(), 1);
    assert_eq!(FieldKind::U16.size(), 2);
    assert_eq!(FieldKind::I16.size(), 2);
    assert_eq!(FieldKind::U32.size(), 4);
    assert_eq!(FieldKind::I32.size(), 4);
    assert_eq!(FieldKind::Str(48).size(), 48);
    assert!(!FieldKind::Str(48).is_numeric());
}

#[test]
fn test_record_layout_offsets() {
    let layout = RecordLayout::builder()
        .u8("flag")
        .u16("code")
        .i32("delta")
        .string("name", 10)
        .build();
    assert_eq!(layout.size(), 1 + 2 + 4 + 10);
    assert_eq!(layout.field("code").unwrap().offset, 1);
    assert_eq!(layout.field("delta").unwrap().offset, 3);
    assert_eq!(layout.field("name").unwrap().offset, 7);
    assert!(layout.field("missing").is_none());
}

#[test]
fn test_catalog_record_sizes() {
    assert_eq!(hist_hdr_layout().size(), 12 * 4 + HIST_TITLE_LEN);
    assert_eq!(scaler_layout().size(), 2 * 4 + 32);
    assert_eq!(
        gen_run_desc_layout().size(),
        5 * 4 + LONG_STRING_LEN + 16 * 5 + 32 * 2 + 48 * 2 + 32 * 2
    );
}

#[test]
fn test_format_lookup() {
    let td = format_info(FMT_TRI_TD_ID).unwrap();
    assert_eq!(td.run_desc_type, SEC_GEN_RUN_DESC_ID);
    assert!(td.has_count_histograms());

    let ti = format_info(FMT_TRI_TI_ID).unwrap();
    assert_eq!(ti.run_desc_type, SEC_TRI_TI_RUN_DESC_ID);
    assert!(!ti.has_count_histograms());
    assert!(ti.scaler_group_type.is_none());

    assert!(format_info(SEC_GEN_HIST_HDR_ID).is_none());
    assert_eq!(format_name(0xDEAD), "unknown format");
}

#[test]
fn test_registry_shapes() {
    let registry = default_registry();
    assert!(matches!(
        registry.shape(SEC_GEN_HIST_HDR_ID),
        Some(PayloadShape::FixedRecord(_))
    ));
    assert!(matches!(
        registry.shape(SEC_GEN_HIST_DAT_ID),
        Some(PayloadShape::OpaqueBytes)
    ));
    assert!(registry.is_group(GRP_TRI_TD_HIST_ID));
    assert!(registry.shape(0xDEAD_BEEF).is_none());
    assert_eq!(registry.name_of(0xDEAD_BEEF), "unknown");
}

#[test]
fn test_named_fields_per_format() {
    let registry = default_registry();

    let title = registry.accessor(FMT_TRI_TD_ID, "title").unwrap();
    assert_eq!(title.kind_name(), "string field");

    let t0 = registry.accessor(FMT_TRI_TD_ID, "t0Bins").unwrap();
    assert!(t0.is_indexed());
    assert!(registry.accessor(FMT_TRI_TI_ID, "t0Bins").is_none());

    let cmt = registry.accessor(FMT_TRI_TI_ID, "Cmt2").unwrap();
    assert_eq!(cmt.kind_name(), "string field");
    assert!(registry.accessor(FMT_TRI_TD_ID, "Cmt2").is_none());

    for name in ["RunNumber", "Startsec", "HTitles"] {
        assert!(registry.accessor(FMT_TRI_TD_ID, name).is_some(), "{}", name);
        assert!(registry.accessor(FMT_TRI_TI_ID, name).is_some(), "{}", name);
    }
}

#[test]
fn test_new_section_shapes() {
    let codec = Codec::default();
    let header = codec.new_section(SEC_GEN_HIST_HDR_ID, 3).unwrap();
    assert_eq!(header.bytes().unwrap().len(), hist_hdr_layout().size());
    assert!(header.bytes().unwrap().iter().all(|&b| b == 0));

    let data = codec.new_section(SEC_GEN_HIST_DAT_ID, 3).unwrap();
    assert!(data.bytes().unwrap().is_empty());

    let group = codec.new_section(GRP_TRI_TD_HIST_ID, 1).unwrap();
    assert!(group.is_group());

    assert!(matches!(
        codec.new_section(0xDEAD_BEEF, 1),
        Err(MudError::InvalidFormat(_))
    ));
}

#[test]
fn test_decode_errors_are_distinct() {
    let codec = Codec::default();

    let truncated = codec.decode(&[0u8; 6]).unwrap_err();
    assert!(truncated.is_decode_error());
    assert!(!truncated.is_not_found());

    let mut unknown = Vec::new();
    SectionHeader {
        length: 0,
        type_id: 0xDEAD_BEEF,
        instance: 1,
    }
    .write(&mut unknown, codec.layout());
    assert!(matches!(
        codec.decode(&unknown),
        Err(MudError::UnknownSectionType { .. })
    ));
}

#[test]
fn test_path_display() {
    let path = SectionPath::new()
        .child(GRP_TRI_TD_HIST_ID, 1)
        .child(SEC_GEN_HIST_HDR_ID, 2);
    assert_eq!(path.len(), 2);
    assert_eq!(path.to_string(), "/0x3010002:1/0x1000002:2");
    assert_eq!(SectionPath::new().to_string(), "/");
}

#[test]
fn test_error_budget() {
    let mut budget = ErrorBudget::default();
    for _ in 0..error::DEFAULT_ERROR_LIMIT {
        assert!(budget.record());
    }
    assert!(!budget.record());
    assert!(budget.is_exhausted());
}
