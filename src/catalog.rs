//! Standard section catalog for muon run files.
//!
//! Type ids, record layouts, and the named field tables for the two run
//! formats: time-differential (TD) and integral (TI). The engine itself does
//! not depend on this catalog; any [`TypeRegistry`] can be supplied instead.

use crate::registry::{Accessor, RecordLayout, TypeRegistry};
use crate::search::SectionPath;

/// Root of a time-differential run.
pub const FMT_TRI_TD_ID: u32 = 0x0301_0000;
/// Root of an integral run.
pub const FMT_TRI_TI_ID: u32 = 0x0302_0000;

/// Generic run descriptor (TD runs).
pub const SEC_GEN_RUN_DESC_ID: u32 = 0x0100_0001;
/// Histogram header.
pub const SEC_GEN_HIST_HDR_ID: u32 = 0x0100_0002;
/// Histogram data.
pub const SEC_GEN_HIST_DAT_ID: u32 = 0x0100_0003;
/// Scaler.
pub const SEC_GEN_SCALER_ID: u32 = 0x0100_0004;
/// Comment.
pub const SEC_CMT_ID: u32 = 0x0000_0005;
/// Integral run descriptor.
pub const SEC_TRI_TI_RUN_DESC_ID: u32 = 0x0302_0001;

/// Histogram group of a TD run.
pub const GRP_TRI_TD_HIST_ID: u32 = 0x0301_0002;
/// Scaler group of a TD run.
pub const GRP_TRI_TD_SCALER_ID: u32 = 0x0301_0003;
/// Histogram group of a TI run (not raw counts).
pub const GRP_TRI_TI_HIST_ID: u32 = 0x0302_0002;
/// Comment group.
pub const GRP_CMT_ID: u32 = 0x0000_0006;

/// Capacity of histogram title fields.
pub const HIST_TITLE_LEN: usize = 32;
/// Capacity of long run-descriptor strings (titles, comments).
pub const LONG_STRING_LEN: usize = 80;

/// Where the well-known sections of a run format live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatInfo {
    /// Root section type.
    pub root_type: u32,
    /// Run descriptor type, stored as instance 1 directly under the root.
    pub run_desc_type: u32,
    /// Histogram group type, stored as instance 1 directly under the root.
    pub hist_group_type: u32,
    /// Scaler group type, if the format has one.
    pub scaler_group_type: Option<u32>,
}

impl FormatInfo {
    /// Path from the root to the run descriptor.
    pub fn run_desc_path(&self) -> SectionPath {
        SectionPath::new().child(self.run_desc_type, 1)
    }

    /// Path from the root to the histogram group.
    pub fn hist_group_path(&self) -> SectionPath {
        SectionPath::new().child(self.hist_group_type, 1)
    }

    /// Path from the root to the comment group.
    pub fn comment_group_path(&self) -> SectionPath {
        SectionPath::new().child(GRP_CMT_ID, 1)
    }

    /// Returns true if histograms hold raw counts.
    pub fn has_count_histograms(&self) -> bool {
        self.hist_group_type == GRP_TRI_TD_HIST_ID
    }
}

/// Well-known sections of a TD run.
pub const TD_FORMAT: FormatInfo = FormatInfo {
    root_type: FMT_TRI_TD_ID,
    run_desc_type: SEC_GEN_RUN_DESC_ID,
    hist_group_type: GRP_TRI_TD_HIST_ID,
    scaler_group_type: Some(GRP_TRI_TD_SCALER_ID),
};

/// Well-known sections of a TI run.
pub const TI_FORMAT: FormatInfo = FormatInfo {
    root_type: FMT_TRI_TI_ID,
    run_desc_type: SEC_TRI_TI_RUN_DESC_ID,
    hist_group_type: GRP_TRI_TI_HIST_ID,
    scaler_group_type: None,
};

/// Returns the known sections for a root type.
pub fn format_info(root_type: u32) -> Option<FormatInfo> {
    match root_type {
        FMT_TRI_TD_ID => Some(TD_FORMAT),
        FMT_TRI_TI_ID => Some(TI_FORMAT),
        _ => None,
    }
}

/// Human-readable name of a run format.
pub fn format_name(root_type: u32) -> &'static str {
    match root_type {
        FMT_TRI_TD_ID => "TRIUMF TD-muSR",
        FMT_TRI_TI_ID => "TRIUMF I-muSR",
        _ => "unknown format",
    }
}

fn run_desc_common() -> crate::registry::RecordLayoutBuilder {
    RecordLayout::builder()
        .u32("exptNumber")
        .u32("runNumber")
        .u32("timeBegin")
        .u32("timeEnd")
        .u32("elapsedSec")
        .string("title", LONG_STRING_LEN)
        .string("lab", 16)
        .string("area", 16)
        .string("method", 16)
        .string("apparatus", 32)
        .string("insert", 32)
        .string("sample", 48)
        .string("orient", 16)
        .string("das", 16)
        .string("experimenter", 48)
}

/// Layout of the TD run descriptor.
pub fn gen_run_desc_layout() -> RecordLayout {
    run_desc_common()
        .string("temperature", 32)
        .string("field", 32)
        .build()
}

/// Layout of the TI run descriptor.
pub fn ti_run_desc_layout() -> RecordLayout {
    run_desc_common()
        .string("subtitle", LONG_STRING_LEN)
        .string("comment1", LONG_STRING_LEN)
        .string("comment2", LONG_STRING_LEN)
        .string("comment3", LONG_STRING_LEN)
        .build()
}

/// Layout of a histogram header.
pub fn hist_hdr_layout() -> RecordLayout {
    RecordLayout::builder()
        .u32("histType")
        .u32("nBytes")
        .u32("nBins")
        .u32("bytesPerBin")
        .u32("fsPerBin")
        .u32("t0_ps")
        .u32("t0_bin")
        .u32("goodBin1")
        .u32("goodBin2")
        .u32("bkgd1")
        .u32("bkgd2")
        .u32("nEvents")
        .string("title", HIST_TITLE_LEN)
        .build()
}

/// Layout of a scaler.
pub fn scaler_layout() -> RecordLayout {
    RecordLayout::builder()
        .u32("counts0")
        .u32("counts1")
        .string("label", 32)
        .build()
}

/// Layout of a comment.
pub fn comment_layout() -> RecordLayout {
    RecordLayout::builder()
        .u32("time")
        .u32("prevReplyId")
        .u32("nextReplyId")
        .string("author", 32)
        .string("title", LONG_STRING_LEN)
        .string("comment", 512)
        .build()
}

fn numeric(path: &SectionPath, field: &str) -> Accessor {
    Accessor::Numeric {
        path: path.clone(),
        field: field.to_string(),
    }
}

fn string(path: &SectionPath, field: &str) -> Accessor {
    Accessor::String {
        path: path.clone(),
        field: field.to_string(),
    }
}

fn hist_numeric(group: &SectionPath, field: &str) -> Accessor {
    Accessor::IndexedNumeric {
        group: group.clone(),
        type_id: SEC_GEN_HIST_HDR_ID,
        field: field.to_string(),
    }
}

fn hist_string(group: &SectionPath, field: &str) -> Accessor {
    Accessor::IndexedString {
        group: group.clone(),
        type_id: SEC_GEN_HIST_HDR_ID,
        field: field.to_string(),
    }
}

/// Named run fields shared by both formats: (name, record field, is_numeric).
const RUN_FIELDS: &[(&str, &str, bool)] = &[
    ("RunNumber", "runNumber", true),
    ("Experiment", "exptNumber", true),
    ("Operator", "experimenter", false),
    ("Title", "title", false),
    ("Sample", "sample", false),
    ("Orient", "orient", false),
    ("Lab", "lab", false),
    ("Method", "method", false),
    ("Das", "das", false),
    ("Beamline", "area", false),
    ("Rig", "apparatus", false),
    ("Mode", "insert", false),
    ("Startsec", "timeBegin", true),
    ("Endsec", "timeEnd", true),
    ("Elapsedsec", "elapsedSec", true),
];

fn with_run_fields(mut registry: TypeRegistry, info: &FormatInfo) -> TypeRegistry {
    let desc = info.run_desc_path();
    for &(name, field, is_numeric) in RUN_FIELDS {
        let accessor = if is_numeric {
            numeric(&desc, field)
        } else {
            string(&desc, field)
        };
        registry = registry.with_accessor(info.root_type, name, accessor);
    }
    registry.with_accessor(
        info.root_type,
        "HTitles",
        hist_string(&info.hist_group_path(), "title"),
    )
}

/// Builds the standard registry: every section type plus the named field
/// tables for TD and TI runs.
pub fn default_registry() -> TypeRegistry {
    let mut registry = TypeRegistry::new()
        .with_group(FMT_TRI_TD_ID, "TD run")
        .with_group(FMT_TRI_TI_ID, "TI run")
        .with_group(GRP_TRI_TD_HIST_ID, "TD histograms")
        .with_group(GRP_TRI_TD_SCALER_ID, "TD scalers")
        .with_group(GRP_TRI_TI_HIST_ID, "TI histograms")
        .with_group(GRP_CMT_ID, "comments")
        .with_record(SEC_GEN_RUN_DESC_ID, "run description", gen_run_desc_layout())
        .with_record(SEC_TRI_TI_RUN_DESC_ID, "TI run description", ti_run_desc_layout())
        .with_record(SEC_GEN_HIST_HDR_ID, "histogram header", hist_hdr_layout())
        .with_opaque(SEC_GEN_HIST_DAT_ID, "histogram data")
        .with_record(SEC_GEN_SCALER_ID, "scaler", scaler_layout())
        .with_record(SEC_CMT_ID, "comment", comment_layout());

    let td = TD_FORMAT;
    let ti = TI_FORMAT;

    registry = with_run_fields(registry, &td);
    let td_desc = td.run_desc_path();
    let td_hists = td.hist_group_path();
    registry = registry
        .with_accessor(td.root_type, "Temperature", string(&td_desc, "temperature"))
        .with_accessor(td.root_type, "Field", string(&td_desc, "field"))
        .with_accessor(td.root_type, "t0Bins", hist_numeric(&td_hists, "t0_bin"))
        .with_accessor(td.root_type, "t0Ps", hist_numeric(&td_hists, "t0_ps"))
        .with_accessor(td.root_type, "t1Bins", hist_numeric(&td_hists, "goodBin1"))
        .with_accessor(td.root_type, "t2Bins", hist_numeric(&td_hists, "goodBin2"))
        .with_accessor(td.root_type, "Bg1Bins", hist_numeric(&td_hists, "bkgd1"))
        .with_accessor(td.root_type, "Bg2Bins", hist_numeric(&td_hists, "bkgd2"))
        .with_accessor(td.root_type, "NumBins", hist_numeric(&td_hists, "nBins"))
        .with_accessor(td.root_type, "FsPerBin", hist_numeric(&td_hists, "fsPerBin"))
        .with_accessor(td.root_type, "NumEvents", hist_numeric(&td_hists, "nEvents"));

    registry = with_run_fields(registry, &ti);
    let ti_desc = ti.run_desc_path();
    registry
        .with_accessor(ti.root_type, "Subtitle", string(&ti_desc, "subtitle"))
        .with_accessor(ti.root_type, "Cmt1", string(&ti_desc, "comment1"))
        .with_accessor(ti.root_type, "Cmt2", string(&ti_desc, "comment2"))
        .with_accessor(ti.root_type, "Cmt3", string(&ti_desc, "comment3"))
}
