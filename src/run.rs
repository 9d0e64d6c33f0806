//! Typed views of the well-known sections of a run.
//!
//! These read whole records through the field accessors and hand back plain
//! structs, so callers do not need to know record layouts or paths.
//! Histogram bin data is stored as an opaque section next to each histogram
//! header and is decoded here according to the header's `bytesPerBin`.

use crate::catalog::{
    format_info, FormatInfo, SEC_CMT_ID, SEC_GEN_HIST_DAT_ID, SEC_GEN_HIST_HDR_ID,
    SEC_GEN_SCALER_ID,
};
use crate::codec::Codec;
use crate::error::{MudError, Result};
use crate::fields::{get_numeric, get_string, set_numeric};
use crate::search::{search, search_mut, PathElem, SectionPath};
use crate::section::Section;
use chrono::{DateTime, Utc};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Reads fields of one record.
struct RecordReader<'a> {
    codec: &'a Codec,
    root: &'a Section,
    path: Vec<PathElem>,
}

impl<'a> RecordReader<'a> {
    fn new(codec: &'a Codec, root: &'a Section, path: Vec<PathElem>) -> Self {
        Self { codec, root, path }
    }

    fn u32(&self, field: &str) -> Result<u32> {
        Ok(get_numeric(self.codec, self.root, &self.path, field)? as u32)
    }

    fn text(&self, field: &str) -> Result<String> {
        get_string(self.codec, self.root, &self.path, field, usize::MAX)
    }
}

fn require_format(root: &Section) -> Result<FormatInfo> {
    format_info(root.type_id).ok_or_else(|| {
        MudError::rejected(format!(
            "Run format {:#010x} is not in the catalog",
            root.type_id
        ))
    })
}

fn hist_path(format: &FormatInfo, type_id: u32, n: u32) -> Vec<PathElem> {
    format.hist_group_path().child(type_id, n).elems().to_vec()
}

/// Instances of `type_id` directly under the group at `group`, in stored order.
fn instances_in(root: &Section, group: &SectionPath, type_id: u32) -> Vec<u32> {
    search(root, group.elems())
        .map(|g| {
            g.children()
                .iter()
                .filter(|c| c.type_id == type_id)
                .map(|c| c.instance)
                .collect()
        })
        .unwrap_or_default()
}

/// Run descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RunDescription {
    /// Experiment number.
    pub experiment_number: u32,
    /// Run number.
    pub run_number: u32,
    /// Start of the run, seconds since the Unix epoch.
    pub time_begin: u32,
    /// End of the run, seconds since the Unix epoch.
    pub time_end: u32,
    /// Live counting time in seconds.
    pub elapsed_sec: u32,
    /// Run title.
    pub title: String,
    /// Laboratory.
    pub lab: String,
    /// Beamline.
    pub area: String,
    /// Measurement method.
    pub method: String,
    /// Spectrometer.
    pub apparatus: String,
    /// Sample insert.
    pub insert: String,
    /// Sample name.
    pub sample: String,
    /// Sample orientation.
    pub orient: String,
    /// Data acquisition system.
    pub das: String,
    /// Operators.
    pub experimenter: String,
    /// TD runs only.
    pub temperature: Option<String>,
    /// TD runs only.
    pub field: Option<String>,
    /// TI runs only.
    pub subtitle: Option<String>,
    /// TI runs only; three entries when present.
    pub comments: Vec<String>,
}

impl RunDescription {
    /// Reads the run descriptor of a cataloged run.
    pub fn read(codec: &Codec, root: &Section) -> Result<Self> {
        let format = require_format(root)?;
        let r = RecordReader::new(codec, root, format.run_desc_path().elems().to_vec());

        let mut desc = RunDescription {
            experiment_number: r.u32("exptNumber")?,
            run_number: r.u32("runNumber")?,
            time_begin: r.u32("timeBegin")?,
            time_end: r.u32("timeEnd")?,
            elapsed_sec: r.u32("elapsedSec")?,
            title: r.text("title")?,
            lab: r.text("lab")?,
            area: r.text("area")?,
            method: r.text("method")?,
            apparatus: r.text("apparatus")?,
            insert: r.text("insert")?,
            sample: r.text("sample")?,
            orient: r.text("orient")?,
            das: r.text("das")?,
            experimenter: r.text("experimenter")?,
            ..Default::default()
        };

        if format.has_count_histograms() {
            desc.temperature = Some(r.text("temperature")?);
            desc.field = Some(r.text("field")?);
        } else {
            desc.subtitle = Some(r.text("subtitle")?);
            desc.comments = vec![
                r.text("comment1")?,
                r.text("comment2")?,
                r.text("comment3")?,
            ];
        }
        Ok(desc)
    }

    /// Start of the run as a UTC timestamp.
    pub fn time_begin_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(i64::from(self.time_begin), 0)
    }

    /// End of the run as a UTC timestamp.
    pub fn time_end_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(i64::from(self.time_end), 0)
    }
}

/// Histogram header.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HistogramHeader {
    /// Instance number of the histogram, 1-based.
    pub instance: u32,
    /// Histogram type code.
    pub hist_type: u32,
    /// Size of the bin data in bytes.
    pub n_bytes: u32,
    /// Number of bins.
    pub n_bins: u32,
    /// Bytes per stored bin.
    pub bytes_per_bin: u32,
    /// Bin width in femtoseconds, or a legacy range code.
    pub fs_per_bin: u32,
    /// Time zero in picoseconds.
    pub t0_ps: u32,
    /// Time zero bin.
    pub t0_bin: u32,
    /// First good bin.
    pub good_bin1: u32,
    /// Last good bin.
    pub good_bin2: u32,
    /// First background bin.
    pub bkgd1: u32,
    /// Last background bin.
    pub bkgd2: u32,
    /// Total events.
    pub n_events: u32,
    /// Histogram title.
    pub title: String,
}

impl HistogramHeader {
    /// Reads the header of histogram `n`.
    pub fn read(codec: &Codec, root: &Section, n: u32) -> Result<Self> {
        let format = require_format(root)?;
        let r = RecordReader::new(codec, root, hist_path(&format, SEC_GEN_HIST_HDR_ID, n));
        Ok(HistogramHeader {
            instance: n,
            hist_type: r.u32("histType")?,
            n_bytes: r.u32("nBytes")?,
            n_bins: r.u32("nBins")?,
            bytes_per_bin: r.u32("bytesPerBin")?,
            fs_per_bin: r.u32("fsPerBin")?,
            t0_ps: r.u32("t0_ps")?,
            t0_bin: r.u32("t0_bin")?,
            good_bin1: r.u32("goodBin1")?,
            good_bin2: r.u32("goodBin2")?,
            bkgd1: r.u32("bkgd1")?,
            bkgd2: r.u32("bkgd2")?,
            n_events: r.u32("nEvents")?,
            title: r.text("title")?,
        })
    }

    /// Reads every histogram header in stored order.
    pub fn read_all(codec: &Codec, root: &Section) -> Result<Vec<Self>> {
        let format = require_format(root)?;
        instances_in(root, &format.hist_group_path(), SEC_GEN_HIST_HDR_ID)
            .into_iter()
            .map(|n| Self::read(codec, root, n))
            .collect()
    }

    /// Bin width in seconds.
    ///
    /// Values below 16 are legacy TDC range codes: 78.125 ps doubled once
    /// per step.
    pub fn seconds_per_bin(&self) -> f64 {
        if self.fs_per_bin < 16 {
            0.078125e-9 * f64::from(1u32 << self.fs_per_bin)
        } else {
            f64::from(self.fs_per_bin) * 1e-15
        }
    }
}

/// Scaler counter.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Scaler {
    /// Instance number.
    pub instance: u32,
    /// Counter label.
    pub label: String,
    /// Total and most recent counts.
    pub counts: [u32; 2],
}

impl Scaler {
    /// Reads every scaler of the run. Runs without a scaler group have none.
    pub fn read_all(codec: &Codec, root: &Section) -> Result<Vec<Self>> {
        let format = require_format(root)?;
        let Some(group_type) = format.scaler_group_type else {
            return Ok(Vec::new());
        };
        let group = SectionPath::new().child(group_type, 1);
        instances_in(root, &group, SEC_GEN_SCALER_ID)
            .into_iter()
            .map(|n| {
                let r = RecordReader::new(
                    codec,
                    root,
                    group.child(SEC_GEN_SCALER_ID, n).elems().to_vec(),
                );
                Ok(Scaler {
                    instance: n,
                    label: r.text("label")?,
                    counts: [r.u32("counts0")?, r.u32("counts1")?],
                })
            })
            .collect()
    }
}

/// Logbook comment attached to a run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Comment {
    /// Instance number.
    pub instance: u32,
    /// Time posted, seconds since the Unix epoch.
    pub time: u32,
    /// Comment this one replies to.
    pub prev_reply_id: u32,
    /// First reply to this comment.
    pub next_reply_id: u32,
    /// Author.
    pub author: String,
    /// Comment subject.
    pub title: String,
    /// Comment text.
    pub body: String,
}

impl Comment {
    /// Reads every comment of the run.
    pub fn read_all(codec: &Codec, root: &Section) -> Result<Vec<Self>> {
        let format = require_format(root)?;
        let group = format.comment_group_path();
        instances_in(root, &group, SEC_CMT_ID)
            .into_iter()
            .map(|n| {
                let r = RecordReader::new(codec, root, group.child(SEC_CMT_ID, n).elems().to_vec());
                Ok(Comment {
                    instance: n,
                    time: r.u32("time")?,
                    prev_reply_id: r.u32("prevReplyId")?,
                    next_reply_id: r.u32("nextReplyId")?,
                    author: r.text("author")?,
                    title: r.text("title")?,
                    body: r.text("comment")?,
                })
            })
            .collect()
    }
}

/// Everything a run file says about the run, without bin data.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RunSummary {
    /// Root type id.
    pub format: u32,
    /// Run descriptor.
    pub description: RunDescription,
    /// Histogram headers in stored order.
    pub histograms: Vec<HistogramHeader>,
    /// Scalers in stored order.
    pub scalers: Vec<Scaler>,
    /// Logbook comments in stored order.
    pub comments: Vec<Comment>,
}

impl RunSummary {
    /// Reads every typed view of a run.
    pub fn read(codec: &Codec, root: &Section) -> Result<Self> {
        Ok(RunSummary {
            format: root.type_id,
            description: RunDescription::read(codec, root)?,
            histograms: HistogramHeader::read_all(codec, root)?,
            scalers: Scaler::read_all(codec, root)?,
            comments: Comment::read_all(codec, root)?,
        })
    }

    /// Serializes the summary as pretty-printed JSON.
    #[cfg(feature = "serde")]
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| MudError::Encode(e.to_string()))
    }
}

fn check_bin_width(bytes_per_bin: u32) -> Result<usize> {
    match bytes_per_bin {
        1 | 2 | 4 => Ok(bytes_per_bin as usize),
        other => Err(MudError::rejected(format!(
            "Unsupported histogram bin width of {} bytes",
            other
        ))),
    }
}

/// Reads the bin counts of histogram `n`.
///
/// # Errors
///
/// `SectionNotFound` if the header or data section is missing, `Rejected`
/// for bin widths other than 1, 2 or 4 bytes, `Truncated` if the data
/// section is shorter than `nBins` bins.
pub fn hist_data(codec: &Codec, root: &Section, n: u32) -> Result<Vec<u32>> {
    let format = require_format(root)?;
    let header = HistogramHeader::read(codec, root, n)?;
    let width = check_bin_width(header.bytes_per_bin)?;

    let data_path = hist_path(&format, SEC_GEN_HIST_DAT_ID, n);
    let bytes = search(root, &data_path)
        .and_then(Section::bytes)
        .ok_or_else(|| MudError::SectionNotFound(SectionPath::from(data_path).to_string()))?;

    let n_bins = header.n_bins as usize;
    let needed = n_bins * width;
    if bytes.len() < needed {
        return Err(MudError::truncated(0, needed, bytes.len()));
    }

    let endian = codec.layout().endian;
    (0..n_bins)
        .map(|i| match width {
            1 => Ok(u32::from(bytes[i])),
            2 => endian.read_u16(bytes, i * 2).map(u32::from),
            _ => endian.read_u32(bytes, i * 4),
        })
        .collect()
}

/// Replaces the bin counts of histogram `n`.
///
/// Bins are stored with the header's `bytesPerBin`, or 4 bytes when it is
/// unset. `nBins` and `nBytes` are updated to match. The data section is
/// created if the histogram has none yet.
///
/// # Errors
///
/// `Rejected` if a count does not fit the bin width.
pub fn set_hist_data(codec: &Codec, root: &mut Section, n: u32, data: &[u32]) -> Result<()> {
    let format = require_format(root)?;
    let header = HistogramHeader::read(codec, root, n)?;
    let bytes_per_bin = if header.bytes_per_bin == 0 {
        4
    } else {
        header.bytes_per_bin
    };
    let width = check_bin_width(bytes_per_bin)?;

    let limit = if width == 4 {
        u32::MAX
    } else {
        (1u32 << (width * 8)) - 1
    };
    if let Some((bin, count)) = data.iter().enumerate().find(|(_, c)| **c > limit) {
        return Err(MudError::rejected(format!(
            "Bin {} of histogram {} holds {}, too large for {} byte bins",
            bin + 1,
            n,
            count,
            width
        )));
    }

    let endian = codec.layout().endian;
    let mut bytes = vec![0u8; data.len() * width];
    for (i, &count) in data.iter().enumerate() {
        match width {
            1 => bytes[i] = count as u8,
            2 => endian.write_u16(&mut bytes, i * 2, count as u16)?,
            _ => endian.write_u32(&mut bytes, i * 4, count)?,
        }
    }
    let n_bytes = bytes.len();

    let group_path = format.hist_group_path();
    let group = search_mut(root, group_path.elems())
        .ok_or_else(|| MudError::SectionNotFound(group_path.to_string()))?;
    let existing = group
        .children()
        .iter()
        .position(|s| s.matches(SEC_GEN_HIST_DAT_ID, n));
    match existing {
        Some(index) => {
            let payload = group
                .children_mut()
                .and_then(|c| c[index].bytes_mut())
                .ok_or_else(|| MudError::type_mismatch("histogram data", "bytes", "group"))?;
            *payload = bytes;
        }
        None => {
            let mut section = codec.new_section(SEC_GEN_HIST_DAT_ID, n)?;
            if let Some(payload) = section.bytes_mut() {
                *payload = bytes;
            }
            group
                .add_child(section)
                .map_err(|_| MudError::InvalidFormat(group_path.to_string()))?;
        }
    }

    let header_path = hist_path(&format, SEC_GEN_HIST_HDR_ID, n);
    set_numeric(codec, root, &header_path, "nBins", data.len() as i64)?;
    set_numeric(codec, root, &header_path, "nBytes", n_bytes as i64)?;
    set_numeric(codec, root, &header_path, "bytesPerBin", i64::from(bytes_per_bin))?;
    debug!(histogram = n, bins = data.len(), width, "Histogram data stored");
    Ok(())
}
