//! Integration tests over run files written to a temporary directory.

use mud_file::catalog::*;
use mud_file::deglitch::deglitch_runs;
use mud_file::run::{hist_data, set_hist_data};
use mud_file::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const NUM_BINS: usize = 400;

/// Builds a TD run with `hists` histograms, each holding `data(n)`.
fn build_td_run(codec: &Codec, hists: u32, data: impl Fn(u32) -> Vec<u32>) -> Section {
    let mut root = codec.new_section(FMT_TRI_TD_ID, 1).unwrap();
    root.add_child(codec.new_section(SEC_GEN_RUN_DESC_ID, 1).unwrap())
        .unwrap();

    let mut group = codec.new_section(GRP_TRI_TD_HIST_ID, 1).unwrap();
    for n in 1..=hists {
        group
            .add_child(codec.new_section(SEC_GEN_HIST_HDR_ID, n).unwrap())
            .unwrap();
    }
    root.add_child(group).unwrap();

    let hdr = |n| {
        vec![
            PathElem::new(GRP_TRI_TD_HIST_ID, 1),
            PathElem::new(SEC_GEN_HIST_HDR_ID, n),
        ]
    };
    for n in 1..=hists {
        fields::set_numeric(codec, &mut root, &hdr(n), "bytesPerBin", 4).unwrap();
        // 5 ns bins
        fields::set_numeric(codec, &mut root, &hdr(n), "fsPerBin", 5_000_000).unwrap();
        fields::set_numeric(codec, &mut root, &hdr(n), "goodBin1", 10).unwrap();
        fields::set_numeric(codec, &mut root, &hdr(n), "goodBin2", NUM_BINS as i64 - 10).unwrap();
        fields::set_string(codec, &mut root, &hdr(n), "title", &format!("Hist{}", n)).unwrap();
        set_hist_data(codec, &mut root, n, &data(n)).unwrap();
    }
    root
}

fn write_run(dir: &Path, name: &str, root: &Section) -> PathBuf {
    let path = dir.join(name);
    let bytes = Codec::default().encode(root).unwrap();
    fs::write(&path, bytes).unwrap();
    path
}

fn ramp(n: u32) -> Vec<u32> {
    (0..NUM_BINS as u32).map(|j| 100 * n + j).collect()
}

#[test]
fn test_reencode_is_byte_identical() {
    let codec = Codec::default();
    let bytes = codec.encode(&build_td_run(&codec, 3, ramp)).unwrap();
    let tree = codec.decode(&bytes).unwrap();
    assert_eq!(codec.encode(&tree).unwrap(), bytes);
    assert_eq!(codec.decode(&codec.encode(&tree).unwrap()).unwrap(), tree);
}

#[test]
fn test_search_second_histogram() {
    let codec = Codec::default();
    let root = build_td_run(&codec, 2, ramp);
    let path = [
        PathElem::new(GRP_TRI_TD_HIST_ID, 1),
        PathElem::new(SEC_GEN_HIST_HDR_ID, 2),
    ];
    let hist = search(&root, &path).expect("histogram 2");
    assert_eq!((hist.type_id, hist.instance), (SEC_GEN_HIST_HDR_ID, 2));
    assert_eq!(
        fields::get_string(&codec, &root, &path, "title", 32).unwrap(),
        "Hist2"
    );

    // First element misses
    let missing = [
        PathElem::new(GRP_TRI_TI_HIST_ID, 1),
        PathElem::new(SEC_GEN_HIST_HDR_ID, 2),
    ];
    assert!(search(&root, &missing).is_none());
}

#[test]
fn test_edit_title_and_commit() {
    let dir = TempDir::new().unwrap();
    let codec = Codec::default();
    let path = write_run(dir.path(), "006663.msr", &build_td_run(&codec, 2, ramp));

    let mut table = HandleTable::default();
    let run = table.open(&path, OpenMode::ReadWrite).unwrap();
    assert_eq!(table.get_root_type(run).unwrap(), FMT_TRI_TD_ID);
    assert_eq!(table.get_hists(run).unwrap(), (GRP_TRI_TD_HIST_ID, 2));
    table.set_string_at(run, "HTitles", 2, "Forward").unwrap();
    table.close_commit(run).unwrap();
    assert!(table.is_empty());

    let tree = codec.decode(&fs::read(&path).unwrap()).unwrap();
    let path2 = [
        PathElem::new(GRP_TRI_TD_HIST_ID, 1),
        PathElem::new(SEC_GEN_HIST_HDR_ID, 2),
    ];
    assert_eq!(
        fields::get_string(&codec, &tree, &path2, "title", 32).unwrap(),
        "Forward"
    );
    let path1 = [
        PathElem::new(GRP_TRI_TD_HIST_ID, 1),
        PathElem::new(SEC_GEN_HIST_HDR_ID, 1),
    ];
    assert_eq!(
        fields::get_string(&codec, &tree, &path1, "title", 32).unwrap(),
        "Hist1"
    );
    assert_eq!(hist_data(&codec, &tree, 1).unwrap(), ramp(1));
    assert_eq!(hist_data(&codec, &tree, 2).unwrap(), ramp(2));
}

#[test]
fn test_change_titles_session() {
    let dir = TempDir::new().unwrap();
    let codec = Codec::default();
    let path = write_run(dir.path(), "006664.msr", &build_td_run(&codec, 4, ramp));

    let mut table = HandleTable::default();
    let run = table.open(&path, OpenMode::ReadWrite).unwrap();
    let mut budget = ErrorBudget::default();

    let edits = [
        ("Title", "Cu ZF 10K"),
        ("Sample", "Cu"),
        ("NoSuchField", "ignored"),
        ("Temperature", "10.0(1)K"),
    ];
    for (name, value) in edits {
        if table.set_string(run, name, value).is_err() {
            assert!(budget.record());
        }
    }
    table.set_numeric(run, "RunNumber", 6664).unwrap();
    table.set_numeric_at(run, "t0Bins", 3, 123).unwrap();
    assert_eq!(budget.count(), 1);
    table.close_commit(run).unwrap();

    let run = table.open(&path, OpenMode::Read).unwrap();
    let summary = RunSummary::read(table.codec(), table.root(run).unwrap()).unwrap();
    assert_eq!(summary.description.title, "Cu ZF 10K");
    assert_eq!(summary.description.sample, "Cu");
    assert_eq!(summary.description.temperature.as_deref(), Some("10.0(1)K"));
    assert_eq!(summary.description.run_number, 6664);
    assert_eq!(summary.histograms[2].t0_bin, 123);
    table.close_discard(run).unwrap();
}

#[test]
fn test_deglitch_two_runs() {
    let dir = TempDir::new().unwrap();
    let codec = Codec::default();
    let (bin1, bin2) = (200usize, 204usize);

    // Reference: smooth trend with the glitch doubling bins 200..=204
    let reference = build_td_run(&codec, 1, |_| {
        (0..NUM_BINS)
            .map(|j| {
                let y = 2 * j as u32 + 50;
                if (bin1 - 1..bin2).contains(&j) {
                    y * 2
                } else {
                    y
                }
            })
            .collect()
    });
    let truth: Vec<u32> = (0..NUM_BINS as u32).map(|j| 3000 - j).collect();
    let target = build_td_run(&codec, 1, |_| {
        truth
            .iter()
            .enumerate()
            .map(|(j, &t)| if (bin1 - 1..bin2).contains(&j) { t * 2 } else { t })
            .collect()
    });
    let ref_path = write_run(dir.path(), "ref.msr", &reference);
    let target_path = write_run(dir.path(), "target.msr", &target);

    let mut table = HandleTable::default();
    let r = table.open(&ref_path, OpenMode::Read).unwrap();
    let t = table.open(&target_path, OpenMode::ReadWrite).unwrap();
    let fit = deglitch_runs(&mut table, t, r, 1, bin1 as u32, bin2 as u32).unwrap();
    assert!((fit.slope - 2.0).abs() < 1e-9);
    assert!(table.is_dirty(t).unwrap());
    table.close_discard(r).unwrap();
    table.close_commit(t).unwrap();

    let tree = codec.decode(&fs::read(&target_path).unwrap()).unwrap();
    assert_eq!(hist_data(&codec, &tree, 1).unwrap(), truth);
}

#[test]
fn test_deglitch_uses_target_good_bins() {
    let dir = TempDir::new().unwrap();
    let codec = Codec::default();
    let (bin1, bin2) = (3usize, 7usize);
    let glitched = |y: u32, j: usize| if (bin1 - 1..bin2).contains(&j) { y * 2 } else { y };

    // The reference's good range ends just past the glitch, which leaves
    // no room after it and none before it either
    let mut reference = build_td_run(&codec, 1, |_| {
        (0..NUM_BINS).map(|j| glitched(2 * j as u32 + 50, j)).collect()
    });
    let hdr = [
        PathElem::new(GRP_TRI_TD_HIST_ID, 1),
        PathElem::new(SEC_GEN_HIST_HDR_ID, 1),
    ];
    fields::set_numeric(&codec, &mut reference, &hdr, "goodBin1", 1).unwrap();
    fields::set_numeric(&codec, &mut reference, &hdr, "goodBin2", 10).unwrap();

    let truth: Vec<u32> = (0..NUM_BINS as u32).map(|j| 3000 - j).collect();
    let target = build_td_run(&codec, 1, |_| {
        truth.iter().enumerate().map(|(j, &t)| glitched(t, j)).collect()
    });
    let ref_path = write_run(dir.path(), "ref.msr", &reference);
    let target_path = write_run(dir.path(), "target.msr", &target);

    let mut table = HandleTable::default();
    let r = table.open(&ref_path, OpenMode::Read).unwrap();
    let t = table.open(&target_path, OpenMode::ReadWrite).unwrap();
    let fit = deglitch_runs(&mut table, t, r, 1, bin1 as u32, bin2 as u32).unwrap();
    assert!((fit.slope - 2.0).abs() < 1e-9);
    table.close_discard(r).unwrap();
    table.close_commit(t).unwrap();

    let tree = codec.decode(&fs::read(&target_path).unwrap()).unwrap();
    assert_eq!(hist_data(&codec, &tree, 1).unwrap(), truth);
}

#[test]
fn test_deglitch_rejects_bad_input() {
    let dir = TempDir::new().unwrap();
    let codec = Codec::default();
    let path = write_run(dir.path(), "a.msr", &build_td_run(&codec, 2, ramp));

    let mut table = HandleTable::default();
    let r = table.open(&path, OpenMode::Read).unwrap();
    let t = table.open(&path, OpenMode::ReadWrite).unwrap();

    for (hist, bin1, bin2) in [(3, 100, 104), (1, 100, 101), (1, 100, 120), (1, 398, 402)] {
        let err = deglitch_runs(&mut table, t, r, hist, bin1, bin2).unwrap_err();
        assert!(matches!(err, MudError::Rejected(_)), "{:?}", err);
    }
    assert!(!table.is_dirty(t).unwrap());
}

#[test]
fn test_open_nonexistent() {
    let mut table = HandleTable::default();
    let err = table
        .open("/nonexistent/path/000000.msr", OpenMode::Read)
        .unwrap_err();
    assert!(matches!(err, MudError::Open { .. }));
    assert!(table.is_empty());
}

#[test]
fn test_describe_lists_every_section() {
    let codec = Codec::default();
    let root = build_td_run(&codec, 2, ramp);
    let dump = codec.describe(&root);
    assert_eq!(dump.lines().count(), root.walk().count());
    assert!(dump.starts_with("TD run 0x03010000/1"));
    assert!(dump.contains("  histogram header 0x01000002/2"));
}
