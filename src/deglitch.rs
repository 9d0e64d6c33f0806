//! Glitch correction for time-differential histograms.
//!
//! Some spectrometers produce a reproducible artifact a few bins wide. Given
//! a reference run that shows the same artifact but no real signal there,
//! the reference's smooth trend is fitted over bins flanking the glitch and
//! the target's counts inside the glitch are rescaled by the ratio of that
//! trend to the reference's actual counts.
//!
//! Bin numbers are 1-based throughout the public API. The regression works
//! on the 0-based bin index, so a fit of `y = a*x + b` uses `x = bin - 1`.

use crate::catalog::format_info;
use crate::error::{MudError, Result};
use crate::handle::{Handle, HandleTable};
use crate::run::{hist_data, set_hist_data, HistogramHeader};
use std::ops::RangeInclusive;
use tracing::{debug, info, instrument, warn};

/// Width of one flanking window, in seconds.
pub const FLANK_SEC: f64 = 25.0e-9;

/// Widest glitch that can be corrected, in seconds.
pub const MAX_GLITCH_SEC: f64 = 50.0e-9;

/// Relative threshold below which the weighted variance of x is singular.
pub const SINGULAR_EPSILON: f64 = 1.0e-12;

/// Number of bins in one flanking window for a bin width of `bin_sec`.
pub fn flank_bins(bin_sec: f64) -> usize {
    1 + (FLANK_SEC / bin_sec).ceil() as usize
}

/// Reference bins used for the fit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Window {
    /// Double-width window ending just before the glitch.
    Preceding(RangeInclusive<usize>),
    /// Double-width window starting just after the glitch.
    Following(RangeInclusive<usize>),
    /// One window on each side.
    Surrounding(RangeInclusive<usize>, RangeInclusive<usize>),
}

impl Window {
    /// Picks flanking windows for the glitch `bin1..=bin2`.
    ///
    /// Both sides are used when they fit inside `good_bin1..=good_bin2`.
    /// Otherwise a double-width window goes before the glitch if the
    /// following side runs past `good_bin2`, or after it if the preceding
    /// side starts before `good_bin1`.
    ///
    /// # Errors
    ///
    /// `Rejected` if the chosen window does not lie within `1..=num_bins`.
    pub fn select(
        bin1: usize,
        bin2: usize,
        n25: usize,
        good_bin1: usize,
        good_bin2: usize,
        num_bins: usize,
    ) -> Result<Self> {
        let (b1, b2, n) = (bin1 as i64, bin2 as i64, n25 as i64);
        let window = if b2 + n > good_bin2 as i64 {
            Self::checked(b1 - 2 * n, b1 - 1, num_bins).map(Window::Preceding)
        } else if b1 - n < good_bin1 as i64 {
            Self::checked(b2 + 1, b2 + 2 * n, num_bins).map(Window::Following)
        } else {
            Self::checked(b1 - n, b1 - 1, num_bins).and_then(|before| {
                Self::checked(b2 + 1, b2 + n, num_bins)
                    .map(|after| Window::Surrounding(before, after))
            })
        };
        window.ok_or_else(|| {
            MudError::rejected(format!(
                "Not enough bins around {}..{} to fit the background",
                bin1, bin2
            ))
        })
    }

    fn checked(first: i64, last: i64, num_bins: usize) -> Option<RangeInclusive<usize>> {
        (first >= 1 && last >= first && last <= num_bins as i64)
            .then(|| first as usize..=last as usize)
    }

    /// 1-based bins covered by the window.
    pub fn bins(&self) -> impl Iterator<Item = usize> + '_ {
        let (a, b) = match self {
            Window::Preceding(r) | Window::Following(r) => (r.clone(), 1..=0),
            Window::Surrounding(a, b) => (a.clone(), b.clone()),
        };
        a.chain(b)
    }
}

/// Weighted straight-line fit of reference counts against bin index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fit {
    /// Counts per bin.
    pub slope: f64,
    /// Fitted count at bin index 0.
    pub intercept: f64,
    /// Weighted mean count over the window.
    pub average: f64,
}

impl Fit {
    /// Fitted value at 0-based bin index `x`.
    pub fn at(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

/// Fits `y = slope*x + intercept` to `counts` over `window`.
///
/// Each point is weighted by `1/(y+1)`, the inverse Poisson variance with
/// empty bins kept finite.
///
/// # Errors
///
/// `RegressionFailed` when the weighted variance of x is degenerate, and
/// `Rejected` if the window reaches past the end of `counts`.
pub fn fit_window(counts: &[u32], window: &Window) -> Result<Fit> {
    let (mut sw, mut sx, mut sy, mut sxx, mut sxy) = (0.0, 0.0, 0.0, 0.0, 0.0);
    for bin in window.bins() {
        let j = bin - 1;
        let y = f64::from(
            *counts
                .get(j)
                .ok_or_else(|| MudError::rejected(format!("Bin {} is past the data", bin)))?,
        );
        let x = j as f64;
        let w = 1.0 / (y + 1.0);
        sw += w;
        sx += w * x;
        sy += w * y;
        sxx += w * x * x;
        sxy += w * x * y;
    }

    let dis = sw * sxx - sx * sx;
    if sw <= 0.0 || dis < SINGULAR_EPSILON * sw * sxx {
        return Err(MudError::RegressionFailed);
    }
    Ok(Fit {
        slope: (sxy * sw - sx * sy) / dis,
        intercept: (sxx * sy - sx * sxy) / dis,
        average: sy / sw,
    })
}

/// Rescales `target` over bins `bin1..=bin2` by the fitted trend.
///
/// Bins where the reference is zero are left alone. Returns the number of
/// bins changed.
pub fn correct(target: &mut [u32], reference: &[u32], fit: &Fit, bin1: usize, bin2: usize) -> usize {
    let mut changed = 0;
    for j in bin1.saturating_sub(1)..bin2 {
        let (Some(t), Some(&r)) = (target.get_mut(j), reference.get(j)) else {
            break;
        };
        if r == 0 {
            warn!(bin = j + 1, "Reference bin is empty; leaving target bin as is");
            continue;
        }
        let scaled = 0.499 + f64::from(*t) / (f64::from(r) / fit.at(j as f64));
        let corrected = scaled as u32;
        debug!(bin = j + 1, from = *t, to = corrected, "Smoothed bin");
        if corrected != *t {
            changed += 1;
        }
        *t = corrected;
    }
    changed
}

/// Histogram geometry needed to place the fit.
///
/// `deglitch_runs` takes the good-bin limits from the target run and the bin
/// width from the reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geometry {
    /// Number of bins in the histogram.
    pub num_bins: usize,
    /// Bin width in seconds.
    pub bin_sec: f64,
    /// First good bin, 1-based.
    pub good_bin1: usize,
    /// Last good bin, 1-based.
    pub good_bin2: usize,
}

/// Checks a glitch range against the histogram it applies to.
///
/// # Errors
///
/// `Rejected` unless `1 <= bin1 <= bin2 - 2`, `bin2 <= num_bins` and the
/// glitch spans at most 50 ns.
pub fn validate_range(bin1: usize, bin2: usize, geometry: &Geometry) -> Result<()> {
    let width_sec = bin2.saturating_sub(bin1) as f64 * geometry.bin_sec;
    if bin1 < 1 || bin2 > geometry.num_bins || bin1 + 2 > bin2 || width_sec > MAX_GLITCH_SEC {
        return Err(MudError::rejected(format!(
            "Improper bin range {}..{} for {} bins of {:.3} ns",
            bin1,
            bin2,
            geometry.num_bins,
            geometry.bin_sec * 1e9
        )));
    }
    Ok(())
}

/// Corrects `target` in place using `reference`, returning the fit used.
pub fn deglitch(
    target: &mut [u32],
    reference: &[u32],
    bin1: usize,
    bin2: usize,
    geometry: &Geometry,
) -> Result<Fit> {
    validate_range(bin1, bin2, geometry)?;
    let n25 = flank_bins(geometry.bin_sec);
    let window = Window::select(
        bin1,
        bin2,
        n25,
        geometry.good_bin1,
        geometry.good_bin2,
        geometry.num_bins,
    )?;
    let fit = fit_window(reference, &window)?;
    debug!(?window, slope = fit.slope, intercept = fit.intercept, average = fit.average, "Background fit");
    let changed = correct(target, reference, &fit, bin1, bin2);
    info!(bin1, bin2, changed, "Glitch corrected");
    Ok(fit)
}

fn count_histogram(table: &HandleTable, handle: Handle, hist: u32) -> Result<HistogramHeader> {
    let root = table.root(handle)?;
    let counts = format_info(root.type_id)
        .map(|f| f.has_count_histograms())
        .unwrap_or(false);
    if !counts {
        return Err(MudError::rejected("Histograms aren't counts"));
    }
    let (_, num_hists) = table.get_hists(handle)?;
    if hist < 1 || hist > num_hists {
        return Err(MudError::rejected(format!(
            "Invalid histogram number ({} of {})",
            hist, num_hists
        )));
    }
    HistogramHeader::read(table.codec(), root, hist)
}

/// Corrects histogram `hist` of the `target` run using the same histogram
/// of the `reference` run, and stores the result in the target.
///
/// The fit window is placed using the target histogram's good-bin limits.
///
/// The target handle is marked dirty on success; nothing is written until
/// it is committed.
///
/// # Errors
///
/// `Rejected` for anything a user could fix: runs that are not TD runs, a
/// histogram number out of range, histograms with different bin counts or
/// widths, or an improper bin range. `RegressionFailed` if the background
/// fit is degenerate.
#[instrument(skip(table), fields(target = target.id(), reference = reference.id()))]
pub fn deglitch_runs(
    table: &mut HandleTable,
    target: Handle,
    reference: Handle,
    hist: u32,
    bin1: u32,
    bin2: u32,
) -> Result<Fit> {
    let ref_header = count_histogram(table, reference, hist)?;
    let target_header = count_histogram(table, target, hist)?;
    if ref_header.n_bins != target_header.n_bins
        || ref_header.fs_per_bin != target_header.fs_per_bin
    {
        return Err(MudError::rejected(
            "Those two runs have incompatible histograms",
        ));
    }

    let geometry = Geometry {
        num_bins: target_header.n_bins as usize,
        bin_sec: ref_header.seconds_per_bin(),
        good_bin1: target_header.good_bin1 as usize,
        good_bin2: target_header.good_bin2 as usize,
    };
    let (bin1, bin2) = (bin1 as usize, bin2 as usize);
    validate_range(bin1, bin2, &geometry)?;

    let reference_data = hist_data(table.codec(), table.root(reference)?, hist)?;
    let mut target_data = hist_data(table.codec(), table.root(target)?, hist)?;
    let fit = deglitch(&mut target_data, &reference_data, bin1, bin2, &geometry)?;

    table.edit(target, |codec, root| {
        set_hist_data(codec, root, hist, &target_data)
    })?;
    Ok(fit)
}
