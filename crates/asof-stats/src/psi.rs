//! Population Stability Index.
//!
//! PSI compares how a comparison sample is spread over bins whose edges are
//! quantiles of a reference sample:
//!
//! ```text
//! PSI = Σ (a_i − e_i) · ln(a_i / e_i)
//! ```
//!
//! where `e_i` / `a_i` are the reference / comparison fractions of bin `i`,
//! each clipped below at [`FRACTION_FLOOR`] so empty bins stay finite.

/// Lower clip applied to each bin fraction.
pub const FRACTION_FLOOR: f64 = 1e-6;

/// Conventional bin count for drift checks.
pub const DEFAULT_BINS: usize = 10;

/// Computes PSI of `actual` against `reference` over `bins` quantile bins.
///
/// NaN values are ignored on both sides. Returns `None` if either side has
/// no finite values or `bins` is zero.
///
/// Bin edges follow linear-interpolated quantiles of the reference. Values
/// outside `[min(reference), max(reference)]` fall into no bin, so a
/// comparison sample shifted entirely out of the reference range yields a
/// large PSI rather than zero.
#[expect(clippy::cast_precision_loss)]
#[must_use]
pub fn population_stability_index(reference: &[f64], actual: &[f64], bins: usize) -> Option<f64> {
    if bins == 0 {
        return None;
    }
    let reference = sorted_finite(reference);
    let actual = sorted_finite(actual);
    if reference.is_empty() || actual.is_empty() {
        return None;
    }

    let edges = (0..=bins)
        .map(|i| quantile(&reference, i as f64 / bins as f64))
        .collect::<Vec<_>>();

    let expected = bin_fractions(&reference, &edges);
    let observed = bin_fractions(&actual, &edges);

    let psi = expected
        .iter()
        .zip(&observed)
        .map(|(&e, &a)| {
            let e = e.max(FRACTION_FLOOR);
            let a = a.max(FRACTION_FLOOR);
            (a - e) * (a / e).ln()
        })
        .sum();
    Some(psi)
}

fn sorted_finite(values: &[f64]) -> Vec<f64> {
    let mut values = values
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .collect::<Vec<_>>();
    values.sort_by(f64::total_cmp);
    values
}

/// Linear-interpolated quantile of sorted, non-empty data.
#[expect(
    clippy::cast_sign_loss,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss
)]
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Fractions of `values` per bin; bins are `[e_i, e_{i+1})` except the last,
/// which is closed.
#[expect(clippy::cast_precision_loss)]
fn bin_fractions(values: &[f64], edges: &[f64]) -> Vec<f64> {
    let bins = edges.len() - 1;
    let first = edges[0];
    let last = edges[bins];
    let mut counts = vec![0_usize; bins];
    for &v in values {
        if v < first || v > last {
            continue;
        }
        let idx = if v >= last {
            bins - 1
        } else {
            edges.partition_point(|&e| e <= v) - 1
        };
        counts[idx.min(bins - 1)] += 1;
    }
    let total = values.len().max(1) as f64;
    counts.into_iter().map(|c| c as f64 / total).collect()
}
