//! Prominence-based peak detection.
//!
//! A sample is a peak when it is a local maximum (plateaus allowed, the
//! midpoint is reported) and its topographic prominence reaches the
//! threshold: the vertical drop to the lowest point between the peak and the
//! nearest higher sample (or the sequence boundary) on each side.

use thiserror::Error;

/// Errors that can occur during peak detection.
#[derive(Error, Debug, PartialEq)]
pub enum PeakError {
    #[error("empty input channel")]
    EmptyChannel,

    #[error("non-finite sample at index {0}")]
    NotFinite(usize),
}

/// Result type for peak detection.
pub type Result<T> = std::result::Result<T, PeakError>;

/// Find indices of peaks with at least the given prominence.
///
/// Missing values are forbidden: the caller must already have dropped or
/// imputed them (group splitting does this for the primary channel).
///
/// # Arguments
///
/// * `values` - Channel samples, all finite
/// * `prominence` - Minimum prominence for a local maximum to qualify
///
/// # Returns
///
/// Peak indices in increasing order; zero or more.
///
/// # Errors
///
/// Returns an error if the input is empty or contains a non-finite sample.
pub fn find_peaks(values: &[f64], prominence: f64) -> Result<Vec<usize>> {
    if values.is_empty() {
        return Err(PeakError::EmptyChannel);
    }
    if let Some(idx) = values.iter().position(|v| !v.is_finite()) {
        return Err(PeakError::NotFinite(idx));
    }

    let peaks = local_maxima(values)
        .into_iter()
        .filter(|&idx| peak_prominence(values, idx) >= prominence)
        .collect();

    Ok(peaks)
}

/// Indices of local maxima, plateau-tolerant.
///
/// A maximum is strictly higher than the samples on either side of it; for a
/// flat-topped peak the middle index of the plateau is reported. Boundary
/// samples can never be maxima.
fn local_maxima(values: &[f64]) -> Vec<usize> {
    let n = values.len();
    if n < 3 {
        return Vec::new();
    }

    let mut peaks = Vec::new();
    let i_max = n - 1;
    let mut i = 1;

    while i < i_max {
        if values[i - 1] < values[i] {
            // Skip over a possible plateau.
            let mut i_ahead = i + 1;
            while i_ahead < i_max && values[i_ahead] == values[i] {
                i_ahead += 1;
            }

            if values[i_ahead] < values[i] {
                let left_edge = i;
                let right_edge = i_ahead - 1;
                peaks.push((left_edge + right_edge) / 2);
                i = i_ahead;
            }
        }
        i += 1;
    }

    peaks
}

/// Topographic prominence of the sample at `peak`.
///
/// Walks outward on each side until a strictly higher sample or the boundary
/// is reached, tracking the minimum along the way; the prominence is the
/// peak height above the higher of the two side minima.
fn peak_prominence(values: &[f64], peak: usize) -> f64 {
    let n = values.len();
    let height = values[peak];

    let mut left_min = height;
    let mut i = peak;
    while i > 0 && values[i] <= height {
        i -= 1;
        left_min = left_min.min(values[i]);
    }

    let mut right_min = height;
    let mut i = peak;
    while i < n - 1 && values[i] <= height {
        i += 1;
        right_min = right_min.min(values[i]);
    }

    height - left_min.max(right_min)
}
