//! Upload progress statistics.

use serde::{Deserialize, Serialize};

use crate::session::UploadStatus;

const SIZE_UNITS: [&str; 9] = ["B", "Kb", "Mb", "Gb", "Tb", "Pb", "Eb", "Zb", "Yb"];

/// A snapshot of one upload's progress, pushed to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadStats {
    /// Average speed in bytes per second since the upload started.
    pub speed: f64,
    /// `speed` as a readable size per second, e.g. `1.50 Mb/s`.
    pub readable_speed: String,
    /// Bytes uploaded so far.
    pub total_uploaded: u64,
    /// Bytes still to upload.
    pub remaining_size: u64,
    /// Estimated seconds left, `-1` when unknown.
    pub seconds_left: i64,
    /// Size of the file.
    pub file_size: u64,
    /// Name of the file.
    pub file_name: String,
    /// MIME type of the file.
    pub file_type: String,
    /// `bucket/key`.
    pub full_file_path: String,
    /// Why the upload failed, for `ERROR`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Fraction uploaded, `0.0..=1.0`.
    pub progress: f64,
    /// Lifecycle status.
    pub status: UploadStatus,
    /// Remote upload id, once created.
    pub upload_id: Option<String>,
}

/// Inputs of a stats computation.
#[derive(Debug, Clone, Copy)]
pub struct StatsInput<'a> {
    /// Name of the file.
    pub file_name: &'a str,
    /// MIME type of the file.
    pub file_type: &'a str,
    /// `bucket/key`.
    pub full_file_path: &'a str,
    /// Size of the file.
    pub file_size: u64,
    /// Bytes uploaded so far.
    pub bytes_uploaded: u64,
    /// Seconds since the upload started.
    pub elapsed_secs: f64,
    /// Lifecycle status.
    pub status: UploadStatus,
    /// Remote upload id, once created.
    pub upload_id: Option<&'a str>,
    /// Failure reason, if any.
    pub error: Option<&'a str>,
}

impl UploadStats {
    /// Compute a snapshot.
    ///
    /// With nothing uploaded yet speed, progress and the estimate are zero.
    /// Otherwise `speed = uploaded / elapsed` and
    /// `seconds_left = round(remaining / speed)`, or `-1` without a speed.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub fn compute(input: &StatsInput<'_>) -> Self {
        let bytes_uploaded = input.bytes_uploaded.min(input.file_size);
        let remaining_size = input.file_size - bytes_uploaded;

        let (speed, progress, seconds_left) = if bytes_uploaded == 0 {
            (0.0, 0.0, 0)
        } else {
            // Sub-millisecond elapsed times would report an infinite speed.
            let elapsed = input.elapsed_secs.max(0.001);
            let speed = bytes_uploaded as f64 / elapsed;
            let progress = bytes_uploaded as f64 / input.file_size as f64;
            let seconds_left = if speed > 0.0 {
                ((remaining_size as f64 / speed).round() as i64).max(0)
            } else {
                -1
            };
            (speed, progress, seconds_left)
        };

        Self {
            speed,
            readable_speed: format!("{}/s", readable_file_size(speed)),
            total_uploaded: bytes_uploaded,
            remaining_size,
            seconds_left,
            file_size: input.file_size,
            file_name: input.file_name.to_owned(),
            file_type: input.file_type.to_owned(),
            full_file_path: input.full_file_path.to_owned(),
            error: input.error.map(ToOwned::to_owned),
            progress,
            status: input.status,
            upload_id: input.upload_id.map(ToOwned::to_owned),
        }
    }
}

/// Human-readable size with two decimals, a trailing `.00` dropped.
///
/// # Examples
///
/// ```
/// use evaporust_core::stats::readable_file_size;
///
/// assert_eq!(readable_file_size(512.0), "512 B");
/// assert_eq!(readable_file_size(1536.0), "1.50 Kb");
/// assert_eq!(readable_file_size(5.0 * 1024.0 * 1024.0), "5 Mb");
/// ```
#[must_use]
pub fn readable_file_size(size: f64) -> String {
    let mut size = size;
    let mut unit = 0;
    while size >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    let formatted = format!("{size:.2}").replacen(".00", "", 1);
    format!("{formatted} {}", SIZE_UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(bytes_uploaded: u64, elapsed_secs: f64) -> StatsInput<'static> {
        StatsInput {
            file_name: "movie.mp4",
            file_type: "video/mp4",
            full_file_path: "bucket/videos/movie.mp4",
            file_size: 1000,
            bytes_uploaded,
            elapsed_secs,
            status: UploadStatus::Evaporating,
            upload_id: Some("upload-1"),
            error: None,
        }
    }

    #[test]
    fn test_should_report_zero_progress_before_any_bytes() {
        let stats = UploadStats::compute(&input(0, 10.0));
        assert!(stats.speed.abs() < f64::EPSILON);
        assert!(stats.progress.abs() < f64::EPSILON);
        assert_eq!(stats.seconds_left, 0);
        assert_eq!(stats.remaining_size, 1000);
        assert_eq!(stats.readable_speed, "0 B/s");
    }

    #[test]
    fn test_should_compute_speed_and_estimate() {
        let stats = UploadStats::compute(&input(250, 5.0));
        assert!((stats.speed - 50.0).abs() < 1e-9);
        assert!((stats.progress - 0.25).abs() < 1e-9);
        assert_eq!(stats.remaining_size, 750);
        assert_eq!(stats.seconds_left, 15);
        assert_eq!(stats.readable_speed, "50 B/s");
        assert_eq!(stats.upload_id.as_deref(), Some("upload-1"));
    }

    #[test]
    fn test_should_clamp_uploaded_to_file_size() {
        let stats = UploadStats::compute(&input(2000, 1.0));
        assert_eq!(stats.total_uploaded, 1000);
        assert_eq!(stats.remaining_size, 0);
        assert_eq!(stats.seconds_left, 0);
        assert!((stats.progress - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_should_format_readable_sizes() {
        assert_eq!(readable_file_size(0.0), "0 B");
        assert_eq!(readable_file_size(1023.0), "1023 B");
        assert_eq!(readable_file_size(1024.0), "1 Kb");
        assert_eq!(readable_file_size(1_288_490_188.8), "1.20 Gb");
    }

    #[test]
    fn test_should_serialize_stats_as_camel_case() {
        let json = serde_json::to_value(UploadStats::compute(&input(250, 5.0))).unwrap();
        assert_eq!(json["readableSpeed"], "50 B/s");
        assert_eq!(json["fullFilePath"], "bucket/videos/movie.mp4");
        assert_eq!(json["secondsLeft"], 15);
        assert_eq!(json["status"], "EVAPORATING");
        assert!(json.get("error").is_none());
    }
}
