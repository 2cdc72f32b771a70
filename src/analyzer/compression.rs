use super::metrics::{AudioStats, CompressionReport};

/// 比较转换前（中间 WAV）与转换后（最终 MP3）的体积。
#[derive(Debug, Default, Clone, Copy)]
pub struct CompressionReporter;

impl CompressionReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn compare(&self, before: &AudioStats, after: &AudioStats) -> CompressionReport {
        let original = before.size_bytes;
        let converted = after.size_bytes;
        let reduction_bytes = original as i64 - converted as i64;

        // 原始大小为 0 时没有可比的基准，百分比定义为 0
        let reduction_percent = if original > 0 {
            reduction_bytes as f64 / original as f64 * 100.0
        } else {
            0.0
        };

        CompressionReport {
            original_size_bytes: original,
            converted_size_bytes: converted,
            reduction_bytes,
            reduction_percent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats_with_size(size_bytes: u64) -> AudioStats {
        AudioStats::from_measurements(60.0, 44_100, 2, 16, -1.0, -20.0, size_bytes)
    }

    #[test]
    fn test_typical_wav_to_mp3_reduction() {
        let report = CompressionReporter::new().compare(&stats_with_size(10_000_000), &stats_with_size(1_000_000));
        assert_eq!(report.original_size_bytes, 10_000_000);
        assert_eq!(report.converted_size_bytes, 1_000_000);
        assert_eq!(report.reduction_bytes, 9_000_000);
        assert!((report.reduction_percent - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_growth_gives_negative_reduction() {
        let report = CompressionReporter::new().compare(&stats_with_size(1_000), &stats_with_size(1_500));
        assert_eq!(report.reduction_bytes, -500);
        assert!((report.reduction_percent + 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_original_size_does_not_divide() {
        let report = CompressionReporter::new().compare(&stats_with_size(0), &stats_with_size(2_048));
        assert_eq!(report.reduction_bytes, -2_048);
        assert_eq!(report.reduction_percent, 0.0);
    }

    #[test]
    fn test_reduction_bytes_identity_holds() {
        let reporter = CompressionReporter::new();
        for &(before, after) in &[(0u64, 0u64), (7, 3), (3, 7), (1 << 40, 1), (5, 5)] {
            let report = reporter.compare(&stats_with_size(before), &stats_with_size(after));
            assert_eq!(report.reduction_bytes, before as i64 - after as i64);
        }
    }
}
