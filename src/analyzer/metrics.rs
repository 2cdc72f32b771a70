// ----------------------------------------------------------------
// 项目: 视频转音频转换器 (VideoToAudio-rs)
// 模块: analyzer/metrics.rs
// 描述: 此模块定义了质量分析阶段使用的核心数据结构。
//      这些结构体被设计为可序列化，以便写入 CSV 报告。
// ----------------------------------------------------------------

use serde::{Deserialize, Serialize};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// `AudioStats` 是从单个音频产物（中间 WAV 或最终 MP3）中提取的描述性统计。
///
/// 一旦计算完成即不可变：所有字段都来自解码后的音频流以及文件本身的大小。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioStats {
    /// 解码后音频的时长（秒）。
    #[serde(rename = "durationSeconds")]
    pub duration_seconds: f64,

    /// 采样率（Hz），来自 ffprobe 元数据。
    #[serde(rename = "sampleRateHz")]
    pub sample_rate_hz: u32,

    /// 声道数。
    #[serde(rename = "channels")]
    pub channels: u32,

    /// 解码位深（bits）。
    #[serde(rename = "bitDepth")]
    pub bit_depth: u32,

    /// 峰值电平 (dBFS)，来自 astats 的 Overall 段。
    #[serde(rename = "peakLevelDbfs")]
    pub peak_level_dbfs: f64,

    /// 平均 (RMS) 电平 (dBFS)。
    #[serde(rename = "averageLevelDbfs")]
    pub average_level_dbfs: f64,

    /// 文件大小（字节），包含容器开销。
    #[serde(rename = "sizeBytes")]
    pub size_bytes: u64,

    /// 估算码率（kbps），见 [`estimate_bitrate_kbps`]。
    #[serde(rename = "estimatedBitrateKbps")]
    pub estimated_bitrate_kbps: u32,
}

impl AudioStats {
    /// 由原始测量值构造统计记录，码率由文件大小和时长推算。
    pub fn from_measurements(
        duration_seconds: f64,
        sample_rate_hz: u32,
        channels: u32,
        bit_depth: u32,
        peak_level_dbfs: f64,
        average_level_dbfs: f64,
        size_bytes: u64,
    ) -> Self {
        Self {
            duration_seconds,
            sample_rate_hz,
            channels,
            bit_depth,
            peak_level_dbfs,
            average_level_dbfs,
            size_bytes,
            estimated_bitrate_kbps: estimate_bitrate_kbps(size_bytes, duration_seconds),
        }
    }

    pub fn size_mb(&self) -> f64 {
        bytes_to_mb(self.size_bytes as f64)
    }

    pub fn is_stereo(&self) -> bool {
        self.channels == 2
    }
}

/// 估算码率：`floor(size_bytes * 8 / duration / 1000)`。
///
/// 这里用的是整个文件的大小（含容器开销），并不是真实的流码率。
/// 评分表依赖这个近似值，所以保持原样。时长为 0（或非有限值）时返回 0。
pub fn estimate_bitrate_kbps(size_bytes: u64, duration_seconds: f64) -> u32 {
    if duration_seconds == 0.0 || !duration_seconds.is_finite() {
        return 0;
    }

    let bitrate_bps = (size_bytes as f64 * 8.0) / duration_seconds;
    (bitrate_bps / 1000.0).floor().max(0.0) as u32
}

/// 转换前后的体积对比。
///
/// 不变量：`reduction_bytes = original_size_bytes - converted_size_bytes`（转换后变大时为负），
/// 原始大小为 0 时 `reduction_percent` 定义为 0。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompressionReport {
    #[serde(rename = "originalSizeBytes")]
    pub original_size_bytes: u64,
    #[serde(rename = "convertedSizeBytes")]
    pub converted_size_bytes: u64,
    #[serde(rename = "reductionBytes")]
    pub reduction_bytes: i64,
    #[serde(rename = "reductionPercent")]
    pub reduction_percent: f64,
}

impl CompressionReport {
    pub fn original_size_mb(&self) -> f64 {
        bytes_to_mb(self.original_size_bytes as f64)
    }

    pub fn converted_size_mb(&self) -> f64 {
        bytes_to_mb(self.converted_size_bytes as f64)
    }

    pub fn reduction_mb(&self) -> f64 {
        bytes_to_mb(self.reduction_bytes as f64)
    }
}

/// 质量分类，按总分下限划分，区间互不重叠且覆盖 [0,100] 的每个整数。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QualityCategory {
    #[serde(rename = "优秀")]
    Excellent,
    #[serde(rename = "很好")]
    VeryGood,
    #[serde(rename = "良好")]
    Good,
    #[serde(rename = "可接受")]
    Acceptable,
    #[serde(rename = "较低")]
    Low,
}

impl QualityCategory {
    pub fn from_score(score: u32) -> Self {
        match score {
            90.. => QualityCategory::Excellent,
            75..=89 => QualityCategory::VeryGood,
            60..=74 => QualityCategory::Good,
            45..=59 => QualityCategory::Acceptable,
            _ => QualityCategory::Low,
        }
    }
}

impl std::fmt::Display for QualityCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let category_str = match self {
            QualityCategory::Excellent => "优秀",
            QualityCategory::VeryGood => "很好",
            QualityCategory::Good => "良好",
            QualityCategory::Acceptable => "可接受",
            QualityCategory::Low => "较低",
        };
        write!(f, "{category_str}")
    }
}

/// 0-100 的质量分及其分类，是 `AudioStats` 的纯函数。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityScore {
    #[serde(rename = "score")]
    pub score: u32,
    #[serde(rename = "category")]
    pub category: QualityCategory,
}

/// 一个成功条目附带的全部分析结果：转换前后统计、体积对比、质量分。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConversionAnalysis {
    /// 提取阶段报告的源视频时长（秒）。
    #[serde(rename = "sourceDurationSeconds")]
    pub source_duration_seconds: f64,
    #[serde(rename = "before")]
    pub before: AudioStats,
    #[serde(rename = "after")]
    pub after: AudioStats,
    #[serde(rename = "compression")]
    pub compression: CompressionReport,
    #[serde(rename = "quality")]
    pub quality: QualityScore,
}

/// 字节数换算为 MB，保留两位小数，仅用于显示。
pub fn bytes_to_mb(bytes: f64) -> f64 {
    (bytes / BYTES_PER_MB * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitrate_zero_duration_is_zero() {
        assert_eq!(estimate_bitrate_kbps(0, 0.0), 0);
        assert_eq!(estimate_bitrate_kbps(5_000_000, 0.0), 0);
        assert_eq!(estimate_bitrate_kbps(5_000_000, f64::NAN), 0);
    }

    #[test]
    fn test_bitrate_is_floored() {
        // 1_000_000 B * 8 / 60 s = 133_333.3 bps -> 133 kbps
        assert_eq!(estimate_bitrate_kbps(1_000_000, 60.0), 133);
        // 44.1kHz 16bit 立体声 WAV 每秒 176_400 字节 -> 1411.2 kbps
        assert_eq!(estimate_bitrate_kbps(176_400, 1.0), 1411);
    }

    #[test]
    fn test_from_measurements_derives_bitrate() {
        let stats = AudioStats::from_measurements(10.0, 44_100, 2, 16, -1.0, -18.0, 400_000);
        assert_eq!(stats.estimated_bitrate_kbps, 320);

        let silent = AudioStats::from_measurements(0.0, 44_100, 2, 16, -1.0, -18.0, 400_000);
        assert_eq!(silent.estimated_bitrate_kbps, 0);
    }

    #[test]
    fn test_category_partitions_every_score() {
        for score in 0..=100u32 {
            let category = QualityCategory::from_score(score);
            let expected = if score >= 90 {
                QualityCategory::Excellent
            } else if score >= 75 {
                QualityCategory::VeryGood
            } else if score >= 60 {
                QualityCategory::Good
            } else if score >= 45 {
                QualityCategory::Acceptable
            } else {
                QualityCategory::Low
            };
            assert_eq!(category, expected, "分数 {score} 的分类不唯一");
        }
    }

    #[test]
    fn test_category_boundaries_are_inclusive() {
        assert_eq!(QualityCategory::from_score(90), QualityCategory::Excellent);
        assert_eq!(QualityCategory::from_score(89), QualityCategory::VeryGood);
        assert_eq!(QualityCategory::from_score(75), QualityCategory::VeryGood);
        assert_eq!(QualityCategory::from_score(60), QualityCategory::Good);
        assert_eq!(QualityCategory::from_score(45), QualityCategory::Acceptable);
        assert_eq!(QualityCategory::from_score(44), QualityCategory::Low);
    }

    #[test]
    fn test_bytes_to_mb_rounds_two_decimals() {
        assert_eq!(bytes_to_mb(1_048_576.0), 1.0);
        assert_eq!(bytes_to_mb(5_500_000.0), 5.25);
        assert_eq!(bytes_to_mb(-1_048_576.0), -1.0);
    }
}
