pub mod compression;
pub mod ffmpeg;
pub mod metrics;
pub mod report;
pub mod safe_io;
pub mod scoring;

use std::path::Path;

use crate::error::AnalysisError;
use metrics::AudioStats;

/// 从音频产物中提取描述性统计。
///
/// 产物无法解码或长度为零时返回 `AnalysisError::UnreadableAudio`。
pub trait StatisticsExtractor {
    fn extract(&self, path: &Path) -> Result<AudioStats, AnalysisError>;
}
