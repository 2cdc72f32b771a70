use std::path::Path;
use std::process::Command;

use tempfile::Builder;

use crate::analyzer::ffmpeg::{self, FfmpegTools};

#[derive(Debug, Clone, PartialEq)]
pub struct ConversionResult {
    pub success: bool,
    pub message: String,
}

impl ConversionResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: "转换完成".to_string(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// 编码过程中的临时输出文件名前缀，与目标文件位于同一目录。
pub const PARTIAL_OUTPUT_PREFIX: &str = ".video_to_audio_part_";

/// 对中间产物应用配置的处理链并编码为目标格式。
pub trait AudioConverter {
    fn convert_audio(&self, input_path: &Path, output_path: &Path) -> ConversionResult;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelLayout {
    Mono,
    Stereo,
}

impl ChannelLayout {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mono" | "1" => Some(ChannelLayout::Mono),
            "stereo" | "2" => Some(ChannelLayout::Stereo),
            _ => None,
        }
    }

    pub fn count(self) -> u32 {
        match self {
            ChannelLayout::Mono => 1,
            ChannelLayout::Stereo => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChannelLayout::Mono => "mono",
            ChannelLayout::Stereo => "stereo",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SilenceRemoval {
    pub threshold_dbfs: f64,
    pub min_silence_secs: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentRemoval {
    pub start_secs: f64,
    pub end_secs: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DynamicCompression {
    pub threshold_dbfs: f64,
    pub ratio: f64,
}

/// 转换器需要的全部参数，由配置中的 profile / filters 等段落组合而成。
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionSettings {
    pub channels: ChannelLayout,
    /// ffmpeg 的码率写法，例如 `128k`。
    pub bitrate: String,
    pub sample_rate_hz: u32,
    /// 归一化目标电平 (dBFS)，`None` 表示关闭。
    pub normalization_target_dbfs: Option<f64>,
    pub silence_removal: Option<SilenceRemoval>,
    pub segment_removal: Option<SegmentRemoval>,
    pub highpass_hz: Option<u32>,
    pub lowpass_hz: Option<u32>,
    pub compression: Option<DynamicCompression>,
}

/// 生成 `-af` 滤镜链。顺序固定：裁剪 → 去静音 → 高通 → 低通 → 压缩 → 归一化增益。
///
/// `duration_seconds` 用于计算尾部裁剪点，`measured_rms_dbfs` 用于归一化增益。
/// 缺少所需的测量值时跳过对应的步骤。
pub fn build_filter_chain(
    settings: &ConversionSettings,
    duration_seconds: Option<f64>,
    measured_rms_dbfs: Option<f64>,
) -> Vec<String> {
    let mut filters = Vec::new();

    if let Some(segment) = settings.segment_removal {
        match duration_seconds {
            Some(duration) if duration - segment.start_secs - segment.end_secs > 0.0 => {
                let end = duration - segment.end_secs;
                filters.push(format!("atrim=start={:.3}:end={end:.3}", segment.start_secs));
                filters.push("asetpts=PTS-STARTPTS".to_string());
            }
            Some(duration) => log::warn!(
                "裁剪区间 ({}s + {}s) 超出音频时长 {duration:.1}s，跳过片段移除",
                segment.start_secs,
                segment.end_secs
            ),
            None => log::warn!("无法确定音频时长，跳过片段移除"),
        }
    }

    if let Some(silence) = settings.silence_removal {
        let threshold = silence.threshold_dbfs;
        let duration = silence.min_silence_secs;
        filters.push(format!(
            "silenceremove=start_periods=1:start_threshold={threshold}dB:start_silence={duration}:stop_periods=-1:stop_threshold={threshold}dB:stop_duration={duration}"
        ));
    }

    if let Some(freq) = settings.highpass_hz {
        filters.push(format!("highpass=f={freq}"));
    }

    if let Some(freq) = settings.lowpass_hz {
        filters.push(format!("lowpass=f={freq}"));
    }

    if let Some(comp) = settings.compression {
        filters.push(format!(
            "acompressor=threshold={}dB:ratio={}",
            comp.threshold_dbfs, comp.ratio
        ));
    }

    if let Some(target) = settings.normalization_target_dbfs {
        match measured_rms_dbfs.filter(|level| level.is_finite()) {
            Some(level) => filters.push(format!("volume={:.2}dB", target - level)),
            None => log::warn!("无法测量输入电平，跳过音量归一化"),
        }
    }

    filters
}

#[derive(Debug, Clone)]
pub struct FfmpegConverter {
    tools: FfmpegTools,
    settings: ConversionSettings,
}

impl FfmpegConverter {
    pub fn new(tools: FfmpegTools, settings: ConversionSettings) -> Self {
        Self { tools, settings }
    }

    fn measure_inputs(&self, input_path: &Path) -> (Option<f64>, Option<f64>) {
        let duration = if self.settings.segment_removal.is_some() {
            ffmpeg::probe(input_path, &self.tools)
                .map_err(|e| log::warn!("读取时长失败: {e}"))
                .ok()
                .and_then(|probe| probe.duration_seconds)
        } else {
            None
        };

        let rms = if self.settings.normalization_target_dbfs.is_some() {
            ffmpeg::measure_levels(input_path, &self.tools)
                .map_err(|e| log::warn!("测量电平失败: {e}"))
                .ok()
                .map(|levels| levels.rms_db)
        } else {
            None
        };

        (duration, rms)
    }
}

impl AudioConverter for FfmpegConverter {
    fn convert_audio(&self, input_path: &Path, output_path: &Path) -> ConversionResult {
        let (duration, rms) = self.measure_inputs(input_path);
        let filters = build_filter_chain(&self.settings, duration, rms);
        log::debug!("滤镜链: {}", if filters.is_empty() { "(无)".to_string() } else { filters.join(",") });

        // 先编码到同目录的临时文件，成功后再原子替换目标，失败时旧文件保持不变
        let parent = match output_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let partial = match Builder::new()
            .prefix(PARTIAL_OUTPUT_PREFIX)
            .suffix(".mp3")
            .tempfile_in(parent)
        {
            Ok(file) => file.into_temp_path(),
            Err(e) => {
                log::error!("无法在 {} 创建临时输出: {e}", parent.display());
                return ConversionResult::failed(format!("[E_IO] 无法创建临时输出: {e}"));
            }
        };

        let mut command = Command::new(&self.tools.ffmpeg_path);
        command
            .arg("-hide_banner")
            .arg("-nostats")
            .arg("-y")
            .arg("-i")
            .arg(input_path);

        if !filters.is_empty() {
            command.arg("-af").arg(filters.join(","));
        }

        command
            .arg("-codec:a")
            .arg("libmp3lame")
            .arg("-b:a")
            .arg(&self.settings.bitrate)
            .arg("-ar")
            .arg(self.settings.sample_rate_hz.to_string())
            .arg("-ac")
            .arg(self.settings.channels.count().to_string())
            .arg(&*partial);

        if let Err(e) = ffmpeg::run_command_and_get_stderr(command, &self.tools) {
            log::error!("转换失败 {}: {e}", input_path.display());
            return ConversionResult::failed(e.to_string());
        }

        match partial.persist(output_path) {
            Ok(()) => {
                log::info!("转换完成: {}", output_path.display());
                ConversionResult::ok()
            }
            Err(e) => {
                log::error!("无法写入输出 {}: {}", output_path.display(), e.error);
                ConversionResult::failed(format!("[E_IO] 无法写入输出: {}", e.error))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn plain_settings() -> ConversionSettings {
        ConversionSettings {
            channels: ChannelLayout::Stereo,
            bitrate: "128k".to_string(),
            sample_rate_hz: 44_100,
            normalization_target_dbfs: None,
            silence_removal: None,
            segment_removal: None,
            highpass_hz: None,
            lowpass_hz: None,
            compression: None,
        }
    }

    #[test]
    fn test_no_filters_when_everything_disabled() {
        assert!(build_filter_chain(&plain_settings(), Some(60.0), Some(-20.0)).is_empty());
    }

    #[test]
    fn test_full_chain_order() {
        let settings = ConversionSettings {
            normalization_target_dbfs: Some(-12.0),
            silence_removal: Some(SilenceRemoval {
                threshold_dbfs: -40.0,
                min_silence_secs: 1.0,
            }),
            segment_removal: Some(SegmentRemoval {
                start_secs: 5.0,
                end_secs: 10.0,
            }),
            highpass_hz: Some(80),
            lowpass_hz: Some(8000),
            compression: Some(DynamicCompression {
                threshold_dbfs: -20.0,
                ratio: 4.0,
            }),
            ..plain_settings()
        };

        let chain = build_filter_chain(&settings, Some(120.0), Some(-20.5));
        assert_eq!(
            chain,
            vec![
                "atrim=start=5.000:end=110.000".to_string(),
                "asetpts=PTS-STARTPTS".to_string(),
                "silenceremove=start_periods=1:start_threshold=-40dB:start_silence=1:stop_periods=-1:stop_threshold=-40dB:stop_duration=1".to_string(),
                "highpass=f=80".to_string(),
                "lowpass=f=8000".to_string(),
                "acompressor=threshold=-20dB:ratio=4".to_string(),
                "volume=8.50dB".to_string(),
            ]
        );
    }

    #[test]
    fn test_segment_longer_than_audio_is_skipped() {
        let settings = ConversionSettings {
            segment_removal: Some(SegmentRemoval {
                start_secs: 30.0,
                end_secs: 40.0,
            }),
            ..plain_settings()
        };
        assert!(build_filter_chain(&settings, Some(60.0), None).is_empty());
        assert!(build_filter_chain(&settings, Some(70.0), None).is_empty());
        assert!(build_filter_chain(&settings, None, None).is_empty());
    }

    #[test]
    fn test_normalization_skipped_for_silent_input() {
        let settings = ConversionSettings {
            normalization_target_dbfs: Some(-12.0),
            ..plain_settings()
        };
        assert!(build_filter_chain(&settings, None, Some(f64::NEG_INFINITY)).is_empty());
        assert!(build_filter_chain(&settings, None, None).is_empty());
        assert_eq!(
            build_filter_chain(&settings, None, Some(-6.0)),
            vec!["volume=-6.00dB".to_string()]
        );
    }

    #[test]
    fn test_channel_layout_parse() {
        assert_eq!(ChannelLayout::parse("Stereo"), Some(ChannelLayout::Stereo));
        assert_eq!(ChannelLayout::parse("mono"), Some(ChannelLayout::Mono));
        assert_eq!(ChannelLayout::parse("quad"), None);
        assert_eq!(ChannelLayout::Mono.count(), 1);
    }

    #[test]
    fn test_failed_encode_keeps_existing_output() {
        let dir = TempDir::new().expect("tempdir");
        let input = dir.path().join("_temp_audio.wav");
        fs::write(&input, b"RIFF").expect("write input");
        let output = dir.path().join("clip.mp3");
        fs::write(&output, b"previous good mp3").expect("seed output");

        let converter = FfmpegConverter::new(
            FfmpegTools {
                ffmpeg_path: dir.path().join("missing-ffmpeg"),
                ffprobe_path: dir.path().join("missing-ffprobe"),
                command_timeout: None,
            },
            plain_settings(),
        );
        let result = converter.convert_audio(&input, &output);

        assert!(!result.success);
        assert_eq!(fs::read(&output).expect("read output"), b"previous good mp3");
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .expect("read dir")
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().starts_with(PARTIAL_OUTPUT_PREFIX))
            .collect();
        assert!(leftovers.is_empty());
    }
}
