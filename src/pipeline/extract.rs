use std::path::Path;
use std::process::Command;

use crate::analyzer::ffmpeg::{self, FfmpegTools, ProbeData};
use crate::analyzer::report::format_duration;

/// 中间 WAV 的固定参数：无压缩 16 bit PCM，44.1 kHz。
const INTERMEDIATE_CODEC: &str = "pcm_s16le";
const INTERMEDIATE_SAMPLE_RATE: u32 = 44_100;

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionResult {
    pub success: bool,
    pub duration_seconds: f64,
    pub message: String,
}

impl ExtractionResult {
    pub fn ok(duration_seconds: f64) -> Self {
        Self {
            success: true,
            duration_seconds,
            message: "音频已提取".to_string(),
        }
    }

    /// 失败时报告的时长固定为 0。
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            duration_seconds: 0.0,
            message: message.into(),
        }
    }
}

/// 从视频容器中提取音轨，写出无压缩的中间产物。
///
/// 失败时不得留下可能被误认为有效产物的残缺文件。
pub trait AudioExtractor {
    fn extract_audio(&self, input_path: &Path, output_path: &Path) -> ExtractionResult;
}

#[derive(Debug, Clone)]
pub struct FfmpegExtractor {
    tools: FfmpegTools,
}

impl FfmpegExtractor {
    pub fn new(tools: FfmpegTools) -> Self {
        Self { tools }
    }
}

/// 源视频的播放时长：容器时长优先，缺失时退回音频流时长。
fn source_duration(probe: &ProbeData) -> f64 {
    probe
        .container_duration_seconds
        .or(probe.duration_seconds)
        .unwrap_or(0.0)
}

impl AudioExtractor for FfmpegExtractor {
    fn extract_audio(&self, input_path: &Path, output_path: &Path) -> ExtractionResult {
        let file_name = input_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        log::info!("正在提取音频: {file_name}");

        let probe = match ffmpeg::probe(input_path, &self.tools) {
            Ok(probe) => probe,
            Err(e) => {
                log::error!("无法读取视频 {}: {e}", input_path.display());
                return ExtractionResult::failed(e.to_string());
            }
        };

        if !probe.has_audio {
            log::error!("视频不包含音频: {}", input_path.display());
            return ExtractionResult::failed("视频不包含音频轨道");
        }

        let duration = source_duration(&probe);
        log::info!("视频时长: {duration:.2}s ({})", format_duration(duration));

        let mut command = Command::new(&self.tools.ffmpeg_path);
        command
            .arg("-hide_banner")
            .arg("-nostats")
            .arg("-y")
            .arg("-i")
            .arg(input_path)
            .arg("-vn")
            .arg("-acodec")
            .arg(INTERMEDIATE_CODEC)
            .arg("-ar")
            .arg(INTERMEDIATE_SAMPLE_RATE.to_string())
            .arg("-f")
            .arg("wav")
            .arg(output_path);

        match ffmpeg::run_command_and_get_stderr(command, &self.tools) {
            Ok(_) => {
                log::info!(
                    "音频提取成功: {}",
                    output_path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default()
                );
                ExtractionResult::ok(duration)
            }
            Err(e) => {
                log::error!("提取音频失败 {}: {e}", input_path.display());
                std::fs::remove_file(output_path).ok();
                ExtractionResult::failed(e.to_string())
            }
        }
    }
}
