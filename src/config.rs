use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::pipeline::convert::{
    ChannelLayout, ConversionSettings, DynamicCompression, SegmentRemoval, SilenceRemoval,
};
use crate::pipeline::naming::NamingPolicy;
use crate::pipeline::orchestrator::RunOptions;

pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// 从 TOML 文件加载的完整配置。
///
/// `[paths]`、`[processing]`、`[profile]` 三个表必须存在，其余表缺失时使用默认值。
/// 表内缺失的键同样回退到默认值。
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub paths: PathsConfig,
    pub processing: ProcessingConfig,
    pub profile: ProfileConfig,
    #[serde(default)]
    pub profile_custom: CustomProfileConfig,
    #[serde(default)]
    pub normalization: NormalizationConfig,
    #[serde(default)]
    pub silence_removal: SilenceRemovalConfig,
    #[serde(default)]
    pub segment_removal: SegmentRemovalConfig,
    #[serde(default)]
    pub filters: FiltersConfig,
    #[serde(default)]
    pub quality_analysis: QualityAnalysisConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub ffmpeg: FfmpegConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub input_folder: PathBuf,
    pub output_folder: PathBuf,
    pub log_folder: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input_folder: PathBuf::from("./entrada"),
            output_folder: PathBuf::from("./saida"),
            log_folder: PathBuf::from("./logs"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    pub process_all: bool,
    pub overwrite: bool,
    pub keep_original_name: bool,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            process_all: true,
            overwrite: false,
            keep_original_name: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    pub active_profile: String,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            active_profile: "media".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CustomProfileConfig {
    pub channels: String,
    pub bitrate: String,
    pub sample_rate: u32,
}

impl Default for CustomProfileConfig {
    fn default() -> Self {
        Self {
            channels: "stereo".to_string(),
            bitrate: "128k".to_string(),
            sample_rate: 44_100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NormalizationConfig {
    pub enabled: bool,
    pub target_level: f64,
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            target_level: -12.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SilenceRemovalConfig {
    pub enabled: bool,
    pub silence_threshold: f64,
    pub min_silence_duration: f64,
}

impl Default for SilenceRemovalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            silence_threshold: -40.0,
            min_silence_duration: 1.0,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SegmentRemovalConfig {
    pub enabled: bool,
    pub remove_start: f64,
    pub remove_end: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FiltersConfig {
    pub highpass_filter: bool,
    pub highpass_freq: u32,
    pub lowpass_filter: bool,
    pub lowpass_freq: u32,
    pub compression: bool,
    pub compression_threshold: f64,
    pub compression_ratio: f64,
}

impl Default for FiltersConfig {
    fn default() -> Self {
        Self {
            highpass_filter: false,
            highpass_freq: 80,
            lowpass_filter: false,
            lowpass_freq: 8000,
            compression: false,
            compression_threshold: -20.0,
            compression_ratio: 4.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QualityAnalysisConfig {
    pub enabled: bool,
    pub detailed_stats: bool,
    /// 在输出目录写出 CSV 运行报告。
    pub report_csv: bool,
}

impl Default for QualityAnalysisConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            detailed_stats: true,
            report_csv: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_level: String,
    pub log_file: String,
    pub log_with_timestamp: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "INFO".to_string(),
            log_file: "video_to_audio.log".to_string(),
            log_with_timestamp: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FfmpegConfig {
    /// 未设置时在 PATH 中查找。
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
    /// 单条外部命令的超时（秒），0 表示不限制。
    pub command_timeout_secs: u64,
}

/// 解析后的编码参数。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioProfile {
    pub name: String,
    pub channels: ChannelLayout,
    pub bitrate: String,
    pub sample_rate_hz: u32,
}

impl AudioProfile {
    fn builtin(name: &str) -> Option<Self> {
        let (channels, bitrate, sample_rate_hz) = match name {
            "baixa" => (ChannelLayout::Mono, "64k", 22_050),
            "media" => (ChannelLayout::Stereo, "128k", 44_100),
            "alta" => (ChannelLayout::Stereo, "320k", 48_000),
            _ => return None,
        };
        Some(Self {
            name: name.to_string(),
            channels,
            bitrate: bitrate.to_string(),
            sample_rate_hz,
        })
    }
}

impl AppConfig {
    /// 读取并解析配置文件。文件缺失、TOML 语法错误或缺少必需的表都是致命错误。
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("[E_CONFIG] 无法读取配置文件: {}", path.display()))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("[E_CONFIG] 配置文件无效: {}", path.display()))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents).context("TOML 解析失败")?;
        Ok(config)
    }

    /// 当前生效的编码参数。未知的 profile 名回退到 `media`。
    pub fn resolve_profile(&self) -> AudioProfile {
        let name = self.profile.active_profile.trim().to_lowercase();

        if name == "custom" {
            let custom = &self.profile_custom;
            let channels = ChannelLayout::parse(&custom.channels).unwrap_or_else(|| {
                log::warn!("未知的声道设置 '{}'，使用 stereo", custom.channels);
                ChannelLayout::Stereo
            });
            return AudioProfile {
                name,
                channels,
                bitrate: custom.bitrate.trim().to_string(),
                sample_rate_hz: custom.sample_rate,
            };
        }

        AudioProfile::builtin(&name).unwrap_or_else(|| {
            log::warn!("未知的配置档 '{}'，使用 'media'", self.profile.active_profile);
            Self::fallback_profile()
        })
    }

    fn fallback_profile() -> AudioProfile {
        AudioProfile {
            name: "media".to_string(),
            channels: ChannelLayout::Stereo,
            bitrate: "128k".to_string(),
            sample_rate_hz: 44_100,
        }
    }

    pub fn conversion_settings(&self) -> ConversionSettings {
        let profile = self.resolve_profile();
        let filters = &self.filters;

        ConversionSettings {
            channels: profile.channels,
            bitrate: profile.bitrate,
            sample_rate_hz: profile.sample_rate_hz,
            normalization_target_dbfs: self
                .normalization
                .enabled
                .then_some(self.normalization.target_level),
            silence_removal: self.silence_removal.enabled.then_some(SilenceRemoval {
                threshold_dbfs: self.silence_removal.silence_threshold,
                min_silence_secs: self.silence_removal.min_silence_duration,
            }),
            segment_removal: self.segment_removal.enabled.then_some(SegmentRemoval {
                start_secs: self.segment_removal.remove_start,
                end_secs: self.segment_removal.remove_end,
            }),
            highpass_hz: filters.highpass_filter.then_some(filters.highpass_freq),
            lowpass_hz: filters.lowpass_filter.then_some(filters.lowpass_freq),
            compression: filters.compression.then_some(DynamicCompression {
                threshold_dbfs: filters.compression_threshold,
                ratio: filters.compression_ratio,
            }),
        }
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            input_folder: self.paths.input_folder.clone(),
            output_folder: self.paths.output_folder.clone(),
            process_all: self.processing.process_all,
            overwrite: self.processing.overwrite,
            naming_policy: NamingPolicy::from_keep_original_name(self.processing.keep_original_name),
            analysis_enabled: self.quality_analysis.enabled,
            detailed_stats: self.quality_analysis.detailed_stats,
            report_csv: self.quality_analysis.report_csv,
        }
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        match self.ffmpeg.command_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn print_summary(&self) {
        let profile = self.resolve_profile();
        let on_off = |enabled: bool| if enabled { "✓ 启用" } else { "✗ 禁用" };

        println!("\n{}", "=".repeat(70));
        println!("{:^70}", "当前配置");
        println!("{}", "=".repeat(70));

        println!("\n📂 目录:");
        println!("   输入:  {}", self.paths.input_folder.display());
        println!("   输出:  {}", self.paths.output_folder.display());
        println!("   日志:  {}", self.paths.log_folder.display());

        println!("\n🎵 转换配置档: {}", profile.name.to_uppercase());
        println!("   声道:     {}", profile.channels.as_str());
        println!("   码率:     {}", profile.bitrate);
        println!("   采样率:   {} Hz", profile.sample_rate_hz);

        println!("\n🔊 音量归一化: {}", on_off(self.normalization.enabled));
        if self.normalization.enabled {
            println!("   目标电平: {} dBFS", self.normalization.target_level);
        }

        println!("\n🔇 静音移除: {}", on_off(self.silence_removal.enabled));
        if self.silence_removal.enabled {
            println!("   阈值:     {} dBFS", self.silence_removal.silence_threshold);
            println!("   最短时长: {}s", self.silence_removal.min_silence_duration);
        }

        println!("\n✂️  片段移除: {}", on_off(self.segment_removal.enabled));
        if self.segment_removal.enabled {
            println!("   开头:     {}s", self.segment_removal.remove_start);
            println!("   结尾:     {}s", self.segment_removal.remove_end);
        }

        let mut active = Vec::new();
        if self.filters.highpass_filter {
            active.push(format!("高通 ({}Hz)", self.filters.highpass_freq));
        }
        if self.filters.lowpass_filter {
            active.push(format!("低通 ({}Hz)", self.filters.lowpass_freq));
        }
        if self.filters.compression {
            active.push(format!("压缩 ({}:1)", self.filters.compression_ratio));
        }
        println!(
            "\n🎚️  滤镜: {}",
            if active.is_empty() { "✗ 无".to_string() } else { active.join(", ") }
        );

        println!("\n📊 质量分析: {}", on_off(self.quality_analysis.enabled));
        println!("\n⚙️  处理:");
        println!(
            "   处理全部:  {}",
            if self.processing.process_all { "✓ 是" } else { "✗ 否 (仅第一个)" }
        );
        println!(
            "   覆盖输出:  {}",
            if self.processing.overwrite { "✓ 是" } else { "✗ 否 (创建编号版本)" }
        );
        println!("\n{}\n", "=".repeat(70));
    }
}

pub fn parse_log_level(value: &str) -> Option<log::LevelFilter> {
    match value.trim().to_uppercase().as_str() {
        "TRACE" => Some(log::LevelFilter::Trace),
        "DEBUG" => Some(log::LevelFilter::Debug),
        "INFO" => Some(log::LevelFilter::Info),
        "WARNING" | "WARN" => Some(log::LevelFilter::Warn),
        "ERROR" => Some(log::LevelFilter::Error),
        _ => None,
    }
}
