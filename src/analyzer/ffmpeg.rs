use anyhow::{anyhow, Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use which::which;

use super::metrics::AudioStats;
use super::StatisticsExtractor;
use crate::error::AnalysisError;
use crate::interrupt;

/// 外部 FFmpeg 工具的位置与执行参数。
#[derive(Debug, Clone)]
pub struct FfmpegTools {
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    /// `None` 表示不设超时：超时与重试属于外部工具自身的职责。
    pub command_timeout: Option<Duration>,
}

impl FfmpegTools {
    /// 定位 ffmpeg / ffprobe。
    ///
    /// 查找顺序: 配置文件中显式给出的路径，其次是系统 PATH。
    pub fn discover(
        ffmpeg_override: Option<&Path>,
        ffprobe_override: Option<&Path>,
        command_timeout: Option<Duration>,
    ) -> Result<Self> {
        let ffmpeg_path = locate_tool("ffmpeg", ffmpeg_override)?;
        let ffprobe_path = locate_tool("ffprobe", ffprobe_override)?;

        Ok(Self {
            ffmpeg_path,
            ffprobe_path,
            command_timeout,
        })
    }
}

fn locate_tool(name: &str, configured: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = configured {
        if path.exists() {
            log::info!("使用配置的 {name}: {}", path.display());
            return Ok(path.to_path_buf());
        }
        return Err(anyhow!(
            "配置的 {name} 路径不存在: {}",
            path.display()
        ));
    }

    match which(name) {
        Ok(path) => {
            log::info!("成功在系统 PATH 中找到 {name}: {}", path.display());
            Ok(path)
        }
        Err(_) => Err(anyhow!(
            "错误: 在系统 PATH 中找不到 {name} 可执行文件。\n请安装 FFmpeg 并确保其位于 PATH 中，或在 config.toml 的 [ffmpeg] 段中指定路径。"
        )),
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct ProbeData {
    pub has_audio: bool,
    pub sample_rate_hz: Option<u32>,
    pub channels: Option<u32>,
    pub bits_per_sample: Option<u32>,
    pub bits_per_raw_sample: Option<u32>,
    pub sample_fmt: Option<String>,
    pub duration_seconds: Option<f64>,
    /// 容器 (format) 层的时长，即源文件整体播放时长。
    pub container_duration_seconds: Option<f64>,
}

/// astats 的 Overall 段给出的两个电平。
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub(crate) struct LevelStats {
    pub peak_db: f64,
    pub rms_db: f64,
}

#[derive(Debug)]
pub(crate) struct CommandOutput {
    pub status_ok: bool,
    pub stdout: String,
    pub stderr: String,
    pub status_text: String,
}

lazy_static! {
    static ref OVERALL_PEAK_REGEX: Regex =
        Regex::new(r"(?s)Overall.*?Peak level dB:\s*([-+\w.]+)").unwrap();
    static ref OVERALL_RMS_REGEX: Regex =
        Regex::new(r"(?s)Overall.*?RMS level dB:\s*([-+\w.]+)").unwrap();
}

/// 执行外部命令，轮询等待结束。
///
/// 等待期间检查中断标志：收到 SIGINT/SIGTERM 后立即结束子进程并返回 `[E_INTERRUPTED]`，
/// 让调用方走正常的失败路径完成清理。
pub(crate) fn run_command(command: Command, tools: &FfmpegTools) -> Result<CommandOutput> {
    run_command_with(command, tools, &interrupt::is_requested)
}

/// 与 [`run_command`] 相同，但由 `should_stop` 决定何时放弃等待。
pub(crate) fn run_command_with(
    mut command: Command,
    tools: &FfmpegTools,
    should_stop: &dyn Fn() -> bool,
) -> Result<CommandOutput> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = command.spawn().context("[E_EXEC_SPAWN] 启动外部命令失败")?;
    let stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("[E_EXEC_STDOUT] 无法捕获 stdout"))?;
    let stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("[E_EXEC_STDERR] 无法捕获 stderr"))?;

    let stdout_thread = thread::spawn(move || -> Result<Vec<u8>> {
        let mut reader = stdout_pipe;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        Ok(buf)
    });

    let stderr_thread = thread::spawn(move || -> Result<Vec<u8>> {
        let mut reader = stderr_pipe;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        Ok(buf)
    });

    let start = Instant::now();
    let status = loop {
        if let Some(status) = child.try_wait().context("[E_EXEC_WAIT] 等待子进程失败")? {
            break status;
        }

        let timed_out = tools
            .command_timeout
            .is_some_and(|limit| start.elapsed() > limit);

        if timed_out || should_stop() {
            let _ = child.kill();
            let _ = child.wait();

            let _ = stdout_thread.join();
            let _ = stderr_thread.join();

            if timed_out {
                return Err(anyhow!(
                    "[E_TIMEOUT] 外部命令执行超时 (>{:.1}s)",
                    tools.command_timeout.map(|d| d.as_secs_f64()).unwrap_or_default()
                ));
            }
            return Err(anyhow!("[E_INTERRUPTED] 外部命令被中断"));
        }

        thread::sleep(Duration::from_millis(25));
    };

    let stdout_bytes = stdout_thread
        .join()
        .map_err(|_| anyhow!("[E_EXEC_STDOUT] 读取 stdout 线程崩溃"))??;
    let stderr_bytes = stderr_thread
        .join()
        .map_err(|_| anyhow!("[E_EXEC_STDERR] 读取 stderr 线程崩溃"))??;

    Ok(CommandOutput {
        status_ok: status.success(),
        stdout: String::from_utf8_lossy(&stdout_bytes).to_string(),
        stderr: String::from_utf8_lossy(&stderr_bytes).to_string(),
        status_text: status.to_string(),
    })
}

pub(crate) fn run_command_and_get_stderr(command: Command, tools: &FfmpegTools) -> Result<String> {
    let output = run_command(command, tools)?;
    if !output.status_ok {
        return Err(anyhow!(
            "[E_EXEC_FAILED] 命令执行失败 (status: {}): {}",
            output.status_text,
            stderr_tail(&output.stderr, 500)
        ));
    }
    Ok(output.stderr)
}

/// ffmpeg 把真正的错误写在 stderr 的末尾，截取尾部更有用。
pub(crate) fn stderr_tail(stderr: &str, max_chars: usize) -> String {
    let chars: Vec<char> = stderr.trim_end().chars().collect();
    let start = chars.len().saturating_sub(max_chars);
    chars[start..].iter().collect()
}

pub(crate) fn probe(path: &Path, tools: &FfmpegTools) -> Result<ProbeData> {
    let mut command = Command::new(&tools.ffprobe_path);
    command
        .arg("-v")
        .arg("error")
        .arg("-select_streams")
        .arg("a:0")
        .arg("-show_entries")
        .arg("stream=codec_type,sample_rate,channels,bits_per_sample,bits_per_raw_sample,sample_fmt,duration:format=duration")
        .arg("-of")
        .arg("json")
        .arg(path);

    let output = run_command(command, tools)?;
    if !output.status_ok {
        return Err(anyhow!(
            "[E_FFPROBE_FAILED] ffprobe 执行失败 (status: {}): {}",
            output.status_text,
            stderr_tail(&output.stderr, 300)
        ));
    }

    parse_probe_json(&output.stdout)
}

pub(crate) fn parse_probe_json(text: &str) -> Result<ProbeData> {
    let value: Value = serde_json::from_str(text)
        .map_err(|_| anyhow!("[E_PARSE_FFPROBE] ffprobe JSON 解析失败"))?;

    let stream = value
        .get("streams")
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
        .cloned()
        .unwrap_or(Value::Null);

    let format = value.get("format").cloned().unwrap_or(Value::Null);

    let has_audio = match parse_string(stream.get("codec_type")) {
        Some(kind) => kind == "audio",
        None => !stream.is_null(),
    };

    // 流时长优先，它对应解码后的音频长度；部分容器只在 format 中给出
    let container_duration_seconds = parse_f64(format.get("duration"));
    let duration_seconds = parse_f64(stream.get("duration")).or(container_duration_seconds);

    Ok(ProbeData {
        has_audio,
        sample_rate_hz: parse_u32(stream.get("sample_rate")),
        channels: parse_u32(stream.get("channels")),
        bits_per_sample: parse_u32(stream.get("bits_per_sample")).filter(|&b| b > 0),
        bits_per_raw_sample: parse_u32(stream.get("bits_per_raw_sample")).filter(|&b| b > 0),
        sample_fmt: parse_string(stream.get("sample_fmt")),
        duration_seconds,
        container_duration_seconds,
    })
}

/// 解码位深：`bits_per_sample` > `bits_per_raw_sample` > `sample_fmt`。
///
/// 浮点格式（MP3/AAC 解码器的 fltp 等）没有整数位宽，按 16 bit 解码宽度计。
pub(crate) fn resolve_bit_depth(probe: &ProbeData) -> u32 {
    if let Some(bits) = probe.bits_per_sample.or(probe.bits_per_raw_sample) {
        return bits;
    }

    match probe.sample_fmt.as_deref().map(|f| f.trim_end_matches('p')) {
        Some("u8") => 8,
        Some("s16") => 16,
        Some("s32") => 32,
        Some("s64") => 64,
        _ => 16,
    }
}

pub(crate) fn measure_levels(path: &Path, tools: &FfmpegTools) -> Result<LevelStats> {
    let mut command = Command::new(&tools.ffmpeg_path);
    command
        .arg("-hide_banner")
        .arg("-nostats")
        .arg("-i")
        .arg(path)
        .arg("-filter:a")
        .arg("astats=metadata=1")
        .arg("-f")
        .arg("null")
        .arg("-");

    let stderr = run_command_and_get_stderr(command, tools)?;
    parse_astats_levels(&stderr)
}

pub(crate) fn parse_astats_levels(stderr: &str) -> Result<LevelStats> {
    let capture = |regex: &Regex| {
        regex
            .captures(stderr)
            .and_then(|caps| caps.get(1))
            .and_then(|m| parse_float_token(m.as_str()))
    };

    match (capture(&OVERALL_PEAK_REGEX), capture(&OVERALL_RMS_REGEX)) {
        (Some(peak_db), Some(rms_db)) => Ok(LevelStats { peak_db, rms_db }),
        _ => Err(anyhow!("[E_PARSE_STATS] 无法解析峰值/RMS")),
    }
}

fn parse_float_token(token: &str) -> Option<f64> {
    let text = token.trim().to_ascii_lowercase();
    match text.as_str() {
        "inf" | "+inf" => Some(f64::INFINITY),
        "-inf" => Some(f64::NEG_INFINITY),
        "nan" => None,
        _ => text.parse::<f64>().ok(),
    }
}

fn parse_u32(value: Option<&Value>) -> Option<u32> {
    parse_u64(value).and_then(|v| u32::try_from(v).ok())
}

fn parse_u64(value: Option<&Value>) -> Option<u64> {
    match value {
        Some(Value::Number(num)) => num.as_u64(),
        Some(Value::String(s)) => s.parse::<u64>().ok(),
        _ => None,
    }
}

fn parse_f64(value: Option<&Value>) -> Option<f64> {
    match value {
        Some(Value::Number(num)) => num.as_f64(),
        Some(Value::String(s)) => s.parse::<f64>().ok(),
        _ => None,
    }
}

fn parse_string(value: Option<&Value>) -> Option<String> {
    value.and_then(|v| v.as_str()).map(ToOwned::to_owned)
}

/// 基于 ffprobe + astats 的统计提取器。只读检查，不修改产物。
#[derive(Debug, Clone)]
pub struct FfmpegStatsExtractor {
    tools: FfmpegTools,
}

impl FfmpegStatsExtractor {
    pub fn new(tools: FfmpegTools) -> Self {
        Self { tools }
    }
}

impl StatisticsExtractor for FfmpegStatsExtractor {
    fn extract(&self, path: &Path) -> Result<AudioStats, AnalysisError> {
        let size_bytes = path
            .metadata()
            .map_err(|e| AnalysisError::unreadable(path, format!("无法读取文件元数据: {e}")))?
            .len();

        if size_bytes == 0 {
            return Err(AnalysisError::unreadable(path, "文件为空"));
        }

        // 两次只读检查互不依赖，并行执行
        let (probe_res, levels_res) = rayon::join(
            || probe(path, &self.tools),
            || measure_levels(path, &self.tools),
        );

        let probe = probe_res.map_err(|e| AnalysisError::unreadable(path, e.to_string()))?;
        let levels = levels_res.map_err(|e| AnalysisError::unreadable(path, e.to_string()))?;

        build_stats(path, &probe, levels, size_bytes)
    }
}

fn build_stats(
    path: &Path,
    probe: &ProbeData,
    levels: LevelStats,
    size_bytes: u64,
) -> Result<AudioStats, AnalysisError> {
    if !probe.has_audio {
        return Err(AnalysisError::unreadable(path, "未找到音频流"));
    }

    let sample_rate_hz = probe
        .sample_rate_hz
        .filter(|&sr| sr > 0)
        .ok_or_else(|| AnalysisError::unreadable(path, "无法确定采样率"))?;
    let channels = probe
        .channels
        .filter(|&ch| ch > 0)
        .ok_or_else(|| AnalysisError::unreadable(path, "无法确定声道数"))?;
    let duration_seconds = probe
        .duration_seconds
        .filter(|d| d.is_finite() && *d >= 0.0)
        .ok_or_else(|| AnalysisError::unreadable(path, "无法确定时长"))?;

    Ok(AudioStats::from_measurements(
        duration_seconds,
        sample_rate_hz,
        channels,
        resolve_bit_depth(probe),
        levels.peak_db,
        levels.rms_db,
        size_bytes,
    ))
}
