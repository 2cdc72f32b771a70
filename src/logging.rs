use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Local};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::config::{parse_log_level, LoggingConfig};

/// 同时写入 stderr 和日志文件。
struct TeeWriter {
    file: File,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // 终端不可写（例如管道已关闭）不应影响日志文件
        let _ = io::stderr().write_all(buf);
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let _ = io::stderr().flush();
        self.file.flush()
    }
}

/// 日志文件名。带时间戳时为 `<stem>_<YYYYmmdd_HHMMSS><ext>`。
pub fn log_file_name(log_file: &str, timestamp: Option<DateTime<Local>>) -> String {
    let Some(ts) = timestamp else {
        return log_file.to_string();
    };

    let path = Path::new(log_file);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video_to_audio".to_string());
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    format!("{stem}_{}{ext}", ts.format("%Y%m%d_%H%M%S"))
}

/// 命令行 `-v` 的次数优先于配置中的级别。
fn effective_level(config_level: log::LevelFilter, verbose: u8) -> log::LevelFilter {
    match verbose {
        0 => config_level,
        1 => config_level.max(log::LevelFilter::Debug),
        _ => log::LevelFilter::Trace,
    }
}

/// 初始化全局日志：stderr + `<log_folder>/<log_file>`。`RUST_LOG` 覆盖配置级别。
///
/// 返回日志文件的路径。
pub fn init(config: &LoggingConfig, log_folder: &Path, verbose: u8) -> Result<PathBuf> {
    fs::create_dir_all(log_folder)
        .with_context(|| format!("无法创建日志目录: {}", log_folder.display()))?;

    let now = Local::now();
    let file_name = log_file_name(&config.log_file, config.log_with_timestamp.then_some(now));
    let log_path = log_folder.join(file_name);
    let file = File::create(&log_path)
        .with_context(|| format!("无法创建日志文件: {}", log_path.display()))?;

    let config_level = parse_log_level(&config.log_level);
    let level = effective_level(config_level.unwrap_or(log::LevelFilter::Info), verbose);
    let filter = level.to_string().to_lowercase();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} - {} - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .target(env_logger::Target::Pipe(Box::new(TeeWriter { file })))
        .try_init()
        .map_err(|e| anyhow!("日志系统初始化失败: {e}"))?;

    if config_level.is_none() {
        log::warn!("未知的日志级别 '{}'，使用 INFO", config.log_level);
    }

    log::info!("{}", "=".repeat(70));
    log::info!("视频转音频转换器 - 会话开始");
    log::info!("时间: {}", now.format("%d/%m/%Y %H:%M:%S"));
    log::info!("{}", "=".repeat(70));

    Ok(log_path)
}

pub fn log_session_end() {
    log::info!("{}", "=".repeat(70));
    log::info!("会话结束");
    log::info!("{}", "=".repeat(70));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_log_file_name_with_timestamp() {
        let ts = Local
            .with_ymd_and_hms(2024, 3, 9, 14, 5, 7)
            .single()
            .expect("valid local time");
        assert_eq!(
            log_file_name("video_to_audio.log", Some(ts)),
            "video_to_audio_20240309_140507.log"
        );
        assert_eq!(log_file_name("run", Some(ts)), "run_20240309_140507");
    }

    #[test]
    fn test_log_file_name_without_timestamp() {
        assert_eq!(log_file_name("video_to_audio.log", None), "video_to_audio.log");
    }

    #[test]
    fn test_verbose_flag_raises_level() {
        use log::LevelFilter;
        assert_eq!(effective_level(LevelFilter::Warn, 0), LevelFilter::Warn);
        assert_eq!(effective_level(LevelFilter::Warn, 1), LevelFilter::Debug);
        assert_eq!(effective_level(LevelFilter::Trace, 1), LevelFilter::Trace);
        assert_eq!(effective_level(LevelFilter::Info, 3), LevelFilter::Trace);
    }
}
