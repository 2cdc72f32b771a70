// ================================================================
// 项目: 视频转音频转换器 (VideoToAudio-rs)
// 文件: src/main.rs
// 版本: 1.0.0
// 描述: 程序主入口点，负责命令行解析、配置加载和转换流程装配
//
// 功能概述:
// - 批量把输入目录中的 MP4 视频转换为 MP3 音频
// - 按配置档执行归一化、静音移除、片段裁剪和滤镜处理
// - 对每个转换结果进行质量评分和压缩对比
// - Ctrl+C 时清理当前条目的临时文件并打印汇总
// ================================================================

mod analyzer;
mod config;
mod error;
mod interrupt;
mod logging;
mod pipeline;

// ================================================================
// 依赖导入 (Dependencies Import)
// ================================================================

// --- 内部模块导入 (Internal Modules) ---
use crate::analyzer::ffmpeg::{FfmpegStatsExtractor, FfmpegTools};
use crate::config::{AppConfig, DEFAULT_CONFIG_FILE};
use crate::pipeline::convert::FfmpegConverter;
use crate::pipeline::extract::FfmpegExtractor;
use crate::pipeline::orchestrator::ConversionOrchestrator;

// --- 外部依赖导入 (External Dependencies) ---
use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use std::fs;
use std::path::PathBuf;

// ================================================================
// 命令行接口定义 (Command Line Interface Definition)
// ================================================================

/// 程序命令行接口结构体
///
/// 所有处理参数都来自配置文件，命令行只提供少量覆盖项。
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "基于 FFmpeg 的批量视频转音频工具",
    long_about = "扫描输入目录中的 MP4 视频，提取音轨并按配置档转换为 MP3，随后对结果进行质量评分。所有参数由 TOML 配置文件提供。"
)]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, value_name = "PATH", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// 只处理排序后的第一个视频，用于试验配置档
    #[arg(long)]
    first_only: bool,

    /// 覆盖已存在的输出文件，而不是创建编号版本
    #[arg(long)]
    overwrite: bool,

    /// 提高日志详细程度 (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// 创建输入、输出和日志目录（已存在时不做任何事）。
fn setup_folders(config: &AppConfig) -> Result<()> {
    for folder in [
        &config.paths.input_folder,
        &config.paths.output_folder,
        &config.paths.log_folder,
    ] {
        fs::create_dir_all(folder)
            .with_context(|| format!("无法创建目录: {}", folder.display()))?;
    }
    Ok(())
}

/// 装配各组件并执行一次完整的批量转换。
fn run(cli: Cli) -> Result<()> {
    let mut config = AppConfig::load(&cli.config)?;
    if cli.first_only {
        config.processing.process_all = false;
    }
    if cli.overwrite {
        config.processing.overwrite = true;
    }

    setup_folders(&config)?;
    let log_path = logging::init(&config.logging, &config.paths.log_folder, cli.verbose)?;

    println!("\n{}", "=".repeat(70));
    println!("{:^70}", "🎬 视频转音频转换器 🎵");
    println!("{}", "=".repeat(70));
    println!("开始时间: {}", Local::now().format("%Y-%m-%d %H:%M:%S"));
    println!("日志文件: {}", log_path.display());
    config.print_summary();

    interrupt::install();

    // --- 环境检查：定位 FFmpeg ---
    let tools = FfmpegTools::discover(
        config.ffmpeg.ffmpeg_path.as_deref(),
        config.ffmpeg.ffprobe_path.as_deref(),
        config.command_timeout(),
    )?;

    let extractor = FfmpegExtractor::new(tools.clone());
    let converter = FfmpegConverter::new(tools.clone(), config.conversion_settings());
    let stats_extractor = FfmpegStatsExtractor::new(tools);

    let orchestrator =
        ConversionOrchestrator::new(config.run_options(), &extractor, &converter, &stats_extractor);
    let stats = orchestrator.run()?;

    if stats.interrupted {
        println!("\n⚠️  处理已被用户中断");
    }
    println!("结束时间: {}", Local::now().format("%Y-%m-%d %H:%M:%S"));
    logging::log_session_end();

    Ok(())
}

// --- 程序入口 ---

/// 程序的主函数。致命错误（配置、FFmpeg、输入目录）以非零状态退出。
fn main() -> Result<()> {
    let cli = Cli::parse();
    run(cli).map_err(|e| {
        log::error!("致命错误: {e:#}");
        e
    })
}

// --- 单元测试 ---
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["video-to-audio"]);
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_FILE));
        assert!(!cli.first_only);
        assert!(!cli.overwrite);
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "video-to-audio",
            "--config",
            "custom.toml",
            "--first-only",
            "--overwrite",
            "-vv",
        ]);
        assert_eq!(cli.config, PathBuf::from("custom.toml"));
        assert!(cli.first_only);
        assert!(cli.overwrite);
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_setup_folders_creates_all() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let text = format!(
            "[paths]\ninput_folder = {:?}\noutput_folder = {:?}\nlog_folder = {:?}\n[processing]\n[profile]\n",
            dir.path().join("in").to_string_lossy(),
            dir.path().join("out").to_string_lossy(),
            dir.path().join("logs").to_string_lossy(),
        );
        let config = AppConfig::from_toml_str(&text).expect("parse");
        setup_folders(&config).expect("setup");
        assert!(dir.path().join("in").is_dir());
        assert!(dir.path().join("out").is_dir());
        assert!(dir.path().join("logs").is_dir());
    }
}
