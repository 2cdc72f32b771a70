use anyhow::{Context, Result};
use csv::WriterBuilder;
use serde::Serialize;
use std::path::Path;

use super::metrics::{bytes_to_mb, AudioStats, ConversionAnalysis};
use super::safe_io;
use super::scoring::QualityScorer;
use crate::pipeline::orchestrator::{ConversionOutcome, ItemStatus, RunStatistics};

const RULE_WIDTH: usize = 70;

pub struct ReportGenerator {
    detailed_stats: bool,
    safe_mode: bool,
}

impl ReportGenerator {
    pub fn new(detailed_stats: bool) -> Self {
        Self {
            detailed_stats,
            safe_mode: true,
        }
    }

    /// 单个条目的转换结果块，面向终端。
    pub fn render_item_summary(&self, analysis: &ConversionAnalysis) -> String {
        let comp = &analysis.compression;
        let quality = &analysis.quality;

        let mut out = String::new();
        out.push_str(&banner("转换结果"));
        out.push_str(&format!(
            "\n📦 压缩: {:.2}MB → {:.2}MB ({:.1}% 缩减)\n",
            comp.original_size_mb(),
            comp.converted_size_mb(),
            comp.reduction_percent
        ));
        out.push_str(&format!(
            "⭐ 质量:  {} ({}/100)\n",
            quality.category, quality.score
        ));
        out.push('\n');
        out.push_str(&rule());
        out
    }

    /// 把分析结果写入日志。`detailed_stats` 关闭时只写两行摘要。
    pub fn log_analysis(&self, analysis: &ConversionAnalysis) {
        let comp = &analysis.compression;
        let quality = &analysis.quality;

        if !self.detailed_stats {
            log::info!(
                "压缩: {:.1}% ({:.2}MB → {:.2}MB)",
                comp.reduction_percent,
                comp.original_size_mb(),
                comp.converted_size_mb()
            );
            log::info!("质量: {} (分数: {}/100)", quality.category, quality.score);
            return;
        }

        log::info!("{}", "=".repeat(RULE_WIDTH));
        log::info!("{:^width$}", "质量分析", width = RULE_WIDTH);
        log::info!("{}", "=".repeat(RULE_WIDTH));

        log::info!("📹 原始视频:");
        log::info!("   时长: {}", format_duration(analysis.source_duration_seconds));

        log_stats_block("🎵 提取的音频 (WAV):", &analysis.before);
        log_stats_block("🎧 转换后的音频 (MP3):", &analysis.after);

        log::info!("📊 压缩:");
        log::info!("   原始大小:  {:.2} MB", comp.original_size_mb());
        log::info!("   最终大小:  {:.2} MB", comp.converted_size_mb());
        log::info!(
            "   缩减:      {:.2} MB ({:.1}%)",
            comp.reduction_mb(),
            comp.reduction_percent
        );

        log::info!("⭐ 最终质量:");
        log::info!("   分数:  {}/100", quality.score);
        log::info!("   分类:  {}", quality.category);
        let points = QualityScorer::new().breakdown(&analysis.after);
        log::info!(
            "   明细:  采样率 {} + 码率 {} + 声道 {} + 位深 {}",
            points.sample_rate,
            points.bitrate,
            points.channels,
            points.bit_depth
        );
        log::info!("{}", "=".repeat(RULE_WIDTH));
    }

    /// 整个运行的汇总块。
    pub fn render_run_summary(&self, stats: &RunStatistics) -> String {
        let elapsed = stats.elapsed_seconds();

        let mut out = String::new();
        out.push('\n');
        out.push_str(&banner("处理完成"));
        out.push_str(&format!("\n📊 视频总数:        {}\n", stats.total));
        out.push_str(&format!("✅ 转换成功:        {}\n", stats.succeeded));
        out.push_str(&format!("❌ 失败:            {}\n", stats.failed));

        if let Some(rate) = stats.success_rate() {
            out.push_str(&format!("📈 成功率:          {rate:.1}%\n"));
        }

        out.push_str(&format!("⏱️  总耗时:          {elapsed:.1}s\n"));

        if stats.succeeded > 0 {
            let average = elapsed / stats.succeeded as f64;
            out.push_str(&format!("⌛ 平均耗时/视频:   {average:.1}s\n"));
        }

        if stats.interrupted {
            out.push_str("\n⚠️  处理被用户中断，剩余视频未处理\n");
        }

        out.push('\n');
        out.push_str(&rule());
        out
    }

    pub fn generate_csv_report<P: AsRef<Path>>(
        &self,
        records: &[CsvRecord],
        output_path: P,
    ) -> Result<()> {
        let mut buffer: Vec<u8> = Vec::new();
        {
            let mut writer = WriterBuilder::new()
                .has_headers(true)
                .from_writer(&mut buffer);

            for record in records {
                writer.serialize(record).context("写入CSV记录失败")?;
            }

            writer.flush().context("刷新CSV缓冲失败")?;
        }

        safe_io::atomic_write_bytes(output_path.as_ref(), &buffer, self.safe_mode)?;
        log::info!("CSV报告已保存到: {}", output_path.as_ref().display());
        Ok(())
    }
}

fn log_stats_block(title: &str, stats: &AudioStats) {
    log::info!("{title}");
    log::info!("   时长:     {}", format_duration(stats.duration_seconds));
    log::info!("   采样率:   {} Hz", stats.sample_rate_hz);
    log::info!(
        "   声道:     {} ({})",
        stats.channels,
        if stats.is_stereo() { "Stereo" } else { "Mono" }
    );
    log::info!("   位深:     {} bits", stats.bit_depth);
    log::info!("   码率:     ~{} kbps", stats.estimated_bitrate_kbps);
    log::info!(
        "   dBFS:     {:.2} (max: {:.2})",
        stats.average_level_dbfs,
        stats.peak_level_dbfs
    );
    log::info!("   大小:     {:.2} MB", stats.size_mb());
}

fn rule() -> String {
    format!("{}\n", "=".repeat(RULE_WIDTH))
}

fn banner(title: &str) -> String {
    format!("{}{:^width$}\n{}", rule(), title, rule(), width = RULE_WIDTH)
}

/// 秒数格式化为 `MM:SS`，超过一小时为 `HH:MM:SS`。
pub fn format_duration(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds as u64
    } else {
        0
    };
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;

    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes:02}:{secs:02}")
    }
}

/// 去掉文件名中的控制字符，避免污染终端输出。
pub fn sanitize_for_terminal(input: &str) -> String {
    input
        .chars()
        .filter(|ch| {
            let c = *ch as u32;
            c == 0x09 || c == 0x20 || (0x21..=0x7e).contains(&c) || c >= 0xa0
        })
        .collect()
}

/// CSV 报告中的一行，按处理顺序写出。
#[derive(Debug, Serialize)]
pub struct CsvRecord {
    #[serde(rename = "源文件")]
    source_path: String,
    #[serde(rename = "输出文件")]
    output_path: String,
    #[serde(rename = "状态")]
    status: String,
    #[serde(rename = "失败阶段")]
    failed_at: String,
    #[serde(rename = "错误码")]
    error_code: String,
    #[serde(rename = "失败原因")]
    failure_reason: String,
    #[serde(rename = "时长(秒)")]
    duration_seconds: f64,
    #[serde(rename = "原始大小(MB)")]
    original_size_mb: Option<f64>,
    #[serde(rename = "转换后大小(MB)")]
    converted_size_mb: Option<f64>,
    #[serde(rename = "缩减比例(%)")]
    reduction_percent: Option<f64>,
    #[serde(rename = "质量分")]
    quality_score: Option<u32>,
    #[serde(rename = "质量分类")]
    quality_category: Option<String>,
    #[serde(rename = "采样率(Hz)")]
    sample_rate_hz: Option<u32>,
    #[serde(rename = "码率(kbps)")]
    bitrate_kbps: Option<u32>,
    #[serde(rename = "声道数")]
    channels: Option<u32>,
    #[serde(rename = "位深")]
    bit_depth: Option<u32>,
}

impl CsvRecord {
    pub fn from_outcome(outcome: &ConversionOutcome) -> Self {
        let (status, failed_at, error_code, failure_reason) = match &outcome.status {
            ItemStatus::Succeeded => ("成功".to_string(), String::new(), String::new(), String::new()),
            ItemStatus::Failed { at, reason } => (
                "失败".to_string(),
                at.to_string(),
                reason.code().to_string(),
                reason.to_string(),
            ),
        };

        let analysis = outcome.analysis.as_ref();
        let after = analysis.map(|a| &a.after);

        Self {
            source_path: outcome.source_path.to_string_lossy().into_owned(),
            output_path: outcome
                .output_path
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default(),
            status,
            failed_at,
            error_code,
            failure_reason,
            duration_seconds: outcome.duration_seconds,
            original_size_mb: analysis.map(|a| bytes_to_mb(a.compression.original_size_bytes as f64)),
            converted_size_mb: analysis.map(|a| bytes_to_mb(a.compression.converted_size_bytes as f64)),
            reduction_percent: analysis.map(|a| (a.compression.reduction_percent * 10.0).round() / 10.0),
            quality_score: analysis.map(|a| a.quality.score),
            quality_category: analysis.map(|a| a.quality.category.to_string()),
            sample_rate_hz: after.map(|s| s.sample_rate_hz),
            bitrate_kbps: after.map(|s| s.estimated_bitrate_kbps),
            channels: after.map(|s| s.channels),
            bit_depth: after.map(|s| s.bit_depth),
        }
    }
}
