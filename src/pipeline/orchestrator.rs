use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use indicatif::{ProgressBar, ProgressStyle};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::convert::AudioConverter;
use super::extract::AudioExtractor;
use super::naming::{NamingPolicy, OutputNamer};
use super::temp::TempArtifact;
use crate::analyzer::compression::CompressionReporter;
use crate::analyzer::metrics::ConversionAnalysis;
use crate::analyzer::report::{format_duration, sanitize_for_terminal, CsvRecord, ReportGenerator};
use crate::analyzer::scoring::QualityScorer;
use crate::analyzer::StatisticsExtractor;
use crate::error::FailureReason;
use crate::interrupt;

/// 唯一接受的输入容器扩展名（大小写不敏感）。
pub const INPUT_EXTENSION: &str = "mp4";

/// CSV 运行报告在输出目录中的文件名。
pub const CSV_REPORT_FILE_NAME: &str = "conversion_report.csv";

/// 单个条目的处理状态。`Succeeded` 和 `Failed` 是终态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    Pending,
    Validating,
    Extracting,
    Converting,
    Analyzing,
    Reporting,
    Succeeded,
    Failed,
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ItemState::Pending => "待处理",
            ItemState::Validating => "校验",
            ItemState::Extracting => "提取",
            ItemState::Converting => "转换",
            ItemState::Analyzing => "分析",
            ItemState::Reporting => "报告",
            ItemState::Succeeded => "成功",
            ItemState::Failed => "失败",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemStatus {
    Succeeded,
    /// `at` 是失败发生时所处的阶段。
    Failed { at: ItemState, reason: FailureReason },
}

/// 一个条目的处理结果，只在该条目的报告阶段内存活。
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionOutcome {
    pub source_path: PathBuf,
    pub output_path: Option<PathBuf>,
    pub status: ItemStatus,
    /// 提取阶段报告的源时长；提取失败时为 0。
    pub duration_seconds: f64,
    /// 仅在分析开启且成功时存在。
    pub analysis: Option<ConversionAnalysis>,
}

impl ConversionOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self.status, ItemStatus::Succeeded)
    }

    pub fn failure_reason(&self) -> Option<&FailureReason> {
        match &self.status {
            ItemStatus::Succeeded => None,
            ItemStatus::Failed { reason, .. } => Some(reason),
        }
    }
}

/// 整个运行的累计统计。每个被尝试的条目恰好记录一次。
#[derive(Debug, Clone)]
pub struct RunStatistics {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub started_at: DateTime<Local>,
    pub ended_at: Option<DateTime<Local>>,
    pub interrupted: bool,
}

impl RunStatistics {
    pub fn start() -> Self {
        Self {
            total: 0,
            succeeded: 0,
            failed: 0,
            started_at: Local::now(),
            ended_at: None,
            interrupted: false,
        }
    }

    pub fn record(&mut self, outcome: &ConversionOutcome) {
        self.total += 1;
        if outcome.succeeded() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }

    pub fn finish(&mut self) {
        self.ended_at = Some(Local::now());
    }

    /// 成功率（百分比）；没有尝试任何条目时为 `None`。
    pub fn success_rate(&self) -> Option<f64> {
        if self.total == 0 {
            None
        } else {
            Some(self.succeeded as f64 / self.total as f64 * 100.0)
        }
    }

    pub fn elapsed_seconds(&self) -> f64 {
        let end = self.ended_at.unwrap_or_else(Local::now);
        (end - self.started_at).num_milliseconds().max(0) as f64 / 1000.0
    }
}

/// 编排器需要的运行参数，由配置和命令行覆盖项组合而成。
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    pub input_folder: PathBuf,
    pub output_folder: PathBuf,
    pub process_all: bool,
    pub overwrite: bool,
    pub naming_policy: NamingPolicy,
    pub analysis_enabled: bool,
    pub detailed_stats: bool,
    pub report_csv: bool,
}

/// 终端输出。进度条可见时借道 `ProgressBar::println`，隐藏时（非 TTY）直接打印。
struct Console {
    bar: ProgressBar,
}

impl Console {
    fn new(len: usize) -> Self {
        let bar = ProgressBar::new(len as u64);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) - {msg}")
            .map(|s| s.progress_chars("#>- "))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        Self { bar }
    }

    fn line(&self, message: impl AsRef<str>) {
        if self.bar.is_hidden() {
            println!("{}", message.as_ref());
        } else {
            self.bar.println(message.as_ref());
        }
    }
}

/// 单个条目在状态机中的可变上下文。
struct ItemProgress {
    state: ItemState,
    output_path: Option<PathBuf>,
    duration_seconds: f64,
}

impl ItemProgress {
    fn new() -> Self {
        Self {
            state: ItemState::Pending,
            output_path: None,
            duration_seconds: 0.0,
        }
    }

    fn advance(&mut self, next: ItemState) {
        log::debug!("状态: {} -> {}", self.state, next);
        self.state = next;
    }
}

/// 批量转换编排器。条目严格串行处理，一个条目的失败不会中止整个运行。
pub struct ConversionOrchestrator<'a> {
    options: RunOptions,
    namer: OutputNamer,
    extractor: &'a dyn AudioExtractor,
    converter: &'a dyn AudioConverter,
    stats_extractor: &'a dyn StatisticsExtractor,
    scorer: QualityScorer,
    compression: CompressionReporter,
    report: ReportGenerator,
    interrupt_check: Box<dyn Fn() -> bool + 'a>,
}

impl<'a> ConversionOrchestrator<'a> {
    pub fn new(
        options: RunOptions,
        extractor: &'a dyn AudioExtractor,
        converter: &'a dyn AudioConverter,
        stats_extractor: &'a dyn StatisticsExtractor,
    ) -> Self {
        let namer = OutputNamer::new(&options.output_folder, options.naming_policy, options.overwrite);
        let report = ReportGenerator::new(options.detailed_stats);
        Self {
            options,
            namer,
            extractor,
            converter,
            stats_extractor,
            scorer: QualityScorer::new(),
            compression: CompressionReporter::new(),
            report,
            interrupt_check: Box::new(interrupt::is_requested),
        }
    }

    /// 替换中断检查，默认读取进程级的信号标志。
    #[cfg(test)]
    fn with_interrupt_check(mut self, check: impl Fn() -> bool + 'a) -> Self {
        self.interrupt_check = Box::new(check);
        self
    }

    /// 列出输入目录（不递归）中的视频，按文件名字典序排列。
    ///
    /// 目录无法读取是整个运行唯一的致命错误。
    pub fn collect_inputs(&self) -> Result<Vec<PathBuf>> {
        let mut inputs = Vec::new();
        for entry in WalkDir::new(&self.options.input_folder)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.with_context(|| {
                format!("无法读取输入目录: {}", self.options.input_folder.display())
            })?;
            if entry.file_type().is_file() && has_input_extension(entry.path()) {
                inputs.push(entry.into_path());
            }
        }

        if !self.options.process_all {
            inputs.truncate(1);
        }
        Ok(inputs)
    }

    /// 处理整个批次并打印汇总，按需写出 CSV 报告。
    pub fn run(&self) -> Result<RunStatistics> {
        let mut records = Vec::new();
        let report_csv = self.options.report_csv;

        let stats = self.run_with(|outcome| {
            if report_csv {
                records.push(CsvRecord::from_outcome(outcome));
            }
        })?;

        if report_csv && !records.is_empty() {
            let path = self.options.output_folder.join(CSV_REPORT_FILE_NAME);
            // 报告写失败不影响已完成的转换
            if let Err(e) = self.report.generate_csv_report(&records, &path) {
                log::error!("写入CSV报告失败: {e:#}");
            }
        }

        Ok(stats)
    }

    /// 与 `run` 相同，但每个条目进入终态后把结果交给 `on_outcome`。
    pub fn run_with<F>(&self, mut on_outcome: F) -> Result<RunStatistics>
    where
        F: FnMut(&ConversionOutcome),
    {
        let mut stats = RunStatistics::start();
        let inputs = self.collect_inputs()?;

        if inputs.is_empty() {
            log::warn!("在 {} 中没有找到视频文件", self.options.input_folder.display());
            println!(
                "⚠️  在 {} 中没有找到 .{INPUT_EXTENSION} 视频",
                self.options.input_folder.display()
            );
            stats.finish();
            println!("{}", self.report.render_run_summary(&stats));
            return Ok(stats);
        }

        if !self.options.process_all {
            println!("⚠️  测试模式: 只处理第一个视频");
        }
        log::info!("找到 {} 个待处理视频", inputs.len());

        let console = Console::new(inputs.len());
        let total = inputs.len();

        for (index, source) in inputs.iter().enumerate() {
            if (self.interrupt_check)() {
                log::warn!("收到中断请求，停止处理剩余 {} 个视频", total - index);
                stats.interrupted = true;
                break;
            }

            console.bar.set_message(display_name(source));
            console.line(format!("\n{}", "=".repeat(70)));
            console.line(format!("正在处理 {}/{}: {}", index + 1, total, display_name(source)));
            console.line("=".repeat(70));

            let outcome = self.process_item(source, &console);
            stats.record(&outcome);
            on_outcome(&outcome);
            console.bar.inc(1);

            if outcome.failure_reason() == Some(&FailureReason::Interrupted) {
                stats.interrupted = true;
                break;
            }
        }

        console.bar.finish_and_clear();
        stats.finish();

        println!("{}", self.report.render_run_summary(&stats));
        log::info!(
            "处理完成: {}/{} 成功, {} 失败",
            stats.succeeded,
            stats.total,
            stats.failed
        );

        Ok(stats)
    }

    /// 让单个条目走完状态机。panic 被捕获为 `UnexpectedError`，临时产物在返回前已经删除。
    fn process_item(&self, source: &Path, console: &Console) -> ConversionOutcome {
        let mut progress = ItemProgress::new();

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.drive(source, &mut progress, console)
        }));

        let status = match result {
            Ok(Ok(analysis)) => {
                progress.advance(ItemState::Succeeded);
                console.line("✅ 视频处理成功!");
                return ConversionOutcome {
                    source_path: source.to_path_buf(),
                    output_path: progress.output_path,
                    status: ItemStatus::Succeeded,
                    duration_seconds: progress.duration_seconds,
                    analysis,
                };
            }
            Ok(Err(reason)) => ItemStatus::Failed {
                at: progress.state,
                reason,
            },
            Err(payload) => ItemStatus::Failed {
                at: progress.state,
                reason: FailureReason::UnexpectedError(panic_detail(payload.as_ref())),
            },
        };

        if let ItemStatus::Failed { at, reason } = &status {
            log::error!(
                "[{}] {} 在{}阶段失败: {reason}",
                reason.code(),
                source.display(),
                at
            );
            console.line(format!("❌ {reason}"));
        }
        progress.advance(ItemState::Failed);

        ConversionOutcome {
            source_path: source.to_path_buf(),
            output_path: progress.output_path,
            status,
            duration_seconds: progress.duration_seconds,
            analysis: None,
        }
    }

    fn drive(
        &self,
        source: &Path,
        progress: &mut ItemProgress,
        console: &Console,
    ) -> Result<Option<ConversionAnalysis>, FailureReason> {
        progress.advance(ItemState::Validating);
        validate_input(source)?;

        progress.advance(ItemState::Extracting);
        let output_path = self.namer.name(source, |p| p.exists())?;
        progress.output_path = Some(output_path.clone());
        console.line(format!("📤 输出: {}", display_name(&output_path)));

        let temp = TempArtifact::acquire(&self.options.output_folder);

        console.line("🎬 [1/3] 正在从视频中提取音频...");
        let extraction = self.extractor.extract_audio(source, temp.path());
        if !extraction.success {
            return Err(self.stage_failure(FailureReason::ExtractionFailed(extraction.message)));
        }
        progress.duration_seconds = extraction.duration_seconds;
        console.line(format!(
            "✅ 音频已提取 ({})",
            format_duration(extraction.duration_seconds)
        ));

        progress.advance(ItemState::Converting);
        console.line("🎵 [2/3] 正在转换并优化音频...");
        let conversion = self.converter.convert_audio(temp.path(), &output_path);
        if !conversion.success {
            return Err(self.stage_failure(FailureReason::ConversionFailed(conversion.message)));
        }
        console.line("✅ 转换完成");

        progress.advance(ItemState::Analyzing);
        let analysis = if self.options.analysis_enabled {
            console.line("📊 [3/3] 正在分析质量...");
            self.analyze(temp.path(), &output_path, progress.duration_seconds)
        } else {
            None
        };

        progress.advance(ItemState::Reporting);
        if let Some(analysis) = &analysis {
            self.report.log_analysis(analysis);
            console.line(self.report.render_item_summary(analysis));
        }

        Ok(analysis)
    }

    fn analyze(
        &self,
        intermediate: &Path,
        output: &Path,
        source_duration_seconds: f64,
    ) -> Option<ConversionAnalysis> {
        let stats = self
            .stats_extractor
            .extract(intermediate)
            .and_then(|before| self.stats_extractor.extract(output).map(|after| (before, after)));

        match stats {
            Ok((before, after)) => Some(ConversionAnalysis {
                source_duration_seconds,
                before,
                after,
                compression: self.compression.compare(&before, &after),
                quality: self.scorer.score(&after),
            }),
            Err(e) => {
                log::warn!("质量分析失败，结果不含统计信息: {e}");
                None
            }
        }
    }

    /// 阶段失败时若已收到中断请求，则归因为中断。
    fn stage_failure(&self, reason: FailureReason) -> FailureReason {
        if (self.interrupt_check)() {
            FailureReason::Interrupted
        } else {
            reason
        }
    }
}

fn validate_input(source: &Path) -> Result<(), FailureReason> {
    let metadata = std::fs::metadata(source)
        .map_err(|e| FailureReason::InvalidInput(format!("文件不存在或无法访问 {}: {e}", source.display())))?;

    if !metadata.is_file() {
        return Err(FailureReason::InvalidInput(format!(
            "不是普通文件: {}",
            source.display()
        )));
    }

    if !has_input_extension(source) {
        return Err(FailureReason::InvalidInput(format!(
            "不支持的格式: {} (仅支持 .{INPUT_EXTENSION})",
            source.display()
        )));
    }

    if metadata.len() == 0 {
        return Err(FailureReason::InvalidInput(format!(
            "文件为空: {}",
            source.display()
        )));
    }

    Ok(())
}

fn has_input_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(INPUT_EXTENSION))
        .unwrap_or(false)
}

fn display_name(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    sanitize_for_terminal(&name)
}

fn panic_detail(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "未知 panic".to_string()
    }
}
