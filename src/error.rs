use std::path::PathBuf;
use thiserror::Error;

/// 单个条目终止于 `Failed` 时记录的原因。
///
/// 每个原因都只影响它所在的条目，编排器随后继续处理下一个条目。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    #[error("无效输入: {0}")]
    InvalidInput(String),
    #[error("音频提取失败: {0}")]
    ExtractionFailed(String),
    #[error("音频转换失败: {0}")]
    ConversionFailed(String),
    #[error("无法生成输出文件名: {0}")]
    NamingExhausted(String),
    #[error("处理被用户中断")]
    Interrupted,
    #[error("意外错误: {0}")]
    UnexpectedError(String),
}

impl FailureReason {
    /// 稳定的短错误码，写入日志和 CSV 报告。
    pub fn code(&self) -> &'static str {
        match self {
            FailureReason::InvalidInput(_) => "E_INVALID_INPUT",
            FailureReason::ExtractionFailed(_) => "E_EXTRACTION",
            FailureReason::ConversionFailed(_) => "E_CONVERSION",
            FailureReason::NamingExhausted(_) => "E_NAMING_EXHAUSTED",
            FailureReason::Interrupted => "E_INTERRUPTED",
            FailureReason::UnexpectedError(_) => "E_UNEXPECTED",
        }
    }
}

/// 统计提取阶段的错误。分析失败不会把已成功的转换降级为失败。
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("无法读取音频 {path}: {detail}")]
    UnreadableAudio { path: PathBuf, detail: String },
}

impl AnalysisError {
    pub fn unreadable(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        AnalysisError::UnreadableAudio {
            path: path.into(),
            detail: detail.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NamingError {
    #[error("\"{stem}\" 的编号已用尽 (上限 {limit:03})")]
    Exhausted { stem: String, limit: u32 },
}

impl From<NamingError> for FailureReason {
    fn from(err: NamingError) -> Self {
        FailureReason::NamingExhausted(err.to_string())
    }
}
