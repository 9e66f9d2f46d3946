//! 错误类型（致命错误；单文件问题走 Diagnostic，不在此处）
use std::path::PathBuf;

use thiserror::Error;

/// 扫描相关的致命错误
/// - 根目录不可用：在产生任何 Finding 之前中止
/// - 规则/配置错误：在注册规则时立即失败，而不是逐文件报错
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("scan root {} is unavailable: {source}", .root.display())]
    ScanRootUnavailable {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("rule `{rule}` has an invalid pattern: {source}")]
    InvalidPattern {
        rule: String,
        #[source]
        source: regex::Error,
    },

    #[error("rule `{rule}` pattern lacks the `{group}` capture group")]
    MissingCapture { rule: String, group: &'static str },

    #[error("failed to build literal prefilter for rule `{rule}`: {source}")]
    Prefilter {
        rule: String,
        #[source]
        source: aho_corasick::BuildError,
    },

    #[error("rule file {}: {message}", .path.display())]
    Config { path: PathBuf, message: String },

    #[error("duplicate rule id `{id}`")]
    DuplicateRule { id: String },

    #[error("cannot disable unknown rule `{id}`")]
    UnknownRule { id: String },

    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("a scan worker panicked")]
    WorkerPanicked,
}
