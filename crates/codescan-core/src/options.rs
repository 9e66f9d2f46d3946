//! 扫描选项、统计信息与取消信号（模块）
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 扫描选项
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// 线程数：None 表示自动（等于 CPU 核数）；Some(1) 走串行
    pub threads: Option<usize>,
    /// 最大文件大小（字节）；超过则跳过并记录诊断
    pub max_file_size: Option<u64>,
    /// 是否跟随符号链接；跟随时链接环以诊断形式报告
    pub follow_links: bool,
    /// XML 解析失败时是否记录诊断（默认静默跳过）
    pub report_markup_errors: bool,
    /// 跳过疑似二进制文件
    pub skip_binary: bool,
}

impl ScanOptions {
    pub(crate) fn worker_count(&self) -> usize {
        self.threads.unwrap_or_else(num_cpus::get).max(1)
    }
}

/// 扫描统计信息（便于 CLI 打印）
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    pub files_scanned: usize,
    pub files_skipped: usize,
    pub findings: usize,
    pub diagnostics: usize,
}

/// 取消信号：在文件之间检查，已完成的文件结果保持有效
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
