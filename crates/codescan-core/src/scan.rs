//! 扫描主流程与并行调度（ScanEngine）
//!
//! 顺序保证：
//! - 文件级：按 TreeWalker 的发现顺序输出（并行时由合并端按序号重排）
//! - 文件内：按注册表中的规则顺序拼接，规则内部按匹配顺序
//!
//! 已知限制：合并端的重排缓存没有上限。排在前面的文件迟迟未完成时，后续文件的
//! 结果会在内存中累积；有界通道只限制在途消息，不限制该缓存。
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::ScanError;
use crate::findings::{Diagnostic, DiagnosticKind, Finding};
use crate::options::{CancelToken, ScanOptions, ScanStats};
use crate::registry::RuleRegistry;
use crate::types::ScanTarget;
use crate::walker::{FileEntry, TreeWalker};

/// 单个文件的扫描结果（按发现顺序交给回调）
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub file: String,
    pub findings: Vec<Finding>,
    pub diagnostics: Vec<Diagnostic>,
    /// 内容已读取并运行过规则
    pub scanned: bool,
}

/// 完整扫描结果
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    pub findings: Vec<Finding>,
    pub diagnostics: Vec<Diagnostic>,
    pub stats: ScanStats,
    /// 被取消时为 true；此时结果只覆盖取消前按序完成的文件
    pub cancelled: bool,
}

/// 流式扫描的汇总
#[derive(Debug, Clone, Default)]
pub struct ScanSummary {
    pub stats: ScanStats,
    pub cancelled: bool,
}

/// 对已加载的内容按注册表顺序运行全部规则
pub fn inspect_target(registry: &RuleRegistry, target: &ScanTarget) -> Vec<Finding> {
    registry.rules().flat_map(|r| r.inspect(target)).collect()
}

pub struct ScanEngine {
    registry: Arc<RuleRegistry>,
    options: ScanOptions,
    cancel: CancelToken,
}

impl ScanEngine {
    pub fn new(registry: RuleRegistry, options: ScanOptions) -> Self {
        Self { registry: Arc::new(registry), options, cancel: CancelToken::new() }
    }

    /// 使用外部提供的取消信号
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// 扫描目录并收集全部结果；根目录不可用时不产生任何结果
    pub fn scan(&self, root: &Path) -> Result<ScanReport, ScanError> {
        let mut report = ScanReport::default();
        let summary = self.scan_with(root, |file| {
            report.findings.extend(file.findings);
            report.diagnostics.extend(file.diagnostics);
        })?;
        report.stats = summary.stats;
        report.cancelled = summary.cancelled;
        Ok(report)
    }

    /// 流式扫描：每个文件处理完后按发现顺序调用 `on_file`
    pub fn scan_with<F>(&self, root: &Path, mut on_file: F) -> Result<ScanSummary, ScanError>
    where
        F: FnMut(FileReport),
    {
        let walker = TreeWalker::new(root, self.options.follow_links)?;
        let threads = self.options.worker_count();
        info!(root = %root.display(), rules = self.registry.len(), threads, "starting scan");

        let mut stats = ScanStats::default();
        let mut sink = |report: FileReport| {
            if report.scanned {
                stats.files_scanned += 1;
            } else {
                stats.files_skipped += 1;
            }
            stats.findings += report.findings.len();
            stats.diagnostics += report.diagnostics.len();
            on_file(report);
        };

        let cancelled = if threads > 1 {
            self.run_parallel(walker, threads, &mut sink)?
        } else {
            self.run_serial(walker, &mut sink)
        };

        info!(
            files_scanned = stats.files_scanned,
            files_skipped = stats.files_skipped,
            findings = stats.findings,
            diagnostics = stats.diagnostics,
            cancelled,
            "scan finished"
        );
        Ok(ScanSummary { stats, cancelled })
    }

    /// 串行路径；返回是否被取消
    fn run_serial(&self, walker: TreeWalker, sink: &mut dyn FnMut(FileReport)) -> bool {
        for item in walker {
            if self.cancel.is_cancelled() {
                return true;
            }
            sink(process_item(item, &self.registry, &self.options));
        }
        false
    }

    /// 并行调度：
    /// - 后台线程内创建 Rayon 线程池，遍历结果带序号分发给 worker
    /// - 当前线程按序号重排后依次交给 sink，保证与串行一致的顺序
    fn run_parallel(
        &self,
        walker: TreeWalker,
        threads: usize,
        sink: &mut dyn FnMut(FileReport),
    ) -> Result<bool, ScanError> {
        use crossbeam_channel as channel;
        use rayon::prelude::*;

        let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build()?;

        // None 表示该文件开始前已收到取消信号
        type Msg = (usize, Option<FileReport>);
        let (tx, rx) = channel::bounded::<Msg>(256);

        let registry = Arc::clone(&self.registry);
        let options = self.options.clone();
        let cancel = self.cancel.clone();

        let scan_thread = std::thread::spawn(move || {
            pool.install(|| {
                walker.enumerate().par_bridge().for_each_with(tx, |tx, (idx, item)| {
                    let report = if cancel.is_cancelled() {
                        None
                    } else {
                        Some(process_item(item, &registry, &options))
                    };
                    let _ = tx.send((idx, report));
                });
            });
            // 结束后 Sender 全部被丢弃，Receiver 将收到关闭信号
        });

        // 合并端：维护 next_idx 与缓存，按序输出
        // 遇到第一个被取消的文件后不再输出
        let mut next_idx: usize = 0;
        let mut buffer: BTreeMap<usize, Option<FileReport>> = BTreeMap::new();
        let mut halted = false;

        while let Ok((idx, report)) = rx.recv() {
            buffer.insert(idx, report);
            while let Some(report) = buffer.remove(&next_idx) {
                next_idx += 1;
                match report {
                    Some(r) if !halted => sink(r),
                    Some(_) => {}
                    None => halted = true,
                }
            }
        }

        if scan_thread.join().is_err() {
            return Err(ScanError::WorkerPanicked);
        }
        Ok(halted)
    }
}

fn process_item(
    item: Result<FileEntry, Diagnostic>,
    registry: &RuleRegistry,
    opts: &ScanOptions,
) -> FileReport {
    match item {
        Ok(entry) => scan_file(entry, registry, opts),
        Err(diag) => {
            warn!(file = %diag.file, message = %diag.message, "skipping unreadable entry");
            FileReport {
                file: diag.file.clone(),
                findings: Vec::new(),
                diagnostics: vec![diag],
                scanned: false,
            }
        }
    }
}

fn skipped(file: String, diagnostic: Option<Diagnostic>) -> FileReport {
    FileReport {
        file,
        findings: Vec::new(),
        diagnostics: diagnostic.into_iter().collect(),
        scanned: false,
    }
}

/// 读取一次内容，构造 ScanTarget 并运行全部规则
fn scan_file(entry: FileEntry, registry: &RuleRegistry, opts: &ScanOptions) -> FileReport {
    let rel = entry.relative_path.clone();

    if let Some(max) = opts.max_file_size {
        if let Ok(md) = fs::metadata(&entry.path) {
            if md.len() > max {
                debug!(file = %rel, size = md.len(), max, "file exceeds size limit");
                let diag = Diagnostic::new(
                    DiagnosticKind::FileTooLarge,
                    rel.clone(),
                    format!("{} bytes exceeds limit of {} bytes", md.len(), max),
                );
                return skipped(rel, Some(diag));
            }
        }
    }

    let bytes = match fs::read(&entry.path) {
        Ok(b) => b,
        Err(e) => {
            warn!(file = %rel, error = %e, "file unreadable");
            let diag = Diagnostic::new(DiagnosticKind::FileUnreadable, rel.clone(), e.to_string());
            return skipped(rel, Some(diag));
        }
    };

    if opts.skip_binary && is_probably_binary(&bytes) {
        debug!(file = %rel, "skipping binary file");
        return skipped(rel, None);
    }

    // 非 UTF-8 内容有损解码；换行字节保持不变，行号不受影响
    let content = String::from_utf8(bytes)
        .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned());
    let target = ScanTarget::new(entry, content);
    let findings = inspect_target(registry, &target);

    let mut diagnostics = Vec::new();
    if opts.report_markup_errors {
        if let Some(err) = target.markup_error() {
            diagnostics.push(Diagnostic::new(DiagnosticKind::MarkupParseFailure, rel.clone(), err));
        }
    }

    FileReport { file: rel, findings, diagnostics, scanned: true }
}

/// 判定缓冲区是否“明显是二进制”
/// - 包含任何 NUL 字节即认为二进制；
/// - 否则可打印 ASCII 比例（包含 tab/CR/LF）低于 25% 也认为二进制。
fn is_probably_binary(buf: &[u8]) -> bool {
    if buf.is_empty() {
        return false;
    }
    if buf.contains(&0) {
        return true;
    }
    let sample = &buf[..buf.len().min(8192)];
    let printable = sample
        .iter()
        .filter(|&&b| matches!(b, 0x09 | 0x0A | 0x0D) || (0x20..=0x7E).contains(&b))
        .count();
    (printable as f32 / sample.len() as f32) < 0.25
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_heuristic() {
        assert!(!is_probably_binary(b""));
        assert!(!is_probably_binary(b"<?php\necho 1;\n"));
        assert!(is_probably_binary(b"PNG\x00\x01\x02"));
        assert!(is_probably_binary(&[0xC3u8; 64]));
    }

    #[test]
    fn inspect_target_runs_rules_in_order() {
        let reg = RuleRegistry::builtin().unwrap();
        let t = ScanTarget::from_parts("M/Model/A.php", "die();\n$a = ObjectManager::getInstance();");
        let kinds: Vec<_> = inspect_target(&reg, &t).into_iter().map(|f| f.kind).collect();
        assert_eq!(kinds, vec!["Direct ObjectManager usage", "Debug function: die"]);
    }

    #[test]
    fn read_failure_becomes_unreadable_diagnostic() {
        let dir = tempfile::tempdir().unwrap();
        let entry = FileEntry::new(dir.path(), dir.path().join("Acme/Model/Gone.php"));
        let reg = RuleRegistry::builtin().unwrap();

        let report = process_item(Ok(entry), &reg, &ScanOptions::default());
        assert!(!report.scanned);
        assert!(report.findings.is_empty());
        assert_eq!(report.file, "Acme/Model/Gone.php");
        assert_eq!(report.diagnostics.len(), 1);
        assert_eq!(report.diagnostics[0].kind, DiagnosticKind::FileUnreadable);
        assert_eq!(report.diagnostics[0].file, "Acme/Model/Gone.php");
    }
}
