//! 静态模式检测引擎
//!
//! 设计要点：
//! - 显式、有序、不可变的规则注册表，规则之间相互独立、无共享可变状态。
//! - 每个文件只读取一次内容，所有规则共享同一份快照（含懒构建的行号索引与 XML 解析结果）。
//! - 轻量表层匹配（正则 + XML 元素查询），不构建完整语法树；接受少量误报/漏报。
//! - 并行时按文件发现顺序合并结果，输出稳定、可复现、可 diff。
//! - 只读：不修改被扫描的目录树。

mod detectors;
mod error;
mod findings;
mod lines;
mod markup;
mod options;
mod registry;
mod rules;
mod scan;
mod types;
mod walker;

pub use detectors::{MarkupRule, MultiRegexRule, PairedConstructRule, PathFilter, RegexRule, Rule};
pub use error::ScanError;
pub use findings::{Diagnostic, DiagnosticKind, Finding};
pub use lines::{line_of, LineIndex};
pub use markup::{MarkupDocument, MarkupElement};
pub use options::{CancelToken, ScanOptions, ScanStats};
pub use registry::{builtin_rules, RuleRegistry, DANGEROUS_FUNCTIONS, DEBUG_FUNCTIONS};
pub use rules::{load_rule_file, RuleEntry, RuleFile, ScanSection};
pub use scan::{inspect_target, FileReport, ScanEngine, ScanReport, ScanSummary};
pub use types::ScanTarget;
pub use walker::{FileEntry, TreeWalker};
