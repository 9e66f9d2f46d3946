//! 命中项与诊断信息（对外暴露）
use serde::Serialize;

use crate::types::ScanTarget;

/// 单条命中：问题类型、所属模块、相对路径、行号（不可按行定位时为空串）
/// 无身份语义：字段完全相同的两条命中同时保留
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub kind: String,
    pub module: String,
    pub file: String,
    pub line: String,
}

impl Finding {
    /// 可按行定位的命中
    pub fn at_line(kind: impl Into<String>, target: &ScanTarget, line: usize) -> Self {
        Self {
            kind: kind.into(),
            module: target.module().to_string(),
            file: target.relative_path().to_string(),
            line: line.to_string(),
        }
    }

    /// 无行号的命中（结构化查询类规则）
    pub fn unlined(kind: impl Into<String>, target: &ScanTarget) -> Self {
        Self {
            kind: kind.into(),
            module: target.module().to_string(),
            file: target.relative_path().to_string(),
            line: String::new(),
        }
    }
}

/// 单文件级别的非致命问题
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    FileUnreadable,
    MarkupParseFailure,
    FileTooLarge,
}

/// 与命中项分开收集的诊断；不会中止扫描
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub file: String,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, file: impl Into<String>, message: impl Into<String>) -> Self {
        Self { kind, file: file.into(), message: message.into() }
    }
}
