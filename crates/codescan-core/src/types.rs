//! 单文件扫描上下文（ScanTarget）
//!
//! 文件内容只读取一次；行号索引与 XML 解析结果按需懒构建，
//! 由同一文件上运行的所有规则共享。
use std::cell::OnceCell;
use std::path::Path;

use crate::lines::LineIndex;
use crate::markup::MarkupDocument;
use crate::walker::FileEntry;

/// 规则检查时看到的文件：路径信息 + 已加载的内容
#[derive(Debug)]
pub struct ScanTarget {
    relative_path: String,
    module: String,
    content: String,
    lines: OnceCell<LineIndex>,
    markup: OnceCell<Result<MarkupDocument, String>>,
}

impl ScanTarget {
    pub fn new(entry: FileEntry, content: String) -> Self {
        Self {
            relative_path: entry.relative_path,
            module: entry.module,
            content,
            lines: OnceCell::new(),
            markup: OnceCell::new(),
        }
    }

    /// 直接由相对路径构造（测试与内存扫描使用）；模块名同样由相对路径推导
    pub fn from_parts(relative_path: &str, content: impl Into<String>) -> Self {
        Self::new(FileEntry::from_relative(Path::new("/"), relative_path), content.into())
    }

    /// 相对扫描根目录的路径，统一使用 `/` 分隔
    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn line_of(&self, offset: usize) -> usize {
        self.lines
            .get_or_init(|| LineIndex::new(&self.content))
            .line_of(offset)
    }

    /// 扩展名判断（大小写敏感）
    pub fn has_extension(&self, ext: &str) -> bool {
        self.relative_path.ends_with(ext)
    }

    /// 以 `/` 开头的相对路径，便于匹配 `/Test/` 这类目录片段
    pub fn rooted_path(&self) -> String {
        format!("/{}", self.relative_path)
    }

    /// XML 文档（解析失败返回 None，失败原因见 `markup_error`）
    pub fn markup(&self) -> Option<&MarkupDocument> {
        self.parsed_markup().as_ref().ok()
    }

    /// 仅当某条规则实际尝试过解析且失败时返回错误信息
    pub fn markup_error(&self) -> Option<&str> {
        match self.markup.get() {
            Some(Err(e)) => Some(e.as_str()),
            _ => None,
        }
    }

    fn parsed_markup(&self) -> &Result<MarkupDocument, String> {
        self.markup.get_or_init(|| {
            let parsed = MarkupDocument::parse(&self.content);
            if let Err(e) = &parsed {
                tracing::debug!(file = %self.relative_path, error = %e, "markup parse failed");
            }
            parsed
        })
    }
}
