//! 目录遍历（TreeWalker）
//!
//! 遍历顺序：同一目录内按文件名字典序排序，深度优先；子目录在其名字所处的位置展开。
//! 同一文件系统快照下顺序固定，命中项的输出顺序依赖于此。
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

use crate::error::ScanError;
use crate::findings::{Diagnostic, DiagnosticKind};

/// 遍历得到的一个普通文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: PathBuf,
    /// 去掉根目录前缀，`/` 分隔
    pub relative_path: String,
    /// 相对路径的第一段；文件直接位于根目录下时为空串
    pub module: String,
}

impl FileEntry {
    pub fn new(root: &Path, path: PathBuf) -> Self {
        let rel = path.strip_prefix(root).unwrap_or(&path);
        let segments: Vec<String> = rel
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        let module = if segments.len() > 1 { segments[0].clone() } else { String::new() };
        Self { relative_path: segments.join("/"), module, path }
    }

    pub(crate) fn from_relative(root: &Path, relative: &str) -> Self {
        Self::new(root, root.join(relative))
    }
}

/// 懒惰的递归文件序列；只产出普通文件，目录本身不产生事件
pub struct TreeWalker {
    root: PathBuf,
    inner: walkdir::IntoIter,
}

impl TreeWalker {
    /// 根目录不存在、不是目录或不可读时直接失败，不会静默跳过整个扫描
    pub fn new(root: &Path, follow_links: bool) -> Result<Self, ScanError> {
        let unavailable = |source: io::Error| ScanError::ScanRootUnavailable {
            root: root.to_path_buf(),
            source,
        };
        let md = fs::metadata(root).map_err(unavailable)?;
        if !md.is_dir() {
            return Err(unavailable(io::Error::other("not a directory")));
        }
        fs::read_dir(root).map_err(unavailable)?;

        let inner = WalkDir::new(root)
            .min_depth(1)
            .follow_links(follow_links)
            .sort_by_file_name()
            .into_iter();
        Ok(Self { root: root.to_path_buf(), inner })
    }
}

impl Iterator for TreeWalker {
    /// 子目录/文件读取失败（权限、并发删除、符号链接环）作为诊断产出，遍历继续
    type Item = Result<FileEntry, Diagnostic>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.inner.next()? {
                Ok(entry) => {
                    if entry.file_type().is_file() {
                        return Some(Ok(FileEntry::new(&self.root, entry.into_path())));
                    }
                }
                Err(err) => {
                    let file = err
                        .path()
                        .map(|p| FileEntry::new(&self.root, p.to_path_buf()).relative_path)
                        .unwrap_or_default();
                    tracing::debug!(%file, error = %err, "walk entry unreadable");
                    return Some(Err(Diagnostic::new(
                        DiagnosticKind::FileUnreadable,
                        file,
                        err.to_string(),
                    )));
                }
            }
        }
    }
}
