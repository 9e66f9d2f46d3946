//! 偏移 → 行号 解析
//!
//! 仅按 `\n` 计数；纯 `\r` 换行不在支持范围内。

/// 计算 `offset` 之前的换行数 + 1（offset 为 0 时为第 1 行）
/// 超出内容长度的偏移按内容末尾处理
pub fn line_of(content: &str, offset: usize) -> usize {
    let end = offset.min(content.len());
    content.as_bytes()[..end].iter().filter(|&&b| b == b'\n').count() + 1
}

/// 单文件换行位置索引：一次构建，多次二分查询
/// 结果与 `line_of` 完全一致，适合同一文件内大量命中的场景
#[derive(Debug, Clone)]
pub struct LineIndex {
    newlines: Vec<usize>,
}

impl LineIndex {
    pub fn new(content: &str) -> Self {
        let newlines = content
            .bytes()
            .enumerate()
            .filter(|(_, b)| *b == b'\n')
            .map(|(i, _)| i)
            .collect();
        Self { newlines }
    }

    /// 行号 = 严格位于 offset 之前的换行数 + 1
    pub fn line_of(&self, offset: usize) -> usize {
        self.newlines.partition_point(|&nl| nl < offset) + 1
    }
}
