//! 结构化标记（XML）辅助：解析为扁平的元素列表，供标记类规则查询
//!
//! 只保留规则需要的信息（本地元素名与属性），解析结果不再借用原文，
//! 可以缓存在 `ScanTarget` 中被多条规则共享。
use roxmltree::{Document, ParsingOptions};

/// 一个元素：本地名 + 属性（保持文档中的顺序）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkupElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
}

impl MarkupElement {
    /// 按本地属性名取值（忽略命名空间前缀）
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// 属性存在且去除空白后非空
    pub fn has_value(&self, name: &str) -> bool {
        self.attr(name).is_some_and(|v| !v.trim().is_empty())
    }
}

/// 已解析的文档：所有元素按文档顺序（先序遍历）排列
#[derive(Debug, Clone, Default)]
pub struct MarkupDocument {
    elements: Vec<MarkupElement>,
}

impl MarkupDocument {
    /// 解析 XML；失败时返回解析器的错误描述
    pub fn parse(content: &str) -> Result<Self, String> {
        let opts = ParsingOptions {
            allow_dtd: true,
            ..ParsingOptions::default()
        };
        let doc = Document::parse_with_options(content, opts).map_err(|e| e.to_string())?;
        let elements = doc
            .descendants()
            .filter(|n| n.is_element())
            .map(|n| MarkupElement {
                name: n.tag_name().name().to_string(),
                attributes: n
                    .attributes()
                    .map(|a| (a.name().to_string(), a.value().to_string()))
                    .collect(),
            })
            .collect();
        Ok(Self { elements })
    }

    /// 相当于 `//name`：文档中任意层级名为 `name` 的元素
    pub fn elements_named<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a MarkupElement> + 'a {
        self.elements.iter().filter(move |e| e.name == name)
    }
}
