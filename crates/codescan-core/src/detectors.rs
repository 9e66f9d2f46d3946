//! 规则抽象与四种规则变体
//!
//! 所有规则只读取 `ScanTarget` 中已加载的内容，不访问文件系统，也不持有扫描期可变状态，
//! 因此可以在不同文件上并行运行。
use aho_corasick::AhoCorasick;
use regex::Regex;

use crate::error::ScanError;
use crate::findings::Finding;
use crate::markup::MarkupElement;
use crate::types::ScanTarget;

/// 检测单元
pub trait Rule: Send + Sync {
    /// 稳定的规则标识（配置文件中 `disable` 使用）
    fn id(&self) -> &str;

    /// 报告中的问题类型；多模式规则返回类型前缀
    fn kind(&self) -> &str;

    /// 检查单个文件；命中按出现顺序返回
    fn inspect(&self, target: &ScanTarget) -> Vec<Finding>;
}

fn compile(rule: &str, pattern: &str) -> Result<Regex, ScanError> {
    Regex::new(pattern)
        .map_err(|source| ScanError::InvalidPattern { rule: rule.to_string(), source })
}

/// 路径过滤：扩展名、必须包含 / 必须不包含的片段
/// 片段匹配作用于以 `/` 开头的相对路径
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    pub extension: Option<String>,
    pub contains: Option<String>,
    pub excludes: Option<String>,
}

impl PathFilter {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn containing(fragment: &str) -> Self {
        Self { contains: Some(fragment.to_string()), ..Self::default() }
    }

    pub fn excluding(fragment: &str) -> Self {
        Self { excludes: Some(fragment.to_string()), ..Self::default() }
    }

    pub fn applies(&self, target: &ScanTarget) -> bool {
        if let Some(ext) = &self.extension {
            if !target.has_extension(ext) {
                return false;
            }
        }
        if self.contains.is_none() && self.excludes.is_none() {
            return true;
        }
        let rooted = target.rooted_path();
        if let Some(frag) = &self.contains {
            if !rooted.contains(frag.as_str()) {
                return false;
            }
        }
        if let Some(frag) = &self.excludes {
            if rooted.contains(frag.as_str()) {
                return false;
            }
        }
        true
    }
}

/// 单模式正则规则：每个匹配一条命中
pub struct RegexRule {
    id: String,
    kind: String,
    pattern: Regex,
    filter: PathFilter,
}

impl RegexRule {
    pub fn new(id: &str, kind: &str, pattern: &str, filter: PathFilter) -> Result<Self, ScanError> {
        Ok(Self {
            id: id.to_string(),
            kind: kind.to_string(),
            pattern: compile(id, pattern)?,
            filter,
        })
    }
}

impl Rule for RegexRule {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &str {
        &self.kind
    }

    fn inspect(&self, target: &ScanTarget) -> Vec<Finding> {
        if !self.filter.applies(target) {
            return Vec::new();
        }
        self.pattern
            .find_iter(target.content())
            .map(|m| Finding::at_line(self.kind.as_str(), target, target.line_of(m.start())))
            .collect()
    }
}

/// 多模式正则规则：每个模式带一个标签，问题类型为 `前缀 + 标签`
/// 输出顺序：按模式声明顺序，每个模式内按偏移升序
pub struct MultiRegexRule {
    id: String,
    kind_prefix: String,
    patterns: Vec<(String, Regex)>,
    /// 可选的字面量预筛：内容中一个锚点都没有时跳过全部正则
    prefilter: Option<AhoCorasick>,
    filter: PathFilter,
}

impl MultiRegexRule {
    pub fn new(
        id: &str,
        kind_prefix: &str,
        patterns: &[(&str, &str)],
        filter: PathFilter,
    ) -> Result<Self, ScanError> {
        let patterns = patterns
            .iter()
            .map(|(label, pat)| Ok((label.to_string(), compile(id, pat)?)))
            .collect::<Result<Vec<_>, ScanError>>()?;
        Ok(Self {
            id: id.to_string(),
            kind_prefix: kind_prefix.to_string(),
            patterns,
            prefilter: None,
            filter,
        })
    }

    /// 函数调用规则：对每个名字匹配 `\bNAME\s*\(`，以名字本身作为预筛锚点
    pub fn call_names(id: &str, kind_prefix: &str, names: &[&str]) -> Result<Self, ScanError> {
        let pats: Vec<(String, String)> = names
            .iter()
            .map(|n| (n.to_string(), format!(r"\b{}\s*\(", regex::escape(n))))
            .collect();
        let pairs: Vec<(&str, &str)> = pats.iter().map(|(l, p)| (l.as_str(), p.as_str())).collect();
        let mut rule = Self::new(id, kind_prefix, &pairs, PathFilter::any())?;
        let ac = AhoCorasick::new(names)
            .map_err(|source| ScanError::Prefilter { rule: id.to_string(), source })?;
        rule.prefilter = Some(ac);
        Ok(rule)
    }
}

impl Rule for MultiRegexRule {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &str {
        &self.kind_prefix
    }

    fn inspect(&self, target: &ScanTarget) -> Vec<Finding> {
        if !self.filter.applies(target) {
            return Vec::new();
        }
        let content = target.content();
        if let Some(ac) = &self.prefilter {
            if !ac.is_match(content) {
                return Vec::new();
            }
        }
        let mut findings = Vec::new();
        for (label, re) in &self.patterns {
            let kind = format!("{}{}", self.kind_prefix, label);
            for m in re.find_iter(content) {
                findings.push(Finding::at_line(kind.as_str(), target, target.line_of(m.start())));
            }
        }
        findings
    }
}

/// 结构化标记查询规则：对 `//element` 中满足谓词的每个元素产出一条无行号命中
/// 仅作用于 `.xml` 文件；解析失败时不产出任何命中
pub struct MarkupRule {
    id: String,
    kind: String,
    element: String,
    predicate: fn(&MarkupElement) -> bool,
}

impl MarkupRule {
    pub fn new(id: &str, kind: &str, element: &str, predicate: fn(&MarkupElement) -> bool) -> Self {
        Self {
            id: id.to_string(),
            kind: kind.to_string(),
            element: element.to_string(),
            predicate,
        }
    }
}

impl Rule for MarkupRule {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &str {
        &self.kind
    }

    fn inspect(&self, target: &ScanTarget) -> Vec<Finding> {
        if !target.has_extension(".xml") {
            return Vec::new();
        }
        let Some(doc) = target.markup() else {
            return Vec::new();
        };
        doc.elements_named(&self.element)
            .filter(|e| (self.predicate)(e))
            .map(|_| Finding::unlined(self.kind.as_str(), target))
            .collect()
    }
}

/// 成对结构规则：匹配声明及其主体（命名捕获组 `body`），主体中缺少期望片段时报告
/// 主体匹配为单层、不含 `}` 的启发式，嵌套花括号的主体会在第一个 `}` 处截断
pub struct PairedConstructRule {
    id: String,
    kind: String,
    declaration: Regex,
    required: String,
    filter: PathFilter,
}

impl PairedConstructRule {
    pub fn new(
        id: &str,
        kind: &str,
        declaration: &str,
        required: &str,
        filter: PathFilter,
    ) -> Result<Self, ScanError> {
        let declaration = compile(id, declaration)?;
        if declaration.capture_names().flatten().all(|n| n != "body") {
            return Err(ScanError::MissingCapture { rule: id.to_string(), group: "body" });
        }
        Ok(Self {
            id: id.to_string(),
            kind: kind.to_string(),
            declaration,
            required: required.to_string(),
            filter,
        })
    }
}

impl Rule for PairedConstructRule {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &str {
        &self.kind
    }

    fn inspect(&self, target: &ScanTarget) -> Vec<Finding> {
        if !self.filter.applies(target) {
            return Vec::new();
        }
        let mut findings = Vec::new();
        for caps in self.declaration.captures_iter(target.content()) {
            let (Some(whole), Some(body)) = (caps.get(0), caps.name("body")) else {
                continue;
            };
            if !body.as_str().contains(self.required.as_str()) {
                let line = target.line_of(whole.start());
                findings.push(Finding::at_line(self.kind.as_str(), target, line));
            }
        }
        findings
    }
}
