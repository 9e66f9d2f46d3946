//! 规则文件加载（TOML）
//!
//! 规则文件可选，用于：覆盖扫描选项（`[scan]`）、禁用内置规则（`disable`）、
//! 追加自定义单模式正则规则（`[[rules]]`，排在内置规则之后，按文件中的顺序）。
//!
//! ```toml
//! disable = ["direct_new"]
//!
//! [scan]
//! threads = 4
//!
//! [[rules]]
//! id = "raw_curl"
//! kind = "Raw curl usage"
//! pattern = '\bcurl_init\s*\('
//! extension = ".php"
//! ```
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::detectors::{PathFilter, RegexRule, Rule};
use crate::error::ScanError;
use crate::options::ScanOptions;
use crate::registry::{builtin_rules, RuleRegistry};

/// 单条自定义规则（支持 pattern 或 regex 字段）
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleEntry {
    pub id: String,
    pub kind: String,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub regex: Option<String>,
    #[serde(default)]
    pub extension: Option<String>,
    #[serde(default)]
    pub path_contains: Option<String>,
    #[serde(default)]
    pub path_excludes: Option<String>,
}

/// `[scan]` 段：与 `ScanOptions` 对应，未填写的字段保持原值
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScanSection {
    pub threads: Option<usize>,
    pub max_file_size: Option<u64>,
    pub follow_links: Option<bool>,
    pub report_markup_errors: Option<bool>,
    pub skip_binary: Option<bool>,
}

/// 顶层规则文件结构
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleFile {
    #[serde(default)]
    pub scan: ScanSection,
    #[serde(default)]
    pub disable: Vec<String>,
    #[serde(default)]
    pub rules: Vec<RuleEntry>,
    #[serde(skip)]
    source: PathBuf,
}

/// 从 TOML 文件加载
pub fn load_rule_file(path: &Path) -> Result<RuleFile, ScanError> {
    let txt = std::fs::read_to_string(path).map_err(|e| ScanError::Config {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    RuleFile::parse(&txt, path)
}

impl RuleFile {
    /// `origin` 仅用于错误信息
    pub fn parse(txt: &str, origin: &Path) -> Result<Self, ScanError> {
        let mut parsed: RuleFile = toml::from_str(txt).map_err(|e| ScanError::Config {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })?;
        parsed.source = origin.to_path_buf();
        Ok(parsed)
    }

    /// 用 `[scan]` 中出现的字段覆盖选项
    pub fn apply_to(&self, opts: &mut ScanOptions) {
        let s = &self.scan;
        if s.threads.is_some() {
            opts.threads = s.threads;
        }
        if s.max_file_size.is_some() {
            opts.max_file_size = s.max_file_size;
        }
        if let Some(v) = s.follow_links {
            opts.follow_links = v;
        }
        if let Some(v) = s.report_markup_errors {
            opts.report_markup_errors = v;
        }
        if let Some(v) = s.skip_binary {
            opts.skip_binary = v;
        }
    }

    /// 内置规则（去掉 disable 中的）+ 自定义规则；所有模式在此处编译，错误立即返回
    pub fn build_registry(&self) -> Result<RuleRegistry, ScanError> {
        let mut rules: Vec<Box<dyn Rule>> = builtin_rules()?;
        for id in &self.disable {
            if !rules.iter().any(|r| r.id() == id) {
                return Err(ScanError::UnknownRule { id: id.clone() });
            }
        }
        rules.retain(|r| !self.disable.iter().any(|d| d == r.id()));

        for e in &self.rules {
            // 兼容两种字段名：pattern 或 regex
            let pat = match (&e.pattern, &e.regex) {
                (Some(p), _) => p,
                (None, Some(r)) => r,
                (None, None) => {
                    return Err(ScanError::Config {
                        path: self.source.clone(),
                        message: format!("rule `{}` has neither `pattern` nor `regex`", e.id),
                    })
                }
            };
            let filter = PathFilter {
                extension: e.extension.clone(),
                contains: e.path_contains.clone(),
                excludes: e.path_excludes.clone(),
            };
            rules.push(Box::new(RegexRule::new(&e.id, &e.kind, pat, filter)?));
        }

        RuleRegistry::new(rules)
    }
}
