//! 规则注册表与内置规则集
//!
//! 注册表在扫描开始前显式构建一次，之后不可变；规则按注册顺序运行，
//! 同一文件内的命中也按此顺序拼接。
use std::collections::HashSet;

use crate::detectors::{
    MarkupRule, MultiRegexRule, PairedConstructRule, PathFilter, RegexRule, Rule,
};
use crate::error::ScanError;
use crate::markup::MarkupElement;

pub const DANGEROUS_FUNCTIONS: &[&str] =
    &["eval", "exec", "shell_exec", "system", "passthru", "proc_open", "popen"];
pub const DEBUG_FUNCTIONS: &[&str] = &["var_dump", "print_r", "die", "exit"];

/// 有序、不可变的规则集合
pub struct RuleRegistry {
    rules: Vec<Box<dyn Rule>>,
}

impl RuleRegistry {
    /// 按给定顺序构建；规则 id 必须唯一
    pub fn new(rules: Vec<Box<dyn Rule>>) -> Result<Self, ScanError> {
        let mut seen = HashSet::new();
        for r in &rules {
            if !seen.insert(r.id().to_string()) {
                return Err(ScanError::DuplicateRule { id: r.id().to_string() });
            }
        }
        Ok(Self { rules })
    }

    /// 全部内置规则
    pub fn builtin() -> Result<Self, ScanError> {
        Self::new(builtin_rules()?)
    }

    pub fn rules(&self) -> impl Iterator<Item = &dyn Rule> {
        self.rules.iter().map(|r| r.as_ref())
    }

    pub fn ids(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// 插件方法声明 + 单层主体
fn plugin_declaration(prefix: &str) -> String {
    format!(
        r"(?s)function\s+{prefix}[A-Z][A-Za-z0-9_]*\s*\((?P<params>.*?)\)\s*(?::\s*\??[A-Za-z0-9_\\|]+\s*)?\{{(?P<body>[^}}]*)\}}"
    )
}

fn block_lacks_renderer(e: &MarkupElement) -> bool {
    !e.has_value("class") && !e.has_value("template")
}

fn observes_generic_event(e: &MarkupElement) -> bool {
    let Some(name) = e.attr("name").filter(|n| !n.is_empty()) else {
        return false;
    };
    // 不锚定：名称中任意位置出现 `all` 即视为泛化事件（`_all` 后缀随之覆盖）
    let name = name.to_ascii_lowercase();
    name.contains("controller_action") || name.contains("all")
}

/// 内置规则，按固定的报告顺序排列
pub fn builtin_rules() -> Result<Vec<Box<dyn Rule>>, ScanError> {
    let plugin = |id: &str, kind: &str, prefix: &str| -> Result<Box<dyn Rule>, ScanError> {
        Ok(Box::new(PairedConstructRule::new(
            id,
            kind,
            &plugin_declaration(prefix),
            "return",
            PathFilter::containing("Plugin/"),
        )?))
    };

    let rules: Vec<Box<dyn Rule>> = vec![
        Box::new(RegexRule::new(
            "object_manager",
            "Direct ObjectManager usage",
            r"ObjectManager::getInstance\(",
            PathFilter::any(),
        )?),
        Box::new(RegexRule::new(
            "direct_new",
            "Direct instantiation with new",
            r"\bnew\s+[?\\]?[A-Za-z0-9_]+",
            PathFilter::excluding("/Test/"),
        )?),
        Box::new(MarkupRule::new(
            "block_without_class",
            "Block without class/template",
            "block",
            block_lacks_renderer,
        )),
        Box::new(MarkupRule::new(
            "generic_observer",
            "Observer listening to generic event",
            "observer",
            observes_generic_event,
        )),
        plugin("plugin_before_no_return", "Plugin before without return", "before")?,
        plugin("plugin_after_no_return", "Plugin after without return", "after")?,
        plugin("plugin_around_no_return", "Plugin around without return", "around")?,
        Box::new(MultiRegexRule::call_names(
            "dangerous_functions",
            "Dangerous PHP function: ",
            DANGEROUS_FUNCTIONS,
        )?),
        Box::new(MultiRegexRule::call_names(
            "debug_functions",
            "Debug function: ",
            DEBUG_FUNCTIONS,
        )?),
    ];
    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::findings::Finding;
    use crate::types::ScanTarget;

    fn run(rel: &str, content: &str) -> Vec<Finding> {
        let reg = RuleRegistry::builtin().unwrap();
        let target = ScanTarget::from_parts(rel, content);
        reg.rules().flat_map(|r| r.inspect(&target)).collect()
    }

    fn kinds(findings: &[Finding]) -> Vec<&str> {
        findings.iter().map(|f| f.kind.as_str()).collect()
    }

    #[test]
    fn builtin_order_is_fixed() {
        let reg = RuleRegistry::builtin().unwrap();
        assert_eq!(
            reg.ids(),
            vec![
                "object_manager",
                "direct_new",
                "block_without_class",
                "generic_observer",
                "plugin_before_no_return",
                "plugin_after_no_return",
                "plugin_around_no_return",
                "dangerous_functions",
                "debug_functions",
            ]
        );
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut rules = builtin_rules().unwrap();
        let again = RegexRule::new("direct_new", "Again", "x", PathFilter::any()).unwrap();
        rules.push(Box::new(again));
        let err = RuleRegistry::new(rules).err().unwrap();
        assert!(matches!(err, ScanError::DuplicateRule { id } if id == "direct_new"));
    }

    #[test]
    fn object_manager_every_occurrence() {
        let f = run(
            "Acme/Model/Foo.php",
            "$a = ObjectManager::getInstance();\n$b = \\Magento\\Framework\\App\\ObjectManager::getInstance()->get(X::class);",
        );
        let om: Vec<_> = f.iter().filter(|f| f.kind == "Direct ObjectManager usage").collect();
        assert_eq!(om.len(), 2);
        assert_eq!(om[0].line, "1");
        assert_eq!(om[1].line, "2");
        assert_eq!(om[0].module, "Acme");
        assert_eq!(om[0].file, "Acme/Model/Foo.php");
    }

    #[test]
    fn direct_new_skipped_under_test_dirs() {
        let content = "<?php\n\n$x = new Foo();";
        assert!(run("Acme/Test/Unit/FooTest.php", content).is_empty());

        let f = run("Acme/Model/Foo.php", content);
        assert_eq!(kinds(&f), vec!["Direct instantiation with new"]);
        assert_eq!(f[0].line, "3");
    }

    #[test]
    fn direct_new_accepts_optional_marker() {
        let f = run("Acme/Model/Foo.php", "new \\DateTime();\nnew ?Foo;\nrenew Bar;");
        assert_eq!(f.len(), 2);
        assert_eq!(f[1].line, "2");
    }

    #[test]
    fn block_requires_class_or_template() {
        let ok = run("Acme/view/frontend/layout/a.xml", r#"<page><block class="X"/><block template="Acme::t.phtml"/></page>"#);
        assert!(ok.is_empty());

        let bad = run("Acme/view/frontend/layout/a.xml", r#"<page><block/><block class="" name="n"/></page>"#);
        assert_eq!(kinds(&bad), vec!["Block without class/template", "Block without class/template"]);
        assert!(bad.iter().all(|f| f.line.is_empty()));
    }

    #[test]
    fn malformed_markup_is_silently_skipped() {
        assert!(run("Acme/etc/events.xml", "<config><block></config>").is_empty());
    }

    #[test]
    fn observer_generic_events() {
        let xml = |name: &str| {
            format!(r#"<config><event name="e"><observer name="{name}" instance="X"/></event></config>"#)
        };
        assert_eq!(run("Acme/etc/events.xml", &xml("controller_action_predispatch_all")).len(), 1);
        assert_eq!(run("Acme/etc/events.xml", &xml("Catalog_Product_ALL")).len(), 1);
        assert_eq!(run("Acme/etc/events.xml", &xml("ALL")).len(), 1);
        assert_eq!(run("Acme/etc/events.xml", &xml("catalog_all_products_save")).len(), 1);
        assert_eq!(run("Acme/etc/events.xml", &xml("allow_guest_checkout")).len(), 1);
        assert_eq!(run("Acme/etc/events.xml", &xml("acme_controller_action_log")).len(), 1);
        assert!(run("Acme/etc/events.xml", &xml("sales_order_save_after")).is_empty());
        assert!(run("Acme/etc/events.xml", &xml("customer_login")).is_empty());
        assert!(run("Acme/etc/events.xml", r#"<config><observer name=""/><observer/></config>"#).is_empty());
    }

    #[test]
    fn plugin_before_without_return() {
        let php = "<?php\nclass P\n{\n    public function beforeSave($subject, $x)\n    {\n        $x->touch();\n    }\n}\n";
        let f = run("Acme/Plugin/P.php", php);
        assert_eq!(kinds(&f), vec!["Plugin before without return"]);
        assert_eq!(f[0].line, "4");

        let with_return = php.replace("$x->touch();", "$x->touch();\n        return $result;");
        assert!(run("Acme/Plugin/P.php", &with_return).is_empty());
    }

    #[test]
    fn plugin_rules_only_apply_under_plugin_paths() {
        let php = "function afterGet($s, $r) { $r->x(); }";
        assert!(run("Acme/Model/P.php", php).is_empty());
        assert_eq!(kinds(&run("Acme/Plugin/P.php", php)), vec!["Plugin after without return"]);
    }

    #[test]
    fn plugin_after_and_around_have_distinct_kinds() {
        let php = "function aroundSave($s, callable $proceed): void { $proceed(); }\nfunction afterLoad($s, $r) { audit($r); }";
        let f = run("Acme/Plugin/P.php", php);
        assert_eq!(kinds(&f), vec!["Plugin after without return", "Plugin around without return"]);
        assert_eq!(f[0].line, "2");
        assert_eq!(f[1].line, "1");
    }

    #[test]
    fn dangerous_functions_counted_per_occurrence() {
        let f = run("Acme/Model/X.php", "eval(1);\neval(2);");
        assert_eq!(kinds(&f), vec!["Dangerous PHP function: eval", "Dangerous PHP function: eval"]);
        assert_eq!(f[0].line, "1");
        assert_eq!(f[1].line, "2");
    }

    #[test]
    fn debug_functions_follow_list_order() {
        let f = run("Acme/Model/X.php", "exit(1);\nprint_r($a);\nvar_dump($a);");
        assert_eq!(
            kinds(&f),
            vec!["Debug function: var_dump", "Debug function: print_r", "Debug function: exit"]
        );
    }

    #[test]
    fn rules_concatenate_in_registry_order() {
        let f = run("Acme/Model/X.php", "var_dump(1);\n$o = new Foo();\neval($x);");
        assert_eq!(
            kinds(&f),
            vec!["Direct instantiation with new", "Dangerous PHP function: eval", "Debug function: var_dump"]
        );
    }
}
