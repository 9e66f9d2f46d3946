//! 报告渲染：文本表格 / JSON
use std::io::{self, Write};

use codescan_core::{Diagnostic, Finding};

const HEADERS: [&str; 4] = ["Type", "Module", "File", "Line"];

fn cells(f: &Finding) -> [&str; 4] {
    [&f.kind, &f.module, &f.file, &f.line]
}

/// 无命中时输出成功提示，否则输出 Type/Module/File/Line 表格
pub fn write_text(out: &mut dyn Write, findings: &[Finding]) -> io::Result<()> {
    if findings.is_empty() {
        writeln!(out, "[OK] No bad practices found!")?;
        return Ok(());
    }
    writeln!(out, "[WARNING] Possible bad practices found:")?;
    writeln!(out)?;

    let mut widths = HEADERS.map(str::len);
    for f in findings {
        for (w, c) in widths.iter_mut().zip(cells(f)) {
            *w = (*w).max(c.chars().count());
        }
    }

    let rule: String =
        widths.iter().map(|w| format!("+{}", "-".repeat(w + 2))).collect::<String>() + "+";
    writeln!(out, "{rule}")?;
    write_row(out, HEADERS, &widths)?;
    writeln!(out, "{rule}")?;
    for f in findings {
        write_row(out, cells(f), &widths)?;
    }
    writeln!(out, "{rule}")?;
    Ok(())
}

fn write_row(out: &mut dyn Write, cols: [&str; 4], widths: &[usize; 4]) -> io::Result<()> {
    for (c, w) in cols.iter().zip(widths) {
        write!(out, "| {:<w$} ", c, w = *w)?;
    }
    writeln!(out, "|")
}

/// `{"findings": [...], "diagnostics": [...]}`
pub fn write_json(
    out: &mut dyn Write,
    findings: &[Finding],
    diagnostics: &[Diagnostic],
) -> io::Result<()> {
    let doc = serde_json::json!({ "findings": findings, "diagnostics": diagnostics });
    serde_json::to_writer_pretty(&mut *out, &doc)?;
    writeln!(out)
}
