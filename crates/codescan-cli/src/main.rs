use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use codescan_core::{load_rule_file, Rule, RuleFile, ScanEngine, ScanOptions};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

mod report;

/// 未指定 --config 时，若当前目录存在该文件则自动加载
const DEFAULT_CONFIG: &str = "codescan.toml";

/// 命令行入口（基于 clap）
#[derive(Parser, Debug)]
#[command(name = "codescan", version, about = "Scans custom modules for common bad practices")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 扫描目录并输出命中项
    Scan {
        /// 扫描根目录（自定义模块目录）
        #[arg(long, default_value = "app/code")]
        root: PathBuf,

        /// 规则文件路径（TOML）
        #[arg(long)]
        config: Option<PathBuf>,

        /// 线程数（"auto"=CPU 核心数；1 为串行）
        #[arg(long, default_value = "auto")]
        threads: String,

        /// 输出格式
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,

        /// 输出文件；缺省写到标准输出
        #[arg(long)]
        output: Option<PathBuf>,

        /// 最大扫描文件大小（单位字节）
        #[arg(long)]
        max_file_size: Option<u64>,

        /// 跟随符号链接
        #[arg(long)]
        follow_links: bool,

        /// XML 解析失败时记录诊断
        #[arg(long)]
        report_markup_errors: bool,

        /// 跳过疑似二进制文件
        #[arg(long)]
        skip_binary: bool,

        /// 存在命中时以退出码 1 结束
        #[arg(long)]
        fail_on_findings: bool,
    },
    /// 列出当前生效的规则
    Rules {
        /// 规则文件路径（TOML）
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    // 初始化日志（支持通过 RUST_LOG 控制等级，例如 info、debug）
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Scan {
            root,
            config,
            threads,
            format,
            output,
            max_file_size,
            follow_links,
            report_markup_errors,
            skip_binary,
            fail_on_findings,
        } => {
            let rule_file = load_config(config.as_deref())?;

            // 规则文件中的 [scan] 先生效，命令行显式给出的参数再覆盖
            let mut opts = ScanOptions::default();
            rule_file.apply_to(&mut opts);
            if let Some(n) = parse_threads(&threads)? {
                opts.threads = Some(n);
            }
            if max_file_size.is_some() {
                opts.max_file_size = max_file_size;
            }
            opts.follow_links |= follow_links;
            opts.report_markup_errors |= report_markup_errors;
            opts.skip_binary |= skip_binary;

            let registry = rule_file.build_registry().context("invalid rule configuration")?;
            let engine = ScanEngine::new(registry, opts);
            let report = engine
                .scan(&root)
                .with_context(|| format!("scan of {} failed", root.display()))?;

            for d in &report.diagnostics {
                tracing::warn!(kind = ?d.kind, file = %d.file, "{}", d.message);
            }

            let mut out: Box<dyn Write> = match &output {
                Some(path) => {
                    let file = File::create(path).context("create output file")?;
                    Box::new(BufWriter::new(file))
                }
                None => Box::new(BufWriter::new(io::stdout().lock())),
            };
            match format {
                Format::Text => report::write_text(&mut out, &report.findings)?,
                Format::Json => {
                    report::write_json(&mut out, &report.findings, &report.diagnostics)?
                }
            }
            out.flush().context("flush report")?;

            info!(
                files_scanned = report.stats.files_scanned,
                findings = report.stats.findings,
                diagnostics = report.stats.diagnostics,
                "report written"
            );

            if fail_on_findings && !report.findings.is_empty() {
                std::process::exit(1);
            }
        }
        Commands::Rules { config } => {
            let registry = load_config(config.as_deref())?
                .build_registry()
                .context("invalid rule configuration")?;
            let stdout = io::stdout();
            let mut out = stdout.lock();
            for rule in registry.rules() {
                writeln!(out, "{:<26} {}", rule.id(), rule.kind())?;
            }
        }
    }

    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};
    // 日志写到 stderr，stdout 只承载报告
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// 显式路径必须可读；未指定时尝试默认文件，不存在则使用内置规则
fn load_config(path: Option<&Path>) -> Result<RuleFile> {
    match path {
        Some(p) => load_rule_file(p).context("load rule file"),
        None => {
            let default = Path::new(DEFAULT_CONFIG);
            if default.is_file() {
                info!(path = DEFAULT_CONFIG, "using rule file");
                load_rule_file(default).context("load rule file")
            } else {
                Ok(RuleFile::default())
            }
        }
    }
}

/// 解析线程参数："auto" 返回 None
fn parse_threads(s: &str) -> Result<Option<usize>> {
    if s.eq_ignore_ascii_case("auto") {
        return Ok(None);
    }
    match s.parse::<usize>() {
        Ok(n) if n >= 1 => Ok(Some(n)),
        _ => anyhow::bail!(
            "invalid --threads value `{s}` (expected \"auto\" or a positive integer)"
        ),
    }
}
