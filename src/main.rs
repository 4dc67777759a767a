// src/main.rs
use std::io::Read;
use std::path::PathBuf;
use std::process;
use std::time::Instant;

use anyhow::{Context, Result};

use lanec::backend::target;
use lanec::cli::args::{CliArgs, Command, USAGE};
use lanec::cli::output::OutputFormatter;
use lanec::diag::{DiagSink, SourceMap, render_diagnostics_colored};
use lanec::driver::{self, BuildOptions, SourceInput};
use lanec::frontend;
use lanec::project;

fn main() {
    let cli = match CliArgs::parse() {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{}", msg);
            process::exit(1);
        }
    };

    match cli.command {
        Command::Help => {
            println!("{}", USAGE);
        }
        Command::ListTargets => {
            println!("supported targets (capability order, lane width):");
            for t in target::all() {
                println!("    {:<10} isa={:<7} width={}", t.name, t.isa.name(), t.width);
            }
        }
        Command::Build(b) => {
            let code = match run_build(b) {
                Ok(had_errors) => {
                    if had_errors {
                        1
                    } else {
                        0
                    }
                }
                Err(e) => {
                    // 内部致命错误（验证器失败、目标机配置不可达等）
                    OutputFormatter::new(false).error(&format!("fatal: {:#}", e));
                    1
                }
            };
            process::exit(code);
        }
    }
}

fn run_build(b: lanec::cli::args::BuildArgs) -> Result<bool> {
    let started = Instant::now();
    let fmt = OutputFormatter::new(b.quiet);

    // 工程配置只提供默认值，命令行永远优先
    let proj = project::load_from_cwd().context("failed to load project (Lane.toml or defaults)")?;

    // 读入外部前端产出的声明流；stdin 只能读一遍，驱动会据此拒绝多目标
    let (source, text) = if b.input == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("read declaration stream from stdin")?;
        (SourceInput::Stdin, buf)
    } else {
        let path = PathBuf::from(&b.input);
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("read_to_string({}) failed", path.display()))?;
        (SourceInput::File(path), text)
    };

    let mut sm = SourceMap::new();
    sm.add_file(source.display_name(), text.clone());

    let program = frontend::load_program_str(&text)
        .with_context(|| format!("load declaration stream from `{}`", source.display_name()))?;

    let mut opts = BuildOptions::default();
    opts.target_list = b
        .targets
        .or(proj.default_targets.clone())
        .unwrap_or_else(|| "sse2".to_string());
    opts.cpu = b.cpu;
    opts.arch = b.arch;
    opts.output = b.output;
    opts.kind = b.kind;
    opts.header = b.header;
    opts.deps = b.deps;
    opts.deps_make_rule = !b.flat_deps;
    opts.deps_target = b.deps_target;
    opts.host_stub = b.host_stub;
    opts.dev_stub = b.dev_stub;
    opts.opt = b.opt.or(proj.default_opt).unwrap_or(target::OptLevel::None);
    opts.pic = if b.no_pic { false } else { proj.default_pic.unwrap_or(true) };
    opts.debug_info = b.debug_info;
    if let Some(cfg) = &proj.config_path {
        opts.extra_deps.push(cfg.display().to_string());
    }

    let mut diags = DiagSink::new();
    // TODO: 接入表达式 lowering 前端落地后把 lowerer 换成真实实现
    driver::compile_and_output(&program, &source, &opts, &sm, &mut diags, None)?;

    let diag_vec: Vec<_> = diags.iter().cloned().collect();
    render_diagnostics_colored(&diag_vec, &sm);

    let had_errors = diags.error_count() > 0;
    if !had_errors {
        fmt.success(
            &opts.target_list,
            std::path::Path::new(&source.display_name()),
            opts.output.as_deref(),
            started.elapsed().as_secs_f64(),
        );
    }
    Ok(had_errors)
}
