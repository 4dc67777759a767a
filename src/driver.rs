// src/driver.rs
//! 构建驱动：单目标直出，多目标循环 + 全局收编 + 分发合成。
//!
//! 进程级可变的“当前目标/优化档”在这里收敛为显式的 `BuildContext`
//! 值，逐个传给编译单元；单元之间天然串行（见 `BuildContext` 注释），
//! 但不再依赖任何全局环境状态。

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::backend::codegen::{UnitBackend, UnitOutput};
use crate::backend::deps::write_deps;
use crate::backend::dispatch::{TargetVariantMap, collect_exported_functions};
use crate::backend::header::{CombinedHeader, write_header};
use crate::backend::lower::BodyLowerer;
use crate::backend::reconcile::DispatchModule;
use crate::backend::stubs::{write_dev_stub, write_host_stub};
use crate::backend::target::{self, OptLevel, TargetSpec};
use crate::diag::{DiagSink, SourceMap, codes};
use crate::frontend::ast::Program;
use crate::middle::symtab::SymbolTable;
use crate::middle::validate::Validator;
use crate::utils::fast::{IntMap, int_map};

/// 一个编译单元的全部环境：目标、优化档、PIC、mangle 策略。
/// 按值传进单元构造器，不做进程级全局状态；这也给并行逐目标编译
/// 留了门，当前实现仍按请求顺序串行。
#[derive(Clone, Debug)]
pub struct BuildContext {
    pub target: TargetSpec,
    pub opt: OptLevel,
    pub pic: bool,
    /// 多目标同时编译时给导出符号追加 ISA 限定名
    pub mangle_with_target: bool,
    pub debug_info: bool,
    pub cpu: Option<String>,
}

impl BuildContext {
    pub fn new(target: TargetSpec) -> Self {
        BuildContext {
            target,
            opt: OptLevel::None,
            pic: true,
            mangle_with_target: false,
            debug_info: false,
            cpu: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputKind {
    Object,
    Assembly,
    /// 文本 CLIF——本后端的“可移植位码”形态
    ClifText,
}

impl OutputKind {
    fn expected_exts(self) -> &'static [&'static str] {
        match self {
            OutputKind::Object => &["o", "obj"],
            OutputKind::Assembly => &["s", "asm"],
            OutputKind::ClifText => &["clif"],
        }
    }
}

/// 编译输入。stdin 只能读一遍，多目标构建必须逐目标重读源，因此拒绝。
#[derive(Clone, Debug)]
pub enum SourceInput {
    File(PathBuf),
    Stdin,
}

impl SourceInput {
    pub fn is_stdin(&self) -> bool {
        matches!(self, SourceInput::Stdin)
    }

    pub fn display_name(&self) -> String {
        match self {
            SourceInput::File(p) => p.display().to_string(),
            SourceInput::Stdin => "<stdin>".into(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct BuildOptions {
    /// 单个目标名，或逗号分隔的多目标列表
    pub target_list: String,
    pub cpu: Option<String>,
    pub arch: Option<String>,
    pub output: Option<PathBuf>,
    pub kind: OutputKind,
    pub header: Option<PathBuf>,
    pub deps: Option<PathBuf>,
    pub deps_make_rule: bool,
    pub deps_target: Option<String>,
    pub host_stub: Option<PathBuf>,
    pub dev_stub: Option<PathBuf>,
    pub opt: OptLevel,
    pub pic: bool,
    pub debug_info: bool,
    /// 源文件之外还要进依赖清单的文件（如工程配置）
    pub extra_deps: Vec<String>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        BuildOptions {
            target_list: "sse2".into(),
            cpu: None,
            arch: None,
            output: None,
            kind: OutputKind::Object,
            header: None,
            deps: None,
            deps_make_rule: true,
            deps_target: None,
            host_stub: None,
            dev_stub: None,
            opt: OptLevel::None,
            pic: true,
            debug_info: false,
            extra_deps: Vec::new(),
        }
    }
}

pub struct CompiledUnit {
    pub symtab: SymbolTable,
    pub be: UnitBackend,
}

/// 编译一个目标：声明校验 + 工件建立 + （有协作者时）函数体 lowering
pub fn compile_unit(
    prog: &Program,
    ctx: &BuildContext,
    sm: &SourceMap,
    diags: &mut DiagSink,
    lowerer: Option<&mut dyn BodyLowerer>,
    kind: OutputKind,
) -> Result<CompiledUnit> {
    let mut symtab = SymbolTable::new();
    let mut be = UnitBackend::new(ctx)?;
    be.set_capture(kind == OutputKind::Assembly, kind == OutputKind::ClifText);

    Validator::new(ctx, &mut symtab, &mut be, diags, sm).walk_program(prog)?;

    let bodies = be.take_bodies();
    if let Some(l) = lowerer {
        for body in &bodies {
            l.lower(&mut be, body)?;
        }
    }

    Ok(CompiledUnit { symtab, be })
}

/// 目标限定的输出文件名：`foo.o` + `avx2` -> `foo_avx2.o`；
/// 没有后缀就直接追加 `_avx2`。
pub fn target_file_name(base: &str, isa_name: &str) -> String {
    match base.rfind('.') {
        Some(dot) => format!("{}_{}{}", &base[..dot], isa_name, &base[dot..]),
        None => format!("{}_{}", base, isa_name),
    }
}

fn check_suffix(path: &Path, kind: OutputKind, diags: &mut DiagSink) {
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        if !kind.expected_exts().contains(&ext) {
            diags.warn(
                codes::SUFFIX_MISMATCH,
                &path.display().to_string(),
                None,
                format!(
                    "output file suffix `.{}` doesn't match the requested output type (expected one of: {})",
                    ext,
                    kind.expected_exts().join(", ")
                ),
            );
        }
    }
}

fn write_unit_output(out: &UnitOutput, kind: OutputKind, path: &Path) -> Result<()> {
    match kind {
        OutputKind::Object => std::fs::write(path, &out.object),
        OutputKind::Assembly => std::fs::write(path, &out.asm),
        OutputKind::ClifText => std::fs::write(path, &out.clif),
    }
    .with_context(|| format!("write output `{}`", path.display()))
}

fn deps_target_name(opts: &BuildOptions, source: &SourceInput) -> String {
    if let Some(t) = &opts.deps_target {
        return t.clone();
    }
    if let Some(o) = &opts.output {
        return o.display().to_string();
    }
    match source {
        SourceInput::File(p) => {
            let mut s = p.display().to_string();
            if let Some(dot) = s.rfind('.') {
                s.truncate(dot);
            }
            s.push_str(".o");
            s
        }
        SourceInput::Stdin => "a.out".into(),
    }
}

fn collect_deps(sm: &SourceMap, opts: &BuildOptions) -> BTreeSet<String> {
    let mut deps: BTreeSet<String> = sm.file_names().into_iter().collect();
    deps.extend(opts.extra_deps.iter().cloned());
    deps
}

/// 整个构建的入口：按目标列表决定单目标或多目标路径。
/// 用户错误都进 `diags`（错误计数非零即构建失败，不写任何输出）；
/// `Err` 只用于内部致命问题。
pub fn compile_and_output(
    prog: &Program,
    source: &SourceInput,
    opts: &BuildOptions,
    sm: &SourceMap,
    diags: &mut DiagSink,
    mut lowerer: Option<&mut dyn BodyLowerer>,
) -> Result<()> {
    let src_name = source.display_name();

    if let Some(arch) = &opts.arch {
        if !target::arch_supported(arch) {
            diags.error(codes::BAD_ARCH, &src_name, None, format!("unsupported architecture `{}`", arch));
            return Ok(());
        }
    }

    if !opts.target_list.contains(',') {
        compile_single(prog, source, opts, sm, diags, lowerer)
    } else {
        compile_multi(prog, source, opts, sm, diags, &mut lowerer)
    }
}

fn compile_single(
    prog: &Program,
    source: &SourceInput,
    opts: &BuildOptions,
    sm: &SourceMap,
    diags: &mut DiagSink,
    lowerer: Option<&mut dyn BodyLowerer>,
) -> Result<()> {
    let src_name = source.display_name();
    let name = opts.target_list.trim();
    let Some(spec) = target::lookup(name) else {
        diags.error(codes::BAD_TARGET, &src_name, None, format!("unknown compilation target `{}`", name));
        return Ok(());
    };
    if let Some(cpu) = &opts.cpu {
        if target::cpu_isa(cpu).is_none() {
            diags.error(codes::BAD_CPU, &src_name, None, format!("unknown cpu `{}`", cpu));
            return Ok(());
        }
    }

    let mut ctx = BuildContext::new(*spec);
    ctx.opt = opts.opt;
    ctx.pic = opts.pic;
    ctx.debug_info = opts.debug_info;
    ctx.cpu = opts.cpu.clone();

    let unit = compile_unit(prog, &ctx, sm, diags, lowerer, opts.kind)?;
    if diags.error_count() > 0 {
        return Ok(());
    }

    let symtab = unit.symtab;
    if let Some(out) = &opts.output {
        check_suffix(out, opts.kind, diags);
        let produced = unit.be.finish()?;
        write_unit_output(&produced, opts.kind, out)?;
    }
    if let Some(h) = &opts.header {
        write_header(h, &symtab, spec.width)?;
    }
    if let Some(d) = &opts.deps {
        let deps = collect_deps(sm, opts);
        write_deps(
            Some(d),
            opts.deps_make_rule,
            &deps_target_name(opts, source),
            Some(&src_name),
            &deps,
        )?;
    }
    if let Some(p) = &opts.host_stub {
        write_host_stub(p, &symtab, spec.width, sm, diags)?;
    }
    if let Some(p) = &opts.dev_stub {
        write_dev_stub(p, &symtab, spec.width, sm, diags)?;
    }
    Ok(())
}

fn compile_multi(
    prog: &Program,
    source: &SourceInput,
    opts: &BuildOptions,
    sm: &SourceMap,
    diags: &mut DiagSink,
    lowerer: &mut Option<&mut dyn BodyLowerer>,
) -> Result<()> {
    let src_name = source.display_name();

    if source.is_stdin() {
        diags.error(
            codes::STREAMED_SOURCE,
            &src_name,
            None,
            "compiling from standard input isn't supported for multiple targets; the source must be re-read once per target",
        );
        return Ok(());
    }
    if opts.cpu.is_some() {
        diags.error(
            codes::CPU_OVERRIDE,
            &src_name,
            None,
            "illegal to specify a cpu override when compiling for multiple targets",
        );
        return Ok(());
    }
    if opts.output.as_deref() == Some(Path::new("-")) {
        diags.error(
            codes::STDOUT_MULTI,
            &src_name,
            None,
            "multi-target compilation can't write output to stdout; provide an output filename",
        );
        return Ok(());
    }

    let names = target::split_target_list(&opts.target_list);

    // 预解析全部目标：分发模块要用能力最低的那台目标机——它是所有
    // 请求目标的公共下界，蹦床代码在任何一台机器上都能执行
    let mut specs: Vec<&'static TargetSpec> = Vec::with_capacity(names.len());
    for name in &names {
        match target::lookup(name) {
            Some(s) => specs.push(s),
            None => {
                diags.error(codes::BAD_TARGET, &src_name, None, format!("unknown compilation target `{}`", name));
                return Ok(());
            }
        }
    }
    let baseline_spec = *specs.iter().min_by_key(|s| s.isa).expect("non-empty target list");

    if let Some(out) = &opts.output {
        check_suffix(out, opts.kind, diags);
    }

    let mut seen_isas: IntMap<u8, &'static str> = int_map();
    let mut dispatch: Option<DispatchModule> = None;
    let mut variants = TargetVariantMap::new();
    let mut combined = opts.header.as_ref().map(|p| CombinedHeader::new(p.clone()));

    for spec in &specs {
        // 同一指令集只许编一次（avx2 和 avx2-x2 不能共存）
        if let Some(prev) = seen_isas.insert(spec.isa.index(), spec.name) {
            diags.error(
                codes::DUPLICATE_ISA,
                &src_name,
                None,
                format!(
                    "can't compile to multiple variants of the `{}` instruction set (`{}` and `{}`)",
                    spec.isa.name(),
                    prev,
                    spec.name
                ),
            );
            return Ok(());
        }

        let mut ctx = BuildContext::new(**spec);
        ctx.opt = opts.opt;
        ctx.pic = opts.pic;
        ctx.debug_info = opts.debug_info;
        ctx.mangle_with_target = true;

        let reborrowed: Option<&mut dyn BodyLowerer> = match lowerer {
            Some(l) => Some(&mut **l),
            None => None,
        };
        let mut unit = compile_unit(prog, &ctx, sm, diags, reborrowed, opts.kind)?;

        // 任何一个目标出错，整个多目标构建立刻中止
        if diags.error_count() > 0 {
            return Ok(());
        }

        // 首个成功的单元初始化合并模块并贡献规范全局定义；
        // 后续单元只做结构核对
        let check = dispatch.is_some();
        let dm = match &mut dispatch {
            Some(dm) => dm,
            slot @ None => {
                let mut dm = DispatchModule::new(baseline_spec, opts.opt, opts.pic)?;
                dm.set_capture(opts.kind == OutputKind::Assembly, opts.kind == OutputKind::ClifText);
                slot.insert(dm)
            }
        };
        dm.extract_or_check_globals(&mut unit.be, sm, diags, check)?;

        collect_exported_functions(&unit.symtab, spec.isa, &mut variants);

        if let Some(out) = &opts.output {
            let path = PathBuf::from(target_file_name(&out.display().to_string(), spec.isa.name()));
            let produced = unit.be.finish()?;
            write_unit_output(&produced, opts.kind, &path)?;
        }

        if let Some(h) = &mut combined {
            h.width_section(&unit.symtab, spec.width);
            h.functions(&unit.symtab, spec.width);
        }
        if let Some(hpath) = &opts.header {
            let per_target = PathBuf::from(target_file_name(&hpath.display().to_string(), spec.isa.name()));
            write_header(&per_target, &unit.symtab, spec.width)?;
        }
    }

    if let Some(mut h) = combined {
        h.back_matter();
        h.write()?;
    }

    // 全部单元结束后才动合并模块：发射蹦床、模块级清理与自检
    if let Some(mut dm) = dispatch {
        dm.emit_dispatch(&variants)?;
        if let Some(out) = &opts.output {
            let produced = dm.finish()?;
            write_unit_output(&produced, opts.kind, out)?;
        }
    }

    if let Some(d) = &opts.deps {
        let deps = collect_deps(sm, opts);
        write_deps(
            Some(d),
            opts.deps_make_rule,
            &deps_target_name(opts, source),
            Some(&src_name),
            &deps,
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_file_name_splices_before_suffix() {
        assert_eq!(target_file_name("foo.o", "avx2"), "foo_avx2.o");
        assert_eq!(target_file_name("foo", "sse4"), "foo_sse4");
        assert_eq!(target_file_name("dir.v1/out.obj", "sse2"), "dir.v1/out_sse2.obj");
    }

    #[test]
    fn deps_target_defaults_follow_source() {
        let opts = BuildOptions::default();
        let src = SourceInput::File(PathBuf::from("prog.lane"));
        assert_eq!(deps_target_name(&opts, &src), "prog.o");
        assert_eq!(deps_target_name(&opts, &SourceInput::Stdin), "a.out");

        let mut with_out = BuildOptions::default();
        with_out.output = Some(PathBuf::from("x.o"));
        assert_eq!(deps_target_name(&with_out, &src), "x.o");
    }
}
