// src/cli/args.rs
// 命令行参数解析

use std::env;
use std::path::PathBuf;

use crate::backend::target::OptLevel;
use crate::driver::OutputKind;

#[derive(Debug, Clone)]
pub struct BuildArgs {
    pub input: String,
    pub targets: Option<String>,
    pub cpu: Option<String>,
    pub arch: Option<String>,
    pub output: Option<PathBuf>,
    pub kind: OutputKind,
    pub header: Option<PathBuf>,
    pub deps: Option<PathBuf>,
    pub deps_target: Option<String>,
    pub flat_deps: bool,
    pub host_stub: Option<PathBuf>,
    pub dev_stub: Option<PathBuf>,
    pub opt: Option<OptLevel>,
    pub debug_info: bool,
    pub no_pic: bool,
    pub quiet: bool,
}

#[derive(Debug, Clone)]
pub enum Command {
    Build(BuildArgs),
    ListTargets,
    Help,
}

#[derive(Debug)]
pub struct CliArgs {
    pub command: Command,
}

pub const USAGE: &str = "\
usage: lanec <command> [options]

commands:
    build <program.json|->   compile a front-end declaration stream
    targets                  list supported compilation targets
    help                     show this message

build options:
    --target <list>          comma-separated target list (e.g. sse2,avx2)
    --cpu <name>             cpu override (single target only)
    --arch <name>            architecture (x86-64)
    -o <file>                output file (per-target names get _<isa> spliced in)
    --emit <obj|asm|clif>    output kind (default obj)
    --header <file>          write a C-compatible header
    --deps <file>            write a Makefile-style dependency list
    --deps-target <name>     rule target name for --deps
    --flat-deps              newline-separated dependency list instead of a rule
    --host-stub <file>       write host-side offload call stubs
    --dev-stub <file>        write device-side offload call stubs
    -O0 | -O1 | -O2          optimization level
    -g                       record debug metadata for globals
    --no-pic                 disable position-independent code
    --quiet                  suppress progress output";

impl CliArgs {
    pub fn parse() -> Result<Self, String> {
        let args: Vec<String> = env::args().skip(1).collect();
        Self::parse_from(args)
    }

    pub fn parse_from(args: Vec<String>) -> Result<Self, String> {
        if args.is_empty() {
            return Err(USAGE.to_string());
        }

        match args[0].as_str() {
            "help" | "--help" | "-h" => Ok(CliArgs { command: Command::Help }),
            "targets" => Ok(CliArgs { command: Command::ListTargets }),
            "build" => {
                let mut b = BuildArgs {
                    input: String::new(),
                    targets: None,
                    cpu: None,
                    arch: None,
                    output: None,
                    kind: OutputKind::Object,
                    header: None,
                    deps: None,
                    deps_target: None,
                    flat_deps: false,
                    host_stub: None,
                    dev_stub: None,
                    opt: None,
                    debug_info: false,
                    no_pic: false,
                    quiet: false,
                };

                let mut i = 1;
                let take_value = |args: &[String], i: usize, flag: &str| -> Result<String, String> {
                    args.get(i + 1)
                        .cloned()
                        .ok_or_else(|| format!("{} requires an argument", flag))
                };
                while i < args.len() {
                    match args[i].as_str() {
                        "--target" => {
                            b.targets = Some(take_value(&args, i, "--target")?);
                            i += 2;
                        }
                        "--cpu" => {
                            b.cpu = Some(take_value(&args, i, "--cpu")?);
                            i += 2;
                        }
                        "--arch" => {
                            b.arch = Some(take_value(&args, i, "--arch")?);
                            i += 2;
                        }
                        "-o" => {
                            b.output = Some(PathBuf::from(take_value(&args, i, "-o")?));
                            i += 2;
                        }
                        "--emit" => {
                            b.kind = match take_value(&args, i, "--emit")?.as_str() {
                                "obj" => OutputKind::Object,
                                "asm" => OutputKind::Assembly,
                                "clif" => OutputKind::ClifText,
                                other => return Err(format!("unknown emit kind `{}`", other)),
                            };
                            i += 2;
                        }
                        "--header" => {
                            b.header = Some(PathBuf::from(take_value(&args, i, "--header")?));
                            i += 2;
                        }
                        "--deps" => {
                            b.deps = Some(PathBuf::from(take_value(&args, i, "--deps")?));
                            i += 2;
                        }
                        "--deps-target" => {
                            b.deps_target = Some(take_value(&args, i, "--deps-target")?);
                            i += 2;
                        }
                        "--flat-deps" => {
                            b.flat_deps = true;
                            i += 1;
                        }
                        "--host-stub" => {
                            b.host_stub = Some(PathBuf::from(take_value(&args, i, "--host-stub")?));
                            i += 2;
                        }
                        "--dev-stub" => {
                            b.dev_stub = Some(PathBuf::from(take_value(&args, i, "--dev-stub")?));
                            i += 2;
                        }
                        "-O0" => {
                            b.opt = Some(OptLevel::None);
                            i += 1;
                        }
                        "-O1" => {
                            b.opt = Some(OptLevel::SpeedAndSize);
                            i += 1;
                        }
                        "-O2" => {
                            b.opt = Some(OptLevel::Speed);
                            i += 1;
                        }
                        "-g" => {
                            b.debug_info = true;
                            i += 1;
                        }
                        "--no-pic" => {
                            b.no_pic = true;
                            i += 1;
                        }
                        "--quiet" => {
                            b.quiet = true;
                            i += 1;
                        }
                        other => {
                            if other == "-" || !other.starts_with('-') {
                                if !b.input.is_empty() {
                                    return Err(format!("unexpected extra input `{}`", other));
                                }
                                b.input = other.to_string();
                                i += 1;
                            } else {
                                return Err(format!("unknown argument: {}", other));
                            }
                        }
                    }
                }

                if b.input.is_empty() {
                    return Err("usage: lanec build <program.json|-> [options]".to_string());
                }
                Ok(CliArgs { command: Command::Build(b) })
            }
            other => Err(format!("unknown command `{}`\n\n{}", other, USAGE)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_build_flags() {
        let c = CliArgs::parse_from(v(&[
            "build", "prog.json", "--target", "sse2,avx2", "-o", "out.o", "--emit", "obj",
            "--header", "out.h", "-O2", "-g",
        ]))
        .unwrap();
        let Command::Build(b) = c.command else { panic!("expected build") };
        assert_eq!(b.input, "prog.json");
        assert_eq!(b.targets.as_deref(), Some("sse2,avx2"));
        assert_eq!(b.output.as_deref(), Some(std::path::Path::new("out.o")));
        assert_eq!(b.opt, Some(OptLevel::Speed));
        assert!(b.debug_info);
    }

    #[test]
    fn stdin_input_is_accepted() {
        let c = CliArgs::parse_from(v(&["build", "-"])).unwrap();
        let Command::Build(b) = c.command else { panic!() };
        assert_eq!(b.input, "-");
    }

    #[test]
    fn missing_values_are_reported() {
        assert!(CliArgs::parse_from(v(&["build", "x.json", "--target"])).is_err());
        assert!(CliArgs::parse_from(v(&["frobnicate"])).is_err());
    }
}
