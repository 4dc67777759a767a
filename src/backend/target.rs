// src/backend/target.rs
//! 指令集目标注册表与 Cranelift ISA 构造。
//!
//! `Isa` 是固定全序的能力枚举（0 = 最低档），运行期分发按这个序号比较；
//! `TargetSpec` 是一条可请求的目标（同一 Isa 可以有不同 lane 宽度的变体）。

use std::sync::Arc;

use anyhow::{Result, anyhow};
use cranelift_codegen::isa::{self, TargetIsa};
use cranelift_codegen::settings::{self, Configurable, Flags};
use once_cell::sync::Lazy;
use target_lexicon::{Architecture, Triple};

use crate::utils::fast::{FastMap, fast_map_with_cap};

/// 能力档位，序号即运行期比较用的 enumerant（最低档 = 0）
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Isa {
    Sse2 = 0,
    Sse41 = 1,
    Avx = 2,
    Avx2 = 3,
    Avx512 = 4,
}

impl Isa {
    pub const COUNT: usize = 5;

    pub fn index(self) -> u8 {
        self as u8
    }

    /// 文件名拼接与 mangle 后缀用的短名
    pub fn name(self) -> &'static str {
        match self {
            Isa::Sse2 => "sse2",
            Isa::Sse41 => "sse4",
            Isa::Avx => "avx",
            Isa::Avx2 => "avx2",
            Isa::Avx512 => "avx512",
        }
    }

    /// 该档位需要打开的 x86_64 特性开关（累积）
    fn clif_features(self) -> &'static [&'static str] {
        match self {
            Isa::Sse2 => &[],
            Isa::Sse41 => &["has_sse3", "has_ssse3", "has_sse41"],
            Isa::Avx => &["has_sse3", "has_ssse3", "has_sse41", "has_sse42", "has_avx"],
            Isa::Avx2 => &[
                "has_sse3", "has_ssse3", "has_sse41", "has_sse42", "has_avx", "has_avx2",
                "has_fma", "has_popcnt", "has_lzcnt", "has_bmi1", "has_bmi2",
            ],
            Isa::Avx512 => &[
                "has_sse3", "has_ssse3", "has_sse41", "has_sse42", "has_avx", "has_avx2",
                "has_fma", "has_popcnt", "has_lzcnt", "has_bmi1", "has_bmi2",
                "has_avx512f", "has_avx512vl", "has_avx512dq",
            ],
        }
    }
}

/// 一条可请求的编译目标：能力档位 + lane 宽度
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TargetSpec {
    pub name: &'static str,
    pub isa: Isa,
    pub width: u32,
}

/// 注册表。同族多宽度（如 sse4 / sse4-x2）映射到同一个 Isa。
static TARGETS: &[TargetSpec] = &[
    TargetSpec { name: "sse2", isa: Isa::Sse2, width: 4 },
    TargetSpec { name: "sse4", isa: Isa::Sse41, width: 4 },
    TargetSpec { name: "sse4-x2", isa: Isa::Sse41, width: 8 },
    TargetSpec { name: "avx", isa: Isa::Avx, width: 8 },
    TargetSpec { name: "avx2", isa: Isa::Avx2, width: 8 },
    TargetSpec { name: "avx2-x2", isa: Isa::Avx2, width: 16 },
    TargetSpec { name: "avx512", isa: Isa::Avx512, width: 16 },
];

static TARGET_INDEX: Lazy<FastMap<&'static str, &'static TargetSpec>> = Lazy::new(|| {
    let mut m = fast_map_with_cap(TARGETS.len());
    for t in TARGETS {
        m.insert(t.name, t);
    }
    m
});

pub fn lookup(name: &str) -> Option<&'static TargetSpec> {
    TARGET_INDEX.get(name).copied()
}

pub fn all() -> &'static [TargetSpec] {
    TARGETS
}

/// 拆分逗号分隔的目标列表（保持请求顺序）
pub fn split_target_list(list: &str) -> Vec<String> {
    list.split(',').map(|s| s.trim().to_string()).collect()
}

/// 已知的 CPU 覆盖名 -> 对应能力档位（单目标模式下有效）
pub fn cpu_isa(cpu: &str) -> Option<Isa> {
    match cpu {
        "core2" | "penryn" => Some(Isa::Sse2),
        "nehalem" | "westmere" | "corei7" => Some(Isa::Sse41),
        "sandybridge" | "ivybridge" | "corei7-avx" => Some(Isa::Avx),
        "haswell" | "broadwell" | "core-avx2" => Some(Isa::Avx2),
        "skylake-avx512" | "icelake-client" => Some(Isa::Avx512),
        _ => None,
    }
}

pub fn arch_supported(arch: &str) -> bool {
    matches!(arch, "x86-64" | "x86_64" | "x64")
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptLevel {
    None,
    Speed,
    SpeedAndSize,
}

impl OptLevel {
    pub fn flag(self) -> &'static str {
        match self {
            OptLevel::None => "none",
            OptLevel::Speed => "speed",
            OptLevel::SpeedAndSize => "speed_and_size",
        }
    }
}

/// 为一个目标构造 Cranelift ISA。
/// CPU 覆盖只抬升特性开关；失败属于内部配置错误而非用户诊断。
pub fn build_isa(
    spec: &TargetSpec,
    opt: OptLevel,
    pic: bool,
    cpu: Option<&str>,
) -> Result<Arc<dyn TargetIsa>> {
    let mut shared = settings::builder();
    shared.set("opt_level", opt.flag())?;
    shared.set("is_pic", if pic { "true" } else { "false" })?;
    let flags = Flags::new(shared);

    // 目标架构固定 x86_64，OS/ABI 跟宿主走（决定目标文件格式）
    let mut triple = Triple::host();
    triple.architecture = Architecture::X86_64;
    let mut builder = isa::lookup(triple).map_err(|e| anyhow!("isa lookup: {e}"))?;

    let feature_isa = match cpu {
        Some(c) => cpu_isa(c).ok_or_else(|| anyhow!("unknown cpu `{c}`"))?.max(spec.isa),
        None => spec.isa,
    };
    for f in feature_isa.clif_features() {
        builder.enable(f)?;
    }

    builder
        .finish(flags)
        .map_err(|e| anyhow!("finish target machine for `{}`: {e}", spec.name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_lookup_and_widths() {
        assert_eq!(lookup("sse4").unwrap().width, 4);
        assert_eq!(lookup("sse4-x2").unwrap().width, 8);
        assert_eq!(lookup("avx512").unwrap().width, 16);
        assert!(lookup("neon").is_none());
    }

    #[test]
    fn same_family_shares_isa() {
        assert_eq!(lookup("sse4").unwrap().isa, lookup("sse4-x2").unwrap().isa);
        assert_ne!(lookup("sse4").unwrap().isa, lookup("avx").unwrap().isa);
    }

    #[test]
    fn capability_order_is_total() {
        assert!(Isa::Sse2 < Isa::Sse41);
        assert!(Isa::Avx2 < Isa::Avx512);
        assert_eq!(Isa::Sse2.index(), 0);
        assert_eq!(Isa::Avx512.index(), 4);
    }

    #[test]
    fn split_preserves_request_order() {
        assert_eq!(split_target_list("avx2, sse2"), vec!["avx2", "sse2"]);
        assert_eq!(split_target_list("sse4"), vec!["sse4"]);
    }
}
