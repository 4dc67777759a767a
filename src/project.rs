// src/project.rs
//! 可选的 Lane.toml 工程配置：给 CLI 提供目标列表/优化档的默认值。

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::backend::target::OptLevel;

#[derive(Debug, Default, Deserialize)]
struct LaneToml {
    #[serde(default)]
    package: Package,
    #[serde(default)]
    build: BuildTable,
}

#[derive(Debug, Default, Deserialize)]
struct Package {
    #[serde(default)]
    name: String,
    #[serde(default)]
    version: Option<String>, // 暂时不用，但允许写上不报错
}

#[derive(Debug, Default, Deserialize)]
struct BuildTable {
    /// 逗号分隔目标列表，如 "sse2,avx2"
    #[serde(default)]
    targets: Option<String>,
    /// "O0" | "O1" | "O2"
    #[serde(default)]
    opt: Option<String>,
    #[serde(default)]
    pic: Option<bool>,
}

/// 工程描述
#[derive(Debug, Clone, Default)]
pub struct Project {
    pub root: PathBuf,
    pub name: String,
    pub version: Option<String>,
    pub config_path: Option<PathBuf>,
    pub default_targets: Option<String>,
    pub default_opt: Option<OptLevel>,
    pub default_pic: Option<bool>,
}

fn parse_opt(s: &str) -> Option<OptLevel> {
    match s {
        "O0" | "0" => Some(OptLevel::None),
        "O1" | "1" => Some(OptLevel::SpeedAndSize),
        "O2" | "2" => Some(OptLevel::Speed),
        _ => None,
    }
}

/// 从指定目录读 Lane.toml；没有配置文件就给全默认值
pub fn load_from(dir: &Path) -> Result<Project> {
    let path = dir.join("Lane.toml");
    if !path.exists() {
        return Ok(Project { root: dir.to_path_buf(), ..Project::default() });
    }
    let text = fs::read_to_string(&path)
        .with_context(|| format!("read_to_string({}) failed", path.display()))?;
    let parsed: LaneToml =
        toml::from_str(&text).with_context(|| format!("parse `{}` failed", path.display()))?;
    Ok(Project {
        root: dir.to_path_buf(),
        name: parsed.package.name,
        version: parsed.package.version,
        config_path: Some(path),
        default_targets: parsed.build.targets,
        default_opt: parsed.build.opt.as_deref().and_then(parse_opt),
        default_pic: parsed.build.pic,
    })
}

pub fn load_from_cwd() -> Result<Project> {
    let cwd = std::env::current_dir().context("getcwd")?;
    load_from(&cwd)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_build_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("Lane.toml"),
            "[package]\nname = \"demo\"\n\n[build]\ntargets = \"sse2,avx2\"\nopt = \"O2\"\n",
        )
        .unwrap();
        let p = load_from(dir.path()).unwrap();
        assert_eq!(p.name, "demo");
        assert_eq!(p.default_targets.as_deref(), Some("sse2,avx2"));
        assert_eq!(p.default_opt, Some(OptLevel::Speed));
        assert!(p.config_path.is_some());
    }

    #[test]
    fn missing_config_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        let p = load_from(dir.path()).unwrap();
        assert!(p.config_path.is_none());
        assert!(p.default_targets.is_none());
    }
}
