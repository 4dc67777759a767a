// src/backend/deps.rs
//! 依赖清单输出：Makefile 规则或逐行列表。

use std::collections::BTreeSet;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

/// 写依赖清单。`path = None` 表示写到 stdout。
/// `make_rule` 时输出 `target: source deps...`；源文件永远排最前。
pub fn write_deps(
    path: Option<&Path>,
    make_rule: bool,
    target_name: &str,
    source_name: Option<&str>,
    deps: &BTreeSet<String>,
) -> Result<()> {
    let mut out = String::new();
    if make_rule {
        out.push_str(&format!("{}:", target_name));
        if let Some(src) = source_name {
            out.push_str(&format!(" {} \\\n", src));
        }
        for d in deps {
            if source_name == Some(d.as_str()) {
                continue;
            }
            out.push_str(&format!(" {} \\\n", d));
        }
        out.push('\n');
    } else {
        for d in deps {
            out.push_str(d);
            out.push('\n');
        }
    }

    match path {
        Some(p) => std::fs::write(p, out).with_context(|| format!("write deps `{}`", p.display())),
        None => {
            std::io::stdout().write_all(out.as_bytes()).context("write deps to stdout")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deps_are_sorted_and_deduplicated() {
        let mut deps = BTreeSet::new();
        deps.insert("b.lane".to_string());
        deps.insert("a.lane".to_string());
        deps.insert("b.lane".to_string());
        let v: Vec<&String> = deps.iter().collect();
        assert_eq!(v, ["a.lane", "b.lane"]);
    }
}
