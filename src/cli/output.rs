// src/cli/output.rs
use crate::cli::colors::{ColorSupport, ansi};
use std::path::Path;

/// 输出格式化器
pub struct OutputFormatter {
    color_support: ColorSupport,
    quiet: bool,
}

impl OutputFormatter {
    pub fn new(quiet: bool) -> Self {
        Self { color_support: ColorSupport::detect(), quiet }
    }

    /// 构建成功摘要
    pub fn success(&self, targets: &str, source: &Path, output: Option<&Path>, duration: f64) {
        if self.quiet {
            return;
        }
        let source = source.file_name().unwrap_or(source.as_os_str()).to_string_lossy();
        let dest = output
            .map(|o| o.display().to_string())
            .unwrap_or_else(|| "(no output requested)".into());
        if self.color_support.is_enabled() {
            eprintln!(
                "{}build [{}]  {} -> {}  ({:.2}s){}",
                ansi::GREEN,
                targets,
                source,
                dest,
                duration,
                ansi::RESET
            );
        } else {
            eprintln!("build [{}]  {} -> {}  ({:.2}s)", targets, source, dest, duration);
        }
    }

    pub fn error(&self, message: &str) {
        if self.color_support.is_enabled() {
            eprintln!("{}{}{}", ansi::RED, message, ansi::RESET);
        } else {
            eprintln!("{}", message);
        }
    }

    pub fn warning(&self, message: &str) {
        if self.color_support.is_enabled() {
            eprintln!("{}{}{}", ansi::YELLOW, message, ansi::RESET);
        } else {
            eprintln!("{}", message);
        }
    }

    pub fn info(&self, message: &str) {
        if self.quiet {
            return;
        }
        if self.color_support.is_enabled() {
            eprintln!("{}{}{}", ansi::BLUE, message, ansi::RESET);
        } else {
            eprintln!("{}", message);
        }
    }
}
