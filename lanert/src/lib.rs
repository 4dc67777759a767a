//! 分发支持库：多目标构建产物在运行期做硬件能力探测时链接的符号。
//!
//! 合并模块里的每个蹦床先调 `__lane_set_system_isa()`（幂等，真正的
//! 探测只跑一次，结果缓存在进程级状态里），再读
//! `__lane_system_best_isa` 与候选档位比较。档位编号与编译器的
//! 能力全序一致：sse2=0, sse4=1, avx=2, avx2=3, avx512=4。

use std::sync::atomic::{AtomicI32, Ordering};

use once_cell::sync::OnceCell;

/// 探测出的系统最佳 ISA；探测前为 -1
#[allow(non_upper_case_globals)]
#[unsafe(no_mangle)]
pub static __lane_system_best_isa: AtomicI32 = AtomicI32::new(-1);

static DETECTED: OnceCell<i32> = OnceCell::new();

#[cfg(target_arch = "x86_64")]
fn detect_best_isa() -> i32 {
    if is_x86_feature_detected!("avx512f") && is_x86_feature_detected!("avx512vl") {
        4
    } else if is_x86_feature_detected!("avx2") {
        3
    } else if is_x86_feature_detected!("avx") {
        2
    } else if is_x86_feature_detected!("sse4.1") {
        1
    } else {
        0
    }
}

#[cfg(not(target_arch = "x86_64"))]
fn detect_best_isa() -> i32 {
    // 非 x86 宿主没有可用档位，落到编译基线
    0
}

/// 确保 `__lane_system_best_isa` 已初始化。每次蹦床调用都会进来，
/// 重复调用安全且便宜。
#[unsafe(no_mangle)]
pub extern "C" fn __lane_set_system_isa() {
    let v = *DETECTED.get_or_init(detect_best_isa);
    __lane_system_best_isa.store(v, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detection_is_idempotent_and_in_range() {
        __lane_set_system_isa();
        let first = __lane_system_best_isa.load(Ordering::Relaxed);
        __lane_set_system_isa();
        let second = __lane_system_best_isa.load(Ordering::Relaxed);
        assert_eq!(first, second);
        assert!((0..=4).contains(&first));
    }
}
