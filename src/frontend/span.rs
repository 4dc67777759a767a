//! 源位置信息（供 ariadne/DiagSink 使用）

use serde::{Deserialize, Serialize};
use std::ops::Range;

/// 逻辑文件 ID（与 DiagSink / ariadne 的文件缓存一一对应）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileId(pub usize);

impl FileId {
    pub const DUMMY: FileId = FileId(usize::MAX);
}

/// 半开区间 [start, end)，单位为字节偏移
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub file: FileId,
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub const DUMMY: Span = Span { file: FileId::DUMMY, start: 0, end: 0 };

    #[inline]
    pub fn range(&self) -> Range<usize> { self.start..self.end }

    #[inline]
    pub fn merge(a: Span, b: Span) -> Span {
        debug_assert_eq!(a.file, b.file, "cannot merge spans across files");
        Span { file: a.file, start: a.start.min(b.start), end: a.end.max(b.end) }
    }
}
