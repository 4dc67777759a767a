// src/utils/fast.rs

//! “快表”工具集：默认用 `hashbrown + AHash`，整型键使用 `nohash-hasher` 零哈希。

pub use ahash::RandomState as AHashBuilder;
pub use smallvec::SmallVec;

/// hashbrown + AHash
pub type FastMap<K, V> = hashbrown::HashMap<K, V, AHashBuilder>;
/// hashbrown + AHash
pub type FastSet<K>    = hashbrown::HashSet<K, AHashBuilder>;

/// 新建空 `FastMap`
#[inline]
pub fn fast_map<K, V>() -> FastMap<K, V> {
    FastMap::with_hasher(AHashBuilder::default())
}

/// 新建空 `FastSet`
#[inline]
pub fn fast_set<K>() -> FastSet<K> {
    FastSet::with_hasher(AHashBuilder::default())
}

/// 预分配容量的 `FastMap`
#[inline]
pub fn fast_map_with_cap<K, V>(cap: usize) -> FastMap<K, V> {
    FastMap::with_capacity_and_hasher(cap, AHashBuilder::default())
}

/// `nohash-hasher` 的构建器（Key 自身即散列）
pub type IntBuild<K> = nohash_hasher::BuildNoHashHasher<K>;

/// 适用于 `u8/u16/u32/u64/usize` 等整型键
pub type IntMap<K, V> = hashbrown::HashMap<K, V, IntBuild<K>>;

/// 新建空 `IntMap`
#[inline]
pub fn int_map<K, V>() -> IntMap<K, V> {
    IntMap::with_hasher(IntBuild::<K>::default())
}

/// 常用模板：最多 4/8 个元素时不分配堆内存
pub type SmallVec4<T> = SmallVec<[T; 4]>;
pub type SmallVec8<T> = SmallVec<[T; 8]>;
