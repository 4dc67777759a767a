// src/backend/abi.rs
//! 语义类型 -> IR 层类型/布局。
//!
//! lane 宽度是目标属性，varying 数据在不同目标上尺寸不同；
//! `LayoutTy` 就是合并模块做跨目标结构兼容检查时比较的对象。

use cranelift_codegen::ir::{self, types};

use crate::frontend::ast::{AtomicKind, FnSig, Ty, Variability};
use crate::middle::fold::ConstValue;

/// 指针宽度：目标全部是 x86_64
pub const PTR_BYTES: u32 = 8;

/// 一个语义类型在某个具体目标上的 IR 级布局
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LayoutTy {
    Scalar(ir::Type),
    /// 逐 lane 或定长短向量：元素标量类型 + lane 数
    Vector(ir::Type, u32),
    Ptr,
    Array(Box<LayoutTy>, u32),
    Struct { fields: Vec<(u32, LayoutTy)>, size: u32, align: u32 },
}

impl LayoutTy {
    pub fn size(&self) -> u32 {
        match self {
            LayoutTy::Scalar(t) => t.bytes(),
            LayoutTy::Vector(t, n) => t.bytes() * n,
            LayoutTy::Ptr => PTR_BYTES,
            LayoutTy::Array(elem, n) => elem.size() * n,
            LayoutTy::Struct { size, .. } => *size,
        }
    }

    pub fn align(&self) -> u32 {
        match self {
            LayoutTy::Scalar(t) => t.bytes(),
            LayoutTy::Vector(t, _) => t.bytes(),
            LayoutTy::Ptr => PTR_BYTES,
            LayoutTy::Array(elem, _) => elem.align(),
            LayoutTy::Struct { align, .. } => *align,
        }
    }
}

pub fn clif_scalar(k: AtomicKind) -> ir::Type {
    match k {
        AtomicKind::Bool | AtomicKind::Int8 | AtomicKind::UInt8 => types::I8,
        AtomicKind::Int16 | AtomicKind::UInt16 => types::I16,
        AtomicKind::Int32 | AtomicKind::UInt32 => types::I32,
        AtomicKind::Int64 | AtomicKind::UInt64 => types::I64,
        AtomicKind::Float => types::F32,
        AtomicKind::Double => types::F64,
    }
}

/// 目标相关布局；void/函数类型没有数据布局
pub fn layout_of(ty: &Ty, width: u32) -> Option<LayoutTy> {
    match ty {
        Ty::Void | Ty::Func(_) => None,
        Ty::Atomic(k, Variability::Uniform) => Some(LayoutTy::Scalar(clif_scalar(*k))),
        Ty::Atomic(k, Variability::Varying) => Some(LayoutTy::Vector(clif_scalar(*k), width)),
        Ty::Enum(_, Variability::Uniform) => Some(LayoutTy::Scalar(types::I32)),
        Ty::Enum(_, Variability::Varying) => Some(LayoutTy::Vector(types::I32, width)),
        // varying 指针是逐 lane 的地址向量
        Ty::Ptr(_, Variability::Uniform) | Ty::Ref(..) => Some(LayoutTy::Ptr),
        Ty::Ptr(_, Variability::Varying) => Some(LayoutTy::Vector(types::I64, width)),
        Ty::Arr(elem, Some(n)) => Some(LayoutTy::Array(Box::new(layout_of(elem, width)?), *n)),
        Ty::Arr(_, None) => None,
        Ty::Vec(k, n) => Some(LayoutTy::Vector(clif_scalar(*k), *n)),
        Ty::Struct(st) => {
            let mut fields = Vec::with_capacity(st.fields.len());
            let mut size = 0u32;
            let mut align = 1u32;
            for (_, fty) in &st.fields {
                let fl = layout_of(fty, width)?;
                let fa = fl.align();
                if fa > 0 && size % fa != 0 {
                    size = size.div_ceil(fa) * fa;
                }
                if fa > align {
                    align = fa;
                }
                let fs = fl.size();
                fields.push((size, fl));
                size += fs;
            }
            if align > 0 && size % align != 0 {
                size = size.div_ceil(align) * align;
            }
            Some(LayoutTy::Struct { fields, size, align })
        }
    }
}

/// ABI 参数类型。uniform 标量按值，其余（指针/引用/聚合/varying）一律
/// 退化为指针字（聚合与 varying 走内存）。void 返回 None。
pub fn clif_abi_param(ty: &Ty) -> Option<ir::Type> {
    match ty {
        Ty::Void => None,
        Ty::Atomic(k, Variability::Uniform) => Some(clif_scalar(*k)),
        Ty::Enum(_, Variability::Uniform) => Some(types::I32),
        _ => Some(types::I64),
    }
}

/// 语义签名 -> CLIF 签名
pub fn clif_signature(sig: &FnSig, call_conv: cranelift_codegen::isa::CallConv) -> ir::Signature {
    let mut s = ir::Signature::new(call_conv);
    for p in &sig.params {
        if let Some(t) = clif_abi_param(&p.ty) {
            s.params.push(ir::AbiParam::new(t));
        }
    }
    if let Some(t) = clif_abi_param(&sig.ret) {
        s.returns.push(ir::AbiParam::new(t));
    }
    s
}

fn put_scalar(buf: &mut [u8], t: ir::Type, v: &ConstValue) {
    if t == types::F32 {
        let x = v.as_f64().unwrap_or(0.0) as f32;
        buf[..4].copy_from_slice(&x.to_le_bytes());
    } else if t == types::F64 {
        let x = v.as_f64().unwrap_or(0.0);
        buf[..8].copy_from_slice(&x.to_le_bytes());
    } else {
        let bytes = t.bytes() as usize;
        let x = v.as_i64().unwrap_or(0);
        buf[..bytes].copy_from_slice(&x.to_le_bytes()[..bytes]);
    }
}

/// 把（可缺省的）常量按布局编码为小端字节；varying 标量做 lane 展开（splat）。
/// 缺省即零值。
pub fn encode_const(v: Option<&ConstValue>, layout: &LayoutTy, buf: &mut [u8]) {
    debug_assert_eq!(buf.len(), layout.size() as usize);
    let Some(v) = v else {
        buf.fill(0);
        return;
    };
    match layout {
        LayoutTy::Scalar(t) => put_scalar(buf, *t, v),
        LayoutTy::Vector(t, n) => {
            let eb = t.bytes() as usize;
            match v {
                // 列表按 lane 逐个填充，不足补零
                ConstValue::List(items) => {
                    for i in 0..*n as usize {
                        let chunk = &mut buf[i * eb..(i + 1) * eb];
                        match items.get(i) {
                            Some(item) => put_scalar(chunk, *t, item),
                            None => chunk.fill(0),
                        }
                    }
                }
                scalar => {
                    for i in 0..*n as usize {
                        put_scalar(&mut buf[i * eb..(i + 1) * eb], *t, scalar);
                    }
                }
            }
        }
        LayoutTy::Ptr => put_scalar(buf, types::I64, v),
        LayoutTy::Array(elem, n) => {
            let eb = elem.size() as usize;
            let items: &[ConstValue] = match v {
                ConstValue::List(items) => items,
                _ => std::slice::from_ref(v),
            };
            for i in 0..*n as usize {
                let chunk = &mut buf[i * eb..(i + 1) * eb];
                match items.get(i) {
                    Some(item) => encode_const(Some(item), elem, chunk),
                    None => chunk.fill(0),
                }
            }
        }
        LayoutTy::Struct { fields, .. } => {
            buf.fill(0);
            let empty = Vec::new();
            let items = match v {
                ConstValue::List(items) => items,
                _ => &empty,
            };
            for (i, (off, fl)) in fields.iter().enumerate() {
                if let Some(item) = items.get(i) {
                    let fs = fl.size() as usize;
                    let off = *off as usize;
                    encode_const(Some(item), fl, &mut buf[off..off + fs]);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::ast::StructTy;

    #[test]
    fn varying_layout_scales_with_width() {
        let vy = Ty::varying(AtomicKind::Float);
        let l4 = layout_of(&vy, 4).unwrap();
        let l8 = layout_of(&vy, 8).unwrap();
        assert_eq!(l4.size(), 16);
        assert_eq!(l8.size(), 32);
        assert_ne!(l4, l8);
    }

    #[test]
    fn struct_layout_respects_field_alignment() {
        let st = Ty::Struct(StructTy {
            name: "S".into(),
            fields: vec![
                ("a".into(), Ty::uniform(AtomicKind::Int8)),
                ("b".into(), Ty::uniform(AtomicKind::Int32)),
            ],
        });
        let l = layout_of(&st, 4).unwrap();
        match &l {
            LayoutTy::Struct { fields, size, align } => {
                assert_eq!(fields[0].0, 0);
                assert_eq!(fields[1].0, 4);
                assert_eq!(*size, 8);
                assert_eq!(*align, 4);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn splat_encodes_every_lane() {
        let vy = Ty::varying(AtomicKind::Int32);
        let l = layout_of(&vy, 4).unwrap();
        let mut buf = vec![0u8; l.size() as usize];
        encode_const(Some(&ConstValue::Int(7)), &l, &mut buf);
        for lane in buf.chunks(4) {
            assert_eq!(i32::from_le_bytes(lane.try_into().unwrap()), 7);
        }
    }

    #[test]
    fn missing_initializer_is_zero() {
        let l = layout_of(&Ty::uniform(AtomicKind::Double), 4).unwrap();
        let mut buf = vec![0xffu8; 8];
        encode_const(None, &l, &mut buf);
        assert!(buf.iter().all(|&b| b == 0));
    }
}
