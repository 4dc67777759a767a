// src/middle/fold.rs
//! 初始化器的常量折叠与到声明类型的转换。
//!
//! 折叠是尽力而为：折不出常量就返回 None，是否报错由调用方
//! （声明检查器）按存储类别决定。

use crate::frontend::ast::{AtomicKind, BinOp, Expr, Ty, UnOp};
use crate::middle::symtab::SymbolTable;

/// 折叠结果。标量统一存放在宽域（i64/u64/f64），编码到字节时再按布局截取。
#[derive(Clone, Debug, PartialEq)]
pub enum ConstValue {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    List(Vec<ConstValue>),
}

impl ConstValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ConstValue::Bool(b) => Some(*b as i64),
            ConstValue::Int(v) => Some(*v),
            ConstValue::UInt(v) => Some(*v as i64),
            ConstValue::Float(v) => Some(*v as i64),
            ConstValue::List(_) => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ConstValue::Bool(b) => Some(*b as u8 as f64),
            ConstValue::Int(v) => Some(*v as f64),
            ConstValue::UInt(v) => Some(*v as f64),
            ConstValue::Float(v) => Some(*v),
            ConstValue::List(_) => None,
        }
    }

    fn is_float(&self) -> bool {
        matches!(self, ConstValue::Float(_))
    }
}

/// 常量折叠。`Ident` 解析引用更早声明的 const 全局。
pub fn fold(expr: &Expr, symtab: &SymbolTable) -> Option<ConstValue> {
    match expr {
        Expr::Bool { value, .. } => Some(ConstValue::Bool(*value)),
        Expr::Int { value, .. } => Some(ConstValue::Int(*value)),
        Expr::UInt { value, .. } => Some(ConstValue::UInt(*value)),
        Expr::Float { value, .. } => Some(ConstValue::Float(*value as f64)),
        Expr::Double { value, .. } => Some(ConstValue::Float(*value)),
        Expr::Ident { name, .. } => symtab.lookup_variable(name)?.const_value.clone(),
        Expr::Unary { op, expr, .. } => {
            let v = fold(expr, symtab)?;
            match op {
                UnOp::Neg => match v {
                    ConstValue::Int(x) => Some(ConstValue::Int(x.wrapping_neg())),
                    ConstValue::UInt(x) => Some(ConstValue::Int((x as i64).wrapping_neg())),
                    ConstValue::Float(x) => Some(ConstValue::Float(-x)),
                    _ => None,
                },
                UnOp::Not => match v {
                    ConstValue::Bool(b) => Some(ConstValue::Bool(!b)),
                    ConstValue::Int(x) => Some(ConstValue::Int(!x)),
                    ConstValue::UInt(x) => Some(ConstValue::UInt(!x)),
                    _ => None,
                },
            }
        }
        Expr::Binary { op, lhs, rhs, .. } => {
            let a = fold(lhs, symtab)?;
            let b = fold(rhs, symtab)?;
            if a.is_float() || b.is_float() {
                let (x, y) = (a.as_f64()?, b.as_f64()?);
                let r = match op {
                    BinOp::Add => x + y,
                    BinOp::Sub => x - y,
                    BinOp::Mul => x * y,
                    BinOp::Div => x / y,
                    BinOp::Rem => x % y,
                    // 位运算对浮点无意义
                    _ => return None,
                };
                Some(ConstValue::Float(r))
            } else {
                let (x, y) = (a.as_i64()?, b.as_i64()?);
                let r = match op {
                    BinOp::Add => x.wrapping_add(y),
                    BinOp::Sub => x.wrapping_sub(y),
                    BinOp::Mul => x.wrapping_mul(y),
                    BinOp::Div => {
                        if y == 0 {
                            return None;
                        }
                        x.wrapping_div(y)
                    }
                    BinOp::Rem => {
                        if y == 0 {
                            return None;
                        }
                        x.wrapping_rem(y)
                    }
                    BinOp::Shl => x.wrapping_shl(y as u32),
                    BinOp::Shr => x.wrapping_shr(y as u32),
                    BinOp::BitAnd => x & y,
                    BinOp::BitOr => x | y,
                    BinOp::BitXor => x ^ y,
                };
                Some(ConstValue::Int(r))
            }
        }
        Expr::Cast { ty, expr, .. } => {
            let v = fold(expr, symtab)?;
            convert(&v, ty)
        }
        Expr::List { items, .. } => {
            let mut out = Vec::with_capacity(items.len());
            for it in items {
                out.push(fold(it, symtab)?);
            }
            Some(ConstValue::List(out))
        }
    }
}

fn convert_scalar(v: &ConstValue, k: AtomicKind) -> Option<ConstValue> {
    match k {
        AtomicKind::Bool => Some(ConstValue::Bool(v.as_i64()? != 0)),
        AtomicKind::Float | AtomicKind::Double => Some(ConstValue::Float(v.as_f64()?)),
        AtomicKind::UInt8 | AtomicKind::UInt16 | AtomicKind::UInt32 | AtomicKind::UInt64 => {
            Some(ConstValue::UInt(v.as_i64()? as u64))
        }
        _ => Some(ConstValue::Int(v.as_i64()?)),
    }
}

/// 把折叠结果转换到声明类型。形状对不上（如标量初始化 struct）返回 None。
pub fn convert(v: &ConstValue, ty: &Ty) -> Option<ConstValue> {
    match ty {
        Ty::Atomic(k, _) => convert_scalar(v, *k),
        Ty::Enum(..) => Some(ConstValue::Int(v.as_i64()?)),
        // 只接受空指针常量
        Ty::Ptr(..) | Ty::Ref(..) => Some(ConstValue::UInt(v.as_i64()? as u64)),
        Ty::Arr(..) | Ty::Vec(..) => {
            let elem_ty = match ty {
                Ty::Arr(e, _) => (**e).clone(),
                Ty::Vec(k, _) => Ty::uniform(*k),
                _ => unreachable!(),
            };
            match v {
                ConstValue::List(items) => {
                    let mut out = Vec::with_capacity(items.len());
                    for it in items {
                        out.push(convert(it, &elem_ty)?);
                    }
                    Some(ConstValue::List(out))
                }
                _ => None,
            }
        }
        Ty::Struct(st) => match v {
            ConstValue::List(items) if items.len() <= st.fields.len() => {
                let mut out = Vec::with_capacity(items.len());
                for (it, (_, fty)) in items.iter().zip(st.fields.iter()) {
                    out.push(convert(it, fty)?);
                }
                Some(ConstValue::List(out))
            }
            _ => None,
        },
        Ty::Void | Ty::Func(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::span::Span;

    fn sym() -> SymbolTable {
        SymbolTable::new()
    }

    fn int(v: i64) -> Expr {
        Expr::Int { value: v, span: Span::DUMMY }
    }

    #[test]
    fn folds_arithmetic() {
        let e = Expr::Binary {
            op: BinOp::Mul,
            lhs: Box::new(int(6)),
            rhs: Box::new(Expr::Binary {
                op: BinOp::Add,
                lhs: Box::new(int(3)),
                rhs: Box::new(int(4)),
                span: Span::DUMMY,
            }),
            span: Span::DUMMY,
        };
        assert_eq!(fold(&e, &sym()), Some(ConstValue::Int(42)));
    }

    #[test]
    fn mixed_arithmetic_promotes_to_float() {
        let e = Expr::Binary {
            op: BinOp::Add,
            lhs: Box::new(int(1)),
            rhs: Box::new(Expr::Double { value: 0.5, span: Span::DUMMY }),
            span: Span::DUMMY,
        };
        assert_eq!(fold(&e, &sym()), Some(ConstValue::Float(1.5)));
    }

    #[test]
    fn division_by_zero_is_not_a_constant() {
        let e = Expr::Binary {
            op: BinOp::Div,
            lhs: Box::new(int(1)),
            rhs: Box::new(int(0)),
            span: Span::DUMMY,
        };
        assert_eq!(fold(&e, &sym()), None);
    }

    #[test]
    fn scalar_does_not_convert_to_struct() {
        use crate::frontend::ast::StructTy;
        let st = Ty::Struct(StructTy {
            name: "S".into(),
            fields: vec![("a".into(), Ty::uniform(AtomicKind::Int32))],
        });
        assert_eq!(convert(&ConstValue::Int(1), &st), None);
        assert!(convert(&ConstValue::List(vec![ConstValue::Int(1)]), &st).is_some());
    }

    #[test]
    fn int_converts_to_float_type() {
        let v = convert(&ConstValue::Int(2), &Ty::uniform(AtomicKind::Float)).unwrap();
        assert_eq!(v, ConstValue::Float(2.0));
    }
}
