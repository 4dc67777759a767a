// src/frontend/ast.rs
//! Lane 语言的类型与全局声明模型。
//!
//! 词法/语法不在本仓库内：外部前端产出一条“声明事件流”（`Program`），
//! 这里只定义它的数据形状。`Program` 可由库调用方直接构造，也可以从
//! 前端序列化出的 JSON 反序列化（见 `frontend::load_program_str`）。

use serde::{Deserialize, Serialize};

use crate::frontend::span::Span;

/// uniform / varying：值在隐式并行 lane 维度上是否逐 lane 不同
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Variability {
    Uniform,
    Varying,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AtomicKind {
    Bool,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float,
    Double,
}

impl AtomicKind {
    /// 标量存储宽度（字节）
    pub fn bytes(self) -> u32 {
        match self {
            AtomicKind::Bool | AtomicKind::Int8 | AtomicKind::UInt8 => 1,
            AtomicKind::Int16 | AtomicKind::UInt16 => 2,
            AtomicKind::Int32 | AtomicKind::UInt32 | AtomicKind::Float => 4,
            AtomicKind::Int64 | AtomicKind::UInt64 | AtomicKind::Double => 8,
        }
    }

    /// C 头文件中的拼法
    pub fn c_name(self) -> &'static str {
        match self {
            AtomicKind::Bool => "bool",
            AtomicKind::Int8 => "int8_t",
            AtomicKind::UInt8 => "uint8_t",
            AtomicKind::Int16 => "int16_t",
            AtomicKind::UInt16 => "uint16_t",
            AtomicKind::Int32 => "int32_t",
            AtomicKind::UInt32 => "uint32_t",
            AtomicKind::Int64 => "int64_t",
            AtomicKind::UInt64 => "uint64_t",
            AtomicKind::Float => "float",
            AtomicKind::Double => "double",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StructTy {
    pub name: String,
    pub fields: Vec<(String, Ty)>,
}

/// 闭合的类型全集。相等性为结构相等；重载签名相等只看参数类型（见 `FnSig`）。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Ty {
    Void,
    Atomic(AtomicKind, Variability),
    Enum(String, Variability),
    Ptr(Box<Ty>, Variability),
    /// 引用；bool 为 const 限定（offload 桩只接受 const 引用）
    Ref(Box<Ty>, bool),
    /// 长度为 None 时是待定长数组，由初始化器定尺寸
    Arr(Box<Ty>, Option<u32>),
    /// 定长短向量（元素 uniform 标量）
    Vec(AtomicKind, u32),
    Struct(StructTy),
    Func(Box<FnSig>),
}

impl Ty {
    pub fn uniform(k: AtomicKind) -> Ty { Ty::Atomic(k, Variability::Uniform) }
    pub fn varying(k: AtomicKind) -> Ty { Ty::Atomic(k, Variability::Varying) }
    pub fn uniform_ptr(base: Ty) -> Ty { Ty::Ptr(Box::new(base), Variability::Uniform) }

    pub fn is_void(&self) -> bool { matches!(self, Ty::Void) }

    /// 顶层是否逐 lane 不同
    pub fn is_varying(&self) -> bool {
        matches!(
            self,
            Ty::Atomic(_, Variability::Varying)
                | Ty::Enum(_, Variability::Varying)
                | Ty::Ptr(_, Variability::Varying)
        )
    }

    /// 导出合法性：递归判断类型能否出现在 export 函数的签名里。
    ///
    /// - struct：所有成员都合法才合法
    /// - 裸向量：只有 `vector_ok` 时合法（指向向量的指针合法）
    /// - 数组：递归元素
    /// - 指针：自身必须 uniform；指向对象按 vector-allowed 模式再查
    /// - 其余：varying 且非 vector-allowed 则不合法
    pub fn exportable(&self, vector_ok: bool) -> bool {
        match self {
            Ty::Struct(st) => st.fields.iter().all(|(_, t)| t.exportable(vector_ok)),
            Ty::Vec(..) => vector_ok,
            Ty::Arr(elem, _) => elem.exportable(vector_ok),
            Ty::Ptr(base, vr) => *vr == Variability::Uniform && base.exportable(true),
            Ty::Ref(inner, _) => !inner.is_varying() || vector_ok,
            other => vector_ok || !other.is_varying(),
        }
    }

    /// 面向用户的类型拼法（诊断与 mangle 共用）
    pub fn display(&self) -> String {
        match self {
            Ty::Void => "void".into(),
            Ty::Atomic(k, vr) => match vr {
                Variability::Uniform => format!("uniform {}", k.c_name()),
                Variability::Varying => format!("varying {}", k.c_name()),
            },
            Ty::Enum(n, vr) => match vr {
                Variability::Uniform => format!("uniform enum {}", n),
                Variability::Varying => format!("varying enum {}", n),
            },
            Ty::Ptr(base, vr) => match vr {
                Variability::Uniform => format!("uniform {}*", base.display()),
                Variability::Varying => format!("varying {}*", base.display()),
            },
            Ty::Ref(inner, true) => format!("const {}&", inner.display()),
            Ty::Ref(inner, false) => format!("{}&", inner.display()),
            Ty::Arr(elem, Some(n)) => format!("{}[{}]", elem.display(), n),
            Ty::Arr(elem, None) => format!("{}[]", elem.display()),
            Ty::Vec(k, n) => format!("{}<{}>", k.c_name(), n),
            Ty::Struct(st) => format!("struct {}", st.name),
            Ty::Func(sig) => {
                let ps: Vec<String> = sig.params.iter().map(|p| p.ty.display()).collect();
                format!("{}({})", sig.ret.display(), ps.join(", "))
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: Ty,
    /// 默认值表达式；重载识别时忽略
    #[serde(default)]
    pub default: Option<Expr>,
    pub span: Span,
}

/// 函数签名。重载识别只比较参数类型（`same_params`）；
/// 完整相等（`==`）额外比较返回类型与限定符。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FnSig {
    pub params: Vec<Param>,
    pub ret: Ty,
    #[serde(default)]
    pub exported: bool,
    #[serde(default)]
    pub extern_c: bool,
    #[serde(default)]
    pub is_task: bool,
    #[serde(default)]
    pub inline: bool,
}

impl FnSig {
    /// 重载同一性：参数个数与各位置类型完全一致（忽略名字与默认值）
    pub fn same_params(&self, other: &FnSig) -> bool {
        self.params.len() == other.params.len()
            && self
                .params
                .iter()
                .zip(other.params.iter())
                .all(|(a, b)| a.ty == b.ty)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageClass {
    Default,
    Static,
    Extern,
    /// 外部 C 链接（不 mangle）；对全局变量非法
    ExternC,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnOp {
    Neg,
    Not,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
}

/// 常量表达式子集：全局初始化器能出现的全部形状
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Bool { value: bool, span: Span },
    Int { value: i64, span: Span },
    UInt { value: u64, span: Span },
    Float { value: f32, span: Span },
    Double { value: f64, span: Span },
    /// 引用更早声明的 const 全局
    Ident { name: String, span: Span },
    Unary { op: UnOp, expr: Box<Expr>, span: Span },
    Binary { op: BinOp, lhs: Box<Expr>, rhs: Box<Expr>, span: Span },
    Cast { ty: Ty, expr: Box<Expr>, span: Span },
    /// 花括号列表：数组/struct 初始化器
    List { items: Vec<Expr>, span: Span },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Bool { span, .. }
            | Expr::Int { span, .. }
            | Expr::UInt { span, .. }
            | Expr::Float { span, .. }
            | Expr::Double { span, .. }
            | Expr::Ident { span, .. }
            | Expr::Unary { span, .. }
            | Expr::Binary { span, .. }
            | Expr::Cast { span, .. }
            | Expr::List { span, .. } => *span,
        }
    }
}

/// 函数体语句树。语句级结构由外部 lowering 协作者解释，驱动层只透传。
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Body(pub serde_json::Value);

/// 外部前端产出的声明事件
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Item {
    Global {
        name: String,
        ty: Ty,
        #[serde(default)]
        init: Option<Expr>,
        is_const: bool,
        storage: StorageClass,
        span: Span,
    },
    FnDecl {
        name: String,
        sig: FnSig,
        storage: StorageClass,
        #[serde(default)]
        is_noinline: bool,
        span: Span,
    },
    FnDef {
        name: String,
        sig: FnSig,
        body: Body,
        span: Span,
    },
    ExportType {
        ty: Ty,
        span: Span,
    },
    TypeAlias {
        name: String,
        ty: Ty,
        span: Span,
    },
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub items: Vec<Item>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vf32() -> Ty { Ty::varying(AtomicKind::Float) }
    fn uf32() -> Ty { Ty::uniform(AtomicKind::Float) }

    #[test]
    fn varying_pointer_is_not_exportable() {
        let t = Ty::Ptr(Box::new(uf32()), Variability::Varying);
        assert!(!t.exportable(false));
    }

    #[test]
    fn uniform_pointer_to_varying_is_exportable() {
        let t = Ty::uniform_ptr(vf32());
        assert!(t.exportable(false));
    }

    #[test]
    fn struct_with_varying_member_is_not_exportable() {
        let st = Ty::Struct(StructTy {
            name: "S".into(),
            fields: vec![("a".into(), uf32()), ("b".into(), vf32())],
        });
        assert!(!st.exportable(false));
    }

    #[test]
    fn struct_of_uniform_members_is_exportable() {
        let st = Ty::Struct(StructTy {
            name: "S".into(),
            fields: vec![("a".into(), uf32()), ("b".into(), Ty::uniform(AtomicKind::Int32))],
        });
        assert!(st.exportable(false));
    }

    #[test]
    fn bare_vector_only_in_vector_ok_mode() {
        let v = Ty::Vec(AtomicKind::Float, 3);
        assert!(!v.exportable(false));
        assert!(v.exportable(true));
        // 指向向量的指针合法
        assert!(Ty::uniform_ptr(v).exportable(false));
    }

    #[test]
    fn overload_identity_ignores_names_and_defaults() {
        let a = FnSig {
            params: vec![Param { name: "x".into(), ty: uf32(), default: None, span: Span::DUMMY }],
            ret: Ty::Void,
            exported: false,
            extern_c: false,
            is_task: false,
            inline: false,
        };
        let mut b = a.clone();
        b.params[0].name = "y".into();
        b.params[0].default = Some(Expr::Float { value: 1.0, span: Span::DUMMY });
        assert!(a.same_params(&b));
    }
}
