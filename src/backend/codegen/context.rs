/// 一个全局变量在本单元里的待产出定义。
/// `init = None` 表示纯声明（extern），不占存储。
#[derive(Clone, Debug)]
pub struct GlobalDef {
    pub name: String,
    pub ty: Ty,
    pub layout: LayoutTy,
    pub init: Option<Vec<u8>>,
    pub writable: bool,
    pub storage: StorageClass,
    pub span: Span,
    /// 多目标构建下定义被合并模块接管，本单元只保留外部引用
    pub demoted: bool,
}

impl GlobalDef {
    /// 是否是“外部链接的全局定义”（合并模块要提取的那类）
    pub fn is_extractable(&self) -> bool {
        self.init.is_some()
            && matches!(self.storage, StorageClass::Default)
            && !self.demoted
    }
}

/// 记录给调试信息消费方的全局变量条目
#[derive(Clone, Debug)]
pub struct DebugGlobal {
    pub name: String,
    pub line: usize,
    pub ty: String,
}

/// 等待外部 lowering 协作者处理的函数体
pub struct PendingBody {
    pub fid: FuncId,
    pub name: String,
    pub sig: FnSig,
    pub body: Body,
}

/// 单目标编译单元的 IR 模块封装。
/// 全局变量先记在表里，`finish` 时才物化成数据对象——多目标构建要在
/// 物化前把定义让渡给合并模块。
pub struct UnitBackend {
    pub module: ObjectModule,
    ctx: BuildContext,

    globals: Vec<GlobalDef>,
    g_index: FastMap<String, GlobalId>,

    // 符号名(已mangle) -> FuncId
    fn_ids: FastMap<String, FuncId>,

    pending_bodies: Vec<PendingBody>,
    debug_globals: Vec<DebugGlobal>,

    // 产物文本捕获（--emit asm/clif）
    want_asm: bool,
    want_clif: bool,
    asm_text: String,
    clif_text: String,
}

impl UnitBackend {
    pub fn new(ctx: &BuildContext) -> Result<Self> {
        let isa = build_isa(&ctx.target, ctx.opt, ctx.pic, ctx.cpu.as_deref())?;
        let obj = ObjectBuilder::new(isa, format!("lane_{}", ctx.target.name), default_libcall_names())?;
        Ok(Self {
            module: ObjectModule::new(obj),
            ctx: ctx.clone(),
            globals: Vec::new(),
            g_index: fast_map(),
            fn_ids: fast_map(),
            pending_bodies: Vec::new(),
            debug_globals: Vec::new(),
            want_asm: false,
            want_clif: false,
            asm_text: String::new(),
            clif_text: String::new(),
        })
    }

    pub fn ctx(&self) -> &BuildContext {
        &self.ctx
    }

    /// lane 宽度（布局计算都从这里取）
    pub fn width(&self) -> u32 {
        self.ctx.target.width
    }

    pub fn set_capture(&mut self, asm: bool, clif: bool) {
        self.want_asm = asm;
        self.want_clif = clif;
    }

    pub fn func_id(&self, mangled: &str) -> Option<FuncId> {
        self.fn_ids.get(mangled).copied()
    }

    pub fn push_body(&mut self, body: PendingBody) {
        self.pending_bodies.push(body);
    }

    pub fn take_bodies(&mut self) -> Vec<PendingBody> {
        std::mem::take(&mut self.pending_bodies)
    }

    pub fn record_debug_global(&mut self, dg: DebugGlobal) {
        self.debug_globals.push(dg);
    }

    pub fn debug_globals(&self) -> &[DebugGlobal] {
        &self.debug_globals
    }
}
