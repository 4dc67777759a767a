impl UnitBackend {
    /// 登记或更新一个全局变量定义。
    /// 同名再次登记就是“声明落成定义”：原地替换，`GlobalId` 不变，
    /// 既有引用自动指向最终定义。
    pub fn upsert_global(&mut self, def: GlobalDef) -> GlobalId {
        if let Some(&id) = self.g_index.get(&def.name) {
            self.globals[id as usize] = def;
            id
        } else {
            let id = self.globals.len() as GlobalId;
            self.g_index.insert(def.name.clone(), id);
            self.globals.push(def);
            id
        }
    }

    pub fn global(&self, name: &str) -> Option<&GlobalDef> {
        self.g_index.get(name).map(|&id| &self.globals[id as usize])
    }

    pub fn globals(&self) -> impl Iterator<Item = &GlobalDef> {
        self.globals.iter()
    }

    /// 把定义降级为外部引用（定义已被合并模块接管）
    pub fn demote_global(&mut self, name: &str) {
        if let Some(&id) = self.g_index.get(name) {
            self.globals[id as usize].demoted = true;
        }
    }

    /// 物化全部全局变量。被降级/extern 的只声明 import，不占存储。
    fn materialize_globals(&mut self) -> Result<()> {
        for def in std::mem::take(&mut self.globals) {
            let defines_storage = def.init.is_some()
                && !def.demoted
                && !matches!(def.storage, StorageClass::Extern | StorageClass::ExternC);
            let linkage = if !defines_storage {
                Linkage::Import
            } else if def.storage == StorageClass::Static {
                Linkage::Local
            } else {
                Linkage::Export
            };
            let id: DataId = self
                .module
                .declare_data(&def.name, linkage, def.writable, false)?;
            if defines_storage {
                let bytes = def.init.expect("checked above");
                let mut dc = DataDescription::new();
                dc.define(bytes.into_boxed_slice());
                dc.set_align(def.layout.align().max(1) as u64);
                self.module.define_data(id, &dc)?;
            }
        }
        Ok(())
    }
}
