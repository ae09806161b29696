//! 解封装器注册表.
//!
//! 按容器族管理解封装器工厂, 每次解析创建一个新实例.

use std::collections::HashMap;

use vidmap_core::{VidError, VidResult};

use crate::container::Container;
use crate::demuxer::Demuxer;

/// 解封装器工厂函数类型
pub type DemuxerFactory = fn() -> VidResult<Box<dyn Demuxer>>;

/// 解封装器注册条目
struct DemuxerEntry {
    /// 名称
    name: String,
    /// 工厂函数
    factory: DemuxerFactory,
}

/// 解封装器注册表
pub struct DemuxerRegistry {
    demuxers: HashMap<Container, DemuxerEntry>,
}

impl DemuxerRegistry {
    /// 创建空的注册表
    pub fn new() -> Self {
        Self {
            demuxers: HashMap::new(),
        }
    }

    /// 创建已注册全部内置解封装器的注册表
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        crate::demuxers::register_all_demuxers(&mut registry);
        registry
    }

    /// 注册一个解封装器, 同一容器后注册者覆盖先注册者
    pub fn register_demuxer(
        &mut self,
        container: Container,
        name: impl Into<String>,
        factory: DemuxerFactory,
    ) {
        self.demuxers.insert(
            container,
            DemuxerEntry {
                name: name.into(),
                factory,
            },
        );
    }

    /// 创建指定容器的解封装器实例
    pub fn create_demuxer(&self, container: Container) -> VidResult<Box<dyn Demuxer>> {
        let entry = self.demuxers.get(&container).ok_or_else(|| {
            VidError::FormatNotFound(format!("未找到 {container} 的解封装器"))
        })?;
        (entry.factory)()
    }

    /// 是否已注册
    pub fn has_demuxer(&self, container: Container) -> bool {
        self.demuxers.contains_key(&container)
    }

    /// 获取所有已注册的解封装器 (按名称排序)
    pub fn list_demuxers(&self) -> Vec<(Container, &str)> {
        let mut list: Vec<(Container, &str)> = self
            .demuxers
            .iter()
            .map(|(c, entry)| (*c, entry.name.as_str()))
            .collect();
        list.sort_by(|a, b| a.1.cmp(b.1));
        list
    }
}

impl Default for DemuxerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
