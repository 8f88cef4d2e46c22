//! Resync 过滤
//!
//! 通知源周期性 resync 时会以 update(old, new) 的形式重放未变化的对象，
//! 两侧版本号相同即说明没有真实变更，无需入队。
//! 任一侧版本号缺失时保守放行，保证真实变更不会被吞掉。
//!
use crate::resource::Resource;

/// 是否抑制该次 update；空串视为无法提取
pub fn should_suppress(old_version: Option<&str>, new_version: Option<&str>) -> bool {
    match (old_version, new_version) {
        (Some(old), Some(new)) if !old.is_empty() => old == new,
        _ => false,
    }
}

/// 基于对象元数据判断是否为 resync 重放
pub fn is_resync(old: &dyn Resource, new: &dyn Resource) -> bool {
    should_suppress(old.resource_version(), new.resource_version())
}
