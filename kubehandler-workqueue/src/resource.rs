//! 资源标识适配（Resource）
//!
//! 工作队列不关心资源的具体形态，只需要两种能力：
//! - 提取稳定标识（`namespace/name` 或仅 `name`）；
//! - 提取可比较的版本号（`resourceVersion`），供 resync 过滤使用。
//!
//! 具体对象类型通过实现 `Resource` 提供这两项元数据。
//!
use crate::error::{WorkQueueError, WorkQueueResult as Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 资源元数据适配器
pub trait Resource: Send + Sync {
    /// 命名空间；集群级对象返回 `None`
    fn namespace(&self) -> Option<&str>;
    /// 对象名称
    fn name(&self) -> Option<&str>;
    /// 对象版本号；无法获取时返回 `None`
    fn resource_version(&self) -> Option<&str>;
}

/// 最小的对象引用，适用于测试或自定义通知源
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
}

impl ObjectRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: name.into(),
            resource_version: None,
        }
    }

    pub fn cluster_scoped(name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            name: name.into(),
            resource_version: None,
        }
    }

    pub fn with_resource_version(mut self, version: impl Into<String>) -> Self {
        self.resource_version = Some(version.into());
        self
    }
}

impl Resource for ObjectRef {
    fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    fn name(&self) -> Option<&str> {
        Some(self.name.as_str())
    }

    fn resource_version(&self) -> Option<&str> {
        self.resource_version.as_deref()
    }
}

/// 以 JSON 形态投递的对象：读取 `metadata.namespace/name/resourceVersion`
impl Resource for serde_json::Value {
    fn namespace(&self) -> Option<&str> {
        self.pointer("/metadata/namespace").and_then(|v| v.as_str())
    }

    fn name(&self) -> Option<&str> {
        self.pointer("/metadata/name").and_then(|v| v.as_str())
    }

    fn resource_version(&self) -> Option<&str> {
        self.pointer("/metadata/resourceVersion")
            .and_then(|v| v.as_str())
    }
}

impl<T: Resource + ?Sized> Resource for Arc<T> {
    fn namespace(&self) -> Option<&str> {
        (**self).namespace()
    }

    fn name(&self) -> Option<&str> {
        (**self).name()
    }

    fn resource_version(&self) -> Option<&str> {
        (**self).resource_version()
    }
}

impl<T: Resource + ?Sized> Resource for Box<T> {
    fn namespace(&self) -> Option<&str> {
        (**self).namespace()
    }

    fn name(&self) -> Option<&str> {
        (**self).name()
    }

    fn resource_version(&self) -> Option<&str> {
        (**self).resource_version()
    }
}

/// 计算对象的稳定标识：`namespace/name`，集群级对象为 `name`
pub fn meta_namespace_key(obj: &dyn Resource) -> Result<String> {
    let name = match obj.name() {
        Some(name) if !name.is_empty() => name,
        _ => return Err(WorkQueueError::identity("object has no metadata.name")),
    };

    match obj.namespace() {
        Some(ns) if !ns.is_empty() => Ok(format!("{ns}/{name}")),
        _ => Ok(name.to_string()),
    }
}

/// 拆分 `namespace/name` 或 `name`，返回 `(namespace, name)`；集群级对象 namespace 为空串
pub fn split_meta_namespace_key(key: &str) -> Result<(String, String)> {
    let parts: Vec<&str> = key.split('/').collect();
    match parts.as_slice() {
        [name] if !name.is_empty() => Ok((String::new(), name.to_string())),
        [ns, name] if !name.is_empty() => Ok((ns.to_string(), name.to_string())),
        _ => Err(WorkQueueError::malformed_key(
            key,
            "unexpected object key format",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn namespaced_and_cluster_scoped_keys() {
        let pod = ObjectRef::new("ns1", "pod-a");
        assert_eq!(meta_namespace_key(&pod).unwrap(), "ns1/pod-a");

        let node = ObjectRef::cluster_scoped("node-1");
        assert_eq!(meta_namespace_key(&node).unwrap(), "node-1");
    }

    #[test]
    fn missing_name_is_an_identity_error() {
        let obj = json!({"metadata": {"namespace": "ns1"}});
        let err = meta_namespace_key(&obj).unwrap_err();
        assert!(matches!(err, WorkQueueError::Identity { .. }));

        let empty = ObjectRef::new("ns1", "");
        assert!(meta_namespace_key(&empty).is_err());
    }

    #[test]
    fn reads_json_metadata() {
        let obj = json!({
            "kind": "Pod",
            "metadata": {"namespace": "ns1", "name": "pod-a", "resourceVersion": "42"}
        });
        assert_eq!(meta_namespace_key(&obj).unwrap(), "ns1/pod-a");
        assert_eq!(obj.resource_version(), Some("42"));
    }

    #[test]
    fn splits_keys() {
        assert_eq!(
            split_meta_namespace_key("ns1/pod-a").unwrap(),
            ("ns1".to_string(), "pod-a".to_string())
        );
        assert_eq!(
            split_meta_namespace_key("node-1").unwrap(),
            (String::new(), "node-1".to_string())
        );
        assert!(split_meta_namespace_key("a/b/c").is_err());
        assert!(split_meta_namespace_key("ns1/").is_err());
        assert!(split_meta_namespace_key("").is_err());
    }
}
