use std::fmt;

use kube::ResourceExt;

/// Identifies one object of a resource kind as `namespace/name`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    namespace: String,
    name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key for an observed object, falling back to `namespace` when the
    /// payload does not carry one
    pub fn from_object<K: ResourceExt>(obj: &K, namespace: &str) -> Self {
        Self::new(
            obj.namespace().unwrap_or_else(|| namespace.to_string()),
            obj.name_any(),
        )
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[cfg(test)]
mod test {
    use k8s_openapi::api::core::v1::ConfigMap;
    use kube::core::ObjectMeta;

    use super::*;

    #[test]
    fn renders_namespace_and_name() {
        assert_eq!(ObjectKey::new("default", "app-config").to_string(), "default/app-config");
    }

    #[test]
    fn object_without_namespace_takes_the_watched_one() {
        let cm = ConfigMap {
            metadata: ObjectMeta {
                name: Some("app-config".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(ObjectKey::from_object(&cm, "team-a").to_string(), "team-a/app-config");

        let cm = ConfigMap {
            metadata: ObjectMeta {
                name: Some("app-config".into()),
                namespace: Some("team-b".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(ObjectKey::from_object(&cm, "team-a").to_string(), "team-b/app-config");
    }
}
