use kube::api::{Api, DynamicObject, Patch, PatchParams};
use kube::core::GroupVersionKind;
use kube::discovery::{ApiCapabilities, ApiResource, Discovery, Scope};
use kube::Client;
use serde::Deserialize;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::{debug, info};
use walkdir::WalkDir;

use super::error::ApplyError;

/// Field manager under which all server-side applies are recorded, so that
/// re-applies by this agent merge instead of conflicting.
const FIELD_MANAGER: &str = "kube-apply";

const DEFAULT_NAMESPACE: &str = "default";

/// Projects declarative YAML documents into the cluster with server-side
/// apply, resolving each document's kind through cached API discovery.
pub struct ManifestApplier {
    client: Client,
    discovery: RwLock<Discovery>,
}

impl ManifestApplier {
    /// Run an initial discovery pass so the first apply does not pay for it.
    pub async fn new(client: Client) -> Result<Self, ApplyError> {
        let discovery = Discovery::new(client.clone()).run().await?;
        Ok(Self {
            client,
            discovery: RwLock::new(discovery),
        })
    }

    /// Apply every document found under `dir`, walking files in sorted
    /// order and documents within a file in file order. Not transactional:
    /// a failure leaves previously applied documents in place.
    pub async fn apply_tree(&self, dir: &Path) -> Result<(), ApplyError> {
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            self.apply_file(entry.path()).await?;
        }
        Ok(())
    }

    async fn apply_file(&self, path: &Path) -> Result<(), ApplyError> {
        debug!("Applying manifest file {}", path.display());
        let content = std::fs::read_to_string(path).map_err(|source| ApplyError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        for object in parse_documents(&content)? {
            self.apply_object(object).await?;
        }
        Ok(())
    }

    /// Server-side apply of one object under the agent's field manager.
    async fn apply_object(&self, object: DynamicObject) -> Result<(), ApplyError> {
        let types = object.types.clone().ok_or(ApplyError::MissingTypes)?;
        let gvk = GroupVersionKind::try_from(&types)
            .map_err(|e| ApplyError::InvalidGroupVersion(e.to_string()))?;
        let name = object.metadata.name.clone().ok_or(ApplyError::MissingName)?;
        let namespace = target_namespace(&object);

        let (resource, capabilities) = self.resolve(&gvk).await?;
        let api: Api<DynamicObject> = if capabilities.scope == Scope::Namespaced {
            Api::namespaced_with(self.client.clone(), &namespace, &resource)
        } else {
            Api::all_with(self.client.clone(), &resource)
        };

        info!(
            "⌛ Applying {} resource named '{}' in namespace '{}'",
            gvk.kind, name, namespace
        );
        let params = PatchParams::apply(FIELD_MANAGER).force();
        api.patch(&name, &params, &Patch::Apply(&object)).await?;
        info!("⚓ Applied YAML for {} {:?}", gvk.kind, name);

        Ok(())
    }

    /// Resolve a kind through the cached discovery, refreshing the cache
    /// once on a miss in case the kind was registered after startup.
    async fn resolve(
        &self,
        gvk: &GroupVersionKind,
    ) -> Result<(ApiResource, ApiCapabilities), ApplyError> {
        if let Some((resource, capabilities)) = self.discovery.read().await.resolve_gvk(gvk) {
            return Ok((resource, capabilities));
        }

        debug!(
            "Kind {}/{} {} not in cached discovery, refreshing",
            gvk.group, gvk.version, gvk.kind
        );
        let refreshed = Discovery::new(self.client.clone()).run().await?;
        let mut cached = self.discovery.write().await;
        *cached = refreshed;
        cached.resolve_gvk(gvk).ok_or_else(|| {
            ApplyError::UnknownKind(format!("{}/{} {}", gvk.group, gvk.version, gvk.kind))
        })
    }
}

/// Parse a multi-document YAML stream into dynamic objects, skipping empty
/// documents.
pub(crate) fn parse_documents(content: &str) -> Result<Vec<DynamicObject>, ApplyError> {
    let mut objects = Vec::new();
    for document in serde_yaml::Deserializer::from_str(content) {
        let value = serde_yaml::Value::deserialize(document)?;
        if value.is_null() {
            debug!("skipping empty document");
            continue;
        }
        objects.push(serde_yaml::from_value(value)?);
    }
    Ok(objects)
}

/// The object's own namespace when present, `default` otherwise.
fn target_namespace(object: &DynamicObject) -> String {
    object
        .metadata
        .namespace
        .clone()
        .filter(|namespace| !namespace.is_empty())
        .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::mock_apiserver;
    use tempfile::TempDir;

    const MULTI_DOC: &str = r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: api
  namespace: demo
spec:
  replicas: 1
---
---
apiVersion: v1
kind: Service
metadata:
  name: api-svc
"#;

    #[test]
    fn test_parse_documents_skips_empty() {
        let objects = parse_documents(MULTI_DOC).unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].types.as_ref().unwrap().kind, "Deployment");
        assert_eq!(objects[1].types.as_ref().unwrap().kind, "Service");
        assert_eq!(objects[0].metadata.name.as_deref(), Some("api"));
    }

    #[test]
    fn test_parse_documents_preserves_file_order() {
        let objects = parse_documents(MULTI_DOC).unwrap();
        let kinds: Vec<_> = objects
            .iter()
            .map(|o| o.types.as_ref().unwrap().kind.clone())
            .collect();
        assert_eq!(kinds, vec!["Deployment", "Service"]);
    }

    #[test]
    fn test_parse_documents_rejects_malformed_yaml() {
        assert!(parse_documents("kind: [unterminated").is_err());
    }

    #[test]
    fn test_parse_documents_empty_stream() {
        assert!(parse_documents("").unwrap().is_empty());
        assert!(parse_documents("---\n---\n").unwrap().is_empty());
    }

    #[test]
    fn test_target_namespace_defaults() {
        let objects = parse_documents(MULTI_DOC).unwrap();
        assert_eq!(target_namespace(&objects[0]), "demo");
        assert_eq!(target_namespace(&objects[1]), "default");
    }

    #[test]
    fn test_gvk_extraction() {
        let objects = parse_documents(MULTI_DOC).unwrap();
        let types = objects[0].types.clone().unwrap();
        let gvk = GroupVersionKind::try_from(&types).unwrap();
        assert_eq!(gvk.group, "apps");
        assert_eq!(gvk.version, "v1");
        assert_eq!(gvk.kind, "Deployment");

        let types = objects[1].types.clone().unwrap();
        let gvk = GroupVersionKind::try_from(&types).unwrap();
        assert_eq!(gvk.group, "");
        assert_eq!(gvk.version, "v1");
    }

    #[tokio::test]
    async fn test_apply_tree_routes_by_scope() {
        let (client, patches) = mock_apiserver(false);
        let applier = ManifestApplier::new(client).await.unwrap();

        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("00-objects.yaml"),
            r#"apiVersion: v1
kind: ConfigMap
metadata:
  name: app-config
  namespace: demo
data:
  greeting: hello
---
apiVersion: v1
kind: Namespace
metadata:
  name: staging
---
apiVersion: v1
kind: Service
metadata:
  name: api-svc
"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("10-extra.yaml"),
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: extra-config\n  namespace: demo\n",
        )
        .unwrap();

        applier.apply_tree(dir.path()).await.unwrap();

        // Files in sorted order, documents in file order; the cluster-scoped
        // Namespace takes the unscoped URL, the namespaceless Service lands
        // in default.
        let recorded = patches.lock().unwrap().clone();
        let paths: Vec<_> = recorded
            .iter()
            .map(|r| r.split('?').next().unwrap().to_string())
            .collect();
        assert_eq!(
            paths,
            vec![
                "/api/v1/namespaces/demo/configmaps/app-config",
                "/api/v1/namespaces/staging",
                "/api/v1/namespaces/default/services/api-svc",
                "/api/v1/namespaces/demo/configmaps/extra-config",
            ]
        );
        assert!(recorded.iter().all(|r| r.contains("fieldManager=kube-apply")));
        assert!(recorded.iter().all(|r| r.contains("force=true")));
    }

    #[tokio::test]
    async fn test_resolve_refreshes_discovery_on_miss() {
        // The first discovery pass cannot see the apps group; applying a
        // Deployment must refresh the cache and then succeed.
        let (client, patches) = mock_apiserver(true);
        let applier = ManifestApplier::new(client).await.unwrap();

        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("deploy.yaml"),
            "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: api\n  namespace: demo\n",
        )
        .unwrap();

        applier.apply_tree(dir.path()).await.unwrap();

        let recorded = patches.lock().unwrap().clone();
        assert_eq!(recorded.len(), 1);
        assert!(recorded[0].starts_with("/apis/apps/v1/namespaces/demo/deployments/api?"));
    }

    #[tokio::test]
    async fn test_apply_tree_unknown_kind_fails_after_refresh() {
        let (client, patches) = mock_apiserver(false);
        let applier = ManifestApplier::new(client).await.unwrap();

        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("widget.yaml"),
            "apiVersion: example.com/v1\nkind: Widget\nmetadata:\n  name: gizmo\n",
        )
        .unwrap();

        let err = applier.apply_tree(dir.path()).await.unwrap_err();
        assert!(matches!(err, ApplyError::UnknownKind(_)));
        assert!(patches.lock().unwrap().is_empty());
    }
}
