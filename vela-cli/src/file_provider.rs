//! File-based provider for trying descriptors without an AWS account
//!
//! Resources are kept in a JSON file keyed by identifier. Attributes the
//! real provider would compute (ARNs, IDs, DNS names) are synthesized from
//! the resource type and name so references between resources resolve.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use log::debug;
use vela_core::provider::{BoxFuture, Provider, ProviderError, ProviderResult, ResourceType};
use vela_core::resource::{Resource, ResourceId, State, Value};
use vela_core::schema::ResourceSchema;

type Store = HashMap<String, HashMap<String, serde_json::Value>>;

pub struct FileProvider {
    path: PathBuf,
    schemas: HashMap<String, ResourceSchema>,
}

impl FileProvider {
    pub const DEFAULT_PATH: &'static str = ".vela/resources.json";

    pub fn new(schemas: HashMap<String, ResourceSchema>) -> Self {
        Self::with_path(PathBuf::from(Self::DEFAULT_PATH), schemas)
    }

    pub fn with_path(path: PathBuf, schemas: HashMap<String, ResourceSchema>) -> Self {
        Self { path, schemas }
    }

    fn load(&self) -> ProviderResult<Store> {
        match fs::read_to_string(&self.path) {
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                ProviderError::new(format!("Corrupt store {}", self.path.display())).with_cause(e)
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Store::new()),
            Err(e) => Err(ProviderError::new("Failed to read resource store").with_cause(e)),
        }
    }

    fn save(&self, store: &Store) -> ProviderResult<()> {
        let write = || -> std::io::Result<()> {
            if let Some(parent) = self.path.parent() {
                fs::create_dir_all(parent)?;
            }
            let content = serde_json::to_string_pretty(store)?;
            fs::write(&self.path, content)
        };
        write().map_err(|e| ProviderError::new("Failed to save resource store").with_cause(e))
    }

    fn identifier(id: &ResourceId) -> String {
        format!("file:{}/{}", id.resource_type, id.name)
    }

    /// Values for the attributes the schema marks as computed
    fn computed_attributes(&self, id: &ResourceId) -> HashMap<String, Value> {
        let Some(schema) = self.schemas.get(&id.resource_type) else {
            return HashMap::new();
        };
        schema
            .read_only_attributes()
            .map(|attr| (attr.to_string(), Value::String(synthesize(id, attr))))
            .collect()
    }

    fn store(&self, id: &ResourceId, attributes: &HashMap<String, Value>) -> ProviderResult<State> {
        let identifier = Self::identifier(id);
        let mut store = self.load()?;
        store.insert(
            identifier.clone(),
            attributes
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        );
        self.save(&store)?;
        debug!("Stored {} as {}", id, identifier);
        Ok(State::existing(id.clone(), attributes.clone()).with_identifier(identifier))
    }
}

/// Fake value for a computed attribute
fn synthesize(id: &ResourceId, attribute: &str) -> String {
    if attribute.ends_with("arn") {
        format!("arn:aws:file:local:000000000000:{}/{}", id.resource_type, id.name)
    } else if attribute == "dns_name" {
        format!("{}.local.elb.amazonaws.com", id.name)
    } else {
        format!("{}-{}", id.name, attribute.replace('_', "-"))
    }
}

impl Provider for FileProvider {
    fn name(&self) -> &'static str {
        "file"
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        vec![]
    }

    fn read(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.map(str::to_string);
        Box::pin(async move {
            let Some(identifier) = identifier else {
                return Ok(State::not_found(id));
            };
            let store = self.load()?;
            match store.get(&identifier) {
                Some(stored) => {
                    let attributes = stored
                        .iter()
                        .filter_map(|(k, v)| Value::from_json(v).map(|v| (k.clone(), v)))
                        .collect();
                    Ok(State::existing(id, attributes).with_identifier(identifier))
                }
                None => Ok(State::not_found(id)),
            }
        })
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move {
            let mut attributes: HashMap<String, Value> = resource
                .user_attributes()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            attributes.extend(self.computed_attributes(&resource.id));
            self.store(&resource.id, &attributes)
        })
    }

    fn update(
        &self,
        id: &ResourceId,
        _identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let mut attributes = from.attributes.clone();
        for (k, v) in to.user_attributes() {
            attributes.insert(k.clone(), v.clone());
        }
        Box::pin(async move { self.store(&id, &attributes) })
    }

    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move {
            let mut store = self.load()?;
            if store.remove(&identifier).is_none() {
                return Err(ProviderError::new("Resource not found").for_resource(id));
            }
            self.save(&store)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::schema_map;
    use tempfile::TempDir;

    fn provider(dir: &TempDir) -> FileProvider {
        FileProvider::with_path(dir.path().join("resources.json"), schema_map())
    }

    fn load_balancer() -> Resource {
        Resource::new("elbv2_load_balancer", "my-load-balancer")
            .with_attribute("_binding", Value::String("alb".to_string()))
            .with_attribute("name", Value::String("my-load-balancer".to_string()))
            .with_attribute("scheme", Value::String("internet-facing".to_string()))
    }

    #[tokio::test]
    async fn create_synthesizes_computed_attributes() {
        let dir = TempDir::new().unwrap();
        let provider = provider(&dir);

        let state = provider.create(&load_balancer()).await.unwrap();

        assert_eq!(
            state.identifier.as_deref(),
            Some("file:elbv2_load_balancer/my-load-balancer")
        );
        assert_eq!(
            state.attributes["dns_name"],
            Value::String("my-load-balancer.local.elb.amazonaws.com".to_string())
        );
        assert!(
            state.attributes["load_balancer_arn"]
                .as_str()
                .unwrap()
                .starts_with("arn:aws:file:")
        );
        assert!(!state.attributes.contains_key("_binding"));
    }

    #[tokio::test]
    async fn read_returns_what_was_stored() {
        let dir = TempDir::new().unwrap();
        let provider = provider(&dir);
        let resource = load_balancer();

        let created = provider.create(&resource).await.unwrap();
        let read = provider
            .read(&resource.id, created.identifier.as_deref())
            .await
            .unwrap();
        assert_eq!(read, created);

        let missing = provider.read(&resource.id, None).await.unwrap();
        assert!(!missing.exists);
    }

    #[tokio::test]
    async fn update_keeps_computed_attributes() {
        let dir = TempDir::new().unwrap();
        let provider = provider(&dir);
        let created = provider.create(&load_balancer()).await.unwrap();
        let identifier = created.identifier.clone().unwrap();

        let to = load_balancer().with_attribute("scheme", Value::String("internal".to_string()));
        let updated = provider
            .update(&to.id, &identifier, &created, &to)
            .await
            .unwrap();

        assert_eq!(updated.attributes["scheme"], Value::String("internal".to_string()));
        assert_eq!(updated.attributes["dns_name"], created.attributes["dns_name"]);
    }

    #[tokio::test]
    async fn delete_removes_the_resource() {
        let dir = TempDir::new().unwrap();
        let provider = provider(&dir);
        let resource = load_balancer();
        let created = provider.create(&resource).await.unwrap();
        let identifier = created.identifier.unwrap();

        provider.delete(&resource.id, &identifier).await.unwrap();

        assert!(!provider.read(&resource.id, Some(&identifier)).await.unwrap().exists);
        assert!(provider.delete(&resource.id, &identifier).await.is_err());
    }
}
