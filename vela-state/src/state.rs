//! State file structures for persisting infrastructure state

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use vela_core::resource::{ResourceId, State, Value};

/// The main state file structure that persists to the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateFile {
    /// State file format version
    pub version: u32,
    /// Monotonically increasing number for each state modification
    pub serial: u64,
    /// Unique identifier for this state lineage (prevents accidental overwrites)
    pub lineage: String,
    /// Version of Vela that last modified this state
    pub vela_version: String,
    /// Managed resources, in the order they were created
    pub resources: Vec<ResourceState>,
    /// Outputs resolved by the last apply
    #[serde(default)]
    pub outputs: BTreeMap<String, serde_json::Value>,
}

impl StateFile {
    /// Current state file format version
    pub const CURRENT_VERSION: u32 = 1;

    /// Create a new empty state file
    pub fn new() -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            serial: 0,
            lineage: uuid::Uuid::new_v4().to_string(),
            vela_version: env!("CARGO_PKG_VERSION").to_string(),
            resources: Vec::new(),
            outputs: BTreeMap::new(),
        }
    }

    /// Increment serial and update vela version for a new state write
    pub fn increment_serial(&mut self) {
        self.serial += 1;
        self.vela_version = env!("CARGO_PKG_VERSION").to_string();
    }

    pub fn find_resource(&self, id: &ResourceId) -> Option<&ResourceState> {
        self.resources.iter().find(|r| r.matches(id))
    }

    /// Provider-side identifier recorded for a resource
    pub fn identifier(&self, id: &ResourceId) -> Option<&str> {
        self.find_resource(id).and_then(|r| r.identifier.as_deref())
    }

    /// Ids of every recorded resource, in creation order
    pub fn resource_ids(&self) -> Vec<ResourceId> {
        self.resources.iter().map(ResourceState::resource_id).collect()
    }

    /// Add or update a resource in the state
    pub fn upsert_resource(&mut self, resource: ResourceState) {
        let id = resource.resource_id();
        if let Some(existing) = self.resources.iter_mut().find(|r| r.matches(&id)) {
            *existing = resource;
        } else {
            self.resources.push(resource);
        }
    }

    pub fn remove_resource(&mut self, id: &ResourceId) -> Option<ResourceState> {
        let pos = self.resources.iter().position(|r| r.matches(id))?;
        Some(self.resources.remove(pos))
    }

    /// Replace the recorded outputs
    pub fn set_outputs(&mut self, outputs: &BTreeMap<String, Value>) {
        self.outputs = outputs
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect();
    }

    pub fn output_values(&self) -> BTreeMap<String, Value> {
        self.outputs
            .iter()
            .filter_map(|(name, json)| Value::from_json(json).map(|v| (name.clone(), v)))
            .collect()
    }
}

impl Default for StateFile {
    fn default() -> Self {
        Self::new()
    }
}

/// State of a single managed resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    /// Resource type (e.g., "elbv2_listener")
    pub resource_type: String,
    /// Resource name (from the `name` attribute in DSL)
    pub name: String,
    /// Provider name (e.g., "awscc")
    pub provider: String,
    /// Provider-side identifier (e.g., the listener ARN)
    #[serde(default)]
    pub identifier: Option<String>,
    /// All attributes of the resource as JSON values
    pub attributes: HashMap<String, serde_json::Value>,
}

impl ResourceState {
    pub fn new(
        resource_type: impl Into<String>,
        name: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
            provider: provider.into(),
            identifier: None,
            attributes: HashMap::new(),
        }
    }

    /// Record the state the provider returned
    pub fn from_state(state: &State, provider: impl Into<String>) -> Self {
        Self {
            resource_type: state.id.resource_type.clone(),
            name: state.id.name.clone(),
            provider: provider.into(),
            identifier: state.identifier.clone(),
            attributes: state
                .attributes
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        }
    }

    pub fn resource_id(&self) -> ResourceId {
        ResourceId::new(&self.resource_type, &self.name)
    }

    fn matches(&self, id: &ResourceId) -> bool {
        self.resource_type == id.resource_type && self.name == id.name
    }

    /// Recorded state as last seen, for when the provider cannot be asked
    pub fn to_state(&self) -> State {
        let attributes = self
            .attributes
            .iter()
            .filter_map(|(k, v)| Value::from_json(v).map(|v| (k.clone(), v)))
            .collect();
        let state = State::existing(self.resource_id(), attributes);
        match &self.identifier {
            Some(identifier) => state.with_identifier(identifier),
            None => state,
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    /// Set an attribute value
    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn listener() -> ResourceState {
        ResourceState::new("elbv2_listener", "prod", "awscc")
            .with_identifier("arn:aws:elasticloadbalancing:listener/prod")
            .with_attribute("port", json!(80))
    }

    #[test]
    fn test_state_file_new() {
        let state = StateFile::new();
        assert_eq!(state.version, StateFile::CURRENT_VERSION);
        assert_eq!(state.serial, 0);
        assert!(!state.lineage.is_empty());
        assert!(state.resources.is_empty());
        assert!(state.outputs.is_empty());
    }

    #[test]
    fn test_state_file_increment_serial() {
        let mut state = StateFile::new();
        state.increment_serial();
        state.increment_serial();
        assert_eq!(state.serial, 2);
    }

    #[test]
    fn test_upsert_keeps_creation_order() {
        let mut state = StateFile::new();
        state.upsert_resource(ResourceState::new("elbv2_target_group", "blue-tg", "awscc"));
        state.upsert_resource(listener());
        state.upsert_resource(
            ResourceState::new("elbv2_target_group", "blue-tg", "awscc").with_identifier("arn:tg"),
        );

        assert_eq!(
            state.resource_ids(),
            vec![
                ResourceId::new("elbv2_target_group", "blue-tg"),
                ResourceId::new("elbv2_listener", "prod"),
            ]
        );
        assert_eq!(
            state.identifier(&ResourceId::new("elbv2_target_group", "blue-tg")),
            Some("arn:tg")
        );
    }

    #[test]
    fn test_remove_resource() {
        let mut state = StateFile::new();
        state.upsert_resource(listener());
        let id = ResourceId::new("elbv2_listener", "prod");

        assert!(state.remove_resource(&id).is_some());
        assert!(state.resources.is_empty());
        assert!(state.remove_resource(&id).is_none());
    }

    #[test]
    fn test_resource_state_round_trips_core_state() {
        let mut attributes = HashMap::new();
        attributes.insert("port".to_string(), Value::Int(80));
        attributes.insert("protocol".to_string(), Value::String("HTTP".to_string()));
        let state = State::existing(ResourceId::new("elbv2_listener", "prod"), attributes)
            .with_identifier("arn:listener");

        let recorded = ResourceState::from_state(&state, "awscc");
        assert_eq!(recorded.identifier.as_deref(), Some("arn:listener"));
        assert_eq!(recorded.to_state(), state);
    }

    #[test]
    fn test_outputs_are_persisted() {
        let mut outputs = BTreeMap::new();
        outputs.insert(
            "load_balancer_dns".to_string(),
            Value::String("my-load-balancer-1.us-east-1.elb.amazonaws.com".to_string()),
        );
        let mut state = StateFile::new();
        state.set_outputs(&outputs);

        let json = serde_json::to_string_pretty(&state).unwrap();
        let deserialized: StateFile = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.output_values(), outputs);
    }

    #[test]
    fn test_state_without_outputs_still_parses() {
        let json = json!({
            "version": 1,
            "serial": 3,
            "lineage": "abc",
            "vela_version": "0.1.0",
            "resources": [{
                "resource_type": "ecs_cluster",
                "name": "my-cluster",
                "provider": "awscc",
                "attributes": {}
            }]
        });
        let state: StateFile = serde_json::from_value(json).unwrap();
        assert!(state.outputs.is_empty());
        assert_eq!(state.resources[0].identifier, None);
    }
}
