//! Resolver - Resolve `binding.attribute` references against known state
//!
//! References that name declared attributes are resolved by the parser.
//! The rest (ARNs, DNS names, generated IDs) only become known once the
//! referenced resource exists, so they are resolved here from provider state,
//! just before each effect runs.

use std::collections::{BTreeMap, HashMap};

use crate::parser::OutputParameter;
use crate::resource::{Resource, ResourceId, State, Value};

const MAX_DEPTH: usize = 16;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OutputError {
    #[error("Output '{name}' references '{reference}', which is not known yet")]
    Unresolved { name: String, reference: String },

    #[error("Output '{name}' expected type {expected}, got {got:?}")]
    TypeMismatch {
        name: String,
        expected: String,
        got: Value,
    },
}

/// Attribute values known for each binding
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    values: HashMap<String, HashMap<String, Value>>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed bindings from declared resources and their current state.
    /// Declared attributes win; state fills in what the provider computed.
    pub fn from_resources(resources: &[Resource], states: &HashMap<ResourceId, State>) -> Self {
        let mut bindings = Self::new();
        for resource in resources {
            let Some(binding) = resource.binding() else {
                continue;
            };
            let mut attributes = match states.get(&resource.id) {
                Some(state) if state.exists => state.attributes.clone(),
                _ => HashMap::new(),
            };
            for (key, value) in resource.user_attributes() {
                attributes.insert(key.clone(), value.clone());
            }
            bindings.values.insert(binding.to_string(), attributes);
        }
        bindings
    }

    /// Record the state returned by the provider for a resource.
    /// Provider values override declared ones.
    pub fn record(&mut self, resource: &Resource, state: &State) {
        let Some(binding) = resource.binding() else {
            return;
        };
        let entry = self.values.entry(binding.to_string()).or_default();
        for (key, value) in resource.user_attributes() {
            entry.entry(key.clone()).or_insert_with(|| value.clone());
        }
        for (key, value) in &state.attributes {
            entry.insert(key.clone(), value.clone());
        }
    }

    pub fn get(&self, binding: &str, attribute: &str) -> Option<&Value> {
        self.values.get(binding).and_then(|attrs| attrs.get(attribute))
    }

    /// Replace every reference that can be resolved; others are kept as-is
    pub fn resolve_value(&self, value: &Value) -> Value {
        self.resolve_at_depth(value, 0)
    }

    fn resolve_at_depth(&self, value: &Value, depth: usize) -> Value {
        match value {
            Value::ResourceRef(binding, attr) if depth < MAX_DEPTH => match self.get(binding, attr) {
                Some(found) => self.resolve_at_depth(found, depth + 1),
                None => value.clone(),
            },
            Value::List(items) => Value::List(
                items
                    .iter()
                    .map(|item| self.resolve_at_depth(item, depth))
                    .collect(),
            ),
            Value::Map(map) => Value::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.resolve_at_depth(v, depth)))
                    .collect(),
            ),
            _ => value.clone(),
        }
    }

    /// Resolve all attributes of a resource
    pub fn resolve_resource(&self, resource: &Resource) -> Resource {
        Resource {
            id: resource.id.clone(),
            attributes: resource
                .attributes
                .iter()
                .map(|(k, v)| (k.clone(), self.resolve_value(v)))
                .collect(),
        }
    }

    /// Resolve and type-check output parameters
    pub fn resolve_outputs(
        &self,
        outputs: &[OutputParameter],
    ) -> Result<BTreeMap<String, Value>, OutputError> {
        let mut resolved = BTreeMap::new();
        for output in outputs {
            let value = self.resolve_value(&output.value);
            if let Some(reference) = first_unresolved(&value) {
                return Err(OutputError::Unresolved {
                    name: output.name.clone(),
                    reference,
                });
            }
            if !output.type_expr.accepts(&value) {
                return Err(OutputError::TypeMismatch {
                    name: output.name.clone(),
                    expected: output.type_expr.to_string(),
                    got: value,
                });
            }
            resolved.insert(output.name.clone(), value);
        }
        Ok(resolved)
    }
}

fn first_unresolved(value: &Value) -> Option<String> {
    match value {
        Value::ResourceRef(binding, attr) => Some(format!("{}.{}", binding, attr)),
        Value::List(items) => items.iter().find_map(first_unresolved),
        Value::Map(map) => map.values().find_map(first_unresolved),
        _ => None,
    }
}
