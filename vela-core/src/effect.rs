//! Effect - Representing side effects as values
//!
//! Effects are not executed until the Interpreter runs them.

use crate::resource::{Resource, ResourceId, State};

/// A side effect to apply against a provider
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Create a new resource
    Create(Resource),
    /// Update an existing resource
    Update {
        id: ResourceId,
        from: State,
        to: Resource,
        /// Attributes whose desired value differs from the current one
        changed_attributes: Vec<String>,
    },
    /// Delete a resource by its provider-side identifier
    Delete { id: ResourceId, identifier: String },
}

impl Effect {
    pub fn resource_id(&self) -> &ResourceId {
        match self {
            Effect::Create(r) => &r.id,
            Effect::Update { id, .. } => id,
            Effect::Delete { id, .. } => id,
        }
    }

    /// Short verb for display and logging
    pub fn kind(&self) -> &'static str {
        match self {
            Effect::Create(_) => "create",
            Effect::Update { .. } => "update",
            Effect::Delete { .. } => "delete",
        }
    }
}
