//! Differ - Compare desired state with current state to generate a Plan
//!
//! Compares the "desired state" declared in the descriptor with the "current
//! state" fetched from the Provider, and generates a list of required Effects.

use std::collections::HashMap;

use log::{debug, warn};

use crate::effect::Effect;
use crate::plan::Plan;
use crate::resource::{Resource, ResourceId, State, Value};

/// Result of a diff operation
#[derive(Debug, Clone, PartialEq)]
pub enum Diff {
    /// Resource does not exist -> needs creation
    Create(Resource),
    /// Resource exists with differences -> needs update
    Update {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// Resource exists with no differences -> no action needed
    NoChange(ResourceId),
}

impl Diff {
    /// Returns whether this Diff involves a change
    pub fn is_change(&self) -> bool {
        !matches!(self, Diff::NoChange(_))
    }
}

/// Compare desired state with current state to compute a Diff
pub fn diff(desired: &Resource, current: &State) -> Diff {
    if !current.exists {
        return Diff::Create(desired.clone());
    }

    let changed = find_changed_attributes(desired, current);

    if changed.is_empty() {
        Diff::NoChange(desired.id.clone())
    } else {
        Diff::Update {
            id: desired.id.clone(),
            from: current.clone(),
            to: desired.clone(),
            changed_attributes: changed,
        }
    }
}

/// Find changed attributes between desired and current state.
///
/// Internal `_` attributes and the keys listed in `ignore_changes` are
/// skipped. The result is sorted.
pub fn find_changed_attributes(desired: &Resource, current: &State) -> Vec<String> {
    let ignored: Vec<&str> = desired
        .attributes
        .get("_ignore_changes")
        .and_then(Value::as_list)
        .map(|keys| keys.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let mut changed: Vec<String> = desired
        .user_attributes()
        .filter(|(key, _)| !ignored.contains(&key.as_str()))
        .filter(|(key, desired_value)| match current.attributes.get(*key) {
            Some(current_value) => !values_match(desired_value, current_value),
            None => true,
        })
        .map(|(key, _)| key.clone())
        .collect();
    changed.sort();
    changed
}

/// Whether a desired value is satisfied by the current value.
///
/// Maps compare as "desired is a subset of current" so that defaults filled
/// in by the provider do not show up as drift. Lists compare element-wise.
/// An unresolved reference never matches.
pub fn values_match(desired: &Value, current: &Value) -> bool {
    match (desired, current) {
        (Value::ResourceRef(_, _), _) => false,
        (Value::Map(d), Value::Map(c)) => d
            .iter()
            .all(|(k, dv)| c.get(k).is_some_and(|cv| values_match(dv, cv))),
        (Value::List(d), Value::List(c)) => {
            d.len() == c.len() && d.iter().zip(c).all(|(dv, cv)| values_match(dv, cv))
        }
        (Value::Int(n), Value::String(s)) | (Value::String(s), Value::Int(n)) => {
            s.parse::<i64>().is_ok_and(|parsed| parsed == *n)
        }
        (Value::Bool(b), Value::String(s)) | (Value::String(s), Value::Bool(b)) => {
            s.parse::<bool>().is_ok_and(|parsed| parsed == *b)
        }
        _ => desired == current,
    }
}

/// Compute Diff for multiple resources and generate a Plan.
///
/// `recorded` lists the resources known from persisted state, in the order
/// they were created. Those no longer declared are deleted in reverse order
/// after all creates and updates.
pub fn create_plan(
    desired: &[Resource],
    current_states: &HashMap<ResourceId, State>,
    recorded: &[ResourceId],
) -> Plan {
    let mut plan = Plan::new();

    for resource in desired {
        let current = current_states
            .get(&resource.id)
            .cloned()
            .unwrap_or_else(|| State::not_found(resource.id.clone()));

        match diff(resource, &current) {
            Diff::Create(r) => plan.add(Effect::Create(r)),
            Diff::Update {
                id,
                from,
                to,
                changed_attributes,
            } => plan.add(Effect::Update {
                id,
                from,
                to,
                changed_attributes,
            }),
            Diff::NoChange(id) => debug!("{} is up to date", id),
        }
    }

    for id in recorded.iter().rev() {
        if desired.iter().any(|r| &r.id == id) {
            continue;
        }
        add_delete(&mut plan, id, current_states.get(id));
    }

    plan
}

/// Plan the teardown of every resource in `order` (already reversed)
pub fn plan_destroy(order: &[ResourceId], current_states: &HashMap<ResourceId, State>) -> Plan {
    let mut plan = Plan::new();
    for id in order {
        add_delete(&mut plan, id, current_states.get(id));
    }
    plan
}

fn add_delete(plan: &mut Plan, id: &ResourceId, state: Option<&State>) {
    match state {
        Some(State {
            exists: true,
            identifier: Some(identifier),
            ..
        }) => plan.add(Effect::Delete {
            id: id.clone(),
            identifier: identifier.clone(),
        }),
        Some(State { exists: true, .. }) => {
            warn!("{} exists but has no identifier; skipping delete", id)
        }
        _ => debug!("{} does not exist; nothing to delete", id),
    }
}
