//! Routing - Listener routing tables
//!
//! Models how an Application Load Balancer listener dispatches a request:
//! rules are evaluated in ascending priority order, the first rule whose
//! conditions all match wins, and the listener's default action applies when
//! nothing matches. Path patterns follow ALB semantics: case-sensitive,
//! matched against the whole path, `*` for any run of characters and `?` for
//! exactly one.

use std::collections::HashMap;

use crate::resource::{Resource, Value};

pub const LISTENER_TYPE: &str = "elbv2_listener";
pub const LISTENER_RULE_TYPE: &str = "elbv2_listener_rule";

const MIN_PRIORITY: i64 = 1;
const MAX_PRIORITY: i64 = 50000;
const MAX_WEIGHT: i64 = 999;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RoutingError {
    #[error("Listener '{0}' not found")]
    ListenerNotFound(String),

    #[error("Rule '{rule}' is not attached to a known listener")]
    UnknownListener { rule: String },

    #[error("Listener '{listener}' has more than one rule with priority {priority}")]
    DuplicatePriority { listener: String, priority: u32 },

    #[error("Rule '{rule}' has priority {priority}, expected 1..=50000")]
    PriorityOutOfRange { rule: String, priority: i64 },

    #[error("Rule '{rule}' has no conditions")]
    NoConditions { rule: String },

    #[error("Rule '{rule}' uses unsupported condition field '{field}'")]
    UnsupportedCondition { rule: String, field: String },

    #[error("'{owner}' must have exactly one action, found {count}")]
    ActionCount { owner: String, count: usize },

    #[error("'{owner}' uses unsupported action: {message}")]
    UnsupportedAction { owner: String, message: String },

    #[error("'{owner}' gives target group '{target_group}' weight {weight}, expected 0..=999")]
    WeightOutOfRange {
        owner: String,
        target_group: String,
        weight: i64,
    },

    #[error("'{owner}' forwards to several target groups with weights summing to {sum}, expected 100")]
    WeightSum { owner: String, sum: i64 },

    #[error("'{owner}': {message}")]
    InvalidAttribute { owner: String, message: String },
}

/// Target group with its forwarding weight
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightedTarget {
    /// Target group name
    pub target_group: String,
    pub weight: u32,
}

/// Terminal action of a rule or listener default
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    FixedResponse {
        status_code: u16,
        content_type: Option<String>,
        body: Option<String>,
    },
    Forward(Vec<WeightedTarget>),
}

impl Action {
    /// Target groups receiving traffic, with their share in percent
    pub fn split(&self) -> Vec<(&str, u32)> {
        match self {
            Action::FixedResponse { .. } => Vec::new(),
            Action::Forward(targets) if targets.len() == 1 => {
                vec![(targets[0].target_group.as_str(), 100)]
            }
            Action::Forward(targets) => targets
                .iter()
                .map(|t| (t.target_group.as_str(), t.weight))
                .collect(),
        }
    }

    /// Whether every request handled by this action reaches `target_group`
    pub fn forwards_only_to(&self, target_group: &str) -> bool {
        let split = self.split();
        !split.is_empty()
            && split
                .iter()
                .all(|(tg, share)| *tg == target_group || *share == 0)
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::FixedResponse {
                status_code, body, ..
            } => match body {
                Some(body) => write!(f, "fixed-response {} {:?}", status_code, body),
                None => write!(f, "fixed-response {}", status_code),
            },
            Action::Forward(_) => {
                let parts: Vec<String> = self
                    .split()
                    .iter()
                    .map(|(tg, share)| format!("{}={}%", tg, share))
                    .collect();
                write!(f, "forward {}", parts.join(", "))
            }
        }
    }
}

/// Rule condition. Values of one condition are OR'd; conditions are AND'd.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    PathPattern(Vec<String>),
}

impl Condition {
    pub fn matches(&self, path: &str) -> bool {
        match self {
            Condition::PathPattern(patterns) => patterns.iter().any(|p| path_matches(p, path)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerRule {
    pub name: String,
    pub priority: u32,
    pub conditions: Vec<Condition>,
    pub action: Action,
}

impl ListenerRule {
    pub fn matches(&self, path: &str) -> bool {
        self.conditions.iter().all(|c| c.matches(path))
    }
}

/// Result of routing one request path
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Route<'a> {
    /// Matching rule, or None when the default action applies
    pub rule: Option<&'a ListenerRule>,
    pub action: &'a Action,
}

/// Rules of one listener, ordered by priority
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingTable {
    /// Binding name of the listener
    pub listener: String,
    pub port: Option<u16>,
    pub default_action: Action,
    rules: Vec<ListenerRule>,
}

impl RoutingTable {
    pub fn new(listener: impl Into<String>, port: Option<u16>, default_action: Action) -> Self {
        Self {
            listener: listener.into(),
            port,
            default_action,
            rules: Vec::new(),
        }
    }

    pub fn rules(&self) -> &[ListenerRule] {
        &self.rules
    }

    /// Add a rule, keeping priorities unique and ordered
    pub fn add_rule(&mut self, rule: ListenerRule) -> Result<(), RoutingError> {
        if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&i64::from(rule.priority)) {
            return Err(RoutingError::PriorityOutOfRange {
                rule: rule.name,
                priority: i64::from(rule.priority),
            });
        }
        if rule.conditions.is_empty() {
            return Err(RoutingError::NoConditions { rule: rule.name });
        }
        validate_action(&rule.name, &rule.action)?;

        match self.rules.binary_search_by_key(&rule.priority, |r| r.priority) {
            Ok(_) => Err(RoutingError::DuplicatePriority {
                listener: self.listener.clone(),
                priority: rule.priority,
            }),
            Err(pos) => {
                self.rules.insert(pos, rule);
                Ok(())
            }
        }
    }

    /// Build the table for the listener bound to `listener_binding`
    pub fn from_resources(
        listener_binding: &str,
        resources: &[Resource],
    ) -> Result<RoutingTable, RoutingError> {
        let listener = resources
            .iter()
            .find(|r| r.id.resource_type == LISTENER_TYPE && r.binding() == Some(listener_binding))
            .ok_or_else(|| RoutingError::ListenerNotFound(listener_binding.to_string()))?;

        let owner = listener.id.to_string();
        let port = match listener.attributes.get("port") {
            Some(value) => Some(
                value
                    .as_int()
                    .and_then(|p| u16::try_from(p).ok())
                    .ok_or_else(|| RoutingError::InvalidAttribute {
                        owner: owner.clone(),
                        message: format!("invalid port {:?}", value),
                    })?,
            ),
            None => None,
        };
        let default_action = parse_single_action(
            &owner,
            listener.attributes.get("default_actions"),
            resources,
        )?;
        validate_action(&owner, &default_action)?;

        let mut table = RoutingTable::new(listener_binding, port, default_action);
        for resource in resources.iter().filter(|r| r.id.resource_type == LISTENER_RULE_TYPE) {
            if rule_listener(resource) == Some(listener_binding) {
                table.add_rule(parse_rule(resource, resources)?)?;
            }
        }
        Ok(table)
    }

    /// Build a table for every listener, rejecting rules attached to none
    pub fn all_from_resources(resources: &[Resource]) -> Result<Vec<RoutingTable>, RoutingError> {
        let listeners: Vec<&str> = resources
            .iter()
            .filter(|r| r.id.resource_type == LISTENER_TYPE)
            .filter_map(Resource::binding)
            .collect();

        for rule in resources.iter().filter(|r| r.id.resource_type == LISTENER_RULE_TYPE) {
            if !rule_listener(rule).is_some_and(|l| listeners.contains(&l)) {
                return Err(RoutingError::UnknownListener {
                    rule: rule.id.name.clone(),
                });
            }
        }

        listeners
            .into_iter()
            .map(|binding| RoutingTable::from_resources(binding, resources))
            .collect()
    }

    /// First matching rule in priority order, or the default action
    pub fn route(&self, path: &str) -> Route<'_> {
        match self.rules.iter().find(|r| r.matches(path)) {
            Some(rule) => Route {
                rule: Some(rule),
                action: &rule.action,
            },
            None => Route {
                rule: None,
                action: &self.default_action,
            },
        }
    }

    /// Share of traffic per target group for requests to `path`
    pub fn split(&self, path: &str) -> Vec<(&str, u32)> {
        self.route(path).action.split()
    }

    /// Target group serving a request to `path` for a roll in 0..100.
    /// None for fixed responses or an out-of-range roll.
    pub fn pick(&self, path: &str, roll: u32) -> Option<&str> {
        if roll >= 100 {
            return None;
        }
        let mut upper = 0;
        for (target_group, share) in self.split(path) {
            upper += share;
            if roll < upper {
                return Some(target_group);
            }
        }
        None
    }
}

/// ALB path-pattern match over the whole path
pub fn path_matches(pattern: &str, path: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let path: Vec<char> = path.chars().collect();

    // matched[j]: pattern[..i] matches path[..j]
    let mut matched = vec![false; path.len() + 1];
    matched[0] = true;
    for p in &pattern {
        let mut next = vec![false; path.len() + 1];
        match p {
            '*' => {
                let mut any = false;
                for j in 0..=path.len() {
                    any |= matched[j];
                    next[j] = any;
                }
            }
            '?' => {
                for j in 1..=path.len() {
                    next[j] = matched[j - 1];
                }
            }
            c => {
                for j in 1..=path.len() {
                    next[j] = matched[j - 1] && path[j - 1] == *c;
                }
            }
        }
        matched = next;
    }
    matched[path.len()]
}

/// Binding of the listener a rule is attached to
fn rule_listener(rule: &Resource) -> Option<&str> {
    match rule.attributes.get("listener_arn") {
        Some(Value::ResourceRef(binding, _)) => Some(binding.as_str()),
        _ => None,
    }
}

fn validate_action(owner: &str, action: &Action) -> Result<(), RoutingError> {
    if let Action::Forward(targets) = action
        && targets.len() > 1
    {
        let sum: i64 = targets.iter().map(|t| i64::from(t.weight)).sum();
        if sum != 100 {
            return Err(RoutingError::WeightSum {
                owner: owner.to_string(),
                sum,
            });
        }
    }
    Ok(())
}

fn parse_rule(resource: &Resource, resources: &[Resource]) -> Result<ListenerRule, RoutingError> {
    let name = resource.id.name.clone();

    let priority = resource
        .attributes
        .get("priority")
        .and_then(Value::as_int)
        .ok_or_else(|| RoutingError::InvalidAttribute {
            owner: name.clone(),
            message: "missing or non-numeric priority".to_string(),
        })?;
    let priority = u32::try_from(priority)
        .ok()
        .filter(|p| (MIN_PRIORITY..=MAX_PRIORITY).contains(&i64::from(*p)))
        .ok_or_else(|| RoutingError::PriorityOutOfRange {
            rule: name.clone(),
            priority,
        })?;

    let mut conditions = Vec::new();
    for condition in resource
        .attributes
        .get("conditions")
        .and_then(Value::as_list)
        .unwrap_or_default()
    {
        conditions.push(parse_condition(&name, condition)?);
    }

    let action = parse_single_action(&name, resource.attributes.get("actions"), resources)?;

    Ok(ListenerRule {
        name,
        priority,
        conditions,
        action,
    })
}

fn parse_condition(rule: &str, value: &Value) -> Result<Condition, RoutingError> {
    let field = value.get("field").and_then(Value::as_str).unwrap_or_default();
    if field != "path-pattern" {
        return Err(RoutingError::UnsupportedCondition {
            rule: rule.to_string(),
            field: field.to_string(),
        });
    }
    let values = value
        .get("path_pattern_config")
        .and_then(|c| c.get("values"))
        .or_else(|| value.get("values"))
        .and_then(Value::as_list)
        .unwrap_or_default();
    let patterns: Vec<String> = values
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect();
    if patterns.is_empty() {
        return Err(RoutingError::InvalidAttribute {
            owner: rule.to_string(),
            message: "path-pattern condition has no values".to_string(),
        });
    }
    Ok(Condition::PathPattern(patterns))
}

fn parse_single_action(
    owner: &str,
    actions: Option<&Value>,
    resources: &[Resource],
) -> Result<Action, RoutingError> {
    let actions = actions.and_then(Value::as_list).unwrap_or_default();
    match actions {
        [action] => parse_action(owner, action, resources),
        _ => Err(RoutingError::ActionCount {
            owner: owner.to_string(),
            count: actions.len(),
        }),
    }
}

fn parse_action(owner: &str, action: &Value, resources: &[Resource]) -> Result<Action, RoutingError> {
    let action_type = action.get("type").and_then(Value::as_str).unwrap_or_default();
    match action_type {
        "fixed-response" => {
            let config = action.get("fixed_response_config");
            let field = |key: &str| {
                config
                    .and_then(|c| c.get(key))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            };
            let status_code = config
                .and_then(|c| c.get("status_code"))
                .and_then(Value::as_int)
                .and_then(|code| u16::try_from(code).ok())
                .filter(|code| (200..=599).contains(code))
                .ok_or_else(|| RoutingError::InvalidAttribute {
                    owner: owner.to_string(),
                    message: "fixed-response needs a status_code in 200..=599".to_string(),
                })?;
            Ok(Action::FixedResponse {
                status_code,
                content_type: field("content_type"),
                body: field("message_body"),
            })
        }
        "forward" => {
            let weighted = action
                .get("forward_config")
                .and_then(|c| c.get("target_groups"))
                .and_then(Value::as_list);
            let targets = match weighted {
                Some(groups) => groups
                    .iter()
                    .map(|group| parse_weighted_target(owner, group, resources))
                    .collect::<Result<Vec<_>, _>>()?,
                None => {
                    let arn = action.get("target_group_arn").ok_or_else(|| {
                        RoutingError::InvalidAttribute {
                            owner: owner.to_string(),
                            message: "forward action has no target group".to_string(),
                        }
                    })?;
                    vec![WeightedTarget {
                        target_group: target_group_name(arn, resources),
                        weight: 100,
                    }]
                }
            };
            if targets.is_empty() {
                return Err(RoutingError::InvalidAttribute {
                    owner: owner.to_string(),
                    message: "forward action has no target group".to_string(),
                });
            }
            Ok(Action::Forward(targets))
        }
        other => Err(RoutingError::UnsupportedAction {
            owner: owner.to_string(),
            message: format!("'{}'", other),
        }),
    }
}

fn parse_weighted_target(
    owner: &str,
    group: &Value,
    resources: &[Resource],
) -> Result<WeightedTarget, RoutingError> {
    let arn = group
        .get("target_group_arn")
        .ok_or_else(|| RoutingError::InvalidAttribute {
            owner: owner.to_string(),
            message: "weighted target group has no target_group_arn".to_string(),
        })?;
    let target_group = target_group_name(arn, resources);
    let weight = group.get("weight").map_or(Some(1), Value::as_int).unwrap_or(-1);
    if !(0..=MAX_WEIGHT).contains(&weight) {
        return Err(RoutingError::WeightOutOfRange {
            owner: owner.to_string(),
            target_group,
            weight,
        });
    }
    Ok(WeightedTarget {
        target_group,
        weight: weight as u32,
    })
}

/// Name a target group from a reference to its resource or a literal
pub(crate) fn target_group_name(value: &Value, resources: &[Resource]) -> String {
    let by_binding: HashMap<&str, &Resource> = resources
        .iter()
        .filter_map(|r| r.binding().map(|b| (b, r)))
        .collect();
    match value {
        Value::ResourceRef(binding, attr) => match by_binding.get(binding.as_str()) {
            Some(resource) => resource
                .attributes
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or(resource.id.name.as_str())
                .to_string(),
            None => format!("{}.{}", binding, attr),
        },
        Value::String(s) => s.clone(),
        other => format!("{:?}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_and_resolve;

    const LISTENERS: &str = r#"
        let blue_tg = awscc.elbv2_target_group {
            name = "blue-tg"
        }
        let green_tg = awscc.elbv2_target_group {
            name = "green-tg"
        }
        let prod = awscc.elbv2_listener {
            name = "prod"
            port = 80
            default_actions {
                type = "fixed-response"
                fixed_response_config {
                    status_code = "404"
                    content_type = "text/plain"
                    message_body = "Not Found"
                }
            }
        }
        let test = awscc.elbv2_listener {
            name = "test"
            port = 8080
            default_actions {
                type = "fixed-response"
                fixed_response_config {
                    status_code = "404"
                }
            }
        }
        awscc.elbv2_listener_rule {
            name = "api"
            listener_arn = prod.listener_arn
            priority = 10
            conditions {
                field = "path-pattern"
                path_pattern_config {
                    values = ["/api"]
                }
            }
            actions {
                type = "forward"
                forward_config {
                    target_groups = [
                        { target_group_arn = blue_tg.target_group_arn, weight = 80 },
                        { target_group_arn = green_tg.target_group_arn, weight = 20 },
                    ]
                }
            }
        }
        awscc.elbv2_listener_rule {
            name = "test"
            listener_arn = test.listener_arn
            priority = 10
            conditions {
                field = "path-pattern"
                values = ["/test"]
            }
            actions {
                type = "forward"
                target_group_arn = green_tg.target_group_arn
            }
        }
    "#;

    fn resources(input: &str) -> Vec<Resource> {
        parse_and_resolve(input).unwrap().resources
    }

    fn path_rule(name: &str, priority: u32, pattern: &str, target: &str) -> ListenerRule {
        ListenerRule {
            name: name.to_string(),
            priority,
            conditions: vec![Condition::PathPattern(vec![pattern.to_string()])],
            action: Action::Forward(vec![WeightedTarget {
                target_group: target.to_string(),
                weight: 1,
            }]),
        }
    }

    fn not_found() -> Action {
        Action::FixedResponse {
            status_code: 404,
            content_type: Some("text/plain".to_string()),
            body: Some("Not Found".to_string()),
        }
    }

    #[test]
    fn glob_matching_follows_alb_rules() {
        assert!(path_matches("/api", "/api"));
        assert!(!path_matches("/api", "/api/v1"));
        assert!(!path_matches("/api", "/API"));
        assert!(path_matches("/api/*", "/api/v1/users"));
        assert!(path_matches("/*", "/"));
        assert!(path_matches("/*", "/anything/at/all"));
        assert!(path_matches("/img/?.png", "/img/a.png"));
        assert!(!path_matches("/img/?.png", "/img/ab.png"));
        assert!(path_matches("*", ""));
        assert!(!path_matches("?", ""));
    }

    #[test]
    fn builds_production_table_from_descriptor() {
        let resources = resources(LISTENERS);
        let table = RoutingTable::from_resources("prod", &resources).unwrap();

        assert_eq!(table.port, Some(80));
        assert_eq!(table.default_action, not_found());
        assert_eq!(table.rules().len(), 1);
        assert_eq!(table.rules()[0].priority, 10);
        assert_eq!(table.split("/api"), vec![("blue-tg", 80), ("green-tg", 20)]);
    }

    #[test]
    fn api_rule_takes_precedence_over_default() {
        let table = RoutingTable::from_resources("prod", &resources(LISTENERS)).unwrap();

        let route = table.route("/api");
        assert_eq!(route.rule.map(|r| r.name.as_str()), Some("api"));

        let route = table.route("/other");
        assert!(route.rule.is_none());
        assert_eq!(route.action, &not_found());
        assert!(table.split("/other").is_empty());
    }

    #[test]
    fn test_listener_routes_to_green_only() {
        let table = RoutingTable::from_resources("test", &resources(LISTENERS)).unwrap();
        assert_eq!(table.split("/test"), vec![("green-tg", 100)]);
        assert!(table.route("/test").action.forwards_only_to("green-tg"));
        for roll in 0..100 {
            assert_eq!(table.pick("/test", roll), Some("green-tg"));
        }
    }

    #[test]
    fn pick_follows_weights() {
        let table = RoutingTable::from_resources("prod", &resources(LISTENERS)).unwrap();
        let blue = (0..100).filter(|r| table.pick("/api", *r) == Some("blue-tg")).count();
        assert_eq!(blue, 80);
        assert_eq!(table.pick("/api", 79), Some("blue-tg"));
        assert_eq!(table.pick("/api", 80), Some("green-tg"));
        assert_eq!(table.pick("/api", 100), None);
        assert_eq!(table.pick("/missing", 0), None);
    }

    #[test]
    fn lower_priority_number_wins() {
        let mut table = RoutingTable::new("prod", Some(80), not_found());
        table.add_rule(path_rule("catch-all", 20, "/*", "green-tg")).unwrap();
        table.add_rule(path_rule("api", 10, "/api", "blue-tg")).unwrap();

        assert_eq!(table.route("/api").rule.map(|r| r.priority), Some(10));
        assert_eq!(table.route("/x").rule.map(|r| r.priority), Some(20));
    }

    #[test]
    fn duplicate_priority_is_rejected() {
        let mut table = RoutingTable::new("prod", Some(80), not_found());
        table.add_rule(path_rule("a", 10, "/a", "blue-tg")).unwrap();
        assert_eq!(
            table.add_rule(path_rule("b", 10, "/b", "blue-tg")),
            Err(RoutingError::DuplicatePriority {
                listener: "prod".to_string(),
                priority: 10
            })
        );
    }

    #[test]
    fn rule_validation() {
        let mut table = RoutingTable::new("prod", None, not_found());
        assert!(matches!(
            table.add_rule(path_rule("a", 0, "/a", "blue-tg")),
            Err(RoutingError::PriorityOutOfRange { .. })
        ));
        assert!(matches!(
            table.add_rule(path_rule("a", 50001, "/a", "blue-tg")),
            Err(RoutingError::PriorityOutOfRange { .. })
        ));

        let mut rule = path_rule("a", 1, "/a", "blue-tg");
        rule.conditions.clear();
        assert!(matches!(
            table.add_rule(rule),
            Err(RoutingError::NoConditions { .. })
        ));

        let mut rule = path_rule("a", 1, "/a", "blue-tg");
        rule.action = Action::Forward(vec![
            WeightedTarget {
                target_group: "blue-tg".to_string(),
                weight: 60,
            },
            WeightedTarget {
                target_group: "green-tg".to_string(),
                weight: 60,
            },
        ]);
        assert!(matches!(
            table.add_rule(rule),
            Err(RoutingError::WeightSum { sum: 120, .. })
        ));
    }

    #[test]
    fn rejects_weight_out_of_range() {
        let input = LISTENERS.replace("weight = 80", "weight = 1000");
        let err = RoutingTable::from_resources("prod", &resources(&input)).unwrap_err();
        assert!(matches!(err, RoutingError::WeightOutOfRange { weight: 1000, .. }));
    }

    #[test]
    fn rejects_unsupported_condition() {
        let input = r#"
            let prod = awscc.elbv2_listener {
                name = "prod"
                default_actions {
                    type = "fixed-response"
                    fixed_response_config { status_code = 404 }
                }
            }
            awscc.elbv2_listener_rule {
                name = "host"
                listener_arn = prod.listener_arn
                priority = 5
                conditions {
                    field = "host-header"
                    values = ["example.com"]
                }
                actions {
                    type = "fixed-response"
                    fixed_response_config { status_code = 200 }
                }
            }
        "#;
        let err = RoutingTable::from_resources("prod", &resources(input)).unwrap_err();
        assert!(matches!(err, RoutingError::UnsupportedCondition { ref field, .. } if field == "host-header"));
    }

    #[test]
    fn rule_needs_exactly_one_action() {
        let input = r#"
            let prod = awscc.elbv2_listener {
                name = "prod"
                default_actions {
                    type = "fixed-response"
                    fixed_response_config { status_code = 404 }
                }
                default_actions {
                    type = "fixed-response"
                    fixed_response_config { status_code = 503 }
                }
            }
        "#;
        let err = RoutingTable::from_resources("prod", &resources(input)).unwrap_err();
        assert!(matches!(err, RoutingError::ActionCount { count: 2, .. }));
    }

    #[test]
    fn all_tables_and_orphan_rules() {
        let parsed = resources(LISTENERS);
        let tables = RoutingTable::all_from_resources(&parsed).unwrap();
        assert_eq!(tables.len(), 2);

        let orphan = format!(
            "{}\n{}",
            LISTENERS,
            r#"awscc.elbv2_listener_rule {
                name = "orphan"
                listener_arn = "arn:aws:elasticloadbalancing:listener/other"
                priority = 1
            }"#
        );
        let err = RoutingTable::all_from_resources(&resources(&orphan)).unwrap_err();
        assert_eq!(
            err,
            RoutingError::UnknownListener {
                rule: "orphan".to_string()
            }
        );
    }

    #[test]
    fn missing_listener() {
        assert_eq!(
            RoutingTable::from_resources("nope", &resources(LISTENERS)),
            Err(RoutingError::ListenerNotFound("nope".to_string()))
        );
    }

    #[test]
    fn action_display() {
        assert_eq!(not_found().to_string(), "fixed-response 404 \"Not Found\"");
        let forward = Action::Forward(vec![
            WeightedTarget {
                target_group: "blue-tg".to_string(),
                weight: 100,
            },
            WeightedTarget {
                target_group: "green-tg".to_string(),
                weight: 0,
            },
        ]);
        assert_eq!(forward.to_string(), "forward blue-tg=100%, green-tg=0%");
        assert!(forward.forwards_only_to("blue-tg"));
        assert!(!forward.forwards_only_to("green-tg"));
    }
}
