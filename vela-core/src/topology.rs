//! Topology - Blue/green deployment checks
//!
//! Locates the CodeDeploy deployment group in a descriptor and checks that
//! the resources it names fit together: one pair of distinct target groups,
//! a CODE_DEPLOY-controlled service attached to the pair, a production
//! listener whose rule splits 100% of its traffic across the pair, a test
//! listener that only reaches green, and alarms and a deployment config that
//! exist. The result carries the `DeploymentPolicy` used by the rollout model.

use std::time::Duration;

use log::debug;

use crate::resource::{Resource, Value};
use crate::rollout::{AutoRollback, DeploymentPolicy};
use crate::routing::{self, RoutingError, RoutingTable};
use crate::traffic::{DEPLOYMENT_CONFIG_TYPE, PolicyError, TrafficRouting, Weights};

pub const DEPLOYMENT_GROUP_TYPE: &str = "codedeploy_deployment_group";
pub const TARGET_GROUP_TYPE: &str = "elbv2_target_group";
pub const SERVICE_TYPE: &str = "ecs_service";
pub const ALARM_TYPE: &str = "cloudwatch_alarm";

const DEFAULT_DEPLOYMENT_CONFIG: &str = "CodeDeployDefault.ECSAllAtOnce";

/// Request path that identifies the production rule
pub const PRODUCTION_PATH: &str = "/api";

/// Longest approval wait CodeDeploy accepts (two days)
const MAX_APPROVAL_WAIT_MINUTES: i64 = 2880;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TopologyError {
    #[error("Expected exactly one deployment group, found {}: {}", .0.len(), .0.join(", "))]
    MultipleDeploymentGroups(Vec<String>),

    #[error("Deployment group '{group}' is missing {attribute}")]
    MissingAttribute { group: String, attribute: String },

    #[error("Deployment group '{group}': {message}")]
    TargetGroupPair { group: String, message: String },

    #[error("Target group '{0}' is not declared")]
    TargetGroupNotFound(String),

    #[error("ECS service '{0}' is not declared")]
    ServiceNotFound(String),

    #[error("ECS service '{service}' runs in cluster '{actual}', but the deployment group expects '{expected}'")]
    ClusterMismatch {
        service: String,
        expected: String,
        actual: String,
    },

    #[error("ECS service '{0}' must use the CODE_DEPLOY deployment controller")]
    NotCodeDeployControlled(String),

    #[error("ECS service '{0}' is not attached to the blue or green target group")]
    ServiceNotAttached(String),

    #[error("Deployment group '{group}': {route} must reference a listener declared in this file")]
    ListenerReference { group: String, route: String },

    #[error("No rule on listener '{0}' forwards to the blue/green target groups")]
    NoProductionRoute(String),

    #[error("Production rule '{rule}' sends {share}% of its traffic to the blue/green pair, expected 100%")]
    ProductionWeights { rule: String, share: u32 },

    #[error("Test rule '{rule}' must forward only to the green target group '{green}'")]
    TestRouteNotGreen { rule: String, green: String },

    #[error("Deployment group '{group}': wait_time_in_minutes must be 0..={max}, got {minutes}", max = MAX_APPROVAL_WAIT_MINUTES)]
    ApprovalWait { group: String, minutes: i64 },

    #[error("Alarm '{0}' is not declared")]
    AlarmNotFound(String),

    #[error("Deployment config '{0}' is neither declared nor predefined")]
    UnknownDeploymentConfig(String),

    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error(transparent)]
    Policy(#[from] PolicyError),
}

/// A validated blue/green deployment
#[derive(Debug, Clone, PartialEq)]
pub struct BlueGreenTopology {
    pub deployment_group: String,
    pub cluster: String,
    pub service: String,
    pub blue: String,
    pub green: String,
    pub production: RoutingTable,
    pub test: Option<RoutingTable>,
    /// Name of the production rule that splits traffic across the pair
    pub production_rule: String,
    /// Weights declared on the production rule
    pub production_weights: Weights,
    pub deployment_config: String,
    pub policy: DeploymentPolicy,
}

impl BlueGreenTopology {
    /// Check the blue/green deployment of a descriptor.
    ///
    /// Returns `Ok(None)` when no deployment group is declared. Listener rule
    /// priorities are checked on every listener either way.
    pub fn from_resources(resources: &[Resource]) -> Result<Option<Self>, TopologyError> {
        let tables = RoutingTable::all_from_resources(resources)?;

        let groups: Vec<&Resource> = of_type(resources, DEPLOYMENT_GROUP_TYPE).collect();
        let group = match groups.as_slice() {
            [] => return Ok(None),
            [group] => *group,
            _ => {
                return Err(TopologyError::MultipleDeploymentGroups(
                    groups.iter().map(|g| g.id.name.clone()).collect(),
                ));
            }
        };
        let name = group.id.name.clone();
        let missing = |attribute: &str| TopologyError::MissingAttribute {
            group: name.clone(),
            attribute: attribute.to_string(),
        };

        // Target group pair
        let pairs = group
            .attributes
            .get("load_balancer_info")
            .and_then(|info| info.get("target_group_pair_info_list"))
            .and_then(Value::as_list)
            .ok_or_else(|| missing("load_balancer_info.target_group_pair_info_list"))?;
        let [pair] = pairs else {
            return Err(TopologyError::TargetGroupPair {
                group: name.clone(),
                message: format!("expected one target group pair, found {}", pairs.len()),
            });
        };
        let (blue, green) = target_group_pair(&name, pair)?;
        for target_group in [&blue, &green] {
            if find_named(resources, TARGET_GROUP_TYPE, target_group).is_none() {
                return Err(TopologyError::TargetGroupNotFound(target_group.clone()));
            }
        }

        // Service
        let (cluster, service) = ecs_service(group).ok_or_else(|| missing("ecs_services"))?;
        check_service(resources, &cluster, &service, &blue, &green)?;

        // Production listener
        let production = route_table(&name, pair, "prod_traffic_route", &tables)?
            .ok_or_else(|| missing("prod_traffic_route"))?;
        let (production_rule, production_weights) =
            production_split(&production, &blue, &green)?;

        // Test listener
        let test = route_table(&name, pair, "test_traffic_route", &tables)?;
        if let Some(test) = &test {
            for rule in test.rules() {
                let split = rule.action.split();
                let reaches_pair = split.iter().any(|(tg, _)| *tg == blue || *tg == green);
                if reaches_pair && !rule.action.forwards_only_to(&green) {
                    return Err(TopologyError::TestRouteNotGreen {
                        rule: rule.name.clone(),
                        green: green.clone(),
                    });
                }
            }
        }

        // Deployment policy
        let alarms = bound_alarms(group);
        for alarm in &alarms {
            if find_named(resources, ALARM_TYPE, alarm).is_none() {
                return Err(TopologyError::AlarmNotFound(alarm.clone()));
            }
        }
        let deployment_config = group
            .attributes
            .get("deployment_config_name")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_DEPLOYMENT_CONFIG)
            .to_string();
        let routing = match find_named(resources, DEPLOYMENT_CONFIG_TYPE, &deployment_config) {
            Some(config) => TrafficRouting::from_resource(config)?,
            None => TrafficRouting::builtin(&deployment_config)
                .ok_or_else(|| TopologyError::UnknownDeploymentConfig(deployment_config.clone()))?,
        };

        let policy = DeploymentPolicy {
            routing,
            approval_wait: approval_wait(group)?,
            alarms,
            rollback: auto_rollback(group),
        };
        debug!(
            "Deployment group '{}': {} -> {} via {}",
            name, blue, green, policy.routing
        );

        Ok(Some(BlueGreenTopology {
            deployment_group: name,
            cluster,
            service,
            blue,
            green,
            production,
            test,
            production_rule,
            production_weights,
            deployment_config,
            policy,
        }))
    }
}

fn of_type<'a>(resources: &'a [Resource], resource_type: &'a str) -> impl Iterator<Item = &'a Resource> {
    resources
        .iter()
        .filter(move |r| r.id.resource_type == resource_type)
}

fn find_named<'a>(resources: &'a [Resource], resource_type: &str, name: &str) -> Option<&'a Resource> {
    resources
        .iter()
        .find(|r| r.id.resource_type == resource_type && r.id.name == name)
}

fn target_group_pair(group: &str, pair: &Value) -> Result<(String, String), TopologyError> {
    let names: Vec<&str> = pair
        .get("target_groups")
        .and_then(Value::as_list)
        .unwrap_or_default()
        .iter()
        .filter_map(|tg| tg.get("name").and_then(Value::as_str))
        .collect();
    match names.as_slice() {
        [blue, green] if blue != green => Ok((blue.to_string(), green.to_string())),
        [same, _] => Err(TopologyError::TargetGroupPair {
            group: group.to_string(),
            message: format!("blue and green are both '{}'", same),
        }),
        other => Err(TopologyError::TargetGroupPair {
            group: group.to_string(),
            message: format!("expected two target groups, found {}", other.len()),
        }),
    }
}

fn ecs_service(group: &Resource) -> Option<(String, String)> {
    let services = group.attributes.get("ecs_services")?.as_list()?;
    let [service] = services else {
        return None;
    };
    let cluster = service.get("cluster_name")?.as_str()?;
    let name = service.get("service_name")?.as_str()?;
    Some((cluster.to_string(), name.to_string()))
}

fn check_service(
    resources: &[Resource],
    cluster: &str,
    service: &str,
    blue: &str,
    green: &str,
) -> Result<(), TopologyError> {
    let resource = find_named(resources, SERVICE_TYPE, service)
        .ok_or_else(|| TopologyError::ServiceNotFound(service.to_string()))?;

    if let Some(actual) = resource.attributes.get("cluster").and_then(Value::as_str)
        && actual != cluster
    {
        return Err(TopologyError::ClusterMismatch {
            service: service.to_string(),
            expected: cluster.to_string(),
            actual: actual.to_string(),
        });
    }

    let controller = resource
        .attributes
        .get("deployment_controller")
        .and_then(|c| c.get("type"))
        .and_then(Value::as_str);
    if controller != Some("CODE_DEPLOY") {
        return Err(TopologyError::NotCodeDeployControlled(service.to_string()));
    }

    let attached = resource
        .attributes
        .get("load_balancers")
        .and_then(Value::as_list)
        .unwrap_or_default()
        .iter()
        .filter_map(|lb| lb.get("target_group_arn"))
        .map(|arn| routing::target_group_name(arn, resources))
        .any(|tg| tg == blue || tg == green);
    if !attached {
        return Err(TopologyError::ServiceNotAttached(service.to_string()));
    }
    Ok(())
}

/// Routing table of the listener named by a traffic route, if the route is set
fn route_table(
    group: &str,
    pair: &Value,
    route: &str,
    tables: &[RoutingTable],
) -> Result<Option<RoutingTable>, TopologyError> {
    let Some(listeners) = pair
        .get(route)
        .and_then(|r| r.get("listener_arns"))
        .and_then(Value::as_list)
    else {
        return Ok(None);
    };
    let reference_error = || TopologyError::ListenerReference {
        group: group.to_string(),
        route: route.to_string(),
    };
    let binding = match listeners {
        [Value::ResourceRef(binding, _)] => binding,
        _ => return Err(reference_error()),
    };
    tables
        .iter()
        .find(|t| t.listener == *binding)
        .cloned()
        .map(Some)
        .ok_or_else(reference_error)
}

/// The production rule that splits traffic across the pair, and its weights.
///
/// Every rule forwarding to the pair must sum to 100. The one routing
/// `PRODUCTION_PATH` is the production rule; without one, the first rule
/// forwarding to the pair in priority order is.
fn production_split(
    table: &RoutingTable,
    blue: &str,
    green: &str,
) -> Result<(String, Weights), TopologyError> {
    let mut first = None;
    let mut by_path = None;
    for rule in table.rules() {
        let split = rule.action.split();
        let share = |target: &str| -> u32 {
            split
                .iter()
                .filter(|(tg, _)| *tg == target)
                .map(|(_, share)| *share)
                .sum()
        };
        let (blue_share, green_share) = (share(blue), share(green));
        if !split.iter().any(|(tg, _)| *tg == blue || *tg == green) {
            continue;
        }
        let weights = Weights::new(blue_share, green_share).map_err(|_| {
            TopologyError::ProductionWeights {
                rule: rule.name.clone(),
                share: blue_share + green_share,
            }
        })?;
        if by_path.is_none() && rule.matches(PRODUCTION_PATH) {
            by_path = Some((rule.name.clone(), weights));
        }
        if first.is_none() {
            first = Some((rule.name.clone(), weights));
        }
    }
    by_path
        .or(first)
        .ok_or_else(|| TopologyError::NoProductionRoute(table.listener.clone()))
}

fn bound_alarms(group: &Resource) -> Vec<String> {
    let Some(config) = group.attributes.get("alarm_configuration") else {
        return Vec::new();
    };
    if config.get("enabled").and_then(Value::as_bool) == Some(false) {
        return Vec::new();
    }
    config
        .get("alarms")
        .and_then(Value::as_list)
        .unwrap_or_default()
        .iter()
        .filter_map(|a| a.get("name").and_then(Value::as_str))
        .map(str::to_string)
        .collect()
}

/// Wait after the final shift. Only a ready option that stops the deployment
/// on timeout waits for approval.
fn approval_wait(group: &Resource) -> Result<Duration, TopologyError> {
    let Some(ready) = group
        .attributes
        .get("blue_green_deployment_configuration")
        .and_then(|c| c.get("deployment_ready_option"))
    else {
        return Ok(Duration::ZERO);
    };
    if ready.get("action_on_timeout").and_then(Value::as_str) != Some("STOP_DEPLOYMENT") {
        return Ok(Duration::ZERO);
    }
    let minutes = ready
        .get("wait_time_in_minutes")
        .and_then(Value::as_int)
        .unwrap_or(0);
    if !(0..=MAX_APPROVAL_WAIT_MINUTES).contains(&minutes) {
        return Err(TopologyError::ApprovalWait {
            group: group.id.name.clone(),
            minutes,
        });
    }
    Ok(Duration::from_secs(minutes as u64 * 60))
}

fn auto_rollback(group: &Resource) -> AutoRollback {
    let Some(config) = group.attributes.get("auto_rollback_configuration") else {
        return AutoRollback::default();
    };
    if config.get("enabled").and_then(Value::as_bool) == Some(false) {
        return AutoRollback::default();
    }
    let events: Vec<&str> = config
        .get("events")
        .and_then(Value::as_list)
        .unwrap_or_default()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    AutoRollback {
        on_failure: events.contains(&"DEPLOYMENT_FAILURE"),
        on_alarm: events.contains(&"DEPLOYMENT_STOP_ON_ALARM"),
        on_stop_request: events.contains(&"DEPLOYMENT_STOP_ON_REQUEST"),
    }
}
