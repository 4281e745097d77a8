//! Terminal rendering of plans, outputs, routing tables and rollouts

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use colored::{ColoredString, Colorize};
use similar::{ChangeTag, TextDiff};

use vela_core::effect::Effect;
use vela_core::graph::{DependencyGraph, node_key};
use vela_core::plan::Plan;
use vela_core::resource::{Resource, Value};
use vela_core::rollout::{Rollout, RolloutEvent, RolloutStatus};
use vela_core::routing::RoutingTable;
use vela_core::topology::BlueGreenTopology;
use vela_core::traffic::format_minutes;

/// Values longer than this are shown as a line diff on update
const INLINE_LIMIT: usize = 60;

pub fn print_plan(plan: &Plan, graph: &DependencyGraph) {
    if plan.is_empty() {
        println!("{}", "No changes. Infrastructure is up-to-date.".green());
        return;
    }

    // Effects keyed by the graph node of the resource they touch
    let node_of: Vec<Option<String>> = plan.effects().iter().map(effect_node).collect();
    let index: HashMap<&str, usize> = node_of
        .iter()
        .enumerate()
        .filter_map(|(i, node)| node.as_deref().map(|n| (n, i)))
        .collect();

    let mut children: HashMap<usize, Vec<usize>> = HashMap::new();
    let mut roots = Vec::new();
    for (i, node) in node_of.iter().enumerate() {
        let parent = node.as_deref().and_then(|node| {
            graph
                .dependencies_of(node)
                .iter()
                .find_map(|dep| index.get(dep.target.as_str()).copied())
        });
        match parent {
            Some(parent) if parent != i => children.entry(parent).or_default().push(i),
            _ => roots.push(i),
        }
    }

    println!("{}", "Execution Plan:".cyan().bold());
    println!();

    let mut printed = HashSet::new();
    for root in roots {
        print_effect_tree(plan, root, &children, &mut printed, "", None);
    }

    println!();
    let summary = plan.summary();
    println!(
        "Plan: {} to add, {} to change, {} to destroy.",
        summary.create.to_string().green(),
        summary.update.to_string().yellow(),
        summary.delete.to_string().red()
    );
}

fn effect_node(effect: &Effect) -> Option<String> {
    match effect {
        Effect::Create(r) | Effect::Update { to: r, .. } => Some(node_key(r)),
        Effect::Delete { .. } => None,
    }
}

/// `is_last` is None for roots
fn print_effect_tree(
    plan: &Plan,
    idx: usize,
    children: &HashMap<usize, Vec<usize>>,
    printed: &mut HashSet<usize>,
    prefix: &str,
    is_last: Option<bool>,
) {
    if !printed.insert(idx) {
        return;
    }

    let (connector, continuation) = match is_last {
        None => (String::new(), String::from("  ")),
        Some(true) => (format!("{}└─ ", prefix), format!("{}   ", prefix)),
        Some(false) => (format!("{}├─ ", prefix), format!("{}│  ", prefix)),
    };
    let attr_prefix = format!("  {}  ", continuation);

    let effect = &plan.effects()[idx];
    let id = effect.resource_id();
    println!(
        "  {}{} {} {}",
        connector,
        effect_symbol(effect),
        id.resource_type.cyan().bold(),
        id.name.bold()
    );

    match effect {
        Effect::Create(r) => {
            for (key, value) in sorted_attributes(r) {
                println!("{}{}: {}", attr_prefix, key, format_value(value).green());
            }
        }
        Effect::Update {
            from,
            to,
            changed_attributes,
            ..
        } => {
            for key in changed_attributes {
                let new_value = to.attributes.get(key);
                let old_value = from.attributes.get(key);
                print_change(&attr_prefix, key, old_value, new_value);
            }
        }
        Effect::Delete { identifier, .. } => {
            println!("{}{}: {}", attr_prefix, "identifier".bold(), identifier.red());
        }
    }

    let kids: Vec<usize> = children
        .get(&idx)
        .map(|c| c.iter().copied().filter(|c| !printed.contains(c)).collect())
        .unwrap_or_default();
    let child_prefix = format!("  {}", continuation);
    for (i, child) in kids.iter().enumerate() {
        print_effect_tree(
            plan,
            *child,
            children,
            printed,
            &child_prefix,
            Some(i == kids.len() - 1),
        );
    }
}

fn effect_symbol(effect: &Effect) -> ColoredString {
    match effect {
        Effect::Create(_) => "+".green().bold(),
        Effect::Update { .. } => "~".yellow().bold(),
        Effect::Delete { .. } => "-".red().bold(),
    }
}

/// User attributes with `name` first, the rest alphabetical
fn sorted_attributes(resource: &Resource) -> Vec<(&String, &Value)> {
    let mut attrs: Vec<_> = resource.user_attributes().collect();
    attrs.sort_by(|(a, _), (b, _)| match (a.as_str(), b.as_str()) {
        ("name", _) => std::cmp::Ordering::Less,
        (_, "name") => std::cmp::Ordering::Greater,
        _ => a.cmp(b),
    });
    attrs
}

fn print_change(prefix: &str, key: &str, old: Option<&Value>, new: Option<&Value>) {
    let old_str = old.map(format_value).unwrap_or_else(|| "(none)".to_string());
    let new_str = new.map(format_value).unwrap_or_else(|| "(none)".to_string());

    if old_str.len() + new_str.len() <= INLINE_LIMIT * 2
        || old.is_none()
        || new.is_none()
    {
        println!("{}{}: {} → {}", prefix, key, old_str.red(), new_str.green());
        return;
    }

    println!("{}{}:", prefix, key);
    for line in diff_lines(old, new) {
        println!("{}  {}", prefix, line);
    }
}

/// Line diff of two values rendered as pretty JSON
fn diff_lines(old: Option<&Value>, new: Option<&Value>) -> Vec<ColoredString> {
    let render = |v: Option<&Value>| {
        v.map(|v| serde_json::to_string_pretty(&v.to_json()).unwrap_or_default())
            .unwrap_or_default()
    };
    let (old, new) = (render(old), render(new));
    TextDiff::from_lines(&old, &new)
        .iter_all_changes()
        .map(|change| {
            let line = change.value().trim_end();
            match change.tag() {
                ChangeTag::Delete => format!("- {}", line).red(),
                ChangeTag::Insert => format!("+ {}", line).green(),
                ChangeTag::Equal => format!("  {}", line).normal(),
            }
        })
        .collect()
}

pub fn format_effect(effect: &Effect) -> String {
    let id = effect.resource_id();
    match effect {
        Effect::Create(_) => format!("Create {}", id),
        Effect::Update { .. } => format!("Update {}", id),
        Effect::Delete { .. } => format!("Delete {}", id),
    }
}

/// Whether a string is a DSL enum such as `awscc.Region.us_east_1`
fn is_dsl_enum_format(s: &str) -> bool {
    let parts: Vec<&str> = s.split('.').collect();
    match parts.as_slice() {
        [provider, type_name, _] => {
            provider.chars().all(|c| c.is_ascii_lowercase())
                && type_name.chars().next().is_some_and(|c| c.is_uppercase())
        }
        _ => false,
    }
}

pub fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) if is_dsl_enum_format(s) => {
            let raw = s.rsplit('.').next().unwrap_or(s);
            format!("\"{}\"", raw.replace('_', "-"))
        }
        Value::String(s) => format!("\"{}\"", s),
        Value::Int(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::List(items) => {
            let strs: Vec<_> = items.iter().map(format_value).collect();
            format!("[{}]", strs.join(", "))
        }
        Value::Map(map) => {
            let mut keys: Vec<_> = map.keys().collect();
            keys.sort();
            let strs: Vec<_> = keys
                .iter()
                .map(|k| format!("{}: {}", k, format_value(&map[*k])))
                .collect();
            format!("{{{}}}", strs.join(", "))
        }
        Value::ResourceRef(binding, attr) => format!("(known after apply: {}.{})", binding, attr),
    }
}

pub fn print_outputs(outputs: &BTreeMap<String, Value>) {
    if outputs.is_empty() {
        return;
    }
    println!("{}", "Outputs:".cyan().bold());
    println!();
    for (name, value) in outputs {
        println!("  {} = {}", name.bold(), format_value(value));
    }
}

pub fn print_topology(topology: &BlueGreenTopology) {
    let policy = &topology.policy;
    println!("{}", "Blue/green deployment:".cyan().bold());
    println!("  deployment group: {}", topology.deployment_group.bold());
    println!("  service:          {} ({})", topology.service, topology.cluster);
    println!("  target groups:    {} / {}", topology.blue, topology.green);
    println!(
        "  production rule:  {} ({})",
        topology.production_rule, topology.production_weights
    );
    println!(
        "  traffic shift:    {} ({})",
        policy.routing, topology.deployment_config
    );
    if !policy.approval_wait.is_zero() {
        println!("  approval wait:    {}", format_minutes(policy.approval_wait));
    }
    if !policy.alarms.is_empty() {
        println!("  alarms:           {}", policy.alarms.join(", "));
    }
    let mut rollback = Vec::new();
    if policy.rollback.on_failure {
        rollback.push("failure");
    }
    if policy.rollback.on_alarm {
        rollback.push("alarm");
    }
    if policy.rollback.on_stop_request {
        rollback.push("stop request");
    }
    if !rollback.is_empty() {
        println!("  auto-rollback on: {}", rollback.join(", "));
    }
}

pub fn print_routing_table(table: &RoutingTable) {
    let port = table
        .port
        .map(|p| format!(" (port {})", p))
        .unwrap_or_default();
    println!("{}{}", table.listener.cyan().bold(), port);
    for rule in table.rules() {
        let patterns: Vec<String> = rule
            .conditions
            .iter()
            .map(|c| match c {
                vela_core::routing::Condition::PathPattern(p) => p.join(" | "),
            })
            .collect();
        println!(
            "  {:>5}  {:<16} {}",
            rule.priority,
            patterns.join(" & "),
            rule.action
        );
    }
    println!("  {:>5}  {:<16} {}", "-", "(default)", table.default_action);
}

pub fn print_route(table: &RoutingTable, path: &str, roll: Option<u32>) {
    let route = table.route(path);
    let matched = match route.rule {
        Some(rule) => format!("rule {} (priority {})", rule.name, rule.priority),
        None => "default action".to_string(),
    };
    println!(
        "{} {} → {}: {}",
        table.listener.cyan().bold(),
        path,
        matched,
        route.action
    );
    if let Some(roll) = roll {
        match table.pick(path, roll) {
            Some(target_group) => println!("  roll {} → {}", roll, target_group.green()),
            None => println!("  roll {} → {}", roll, "no target group".yellow()),
        }
    }
}

pub fn print_rollout(rollout: &Rollout) {
    println!(
        "{} {}",
        "Rollout:".cyan().bold(),
        rollout.policy().routing
    );
    println!();
    for event in rollout.history() {
        let at = format!("{:>6}", format_elapsed(event.at()));
        let line = match event {
            RolloutEvent::Shifted { weights, .. } => format!("shifted to {}", weights).normal(),
            RolloutEvent::AwaitingApproval { until, .. } => {
                format!("awaiting approval until {}", format_elapsed(*until)).yellow()
            }
            RolloutEvent::Approved { .. } => "approved".normal(),
            RolloutEvent::Succeeded { .. } => "succeeded".green().bold(),
            RolloutEvent::RolledBack { reason, .. } => {
                format!("rolled back ({}); traffic back on blue", reason).red().bold()
            }
            RolloutEvent::Stopped { reason, .. } => {
                format!("stopped ({}); weights left in place", reason).red()
            }
        };
        println!("  {}  {}", at.dimmed(), line);
    }
    println!();
    let status = match rollout.status() {
        RolloutStatus::Succeeded => "Succeeded".green().bold(),
        RolloutStatus::RolledBack(_) => "Rolled back".red().bold(),
        RolloutStatus::Stopped(_) => "Stopped".red().bold(),
        RolloutStatus::Shifting | RolloutStatus::AwaitingApproval => "In progress".yellow(),
    };
    println!("Final weights: {} ({})", rollout.weights(), status);
}

/// `mm:ss` since the deployment started
fn format_elapsed(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{}:{:02}", secs / 60, secs % 60)
}
