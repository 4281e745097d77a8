mod display;
mod file_provider;
mod workspace;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser, Subcommand};
use colored::Colorize;
use log::{debug, warn};

use vela_core::differ::{create_plan, plan_destroy};
use vela_core::graph::node_key;
use vela_core::interpreter::{ApplyResult, EffectOutcome, Interpreter};
use vela_core::plan::Plan;
use vela_core::provider::Provider;
use vela_core::resolver::Bindings;
use vela_core::resource::{Resource, ResourceId, State, Value};
use vela_core::rollout::{AlarmState, Rollout};
use vela_core::routing::RoutingTable;
use vela_state::{LockOperation, ResourceState, StateBackend, StateFile, create_backend};

use display::{
    format_effect, format_value, print_outputs, print_plan, print_rollout, print_route,
    print_routing_table, print_topology,
};
use workspace::Workspace;

const DEFAULT_FILE: &str = "main.vela";

#[derive(Parser)]
#[command(name = "vela")]
#[command(about = "Blue/green ECS deployments as code", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the descriptor without contacting any provider
    Validate {
        /// Path to .vela file
        #[arg(default_value = DEFAULT_FILE)]
        file: PathBuf,
    },
    /// Show execution plan without applying changes
    Plan {
        /// Path to .vela file
        #[arg(default_value = DEFAULT_FILE)]
        file: PathBuf,
    },
    /// Apply changes to reach the desired state
    Apply {
        /// Path to .vela file
        #[arg(default_value = DEFAULT_FILE)]
        file: PathBuf,

        /// Skip confirmation prompt
        #[arg(long)]
        auto_approve: bool,
    },
    /// Destroy every resource managed by this descriptor
    Destroy {
        /// Path to .vela file
        #[arg(default_value = DEFAULT_FILE)]
        file: PathBuf,

        /// Skip confirmation prompt
        #[arg(long)]
        auto_approve: bool,
    },
    /// Print outputs recorded by the last apply
    Output {
        /// Print only this output, unquoted
        name: Option<String>,

        /// Path to .vela file
        #[arg(long, short, default_value = DEFAULT_FILE)]
        file: PathBuf,
    },
    /// Show listener routing tables, or where a request path is routed
    Route {
        /// Request path to route (e.g., /api)
        #[arg(long)]
        path: Option<String>,

        /// Only this listener (binding name or port)
        #[arg(long)]
        listener: Option<String>,

        /// Pick the target group for a roll in 0..100
        #[arg(long, requires = "path", value_parser = clap::value_parser!(u32).range(0..100))]
        roll: Option<u32>,

        /// Path to .vela file
        #[arg(long, short, default_value = DEFAULT_FILE)]
        file: PathBuf,
    },
    /// Replay a blue/green deployment against the declared traffic-shift policy
    Rollout {
        /// Minutes into the deployment when a bound alarm fires
        #[arg(long)]
        alarm_at: Option<u64>,

        /// Alarm that fires (default: the first bound alarm)
        #[arg(long, requires = "alarm_at")]
        alarm: Option<String>,

        /// Minutes into the deployment when a stop is requested
        #[arg(long)]
        stop_at: Option<u64>,

        /// Path to .vela file
        #[arg(long, short, default_value = DEFAULT_FILE)]
        file: PathBuf,
    },
    /// Release a state lock left behind by an interrupted run
    ForceUnlock {
        lock_id: String,

        /// Path to .vela file
        #[arg(long, short, default_value = DEFAULT_FILE)]
        file: PathBuf,
    },
    /// Generate shell completions
    Completions {
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    let result = match cli.command {
        Commands::Validate { file } => run_validate(&file),
        Commands::Plan { file } => run_plan(&file).await,
        Commands::Apply { file, auto_approve } => run_apply(&file, auto_approve).await,
        Commands::Destroy { file, auto_approve } => run_destroy(&file, auto_approve).await,
        Commands::Output { name, file } => run_output(&file, name.as_deref()).await,
        Commands::Route {
            path,
            listener,
            roll,
            file,
        } => run_route(&file, path.as_deref(), listener.as_deref(), roll),
        Commands::Rollout {
            alarm_at,
            alarm,
            stop_at,
            file,
        } => run_rollout(&file, alarm_at, alarm, stop_at),
        Commands::ForceUnlock { lock_id, file } => run_force_unlock(&file, &lock_id).await,
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "vela", &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_logger(verbose: u8) {
    let default_filter = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}

fn run_validate(file: &Path) -> Result<()> {
    println!("{}", "Validating...".cyan());

    let workspace = Workspace::load(file)?;

    println!(
        "{}",
        format!(
            "✓ {} resources validated successfully.",
            workspace.resources.len()
        )
        .green()
        .bold()
    );
    for resource in &workspace.resources {
        println!("  • {}", resource.id);
    }

    if let Some(topology) = &workspace.topology {
        println!();
        print_topology(topology);
    }
    Ok(())
}

async fn open_backend(workspace: &Workspace) -> Result<Box<dyn StateBackend>> {
    let backend = create_backend(workspace.parsed.backend.as_ref())
        .await
        .context("Failed to configure state backend")?;
    backend
        .init()
        .await
        .context("Failed to initialize state backend")?;
    debug!("State at {}", backend.location());
    Ok(backend)
}

/// Run `body` while holding the state lock, releasing it either way
macro_rules! with_lock {
    ($backend:expr, $operation:expr, $body:expr) => {{
        let lock = $backend
            .acquire_lock($operation)
            .await
            .context("Failed to acquire state lock")?;
        let result = $body.await;
        let released = $backend.release_lock(&lock).await;
        let value = result?;
        released.context("Failed to release state lock")?;
        value
    }};
}

async fn run_plan(file: &Path) -> Result<()> {
    let workspace = Workspace::load(file)?;
    let backend = open_backend(&workspace).await?;
    let provider = workspace.provider().await;

    with_lock!(backend, LockOperation::Plan, async {
        let state = backend.read_state().await?.unwrap_or_default();
        let states = workspace.read_states(provider.as_ref(), &state).await?;
        let (plan, _) = build_plan(&workspace, &states, &state);
        print_plan(&plan, &workspace.parsed.dependencies);
        Ok::<_, anyhow::Error>(())
    });
    Ok(())
}

async fn run_apply(file: &Path, auto_approve: bool) -> Result<()> {
    let workspace = Workspace::load(file)?;
    let backend = open_backend(&workspace).await?;
    let provider = workspace.provider().await;

    with_lock!(
        backend,
        LockOperation::Apply,
        apply(&workspace, backend.as_ref(), provider, auto_approve)
    );
    Ok(())
}

async fn run_destroy(file: &Path, auto_approve: bool) -> Result<()> {
    let workspace = Workspace::load(file)?;
    let backend = open_backend(&workspace).await?;
    let provider = workspace.provider().await;

    with_lock!(
        backend,
        LockOperation::Destroy,
        destroy(&workspace, backend.as_ref(), provider, auto_approve)
    );
    Ok(())
}

/// Resolve references against current state and diff
fn build_plan(
    workspace: &Workspace,
    states: &HashMap<ResourceId, State>,
    state: &StateFile,
) -> (Plan, Bindings) {
    let bindings = Bindings::from_resources(&workspace.resources, states);
    let desired: Vec<Resource> = workspace
        .resources
        .iter()
        .map(|r| bindings.resolve_resource(r))
        .collect();
    let plan = create_plan(&desired, states, &state.resource_ids());
    (plan, bindings)
}

/// Drop records of resources that no longer exist and refresh the rest
fn refresh(
    state: &mut StateFile,
    states: &HashMap<ResourceId, State>,
    provider: &str,
) {
    for id in state.resource_ids() {
        match states.get(&id) {
            Some(current) if current.exists => {
                state.upsert_resource(ResourceState::from_state(current, provider));
            }
            _ => {
                warn!("{} no longer exists; dropping it from state", id);
                state.remove_resource(&id);
            }
        }
    }
}

fn record_outcomes(state: &mut StateFile, result: &ApplyResult, provider: &str) {
    for (_, outcome) in &result.outcomes {
        match outcome {
            Ok(EffectOutcome::Created { state: current })
            | Ok(EffectOutcome::Updated { state: current }) => {
                state.upsert_resource(ResourceState::from_state(current, provider));
            }
            Ok(EffectOutcome::Deleted { id }) => {
                state.remove_resource(id);
            }
            Ok(EffectOutcome::Skipped { .. }) | Err(_) => {}
        }
    }
}

async fn execute(
    provider: Box<dyn Provider>,
    plan: &Plan,
    bindings: &mut Bindings,
) -> ApplyResult {
    let interpreter = Interpreter::new(provider);
    interpreter
        .apply_with_progress(plan, bindings, |effect, outcome| match outcome {
            Ok(_) => println!("  {} {}", "✓".green(), format_effect(effect)),
            Err(e) => println!("  {} {} - {}", "✗".red(), format_effect(effect), e),
        })
        .await
}

async fn apply(
    workspace: &Workspace,
    backend: &dyn StateBackend,
    provider: Box<dyn Provider>,
    auto_approve: bool,
) -> Result<()> {
    let provider_name = provider.name();
    let mut state = backend.read_state().await?.unwrap_or_default();
    let states = workspace.read_states(provider.as_ref(), &state).await?;
    refresh(&mut state, &states, provider_name);

    let (plan, mut bindings) = build_plan(workspace, &states, &state);

    let result = if plan.is_empty() {
        println!("{}", "No changes needed.".green());
        None
    } else {
        print_plan(&plan, &workspace.parsed.dependencies);
        println!();
        if !auto_approve && !confirm("Do you want to apply these changes?")? {
            println!("{}", "Apply cancelled.".yellow());
            return Ok(());
        }

        println!("{}", "Applying changes...".cyan().bold());
        println!();
        let result = execute(provider, &plan, &mut bindings).await;
        record_outcomes(&mut state, &result, provider_name);
        Some(result)
    };

    let succeeded = result.as_ref().is_none_or(ApplyResult::is_success);
    if succeeded {
        match bindings.resolve_outputs(&workspace.parsed.outputs) {
            Ok(outputs) => state.set_outputs(&outputs),
            Err(e) => warn!("Outputs not recorded: {}", e),
        }
    }

    state.increment_serial();
    backend
        .write_state(&state)
        .await
        .context("Failed to write state")?;

    if let Some(result) = result {
        println!();
        if !result.is_success() {
            bail!(
                "Apply failed. {} succeeded, {} failed.",
                result.success_count,
                result.failure_count
            );
        }
        println!(
            "{}",
            format!("Apply complete! {} changes applied.", result.success_count)
                .green()
                .bold()
        );
    }

    if let Some(topology) = &workspace.topology {
        println!(
            "Production weights on {}: {}",
            topology.production_rule, topology.production_weights
        );
    }
    let outputs = state.output_values();
    if !outputs.is_empty() {
        println!();
        print_outputs(&outputs);
    }
    Ok(())
}

/// Declared resources in reverse dependency order, preceded by recorded
/// resources that are no longer declared
fn destroy_order(workspace: &Workspace, state: &StateFile) -> Result<Vec<ResourceId>> {
    let declared: HashSet<&ResourceId> = workspace.resources.iter().map(|r| &r.id).collect();
    let mut order: Vec<ResourceId> = state
        .resource_ids()
        .into_iter()
        .rev()
        .filter(|id| !declared.contains(id))
        .collect();

    for key in workspace.parsed.dependencies.destroy_order()? {
        if let Some(resource) = workspace.resources.iter().find(|r| node_key(r) == key) {
            order.push(resource.id.clone());
        }
    }
    Ok(order)
}

async fn destroy(
    workspace: &Workspace,
    backend: &dyn StateBackend,
    provider: Box<dyn Provider>,
    auto_approve: bool,
) -> Result<()> {
    let provider_name = provider.name();
    let mut state = backend.read_state().await?.unwrap_or_default();
    let states = workspace.read_states(provider.as_ref(), &state).await?;
    refresh(&mut state, &states, provider_name);

    let plan = plan_destroy(&destroy_order(workspace, &state)?, &states);
    if plan.is_empty() {
        println!("{}", "No resources to destroy.".green());
        state.set_outputs(&BTreeMap::new());
        state.increment_serial();
        backend.write_state(&state).await?;
        return Ok(());
    }

    println!("{}", "Destroy Plan:".red().bold());
    println!();
    for effect in plan.effects() {
        println!("  {} {}", "-".red().bold(), effect.resource_id());
    }
    println!();
    println!("Plan: {} to destroy.", plan.len().to_string().red());
    println!();

    if !auto_approve {
        println!("{}", "This action cannot be undone.".yellow());
        if !confirm("Do you really want to destroy all resources?")? {
            println!("{}", "Destroy cancelled.".yellow());
            return Ok(());
        }
    }

    println!("{}", "Destroying resources...".red().bold());
    println!();
    let result = execute(provider, &plan, &mut Bindings::new()).await;
    record_outcomes(&mut state, &result, provider_name);
    if result.is_success() {
        state.set_outputs(&BTreeMap::new());
    }

    state.increment_serial();
    backend
        .write_state(&state)
        .await
        .context("Failed to write state")?;

    println!();
    if !result.is_success() {
        bail!(
            "Destroy failed. {} succeeded, {} failed.",
            result.success_count,
            result.failure_count
        );
    }
    println!(
        "{}",
        format!(
            "Destroy complete! {} resources destroyed.",
            result.success_count
        )
        .green()
        .bold()
    );
    Ok(())
}

fn confirm(question: &str) -> Result<bool> {
    println!("{}", question.yellow().bold());
    println!("  {}", "Only 'yes' will be accepted to approve.".yellow());
    print!("\n  Enter a value: ");
    std::io::stdout().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    println!();
    Ok(input.trim() == "yes")
}

async fn run_output(file: &Path, name: Option<&str>) -> Result<()> {
    let workspace = Workspace::load(file)?;
    let backend = open_backend(&workspace).await?;
    let state = backend
        .read_state()
        .await?
        .with_context(|| format!("No state found at {}", backend.location()))?;
    let outputs = state.output_values();

    match name {
        Some(name) => {
            let value = outputs
                .get(name)
                .with_context(|| format!("Output '{}' not found", name))?;
            match value {
                Value::String(s) => println!("{}", s),
                other => println!("{}", format_value(other)),
            }
        }
        None if outputs.is_empty() => println!("{}", "No outputs recorded.".yellow()),
        None => print_outputs(&outputs),
    }
    Ok(())
}

fn run_route(
    file: &Path,
    path: Option<&str>,
    listener: Option<&str>,
    roll: Option<u32>,
) -> Result<()> {
    let workspace = Workspace::load(file)?;
    let tables = select_tables(
        RoutingTable::all_from_resources(&workspace.parsed.resources)?,
        listener,
    )?;

    for table in &tables {
        match path {
            Some(path) => print_route(table, path, roll),
            None => {
                print_routing_table(table);
                println!();
            }
        }
    }
    Ok(())
}

/// Tables matching a listener binding name or port; all when unfiltered
fn select_tables(tables: Vec<RoutingTable>, listener: Option<&str>) -> Result<Vec<RoutingTable>> {
    let Some(listener) = listener else {
        return Ok(tables);
    };
    let selected: Vec<RoutingTable> = tables
        .into_iter()
        .filter(|t| t.listener == listener || t.port.is_some_and(|p| p.to_string() == listener))
        .collect();
    if selected.is_empty() {
        bail!("No listener '{}'", listener);
    }
    Ok(selected)
}

async fn run_force_unlock(file: &Path, lock_id: &str) -> Result<()> {
    let workspace = Workspace::load(file)?;
    let backend = open_backend(&workspace).await?;
    backend
        .force_unlock(lock_id)
        .await
        .with_context(|| format!("Failed to release lock {}", lock_id))?;
    println!(
        "{}",
        format!("Lock {} released on {}.", lock_id, backend.location()).green()
    );
    Ok(())
}

fn run_rollout(
    file: &Path,
    alarm_at: Option<u64>,
    alarm: Option<String>,
    stop_at: Option<u64>,
) -> Result<()> {
    let workspace = Workspace::load(file)?;
    let topology = workspace
        .topology
        .as_ref()
        .context("No deployment group declared")?;

    print_topology(topology);
    println!();

    let rollout = simulate_rollout(
        Rollout::start(topology.policy.clone()),
        alarm_at,
        alarm,
        stop_at,
    )?;
    print_rollout(&rollout);
    Ok(())
}

enum Interruption {
    Alarm(String),
    Stop,
}

/// Play interruptions at their minute marks, then let the rollout finish
fn simulate_rollout(
    mut rollout: Rollout,
    alarm_at: Option<u64>,
    alarm: Option<String>,
    stop_at: Option<u64>,
) -> Result<Rollout> {
    let mut interruptions = Vec::new();
    if let Some(minutes) = alarm_at {
        let name = match alarm {
            Some(name) => name,
            None => rollout
                .policy()
                .alarms
                .first()
                .cloned()
                .context("No alarm is bound to the deployment group")?,
        };
        interruptions.push((minutes, Interruption::Alarm(name)));
    }
    if let Some(minutes) = stop_at {
        interruptions.push((minutes, Interruption::Stop));
    }
    interruptions.sort_by_key(|(minutes, _)| *minutes);

    for (minutes, interruption) in interruptions {
        let at = minutes
            .checked_mul(60)
            .map(Duration::from_secs)
            .with_context(|| format!("{} minutes is out of range", minutes))?;
        rollout.advance(at.saturating_sub(rollout.elapsed()));
        match interruption {
            Interruption::Alarm(name) => rollout.alarm_changed(&name, AlarmState::Alarm),
            Interruption::Stop => rollout.stop(),
        };
    }

    rollout.run_to_completion();
    Ok(rollout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_provider::FileProvider;
    use crate::workspace::schema_map;
    use tempfile::TempDir;
    use vela_core::rollout::{RollbackReason, RolloutStatus};
    use vela_core::traffic::Weights;
    use vela_state::backends::LocalBackend;

    const DESCRIPTOR: &str = include_str!("../../demos/bluegreen/main.vela");

    struct Fixture {
        _dir: TempDir,
        workspace: Workspace,
        backend: LocalBackend,
        store: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            Self {
                workspace: Workspace::from_source(DESCRIPTOR).unwrap(),
                backend: LocalBackend::with_path(dir.path().join("vela.state.json")),
                store: dir.path().join("resources.json"),
                _dir: dir,
            }
        }

        fn provider(&self) -> Box<dyn Provider> {
            Box::new(FileProvider::with_path(self.store.clone(), schema_map()))
        }

        async fn apply(&self) {
            apply(&self.workspace, &self.backend, self.provider(), true)
                .await
                .unwrap();
        }

        async fn plan(&self) -> Plan {
            let state = self.backend.read_state().await.unwrap().unwrap_or_default();
            let provider = self.provider();
            let states = self
                .workspace
                .read_states(provider.as_ref(), &state)
                .await
                .unwrap();
            build_plan(&self.workspace, &states, &state).0
        }
    }

    #[tokio::test]
    async fn apply_records_every_resource_and_outputs() {
        let fixture = Fixture::new();
        fixture.apply().await;

        let state = fixture.backend.read_state().await.unwrap().unwrap();
        assert_eq!(state.resources.len(), fixture.workspace.resources.len());
        assert!(state.resources.iter().all(|r| r.identifier.is_some()));

        let outputs = state.output_values();
        assert_eq!(
            outputs["load_balancer_dns"],
            Value::String("my-load-balancer.local.elb.amazonaws.com".to_string())
        );
        assert!(
            outputs["task_definition_arn"]
                .as_str()
                .unwrap()
                .contains("ecs_task_definition/my-task-def")
        );
    }

    #[tokio::test]
    async fn reapplying_identical_descriptor_changes_nothing() {
        let fixture = Fixture::new();
        fixture.apply().await;
        let serial = fixture.backend.read_state().await.unwrap().unwrap().serial;

        let plan = fixture.plan().await;
        assert!(plan.is_empty(), "unexpected effects: {:?}", plan.effects());

        fixture.apply().await;
        let state = fixture.backend.read_state().await.unwrap().unwrap();
        assert_eq!(state.serial, serial + 1);
        assert_eq!(state.resources.len(), fixture.workspace.resources.len());
    }

    #[tokio::test]
    async fn applied_production_rule_splits_blue_100_green_0() {
        let fixture = Fixture::new();
        fixture.apply().await;

        let state = fixture.backend.read_state().await.unwrap().unwrap();
        let rule = state
            .find_resource(&ResourceId::new("elbv2_listener_rule", "prod-listener-rule"))
            .unwrap()
            .to_state();
        let groups = rule.attributes["actions"]
            .get("forward_config")
            .and_then(|f| f.get("target_groups"))
            .and_then(Value::as_list)
            .unwrap();
        let total: i64 = groups
            .iter()
            .filter_map(|g| g.get("weight").and_then(Value::as_int))
            .sum();
        assert_eq!(total, 100);
    }

    #[tokio::test]
    async fn recorded_but_undeclared_resources_are_deleted() {
        let fixture = Fixture::new();
        fixture.apply().await;

        let old = Resource::new("ecs_cluster", "old-cluster")
            .with_attribute("name", Value::String("old-cluster".to_string()));
        let created = fixture.provider().create(&old).await.unwrap();
        let mut state = fixture.backend.read_state().await.unwrap().unwrap();
        state.upsert_resource(ResourceState::from_state(&created, "file"));
        fixture.backend.write_state(&state).await.unwrap();

        let plan = fixture.plan().await;
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.effects()[0].resource_id(), &old.id);

        fixture.apply().await;
        let state = fixture.backend.read_state().await.unwrap().unwrap();
        assert!(state.find_resource(&old.id).is_none());
    }

    #[tokio::test]
    async fn records_of_vanished_resources_are_dropped() {
        let fixture = Fixture::new();
        fixture.apply().await;

        let mut state = fixture.backend.read_state().await.unwrap().unwrap();
        state.upsert_resource(
            ResourceState::new("ecs_cluster", "gone", "file")
                .with_identifier("file:ecs_cluster/gone"),
        );
        fixture.backend.write_state(&state).await.unwrap();

        assert!(fixture.plan().await.is_empty());
        fixture.apply().await;
        let state = fixture.backend.read_state().await.unwrap().unwrap();
        assert!(
            state
                .find_resource(&ResourceId::new("ecs_cluster", "gone"))
                .is_none()
        );
    }

    #[tokio::test]
    async fn destroy_removes_everything_dependents_first() {
        let fixture = Fixture::new();
        fixture.apply().await;

        let state = fixture.backend.read_state().await.unwrap().unwrap();
        let order = destroy_order(&fixture.workspace, &state).unwrap();
        let position = |resource_type: &str| {
            order
                .iter()
                .position(|id| id.resource_type == resource_type)
                .unwrap()
        };
        assert!(position("codedeploy_deployment_group") < position("ecs_service"));
        assert!(position("elbv2_listener_rule") < position("elbv2_listener"));
        assert!(position("ec2_subnet") < position("ec2_vpc"));

        destroy(&fixture.workspace, &fixture.backend, fixture.provider(), true)
            .await
            .unwrap();

        let state = fixture.backend.read_state().await.unwrap().unwrap();
        assert!(state.resources.is_empty());
        assert!(state.outputs.is_empty());
    }

    #[test]
    fn test_listener_routes_test_path_to_green_only() {
        let workspace = Workspace::from_source(DESCRIPTOR).unwrap();
        let tables = RoutingTable::all_from_resources(&workspace.parsed.resources).unwrap();
        let test = select_tables(tables.clone(), Some("8080")).unwrap();
        assert_eq!(test.len(), 1);
        assert_eq!(test[0].split("/test"), vec![("green-tg", 100)]);

        let prod = select_tables(tables, Some("prod_listener")).unwrap();
        assert_eq!(prod[0].pick("/api", 0), Some("blue-tg"));
        assert_eq!(prod[0].pick("/api", 99), Some("blue-tg"));
        assert!(prod[0].route("/").rule.is_none());
    }

    #[test]
    fn unknown_listener_is_an_error() {
        let workspace = Workspace::from_source(DESCRIPTOR).unwrap();
        let tables = RoutingTable::all_from_resources(&workspace.parsed.resources).unwrap();
        assert!(select_tables(tables, Some("9090")).is_err());
    }

    #[test]
    fn rollout_without_interruptions_succeeds_after_approval_wait() {
        let workspace = Workspace::from_source(DESCRIPTOR).unwrap();
        let policy = workspace.topology.unwrap().policy;
        let rollout = simulate_rollout(Rollout::start(policy), None, None, None).unwrap();

        assert_eq!(rollout.status(), &RolloutStatus::Succeeded);
        assert_eq!(rollout.weights(), Weights::all_green());
        // Four more shifts after the first, then ten minutes of approval wait
        assert_eq!(rollout.elapsed(), Duration::from_secs(14 * 60));
    }

    #[test]
    fn alarm_during_shift_rolls_back_to_blue() {
        let workspace = Workspace::from_source(DESCRIPTOR).unwrap();
        let policy = workspace.topology.unwrap().policy;
        let rollout = simulate_rollout(Rollout::start(policy), Some(2), None, None).unwrap();

        assert_eq!(
            rollout.status(),
            &RolloutStatus::RolledBack(RollbackReason::AlarmFired("my-alarm".to_string()))
        );
        assert_eq!(rollout.weights(), Weights::all_blue());
    }

    #[test]
    fn stop_request_is_honored() {
        let workspace = Workspace::from_source(DESCRIPTOR).unwrap();
        let policy = workspace.topology.unwrap().policy;
        let rollout = simulate_rollout(Rollout::start(policy), None, None, Some(1)).unwrap();

        assert!(matches!(
            rollout.status(),
            RolloutStatus::RolledBack(RollbackReason::StopRequested)
        ));
        assert_eq!(rollout.weights(), Weights::all_blue());
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn out_of_range_minutes_are_an_error() {
        let workspace = Workspace::from_source(DESCRIPTOR).unwrap();
        let policy = workspace.topology.unwrap().policy;

        let err = simulate_rollout(Rollout::start(policy.clone()), Some(u64::MAX), None, None)
            .err()
            .unwrap();
        assert!(err.to_string().contains("out of range"), "{}", err);
        assert!(simulate_rollout(Rollout::start(policy), None, None, Some(u64::MAX / 2)).is_err());
    }
}
