//! Parser - Parse .vela descriptors
//!
//! Convert the descriptor DSL to resources using pest

use pest::Parser;
use pest::iterators::{Pair, Pairs};
use pest_derive::Parser;
use std::collections::{HashMap, HashSet};
use std::env;

use crate::graph::DependencyGraph;
use crate::resource::{Resource, ResourceId, Value};

#[derive(Parser)]
#[grammar = "parser/vela.pest"]
struct VelaParser;

/// Parse error
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Syntax error: {0}")]
    Syntax(#[from] Box<pest::error::Error<Rule>>),

    #[error("Invalid expression at line {line}: {message}")]
    InvalidExpression { line: usize, message: String },

    #[error("Undefined variable: {0}")]
    UndefinedVariable(String),

    #[error("Environment variable not set: {0}")]
    EnvVarNotSet(String),

    #[error("Invalid resource type: {0}")]
    InvalidResourceType(String),

    #[error("Duplicate binding: {0}")]
    DuplicateBinding(String),

    #[error("Duplicate resource: {0}")]
    DuplicateResource(ResourceId),
}

/// Type expression for output parameters
#[derive(Debug, Clone, PartialEq)]
pub enum TypeExpr {
    String,
    Bool,
    Int,
    /// CIDR block (e.g., "10.0.0.0/16")
    Cidr,
    List(Box<TypeExpr>),
    Map(Box<TypeExpr>),
}

impl TypeExpr {
    /// Check a resolved value against this type
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (TypeExpr::String, Value::String(_)) => true,
            (TypeExpr::Int, v) => v.as_int().is_some(),
            (TypeExpr::Bool, Value::Bool(_)) => true,
            (TypeExpr::Cidr, Value::String(s)) => crate::schema::validate_cidr(s).is_ok(),
            (TypeExpr::List(inner), Value::List(items)) => items.iter().all(|v| inner.accepts(v)),
            (TypeExpr::Map(inner), Value::Map(map)) => map.values().all(|v| inner.accepts(v)),
            _ => false,
        }
    }
}

impl std::fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeExpr::String => write!(f, "string"),
            TypeExpr::Bool => write!(f, "bool"),
            TypeExpr::Int => write!(f, "int"),
            TypeExpr::Cidr => write!(f, "cidr"),
            TypeExpr::List(inner) => write!(f, "list({})", inner),
            TypeExpr::Map(inner) => write!(f, "map({})", inner),
        }
    }
}

/// Output parameter definition
#[derive(Debug, Clone)]
pub struct OutputParameter {
    pub name: String,
    pub type_expr: TypeExpr,
    pub value: Value,
}

/// Provider configuration
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub name: String,
    pub attributes: HashMap<String, Value>,
}

/// Backend configuration for state storage
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Backend type (e.g., "s3", "local")
    pub backend_type: String,
    /// Backend-specific attributes
    pub attributes: HashMap<String, Value>,
}

impl BackendConfig {
    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.attributes.get(key).and_then(Value::as_bool)
    }

    pub fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.get_bool(key).unwrap_or(default)
    }
}

/// Parse result
#[derive(Debug, Clone)]
pub struct ParsedFile {
    pub providers: Vec<ProviderConfig>,
    pub resources: Vec<Resource>,
    pub variables: HashMap<String, Value>,
    pub outputs: Vec<OutputParameter>,
    /// Backend configuration for state storage
    pub backend: Option<BackendConfig>,
    /// Dependencies between resources, captured before references are resolved
    pub dependencies: DependencyGraph,
}

impl ParsedFile {
    /// Find a resource by its binding name
    pub fn find_provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.name == name)
    }
}

/// Parse context (variable scope)
#[derive(Default)]
struct ParseContext {
    variables: HashMap<String, Value>,
    resource_bindings: HashSet<String>,
}

impl ParseContext {
    fn get_variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    fn is_resource_binding(&self, name: &str) -> bool {
        self.resource_bindings.contains(name)
    }

    fn is_bound(&self, name: &str) -> bool {
        self.variables.contains_key(name) || self.is_resource_binding(name)
    }
}

fn line_of(pair: &Pair<Rule>) -> usize {
    pair.as_span().start_pos().line_col().0
}

fn next_pair<'i>(inner: &mut Pairs<'i, Rule>, line: usize) -> Result<Pair<'i, Rule>, ParseError> {
    inner.next().ok_or_else(|| ParseError::InvalidExpression {
        line,
        message: "unexpected end of input".to_string(),
    })
}

/// Parse a .vela descriptor
pub fn parse(input: &str) -> Result<ParsedFile, ParseError> {
    let pairs = VelaParser::parse(Rule::file, input).map_err(Box::new)?;

    let mut ctx = ParseContext::default();
    let mut providers = Vec::new();
    let mut resources: Vec<Resource> = Vec::new();
    let mut outputs = Vec::new();
    let mut backend = None;

    let statements = pairs
        .flat_map(|file| file.into_inner())
        .filter(|p| p.as_rule() == Rule::statement)
        .flat_map(|p| p.into_inner());

    for stmt in statements {
        let resource = match stmt.as_rule() {
            Rule::backend_block => {
                let (backend_type, attributes) = parse_named_block(stmt, &ctx)?;
                backend = Some(BackendConfig {
                    backend_type,
                    attributes,
                });
                None
            }
            Rule::provider_block => {
                let (name, attributes) = parse_named_block(stmt, &ctx)?;
                providers.push(ProviderConfig { name, attributes });
                None
            }
            Rule::output_block => {
                outputs.extend(parse_output_block(stmt, &ctx)?);
                None
            }
            Rule::let_binding => parse_let_binding(stmt, &mut ctx)?,
            Rule::anonymous_resource => Some(parse_resource(stmt, &ctx, None)?),
            _ => None,
        };

        if let Some(resource) = resource {
            if resources.iter().any(|r| r.id == resource.id) {
                return Err(ParseError::DuplicateResource(resource.id));
            }
            resources.push(resource);
        }
    }

    let dependencies = DependencyGraph::from_resources(&resources);

    Ok(ParsedFile {
        providers,
        resources,
        variables: ctx.variables,
        outputs,
        backend,
        dependencies,
    })
}

/// `backend <type> { ... }` and `provider <name> { ... }`
fn parse_named_block(
    pair: Pair<Rule>,
    ctx: &ParseContext,
) -> Result<(String, HashMap<String, Value>), ParseError> {
    let line = line_of(&pair);
    let mut inner = pair
        .into_inner()
        .filter(|p| !matches!(p.as_rule(), Rule::kw_backend | Rule::kw_provider));
    let name = inner
        .next()
        .ok_or_else(|| ParseError::InvalidExpression {
            line,
            message: "block is missing a name".to_string(),
        })?
        .as_str()
        .to_string();

    let mut attributes = HashMap::new();
    for attr_pair in inner {
        if attr_pair.as_rule() == Rule::attribute {
            let (key, value) = parse_attribute(attr_pair, ctx)?;
            attributes.insert(key, value);
        }
    }
    Ok((name, attributes))
}

fn parse_output_block(
    pair: Pair<Rule>,
    ctx: &ParseContext,
) -> Result<Vec<OutputParameter>, ParseError> {
    let mut outputs = Vec::new();
    for param in pair.into_inner().filter(|p| p.as_rule() == Rule::output_param) {
        let line = line_of(&param);
        let mut inner = param.into_inner();
        let name = next_pair(&mut inner, line)?.as_str().to_string();
        let type_expr = parse_type_expr(next_pair(&mut inner, line)?)?;
        let value = parse_expression(next_pair(&mut inner, line)?, ctx)?;
        outputs.push(OutputParameter {
            name,
            type_expr,
            value,
        });
    }
    Ok(outputs)
}

fn parse_type_expr(pair: Pair<Rule>) -> Result<TypeExpr, ParseError> {
    let line = line_of(&pair);
    let inner = next_pair(&mut pair.into_inner(), line)?;
    match inner.as_rule() {
        Rule::type_simple => match inner.as_str() {
            "string" => Ok(TypeExpr::String),
            "int" => Ok(TypeExpr::Int),
            "bool" => Ok(TypeExpr::Bool),
            "cidr" => Ok(TypeExpr::Cidr),
            other => Err(ParseError::InvalidExpression {
                line,
                message: format!("unknown type '{}'", other),
            }),
        },
        Rule::type_generic => {
            let mut generic = inner.into_inner();
            let container = next_pair(&mut generic, line)?.as_str().to_string();
            let element = Box::new(parse_type_expr(next_pair(&mut generic, line)?)?);
            match container.as_str() {
                "list" => Ok(TypeExpr::List(element)),
                _ => Ok(TypeExpr::Map(element)),
            }
        }
        _ => Err(ParseError::InvalidExpression {
            line,
            message: format!("unexpected type expression '{}'", inner.as_str()),
        }),
    }
}

fn parse_let_binding(
    pair: Pair<Rule>,
    ctx: &mut ParseContext,
) -> Result<Option<Resource>, ParseError> {
    let line = line_of(&pair);
    let mut inner = pair.into_inner().filter(|p| p.as_rule() != Rule::kw_let);
    let name = inner
        .next()
        .ok_or_else(|| ParseError::InvalidExpression {
            line,
            message: "let binding is missing a name".to_string(),
        })?
        .as_str()
        .to_string();
    let body = inner.next().ok_or_else(|| ParseError::InvalidExpression {
        line,
        message: format!("let binding '{}' has no value", name),
    })?;

    if ctx.is_bound(&name) {
        return Err(ParseError::DuplicateBinding(name));
    }

    if body.as_rule() == Rule::resource_expr {
        let resource = parse_resource(body, ctx, Some(&name))?;
        ctx.resource_bindings.insert(name);
        Ok(Some(resource))
    } else {
        let value = parse_expression(body, ctx)?;
        ctx.variables.insert(name, value);
        Ok(None)
    }
}

/// Parse `provider.type { ... }`, bound or anonymous
fn parse_resource(
    pair: Pair<Rule>,
    ctx: &ParseContext,
    binding_name: Option<&str>,
) -> Result<Resource, ParseError> {
    let line = line_of(&pair);
    let mut inner = pair.into_inner();
    let namespaced_type = next_pair(&mut inner, line)?.as_str().to_string();

    // awscc.elbv2_listener -> provider "awscc", type "elbv2_listener"
    let (provider, resource_type) = namespaced_type
        .split_once('.')
        .ok_or_else(|| ParseError::InvalidResourceType(namespaced_type.clone()))?;

    let mut attributes = parse_block_contents(inner, ctx, true)?;

    let resource_name = match attributes.get("name") {
        Some(Value::String(s)) => s.clone(),
        _ => {
            let message = match binding_name {
                Some(binding) => format!("Resource bound to '{}' must have a 'name' attribute", binding),
                None => format!("Resource '{}' must have a 'name' attribute", namespaced_type),
            };
            return Err(ParseError::InvalidExpression { line, message });
        }
    };

    attributes.insert("_provider".to_string(), Value::String(provider.to_string()));
    attributes.insert("_type".to_string(), Value::String(namespaced_type.clone()));
    if let Some(binding) = binding_name {
        attributes.insert("_binding".to_string(), Value::String(binding.to_string()));
    }

    Ok(Resource {
        id: ResourceId::new(resource_type, resource_name),
        attributes,
    })
}

/// Parse block contents (attributes and nested blocks).
/// Nested blocks with the same name are collected into a list.
fn parse_block_contents(
    pairs: Pairs<Rule>,
    ctx: &ParseContext,
    top_level: bool,
) -> Result<HashMap<String, Value>, ParseError> {
    let mut attributes: HashMap<String, Value> = HashMap::new();
    let mut nested_blocks: Vec<(String, Vec<Value>)> = Vec::new();

    for content_pair in pairs {
        let line = line_of(&content_pair);
        let inner = match content_pair.as_rule() {
            Rule::block_content => next_pair(&mut content_pair.into_inner(), line)?,
            _ => content_pair,
        };
        match inner.as_rule() {
            Rule::attribute => {
                let mut attr_inner = inner.into_inner();
                let key = next_pair(&mut attr_inner, line)?.as_str().to_string();
                let expr = next_pair(&mut attr_inner, line)?;
                match key.as_str() {
                    "depends_on" if top_level => {
                        let targets = parse_name_list(expr)?;
                        for target in &targets {
                            if !ctx.is_resource_binding(target) {
                                return Err(ParseError::UndefinedVariable(target.clone()));
                            }
                        }
                        attributes.insert("_depends_on".to_string(), names_to_value(targets));
                    }
                    "ignore_changes" if top_level => {
                        let keys = parse_name_list(expr)?;
                        attributes.insert("_ignore_changes".to_string(), names_to_value(keys));
                    }
                    _ => {
                        attributes.insert(key, parse_expression(expr, ctx)?);
                    }
                }
            }
            Rule::nested_block => {
                let mut block_inner = inner.into_inner();
                let block_name = next_pair(&mut block_inner, line)?.as_str().to_string();
                let block = Value::Map(parse_block_contents(block_inner, ctx, false)?);
                match nested_blocks.iter_mut().find(|(name, _)| *name == block_name) {
                    Some((_, blocks)) => blocks.push(block),
                    None => nested_blocks.push((block_name, vec![block])),
                }
            }
            _ => {}
        }
    }

    for (name, blocks) in nested_blocks {
        attributes.insert(name, Value::List(blocks));
    }

    Ok(attributes)
}

/// `[a, b]` or `["a", "b"]` as plain names, without variable lookup
fn parse_name_list(expr: Pair<Rule>) -> Result<Vec<String>, ParseError> {
    let line = line_of(&expr);
    let list = next_pair(&mut expr.into_inner(), line)?;
    if list.as_rule() != Rule::list {
        return Err(ParseError::InvalidExpression {
            line,
            message: format!("expected a list, got '{}'", list.as_str()),
        });
    }
    let mut names = Vec::new();
    for item in list.into_inner() {
        let item = next_pair(&mut item.into_inner(), line)?;
        match item.as_rule() {
            Rule::reference => names.push(item.as_str().to_string()),
            Rule::string => names.push(parse_string(item)),
            _ => {
                return Err(ParseError::InvalidExpression {
                    line,
                    message: format!("expected a name, got '{}'", item.as_str()),
                });
            }
        }
    }
    Ok(names)
}

fn names_to_value(names: Vec<String>) -> Value {
    Value::List(names.into_iter().map(Value::String).collect())
}

fn parse_attribute(pair: Pair<Rule>, ctx: &ParseContext) -> Result<(String, Value), ParseError> {
    let line = line_of(&pair);
    let mut inner = pair.into_inner();
    let key = next_pair(&mut inner, line)?.as_str().to_string();
    let value = parse_expression(next_pair(&mut inner, line)?, ctx)?;
    Ok((key, value))
}

fn parse_expression(pair: Pair<Rule>, ctx: &ParseContext) -> Result<Value, ParseError> {
    let line = line_of(&pair);
    let inner = match pair.as_rule() {
        Rule::expression => next_pair(&mut pair.into_inner(), line)?,
        _ => pair,
    };

    match inner.as_rule() {
        Rule::env_var => {
            let name = parse_string(next_pair(&mut inner.into_inner(), line)?);
            env::var(&name).map(Value::String).map_err(|_| ParseError::EnvVarNotSet(name))
        }
        Rule::list => {
            let items = inner
                .into_inner()
                .map(|item| parse_expression(item, ctx))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::List(items))
        }
        Rule::map => {
            let mut map = HashMap::new();
            for entry in inner.into_inner() {
                let mut entry_inner = entry.into_inner();
                let key_pair = next_pair(&mut entry_inner, line)?;
                let key = match key_pair.as_rule() {
                    Rule::string => parse_string(key_pair),
                    _ => key_pair.as_str().to_string(),
                };
                let value = parse_expression(next_pair(&mut entry_inner, line)?, ctx)?;
                map.insert(key, value);
            }
            Ok(Value::Map(map))
        }
        Rule::boolean => Ok(Value::Bool(inner.as_str() == "true")),
        Rule::number => inner
            .as_str()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|e| ParseError::InvalidExpression {
                line,
                message: format!("invalid number '{}': {}", inner.as_str(), e),
            }),
        Rule::string => Ok(Value::String(parse_string(inner))),
        Rule::reference => parse_reference(inner.as_str(), line, ctx),
        _ => Err(ParseError::InvalidExpression {
            line,
            message: format!("unexpected expression '{}'", inner.as_str()),
        }),
    }
}

/// Reference semantics:
/// - `name`: a variable bound with `let`
/// - `binding.attr`: an attribute of a bound resource (may be declared later)
/// - `a.b.c`: a namespaced identifier kept as a string
fn parse_reference(text: &str, line: usize, ctx: &ParseContext) -> Result<Value, ParseError> {
    let parts: Vec<&str> = text.split('.').collect();
    match parts.as_slice() {
        [name] => {
            if ctx.is_resource_binding(name) {
                return Err(ParseError::InvalidExpression {
                    line,
                    message: format!(
                        "'{}' is a resource; reference one of its attributes instead",
                        name
                    ),
                });
            }
            ctx.get_variable(name)
                .cloned()
                .ok_or_else(|| ParseError::UndefinedVariable(name.to_string()))
        }
        [binding, attr] => {
            if ctx.get_variable(binding).is_some() {
                return Err(ParseError::InvalidExpression {
                    line,
                    message: format!("'{}' is not a resource and has no attribute '{}'", binding, attr),
                });
            }
            Ok(Value::ResourceRef(binding.to_string(), attr.to_string()))
        }
        _ => Ok(Value::String(text.to_string())),
    }
}

fn parse_string(pair: Pair<Rule>) -> String {
    let s = pair.as_str();
    let inner = &s[1..s.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Resolve resource references in a ParsedFile.
///
/// References to attributes declared in the descriptor are replaced by the
/// declared value. References to attributes known only after creation
/// (ARNs, DNS names) stay as `ResourceRef` and are resolved at apply time.
pub fn resolve_resource_refs(parsed: &mut ParsedFile) -> Result<(), ParseError> {
    let binding_map: HashMap<String, HashMap<String, Value>> = parsed
        .resources
        .iter()
        .filter_map(|r| r.binding().map(|b| (b.to_string(), r.attributes.clone())))
        .collect();

    for resource in &mut parsed.resources {
        let mut resolved_attrs = HashMap::new();
        for (key, value) in &resource.attributes {
            let resolved = resolve_value(value, &binding_map, &mut Vec::new())?;
            resolved_attrs.insert(key.clone(), resolved);
        }
        resource.attributes = resolved_attrs;
    }

    for output in &mut parsed.outputs {
        output.value = resolve_value(&output.value, &binding_map, &mut Vec::new())?;
    }

    Ok(())
}

fn resolve_value(
    value: &Value,
    binding_map: &HashMap<String, HashMap<String, Value>>,
    visiting: &mut Vec<(String, String)>,
) -> Result<Value, ParseError> {
    match value {
        Value::ResourceRef(binding_name, attr_name) => {
            let attributes = binding_map.get(binding_name).ok_or_else(|| {
                ParseError::UndefinedVariable(format!("{}.{}", binding_name, attr_name))
            })?;
            let key = (binding_name.clone(), attr_name.clone());
            match attributes.get(attr_name) {
                // Cyclic references are left for the dependency graph to report
                Some(attr_value) if !visiting.contains(&key) => {
                    visiting.push(key);
                    let resolved = resolve_value(attr_value, binding_map, visiting);
                    visiting.pop();
                    resolved
                }
                _ => Ok(value.clone()),
            }
        }
        Value::List(items) => Ok(Value::List(
            items
                .iter()
                .map(|item| resolve_value(item, binding_map, visiting))
                .collect::<Result<_, _>>()?,
        )),
        Value::Map(map) => {
            let mut resolved = HashMap::new();
            for (k, v) in map {
                resolved.insert(k.clone(), resolve_value(v, binding_map, visiting)?);
            }
            Ok(Value::Map(resolved))
        }
        _ => Ok(value.clone()),
    }
}

/// Parse a .vela descriptor and resolve resource references
pub fn parse_and_resolve(input: &str) -> Result<ParsedFile, ParseError> {
    let mut parsed = parse(input)?;
    resolve_resource_refs(&mut parsed)?;
    Ok(parsed)
}
