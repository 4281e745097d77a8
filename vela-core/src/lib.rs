//! Vela Core
//!
//! Desired-state engine for infrastructure descriptors, with a model of
//! blue/green ECS deployments: listener routing, traffic shifting and rollback

pub mod differ;
pub mod effect;
pub mod graph;
pub mod interpreter;
pub mod parser;
pub mod plan;
pub mod provider;
pub mod resolver;
pub mod resource;
pub mod rollout;
pub mod routing;
pub mod schema;
pub mod topology;
pub mod traffic;
