//! Traffic - Traffic-shift policy of a blue/green deployment
//!
//! A deployment config describes how production traffic moves from the blue
//! target group to the green one. `schedule()` expands it into the sequence
//! of weight changes the deployment orchestrator performs.

use std::fmt;
use std::time::Duration;

use crate::resource::{Resource, Value};

pub const DEPLOYMENT_CONFIG_TYPE: &str = "codedeploy_deployment_config";

const MINUTE: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PolicyError {
    #[error("Weights must sum to 100, got blue {blue} + green {green}")]
    InvalidWeights { blue: u32, green: u32 },

    #[error("Traffic percentage must be within 1..=99, got {0}")]
    InvalidPercentage(i64),

    #[error("Traffic shift interval must be at least 1 minute, got {0}")]
    InvalidInterval(i64),

    #[error("Unknown deployment config: {0}")]
    UnknownConfig(String),

    #[error("Deployment config '{config}': {message}")]
    InvalidConfig { config: String, message: String },
}

/// Production traffic split between the two target groups
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Weights {
    blue: u32,
    green: u32,
}

impl Weights {
    pub fn new(blue: u32, green: u32) -> Result<Self, PolicyError> {
        if blue.checked_add(green) != Some(100) {
            return Err(PolicyError::InvalidWeights { blue, green });
        }
        Ok(Self { blue, green })
    }

    /// Weights with `green` percent on the green target group
    pub fn green_share(green: u32) -> Result<Self, PolicyError> {
        Self::new(100u32.saturating_sub(green), green)
    }

    pub const fn all_blue() -> Self {
        Self {
            blue: 100,
            green: 0,
        }
    }

    pub const fn all_green() -> Self {
        Self {
            blue: 0,
            green: 100,
        }
    }

    pub fn blue(&self) -> u32 {
        self.blue
    }

    pub fn green(&self) -> u32 {
        self.green
    }
}

impl fmt::Display for Weights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "blue {}% / green {}%", self.blue, self.green)
    }
}

/// One weight change, `at` after the deployment starts shifting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShiftStep {
    pub at: Duration,
    pub weights: Weights,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrafficRouting {
    AllAtOnce,
    TimeBasedLinear { interval: Duration, percentage: u32 },
    TimeBasedCanary { interval: Duration, percentage: u32 },
}

impl TrafficRouting {
    /// Predefined ECS deployment configs
    pub fn builtin(name: &str) -> Option<Self> {
        let linear = |minutes, percentage| TrafficRouting::TimeBasedLinear {
            interval: MINUTE * minutes,
            percentage,
        };
        let canary = |minutes, percentage| TrafficRouting::TimeBasedCanary {
            interval: MINUTE * minutes,
            percentage,
        };
        match name {
            "CodeDeployDefault.ECSAllAtOnce" => Some(TrafficRouting::AllAtOnce),
            "CodeDeployDefault.ECSLinear10PercentEvery1Minutes" => Some(linear(1, 10)),
            "CodeDeployDefault.ECSLinear10PercentEvery3Minutes" => Some(linear(3, 10)),
            "CodeDeployDefault.ECSCanary10Percent5Minutes" => Some(canary(5, 10)),
            "CodeDeployDefault.ECSCanary10Percent15Minutes" => Some(canary(15, 10)),
            _ => None,
        }
    }

    /// Read the `traffic_routing_config` of a deployment config resource
    pub fn from_resource(resource: &Resource) -> Result<Self, PolicyError> {
        let config = resource.id.name.clone();
        let invalid = |message: String| PolicyError::InvalidConfig {
            config: config.clone(),
            message,
        };

        if let Some(platform) = resource.attributes.get("compute_platform").and_then(Value::as_str)
            && platform != "ECS"
        {
            return Err(invalid(format!(
                "compute platform '{}' cannot shift ECS traffic",
                platform
            )));
        }

        let routing = resource
            .attributes
            .get("traffic_routing_config")
            .ok_or_else(|| invalid("missing traffic_routing_config".to_string()))?;
        let routing_type = routing
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("traffic_routing_config has no type".to_string()))?;

        let read = |block: &str, interval_key: &str, percentage_key: &str| {
            let block = routing
                .get(block)
                .ok_or_else(|| invalid(format!("{} requires a {} block", routing_type, block)))?;
            let interval = block
                .get(interval_key)
                .and_then(Value::as_int)
                .ok_or_else(|| invalid(format!("missing {}", interval_key)))?;
            let percentage = block
                .get(percentage_key)
                .and_then(Value::as_int)
                .ok_or_else(|| invalid(format!("missing {}", percentage_key)))?;
            Ok::<_, PolicyError>((interval, percentage))
        };

        let routing = match routing_type {
            "AllAtOnce" => TrafficRouting::AllAtOnce,
            "TimeBasedLinear" => {
                let (interval, percentage) =
                    read("time_based_linear", "linear_interval", "linear_percentage")?;
                TrafficRouting::TimeBasedLinear {
                    interval: minutes(interval)?,
                    percentage: percent(percentage)?,
                }
            }
            "TimeBasedCanary" => {
                let (interval, percentage) =
                    read("time_based_canary", "canary_interval", "canary_percentage")?;
                TrafficRouting::TimeBasedCanary {
                    interval: minutes(interval)?,
                    percentage: percent(percentage)?,
                }
            }
            other => return Err(invalid(format!("unknown traffic routing type '{}'", other))),
        };
        routing.validate()?;
        Ok(routing)
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        match self {
            TrafficRouting::AllAtOnce => Ok(()),
            TrafficRouting::TimeBasedLinear {
                interval,
                percentage,
            }
            | TrafficRouting::TimeBasedCanary {
                interval,
                percentage,
            } => {
                if !(1..=99).contains(percentage) {
                    return Err(PolicyError::InvalidPercentage(i64::from(*percentage)));
                }
                if *interval < MINUTE {
                    return Err(PolicyError::InvalidInterval(
                        (interval.as_secs() / 60) as i64,
                    ));
                }
                Ok(())
            }
        }
    }

    /// Weight changes in order; the last step always sends all traffic to green
    pub fn schedule(&self) -> Vec<ShiftStep> {
        match *self {
            TrafficRouting::AllAtOnce => vec![ShiftStep {
                at: Duration::ZERO,
                weights: Weights::all_green(),
            }],
            TrafficRouting::TimeBasedLinear {
                interval,
                percentage,
            } => {
                let percentage = percentage.clamp(1, 100);
                let mut steps = Vec::new();
                let mut k = 1u32;
                loop {
                    let green = (k * percentage).min(100);
                    steps.push(ShiftStep {
                        at: interval * (k - 1),
                        weights: Weights {
                            blue: 100 - green,
                            green,
                        },
                    });
                    if green == 100 {
                        break steps;
                    }
                    k += 1;
                }
            }
            TrafficRouting::TimeBasedCanary {
                interval,
                percentage,
            } => {
                let percentage = percentage.min(100);
                vec![
                    ShiftStep {
                        at: Duration::ZERO,
                        weights: Weights {
                            blue: 100 - percentage,
                            green: percentage,
                        },
                    },
                    ShiftStep {
                        at: interval,
                        weights: Weights::all_green(),
                    },
                ]
            }
        }
    }

    /// Time from the first shift to all traffic on green
    pub fn shift_duration(&self) -> Duration {
        self.schedule().last().map_or(Duration::ZERO, |s| s.at)
    }
}

impl fmt::Display for TrafficRouting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrafficRouting::AllAtOnce => write!(f, "all at once"),
            TrafficRouting::TimeBasedLinear {
                interval,
                percentage,
            } => write!(
                f,
                "linear {}% every {}",
                percentage,
                format_minutes(*interval)
            ),
            TrafficRouting::TimeBasedCanary {
                interval,
                percentage,
            } => write!(
                f,
                "canary {}% then the rest after {}",
                percentage,
                format_minutes(*interval)
            ),
        }
    }
}

pub fn format_minutes(duration: Duration) -> String {
    match duration.as_secs() / 60 {
        1 => "1 minute".to_string(),
        n => format!("{} minutes", n),
    }
}

fn minutes(value: i64) -> Result<Duration, PolicyError> {
    u32::try_from(value)
        .ok()
        .filter(|m| *m >= 1)
        .map(|m| MINUTE * m)
        .ok_or(PolicyError::InvalidInterval(value))
}

fn percent(value: i64) -> Result<u32, PolicyError> {
    u32::try_from(value)
        .ok()
        .filter(|p| (1..=99).contains(p))
        .ok_or(PolicyError::InvalidPercentage(value))
}
