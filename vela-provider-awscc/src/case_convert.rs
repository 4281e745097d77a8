//! Case conversion between Vela DSL values and CloudFormation documents
//!
//! Vela uses snake_case keys inside nested maps and blocks (e.g.,
//! `fixed_response_config = { status_code = "404" }`); CloudFormation uses
//! PascalCase (`FixedResponseConfig.StatusCode`). Top-level attributes map
//! through the schema's `provider_name` instead.

use std::collections::HashMap;

use heck::{ToPascalCase, ToSnakeCase};
use serde_json::json;
use vela_core::resource::Value;

/// Nested property names that do not follow plain PascalCase
const OVERRIDES: &[(&str, &str)] = &[
    ("ecs_services", "ECSServices"),
    ("dns_name", "DNSName"),
    ("canonical_hosted_zone_id", "CanonicalHostedZoneID"),
];

/// Convert a snake_case key to its CloudFormation property name
/// e.g., "target_group_arn" -> "TargetGroupArn"
pub fn to_property_name(key: &str) -> String {
    OVERRIDES
        .iter()
        .find(|(snake, _)| *snake == key)
        .map(|(_, pascal)| pascal.to_string())
        .unwrap_or_else(|| key.to_pascal_case())
}

/// Convert a CloudFormation property name to a snake_case key
/// e.g., "ECSServices" -> "ecs_services"
pub fn to_attribute_name(property: &str) -> String {
    OVERRIDES
        .iter()
        .find(|(_, pascal)| *pascal == property)
        .map(|(snake, _)| snake.to_string())
        .unwrap_or_else(|| property.to_snake_case())
}

/// Convert a DSL value to JSON, renaming nested map keys.
/// Unresolved references have no JSON form and yield None.
pub fn value_to_json(value: &Value) -> Option<serde_json::Value> {
    match value {
        Value::String(s) => Some(json!(s)),
        Value::Bool(b) => Some(json!(b)),
        Value::Int(i) => Some(json!(i)),
        Value::List(items) => items
            .iter()
            .map(value_to_json)
            .collect::<Option<Vec<_>>>()
            .map(serde_json::Value::Array),
        Value::Map(map) => {
            let mut object = serde_json::Map::new();
            for (key, v) in map {
                object.insert(to_property_name(key), value_to_json(v)?);
            }
            Some(serde_json::Value::Object(object))
        }
        Value::ResourceRef(_, _) => None,
    }
}

/// Convert JSON to a DSL value, renaming object keys to snake_case
pub fn json_to_value(json: &serde_json::Value) -> Option<Value> {
    match json {
        serde_json::Value::Object(object) => {
            let map: HashMap<String, Value> = object
                .iter()
                .filter_map(|(k, v)| json_to_value(v).map(|v| (to_attribute_name(k), v)))
                .collect();
            Some(Value::Map(map))
        }
        serde_json::Value::Array(items) => {
            Some(Value::List(items.iter().filter_map(json_to_value).collect()))
        }
        other => Value::from_json(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_nested_property_names() {
        assert_eq!(to_property_name("target_group_arn"), "TargetGroupArn");
        assert_eq!(to_property_name("wait_time_in_minutes"), "WaitTimeInMinutes");
        assert_eq!(to_property_name("ecs_services"), "ECSServices");
        assert_eq!(to_attribute_name("ECSServices"), "ecs_services");
        assert_eq!(to_attribute_name("DNSName"), "dns_name");
        assert_eq!(to_attribute_name("ListenerArns"), "listener_arns");
    }

    #[test]
    fn renames_keys_at_every_depth() {
        let mut config = HashMap::new();
        config.insert("status_code".to_string(), Value::String("404".to_string()));
        config.insert("content_type".to_string(), Value::String("text/plain".to_string()));
        let mut action = HashMap::new();
        action.insert("type".to_string(), Value::String("fixed-response".to_string()));
        action.insert("fixed_response_config".to_string(), Value::Map(config));

        let json = value_to_json(&Value::List(vec![Value::Map(action)])).unwrap();
        assert_eq!(
            json,
            json!([{
                "Type": "fixed-response",
                "FixedResponseConfig": { "StatusCode": "404", "ContentType": "text/plain" }
            }])
        );

        let back = json_to_value(&json).unwrap();
        assert_eq!(
            back.get("fixed_response_config")
                .and_then(|c| c.get("status_code"))
                .and_then(Value::as_str),
            Some("404")
        );
    }

    #[test]
    fn unresolved_reference_has_no_json_form() {
        let value = Value::List(vec![Value::ResourceRef(
            "blue_tg".to_string(),
            "target_group_arn".to_string(),
        )]);
        assert_eq!(value_to_json(&value), None);
    }

    #[test]
    fn whole_numbers_become_integers_and_fractions_stay_exact() {
        assert_eq!(json_to_value(&json!(5.0)), Some(Value::Int(5)));
        assert_eq!(
            json_to_value(&json!(2.5)),
            Some(Value::String("2.5".to_string()))
        );
    }
}
