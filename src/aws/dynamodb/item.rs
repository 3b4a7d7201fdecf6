//! Rendering of raw items.

use crate::aws::dynamodb::model::Item;
use anyhow::Context;
use aws_sdk_dynamodb::types::AttributeValue;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::de::DeserializeOwned;
use serde_json::{Map, Number, Value};

/// Converts an item into plain JSON.
///
/// Numbers keep their exact decimal text, binary values become base64 strings and sets
/// become arrays.
pub fn item_to_json(item: &Item) -> Value {
    Value::Object(
        item.iter()
            .map(|(name, value)| (name.clone(), attribute_to_json(value)))
            .collect::<Map<_, _>>(),
    )
}

pub fn attribute_to_json(value: &AttributeValue) -> Value {
    match value {
        AttributeValue::S(text) => Value::String(text.clone()),
        AttributeValue::N(number) => number_to_json(number),
        AttributeValue::Bool(flag) => Value::Bool(*flag),
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::L(values) => Value::Array(values.iter().map(attribute_to_json).collect()),
        AttributeValue::M(values) => Value::Object(
            values
                .iter()
                .map(|(name, value)| (name.clone(), attribute_to_json(value)))
                .collect(),
        ),
        AttributeValue::Ss(values) => Value::Array(values.iter().cloned().map(Value::String).collect()),
        AttributeValue::Ns(values) => {
            Value::Array(values.iter().map(|number| number_to_json(number)).collect())
        }
        AttributeValue::B(blob) => Value::String(STANDARD.encode(blob.as_ref())),
        AttributeValue::Bs(blobs) => Value::Array(
            blobs
                .iter()
                .map(|blob| Value::String(STANDARD.encode(blob.as_ref())))
                .collect(),
        ),
        _ => Value::Null,
    }
}

fn number_to_json(number: &str) -> Value {
    number
        .parse::<Number>()
        .map(Value::Number)
        .unwrap_or_else(|_| Value::String(number.to_string()))
}

/// Deserializes items into typed records.
pub fn deserialize_items<T: DeserializeOwned>(items: Vec<Item>) -> anyhow::Result<Vec<T>> {
    serde_dynamo::aws_sdk_dynamodb_1::from_items(items).context("Failed to deserialize items")
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_dynamodb::primitives::Blob;
    use serde::Deserialize;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn renders_nested_items() {
        let item: Item = HashMap::from([
            ("id".to_string(), AttributeValue::S("order#1".to_string())),
            ("total".to_string(), AttributeValue::N("12.5".to_string())),
            ("paid".to_string(), AttributeValue::Bool(true)),
            ("note".to_string(), AttributeValue::Null(true)),
            (
                "lines".to_string(),
                AttributeValue::L(vec![AttributeValue::M(HashMap::from([(
                    "sku".to_string(),
                    AttributeValue::S("A-1".to_string()),
                )]))]),
            ),
            (
                "tags".to_string(),
                AttributeValue::Ss(vec!["new".to_string(), "gift".to_string()]),
            ),
            (
                "raw".to_string(),
                AttributeValue::B(Blob::new(b"hi".to_vec())),
            ),
        ]);

        assert_eq!(
            item_to_json(&item),
            json!({
                "id": "order#1",
                "total": 12.5,
                "paid": true,
                "note": null,
                "lines": [{"sku": "A-1"}],
                "tags": ["new", "gift"],
                "raw": "aGk=",
            })
        );
    }

    #[test]
    fn keeps_number_precision() {
        let value = attribute_to_json(&AttributeValue::N("12345678901234567890.123".to_string()));
        assert_eq!(value.to_string(), "12345678901234567890.123");

        let value = attribute_to_json(&AttributeValue::Ns(vec!["1".to_string()]));
        assert_eq!(value, json!([1]));
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Order {
        id: String,
        total: u32,
    }

    #[test]
    fn deserializes_typed_records() {
        let items = vec![HashMap::from([
            ("id".to_string(), AttributeValue::S("o1".to_string())),
            ("total".to_string(), AttributeValue::N("12".to_string())),
        ])];

        let orders: Vec<Order> = deserialize_items(items).unwrap();
        assert_eq!(
            orders,
            vec![Order {
                id: "o1".to_string(),
                total: 12
            }]
        );
    }

    #[test]
    fn reports_mismatching_records() {
        let items = vec![HashMap::from([(
            "id".to_string(),
            AttributeValue::N("1".to_string()),
        )])];

        assert!(deserialize_items::<Order>(items).is_err());
    }
}
