// Copyright (c) 2024 Microsoft Corporation
//
// SPDX-License-Identifier: Apache-2.0
//

//! Precondition shapes.
//!
//! A conditions block appears in two accepted forms: the modern `any`/`all`
//! object and the legacy plain list. Anything else is logged and treated as
//! "no conditions" so a malformed block never fails the whole rule.

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single condition entry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Condition {
    /// The value under test, usually a variable reference.
    pub key: Value,

    /// Comparison operator, e.g. `Equals` or `AnyIn`.
    pub operator: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// The modern conditions shape.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnyAllConditions {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub any: Vec<Condition>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub all: Vec<Condition>,
}

/// A conditions block in either accepted shape.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Conditions {
    /// The `any`/`all` object form.
    AnyAll(AnyAllConditions),
    /// The legacy flat list form.
    Legacy(Vec<Condition>),
}

/// Parses a raw conditions value, returning `None` for unrecognized shapes.
pub fn parse(value: &Value) -> Option<Conditions> {
    match serde_json::from_value::<Conditions>(value.clone()) {
        Ok(conditions) => Some(conditions),
        Err(e) => {
            debug!("unrecognized conditions shape, treating as none: {e}");
            None
        }
    }
}
