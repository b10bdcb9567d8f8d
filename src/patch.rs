// Copyright (c) 2024 Microsoft Corporation
//
// SPDX-License-Identifier: Apache-2.0
//

//! JSON Patch emission.
//!
//! Each derived rule is compared against the rule of the same name already
//! present in the policy, if any. An identical rule produces no operation,
//! a differing one produces a `replace` at its existing index, and a new
//! one produces an `add` at the next trailing index. The trailing index
//! advances across the whole invocation so sequential `add` operations
//! land correctly when applied in order.

use crate::errors::AutogenError;
use crate::rule::Rule;

use json_patch::PatchOperation;
use serde_json::json;
use std::collections::HashMap;

/// Emits add/replace operations against a policy's rule array.
pub struct PatchEmitter<'a> {
    rules: &'a [Rule],
    index: HashMap<&'a str, usize>,
    insert_index: usize,
}

impl<'a> PatchEmitter<'a> {
    /// Builds the name lookup once for the policy's current rule list.
    pub fn new(rules: &'a [Rule]) -> Self {
        let index = rules
            .iter()
            .enumerate()
            .map(|(i, rule)| (rule.name.as_str(), i))
            .collect();
        PatchEmitter {
            rules,
            index,
            insert_index: rules.len(),
        }
    }

    /// Returns the operation that lands `derived` in the rule array, or
    /// `None` when an identical rule is already present.
    pub fn emit(&mut self, derived: &Rule) -> Result<Option<PatchOperation>, AutogenError> {
        match self.index.get(derived.name.as_str()) {
            Some(&existing) => {
                let current = serialize(&self.rules[existing])?;
                let replacement = serialize(derived)?;
                if current == replacement {
                    return Ok(None);
                }
                Ok(Some(build_operation("replace", existing, derived)?))
            }
            None => {
                let operation = build_operation("add", self.insert_index, derived)?;
                self.insert_index += 1;
                Ok(Some(operation))
            }
        }
    }
}

fn serialize(rule: &Rule) -> Result<String, AutogenError> {
    serde_json::to_string(rule).map_err(|e| AutogenError::Serialize {
        rule: rule.name.clone(),
        source: e,
    })
}

/// Builds one operation and validates it as JSON Patch syntax.
fn build_operation(op: &str, index: usize, rule: &Rule) -> Result<PatchOperation, AutogenError> {
    let value = serde_json::to_value(rule).map_err(|e| AutogenError::Serialize {
        rule: rule.name.clone(),
        source: e,
    })?;
    let operation = json!({
        "op": op,
        "path": format!("/spec/rules/{index}"),
        "value": value,
    });
    serde_json::from_value(operation).map_err(|e| AutogenError::InvalidPatch {
        rule: rule.name.clone(),
        source: e,
    })
}
