// Copyright (c) 2024 Microsoft Corporation
//
// SPDX-License-Identifier: Apache-2.0
//

//! Template nesting and reference-token rewriting.
//!
//! Two distinct rewrites happen during derivation and must not be confused.
//! Structural nesting wraps a rule body under the target's pod-template
//! path ([`TemplateTarget::nest`]); it is independent of string content.
//! Reference rewriting ([`shift_references`]) substitutes the
//! field-reference tokens embedded in messages and expression strings; it
//! runs over the fully serialized rule because the tokens sit inside opaque
//! JMESPath, CEL and template strings that have no structured
//! representation here.

use serde_json::{Map, Value};

/// Where a derived rule's pod template lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TemplateTarget {
    /// Pod controllers nest the template under `spec.template`.
    Controller,
    /// CronJob nests it one level deeper, under
    /// `spec.jobTemplate.spec.template`.
    CronJob,
}

impl TemplateTarget {
    /// The nesting chain from the workload object down to its pod template.
    pub fn nesting(self) -> &'static [&'static str] {
        match self {
            TemplateTarget::Controller => &["spec", "template"],
            TemplateTarget::CronJob => &["spec", "jobTemplate", "spec", "template"],
        }
    }

    /// The dotted template path used in reference substitutions.
    fn template_path(self) -> &'static str {
        match self {
            TemplateTarget::Controller => "spec.template",
            TemplateTarget::CronJob => "spec.jobTemplate.spec.template",
        }
    }

    /// Wraps `value` under the target's nesting chain: for controllers
    /// `{foo: 1}` becomes `{spec: {template: {foo: 1}}}`.
    pub fn nest(self, value: &Value) -> Value {
        let mut nested = value.clone();
        for key in self.nesting().iter().rev() {
            let mut wrapper = Map::new();
            wrapper.insert((*key).to_string(), nested);
            nested = Value::Object(wrapper);
        }
        nested
    }

    /// The substitution pairs applied to a serialized derived rule. CEL
    /// expressions reference the admitted object without the `request.`
    /// prefix, so CEL rules get the bare forms as well.
    pub fn replacements(self, cel: bool) -> Vec<(String, String)> {
        let template = self.template_path();
        let mut pairs = vec![
            (
                "request.object.spec".to_string(),
                format!("request.object.{template}.spec"),
            ),
            (
                "request.oldObject.spec".to_string(),
                format!("request.oldObject.{template}.spec"),
            ),
            (
                "request.object.metadata".to_string(),
                format!("request.object.{template}.metadata"),
            ),
            (
                "request.oldObject.metadata".to_string(),
                format!("request.oldObject.{template}.metadata"),
            ),
        ];
        if cel {
            pairs.push(("object.spec".to_string(), format!("object.{template}.spec")));
            pairs.push((
                "oldObject.spec".to_string(),
                format!("oldObject.{template}.spec"),
            ));
            pairs.push((
                "object.metadata".to_string(),
                format!("object.{template}.metadata"),
            ));
            pairs.push((
                "oldObject.metadata".to_string(),
                format!("oldObject.{template}.metadata"),
            ));
        }
        pairs
    }
}

/// Replaces every reference token in `text` with its shifted form.
///
/// At each position the longest pattern is tried first and replacements are
/// never rescanned, so a bare `object.spec` cannot match inside an
/// occurrence of `request.object.spec` or inside already-shifted output.
pub fn shift_references(text: &str, pairs: &[(String, String)]) -> String {
    let mut ordered = pairs.to_vec();
    ordered.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while !rest.is_empty() {
        match ordered
            .iter()
            .find(|(pattern, _)| rest.starts_with(pattern.as_str()))
        {
            Some((pattern, replacement)) => {
                out.push_str(replacement);
                rest = &rest[pattern.len()..];
            }
            None => {
                let mut chars = rest.chars();
                if let Some(c) = chars.next() {
                    out.push(c);
                }
                rest = chars.as_str();
            }
        }
    }
    out
}
