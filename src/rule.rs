// Copyright (c) 2024 Microsoft Corporation
//
// SPDX-License-Identifier: Apache-2.0
//

// Allow K8s YAML field names.
#![allow(non_snake_case)]

//! Policy-rule data model.
//!
//! Rules mirror the Kubernetes wire shape of the policy CRD. On the wire a
//! rule carries at most one body section (`mutate`, `validate`,
//! `verifyImages` or `generate`), each serialized as fully absent when
//! unset. In memory the body is a tagged variant so that downstream
//! rewriting matches on one shape instead of probing optional fields.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One named unit of match/exclude criteria plus a single action.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(from = "RuleRepr", into = "RuleRepr")]
pub struct Rule {
    /// Rule name, unique within a policy.
    pub name: String,

    /// Resources the rule applies to.
    pub match_resources: MatchResources,

    /// Resources the rule must not apply to.
    pub exclude: Option<MatchResources>,

    /// Context entries, copied into derived rules as authored.
    pub context: Option<Value>,

    /// Raw preconditions block; see [`crate::conditions`] for the accepted
    /// shapes.
    pub preconditions: Option<Value>,

    /// The rule's action, when one of the recognized sections is present.
    pub body: Option<RuleBody>,
}

/// The action carried by a rule.
#[derive(Clone, Debug)]
pub enum RuleBody {
    /// A `mutate` section.
    Mutate(Mutation),
    /// A `validate` section.
    Validate(Validation),
    /// A `verifyImages` section, copied verbatim into derived rules.
    VerifyImages(Vec<Value>),
    /// A `generate` section. Generation has no pod-template counterpart and
    /// never produces a derived rule.
    Generate(Value),
}

/// See MatchResources in the policy API reference.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MatchResources {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub any: Vec<ResourceFilter>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub all: Vec<ResourceFilter>,

    #[serde(default, skip_serializing_if = "ResourceDescription::is_empty")]
    pub resources: ResourceDescription,
}

/// One entry of an `any`/`all` filter list.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ResourceFilter {
    #[serde(default, skip_serializing_if = "ResourceDescription::is_empty")]
    pub resources: ResourceDescription,
}

/// See ResourceDescription in the policy API reference.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescription {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kinds: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub names: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub namespaces: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub operations: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<Value>,
}

impl ResourceDescription {
    /// Returns true if no field is set.
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
            && self.names.is_empty()
            && self.namespaces.is_empty()
            && self.operations.is_empty()
            && self.selector.is_none()
    }

    /// Returns true if the kind list names `kind`.
    pub fn has_kind(&self, kind: &str) -> bool {
        self.kinds.iter().any(|k| k == kind)
    }
}

/// See Mutation in the policy API reference. `patchStrategicMerge` and
/// `foreach` are mutually exclusive on the wire.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Mutation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patchStrategicMerge: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub foreach: Option<Vec<ForeachMutation>>,
}

/// One entry of a foreach mutation. Only the patch target is rewritten
/// during derivation; the list expression and its filters are absolute
/// references and stay as authored.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ForeachMutation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub preconditions: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub patchStrategicMerge: Option<Value>,
}

/// A validation body: an optional failure message plus one check shape.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(from = "ValidationRepr", into = "ValidationRepr")]
pub struct Validation {
    /// Human-readable failure message; embedded field references are
    /// shifted when the rule is derived.
    pub message: Option<String>,

    /// The check, when one of the recognized shapes is present.
    pub check: Option<ValidationCheck>,
}

/// The recognized validation shapes.
#[derive(Clone, Debug)]
pub enum ValidationCheck {
    /// A `pattern` check, nested under the target's pod-template path when
    /// derived.
    Pattern(Value),
    /// An `anyPattern` check; every element is nested when derived.
    AnyPattern(Vec<Value>),
    /// A `deny` check, copied as authored.
    Deny(Deny),
    /// A `podSecurity` check, copied as authored.
    PodSecurity(PodSecurity),
    /// A `foreach` check, copied as authored.
    ForEach(Vec<Value>),
    /// A `cel` check; its expressions are rewritten by reference
    /// substitution only.
    Cel(Value),
}

/// See Deny in the policy API reference. The conditions block stays raw
/// because both the modern and the legacy shape are accepted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Deny {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Value>,
}

/// See PodSecurity in the policy API reference.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PodSecurity {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclude: Option<Vec<PodSecurityExclude>>,
}

/// One pod-security control exclusion, copied verbatim into derived rules.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PodSecurityExclude {
    pub controlName: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub restrictedField: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

/// Wire shape of a rule: every body section is an independently optional
/// field that serializes as fully absent when unset.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleRepr {
    name: String,

    #[serde(default)]
    r#match: MatchResources,

    #[serde(skip_serializing_if = "Option::is_none")]
    exclude: Option<MatchResources>,

    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    preconditions: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    mutate: Option<Mutation>,

    #[serde(skip_serializing_if = "Option::is_none")]
    validate: Option<Validation>,

    #[serde(skip_serializing_if = "Option::is_none")]
    verifyImages: Option<Vec<Value>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    generate: Option<Value>,
}

impl From<RuleRepr> for Rule {
    fn from(repr: RuleRepr) -> Self {
        // Body sections are probed in a fixed order so a document that
        // mistakenly carries more than one still maps to a single body.
        let body = if let Some(mutate) = repr.mutate {
            Some(RuleBody::Mutate(mutate))
        } else if let Some(validate) = repr.validate {
            // A CEL check yields to image verification when both are set.
            if matches!(&validate.check, Some(ValidationCheck::Cel(_))) && repr.verifyImages.is_some()
            {
                repr.verifyImages.map(RuleBody::VerifyImages)
            } else {
                Some(RuleBody::Validate(validate))
            }
        } else if let Some(images) = repr.verifyImages {
            Some(RuleBody::VerifyImages(images))
        } else {
            repr.generate.map(RuleBody::Generate)
        };

        Rule {
            name: repr.name,
            match_resources: repr.r#match,
            exclude: repr.exclude,
            context: repr.context,
            preconditions: repr.preconditions,
            body,
        }
    }
}

impl From<Rule> for RuleRepr {
    fn from(rule: Rule) -> Self {
        let mut repr = RuleRepr {
            name: rule.name,
            r#match: rule.match_resources,
            exclude: rule.exclude,
            context: rule.context,
            preconditions: rule.preconditions,
            mutate: None,
            validate: None,
            verifyImages: None,
            generate: None,
        };
        match rule.body {
            Some(RuleBody::Mutate(mutation)) => repr.mutate = Some(mutation),
            Some(RuleBody::Validate(validation)) => repr.validate = Some(validation),
            Some(RuleBody::VerifyImages(images)) => repr.verifyImages = Some(images),
            Some(RuleBody::Generate(generation)) => repr.generate = Some(generation),
            None => {}
        }
        repr
    }
}

/// Wire shape of a validation body.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct ValidationRepr {
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pattern: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    anyPattern: Option<Vec<Value>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    deny: Option<Deny>,

    #[serde(skip_serializing_if = "Option::is_none")]
    podSecurity: Option<PodSecurity>,

    #[serde(skip_serializing_if = "Option::is_none")]
    foreach: Option<Vec<Value>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    cel: Option<Value>,
}

impl From<ValidationRepr> for Validation {
    fn from(repr: ValidationRepr) -> Self {
        let check = if let Some(pattern) = repr.pattern {
            Some(ValidationCheck::Pattern(pattern))
        } else if let Some(deny) = repr.deny {
            Some(ValidationCheck::Deny(deny))
        } else if let Some(pod_security) = repr.podSecurity {
            Some(ValidationCheck::PodSecurity(pod_security))
        } else if let Some(patterns) = repr.anyPattern {
            Some(ValidationCheck::AnyPattern(patterns))
        } else if let Some(entries) = repr.foreach {
            Some(ValidationCheck::ForEach(entries))
        } else {
            repr.cel.map(ValidationCheck::Cel)
        };

        Validation {
            message: repr.message,
            check,
        }
    }
}

impl From<Validation> for ValidationRepr {
    fn from(validation: Validation) -> Self {
        let mut repr = ValidationRepr {
            message: validation.message,
            pattern: None,
            anyPattern: None,
            deny: None,
            podSecurity: None,
            foreach: None,
            cel: None,
        };
        match validation.check {
            Some(ValidationCheck::Pattern(pattern)) => repr.pattern = Some(pattern),
            Some(ValidationCheck::AnyPattern(patterns)) => repr.anyPattern = Some(patterns),
            Some(ValidationCheck::Deny(deny)) => repr.deny = Some(deny),
            Some(ValidationCheck::PodSecurity(pod_security)) => {
                repr.podSecurity = Some(pod_security)
            }
            Some(ValidationCheck::ForEach(entries)) => repr.foreach = Some(entries),
            Some(ValidationCheck::Cel(cel)) => repr.cel = Some(cel),
            None => {}
        }
        repr
    }
}
