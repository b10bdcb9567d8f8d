// Copyright (c) 2024 Microsoft Corporation
//
// SPDX-License-Identifier: Apache-2.0
//

//! Rule-body rewriting.
//!
//! Derives the variant of a Pod rule that applies to a set of target
//! workload kinds: deep-copies the rule, renames it, retargets its kind
//! filters, nests the body under the target's pod-template path, then
//! shifts the embedded references on the serialized form. The CronJob
//! variant is built from the source rule in the same single pass, with the
//! deeper template nesting.

use crate::conditions;
use crate::controllers::CONTROLLER_CRONJOB;
use crate::controllers::KIND_POD;
use crate::errors::AutogenError;
use crate::path_shift::{self, TemplateTarget};
use crate::rule::{
    ForeachMutation, MatchResources, Mutation, Rule, RuleBody, Validation, ValidationCheck,
};

/// Prefix of every derived rule name.
pub const AUTOGEN_RULE_PREFIX: &str = "autogen-";

/// Prefix of CronJob-derived rule names.
pub const AUTOGEN_CRONJOB_RULE_PREFIX: &str = "autogen-cronjob-";

// Kubernetes object-name length ceiling.
const MAX_NAME_LENGTH: usize = 63;

/// Derives the controller-targeted variant of `rule`, or `None` when no
/// controllers are selected or the rule has no derivable body.
pub fn generate_rule_for_controllers(
    rule: &Rule,
    controllers: &[String],
) -> Result<Option<Rule>, AutogenError> {
    if controllers.is_empty() {
        return Ok(None);
    }
    derive_rule(
        rule,
        controllers,
        TemplateTarget::Controller,
        AUTOGEN_RULE_PREFIX,
    )
}

/// Derives the CronJob-targeted variant of `rule` from the source rule
/// itself, or `None` when the rule has no derivable body.
pub fn generate_rule_for_cronjobs(rule: &Rule) -> Result<Option<Rule>, AutogenError> {
    let kinds = [CONTROLLER_CRONJOB.to_string()];
    derive_rule(
        rule,
        &kinds,
        TemplateTarget::CronJob,
        AUTOGEN_CRONJOB_RULE_PREFIX,
    )
}

fn derive_rule(
    rule: &Rule,
    kinds: &[String],
    target: TemplateTarget,
    prefix: &str,
) -> Result<Option<Rule>, AutogenError> {
    let body = match &rule.body {
        Some(body) => body,
        None => return Ok(None),
    };
    let body = match rewrite_body(body, target) {
        Some(body) => body,
        None => return Ok(None),
    };

    // Preconditions are re-embedded in their parsed form; an unrecognized
    // shape degrades to no conditions rather than failing the rule.
    let preconditions = match &rule.preconditions {
        Some(raw) => match conditions::parse(raw) {
            Some(parsed) => {
                Some(serde_json::to_value(&parsed).map_err(|e| serialize_error(&rule.name, e))?)
            }
            None => None,
        },
        None => None,
    };

    let derived = Rule {
        name: derived_name(prefix, &rule.name),
        match_resources: retarget_match(&rule.match_resources, kinds),
        exclude: rule.exclude.as_ref().map(|e| retarget_exclude(e, kinds)),
        context: rule.context.clone(),
        preconditions,
        body: Some(body),
    };

    // Reference tokens can sit inside any expression string, so the shift
    // runs over the serialized rule rather than field by field.
    let cel = matches!(
        &derived.body,
        Some(RuleBody::Validate(v)) if matches!(v.check, Some(ValidationCheck::Cel(_)))
    );
    let serialized =
        serde_json::to_string(&derived).map_err(|e| serialize_error(&rule.name, e))?;
    let shifted = path_shift::shift_references(&serialized, &target.replacements(cel));
    let derived = serde_json::from_str(&shifted).map_err(|e| serialize_error(&rule.name, e))?;
    Ok(Some(derived))
}

fn serialize_error(rule: &str, source: serde_json::Error) -> AutogenError {
    AutogenError::Serialize {
        rule: rule.to_string(),
        source,
    }
}

fn rewrite_body(body: &RuleBody, target: TemplateTarget) -> Option<RuleBody> {
    match body {
        RuleBody::Mutate(mutation) => rewrite_mutation(mutation, target),
        RuleBody::Validate(validation) => rewrite_validation(validation, target),
        RuleBody::VerifyImages(images) => Some(RuleBody::VerifyImages(images.clone())),
        // Generation has no pod-template counterpart.
        RuleBody::Generate(_) => None,
    }
}

fn rewrite_mutation(mutation: &Mutation, target: TemplateTarget) -> Option<RuleBody> {
    if let Some(patch) = &mutation.patchStrategicMerge {
        return Some(RuleBody::Mutate(Mutation {
            patchStrategicMerge: Some(target.nest(patch)),
            foreach: None,
        }));
    }
    if let Some(entries) = &mutation.foreach {
        let entries = entries
            .iter()
            .map(|entry| ForeachMutation {
                patchStrategicMerge: entry.patchStrategicMerge.as_ref().map(|p| target.nest(p)),
                ..entry.clone()
            })
            .collect();
        return Some(RuleBody::Mutate(Mutation {
            patchStrategicMerge: None,
            foreach: Some(entries),
        }));
    }
    None
}

fn rewrite_validation(validation: &Validation, target: TemplateTarget) -> Option<RuleBody> {
    let check = match validation.check.as_ref()? {
        ValidationCheck::Pattern(pattern) => ValidationCheck::Pattern(target.nest(pattern)),
        ValidationCheck::AnyPattern(patterns) => {
            ValidationCheck::AnyPattern(patterns.iter().map(|p| target.nest(p)).collect())
        }
        // Deny conditions reference request-level fields; the block is kept
        // as authored and only embedded reference tokens get shifted later.
        ValidationCheck::Deny(deny) => ValidationCheck::Deny(deny.clone()),
        ValidationCheck::PodSecurity(pod_security) => {
            ValidationCheck::PodSecurity(pod_security.clone())
        }
        ValidationCheck::ForEach(entries) => ValidationCheck::ForEach(entries.clone()),
        // CEL blocks are rewritten by reference substitution alone.
        ValidationCheck::Cel(cel) => ValidationCheck::Cel(cel.clone()),
    };
    Some(RuleBody::Validate(Validation {
        message: validation.message.clone(),
        check: Some(check),
    }))
}

fn derived_name(prefix: &str, name: &str) -> String {
    let mut derived = format!("{prefix}{name}");
    if derived.len() > MAX_NAME_LENGTH {
        let mut end = MAX_NAME_LENGTH;
        while !derived.is_char_boundary(end) {
            end -= 1;
        }
        derived.truncate(end);
    }
    derived
}

/// Replaces the kind list that targeted `Pod` with the derived kinds. When
/// `any`/`all` sub-filters are in use only the matching entries are
/// rewritten; otherwise the top-level list is.
fn retarget_match(resources: &MatchResources, kinds: &[String]) -> MatchResources {
    let mut resources = resources.clone();
    let mut rewrote_filter = false;
    for filter in resources.any.iter_mut().chain(resources.all.iter_mut()) {
        if filter.resources.has_kind(KIND_POD) {
            filter.resources.kinds = kinds.to_vec();
            rewrote_filter = true;
        }
    }
    if !rewrote_filter && resources.resources.has_kind(KIND_POD) {
        resources.resources.kinds = kinds.to_vec();
    }
    resources
}

/// Exclude kind lists are only rewritten where they were non-empty;
/// eligibility has already ensured the non-empty ones name `Pod`.
fn retarget_exclude(exclude: &MatchResources, kinds: &[String]) -> MatchResources {
    let mut exclude = exclude.clone();
    for filter in exclude.any.iter_mut().chain(exclude.all.iter_mut()) {
        if !filter.resources.kinds.is_empty() {
            filter.resources.kinds = kinds.to_vec();
        }
    }
    if !exclude.resources.kinds.is_empty() {
        exclude.resources.kinds = kinds.to_vec();
    }
    exclude
}
