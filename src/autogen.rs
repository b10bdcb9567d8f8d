// Copyright (c) 2024 Microsoft Corporation
//
// SPDX-License-Identifier: Apache-2.0
//

//! Derivation driver.
//!
//! Walks a policy's rules once and, for each eligible Pod rule, derives the
//! controller-targeted variant and the CronJob-targeted variant. The result
//! is packaged either as JSON Patch operations against the stored policy
//! (patch mode) or as the flat "effective rules" list (materialized mode).
//! A failure in one rule never aborts the others; errors are collected and
//! returned alongside whatever was produced.

use crate::controllers;
use crate::eligibility;
use crate::errors::AutogenError;
use crate::patch::PatchEmitter;
use crate::rewrite;
use crate::rule::Rule;

use json_patch::PatchOperation;
use log::debug;

/// Computes the patch operations that bring a policy's rule array up to
/// date with its derived rules. Repeated invocation over an unchanged
/// policy yields no operations.
pub fn generate_rule_patches(
    rules: &[Rule],
    selection: &str,
) -> (Vec<PatchOperation>, Vec<AutogenError>) {
    let mut patches = Vec::new();
    let mut errors = Vec::new();

    let targets = controllers::resolve(selection);
    let cronjob = controllers::selects_cronjob(selection);
    if targets.is_empty() && !cronjob {
        return (patches, errors);
    }

    let mut emitter = PatchEmitter::new(rules);
    for rule in rules {
        if !eligibility::can_autogen(rule) {
            continue;
        }
        for derived in derive_variants(rule, &targets, cronjob, &mut errors) {
            match emitter.emit(&derived) {
                Ok(Some(operation)) => {
                    debug!("derived rule {} needs an update", derived.name);
                    patches.push(operation);
                }
                Ok(None) => debug!("derived rule {} is up to date", derived.name),
                Err(e) => errors.push(e),
            }
        }
    }
    (patches, errors)
}

/// Computes the effective rule list: the policy's own rules with every
/// derived rule either replacing an existing entry of the same name or
/// appended. Rules that fail to derive are logged and skipped.
pub fn compute_rules(rules: &[Rule], selection: &str) -> Vec<Rule> {
    let mut effective: Vec<Rule> = rules.to_vec();

    let targets = controllers::resolve(selection);
    let cronjob = controllers::selects_cronjob(selection);
    if targets.is_empty() && !cronjob {
        return effective;
    }

    let mut errors = Vec::new();
    for rule in rules {
        if !eligibility::can_autogen(rule) {
            continue;
        }
        for derived in derive_variants(rule, &targets, cronjob, &mut errors) {
            match effective.iter().position(|r| r.name == derived.name) {
                Some(existing) => effective[existing] = derived,
                None => effective.push(derived),
            }
        }
    }
    for e in &errors {
        debug!("skipping derived rule: {e}");
    }
    effective
}

/// Derives the controller and CronJob variants of one source rule,
/// recording per-variant failures without aborting the sibling.
fn derive_variants(
    rule: &Rule,
    targets: &[String],
    cronjob: bool,
    errors: &mut Vec<AutogenError>,
) -> Vec<Rule> {
    let mut variants = Vec::new();
    match rewrite::generate_rule_for_controllers(rule, targets) {
        Ok(Some(derived)) => variants.push(derived),
        Ok(None) => {}
        Err(e) => errors.push(e),
    }
    if cronjob {
        match rewrite::generate_rule_for_cronjobs(rule) {
            Ok(Some(derived)) => variants.push(derived),
            Ok(None) => {}
            Err(e) => errors.push(e),
        }
    }
    variants
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{RuleBody, ValidationCheck};
    use serde_json::{json, Value};

    const POLICY: &str = r#"
- name: check-image-tag
  match:
    resources:
      kinds:
      - Pod
  validate:
    message: "image {{ request.object.spec.containers[0].image }} must be tagged"
    pattern:
      spec:
        containers:
        - image: "*:*"
"#;

    fn rules_from_yaml(yaml: &str) -> Vec<Rule> {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn as_value(operation: &PatchOperation) -> Value {
        serde_json::to_value(operation).unwrap()
    }

    /// Applies patch-mode output to the policy the way the admission
    /// mutation path would.
    fn apply(rules: &[Rule], patches: Vec<PatchOperation>) -> Vec<Rule> {
        let mut document = json!({ "spec": { "rules": serde_json::to_value(rules).unwrap() } });
        json_patch::patch(&mut document, &json_patch::Patch(patches)).unwrap();
        serde_json::from_value(document["spec"]["rules"].clone()).unwrap()
    }

    #[test]
    fn test_default_selection_derives_both_variants() {
        let rules = rules_from_yaml(POLICY);
        let (patches, errors) = generate_rule_patches(&rules, "all");
        assert!(errors.is_empty());
        assert_eq!(patches.len(), 2);

        let first = as_value(&patches[0]);
        assert_eq!(first["op"], "add");
        assert_eq!(first["path"], "/spec/rules/1");
        assert_eq!(first["value"]["name"], "autogen-check-image-tag");

        let second = as_value(&patches[1]);
        assert_eq!(second["op"], "add");
        assert_eq!(second["path"], "/spec/rules/2");
        assert_eq!(second["value"]["name"], "autogen-cronjob-check-image-tag");
    }

    #[test]
    fn test_patches_are_idempotent() {
        let rules = rules_from_yaml(POLICY);
        let (patches, errors) = generate_rule_patches(&rules, "all");
        assert!(errors.is_empty());
        assert_eq!(patches.len(), 2);

        let updated = apply(&rules, patches);
        assert_eq!(updated.len(), 3);

        let (patches, errors) = generate_rule_patches(&updated, "all");
        assert!(errors.is_empty());
        assert!(patches.is_empty());
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let rules = rules_from_yaml(POLICY);
        let (first, _) = generate_rule_patches(&rules, "all");
        let (second, _) = generate_rule_patches(&rules, "all");
        assert_eq!(
            serde_json::to_value(&first).unwrap(),
            serde_json::to_value(&second).unwrap()
        );
    }

    #[test]
    fn test_none_selection_yields_nothing() {
        let rules = rules_from_yaml(POLICY);
        let (patches, errors) = generate_rule_patches(&rules, "none");
        assert!(patches.is_empty());
        assert!(errors.is_empty());
    }

    #[test]
    fn test_cronjob_only_selection() {
        let rules = rules_from_yaml(POLICY);
        let (patches, errors) = generate_rule_patches(&rules, "CronJob");
        assert!(errors.is_empty());
        assert_eq!(patches.len(), 1);
        assert_eq!(
            as_value(&patches[0])["value"]["name"],
            "autogen-cronjob-check-image-tag"
        );
    }

    #[test]
    fn test_derived_rules_are_not_rederived() {
        let rules = rules_from_yaml(POLICY);
        let effective = compute_rules(&rules, "all");
        let (patches, errors) = generate_rule_patches(&effective, "all");
        assert!(errors.is_empty());
        assert!(patches.is_empty());

        // Deriving again over the effective list must not grow it either.
        assert_eq!(compute_rules(&effective, "all").len(), effective.len());
    }

    #[test]
    fn test_stale_derived_rule_is_replaced_in_place() {
        let rules = rules_from_yaml(
            r#"
- name: check-image-tag
  match:
    resources:
      kinds:
      - Pod
  validate:
    pattern:
      spec:
        containers:
        - image: "*:*"
- name: autogen-check-image-tag
  match:
    resources:
      kinds:
      - DaemonSet
      - Deployment
      - Job
      - StatefulSet
      - ReplicaSet
      - ReplicationController
  validate:
    pattern:
      spec:
        template:
          spec:
            containers:
            - image: "stale"
"#,
        );

        let (patches, errors) = generate_rule_patches(&rules, "all");
        assert!(errors.is_empty());
        // One replace for the stale controller variant, one add for the
        // missing CronJob variant.
        assert_eq!(patches.len(), 2);

        let replace = as_value(&patches[0]);
        assert_eq!(replace["op"], "replace");
        assert_eq!(replace["path"], "/spec/rules/1");
        assert_eq!(
            replace["value"]["validate"]["pattern"]["spec"]["template"]["spec"]["containers"][0]
                ["image"],
            "*:*"
        );

        let add = as_value(&patches[1]);
        assert_eq!(add["op"], "add");
        assert_eq!(add["path"], "/spec/rules/2");
    }

    #[test]
    fn test_compute_rules_appends_derived_variants() {
        let rules = rules_from_yaml(POLICY);
        let effective = compute_rules(&rules, "all");
        assert_eq!(effective.len(), 3);
        assert_eq!(effective[0].name, "check-image-tag");
        assert_eq!(effective[1].name, "autogen-check-image-tag");
        assert_eq!(effective[2].name, "autogen-cronjob-check-image-tag");

        let pattern = match &effective[1].body {
            Some(RuleBody::Validate(v)) => match &v.check {
                Some(ValidationCheck::Pattern(pattern)) => pattern.clone(),
                other => panic!("expected a pattern check, got {other:?}"),
            },
            other => panic!("expected a validate body, got {other:?}"),
        };
        assert!(pattern["spec"]["template"]["spec"]["containers"].is_array());
    }

    #[test]
    fn test_selection_subset_limits_the_kind_list() {
        let rules = rules_from_yaml(POLICY);
        let (patches, errors) = generate_rule_patches(&rules, "Deployment,StatefulSet");
        assert!(errors.is_empty());
        assert_eq!(patches.len(), 1);
        assert_eq!(
            as_value(&patches[0])["value"]["match"]["resources"]["kinds"],
            json!(["Deployment", "StatefulSet"])
        );
    }

    #[test]
    fn test_underivable_rules_do_not_suppress_siblings() {
        // The second rule still derives when the first one matches Pods but
        // carries nothing derivable.
        let rules = rules_from_yaml(
            r#"
- name: generate-only
  match:
    resources:
      kinds:
      - Pod
  generate:
    kind: ConfigMap
    name: defaults
- name: check-image-tag
  match:
    resources:
      kinds:
      - Pod
  validate:
    pattern:
      spec:
        containers:
        - image: "*:*"
"#,
        );

        let (patches, errors) = generate_rule_patches(&rules, "Deployment");
        assert!(errors.is_empty());
        assert_eq!(patches.len(), 1);
        assert_eq!(
            as_value(&patches[0])["value"]["name"],
            "autogen-check-image-tag"
        );
        assert_eq!(as_value(&patches[0])["path"], "/spec/rules/2");
    }
}
