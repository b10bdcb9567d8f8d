// Copyright (c) 2024 Microsoft Corporation
//
// SPDX-License-Identifier: Apache-2.0
//

//! Controller-selection string resolution.
//!
//! A policy opts in or out of rule derivation through a comma-separated
//! selection of workload kinds, normally carried by an annotation. The
//! legacy sentinels `"all"` and `"none"` are still accepted, and an absent
//! selection defaults to `"all"`.

use std::collections::BTreeMap;

/// The annotation key carrying a policy's controller selection.
pub const AUTOGEN_CONTROLLERS_ANNOTATION: &str = "pod-policies.k8s.io/autogen-controllers";

/// Selection sentinel for the full standard controller set.
pub const CONTROLLERS_ALL: &str = "all";

/// Selection sentinel disabling controller-variant derivation.
pub const CONTROLLERS_NONE: &str = "none";

/// The workload kind whose pod template is nested one level deeper;
/// handled by a separate derivation pass, never part of the standard set.
pub const CONTROLLER_CRONJOB: &str = "CronJob";

/// The kind source rules are authored against.
pub const KIND_POD: &str = "Pod";

/// The standard pod-controller kinds.
pub const POD_CONTROLLERS: [&str; 6] = [
    "DaemonSet",
    "Deployment",
    "Job",
    "StatefulSet",
    "ReplicaSet",
    "ReplicationController",
];

/// Resolves a selection string into the ordered, de-duplicated set of
/// target controller kinds. Unrecognized names (including the CronJob
/// marker, which is gated separately) are dropped silently.
pub fn resolve(selection: &str) -> Vec<String> {
    let selection = selection.trim();
    if selection.is_empty() || selection == CONTROLLERS_ALL {
        return POD_CONTROLLERS.iter().map(|c| c.to_string()).collect();
    }
    if selection == CONTROLLERS_NONE {
        return Vec::new();
    }

    let mut controllers = Vec::new();
    for token in selection.split(',') {
        let token = token.trim();
        if POD_CONTROLLERS.contains(&token) && !controllers.iter().any(|c| c == token) {
            controllers.push(token.to_string());
        }
    }
    controllers
}

/// Returns true if the selection asks for a CronJob variant. This is
/// independent of the standard set: `"CronJob"` alone disables controller
/// variants yet still produces the CronJob one.
pub fn selects_cronjob(selection: &str) -> bool {
    let selection = selection.trim();
    selection.is_empty()
        || selection == CONTROLLERS_ALL
        || selection.split(',').any(|t| t.trim() == CONTROLLER_CRONJOB)
}

/// Reads a policy's controller selection from its annotations, applying
/// the historical default when the annotation is absent.
pub fn from_annotations(annotations: &BTreeMap<String, String>) -> &str {
    annotations
        .get(AUTOGEN_CONTROLLERS_ANNOTATION)
        .map(String::as_str)
        .unwrap_or(CONTROLLERS_ALL)
}
