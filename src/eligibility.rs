// Copyright (c) 2024 Microsoft Corporation
//
// SPDX-License-Identifier: Apache-2.0
//

//! Source-rule eligibility.
//!
//! Only rules that target `Pod` resources, and that are not themselves
//! derived rules, are candidates for derivation.

use crate::controllers::KIND_POD;
use crate::rewrite::AUTOGEN_RULE_PREFIX;
use crate::rule::{MatchResources, Rule};

/// Returns true if `rule` is a candidate for derivation.
pub fn can_autogen(rule: &Rule) -> bool {
    if rule.name.starts_with(AUTOGEN_RULE_PREFIX) {
        return false;
    }
    if !match_targets_pods(&rule.match_resources) {
        return false;
    }
    match &rule.exclude {
        Some(exclude) => exclude_covers_pods(exclude),
        None => true,
    }
}

fn match_targets_pods(resources: &MatchResources) -> bool {
    resources.resources.has_kind(KIND_POD)
        || resources.any.iter().any(|f| f.resources.has_kind(KIND_POD))
        || resources.all.iter().any(|f| f.resources.has_kind(KIND_POD))
}

/// A non-empty exclude kind list that does not name `Pod` was written for
/// some other kind; the derived kinds cannot honor it.
fn exclude_covers_pods(exclude: &MatchResources) -> bool {
    std::iter::once(&exclude.resources)
        .chain(exclude.any.iter().map(|f| &f.resources))
        .chain(exclude.all.iter().map(|f| &f.resources))
        .filter(|r| !r.kinds.is_empty())
        .all(|r| r.has_kind(KIND_POD))
}
