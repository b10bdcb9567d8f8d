// Copyright (c) 2024 Microsoft Corporation
//
// SPDX-License-Identifier: Apache-2.0
//

//! Error types for rule derivation.
//!
//! No failure here is fatal to a whole policy: the driver records one error
//! per affected rule and keeps processing the siblings.

use thiserror::Error;

/// An error raised while deriving a rule or building its patch. Each value
/// names the rule it applies to so callers can surface per-rule warnings.
#[derive(Debug, Error)]
pub enum AutogenError {
    /// A rule could not be serialized, or the rewritten text could not be
    /// parsed back into a rule.
    #[error("failed to serialize rule \"{rule}\": {source}")]
    Serialize {
        /// Name of the affected rule.
        rule: String,
        /// The underlying serialization error.
        source: serde_json::Error,
    },

    /// A constructed patch fragment does not parse as a JSON Patch
    /// operation.
    #[error("invalid patch for rule \"{rule}\": {source}")]
    InvalidPatch {
        /// Name of the affected rule.
        rule: String,
        /// The underlying validation error.
        source: serde_json::Error,
    },
}
