//! Startup validation report.
//!
//! [`crate::registry::Registry::preflight`] resolves every registered map up
//! front so a broken configuration is reported before first use. The report
//! is deterministic: rows are sorted and classes deduplicated.

use crate::concept::ConceptId;
use crate::error::{ConceptError, DefinitionKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

pub const PREFLIGHT_REPORT_KIND: &str = "conmap.preflight.v1";
pub const PREFLIGHT_REPORT_SCHEMA: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PreflightFailure {
    pub concept: ConceptId,
    pub model: String,
    pub map_kind: DefinitionKind,
    pub failure_class: String,
    pub message: String,
}

impl PreflightFailure {
    pub(crate) fn new(
        concept: &ConceptId,
        model: &str,
        map_kind: DefinitionKind,
        error: &ConceptError,
    ) -> Self {
        Self {
            concept: concept.clone(),
            model: model.to_string(),
            map_kind,
            failure_class: error.failure_class().to_string(),
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PreflightReport {
    pub schema: u32,
    pub report_kind: String,
    pub result: String,
    pub checked: usize,
    pub failure_classes: Vec<String>,
    pub failures: Vec<PreflightFailure>,
}

impl PreflightReport {
    pub(crate) fn from_failures(checked: usize, mut failures: Vec<PreflightFailure>) -> Self {
        failures.sort_by(|a, b| {
            (&a.concept, &a.model, &a.failure_class, &a.message).cmp(&(
                &b.concept,
                &b.model,
                &b.failure_class,
                &b.message,
            ))
        });
        let failure_classes: Vec<String> = failures
            .iter()
            .map(|failure| failure.failure_class.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        Self {
            schema: PREFLIGHT_REPORT_SCHEMA,
            report_kind: PREFLIGHT_REPORT_KIND.to_string(),
            result: if failures.is_empty() {
                "accepted".to_string()
            } else {
                "rejected".to_string()
            },
            checked,
            failure_classes,
            failures,
        }
    }

    pub fn accepted(&self) -> bool {
        self.result == "accepted"
    }

    pub fn to_json(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}
