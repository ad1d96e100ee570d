use anyhow::Result;
use serde_sarif::sarif::{Artifact, Result as SarifResult};

use crate::ir::Class;
use crate::rules::all_rules;

/// Per-run analysis state shared by all rules.
pub(crate) struct AnalysisContext {
    pub(crate) classes: Vec<Class>,
    artifact_uris: Vec<Option<String>>,
}

pub(crate) fn build_context(classes: Vec<Class>, artifacts: &[Artifact]) -> AnalysisContext {
    let artifact_uris = artifacts
        .iter()
        .map(|artifact| {
            artifact
                .location
                .as_ref()
                .and_then(|location| location.uri.clone())
        })
        .collect();
    AnalysisContext {
        classes,
        artifact_uris,
    }
}

impl AnalysisContext {
    /// Classes scanned from the explicit input, as opposed to classpath entries.
    pub(crate) fn analysis_target_classes(&self) -> impl Iterator<Item = &Class> {
        self.classes.iter().filter(|class| class.is_target)
    }

    pub(crate) fn class_artifact_uri(&self, class: &Class) -> Option<&str> {
        usize::try_from(class.artifact_index)
            .ok()
            .and_then(|index| self.artifact_uris.get(index))
            .and_then(|uri| uri.as_deref())
    }
}

/// Run every registered rule serially and collect the results.
pub(crate) fn run_rules(context: &AnalysisContext) -> Result<Vec<SarifResult>> {
    let mut results = Vec::new();
    for rule in all_rules() {
        results.extend(rule.run(context)?);
    }
    Ok(results)
}
