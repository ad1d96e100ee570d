use anyhow::Result;
use serde_sarif::sarif::Result as SarifResult;

use crate::engine::AnalysisContext;
use crate::rules::{Rule, RuleMetadata};

/// Rule that will flag collection-membership searches written as loops.
pub(crate) struct SuspiciousLoopRule;

impl Rule for SuspiciousLoopRule {
    fn metadata(&self) -> RuleMetadata {
        RuleMetadata {
            id: "SUSPICIOUS_LOOP_SEARCH",
            name: "Suspicious loop search",
            description: "Loops that scan a collection for a match instead of using contains",
        }
    }

    fn run(&self, _context: &AnalysisContext) -> Result<Vec<SarifResult>> {
        // TODO: Implement the loop-shape scan once local-variable flow is indexed.
        Ok(Vec::new())
    }
}
