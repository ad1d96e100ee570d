use anyhow::Result;
use serde_sarif::sarif::{
    ArtifactLocation, Location, LogicalLocation, Message, PhysicalLocation, Region,
    Result as SarifResult,
};

use crate::engine::AnalysisContext;

pub(crate) mod functional_interface;
pub(crate) mod suspicious_loop;

/// Metadata describing an analysis rule.
#[derive(Clone, Debug)]
pub(crate) struct RuleMetadata {
    pub(crate) id: &'static str,
    pub(crate) name: &'static str,
    pub(crate) description: &'static str,
}

/// Rule interface for analysis execution.
pub(crate) trait Rule {
    fn metadata(&self) -> RuleMetadata;
    fn run(&self, context: &AnalysisContext) -> Result<Vec<SarifResult>>;
}

pub(crate) fn all_rules() -> Vec<Box<dyn Rule>> {
    vec![
        Box::new(functional_interface::FunctionalInterfaceRule),
        Box::new(suspicious_loop::SuspiciousLoopRule),
    ]
}

pub(crate) fn method_logical_location(
    class_name: &str,
    method_name: &str,
    descriptor: &str,
) -> LogicalLocation {
    LogicalLocation::builder()
        .name(format!("{class_name}.{method_name}{descriptor}"))
        .kind("function")
        .build()
}

pub(crate) fn method_location_with_line(
    class_name: &str,
    method_name: &str,
    descriptor: &str,
    artifact_uri: Option<&str>,
    line: Option<i64>,
) -> Location {
    let logical = method_logical_location(class_name, method_name, descriptor);
    let artifact = artifact_uri.map(|uri| ArtifactLocation::builder().uri(uri).build());
    let region = line.map(|line| Region::builder().start_line(line).build());
    let physical = match (artifact, region) {
        (Some(artifact), Some(region)) => Some(
            PhysicalLocation::builder()
                .artifact_location(artifact)
                .region(region)
                .build(),
        ),
        (Some(artifact), None) => Some(
            PhysicalLocation::builder()
                .artifact_location(artifact)
                .build(),
        ),
        (None, Some(region)) => Some(PhysicalLocation::builder().region(region).build()),
        (None, None) => None,
    };
    match physical {
        Some(physical) => Location::builder()
            .logical_locations(vec![logical])
            .physical_location(physical)
            .build(),
        None => Location::builder().logical_locations(vec![logical]).build(),
    }
}

pub(crate) fn result_message(text: impl Into<String>) -> Message {
    Message::builder().text(text.into()).build()
}
