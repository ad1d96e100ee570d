use std::str::FromStr;

use anyhow::{Context, Result};
use jdescriptor::MethodDescriptor;

/// Number of declared parameters in a method descriptor.
pub(crate) fn method_param_count(descriptor: &str) -> Result<usize> {
    let parsed = MethodDescriptor::from_str(descriptor)
        .with_context(|| format!("failed to parse method descriptor {descriptor}"))?;
    Ok(parsed.parameter_types().len())
}

/// Raw return signature of a method descriptor, e.g. `Ljava/lang/String;`.
pub(crate) fn return_signature(descriptor: &str) -> &str {
    match descriptor.split_once(')') {
        Some((_, return_part)) => return_part,
        None => descriptor,
    }
}
