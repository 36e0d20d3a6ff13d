//! Output variables shared between steps, levels and regions

use crate::core::step::{RegionDeployType, StepOutput};
use std::collections::HashMap;

/// Merged step outputs: variables key -> (variable name -> value)
pub type StepOutputVariables = HashMap<String, HashMap<String, String>>;

/// Key under which a step's variables are merged
///
/// Primary runs use the bare step name, regional runs append `-regional`.
pub fn variables_key(step_name: &str, deploy_type: RegionDeployType) -> String {
    match deploy_type.key_suffix() {
        Some(suffix) => format!("{}-{}", step_name, suffix),
        None => step_name.to_string(),
    }
}

/// Key under which a region run's variables seed a destroy pass
pub fn execution_key(deploy_type: RegionDeployType, region: &str) -> String {
    format!("{}-{}", deploy_type, region)
}

/// String form of a scalar output value
pub fn scalar_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Merge one step's output into the mapping
///
/// Only the step's own key is written; every other key is left untouched.
/// Callers own the mapping exclusively while merging.
pub fn append_step_output(mut mapping: StepOutputVariables, output: &StepOutput) -> StepOutputVariables {
    let key = variables_key(&output.step_name, output.region_deploy_type);
    let entry = mapping.entry(key).or_default();

    for (name, value) in &output.output_variables {
        entry.insert(name.clone(), scalar_to_string(value));
    }

    mapping
}
