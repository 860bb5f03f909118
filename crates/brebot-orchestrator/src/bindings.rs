//! Step input bindings.
//!
//! A string input of the exact form `${steps.N.path.to.value}` is replaced,
//! at execution time, with the value found at that path in the outputs of
//! step `N` of the same job. Bindings may appear at any depth of the inputs
//! object. Anything else is passed through unchanged.

use brebot_core::{BrebotError, BrebotResult};
use serde_json::Value;

const PREFIX: &str = "${steps.";

/// A parsed `${steps.N.path}` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding<'a> {
    pub step_no: u32,
    pub path: Vec<&'a str>,
}

/// Parse a single string as a binding. `None` if it is not one.
pub fn parse(text: &str) -> Option<Binding<'_>> {
    let inner = text.trim().strip_prefix(PREFIX)?.strip_suffix('}')?;
    let mut parts = inner.split('.');
    let step_no = parts.next()?.parse::<u32>().ok()?;
    let path: Vec<&str> = parts.collect();
    if path.iter().any(|p| p.is_empty()) {
        return None;
    }
    Some(Binding { step_no, path })
}

/// Step numbers referenced anywhere in `inputs`.
pub fn references(inputs: &Value) -> Vec<u32> {
    let mut found = Vec::new();
    collect(inputs, &mut found);
    found
}

fn collect(value: &Value, found: &mut Vec<u32>) {
    match value {
        Value::String(s) => {
            if let Some(binding) = parse(s) {
                found.push(binding.step_no);
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect(v, found)),
        Value::Object(map) => map.values().for_each(|v| collect(v, found)),
        _ => {}
    }
}

/// Replace every binding in `inputs` using `outputs_of(step_no)`.
///
/// Fails with an execution error when the referenced step has no outputs or
/// the path does not exist in them.
pub fn resolve<'o, F>(inputs: &Value, outputs_of: F) -> BrebotResult<Value>
where
    F: Fn(u32) -> Option<&'o Value> + Copy,
{
    match inputs {
        Value::String(s) => match parse(s) {
            Some(binding) => lookup(&binding, outputs_of),
            None => Ok(inputs.clone()),
        },
        Value::Array(items) => items
            .iter()
            .map(|v| resolve(v, outputs_of))
            .collect::<BrebotResult<Vec<_>>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut resolved = serde_json::Map::with_capacity(map.len());
            for (key, value) in map {
                resolved.insert(key.clone(), resolve(value, outputs_of)?);
            }
            Ok(Value::Object(resolved))
        }
        other => Ok(other.clone()),
    }
}

fn lookup<'o, F>(binding: &Binding<'_>, outputs_of: F) -> BrebotResult<Value>
where
    F: Fn(u32) -> Option<&'o Value>,
{
    let mut current = outputs_of(binding.step_no).ok_or_else(|| {
        BrebotError::Execution(format!("step {} has no outputs to bind", binding.step_no))
    })?;
    for segment in &binding.path {
        let next = match current {
            Value::Object(map) => map.get(*segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        current = next.ok_or_else(|| {
            BrebotError::Execution(format!(
                "binding steps.{}.{} not found in outputs",
                binding.step_no,
                binding.path.join(".")
            ))
        })?;
    }
    Ok(current.clone())
}
