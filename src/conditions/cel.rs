//! A [`PredicateCompiler`] backed by `cel-interpreter`, a pure-Rust
//! implementation of the Common Expression Language. This is the reference
//! implementation of the "predicate compiler" external contract; nothing
//! outside this module knows `cel-interpreter`'s types.

use super::{CompiledPredicate, PredicateCompiler};
use cel_interpreter::{Context as CelContext, Program, Value as CelValue};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct CelPredicateCompiler;

impl CelPredicateCompiler {
    pub fn new() -> Self {
        Self
    }
}

impl PredicateCompiler for CelPredicateCompiler {
    fn compile(&self, expression: &str) -> anyhow::Result<Arc<dyn CompiledPredicate>> {
        let program = Program::compile(expression)
            .map_err(|e| anyhow::anyhow!("failed to compile condition expression: {e}"))?;
        Ok(Arc::new(CelPredicate { program }))
    }
}

struct CelPredicate {
    program: Program,
}

impl CompiledPredicate for CelPredicate {
    fn evaluate(&self, context: &HashMap<String, Value>) -> anyhow::Result<bool> {
        let mut cel_context = CelContext::default();
        for (key, value) in context {
            cel_context
                .add_variable(key.as_str(), json_to_cel(value))
                .map_err(|e| anyhow::anyhow!("failed to bind '{key}' into condition context: {e}"))?;
        }

        let result = self
            .program
            .execute(&cel_context)
            .map_err(|e| anyhow::anyhow!("condition expression raised: {e}"))?;

        // Strict boolean equality: a non-boolean result does not count as
        // true, and is not treated as an error either.
        Ok(matches!(result, CelValue::Bool(true)))
    }
}

/// Converts a `serde_json::Value` into a `cel_interpreter::Value` without
/// relying on any crate-specific `From`/`TryFrom` conversions, so this stays
/// correct across minor `cel-interpreter` versions.
fn json_to_cel(value: &Value) -> CelValue {
    match value {
        Value::Null => CelValue::Null,
        Value::Bool(b) => CelValue::Bool(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                CelValue::Int(i)
            } else if let Some(u) = n.as_u64() {
                CelValue::UInt(u)
            } else {
                CelValue::Float(n.as_f64().unwrap_or_default())
            }
        }
        Value::String(s) => CelValue::String(Arc::new(s.clone())),
        Value::Array(items) => {
            CelValue::List(Arc::new(items.iter().map(json_to_cel).collect()))
        }
        Value::Object(map) => {
            let converted: HashMap<cel_interpreter::objects::Key, CelValue> = map
                .iter()
                .map(|(k, v)| (cel_interpreter::objects::Key::String(Arc::new(k.clone())), json_to_cel(v)))
                .collect();
            CelValue::Map(cel_interpreter::objects::Map::from(converted))
        }
    }
}
