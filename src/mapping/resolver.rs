use crate::mapping::{MappingSpec, Rule};
use serde_json::{Map, Value};

/// Builds one target payload from one source document.
///
/// Pure and total: every mapped target field is present in the output, with
/// `""` standing in for anything that could not be resolved.
pub fn resolve(event: &Value, spec: &MappingSpec) -> Value {
    let mut payload = Map::new();
    for entry in spec.entries() {
        let value = resolve_rule(event, &entry.rule);
        insert_nested(&mut payload, &entry.target, value);
    }
    Value::Object(payload)
}

fn resolve_rule(event: &Value, rule: &Rule) -> Value {
    match rule {
        Rule::Static(literal) => Value::String(literal.clone()),
        Rule::Lookup(paths) => paths
            .iter()
            .find_map(|p| p.lookup_present(event))
            .cloned()
            .unwrap_or_else(empty),
        Rule::Transform {
            func: Some(func),
            source,
            ..
        } => func.apply(source.as_ref().and_then(|p| p.lookup_present(event))),
        Rule::Transform { func: None, .. } | Rule::Unrecognized(_) => empty(),
    }
}

fn empty() -> Value {
    Value::String(String::new())
}

/// Writes `value` at a dotted path, creating intermediate objects. A non-object
/// value sitting on an intermediate segment is replaced.
fn insert_nested(root: &mut Map<String, Value>, dotted: &str, value: Value) {
    let mut segments = dotted.split('.').collect::<Vec<_>>();
    let Some(last) = segments.pop() else {
        return;
    };
    let mut cur = root;
    for seg in segments {
        let slot = cur
            .entry(seg.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        let Value::Object(map) = slot else {
            return;
        };
        cur = map;
    }
    cur.insert(last.to_string(), value);
}
