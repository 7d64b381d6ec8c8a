//! Template rendering over node inputs
//!
//! User-supplied templates (parser bodies, conditional expressions, fetch
//! URLs) are opaque Jinja-style programs evaluated with `tera` against a
//! context built from the node's inputs. String inputs that look like JSON
//! are parsed before binding, so `{"age": 16}` arriving as a message
//! string is addressable as `{{ age }}`.

use serde_json::Value;
use tera::{Context, Tera};

use crate::error::{FlowError, Result};
use crate::node::InputMap;

/// Render a one-off template against a prepared context.
pub fn render(template: &str, context: &Context) -> Result<String> {
    Tera::one_off(template, context, false).map_err(|e| {
        FlowError::template(
            collect_error_chain(&e),
            template,
            context_keys(context),
        )
    })
}

/// Build a render context from node inputs using the flat strategy:
/// object-shaped inputs contribute their top-level keys (later inputs win
/// on collision); everything else binds under its target key.
pub fn flat_context(inputs: &InputMap) -> Context {
    let mut context = Context::new();
    for (key, value) in inputs.iter() {
        match bind_value(value.snapshot()) {
            Value::Object(map) => {
                for (k, v) in map {
                    context.insert(k, &v);
                }
            }
            other => context.insert(key.clone(), &other),
        }
    }
    context
}

/// Build a render context using the namespaced strategy: each input nests
/// under its target key.
pub fn namespaced_context(inputs: &InputMap) -> Context {
    let mut context = Context::new();
    for (key, value) in inputs.iter() {
        context.insert(key.clone(), &bind_value(value.snapshot()));
    }
    context
}

/// Parse string values that look like JSON before binding.
fn bind_value(value: Value) -> Value {
    if let Value::String(s) = &value {
        let trimmed = s.trim();
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            if let Ok(parsed) = serde_json::from_str::<Value>(trimmed) {
                return parsed;
            }
        }
    }
    value
}

fn context_keys(context: &Context) -> Vec<String> {
    context
        .clone()
        .into_json()
        .as_object()
        .map(|m| m.keys().cloned().collect())
        .unwrap_or_default()
}

fn collect_error_chain(error: &tera::Error) -> String {
    use std::error::Error as _;
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::FlowValue;
    use serde_json::json;

    fn inputs(pairs: &[(&str, FlowValue)]) -> InputMap {
        let mut map = InputMap::new();
        for (k, v) in pairs {
            map.bind(*k, v.clone());
        }
        map
    }

    #[test]
    fn renders_with_filters() {
        let map = inputs(&[("results", FlowValue::json(json!(["a", "b", "c"])))]);
        let out = render("Count: {{ results | length }}", &namespaced_context(&map)).unwrap();
        assert_eq!(out, "Count: 3");
    }

    #[test]
    fn flat_context_lifts_object_keys() {
        let map = inputs(&[("data", FlowValue::text(r#"{"age": 16}"#))]);
        let out = render(
            "{% if age >= 18 %}adult{% else %}minor{% endif %}",
            &flat_context(&map),
        )
        .unwrap();
        assert_eq!(out, "minor");
    }

    #[test]
    fn flat_collisions_take_the_later_input() {
        let map = inputs(&[
            ("first", FlowValue::json(json!({"x": 1}))),
            ("second", FlowValue::json(json!({"x": 2}))),
        ]);
        let out = render("{{ x }}", &flat_context(&map)).unwrap();
        assert_eq!(out, "2");
    }

    #[test]
    fn namespaced_context_keeps_inputs_apart() {
        let map = inputs(&[
            ("a", FlowValue::json(json!({"x": 1}))),
            ("b", FlowValue::json(json!({"x": 2}))),
        ]);
        let out = render("{{ a.x }}-{{ b.x }}", &namespaced_context(&map)).unwrap();
        assert_eq!(out, "1-2");
    }

    #[test]
    fn failure_carries_template_and_keys() {
        let map = inputs(&[("known", FlowValue::text("v"))]);
        let err = render("{{ missing | length }}", &namespaced_context(&map)).unwrap_err();
        match err {
            FlowError::Template {
                template,
                available_keys,
                ..
            } => {
                assert_eq!(template, "{{ missing | length }}");
                assert_eq!(available_keys, vec!["known".to_string()]);
            }
            other => panic!("expected template error, got {:?}", other),
        }
    }

    #[test]
    fn absent_keys_render_via_or_default() {
        // Merge convergence: downstream templates tolerate missing inputs
        // with an explicit default.
        let map = inputs(&[("input_a", FlowValue::text("from-a"))]);
        let out = render(
            "{{ input_a | default(value=input_b | default(value='')) }}",
            &namespaced_context(&map),
        )
        .unwrap();
        assert_eq!(out, "from-a");
    }
}
