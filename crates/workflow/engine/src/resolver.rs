//! `${...}` interpolation of descriptor templates
//!
//! A reference names a scope variable or a property, optionally followed
//! by dotted segments that walk into JSON objects and arrays:
//! `${entry.workflow_name}`, `${order.lines.0.sku}`.

use crate::TransientScope;
use serde_json::Value;
use workflow_store::PropertySet;
use workflow_types::Args;

/// Turns templates into values
pub trait VariableResolver: Send + Sync {
    /// Interpolate `template`. `None` means the template is a single
    /// reference that resolved to nothing.
    fn translate_variables(
        &self,
        template: &str,
        scope: &TransientScope,
        ps: &PropertySet,
    ) -> Option<Value>;
}

/// Scope first, then the property set
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultVariableResolver;

impl DefaultVariableResolver {
    pub fn new() -> Self {
        Self
    }

    fn resolve(&self, path: &str, scope: &TransientScope, ps: &PropertySet) -> Option<Value> {
        let mut segments = path.trim().split('.');
        let root = segments.next()?;
        let mut value = scope.lookup(root).or_else(|| ps.get(root))?;
        for segment in segments {
            value = match value {
                Value::Object(mut map) => map.remove(segment)?,
                Value::Array(mut items) => {
                    let index = segment.parse::<usize>().ok()?;
                    if index >= items.len() {
                        return None;
                    }
                    items.swap_remove(index)
                }
                _ => return None,
            };
        }
        Some(value)
    }
}

impl VariableResolver for DefaultVariableResolver {
    fn translate_variables(
        &self,
        template: &str,
        scope: &TransientScope,
        ps: &PropertySet,
    ) -> Option<Value> {
        if !template.contains("${") {
            return Some(Value::String(template.to_string()));
        }

        // Whole-value substitution keeps the referenced value's type
        let trimmed = template.trim();
        if let Some(inner) = trimmed
            .strip_prefix("${")
            .and_then(|rest| rest.strip_suffix('}'))
        {
            if !inner.contains("${") && !inner.contains('}') {
                return self.resolve(inner, scope, ps);
            }
        }

        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find('}') {
                Some(end) => {
                    let rendered = self.resolve(&after[..end], scope, ps);
                    out.push_str(&render(rendered));
                    rest = &after[end + 1..];
                }
                None => {
                    // Unterminated reference stays literal
                    out.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        Some(Value::String(out))
    }
}

/// String form of an interpolated value. Missing and null render empty.
pub fn render(value: Option<Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
    }
}

/// Interpolate every argument value
pub fn translate_args(
    resolver: &dyn VariableResolver,
    args: &Args,
    scope: &TransientScope,
    ps: &PropertySet,
) -> Args {
    args.iter()
        .map(|(key, template)| {
            let value = resolver.translate_variables(template, scope, ps);
            (key.clone(), render(value))
        })
        .collect()
}
