//! Schema-aware coercion of loaded JSON.
//!
//! Earlier clients occasionally wrote whole objects into fields that the
//! renderer expects to be primitive. `sanitize` walks a state-shaped JSON
//! tree and replaces any container found at a scalar field with its compact
//! display string. Everything else passes through, with arrays sanitized
//! element by element.

use serde_json::{Map, Value};

const TASK_SCALARS: &[&str] = &[
    "id",
    "title",
    "description",
    "status",
    "createdAt",
    "completedAt",
    "dueDate",
    "archivedAt",
];

const MICRO_TASK_SCALARS: &[&str] = &[
    "id",
    "title",
    "estimatedMinutes",
    "status",
    "createdAt",
    "completedAt",
];

const THOUGHT_SCALARS: &[&str] = &[
    "id",
    "content",
    "type",
    "status",
    "createdAt",
    "processedAt",
    "linkedTaskId",
];

const FOCUS_SCALARS: &[&str] = &[
    "isActive",
    "currentTaskId",
    "currentMicroTaskId",
    "startTime",
    "duration",
    "pausedTime",
];

/// Which part of the state schema a JSON node sits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Root,
    Task,
    MicroTask,
    Thought,
    Focus,
    /// Outside the schema; passed through.
    Opaque,
}

impl Shape {
    /// Fields that must hold primitives.
    pub fn scalar_fields(self) -> &'static [&'static str] {
        match self {
            Shape::Task => TASK_SCALARS,
            Shape::MicroTask => MICRO_TASK_SCALARS,
            Shape::Thought => THOUGHT_SCALARS,
            Shape::Focus => FOCUS_SCALARS,
            Shape::Root | Shape::Opaque => &[],
        }
    }

    fn child(self, field: &str) -> Shape {
        match (self, field) {
            (Shape::Root, "tasks") => Shape::Task,
            (Shape::Root, "thoughts") => Shape::Thought,
            (Shape::Root, "focus") => Shape::Focus,
            (Shape::Task, "microTasks") => Shape::MicroTask,
            _ => Shape::Opaque,
        }
    }

    fn is_scalar(self, field: &str) -> bool {
        self.scalar_fields().contains(&field)
    }
}

/// Text form of any JSON value.
///
/// Containers become compact JSON text; `null` has no text.
pub fn display_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}

/// Sanitize a state-shaped JSON document.
pub fn sanitize(node: &Value) -> Value {
    sanitize_with_report(node).0
}

/// Sanitize and also return the paths of every coerced field.
pub fn sanitize_with_report(node: &Value) -> (Value, Vec<String>) {
    let mut coerced = Vec::new();
    let value = walk(node, Shape::Root, "", &mut coerced);
    (value, coerced)
}

fn walk(node: &Value, shape: Shape, path: &str, coerced: &mut Vec<String>) -> Value {
    match node {
        Value::Array(items) => Value::Array(
            items
                .iter()
                .enumerate()
                .map(|(i, item)| walk(item, shape, &format!("{path}[{i}]"), coerced))
                .collect(),
        ),
        Value::Object(fields) => {
            let mut out = Map::with_capacity(fields.len());
            for (key, value) in fields {
                let field_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                let sanitized = if shape.is_scalar(key) && is_container(value) {
                    coerced.push(field_path);
                    Value::String(value.to_string())
                } else {
                    walk(value, shape.child(key), &field_path, coerced)
                };
                out.insert(key.clone(), sanitized);
            }
            Value::Object(out)
        }
        primitive => primitive.clone(),
    }
}

fn is_container(value: &Value) -> bool {
    matches!(value, Value::Array(_) | Value::Object(_))
}
