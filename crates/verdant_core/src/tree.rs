//! # Document Tree Patching
//!
//! The server keeps one nested document per room and streams changes to it
//! as ordered `add` / `replace` / `remove` operations.
//!
//! ```text
//!   PatchOp { kind, path, value }
//!        │
//!        ▼
//!   path: /child/data/userSlots/0/data/coinsCount
//!         ─────┬──── ───┬──── ──┬─── ─┬─ ────┬────
//!            Key      Key     Key   Index   Key
//! ```
//!
//! `add` creates missing intermediate objects (a `null` on the way is
//! replaced by an object). `replace` and `remove` require the full path to
//! resolve. Array `add` at `len` (or `-`) appends; beyond `len` is an error.
//!
//! [`diff`] produces the operations turning one document into another. It
//! exists so the patch engine can be checked against arbitrary trees.

use std::borrow::Cow;
use std::fmt;

use serde_json::{Map, Value};

use crate::error::PatchError;

/// One step of a patch path.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// Object key (also parsed as an index when it lands on an array).
    Key(String),
    /// Array index.
    Index(usize),
}

impl PathSegment {
    /// The segment as an object key.
    #[must_use]
    pub fn as_key(&self) -> Cow<'_, str> {
        match self {
            Self::Key(key) => Cow::Borrowed(key),
            Self::Index(index) => Cow::Owned(index.to_string()),
        }
    }

    /// The segment as an existing array index.
    #[must_use]
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Self::Index(index) => Some(*index),
            Self::Key(key) if key.bytes().all(|b| b.is_ascii_digit()) => key.parse().ok(),
            Self::Key(_) => None,
        }
    }

    /// The segment as an insertion index; `-` means the end of the array.
    fn as_insert_index(&self, len: usize) -> Option<usize> {
        match self {
            Self::Key(key) if key == "-" => Some(len),
            other => other.as_index(),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        Self::Key(key.to_owned())
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

/// Kind of a patch operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PatchKind {
    /// Insert or overwrite, creating intermediates.
    Add,
    /// Overwrite an existing value.
    Replace,
    /// Delete an existing value.
    Remove,
}

impl PatchKind {
    /// Parses the wire name of an operation.
    ///
    /// # Errors
    ///
    /// Returns [`PatchError::UnknownOp`] for anything but add / replace / remove.
    pub fn parse(name: &str) -> Result<Self, PatchError> {
        match name {
            "add" => Ok(Self::Add),
            "replace" => Ok(Self::Replace),
            "remove" => Ok(Self::Remove),
            other => Err(PatchError::UnknownOp(other.to_owned())),
        }
    }
}

/// A single tree mutation.
#[derive(Clone, Debug, PartialEq)]
pub struct PatchOp {
    /// What to do.
    pub kind: PatchKind,
    /// Where to do it. Empty means the document root.
    pub path: Vec<PathSegment>,
    /// New value for add / replace.
    pub value: Option<Value>,
}

impl PatchOp {
    /// Creates an `add` operation.
    #[must_use]
    pub fn add(path: Vec<PathSegment>, value: Value) -> Self {
        Self {
            kind: PatchKind::Add,
            path,
            value: Some(value),
        }
    }

    /// Creates a `replace` operation.
    #[must_use]
    pub fn replace(path: Vec<PathSegment>, value: Value) -> Self {
        Self {
            kind: PatchKind::Replace,
            path,
            value: Some(value),
        }
    }

    /// Creates a `remove` operation.
    #[must_use]
    pub fn remove(path: Vec<PathSegment>) -> Self {
        Self {
            kind: PatchKind::Remove,
            path,
            value: None,
        }
    }

    /// Decodes one wire operation `{op, path, value?}`.
    ///
    /// `path` is either a JSON Pointer string or an array of string / integer
    /// segments.
    ///
    /// # Errors
    ///
    /// Returns a [`PatchError`] when the op name, path or value is malformed.
    pub fn from_wire(raw: &Value) -> Result<Self, PatchError> {
        let object = raw
            .as_object()
            .ok_or_else(|| PatchError::Malformed("op is not an object".into()))?;
        let kind = object
            .get("op")
            .and_then(Value::as_str)
            .ok_or_else(|| PatchError::Malformed("missing `op`".into()))
            .and_then(PatchKind::parse)?;
        let path = match object.get("path") {
            Some(Value::String(pointer)) => parse_pointer(pointer)?,
            Some(Value::Array(segments)) => segments
                .iter()
                .map(|segment| match segment {
                    Value::String(key) => Ok(PathSegment::Key(key.clone())),
                    Value::Number(n) => n
                        .as_u64()
                        .map(|i| PathSegment::Index(i as usize))
                        .ok_or_else(|| PatchError::Malformed(format!("bad index {n}"))),
                    other => Err(PatchError::Malformed(format!("bad path segment {other}"))),
                })
                .collect::<Result<_, _>>()?,
            _ => return Err(PatchError::Malformed("missing `path`".into())),
        };
        let value = object.get("value").cloned();
        if kind != PatchKind::Remove && value.is_none() {
            return Err(PatchError::MissingValue {
                path: render_pointer(&path),
            });
        }
        Ok(Self { kind, path, value })
    }
}

impl fmt::Display for PatchOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.kind {
            PatchKind::Add => "add",
            PatchKind::Replace => "replace",
            PatchKind::Remove => "remove",
        };
        write!(f, "{name} {}", render_pointer(&self.path))
    }
}

/// Parses an RFC 6901 JSON Pointer into key segments.
///
/// # Errors
///
/// Returns [`PatchError::InvalidPointer`] when a non-empty pointer does not
/// start with `/` or contains a bad `~` escape.
pub fn parse_pointer(pointer: &str) -> Result<Vec<PathSegment>, PatchError> {
    if pointer.is_empty() {
        return Ok(Vec::new());
    }
    let Some(rest) = pointer.strip_prefix('/') else {
        return Err(PatchError::InvalidPointer(pointer.to_owned()));
    };
    rest.split('/')
        .map(|token| unescape(token).ok_or_else(|| PatchError::InvalidPointer(pointer.to_owned())))
        .map(|token| token.map(PathSegment::Key))
        .collect()
}

fn unescape(token: &str) -> Option<String> {
    let mut out = String::with_capacity(token.len());
    let mut chars = token.chars();
    while let Some(c) = chars.next() {
        if c == '~' {
            match chars.next() {
                Some('0') => out.push('~'),
                Some('1') => out.push('/'),
                _ => return None,
            }
        } else {
            out.push(c);
        }
    }
    Some(out)
}

/// Renders a path as a JSON Pointer.
#[must_use]
pub fn render_pointer(path: &[PathSegment]) -> String {
    path.iter().fold(String::new(), |mut out, segment| {
        out.push('/');
        out.push_str(&segment.as_key().replace('~', "~0").replace('/', "~1"));
        out
    })
}

/// Applies one operation to `doc`.
///
/// # Errors
///
/// Returns a [`PatchError`] when the operation cannot apply; `doc` is left
/// unchanged in that case.
pub fn apply(doc: &mut Value, op: &PatchOp) -> Result<(), PatchError> {
    match op.kind {
        PatchKind::Add => add(doc, &op.path, value_of(op)?),
        PatchKind::Replace => {
            let value = value_of(op)?;
            let target = resolve_mut(doc, &op.path).ok_or_else(|| PatchError::Unresolved {
                path: render_pointer(&op.path),
            })?;
            *target = value;
            Ok(())
        }
        PatchKind::Remove => remove(doc, &op.path),
    }
}

fn value_of(op: &PatchOp) -> Result<Value, PatchError> {
    op.value.clone().ok_or_else(|| PatchError::MissingValue {
        path: render_pointer(&op.path),
    })
}

fn add(doc: &mut Value, path: &[PathSegment], value: Value) -> Result<(), PatchError> {
    let Some((last, parents)) = path.split_last() else {
        *doc = value;
        return Ok(());
    };

    // Validate the whole walk first so a failing op never leaves stray
    // intermediates behind.
    check_add(doc, path)?;

    let mut current = doc;
    for segment in parents {
        current = step_or_create(current, segment);
    }
    if current.is_null() {
        *current = Value::Object(Map::new());
    }
    match current {
        Value::Object(map) => {
            map.insert(last.as_key().into_owned(), value);
        }
        Value::Array(items) => {
            // Bounds were checked above.
            let index = last.as_insert_index(items.len()).unwrap_or(items.len());
            items.insert(index.min(items.len()), value);
        }
        _ => {}
    }
    Ok(())
}

fn check_add(doc: &Value, path: &[PathSegment]) -> Result<(), PatchError> {
    let mut current = Some(doc);
    for (depth, segment) in path.iter().enumerate() {
        match current {
            None | Some(Value::Null | Value::Object(_)) => {
                current = current.and_then(|v| v.get(segment.as_key().as_ref()));
            }
            Some(Value::Array(items)) => {
                let index = segment
                    .as_insert_index(items.len())
                    .ok_or_else(|| PatchError::Unresolved {
                        path: render_pointer(&path[..=depth]),
                    })?;
                if index > items.len() {
                    return Err(PatchError::IndexOutOfBounds {
                        path: render_pointer(&path[..=depth]),
                        index,
                        len: items.len(),
                    });
                }
                current = items.get(index);
            }
            Some(_) => {
                return Err(PatchError::NotAContainer {
                    path: render_pointer(&path[..depth]),
                });
            }
        }
    }
    Ok(())
}

fn step_or_create<'a>(current: &'a mut Value, segment: &PathSegment) -> &'a mut Value {
    if current.is_null() {
        *current = Value::Object(Map::new());
    }
    match current {
        Value::Array(items) => {
            let len = items.len();
            let index = segment.as_insert_index(len).unwrap_or(len);
            if index >= len {
                items.push(Value::Object(Map::new()));
            }
            let last = items.len() - 1;
            &mut items[index.min(last)]
        }
        Value::Object(map) => map
            .entry(segment.as_key().into_owned())
            .or_insert_with(|| Value::Object(Map::new())),
        // check_add rejects scalars before we get here.
        other => other,
    }
}

fn resolve_mut<'a>(doc: &'a mut Value, path: &[PathSegment]) -> Option<&'a mut Value> {
    path.iter().try_fold(doc, |current, segment| match current {
        Value::Object(map) => map.get_mut(segment.as_key().as_ref()),
        Value::Array(items) => segment.as_index().and_then(|i| items.get_mut(i)),
        _ => None,
    })
}

fn remove(doc: &mut Value, path: &[PathSegment]) -> Result<(), PatchError> {
    let Some((last, parents)) = path.split_last() else {
        return Err(PatchError::RootRemoval);
    };
    let unresolved = || PatchError::Unresolved {
        path: render_pointer(path),
    };
    match resolve_mut(doc, parents).ok_or_else(unresolved)? {
        Value::Object(map) => map
            .remove(last.as_key().as_ref())
            .map(drop)
            .ok_or_else(unresolved),
        Value::Array(items) => match last.as_index() {
            Some(index) if index < items.len() => {
                items.remove(index);
                Ok(())
            }
            _ => Err(unresolved()),
        },
        _ => Err(unresolved()),
    }
}

/// Computes operations that turn `source` into `target`.
///
/// Applying the result to a copy of `source` in order yields `target`.
#[must_use]
pub fn diff(source: &Value, target: &Value) -> Vec<PatchOp> {
    let mut ops = Vec::new();
    let mut path = Vec::new();
    diff_into(source, target, &mut path, &mut ops);
    ops
}

fn diff_into(source: &Value, target: &Value, path: &mut Vec<PathSegment>, ops: &mut Vec<PatchOp>) {
    match (source, target) {
        (Value::Object(from), Value::Object(to)) => {
            for key in from.keys().filter(|key| !to.contains_key(*key)) {
                path.push(PathSegment::Key(key.clone()));
                ops.push(PatchOp::remove(path.clone()));
                path.pop();
            }
            for (key, value) in to {
                path.push(PathSegment::Key(key.clone()));
                match from.get(key) {
                    Some(old) => diff_into(old, value, path, ops),
                    None => ops.push(PatchOp::add(path.clone(), value.clone())),
                }
                path.pop();
            }
        }
        (Value::Array(from), Value::Array(to)) => {
            let common = from.len().min(to.len());
            for (index, (old, new)) in from.iter().zip(to).enumerate() {
                path.push(PathSegment::Index(index));
                diff_into(old, new, path, ops);
                path.pop();
            }
            for (index, value) in to.iter().enumerate().skip(common) {
                path.push(PathSegment::Index(index));
                ops.push(PatchOp::add(path.clone(), value.clone()));
                path.pop();
            }
            // Back to front so earlier indices stay valid.
            for index in (common..from.len()).rev() {
                path.push(PathSegment::Index(index));
                ops.push(PatchOp::remove(path.clone()));
                path.pop();
            }
        }
        _ if source == target => {}
        _ => ops.push(PatchOp::replace(path.clone(), target.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(pointer: &str) -> Vec<PathSegment> {
        parse_pointer(pointer).unwrap()
    }

    #[test]
    fn test_pointer_unescapes_tilde_and_slash() {
        assert_eq!(
            path("/a~1b/c~0d/0"),
            vec!["a/b".into(), "c~d".into(), PathSegment::Key("0".into())]
        );
        assert_eq!(render_pointer(&path("/a~1b/c~0d")), "/a~1b/c~0d");
        assert!(parse_pointer("no-slash").is_err());
        assert!(parse_pointer("/bad~2").is_err());
        assert!(path("").is_empty());
    }

    #[test]
    fn test_add_creates_intermediates_over_null() {
        let mut doc = json!({"a": null});
        apply(&mut doc, &PatchOp::add(path("/a/b/c"), json!(1))).unwrap();
        assert_eq!(doc, json!({"a": {"b": {"c": 1}}}));
    }

    #[test]
    fn test_add_appends_at_len_and_rejects_beyond() {
        let mut doc = json!({"list": [1, 2]});
        apply(&mut doc, &PatchOp::add(path("/list/2"), json!(3))).unwrap();
        apply(&mut doc, &PatchOp::add(path("/list/-"), json!(4))).unwrap();
        assert_eq!(doc, json!({"list": [1, 2, 3, 4]}));

        let err = apply(&mut doc, &PatchOp::add(path("/list/9"), json!(0))).unwrap_err();
        assert!(matches!(err, PatchError::IndexOutOfBounds { index: 9, len: 4, .. }));
        assert_eq!(doc, json!({"list": [1, 2, 3, 4]}));
    }

    #[test]
    fn test_add_through_scalar_fails_without_side_effects() {
        let mut doc = json!({"a": 5});
        let err = apply(&mut doc, &PatchOp::add(path("/a/b"), json!(1))).unwrap_err();
        assert!(matches!(err, PatchError::NotAContainer { .. }));
        assert_eq!(doc, json!({"a": 5}));
    }

    #[test]
    fn test_replace_requires_existing_path() {
        let mut doc = json!({"a": {"b": 1}});
        apply(&mut doc, &PatchOp::replace(path("/a/b"), json!(2))).unwrap();
        assert_eq!(doc, json!({"a": {"b": 2}}));

        let err = apply(&mut doc, &PatchOp::replace(path("/a/missing"), json!(3))).unwrap_err();
        assert!(matches!(err, PatchError::Unresolved { .. }));
    }

    #[test]
    fn test_remove_object_key_and_array_element() {
        let mut doc = json!({"a": {"b": 1, "c": 2}, "list": [1, 2, 3]});
        apply(&mut doc, &PatchOp::remove(path("/a/b"))).unwrap();
        apply(&mut doc, &PatchOp::remove(path("/list/1"))).unwrap();
        assert_eq!(doc, json!({"a": {"c": 2}, "list": [1, 3]}));

        assert!(apply(&mut doc, &PatchOp::remove(path("/a/b"))).is_err());
        assert!(apply(&mut doc, &PatchOp::remove(path("/list/5"))).is_err());
        assert_eq!(apply(&mut doc, &PatchOp::remove(Vec::new())), Err(PatchError::RootRemoval));
    }

    #[test]
    fn test_root_add_and_replace() {
        let mut doc = json!({"a": 1});
        apply(&mut doc, &PatchOp::replace(Vec::new(), json!([1]))).unwrap();
        assert_eq!(doc, json!([1]));
        apply(&mut doc, &PatchOp::add(Vec::new(), json!({"b": 2}))).unwrap();
        assert_eq!(doc, json!({"b": 2}));
    }

    #[test]
    fn test_from_wire_accepts_both_path_forms() {
        let op = PatchOp::from_wire(&json!({"op": "add", "path": "/a/0", "value": 1})).unwrap();
        assert_eq!(op.kind, PatchKind::Add);
        assert_eq!(op.path, vec!["a".into(), PathSegment::Key("0".into())]);

        let op = PatchOp::from_wire(&json!({"op": "remove", "path": ["a", 3]})).unwrap();
        assert_eq!(op.path, vec!["a".into(), PathSegment::Index(3)]);
        assert_eq!(op.value, None);
    }

    #[test]
    fn test_from_wire_rejects_malformed_ops() {
        assert!(PatchOp::from_wire(&json!("nope")).is_err());
        assert!(matches!(
            PatchOp::from_wire(&json!({"op": "move", "path": "/a"})),
            Err(PatchError::UnknownOp(_))
        ));
        assert!(matches!(
            PatchOp::from_wire(&json!({"op": "add", "path": "/a"})),
            Err(PatchError::MissingValue { .. })
        ));
        assert!(PatchOp::from_wire(&json!({"op": "add", "value": 1})).is_err());
    }

    #[test]
    fn test_diff_then_apply_reaches_target() {
        let source = json!({"keep": 1, "gone": true, "list": [1, 2, 3], "nested": {"x": [0]}});
        let target = json!({"keep": 2, "list": [1], "nested": {"x": [0, {"y": null}]}, "new": "v"});
        let mut doc = source.clone();
        for op in diff(&source, &target) {
            apply(&mut doc, &op).unwrap();
        }
        assert_eq!(doc, target);
    }

    #[test]
    fn test_diff_of_equal_trees_is_empty() {
        let tree = json!({"a": [1, {"b": "c"}]});
        assert!(diff(&tree, &tree).is_empty());
    }
}
