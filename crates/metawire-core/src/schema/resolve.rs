//! Pass 2: validate declarations, assign message ids and bind type names.
//!
//! Id assignment is a pure function of the declaration list: explicit ids
//! are claimed first, then every message without one takes the next free
//! value of its scope's counter, in declaration order.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use super::meta::{FieldType, MetaField, MetaMessage, ScalarType, Schema};
use super::parser::{parse_int, Collected, FieldDecl, Literal, MessageDecl, Scope, TypeRef};
use crate::error::{Diagnostic, Diagnostics, ErrorKind, Position};
use crate::message::Value;

/// Run pass 2. Offending messages and fields are left out of the schema.
pub fn resolve(collected: Collected, diags: &mut Diagnostics) -> Schema {
    let Collected { messages, scopes } = collected;

    let messages = drop_duplicate_names(messages, diags);
    let ids = assign_ids(&messages, &scopes, diags);

    let known: HashSet<&str> = messages
        .iter()
        .zip(&ids)
        .filter(|(_, id)| id.is_some())
        .map(|(m, _)| m.name.as_str())
        .collect();

    let mut schema = Schema::new();
    for (decl, id) in messages.iter().zip(&ids) {
        let Some(id) = *id else { continue };
        let meta = build_message(decl, id, &known, diags);
        if let Err(m) = schema.insert(meta) {
            let text = format!("message '{}' already defined", m.name());
            diags.push(Diagnostic::conflict(decl.line, decl.column, text));
        }
    }
    schema
}

fn drop_duplicate_names(messages: Vec<MessageDecl>, diags: &mut Diagnostics) -> Vec<MessageDecl> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(messages.len());
    for m in messages {
        if !seen.insert(m.name.clone()) {
            debug!(message = %m.name, "duplicate message name");
            let text = format!("duplicate message name '{}'", m.name);
            diags.push(Diagnostic::conflict(m.line, m.column, text));
            continue;
        }
        out.push(m);
    }
    out
}

/// Nearest scope (self or ancestor) that carries its own id base.
fn counter_owner(scopes: &[Scope], mut scope: usize) -> usize {
    loop {
        match scopes.get(scope) {
            Some(s) if s.id_base.is_some() => return scope,
            Some(Scope { parent: Some(p), .. }) => scope = *p,
            _ => return 0,
        }
    }
}

/// Returns one id per declaration; `None` marks a dropped message.
fn assign_ids(
    messages: &[MessageDecl],
    scopes: &[Scope],
    diags: &mut Diagnostics,
) -> Vec<Option<i32>> {
    let mut taken: HashSet<i32> = HashSet::new();
    let mut ids: Vec<Option<i32>> = vec![None; messages.len()];

    for (i, m) in messages.iter().enumerate() {
        if let Some(id) = m.explicit_id {
            if taken.insert(id) {
                ids[i] = Some(id);
            } else {
                diags.push(Diagnostic::conflict(
                    m.line,
                    m.column,
                    format!("duplicate message id {id} on '{}'", m.name),
                ));
            }
        }
    }

    let mut counters: HashMap<usize, i64> = HashMap::new();
    for (i, m) in messages.iter().enumerate() {
        if m.explicit_id.is_some() {
            continue;
        }
        let owner = counter_owner(scopes, m.scope);
        let base = scopes.get(owner).and_then(|s| s.id_base).unwrap_or(super::parser::ROOT_ID_BASE);
        let next = counters.entry(owner).or_insert(base as i64);
        while i32::try_from(*next).is_ok_and(|c| taken.contains(&c)) {
            *next += 1;
        }
        match i32::try_from(*next) {
            Ok(id) => {
                taken.insert(id);
                ids[i] = Some(id);
                *next += 1;
            }
            Err(_) => diags.push(Diagnostic::conflict(
                m.line,
                m.column,
                format!("no message id left for '{}'", m.name),
            )),
        }
    }
    ids
}

/// Candidate qualified names for `name` referenced from `package`,
/// innermost package first.
fn candidates(package: &str, name: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut prefix = package;
    loop {
        if prefix.is_empty() {
            out.push(name.to_string());
            return out;
        }
        out.push(format!("{prefix}.{name}"));
        prefix = match prefix.rfind('.') {
            Some(i) => &prefix[..i],
            None => "",
        };
    }
}

fn build_message(
    decl: &MessageDecl,
    id: i32,
    known: &HashSet<&str>,
    diags: &mut Diagnostics,
) -> MetaMessage {
    let mut meta = MetaMessage::new(decl.name.clone(), id);
    for f in &decl.fields {
        let field_type = match &f.type_ref {
            TypeRef::Scalar(s) => FieldType::Scalar(*s),
            TypeRef::Named(n) => match candidates(&decl.package, n)
                .into_iter()
                .find(|c| known.contains(c.as_str()))
            {
                Some(q) => FieldType::Message(q),
                None => {
                    diags.push(Diagnostic::conflict(
                        f.line,
                        f.column,
                        format!("unresolved type '{n}' for field '{}.{}'", decl.name, f.name),
                    ));
                    continue;
                }
            },
        };

        let mut field = MetaField::new(f.number, f.name.clone(), field_type, f.repeated);
        if let Some(lit) = &f.default {
            match default_value(f, field.field_type(), lit) {
                Ok(v) => field = field.with_default(v),
                Err(msg) => diags.push(Diagnostic::new(
                    ErrorKind::TypeMismatch,
                    Position::Source { line: f.line, column: f.column },
                    format!("field '{}.{}': {msg}", decl.name, f.name),
                )),
            }
        }

        if let Err(dup) = meta.add_field(field) {
            diags.push(Diagnostic::conflict(
                f.line,
                f.column,
                format!(
                    "duplicate field number {} or name '{}' in '{}'",
                    dup.number(),
                    dup.name(),
                    decl.name
                ),
            ));
        }
    }
    meta
}

fn default_value(
    f: &FieldDecl,
    ty: &FieldType,
    lit: &Literal,
) -> std::result::Result<Value, String> {
    if f.repeated {
        return Err("repeated fields cannot declare a default".into());
    }
    match ty {
        FieldType::Message(_) => Err("message fields cannot declare a default".into()),
        FieldType::Scalar(s) => literal_value(*s, lit),
    }
}

/// Convert a literal into a value of the given scalar type.
pub fn literal_value(ty: ScalarType, lit: &Literal) -> std::result::Result<Value, String> {
    let bad = || format!("default {lit:?} is not a valid {}", ty.keyword());
    match (ty, lit) {
        (ScalarType::Bool, Literal::Bool(b)) => Ok(Value::Bool(*b)),
        (ScalarType::String, Literal::Str(s)) => Ok(Value::String(s.clone())),
        (ScalarType::Bytes, Literal::Str(s)) => Ok(Value::Bytes(s.as_bytes().to_vec())),
        (ScalarType::Float | ScalarType::Double, _) => {
            let x = match lit {
                Literal::Int(t) => parse_int(t).map(|n| n as f64),
                Literal::Float(t) => t.parse::<f64>().ok(),
                Literal::Word(w) => match w.as_str() {
                    "inf" => Some(f64::INFINITY),
                    "nan" => Some(f64::NAN),
                    _ => None,
                },
                _ => None,
            }
            .ok_or_else(bad)?;
            Ok(if ty == ScalarType::Float {
                Value::Float(x as f32)
            } else {
                Value::Double(x)
            })
        }
        (_, Literal::Int(t)) if ty.bit_width() > 0 => {
            let n = parse_int(t).ok_or_else(bad)?;
            let v = if n < 0 {
                i64::try_from(n).ok().and_then(|n| ty.signed_value(n))
            } else {
                u64::try_from(n).ok().and_then(|n| ty.unsigned_value(n))
            };
            v.ok_or_else(|| format!("default {t} is out of range for {}", ty.keyword()))
        }
        _ => Err(bad()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::parser::collect;

    fn run(src: &str) -> (Schema, Diagnostics) {
        let (c, mut diags) = collect(src);
        let schema = resolve(c, &mut diags);
        (schema, diags)
    }

    #[test]
    fn auto_ids_skip_explicit_ones() {
        let (schema, diags) = run("message A {} message B : 2 {} message C {} message D {}");
        assert!(diags.is_empty(), "{diags:?}");
        let ids: Vec<(&str, i32)> = schema.messages().iter().map(|m| (m.name(), m.id())).collect();
        assert_eq!(ids, vec![("A", 1), ("B", 2), ("C", 3), ("D", 4)]);
    }

    #[test]
    fn package_base_offsets() {
        let (schema, diags) = run(
            "message Top {}\n\
             package a : 100 { message X {} package b { message Y {} } }\n\
             package c { message Z {} }",
        );
        assert!(diags.is_empty(), "{diags:?}");
        assert_eq!(schema.get("Top").map(MetaMessage::id), Some(1));
        assert_eq!(schema.get("a.X").map(MetaMessage::id), Some(100));
        assert_eq!(schema.get("a.b.Y").map(MetaMessage::id), Some(101));
        assert_eq!(schema.get("c.Z").map(MetaMessage::id), Some(2));
    }

    #[test]
    fn forward_and_relative_references() {
        let (schema, diags) = run(
            "package geo {\n\
               message Line { Point a = 1; geo.Point b = 2; }\n\
               message Point { double x = 1; }\n\
             }\n\
             message Route { repeated geo.Line legs = 1; }",
        );
        assert!(diags.is_empty(), "{diags:?}");
        let line = schema.get("geo.Line").map(|m| m.fields().to_vec()).unwrap_or_default();
        assert_eq!(line[0].field_type(), &FieldType::Message("geo.Point".into()));
        assert_eq!(line[1].field_type(), &FieldType::Message("geo.Point".into()));
        let route = schema.get("Route").and_then(|m| m.field(1).cloned());
        assert_eq!(route.map(|f| f.is_repeated()), Some(true));
    }

    #[test]
    fn unresolved_reference_drops_the_field() {
        let (schema, diags) = run("message A { Missing m = 1; int32 k = 2; }");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, ErrorKind::SchemaConflict);
        let a = schema.get("A").map(|m| m.fields().len());
        assert_eq!(a, Some(1));
    }

    #[test]
    fn duplicate_field_number_keeps_first() {
        let (schema, diags) = run("message A { int32 a = 1; int32 b = 1; }");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, ErrorKind::SchemaConflict);
        assert_eq!(diags[0].position, Position::Source { line: 1, column: 26 });
        let a = schema.get("A").and_then(|m| m.field(1)).map(|f| f.name().to_string());
        assert_eq!(a.as_deref(), Some("a"));
    }

    #[test]
    fn duplicate_ids_and_names() {
        let (schema, diags) = run("message A : 5 {} message B : 5 {} message A {}");
        assert_eq!(diags.len(), 2);
        assert!(diags.iter().all(|d| d.kind == ErrorKind::SchemaConflict));
        assert_eq!(schema.len(), 1);
    }

    #[test]
    fn bad_default_falls_back_to_zero() {
        let (schema, diags) = run(
            "message A { uint8 a = 1 [default = 300]; bool b = 2 [default = 1]; \
             int16 c = 3 [default = -7]; }",
        );
        assert_eq!(diags.len(), 2);
        assert!(diags.iter().all(|d| d.kind == ErrorKind::TypeMismatch));
        let a = schema.get("A");
        assert_eq!(
            a.and_then(|m| m.field(1)).and_then(MetaField::default_value),
            Some(&Value::UInt8(0))
        );
        assert_eq!(
            a.and_then(|m| m.field(2)).and_then(MetaField::default_value),
            Some(&Value::Bool(false))
        );
        assert_eq!(
            a.and_then(|m| m.field(3)).and_then(MetaField::default_value),
            Some(&Value::Int16(-7))
        );
    }

    #[test]
    fn literal_conversions() {
        assert_eq!(
            literal_value(ScalarType::Double, &Literal::Int("3".into())),
            Ok(Value::Double(3.0))
        );
        assert_eq!(
            literal_value(ScalarType::Float, &Literal::Float("0.5".into())),
            Ok(Value::Float(0.5))
        );
        assert_eq!(
            literal_value(ScalarType::UInt64, &Literal::Int("0xff".into())),
            Ok(Value::UInt64(255))
        );
        assert_eq!(
            literal_value(ScalarType::Bytes, &Literal::Str("ab".into())),
            Ok(Value::Bytes(b"ab".to_vec()))
        );
        assert!(literal_value(ScalarType::Int32, &Literal::Str("1".into())).is_err());
        assert!(literal_value(ScalarType::UInt32, &Literal::Int("-1".into())).is_err());
    }
}
