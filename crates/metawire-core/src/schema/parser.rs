//! Pass 1: turn tokens into message declarations.
//!
//! Type references stay symbolic here; [`super::resolve`] binds them once
//! every declaration in the unit is known, so forward references work.
//! A syntax error inside a message drops that message and parsing resumes
//! after its closing brace.

use tracing::debug;

use super::lexer::{strip_comments, tokenize, Token, TokenKind};
use super::meta::ScalarType;
use crate::error::{Diagnostic, Diagnostics};
use crate::wire::MAX_FIELD_NUMBER;

/// Base offset of auto-assigned message ids at top level.
pub const ROOT_ID_BASE: i32 = 1;

/// Deepest `package` nesting accepted; deeper blocks are skipped.
pub const MAX_PACKAGE_DEPTH: usize = 64;

/// Field type as written, before resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeRef {
    Scalar(ScalarType),
    /// Possibly qualified message name, relative to the declaring package.
    Named(String),
}

/// Default literal as written.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(String),
    Float(String),
    Bool(bool),
    Str(String),
    /// Bare word such as `inf` or `nan`.
    Word(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    pub name: String,
    pub number: u32,
    pub type_ref: TypeRef,
    pub repeated: bool,
    pub default: Option<Literal>,
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageDecl {
    /// Fully qualified name.
    pub name: String,
    /// Package the name was declared in; type references resolve from here.
    pub package: String,
    pub explicit_id: Option<i32>,
    /// Index into [`Collected::scopes`].
    pub scope: usize,
    pub fields: Vec<FieldDecl>,
    pub line: u32,
    pub column: u32,
}

/// A `package` block (index 0 is the implicit top-level scope).
#[derive(Debug, Clone, PartialEq)]
pub struct Scope {
    pub parent: Option<usize>,
    pub package: String,
    /// Explicit id base; scopes without one share their parent's counter.
    pub id_base: Option<i32>,
}

/// Output of pass 1.
#[derive(Debug, Clone, PartialEq)]
pub struct Collected {
    pub messages: Vec<MessageDecl>,
    pub scopes: Vec<Scope>,
}

/// Run pass 1 over raw definition text.
pub fn collect(source: &str) -> (Collected, Diagnostics) {
    let mut diags = Vec::new();
    let text = strip_comments(source, &mut diags);
    let tokens = tokenize(&text, &mut diags);
    let mut p = Parser {
        tokens,
        pos: 0,
        depth: 0,
        diags,
        out: Collected {
            messages: Vec::new(),
            scopes: vec![Scope {
                parent: None,
                package: String::new(),
                id_base: Some(ROOT_ID_BASE),
            }],
        },
    };
    p.items(0, false);
    (p.out, p.diags)
}

type Step<T> = std::result::Result<T, Diagnostic>;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Open `package` blocks.
    depth: usize,
    diags: Diagnostics,
    out: Collected,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn at_punct(&self, c: char) -> bool {
        self.peek().is_some_and(|t| t.is_punct(c))
    }

    fn eat_punct(&mut self, c: char) -> bool {
        if self.at_punct(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Position of the current token, or of the last one at end of input.
    fn here(&self) -> (u32, u32) {
        self.peek()
            .or_else(|| self.tokens.last())
            .map(|t| (t.line, t.column))
            .unwrap_or((1, 1))
    }

    fn error<T>(&self, msg: impl Into<String>) -> Step<T> {
        let (line, column) = self.here();
        Err(Diagnostic::syntax(line, column, msg))
    }

    fn unexpected<T>(&self, expected: &str) -> Step<T> {
        match self.peek() {
            Some(t) => self.error(format!("expected {expected}, found {}", t.describe())),
            None => self.error(format!("expected {expected}, found end of input")),
        }
    }

    fn expect_punct(&mut self, c: char) -> Step<()> {
        if self.eat_punct(c) {
            Ok(())
        } else {
            self.unexpected(&format!("'{c}'"))
        }
    }

    fn ident(&mut self) -> Step<String> {
        match self.peek().map(|t| &t.kind) {
            Some(TokenKind::Ident(w)) => {
                let w = w.clone();
                self.pos += 1;
                Ok(w)
            }
            _ => self.unexpected("identifier"),
        }
    }

    /// `ident ( "." ident )*`
    fn qualified_name(&mut self) -> Step<String> {
        let mut name = self.ident()?;
        while self.eat_punct('.') {
            name.push('.');
            name.push_str(&self.ident()?);
        }
        Ok(name)
    }

    fn int_literal(&mut self) -> Step<i64> {
        let (line, column) = self.here();
        match self.peek().map(|t| &t.kind) {
            Some(TokenKind::Int(text)) => {
                let text = text.clone();
                self.pos += 1;
                parse_int(&text)
                    .and_then(|n| i64::try_from(n).ok())
                    .ok_or_else(|| {
                        Diagnostic::syntax(line, column, format!("integer out of range: {text}"))
                    })
            }
            _ => self.unexpected("integer"),
        }
    }

    /// Parse items until end of input, or until the closing `}` of a package.
    fn items(&mut self, scope: usize, in_package: bool) {
        while let Some(tok) = self.peek() {
            if tok.is_punct('}') {
                if in_package {
                    return;
                }
                let (line, column) = (tok.line, tok.column);
                self.diags.push(Diagnostic::syntax(line, column, "unbalanced '}'"));
                self.pos += 1;
                continue;
            }

            let start = self.pos;
            let result = if tok.is_ident("message") {
                self.message(scope)
            } else if tok.is_ident("package") {
                self.package(scope)
            } else {
                self.unexpected("'message' or 'package'")
            };

            if let Err(d) = result {
                debug!(error = %d, "dropping declaration");
                self.diags.push(d);
                // resume after the enclosing block of the broken item
                self.pos = start;
                self.recover();
            }
        }
        if in_package {
            let (line, column) = self.here();
            self.diags.push(Diagnostic::syntax(line, column, "unterminated package block"));
        }
    }

    /// Skip the current item: everything up to and including its balanced
    /// `{ ... }` block. Stops before a `}` that closes an outer scope.
    fn recover(&mut self) {
        let mut depth = 0usize;
        let mut consumed = false;
        while let Some(t) = self.peek() {
            if t.is_punct('{') {
                depth += 1;
            } else if t.is_punct('}') {
                if depth == 0 {
                    if !consumed {
                        self.pos += 1;
                    }
                    return;
                }
                depth -= 1;
                if depth == 0 {
                    self.pos += 1;
                    return;
                }
            } else if depth == 0 && consumed && (t.is_ident("message") || t.is_ident("package")) {
                return;
            }
            self.pos += 1;
            consumed = true;
        }
    }

    fn package(&mut self, parent: usize) -> Step<()> {
        if self.depth >= MAX_PACKAGE_DEPTH {
            return self.error(format!("package nesting deeper than {MAX_PACKAGE_DEPTH}"));
        }
        self.bump(); // "package"
        let name = self.qualified_name()?;
        let id_base = if self.eat_punct(':') {
            Some(self.id_literal()?)
        } else {
            None
        };
        self.expect_punct('{')?;

        let prefix = self.out.scopes.get(parent).map(|s| s.package.clone()).unwrap_or_default();
        let package = if prefix.is_empty() { name } else { format!("{prefix}.{name}") };
        let scope = self.out.scopes.len();
        self.out.scopes.push(Scope {
            parent: Some(parent),
            package,
            id_base,
        });

        self.depth += 1;
        self.items(scope, true);
        self.depth -= 1;
        self.eat_punct('}');
        Ok(())
    }

    fn id_literal(&mut self) -> Step<i32> {
        let (line, column) = self.here();
        let n = self.int_literal()?;
        i32::try_from(n)
            .map_err(|_| Diagnostic::syntax(line, column, format!("message id out of range: {n}")))
    }

    fn message(&mut self, scope: usize) -> Step<()> {
        let keyword = self.bump();
        let (line, column) = keyword.map(|t| (t.line, t.column)).unwrap_or((1, 1));
        let local = self.qualified_name()?;

        let explicit_id = if self.eat_punct(':') {
            Some(self.id_literal()?)
        } else if self.eat_punct('[') {
            if !self.peek().is_some_and(|t| t.is_ident("id")) {
                return self.unexpected("'id'");
            }
            self.pos += 1;
            self.expect_punct('=')?;
            let id = self.id_literal()?;
            self.expect_punct(']')?;
            Some(id)
        } else {
            None
        };

        self.expect_punct('{')?;
        let mut fields = Vec::new();
        loop {
            match self.peek() {
                None => return self.error(format!("unterminated message block '{local}'")),
                Some(t) if t.is_punct('}') => {
                    self.pos += 1;
                    break;
                }
                Some(_) => fields.push(self.field()?),
            }
        }
        self.eat_punct(';');

        let package = self.out.scopes.get(scope).map(|s| s.package.clone()).unwrap_or_default();
        let name = if package.is_empty() { local } else { format!("{package}.{local}") };
        self.out.messages.push(MessageDecl {
            name,
            package,
            explicit_id,
            scope,
            fields,
            line,
            column,
        });
        Ok(())
    }

    /// `["repeated"] type name ( "=" int [options] | options ) [";"]`
    fn field(&mut self) -> Step<FieldDecl> {
        let (line, column) = self.here();
        let mut repeated = false;
        if self.peek().is_some_and(|t| t.is_ident("repeated")) {
            self.pos += 1;
            repeated = true;
        }

        let type_name = self.qualified_name()?;
        let type_ref = match ScalarType::from_keyword(&type_name) {
            Some(s) => TypeRef::Scalar(s),
            None => TypeRef::Named(type_name),
        };
        let name = self.ident()?;

        let mut number = None;
        if self.eat_punct('=') {
            number = Some(self.field_number()?);
        }

        let mut default = None;
        if self.eat_punct('[') {
            loop {
                let key = self.ident()?;
                self.expect_punct('=')?;
                match key.as_str() {
                    "default" => default = Some(self.literal()?),
                    "id" => {
                        let n = self.field_number()?;
                        if number.is_some_and(|m| m != n) {
                            return self.error(format!("field '{name}' has two different numbers"));
                        }
                        number = Some(n);
                    }
                    other => return self.error(format!("unknown field option '{other}'")),
                }
                if !self.eat_punct(',') {
                    break;
                }
            }
            self.expect_punct(']')?;
        }
        self.eat_punct(';');

        let Some(number) = number else {
            return Err(Diagnostic::syntax(line, column, format!("field '{name}' has no number")));
        };

        Ok(FieldDecl {
            name,
            number,
            type_ref,
            repeated,
            default,
            line,
            column,
        })
    }

    fn field_number(&mut self) -> Step<u32> {
        let (line, column) = self.here();
        let n = self.int_literal()?;
        match u32::try_from(n) {
            Ok(v) if (1..=MAX_FIELD_NUMBER).contains(&v) => Ok(v),
            _ => Err(Diagnostic::syntax(
                line,
                column,
                format!("field number must be between 1 and {MAX_FIELD_NUMBER}, got {n}"),
            )),
        }
    }

    fn literal(&mut self) -> Step<Literal> {
        let lit = match self.peek().map(|t| &t.kind) {
            Some(TokenKind::Int(t)) => Literal::Int(t.clone()),
            Some(TokenKind::Float(t)) => Literal::Float(t.clone()),
            Some(TokenKind::Str(s)) => Literal::Str(s.clone()),
            Some(TokenKind::Ident(w)) if w == "true" => Literal::Bool(true),
            Some(TokenKind::Ident(w)) if w == "false" => Literal::Bool(false),
            Some(TokenKind::Ident(w)) => Literal::Word(w.clone()),
            _ => return self.unexpected("literal"),
        };
        self.pos += 1;
        Ok(lit)
    }
}

/// Parse decimal or `0x` hex integer text with an optional sign.
pub fn parse_int(text: &str) -> Option<i128> {
    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let magnitude = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) => i128::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<i128>().ok()?,
    };
    Some(if negative { -magnitude } else { magnitude })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_messages_and_fields() {
        let (c, diags) = collect(
            "message Point { double x = 1; double y = 2 [default = 1.5]; }\n\
             message Path : 40 { repeated Point points = 1 }",
        );
        assert!(diags.is_empty(), "{diags:?}");
        assert_eq!(c.messages.len(), 2);
        let point = &c.messages[0];
        assert_eq!(point.name, "Point");
        assert_eq!(point.explicit_id, None);
        assert_eq!(point.fields[1].default, Some(Literal::Float("1.5".into())));
        let path = &c.messages[1];
        assert_eq!(path.explicit_id, Some(40));
        assert!(path.fields[0].repeated);
        assert_eq!(path.fields[0].type_ref, TypeRef::Named("Point".into()));
    }

    #[test]
    fn bracket_id_syntax() {
        let (c, diags) = collect("message A [id = 9] { int32 v [id = 3, default = -4]; }");
        assert!(diags.is_empty(), "{diags:?}");
        assert_eq!(c.messages[0].explicit_id, Some(9));
        assert_eq!(c.messages[0].fields[0].number, 3);
        assert_eq!(c.messages[0].fields[0].default, Some(Literal::Int("-4".into())));
    }

    #[test]
    fn packages_qualify_names() {
        let (c, diags) =
            collect("package geo : 100 { package flat { message P {} } message Q {} }");
        assert!(diags.is_empty(), "{diags:?}");
        let names: Vec<&str> = c.messages.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["geo.flat.P", "geo.Q"]);
        assert_eq!(c.scopes.len(), 3);
        assert_eq!(c.scopes[1].id_base, Some(100));
        assert_eq!(c.scopes[2].id_base, None);
        assert_eq!(c.scopes[2].parent, Some(1));
    }

    #[test]
    fn broken_message_is_dropped_and_parsing_continues() {
        let (c, diags) = collect("message A { int32 = 1; }\nmessage B { int32 b = 1; }");
        assert_eq!(diags.len(), 1);
        assert_eq!(c.messages.len(), 1);
        assert_eq!(c.messages[0].name, "B");
    }

    #[test]
    fn field_without_number_is_an_error() {
        let (c, diags) = collect("message A { int32 a; }");
        assert!(c.messages.is_empty());
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn unterminated_message_block() {
        let (c, diags) = collect("message A { int32 a = 1;");
        assert!(c.messages.is_empty());
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("unterminated"));
    }

    #[test]
    fn field_number_range() {
        let (_, diags) = collect("message A { int32 a = 0; }");
        assert_eq!(diags.len(), 1);
        let (_, diags) = collect("message A { int32 a = 536870912; }");
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn package_nesting_is_capped() {
        let depth = MAX_PACKAGE_DEPTH + 30;
        let text = format!(
            "{}message Deep {{}}{} message Top {{}}",
            "package p { ".repeat(depth),
            " }".repeat(depth)
        );
        let (c, diags) = collect(&text);
        assert_eq!(diags.len(), 1, "{diags:?}");
        assert!(diags[0].message.contains("nesting"));
        let names: Vec<&str> = c.messages.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Top"]);
        assert_eq!(c.scopes.len(), MAX_PACKAGE_DEPTH + 1);
    }

    #[test]
    fn unbalanced_deep_nesting_does_not_recurse() {
        let (c, diags) = collect(&"package p {".repeat(200_000));
        assert!(c.messages.is_empty());
        assert!(diags.iter().any(|d| d.message.contains("nesting")));
        assert!(diags.len() <= MAX_PACKAGE_DEPTH + 1);
    }

    #[test]
    fn int_text() {
        assert_eq!(parse_int("-0x10"), Some(-16));
        assert_eq!(parse_int("18446744073709551615"), Some(u64::MAX as i128));
        assert_eq!(parse_int("x"), None);
    }
}
