//! Comment stripping and tokenizing for message-definition text.
//!
//! Comments are blanked out rather than removed so every surviving
//! character keeps its original line/column.

use crate::error::{Diagnostic, Diagnostics};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    /// Integer literal text including an optional leading `-` and `0x` prefix.
    Int(String),
    /// Floating point literal text.
    Float(String),
    /// String literal with escapes already applied.
    Str(String),
    Punct(char),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: u32,
    pub column: u32,
}

impl Token {
    pub fn is_punct(&self, c: char) -> bool {
        self.kind == TokenKind::Punct(c)
    }

    pub fn is_ident(&self, word: &str) -> bool {
        matches!(&self.kind, TokenKind::Ident(w) if w == word)
    }

    /// Short human description for diagnostics.
    pub fn describe(&self) -> String {
        match &self.kind {
            TokenKind::Ident(w) => format!("'{w}'"),
            TokenKind::Int(t) | TokenKind::Float(t) => format!("number {t}"),
            TokenKind::Str(_) => "string literal".into(),
            TokenKind::Punct(c) => format!("'{c}'"),
        }
    }
}

const PUNCT: &[char] = &['{', '}', '[', ']', '=', ':', ';', ',', '.'];

/// Replace `//`, `#` and `/* */` comments with blanks, keeping newlines.
pub fn strip_comments(source: &str, diags: &mut Diagnostics) -> String {
    let chars: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len());
    let (mut line, mut column) = (1u32, 1u32);
    let mut i = 0;

    fn advance(c: char, line: &mut u32, column: &mut u32) {
        if c == '\n' {
            *line += 1;
            *column = 1;
        } else {
            *column += 1;
        }
    }

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match (c, next) {
            ('"', _) => {
                // copy string literals verbatim so `//` inside them survives
                out.push(c);
                advance(c, &mut line, &mut column);
                i += 1;
                while i < chars.len() {
                    let s = chars[i];
                    out.push(s);
                    advance(s, &mut line, &mut column);
                    i += 1;
                    if s == '\\' {
                        if let Some(&e) = chars.get(i) {
                            out.push(e);
                            advance(e, &mut line, &mut column);
                            i += 1;
                        }
                    } else if s == '"' || s == '\n' {
                        break;
                    }
                }
            }
            ('/', Some('/')) | ('#', _) => {
                while i < chars.len() && chars[i] != '\n' {
                    out.push(' ');
                    column += 1;
                    i += 1;
                }
            }
            ('/', Some('*')) => {
                let (start_line, start_col) = (line, column);
                let mut closed = false;
                while i < chars.len() {
                    if chars[i] == '*' && chars.get(i + 1) == Some(&'/') {
                        out.push_str("  ");
                        column += 2;
                        i += 2;
                        closed = true;
                        break;
                    }
                    let b = chars[i];
                    out.push(if b == '\n' { '\n' } else { ' ' });
                    advance(b, &mut line, &mut column);
                    i += 1;
                }
                if !closed {
                    diags.push(Diagnostic::syntax(
                        start_line,
                        start_col,
                        "unterminated block comment",
                    ));
                }
            }
            _ => {
                out.push(c);
                advance(c, &mut line, &mut column);
                i += 1;
            }
        }
    }
    out
}

/// Split comment-free text into tokens. Unknown characters and broken
/// literals are reported and skipped.
pub fn tokenize(text: &str, diags: &mut Diagnostics) -> Vec<Token> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let (mut line, mut column) = (1u32, 1u32);
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let (tl, tc) = (line, column);

        if c == '\n' {
            line += 1;
            column = 1;
            i += 1;
            continue;
        }
        if c.is_whitespace() {
            column += 1;
            i += 1;
            continue;
        }

        let start = i;
        let kind = if c.is_ascii_alphabetic() || c == '_' {
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            TokenKind::Ident(chars[start..i].iter().collect())
        } else if c.is_ascii_digit()
            || (matches!(c, '-' | '+') && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit()))
        {
            lex_number(&chars, &mut i)
        } else if c == '"' {
            i += 1;
            match lex_string(&chars, &mut i) {
                Some(s) => TokenKind::Str(s),
                None => {
                    diags.push(Diagnostic::syntax(tl, tc, "unterminated string literal"));
                    column += (i - start) as u32;
                    continue;
                }
            }
        } else if PUNCT.contains(&c) {
            i += 1;
            TokenKind::Punct(c)
        } else {
            diags.push(Diagnostic::syntax(tl, tc, format!("unexpected character '{c}'")));
            i += 1;
            column += 1;
            continue;
        };

        column += (i - start) as u32;
        tokens.push(Token {
            kind,
            line: tl,
            column: tc,
        });
    }
    tokens
}

fn lex_number(chars: &[char], i: &mut usize) -> TokenKind {
    let start = *i;
    if matches!(chars[*i], '-' | '+') {
        *i += 1;
    }
    let is_hex = chars.get(*i) == Some(&'0') && matches!(chars.get(*i + 1), Some('x' | 'X'));
    if is_hex {
        *i += 2;
        while *i < chars.len() && chars[*i].is_ascii_hexdigit() {
            *i += 1;
        }
        return TokenKind::Int(chars[start..*i].iter().collect());
    }

    let mut is_float = false;
    while *i < chars.len() {
        let d = chars[*i];
        if d.is_ascii_digit() {
            *i += 1;
        } else if d == '.' && chars.get(*i + 1).is_some_and(|n| n.is_ascii_digit()) && !is_float {
            is_float = true;
            *i += 1;
        } else if matches!(d, 'e' | 'E') {
            let mut j = *i + 1;
            if matches!(chars.get(j), Some('-' | '+')) {
                j += 1;
            }
            if chars.get(j).is_some_and(|n| n.is_ascii_digit()) {
                is_float = true;
                *i = j;
            } else {
                break;
            }
        } else {
            break;
        }
    }
    let text: String = chars[start..*i].iter().collect();
    if is_float {
        TokenKind::Float(text)
    } else {
        TokenKind::Int(text)
    }
}

/// Called just after the opening quote. Stops at the closing quote.
fn lex_string(chars: &[char], i: &mut usize) -> Option<String> {
    let mut out = String::new();
    while *i < chars.len() {
        let c = chars[*i];
        *i += 1;
        match c {
            '"' => return Some(out),
            '\n' => {
                *i -= 1;
                return None;
            }
            '\\' => {
                let e = *chars.get(*i)?;
                *i += 1;
                out.push(match e {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    '0' => '\0',
                    other => other,
                });
            }
            other => out.push(other),
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(src: &str) -> (Vec<Token>, Diagnostics) {
        let mut diags = Vec::new();
        let stripped = strip_comments(src, &mut diags);
        let tokens = tokenize(&stripped, &mut diags);
        (tokens, diags)
    }

    #[test]
    fn comments_keep_positions() {
        let (tokens, diags) = lex("// header\nmessage /* inline */ A # tail\n{ }");
        assert!(diags.is_empty());
        assert_eq!(tokens.len(), 4);
        assert!(tokens[0].is_ident("message"));
        assert_eq!((tokens[0].line, tokens[0].column), (2, 1));
        assert!(tokens[1].is_ident("A"));
        assert_eq!((tokens[1].line, tokens[1].column), (2, 22));
        assert_eq!((tokens[2].line, tokens[2].column), (3, 1));
    }

    #[test]
    fn multiline_block_comment() {
        let (tokens, diags) = lex("/* a\nb\n*/ x");
        assert!(diags.is_empty());
        assert_eq!((tokens[0].line, tokens[0].column), (3, 4));
    }

    #[test]
    fn unterminated_block_comment_is_reported() {
        let (tokens, diags) = lex("message A { /* never closed");
        assert_eq!(tokens.len(), 3);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].position, crate::error::Position::Source { line: 1, column: 13 });
    }

    #[test]
    fn numbers_and_strings() {
        let (tokens, diags) = lex(r#"-12 0x1F 1.5 -2e3 "a//b\"c""#);
        assert!(diags.is_empty());
        let kinds: Vec<TokenKind> = tokens.into_iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Int("-12".into()),
                TokenKind::Int("0x1F".into()),
                TokenKind::Float("1.5".into()),
                TokenKind::Float("-2e3".into()),
                TokenKind::Str("a//b\"c".into()),
            ]
        );
    }

    #[test]
    fn dotted_names_are_split() {
        let (tokens, _) = lex("geo.Point");
        assert_eq!(tokens.len(), 3);
        assert!(tokens[1].is_punct('.'));
    }

    #[test]
    fn bad_characters_are_reported_and_skipped() {
        let (tokens, diags) = lex("a @ b");
        assert_eq!(tokens.len(), 2);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, crate::error::ErrorKind::SyntaxError);
    }
}
