//! Tokenizer for the template language.
//!
//! Text outside `{{ }}` becomes a single text token. Inside an action the
//! lexer emits explicit space tokens because operand separation is
//! significant to the parser. Lexing stops at the first error, which is
//! emitted as an error token so the parser reports it in order.

const LEFT_DELIM: &str = "{{";
const RIGHT_DELIM: &str = "}}";

/// Control keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Keyword {
    If,
    Else,
    End,
    Range,
    With,
    Define,
    Template,
    Block,
    Break,
    Continue,
}

impl Keyword {
    fn lookup(word: &str) -> Option<Self> {
        Some(match word {
            "if" => Self::If,
            "else" => Self::Else,
            "end" => Self::End,
            "range" => Self::Range,
            "with" => Self::With,
            "define" => Self::Define,
            "template" => Self::Template,
            "block" => Self::Block,
            "break" => Self::Break,
            "continue" => Self::Continue,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Text(String),
    LeftDelim,
    RightDelim,
    Space,
    Keyword(Keyword),
    Ident(String),
    /// A field name without its leading dot.
    Field(String),
    /// A variable name including its leading `$`.
    Variable(String),
    Dot,
    /// An unquoted string literal.
    Str(String),
    /// Raw number text, converted by the parser.
    Number(String),
    Char(char),
    Bool(bool),
    Nil,
    Pipe,
    LeftParen,
    RightParen,
    Comma,
    Assign,
    Declare,
    /// Printable ASCII punctuation with no meaning in an action.
    Punct(char),
    Error(String),
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub(crate) kind: TokenKind,
    /// Source text of the token.
    pub(crate) val: String,
    pub(crate) line: usize,
}

impl Token {
    /// Renders the token for "unexpected ..." messages.
    pub(crate) fn describe(&self) -> String {
        match &self.kind {
            TokenKind::Eof => "EOF".to_string(),
            TokenKind::Error(message) => message.clone(),
            TokenKind::Keyword(_) => format!("<{}>", self.val),
            _ if self.val.chars().count() > 10 => {
                let head: String = self.val.chars().take(10).collect();
                format!("{head:?}...")
            }
            _ => format!("{:?}", self.val),
        }
    }
}

const fn is_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

fn is_alnum(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}

fn has_left_trim(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next() == Some('-') && chars.next().is_some_and(is_space)
}

fn bad_char(c: char) -> String {
    format!("bad character U+{:04X} '{c}'", c as u32)
}

/// Tokenizes `src`. The result always ends with an EOF or error token.
pub(crate) fn lex(src: &str) -> Vec<Token> {
    let mut lexer = Lexer {
        src,
        pos: 0,
        line: 1,
        paren_depth: 0,
        tokens: Vec::new(),
    };
    lexer.run();
    lexer.tokens
}

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    line: usize,
    paren_depth: usize,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn push(&mut self, kind: TokenKind, start: usize, line: usize) {
        self.tokens.push(Token {
            kind,
            val: self.src[start..self.pos].to_string(),
            line,
        });
    }

    /// Emits an error token and signals the caller to stop.
    fn error(&mut self, message: impl Into<String>) -> bool {
        let message = message.into();
        self.tokens.push(Token {
            kind: TokenKind::Error(message.clone()),
            val: message,
            line: self.line,
        });
        false
    }

    fn skip_space(&mut self) {
        while self.peek().is_some_and(is_space) {
            self.bump();
        }
    }

    fn run(&mut self) {
        loop {
            let rest = self.rest();
            let Some(i) = rest.find(LEFT_DELIM) else {
                if !rest.is_empty() {
                    let line = self.line;
                    let start = self.pos;
                    self.line += rest.matches('\n').count();
                    self.pos = self.src.len();
                    self.push(TokenKind::Text(rest.to_string()), start, line);
                }
                self.tokens.push(Token {
                    kind: TokenKind::Eof,
                    val: String::new(),
                    line: self.line,
                });
                return;
            };

            let raw = &rest[..i];
            let text = if has_left_trim(&rest[i + LEFT_DELIM.len()..]) {
                raw.trim_end_matches(is_space)
            } else {
                raw
            };
            if !text.is_empty() {
                self.tokens.push(Token {
                    kind: TokenKind::Text(text.to_string()),
                    val: text.to_string(),
                    line: self.line,
                });
            }
            self.line += raw.matches('\n').count();
            self.pos += i;

            if !self.lex_action() {
                return;
            }
        }
    }

    /// Returns the length of the right delimiter at the cursor and whether it
    /// carries a trim marker.
    fn at_right_delim(&self) -> Option<(usize, bool)> {
        let rest = self.rest();
        if rest.starts_with(RIGHT_DELIM) {
            return Some((RIGHT_DELIM.len(), false));
        }
        let mut chars = rest.chars();
        let marked = chars.next().is_some_and(is_space) && chars.next() == Some('-');
        if marked && rest[2..].starts_with(RIGHT_DELIM) {
            return Some((2 + RIGHT_DELIM.len(), true));
        }
        None
    }

    fn at_terminator(&self) -> bool {
        match self.peek() {
            None => true,
            Some(c) => {
                is_space(c)
                    || matches!(c, '.' | ',' | '|' | ':' | ')' | '(')
                    || self.rest().starts_with(RIGHT_DELIM)
            }
        }
    }

    fn lex_action(&mut self) -> bool {
        let open_start = self.pos;
        let open_line = self.line;
        self.pos += LEFT_DELIM.len();
        if has_left_trim(self.rest()) {
            self.bump();
            self.bump();
        }
        if self.rest().starts_with("/*") {
            return self.lex_comment();
        }
        self.push(TokenKind::LeftDelim, open_start, open_line);

        loop {
            if let Some((len, trim)) = self.at_right_delim() {
                if self.paren_depth > 0 {
                    return self.error("unclosed left paren");
                }
                let start = self.pos;
                let line = self.line;
                for _ in 0..len {
                    self.bump();
                }
                self.push(TokenKind::RightDelim, start, line);
                if trim {
                    self.skip_space();
                }
                return true;
            }

            let start = self.pos;
            let line = self.line;
            let Some(c) = self.bump() else {
                return self.error("unclosed action");
            };

            let kind = match c {
                c if is_space(c) => {
                    self.skip_space();
                    // The final space may open a trim-marked delimiter.
                    if self.rest().starts_with("-}}") {
                        let last = self.src.as_bytes()[self.pos - 1];
                        self.pos -= 1;
                        if last == b'\n' {
                            self.line -= 1;
                        }
                        if self.pos == start {
                            continue;
                        }
                    }
                    Ok(TokenKind::Space)
                }
                '=' => Ok(TokenKind::Assign),
                ':' => {
                    if self.peek() == Some('=') {
                        self.bump();
                        Ok(TokenKind::Declare)
                    } else {
                        Err("expected :=".to_string())
                    }
                }
                '|' => Ok(TokenKind::Pipe),
                ',' => Ok(TokenKind::Comma),
                '"' => self.lex_quote(start),
                '`' => self.lex_raw_quote(start),
                '\'' => self.lex_char(start),
                '$' => Ok(self.lex_field_or_variable(start, false)),
                '.' if !self.peek().is_some_and(|d| d.is_ascii_digit()) => {
                    Ok(self.lex_field_or_variable(start, true))
                }
                '.' | '+' | '-' | '0'..='9' => {
                    self.pos = start;
                    self.lex_number(start)
                }
                '(' => {
                    self.paren_depth += 1;
                    Ok(TokenKind::LeftParen)
                }
                ')' => {
                    if self.paren_depth == 0 {
                        Err("unexpected right paren".to_string())
                    } else {
                        self.paren_depth -= 1;
                        Ok(TokenKind::RightParen)
                    }
                }
                c if is_alnum(c) => self.lex_identifier(start),
                c if c.is_ascii_graphic() => Ok(TokenKind::Punct(c)),
                c => Err(format!(
                    "unrecognized character in action: U+{:04X} '{c}'",
                    c as u32
                )),
            };

            match kind {
                Ok(TokenKind::Error(message)) | Err(message) => return self.error(message),
                Ok(kind) => self.push(kind, start, line),
            }
        }
    }

    fn lex_comment(&mut self) -> bool {
        let rest = self.rest();
        let Some(end) = rest[2..].find("*/") else {
            return self.error("unclosed comment");
        };
        let comment = &rest[..end + 4];
        self.line += comment.matches('\n').count();
        self.pos += comment.len();

        match self.at_right_delim() {
            None => self.error("comment ends before closing delimiter"),
            Some((len, trim)) => {
                for _ in 0..len {
                    self.bump();
                }
                if trim {
                    self.skip_space();
                }
                true
            }
        }
    }

    fn lex_quote(&mut self, start: usize) -> Result<TokenKind, String> {
        loop {
            match self.bump() {
                Some('\\') if self.peek().is_some_and(|c| c != '\n') => {
                    self.bump();
                }
                Some('"') => break,
                None | Some('\\' | '\n') => return Err("unterminated quoted string".to_string()),
                Some(_) => {}
            }
        }
        let body = &self.src[start + 1..self.pos - 1];
        unescape(body, '"')
            .map(TokenKind::Str)
            .ok_or_else(|| "invalid syntax".to_string())
    }

    fn lex_raw_quote(&mut self, start: usize) -> Result<TokenKind, String> {
        loop {
            match self.bump() {
                Some('`') => break,
                None => return Err("unterminated raw quoted string".to_string()),
                Some(_) => {}
            }
        }
        let body = &self.src[start + 1..self.pos - 1];
        Ok(TokenKind::Str(body.replace('\r', "")))
    }

    fn lex_char(&mut self, start: usize) -> Result<TokenKind, String> {
        loop {
            match self.bump() {
                Some('\\') if self.peek().is_some_and(|c| c != '\n') => {
                    self.bump();
                }
                Some('\'') => break,
                None | Some('\\' | '\n') => {
                    return Err("unterminated character constant".to_string());
                }
                Some(_) => {}
            }
        }
        let raw = &self.src[start..self.pos];
        let decoded = unescape(&raw[1..raw.len() - 1], '\'');
        let mut chars = decoded.as_deref().unwrap_or_default().chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(TokenKind::Char(c)),
            _ => Err(format!("malformed character constant: {raw}")),
        }
    }

    fn lex_field_or_variable(&mut self, start: usize, is_field: bool) -> TokenKind {
        if self.at_terminator() {
            return if is_field {
                TokenKind::Dot
            } else {
                TokenKind::Variable("$".to_string())
            };
        }
        while self.peek().is_some_and(is_alnum) {
            self.bump();
        }
        if !self.at_terminator() {
            let c = self.peek().unwrap_or_default();
            return TokenKind::Error(bad_char(c));
        }
        let text = &self.src[start..self.pos];
        if is_field {
            TokenKind::Field(text[1..].to_string())
        } else {
            TokenKind::Variable(text.to_string())
        }
    }

    fn lex_identifier(&mut self, start: usize) -> Result<TokenKind, String> {
        while self.peek().is_some_and(is_alnum) {
            self.bump();
        }
        if !self.at_terminator() {
            return Err(bad_char(self.peek().unwrap_or_default()));
        }
        let word = &self.src[start..self.pos];
        Ok(match word {
            "true" => TokenKind::Bool(true),
            "false" => TokenKind::Bool(false),
            "nil" => TokenKind::Nil,
            _ => Keyword::lookup(word).map_or_else(|| TokenKind::Ident(word.to_string()), TokenKind::Keyword),
        })
    }

    fn accept(&mut self, valid: &str) -> bool {
        if self.peek().is_some_and(|c| valid.contains(c)) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn accept_run(&mut self, valid: &str) {
        while self.accept(valid) {}
    }

    fn lex_number(&mut self, start: usize) -> Result<TokenKind, String> {
        const DECIMAL: &str = "0123456789_";
        const HEX: &str = "0123456789abcdefABCDEF_";

        self.accept("+-");
        let mut digits = DECIMAL;
        if self.accept("0") {
            if self.accept("xX") {
                digits = HEX;
            } else if self.accept("oO") {
                digits = "01234567_";
            } else if self.accept("bB") {
                digits = "01_";
            }
        }
        self.accept_run(digits);
        if self.accept(".") {
            self.accept_run(digits);
        }
        if digits == DECIMAL && self.accept("eE") {
            self.accept("+-");
            self.accept_run(DECIMAL);
        }
        if digits == HEX && self.accept("pP") {
            self.accept("+-");
            self.accept_run(DECIMAL);
        }
        if self.peek().is_some_and(is_alnum) {
            self.bump();
            return Err(format!("bad number syntax: {:?}", &self.src[start..self.pos]));
        }
        Ok(TokenKind::Number(self.src[start..self.pos].to_string()))
    }
}

/// Resolves backslash escapes inside a quoted literal.
fn unescape(body: &str, quote: char) -> Option<String> {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let escaped = match chars.next()? {
            'a' => '\x07',
            'b' => '\x08',
            'f' => '\x0c',
            'n' => '\n',
            'r' => '\r',
            't' => '\t',
            'v' => '\x0b',
            '\\' => '\\',
            c if c == quote => c,
            'x' => hex_escape(&mut chars, 2)?,
            'u' => hex_escape(&mut chars, 4)?,
            'U' => hex_escape(&mut chars, 8)?,
            d @ '0'..='7' => {
                let mut value = d.to_digit(8)?;
                for _ in 0..2 {
                    value = value * 8 + chars.next()?.to_digit(8)?;
                }
                char::from_u32(value).filter(|_| value <= 0xFF)?
            }
            _ => return None,
        };
        out.push(escaped);
    }
    Some(out)
}

fn hex_escape(chars: &mut std::str::Chars<'_>, len: usize) -> Option<char> {
    let mut value = 0u32;
    for _ in 0..len {
        value = value.checked_mul(16)? + chars.next()?.to_digit(16)?;
    }
    char::from_u32(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        lex(src).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn plain_text() {
        assert_eq!(
            kinds("hello"),
            vec![TokenKind::Text("hello".to_string()), TokenKind::Eof]
        );
    }

    #[test]
    fn simple_action() {
        assert_eq!(
            kinds("a{{ .Labels.job }}b"),
            vec![
                TokenKind::Text("a".to_string()),
                TokenKind::LeftDelim,
                TokenKind::Space,
                TokenKind::Field("Labels".to_string()),
                TokenKind::Field("job".to_string()),
                TokenKind::Space,
                TokenKind::RightDelim,
                TokenKind::Text("b".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn variables_and_declarations() {
        assert_eq!(
            kinds("{{$x := $labels.a}}"),
            vec![
                TokenKind::LeftDelim,
                TokenKind::Variable("$x".to_string()),
                TokenKind::Space,
                TokenKind::Declare,
                TokenKind::Space,
                TokenKind::Variable("$labels".to_string()),
                TokenKind::Field("a".to_string()),
                TokenKind::RightDelim,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn keywords_literals_and_punctuation() {
        let got = kinds(r#"{{if eq "a\n" 'x' 1.5 true nil}}"#);
        assert_eq!(
            got,
            vec![
                TokenKind::LeftDelim,
                TokenKind::Keyword(Keyword::If),
                TokenKind::Space,
                TokenKind::Ident("eq".to_string()),
                TokenKind::Space,
                TokenKind::Str("a\n".to_string()),
                TokenKind::Space,
                TokenKind::Char('x'),
                TokenKind::Space,
                TokenKind::Number("1.5".to_string()),
                TokenKind::Space,
                TokenKind::Bool(true),
                TokenKind::Space,
                TokenKind::Nil,
                TokenKind::RightDelim,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn trim_markers() {
        assert_eq!(
            kinds("a  {{- 1 -}}  b"),
            vec![
                TokenKind::Text("a".to_string()),
                TokenKind::LeftDelim,
                TokenKind::Number("1".to_string()),
                TokenKind::RightDelim,
                TokenKind::Text("b".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn negative_number_is_not_a_trim_marker() {
        assert_eq!(
            kinds("{{-1}}"),
            vec![
                TokenKind::LeftDelim,
                TokenKind::Number("-1".to_string()),
                TokenKind::RightDelim,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn comments_are_dropped() {
        assert_eq!(
            kinds("a{{/* note */}}b"),
            vec![
                TokenKind::Text("a".to_string()),
                TokenKind::Text("b".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn line_numbers_advance() {
        let tokens = lex("a\nb\n{{ .x }}");
        let field = tokens
            .iter()
            .find(|t| matches!(t.kind, TokenKind::Field(_)))
            .map(|t| t.line);
        assert_eq!(field, Some(3));
    }

    fn last_error(src: &str) -> Option<String> {
        lex(src).into_iter().last().and_then(|t| match t.kind {
            TokenKind::Error(message) => Some(message),
            _ => None,
        })
    }

    #[test]
    fn lexical_errors() {
        assert_eq!(last_error("{{ .x "), Some("unclosed action".to_string()));
        assert_eq!(last_error("{{ \"abc }}"), Some("unterminated quoted string".to_string()));
        assert_eq!(last_error("{{ `abc }}"), Some("unterminated raw quoted string".to_string()));
        assert_eq!(last_error("{{/* x }}"), Some("unclosed comment".to_string()));
        assert_eq!(
            last_error("{{/* x */ .y}}"),
            Some("comment ends before closing delimiter".to_string())
        );
        assert_eq!(last_error("{{ 12ab }}"), Some("bad number syntax: \"12a\"".to_string()));
        assert_eq!(last_error("{{ ) }}"), Some("unexpected right paren".to_string()));
        assert_eq!(last_error("{{ (1 }}"), Some("unclosed left paren".to_string()));
        assert_eq!(last_error("{{ .x# }}"), Some("bad character U+0023 '#'".to_string()));
    }

    #[test]
    fn describe_tokens() {
        let tokens = lex("{{ end }}");
        let end = tokens
            .iter()
            .find(|t| matches!(t.kind, TokenKind::Keyword(Keyword::End)));
        assert_eq!(end.map(Token::describe).as_deref(), Some("<end>"));

        let tokens = lex("{{ \"a very long string\" }}");
        let s = tokens.iter().find(|t| matches!(t.kind, TokenKind::Str(_)));
        assert_eq!(s.map(Token::describe).as_deref(), Some(r#""\"a very lo"..."#));
    }
}
