//! Recursive-descent parser producing the template syntax tree.
//!
//! Function names are checked against the caller's function table and
//! variables against the declarations in scope, so misspellings surface as
//! parse errors rather than at render time.

use std::collections::HashMap;
use std::fmt;

use crate::template::error::TemplateError;
use crate::template::lexer::{Keyword, Token, TokenKind, lex};
use crate::template::printf::format_float;

/// A parsed template and the named templates it defines.
#[derive(Debug, Clone, Default)]
pub(crate) struct Tree {
    pub(crate) root: Vec<Node>,
    pub(crate) defines: HashMap<String, Vec<Node>>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Text(String),
    Action(Pipeline),
    If(Branch),
    Range(Branch),
    With(Branch),
    Template {
        line: usize,
        name: String,
        pipe: Option<Pipeline>,
    },
    Break {
        line: usize,
    },
    Continue {
        line: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Branch {
    pub(crate) line: usize,
    pub(crate) pipe: Pipeline,
    pub(crate) list: Vec<Node>,
    pub(crate) else_list: Option<Vec<Node>>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Pipeline {
    pub(crate) line: usize,
    /// True for `=`, false for `:=`.
    pub(crate) is_assign: bool,
    pub(crate) decl: Vec<String>,
    pub(crate) cmds: Vec<Command>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Command {
    pub(crate) args: Vec<Arg>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Arg {
    Dot,
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// `.A.B`
    Field(Vec<String>),
    /// `$x.A.B`
    Variable(String, Vec<String>),
    Function(String),
    /// Field access on the result of a function or parenthesized pipeline.
    Chain(Box<Arg>, Vec<String>),
    Pipe(Box<Pipeline>),
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn fields(f: &mut fmt::Formatter<'_>, names: &[String]) -> fmt::Result {
            names.iter().try_for_each(|n| write!(f, ".{n}"))
        }

        match self {
            Self::Dot => f.write_str("."),
            Self::Nil => f.write_str("nil"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => f.write_str(&format_float(*x, None)),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Field(names) => fields(f, names),
            Self::Variable(name, names) => {
                f.write_str(name)?;
                fields(f, names)
            }
            Self::Function(name) => f.write_str(name),
            Self::Chain(base, names) => {
                write!(f, "{base}")?;
                fields(f, names)
            }
            Self::Pipe(pipe) => write!(f, "({pipe})"),
        }
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.decl.is_empty() {
            let op = if self.is_assign { "=" } else { ":=" };
            write!(f, "{} {op} ", self.decl.join(", "))?;
        }
        for (i, cmd) in self.cmds.iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            for (j, arg) in cmd.args.iter().enumerate() {
                if j > 0 {
                    f.write_str(" ")?;
                }
                write!(f, "{arg}")?;
            }
        }
        Ok(())
    }
}

/// What closed an item list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Terminator {
    End,
    Else,
}

impl Terminator {
    const fn describe(self) -> &'static str {
        match self {
            Self::End => "{{end}}",
            Self::Else => "{{else}}",
        }
    }
}

enum Item {
    Node(Node),
    Close(Terminator),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PipeEnd {
    RightDelim,
    RightParen,
}

impl PipeEnd {
    const fn matches(self, kind: &TokenKind) -> bool {
        matches!(
            (self, kind),
            (Self::RightDelim, TokenKind::RightDelim) | (Self::RightParen, TokenKind::RightParen)
        )
    }
}

/// Maximum nesting of control structures, blocks and parenthesized
/// pipelines.
const MAX_PARSE_DEPTH: usize = 100;

/// Parses `text` as a template called `name`.
pub(crate) fn parse(
    name: &str,
    text: &str,
    is_func: &dyn Fn(&str) -> bool,
) -> Result<Tree, TemplateError> {
    let mut parser = Parser {
        name,
        tokens: lex(text),
        pos: 0,
        line: 1,
        vars: vec!["$".to_string()],
        range_depth: 0,
        depth: 0,
        is_func,
        defines: HashMap::new(),
    };
    let root = parser.parse_root()?;
    Ok(Tree {
        root,
        defines: parser.defines,
    })
}

fn is_empty_tree(nodes: &[Node]) -> bool {
    nodes.iter().all(|n| match n {
        Node::Text(text) => text.trim().is_empty(),
        _ => false,
    })
}

struct Parser<'a> {
    name: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    /// Line of the most recently consumed token.
    line: usize,
    vars: Vec<String>,
    range_depth: usize,
    /// Current nesting, bounded by [`MAX_PARSE_DEPTH`].
    depth: usize,
    is_func: &'a dyn Fn(&str) -> bool,
    defines: HashMap<String, Vec<Node>>,
}

impl Parser<'_> {
    // The lexer always ends the stream with an EOF or error token, which is
    // returned for every read past the end.
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn next(&mut self) -> Token {
        let token = self.peek().clone();
        self.pos += 1;
        self.line = token.line;
        token
    }

    fn backup(&mut self) {
        self.pos -= 1;
    }

    fn next_non_space(&mut self) -> Token {
        loop {
            let token = self.next();
            if token.kind != TokenKind::Space {
                return token;
            }
        }
    }

    fn peek_non_space(&mut self) -> Token {
        let token = self.next_non_space();
        self.backup();
        token
    }

    fn error(&self, message: impl Into<String>) -> TemplateError {
        TemplateError::parse(self.name, self.line, message)
    }

    fn nested<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, TemplateError>,
    ) -> Result<T, TemplateError> {
        if self.depth >= MAX_PARSE_DEPTH {
            return Err(self.error("max expression depth exceeded"));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn unexpected(&self, token: &Token, context: &str) -> TemplateError {
        match &token.kind {
            TokenKind::Error(message) => self.error(message.clone()),
            _ => self.error(format!("unexpected {} in {context}", token.describe())),
        }
    }

    fn expect_right_delim(&mut self, context: &str) -> Result<Token, TemplateError> {
        let token = self.next_non_space();
        if token.kind == TokenKind::RightDelim {
            Ok(token)
        } else {
            Err(self.unexpected(&token, context))
        }
    }

    fn parse_root(&mut self) -> Result<Vec<Node>, TemplateError> {
        let mut root = Vec::new();
        loop {
            match self.peek().kind {
                TokenKind::Eof => return Ok(root),
                TokenKind::LeftDelim => {
                    let mark = self.pos;
                    self.next();
                    if self.next_non_space().kind == TokenKind::Keyword(Keyword::Define) {
                        self.parse_definition()?;
                        continue;
                    }
                    self.pos = mark;
                }
                _ => {}
            }

            match self.text_or_action()? {
                Item::Node(node) => root.push(node),
                Item::Close(t) => return Err(self.error(format!("unexpected {}", t.describe()))),
            }
        }
    }

    fn parse_definition(&mut self) -> Result<(), TemplateError> {
        const CONTEXT: &str = "define clause";

        let token = self.next_non_space();
        let name = match &token.kind {
            TokenKind::Str(s) => s.clone(),
            _ => return Err(self.unexpected(&token, CONTEXT)),
        };
        self.expect_right_delim(CONTEXT)?;

        let (list, end) = self.isolated_item_list()?;
        if end != Terminator::End {
            return Err(self.error(format!("unexpected {} in {CONTEXT}", end.describe())));
        }
        self.add_definition(name, list)
    }

    /// Parses an item list with a fresh variable scope, as used by the bodies
    /// of `define` and `block`.
    fn isolated_item_list(&mut self) -> Result<(Vec<Node>, Terminator), TemplateError> {
        let vars = std::mem::replace(&mut self.vars, vec!["$".to_string()]);
        let depth = std::mem::take(&mut self.range_depth);
        let result = self.nested(Self::item_list);
        self.vars = vars;
        self.range_depth = depth;
        result
    }

    fn add_definition(&mut self, name: String, list: Vec<Node>) -> Result<(), TemplateError> {
        match self.defines.get(&name) {
            Some(existing) if !is_empty_tree(existing) => {
                if is_empty_tree(&list) {
                    Ok(())
                } else {
                    Err(self.error(format!("template: multiple definition of template {name:?}")))
                }
            }
            _ => {
                self.defines.insert(name, list);
                Ok(())
            }
        }
    }

    fn item_list(&mut self) -> Result<(Vec<Node>, Terminator), TemplateError> {
        let mut list = Vec::new();
        loop {
            if self.peek_non_space().kind == TokenKind::Eof {
                self.next_non_space();
                return Err(self.error("unexpected EOF"));
            }
            match self.text_or_action()? {
                Item::Node(node) => list.push(node),
                Item::Close(t) => return Ok((list, t)),
            }
        }
    }

    fn text_or_action(&mut self) -> Result<Item, TemplateError> {
        let token = self.next_non_space();
        match token.kind {
            TokenKind::Text(text) => Ok(Item::Node(Node::Text(text))),
            TokenKind::LeftDelim => self.action(),
            _ => Err(self.unexpected(&token, "input")),
        }
    }

    fn action(&mut self) -> Result<Item, TemplateError> {
        let token = self.next_non_space();
        let node = match token.kind {
            TokenKind::Keyword(Keyword::Block) => self.block_control()?,
            TokenKind::Keyword(Keyword::Break) => self.loop_control(token.line, "break")?,
            TokenKind::Keyword(Keyword::Continue) => self.loop_control(token.line, "continue")?,
            TokenKind::Keyword(Keyword::Else) => {
                // `else if` and `else with` leave the keyword pending for the
                // enclosing control.
                let peek = self.peek_non_space();
                if !matches!(peek.kind, TokenKind::Keyword(Keyword::If | Keyword::With)) {
                    self.expect_right_delim("else")?;
                }
                return Ok(Item::Close(Terminator::Else));
            }
            TokenKind::Keyword(Keyword::End) => {
                self.expect_right_delim("end")?;
                return Ok(Item::Close(Terminator::End));
            }
            TokenKind::Keyword(Keyword::If) => Node::If(self.parse_control("if")?),
            TokenKind::Keyword(Keyword::Range) => Node::Range(self.parse_control("range")?),
            TokenKind::Keyword(Keyword::With) => Node::With(self.parse_control("with")?),
            TokenKind::Keyword(Keyword::Template) => self.template_control()?,
            _ => {
                self.backup();
                Node::Action(self.pipeline("command", PipeEnd::RightDelim)?)
            }
        };
        Ok(Item::Node(node))
    }

    fn parse_control(&mut self, context: &str) -> Result<Branch, TemplateError> {
        let mark = self.vars.len();
        let result = self.nested(|p| p.parse_control_scoped(context));
        self.vars.truncate(mark);
        result
    }

    fn parse_control_scoped(&mut self, context: &str) -> Result<Branch, TemplateError> {
        let pipe = self.pipeline(context, PipeEnd::RightDelim)?;

        let is_range = context == "range";
        if is_range {
            self.range_depth += 1;
        }
        let listed = self.item_list();
        if is_range {
            self.range_depth -= 1;
        }
        let (list, next) = listed?;

        let else_list = match next {
            Terminator::End => None,
            Terminator::Else => {
                let chained = &self.peek().kind;
                if context == "if" && *chained == TokenKind::Keyword(Keyword::If) {
                    self.next();
                    Some(vec![Node::If(self.parse_control("if")?)])
                } else if context == "with" && *chained == TokenKind::Keyword(Keyword::With) {
                    self.next();
                    Some(vec![Node::With(self.parse_control("with")?)])
                } else {
                    let (list, next) = self.item_list()?;
                    if next != Terminator::End {
                        return Err(self.error(format!("expected end; found {}", next.describe())));
                    }
                    Some(list)
                }
            }
        };

        Ok(Branch {
            line: pipe.line,
            pipe,
            list,
            else_list,
        })
    }

    fn loop_control(&mut self, line: usize, keyword: &str) -> Result<Node, TemplateError> {
        let token = self.next_non_space();
        if token.kind != TokenKind::RightDelim {
            return Err(self.unexpected(&token, &format!("{{{{{keyword}}}}}")));
        }
        if self.range_depth == 0 {
            return Err(self.error(format!("{{{{{keyword}}}}} outside {{{{range}}}}")));
        }
        Ok(if keyword == "break" {
            Node::Break { line }
        } else {
            Node::Continue { line }
        })
    }

    fn template_name(&mut self, context: &str) -> Result<(String, usize), TemplateError> {
        let token = self.next_non_space();
        match &token.kind {
            TokenKind::Str(s) => Ok((s.clone(), token.line)),
            _ => Err(self.unexpected(&token, context)),
        }
    }

    fn template_control(&mut self) -> Result<Node, TemplateError> {
        const CONTEXT: &str = "template clause";

        let (name, line) = self.template_name(CONTEXT)?;
        let pipe = if self.next_non_space().kind == TokenKind::RightDelim {
            None
        } else {
            self.backup();
            Some(self.pipeline(CONTEXT, PipeEnd::RightDelim)?)
        };
        Ok(Node::Template { line, name, pipe })
    }

    fn block_control(&mut self) -> Result<Node, TemplateError> {
        const CONTEXT: &str = "block clause";

        let (name, line) = self.template_name(CONTEXT)?;
        let pipe = self.pipeline(CONTEXT, PipeEnd::RightDelim)?;

        let (list, end) = self.isolated_item_list()?;
        if end != Terminator::End {
            return Err(self.error(format!("unexpected {} in {CONTEXT}", end.describe())));
        }
        self.add_definition(name.clone(), list)?;

        Ok(Node::Template {
            line,
            name,
            pipe: Some(pipe),
        })
    }

    fn pipeline(&mut self, context: &str, end: PipeEnd) -> Result<Pipeline, TemplateError> {
        let mut pipe = Pipeline {
            line: self.peek_non_space().line,
            is_assign: false,
            decl: Vec::new(),
            cmds: Vec::new(),
        };

        // Declarations: `$x :=`, `$x =`, or `$i, $e :=` in a range.
        loop {
            let var = self.peek_non_space();
            let TokenKind::Variable(name) = var.kind else {
                break;
            };
            let mark = self.pos;
            self.next();
            let next = self.peek_non_space();
            match next.kind {
                TokenKind::Assign | TokenKind::Declare => {
                    pipe.is_assign = next.kind == TokenKind::Assign;
                    self.next_non_space();
                    pipe.decl.push(name.clone());
                    self.vars.push(name);
                }
                TokenKind::Comma => {
                    self.next_non_space();
                    pipe.decl.push(name.clone());
                    self.vars.push(name);
                    if context == "range" && pipe.decl.len() < 2 {
                        match self.peek_non_space().kind {
                            TokenKind::Variable(_) | TokenKind::RightDelim | TokenKind::RightParen => {
                                continue;
                            }
                            _ => return Err(self.error("range can only initialize variables")),
                        }
                    }
                    return Err(self.error(format!("too many declarations in {context}")));
                }
                _ => self.pos = mark,
            }
            break;
        }

        loop {
            let token = self.next_non_space();
            if end.matches(&token.kind) {
                self.check_pipeline(&pipe, context)?;
                return Ok(pipe);
            }
            match token.kind {
                TokenKind::Bool(_)
                | TokenKind::Char(_)
                | TokenKind::Dot
                | TokenKind::Field(_)
                | TokenKind::Ident(_)
                | TokenKind::Number(_)
                | TokenKind::Nil
                | TokenKind::Str(_)
                | TokenKind::Variable(_)
                | TokenKind::LeftParen => {
                    self.backup();
                    let cmd = self.command()?;
                    pipe.cmds.push(cmd);
                }
                _ => return Err(self.unexpected(&token, context)),
            }
        }
    }

    fn check_pipeline(&self, pipe: &Pipeline, context: &str) -> Result<(), TemplateError> {
        if pipe.cmds.is_empty() {
            return Err(self.error(format!("missing value for {context}")));
        }
        for (i, cmd) in pipe.cmds.iter().enumerate().skip(1) {
            if matches!(
                cmd.args.first(),
                Some(Arg::Bool(_) | Arg::Dot | Arg::Nil | Arg::Int(_) | Arg::Float(_) | Arg::Str(_))
            ) {
                return Err(self.error(format!("non executable command in pipeline stage {}", i + 1)));
            }
        }
        Ok(())
    }

    fn command(&mut self) -> Result<Command, TemplateError> {
        let mut cmd = Command { args: Vec::new() };
        loop {
            self.peek_non_space();
            if let Some(arg) = self.operand()? {
                cmd.args.push(arg);
            }
            let token = self.next();
            match token.kind {
                TokenKind::Space => continue,
                TokenKind::RightDelim | TokenKind::RightParen => self.backup(),
                TokenKind::Pipe => {}
                _ => return Err(self.unexpected(&token, "operand")),
            }
            break;
        }
        if cmd.args.is_empty() {
            return Err(self.error("empty command"));
        }
        Ok(cmd)
    }

    fn operand(&mut self) -> Result<Option<Arg>, TemplateError> {
        let Some((arg, text)) = self.term()? else {
            return Ok(None);
        };
        if !matches!(self.peek().kind, TokenKind::Field(_)) {
            return Ok(Some(arg));
        }

        let mut fields = Vec::new();
        while let TokenKind::Field(field) = &self.peek().kind {
            fields.push(field.clone());
            self.next();
        }
        let arg = match arg {
            Arg::Field(mut base) => {
                base.extend(fields);
                Arg::Field(base)
            }
            Arg::Variable(name, mut base) => {
                base.extend(fields);
                Arg::Variable(name, base)
            }
            Arg::Bool(_) | Arg::Str(_) | Arg::Int(_) | Arg::Float(_) | Arg::Nil | Arg::Dot => {
                return Err(self.error(format!("unexpected . after term {text:?}")));
            }
            other => Arg::Chain(Box::new(other), fields),
        };
        Ok(Some(arg))
    }

    /// Parses a single term, returning it with its source text.
    fn term(&mut self) -> Result<Option<(Arg, String)>, TemplateError> {
        let token = self.next_non_space();
        let arg = match token.kind {
            TokenKind::Ident(name) => {
                if !(self.is_func)(&name) {
                    return Err(self.error(format!("function {name:?} not defined")));
                }
                Arg::Function(name)
            }
            TokenKind::Dot => Arg::Dot,
            TokenKind::Nil => Arg::Nil,
            TokenKind::Variable(name) => {
                if !self.vars.contains(&name) {
                    return Err(self.error(format!("undefined variable {name:?}")));
                }
                Arg::Variable(name, Vec::new())
            }
            TokenKind::Field(name) => Arg::Field(vec![name]),
            TokenKind::Bool(b) => Arg::Bool(b),
            TokenKind::Char(c) => Arg::Int(i64::from(u32::from(c))),
            TokenKind::Number(ref text) => self.number(text)?,
            TokenKind::LeftParen => Arg::Pipe(Box::new(
                self.nested(|p| p.pipeline("parenthesized pipeline", PipeEnd::RightParen))?,
            )),
            TokenKind::Str(s) => Arg::Str(s),
            _ => {
                self.backup();
                return Ok(None);
            }
        };
        Ok(Some((arg, token.val)))
    }

    fn number(&self, text: &str) -> Result<Arg, TemplateError> {
        let illegal = || self.error(format!("illegal number syntax: {text:?}"));
        let clean = text.replace('_', "");
        let unsigned = clean.trim_start_matches(['+', '-']);
        let is_hex = unsigned.starts_with("0x") || unsigned.starts_with("0X");
        let is_float = clean.contains('.') || (!is_hex && clean.contains(['e', 'E']));

        if !is_float {
            if let Some(i) = parse_int(&clean) {
                return Ok(Arg::Int(i));
            }
        }
        if is_hex {
            return Err(illegal());
        }
        clean.parse::<f64>().map(Arg::Float).map_err(|_| illegal())
    }
}

/// Parses an integer literal with an optional sign and base prefix.
fn parse_int(text: &str) -> Option<i64> {
    let (negative, unsigned) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let (radix, digits) = match unsigned.get(..2) {
        Some("0x" | "0X") => (16, &unsigned[2..]),
        Some("0o" | "0O") => (8, &unsigned[2..]),
        Some("0b" | "0B") => (2, &unsigned[2..]),
        _ if unsigned.len() > 1 && unsigned.starts_with('0') => (8, &unsigned[1..]),
        _ => (10, unsigned),
    };
    if digits.is_empty() || digits.starts_with(['+', '-']) {
        return None;
    }
    let magnitude = i128::from(u64::from_str_radix(digits, radix).ok()?);
    i64::try_from(if negative { -magnitude } else { magnitude }).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_func(name: &str) -> bool {
        matches!(name, "eq" | "len" | "printf" | "humanize")
    }

    fn parse_ok(text: &str) -> Tree {
        parse("t", text, &is_func).unwrap()
    }

    fn parse_err(text: &str) -> String {
        match parse("t", text, &is_func) {
            Err(e) => {
                assert!(e.is_parse());
                e.message().to_string()
            }
            Ok(tree) => unreachable!("parsed unexpectedly: {tree:?}"),
        }
    }

    fn single_arg(text: &str) -> Arg {
        match parse_ok(text).root.as_slice() {
            [Node::Action(pipe)] => pipe.cmds[0].args[0].clone(),
            other => unreachable!("unexpected tree {other:?}"),
        }
    }

    #[test]
    fn text_and_actions() {
        let tree = parse_ok("a{{ .Labels.job }}b");
        assert_eq!(tree.root.len(), 3);
        assert_eq!(tree.root[0], Node::Text("a".to_string()));
        assert!(matches!(
            &tree.root[1],
            Node::Action(p) if p.cmds[0].args == vec![Arg::Field(vec!["Labels".into(), "job".into()])]
        ));
    }

    #[test]
    fn numbers() {
        assert_eq!(single_arg("{{ 42 }}"), Arg::Int(42));
        assert_eq!(single_arg("{{ -5 }}"), Arg::Int(-5));
        assert_eq!(single_arg("{{ 0x10 }}"), Arg::Int(16));
        assert_eq!(single_arg("{{ 010 }}"), Arg::Int(8));
        assert_eq!(single_arg("{{ 1_000 }}"), Arg::Int(1000));
        assert_eq!(single_arg("{{ 1.5 }}"), Arg::Float(1.5));
        assert_eq!(single_arg("{{ 1e3 }}"), Arg::Float(1000.0));
        assert_eq!(single_arg("{{ 'a' }}"), Arg::Int(97));
    }

    #[test]
    fn variables_and_chains() {
        let tree = parse_ok("{{ $x := .Labels }}{{ $x.job }}{{ (len .).Foo }}");
        assert_eq!(tree.root.len(), 3);
        assert!(matches!(
            &tree.root[0],
            Node::Action(p) if p.decl == vec!["$x".to_string()] && !p.is_assign
        ));
        assert!(matches!(
            &tree.root[1],
            Node::Action(p) if p.cmds[0].args[0] == Arg::Variable("$x".into(), vec!["job".into()])
        ));
        assert!(matches!(
            &tree.root[2],
            Node::Action(p) if matches!(&p.cmds[0].args[0], Arg::Chain(_, f) if f == &vec!["Foo".to_string()])
        ));
    }

    #[test]
    fn control_structures() {
        let tree = parse_ok(
            "{{ if .a }}x{{ else if .b }}y{{ else }}z{{ end }}\
             {{ range $i, $e := .list }}{{ $i }}{{ break }}{{ end }}\
             {{ with .c }}{{ . }}{{ end }}",
        );
        assert_eq!(tree.root.len(), 3);
        let Node::If(branch) = &tree.root[0] else {
            unreachable!("expected if");
        };
        assert!(matches!(branch.else_list.as_deref(), Some([Node::If(inner)]) if inner.else_list.is_some()));
        assert!(matches!(&tree.root[1], Node::Range(b) if b.pipe.decl.len() == 2));
        assert!(matches!(&tree.root[2], Node::With(_)));
    }

    #[test]
    fn define_and_template() {
        let tree = parse_ok(r#"{{ define "x" }}hi {{ . }}{{ end }}{{ template "x" .a }}"#);
        assert!(tree.defines.contains_key("x"));
        assert!(matches!(
            tree.root.as_slice(),
            [Node::Template { name, pipe: Some(_), .. }] if name == "x"
        ));
    }

    #[test]
    fn block_defines_template() {
        let tree = parse_ok(r#"{{ block "b" . }}default{{ end }}"#);
        assert!(tree.defines.contains_key("b"));
    }

    #[test]
    fn variables_are_scoped_to_controls() {
        assert_eq!(
            parse_err("{{ if true }}{{ $x := 1 }}{{ end }}{{ $x }}"),
            "undefined variable \"$x\""
        );
        parse_ok("{{ $x := 1 }}{{ if true }}{{ $x }}{{ end }}");
    }

    #[test]
    fn parse_errors() {
        assert_eq!(parse_err("{{ if }}{{ end }}"), "missing value for if");
        assert_eq!(parse_err("{{ }}"), "missing value for command");
        assert_eq!(parse_err("{{ end }}"), "unexpected {{end}}");
        assert_eq!(parse_err("{{ else }}"), "unexpected {{else}}");
        assert_eq!(parse_err("{{ if .x }}"), "unexpected EOF");
        assert_eq!(parse_err("{{ nosuch .x }}"), "function \"nosuch\" not defined");
        assert_eq!(parse_err("{{ $y }}"), "undefined variable \"$y\"");
        assert_eq!(parse_err("{{ break }}"), "{{break}} outside {{range}}");
        assert_eq!(parse_err("{{ .x | 1 }}"), "non executable command in pipeline stage 2");
        assert_eq!(parse_err(r#"{{ "a".x }}"#), r#"unexpected . after term "\"a\"""#);
        assert_eq!(parse_err("{{ (1)(2) }}"), "unexpected \"(\" in operand");
        assert_eq!(parse_err("{{ template .x }}"), "unexpected \".x\" in template clause");
        assert_eq!(
            parse_err("{{ range $i, $j, $k := . }}{{ end }}"),
            "too many declarations in range"
        );
        assert_eq!(
            parse_err("{{ range .a }}{{ else }}{{ else }}{{ end }}"),
            "expected end; found {{else}}"
        );
        assert_eq!(
            parse_err(r#"{{ define "a" }}x{{ end }}{{ define "a" }}y{{ end }}"#),
            "template: multiple definition of template \"a\""
        );
    }

    #[test]
    fn lexer_errors_surface_as_parse_errors() {
        assert_eq!(parse_err("{{ .x "), "unclosed action");
        assert_eq!(parse_err("{{ \"abc }}"), "unterminated quoted string");
    }

    #[test]
    fn nesting_is_bounded() {
        let parens = format!("{{{{ {}1{} }}}}", "(".repeat(3000), ")".repeat(3000));
        assert_eq!(parse_err(&parens), "max expression depth exceeded");

        let ifs = "{{ if 1 }}".repeat(5000);
        assert_eq!(parse_err(&ifs), "max expression depth exceeded");

        let blocks = r#"{{ block "b" . }}"#.repeat(5000);
        assert_eq!(parse_err(&blocks), "max expression depth exceeded");

        let else_ifs = format!("{{{{ if 0 }}}}{}{{{{ end }}}}", "{{ else if 0 }}".repeat(5000));
        assert_eq!(parse_err(&else_ifs), "max expression depth exceeded");
    }

    #[test]
    fn moderate_nesting_parses() {
        let parens = format!("{{{{ {}1{} }}}}", "(".repeat(50), ")".repeat(50));
        assert!(parse("t", &parens, &is_func).is_ok());

        let ifs = format!("{}{}", "{{ if 1 }}".repeat(50), "{{ end }}".repeat(50));
        assert!(parse("t", &ifs, &is_func).is_ok());
    }

    #[test]
    fn error_lines() {
        let err = parse("t", "a\nb\n{{ nosuch }}", &is_func).err();
        assert_eq!(err.map(|e| e.line()), Some(3));
    }
}
