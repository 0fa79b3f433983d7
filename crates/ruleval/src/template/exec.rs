//! Tree-walking executor.

use std::mem;

use chrono::{DateTime, Utc};
use url::Url;

use crate::client::MetricsClient;
use crate::template::error::TemplateError;
use crate::template::funcs::{self, FuncError};
use crate::template::parse::{Arg, Branch, Command, Node, Pipeline, Tree};
use crate::template::value::{NIL, Value};

/// Maximum nesting of `template` invocations and `if`/`with`/`range` bodies.
pub(crate) const MAX_TEMPLATE_DEPTH: usize = 200;

/// Maximum number of range iterations plus template invocations in one
/// rendering.
pub(crate) const MAX_EXEC_STEPS: usize = 100_000;

/// Maximum size of the rendered text and of any string a function returns.
pub(crate) const MAX_OUTPUT_BYTES: usize = 1 << 20;

/// The runtime collaborators available to template functions.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Env<'a> {
    pub(crate) client: &'a dyn MetricsClient,
    pub(crate) timestamp: DateTime<Utc>,
    pub(crate) external_url: Option<&'a Url>,
}

/// Renders `tree` with `data` as the initial dot and `$`.
pub(crate) fn execute(
    name: &str,
    tree: &Tree,
    data: &Value,
    env: &Env<'_>,
) -> Result<String, TemplateError> {
    let mut state = State {
        tree,
        env,
        vars: vec![("$".to_string(), data.clone())],
        out: String::new(),
        depth: 0,
        steps: 0,
        line: 1,
    };
    match state.walk_list(data, &tree.root) {
        Ok(_) => Ok(state.out),
        Err(message) => Err(TemplateError::exec(name, state.line, message)),
    }
}

/// Control flow out of a list of nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Normal,
    Break,
    Continue,
}

type ExecResult<T> = Result<T, String>;

struct State<'t, 'e> {
    tree: &'t Tree,
    env: &'t Env<'e>,
    /// Variable stack, innermost last.
    vars: Vec<(String, Value)>,
    out: String,
    depth: usize,
    steps: usize,
    /// Line of the node being executed, for error reporting.
    line: usize,
}

impl<'t> State<'t, '_> {
    fn walk_list(&mut self, dot: &Value, nodes: &'t [Node]) -> ExecResult<Flow> {
        for node in nodes {
            let flow = self.walk(dot, node)?;
            if flow != Flow::Normal {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    fn walk(&mut self, dot: &Value, node: &'t Node) -> ExecResult<Flow> {
        match node {
            Node::Text(text) => self.emit(text)?,
            Node::Action(pipe) => {
                self.line = pipe.line;
                let value = self.eval_pipeline(dot, pipe)?;
                if pipe.decl.is_empty() {
                    self.emit(&value.to_string())?;
                }
            }
            Node::If(branch) | Node::With(branch) => {
                self.line = branch.line;
                let mark = self.vars.len();
                let is_if = matches!(node, Node::If(_));
                let result = self.nested(|state| state.walk_if_or_with(dot, branch, is_if));
                self.vars.truncate(mark);
                return result;
            }
            Node::Range(branch) => {
                self.line = branch.line;
                let mark = self.vars.len();
                let result = self.nested(|state| state.walk_range(dot, branch));
                self.vars.truncate(mark);
                return result;
            }
            Node::Template { line, name, pipe } => {
                self.line = *line;
                self.walk_template(dot, name, pipe.as_ref())?;
            }
            Node::Break { line } => {
                self.line = *line;
                return Ok(Flow::Break);
            }
            Node::Continue { line } => {
                self.line = *line;
                return Ok(Flow::Continue);
            }
        }
        Ok(Flow::Normal)
    }

    fn emit(&mut self, text: &str) -> ExecResult<()> {
        if self.out.len() + text.len() > MAX_OUTPUT_BYTES {
            return Err(format!("output exceeds {MAX_OUTPUT_BYTES} bytes"));
        }
        self.out.push_str(text);
        Ok(())
    }

    /// Runs `f` one nesting level deeper.
    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> ExecResult<T>) -> ExecResult<T> {
        if self.depth >= MAX_TEMPLATE_DEPTH {
            return Err(format!("exceeded maximum template depth ({MAX_TEMPLATE_DEPTH})"));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    /// Counts one range iteration or template invocation.
    fn step(&mut self) -> ExecResult<()> {
        self.steps += 1;
        if self.steps > MAX_EXEC_STEPS {
            return Err(format!("exceeded maximum of {MAX_EXEC_STEPS} range iterations and template calls"));
        }
        Ok(())
    }

    fn walk_if_or_with(&mut self, dot: &Value, branch: &'t Branch, is_if: bool) -> ExecResult<Flow> {
        let value = self.eval_pipeline(dot, &branch.pipe)?;
        if value.is_true() {
            if is_if {
                self.walk_list(dot, &branch.list)
            } else {
                self.walk_list(&value, &branch.list)
            }
        } else if let Some(else_list) = &branch.else_list {
            self.walk_list(dot, else_list)
        } else {
            Ok(Flow::Normal)
        }
    }

    fn walk_range(&mut self, dot: &Value, branch: &'t Branch) -> ExecResult<Flow> {
        let value = self.eval_pipeline(dot, &branch.pipe)?;
        let mark = self.vars.len();

        let iterated = match value {
            Value::List(items) => self.range_over(
                branch,
                mark,
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| (Value::Int(i as i64), v)),
            )?,
            Value::Map(map) => {
                self.range_over(branch, mark, map.into_iter().map(|(k, v)| (Value::Str(k), v)))?
            }
            Value::Int(n) => {
                if branch.pipe.decl.len() > 1 {
                    return Err(format!("can't use {n} to iterate over more than one variable"));
                }
                self.range_over(branch, mark, (0..n.max(0)).map(|i| (Value::Int(i), Value::Int(i))))?
            }
            Value::Nil => false,
            other => return Err(format!("range can't iterate over {other}")),
        };

        match &branch.else_list {
            Some(else_list) if !iterated => self.walk_list(dot, else_list),
            _ => Ok(Flow::Normal),
        }
    }

    /// Runs the range body once per item, stopping at `break`. Returns
    /// whether there was any item.
    fn range_over(
        &mut self,
        branch: &'t Branch,
        mark: usize,
        items: impl Iterator<Item = (Value, Value)>,
    ) -> ExecResult<bool> {
        let mut iterated = false;
        for (index, elem) in items {
            iterated = true;
            self.step()?;
            self.bind_range_vars(&branch.pipe, mark, index, elem.clone())?;
            let flow = self.walk_list(&elem, &branch.list);
            self.vars.truncate(mark);
            if flow? == Flow::Break {
                break;
            }
        }
        Ok(iterated)
    }

    /// Binds the element (and index, with two variables) of one iteration.
    /// Declared variables sit just below `mark`.
    fn bind_range_vars(
        &mut self,
        pipe: &Pipeline,
        mark: usize,
        index: Value,
        elem: Value,
    ) -> ExecResult<()> {
        match pipe.decl.as_slice() {
            [] => Ok(()),
            [elem_var] if pipe.is_assign => self.set_var(elem_var, elem),
            [index_var, elem_var] if pipe.is_assign => {
                self.set_var(index_var, index)?;
                self.set_var(elem_var, elem)
            }
            [_] => {
                self.vars[mark - 1].1 = elem;
                Ok(())
            }
            _ => {
                self.vars[mark - 1].1 = elem;
                self.vars[mark - 2].1 = index;
                Ok(())
            }
        }
    }

    fn walk_template(&mut self, dot: &Value, name: &str, pipe: Option<&'t Pipeline>) -> ExecResult<()> {
        let tree = self.tree;
        let Some(body) = tree.defines.get(name) else {
            return Err(format!("template {name:?} not defined"));
        };
        self.step()?;
        let new_dot = match pipe {
            Some(pipe) => self.eval_pipeline(dot, pipe)?,
            None => Value::Nil,
        };

        // Invoked templates see only `$`, bound to their dot.
        let saved = mem::replace(&mut self.vars, vec![("$".to_string(), new_dot.clone())]);
        let result = self.nested(|state| state.walk_list(&new_dot, body));
        self.vars = saved;
        result.map(|_| ())
    }

    fn lookup(&self, name: &str) -> ExecResult<Value> {
        self.vars
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
            .ok_or_else(|| format!("undefined variable: {name}"))
    }

    fn set_var(&mut self, name: &str, value: Value) -> ExecResult<()> {
        match self.vars.iter_mut().rev().find(|(n, _)| n == name) {
            Some(slot) => {
                slot.1 = value;
                Ok(())
            }
            None => Err(format!("undefined variable: {name}")),
        }
    }

    fn eval_pipeline(&mut self, dot: &Value, pipe: &'t Pipeline) -> ExecResult<Value> {
        let mut value = None;
        for cmd in &pipe.cmds {
            value = Some(self.eval_command(dot, cmd, value.take())?);
        }
        let value = value.unwrap_or_default();

        for name in &pipe.decl {
            if pipe.is_assign {
                self.set_var(name, value.clone())?;
            } else {
                self.vars.push((name.clone(), value.clone()));
            }
        }
        Ok(value)
    }

    fn eval_command(
        &mut self,
        dot: &Value,
        cmd: &'t Command,
        last: Option<Value>,
    ) -> ExecResult<Value> {
        let Some(first) = cmd.args.first() else {
            return Err("empty command".to_string());
        };
        let has_args = cmd.args.len() > 1 || last.is_some();

        match first {
            Arg::Field(names) => field_chain(dot, names, has_args),
            Arg::Variable(name, names) => {
                let value = self.lookup(name)?;
                if names.is_empty() {
                    not_a_function(first, has_args)?;
                    Ok(value)
                } else {
                    field_chain(&value, names, has_args)
                }
            }
            Arg::Chain(base, names) => {
                let value = self.eval_arg(dot, base)?;
                field_chain(&value, names, has_args)
            }
            Arg::Function(name) => self.eval_function(dot, name, &cmd.args[1..], last),
            Arg::Pipe(pipe) => {
                not_a_function(first, has_args)?;
                self.eval_pipeline(dot, pipe)
            }
            Arg::Nil => Err("nil is not a command".to_string()),
            literal => {
                not_a_function(literal, has_args)?;
                self.eval_arg(dot, literal)
            }
        }
    }

    fn eval_arg(&mut self, dot: &Value, arg: &'t Arg) -> ExecResult<Value> {
        match arg {
            Arg::Dot => Ok(dot.clone()),
            Arg::Nil => Ok(Value::Nil),
            Arg::Bool(b) => Ok(Value::Bool(*b)),
            Arg::Int(i) => Ok(Value::Int(*i)),
            Arg::Float(f) => Ok(Value::Float(*f)),
            Arg::Str(s) => Ok(Value::Str(s.clone())),
            Arg::Field(names) => field_chain(dot, names, false),
            Arg::Variable(name, names) => {
                let value = self.lookup(name)?;
                field_chain(&value, names, false)
            }
            Arg::Chain(base, names) => {
                let value = self.eval_arg(dot, base)?;
                field_chain(&value, names, false)
            }
            Arg::Function(name) => self.eval_function(dot, name, &[], None),
            Arg::Pipe(pipe) => self.eval_pipeline(dot, pipe),
        }
    }

    fn eval_function(
        &mut self,
        dot: &Value,
        name: &str,
        args: &'t [Arg],
        last: Option<Value>,
    ) -> ExecResult<Value> {
        // `and` and `or` stop evaluating at the first deciding operand.
        if name == "and" || name == "or" {
            if args.is_empty() && last.is_none() {
                return Err(format!("wrong number of args for {name}: want at least 1 got 0"));
            }
            let stop_on = name == "or";
            let mut value = Value::Nil;
            for arg in args {
                value = self.eval_arg(dot, arg)?;
                if value.is_true() == stop_on {
                    return Ok(value);
                }
            }
            return Ok(last.unwrap_or(value));
        }

        let mut values = Vec::with_capacity(args.len() + 1);
        for arg in args {
            values.push(self.eval_arg(dot, arg)?);
        }
        values.extend(last);

        let value = funcs::call(name, &values, self.env).map_err(|e| match e {
            FuncError::Usage(message) => message,
            FuncError::Call(message) => format!("error calling {name}: {message}"),
        })?;
        match &value {
            Value::Str(s) if s.len() > MAX_OUTPUT_BYTES => {
                Err(format!("error calling {name}: result exceeds {MAX_OUTPUT_BYTES} bytes"))
            }
            _ => Ok(value),
        }
    }
}

fn not_a_function(arg: &Arg, has_args: bool) -> ExecResult<()> {
    if has_args {
        Err(format!("can't give argument to non-function {arg}"))
    } else {
        Ok(())
    }
}

/// Resolves `.A.B...` starting from `receiver`. Only the final field may
/// receive arguments, and map entries never accept them.
fn field_chain(receiver: &Value, names: &[String], has_args: bool) -> ExecResult<Value> {
    let mut current = receiver.clone();
    for (i, name) in names.iter().enumerate() {
        let is_last = i + 1 == names.len();
        current = field(&current, name, has_args && is_last)?;
    }
    Ok(current)
}

fn field(receiver: &Value, name: &str, has_args: bool) -> ExecResult<Value> {
    match receiver {
        Value::Map(map) => {
            if has_args {
                return Err(format!("{name} is not a method but has arguments"));
            }
            Ok(map.get(name).unwrap_or(&NIL).clone())
        }
        Value::Nil => Ok(Value::Nil),
        other => Err(format!(
            "can't evaluate field {name} in type {}",
            other.type_name()
        )),
    }
}
