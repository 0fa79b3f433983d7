//! The template function table: the language builtins plus the functions
//! Prometheus exposes to alerting and console templates.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::net::IpAddr;

use regex::Regex;

use crate::duration::PromDuration;
use crate::template::exec::Env;
use crate::template::humanize;
use crate::template::printf::{sprint, sprintf, sprintln};
use crate::template::value::Value;

/// Every name callable from a template.
const FUNCTIONS: &[&str] = &[
    // language builtins
    "and",
    "or",
    "not",
    "len",
    "index",
    "slice",
    "call",
    "print",
    "printf",
    "println",
    "eq",
    "ne",
    "lt",
    "le",
    "gt",
    "ge",
    "html",
    "js",
    "urlquery",
    // Prometheus
    "query",
    "first",
    "label",
    "value",
    "strvalue",
    "args",
    "reReplaceAll",
    "match",
    "title",
    "toUpper",
    "toLower",
    "safeHtml",
    "sortByLabel",
    "humanize",
    "humanize1024",
    "humanizeDuration",
    "humanizePercentage",
    "humanizeTimestamp",
    "pathPrefix",
    "externalURL",
    "graphLink",
    "tableLink",
    "parseDuration",
    "toTime",
    "toDuration",
    "stripPort",
    "stripDomain",
];

/// A function call failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FuncError {
    /// The call itself was malformed (arity or argument types). Reported as is.
    Usage(String),
    /// The function ran and failed. Reported as `error calling <name>: ...`.
    Call(String),
}

/// Returns true if `name` is a template function.
pub(crate) fn is_defined(name: &str) -> bool {
    FUNCTIONS.contains(&name)
}

fn arity(name: &str, args: &[Value], want: usize) -> Result<(), FuncError> {
    if args.len() == want {
        Ok(())
    } else {
        Err(FuncError::Usage(format!(
            "wrong number of args for {name}: want {want} got {}",
            args.len()
        )))
    }
}

fn at_least(name: &str, args: &[Value], want: usize) -> Result<(), FuncError> {
    if args.len() >= want {
        Ok(())
    } else {
        Err(FuncError::Usage(format!(
            "wrong number of args for {name}: want at least {want} got {}",
            args.len()
        )))
    }
}

fn wrong_type(expected: &str, got: &Value) -> FuncError {
    FuncError::Usage(format!(
        "wrong type for value; expected {expected}; got {}",
        got.type_name()
    ))
}

fn string_arg(v: &Value) -> Result<&str, FuncError> {
    match v {
        Value::Str(s) => Ok(s),
        Value::Nil => Ok(""),
        other => Err(wrong_type("string", other)),
    }
}

fn float_arg(v: &Value) -> Result<f64, FuncError> {
    v.to_float().map_err(FuncError::Call)
}

fn samples_arg(v: &Value) -> Result<Vec<Value>, FuncError> {
    match v {
        Value::List(items) => Ok(items.clone()),
        Value::Nil => Ok(Vec::new()),
        other => Err(wrong_type("template.queryResult", other)),
    }
}

fn sample_labels(sample: &Value) -> Option<&BTreeMap<String, Value>> {
    match sample {
        Value::Map(m) => match m.get("Labels") {
            Some(Value::Map(labels)) => Some(labels),
            _ => None,
        },
        _ => None,
    }
}

fn sample_label(sample: &Value, label: &str) -> String {
    sample_labels(sample)
        .and_then(|labels| labels.get(label))
        .map(ToString::to_string)
        .unwrap_or_default()
}

/// Calls the function `name` with already evaluated arguments.
///
/// `and` and `or` are evaluated lazily by the executor and never reach here.
pub(crate) fn call(name: &str, args: &[Value], env: &Env<'_>) -> Result<Value, FuncError> {
    match name {
        "not" => {
            arity(name, args, 1)?;
            Ok(Value::Bool(!args[0].is_true()))
        }
        "len" => {
            arity(name, args, 1)?;
            length(&args[0])
        }
        "index" => {
            at_least(name, args, 1)?;
            index(&args[0], &args[1..])
        }
        "slice" => {
            at_least(name, args, 1)?;
            slice(&args[0], &args[1..])
        }
        // Template data never holds functions.
        "call" => {
            at_least(name, args, 1)?;
            Err(FuncError::Call(match &args[0] {
                Value::Nil => "call of nil".to_string(),
                other => format!("non-function of type {}", other.type_name()),
            }))
        }
        "print" => Ok(Value::Str(sprint(args))),
        "println" => Ok(Value::Str(sprintln(args))),
        "printf" => {
            at_least(name, args, 1)?;
            let format = string_arg(&args[0])?;
            Ok(Value::Str(sprintf(format, &args[1..])))
        }
        "eq" => {
            at_least(name, args, 1)?;
            let Some((first, rest)) = args.split_first().filter(|(_, rest)| !rest.is_empty()) else {
                return Err(FuncError::Call("missing argument for comparison".to_string()));
            };
            for other in rest {
                if equal(first, other)? {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        "ne" => {
            arity(name, args, 2)?;
            Ok(Value::Bool(!equal(&args[0], &args[1])?))
        }
        "lt" => {
            arity(name, args, 2)?;
            Ok(Value::Bool(less(&args[0], &args[1])?))
        }
        "le" => {
            arity(name, args, 2)?;
            Ok(Value::Bool(less_or_equal(&args[0], &args[1])?))
        }
        "gt" => {
            arity(name, args, 2)?;
            Ok(Value::Bool(!less_or_equal(&args[0], &args[1])?))
        }
        "ge" => {
            arity(name, args, 2)?;
            Ok(Value::Bool(!less(&args[0], &args[1])?))
        }
        "html" => Ok(Value::Str(html_escape(&sprint(args)))),
        "js" => Ok(Value::Str(js_escape(&sprint(args)))),
        "urlquery" => Ok(Value::Str(query_escape(&sprint(args)))),
        _ => call_prometheus(name, args, env),
    }
}

fn call_prometheus(name: &str, args: &[Value], env: &Env<'_>) -> Result<Value, FuncError> {
    match name {
        "query" => {
            arity(name, args, 1)?;
            let expr = string_arg(&args[0])?;
            let samples = env
                .client
                .query(expr, env.timestamp)
                .map_err(|e| FuncError::Call(e.to_string()))?;
            Ok(Value::List(samples.iter().map(Value::from_sample).collect()))
        }
        "first" => {
            arity(name, args, 1)?;
            samples_arg(&args[0])?
                .into_iter()
                .next()
                .ok_or_else(|| {
                    FuncError::Call("first() called on vector with no elements".to_string())
                })
        }
        "label" => {
            arity(name, args, 2)?;
            let label = string_arg(&args[0])?;
            Ok(Value::Str(sample_label(&args[1], label)))
        }
        "value" => {
            arity(name, args, 1)?;
            let value = match &args[0] {
                Value::Map(m) => m.get("Value").cloned().unwrap_or(Value::Float(0.0)),
                _ => Value::Float(0.0),
            };
            Ok(value)
        }
        "strvalue" => {
            arity(name, args, 1)?;
            Ok(Value::Str(sample_label(&args[0], "__value__")))
        }
        "args" => Ok(Value::Map(
            args.iter()
                .enumerate()
                .map(|(i, v)| (format!("arg{i}"), v.clone()))
                .collect(),
        )),
        "reReplaceAll" => {
            arity(name, args, 3)?;
            let re = compile(string_arg(&args[0])?)?;
            let replacement = string_arg(&args[1])?;
            let text = string_arg(&args[2])?;
            Ok(Value::Str(re.replace_all(text, replacement).into_owned()))
        }
        "match" => {
            arity(name, args, 2)?;
            let re = compile(string_arg(&args[0])?)?;
            Ok(Value::Bool(re.is_match(string_arg(&args[1])?)))
        }
        "title" => {
            arity(name, args, 1)?;
            Ok(Value::Str(title(string_arg(&args[0])?)))
        }
        "toUpper" => {
            arity(name, args, 1)?;
            Ok(Value::Str(string_arg(&args[0])?.to_uppercase()))
        }
        "toLower" => {
            arity(name, args, 1)?;
            Ok(Value::Str(string_arg(&args[0])?.to_lowercase()))
        }
        "safeHtml" => {
            arity(name, args, 1)?;
            Ok(Value::Str(string_arg(&args[0])?.to_string()))
        }
        "sortByLabel" => {
            arity(name, args, 2)?;
            let label = string_arg(&args[0])?;
            let mut samples = samples_arg(&args[1])?;
            samples.sort_by_cached_key(|s| sample_label(s, label));
            Ok(Value::List(samples))
        }
        "humanize" => {
            arity(name, args, 1)?;
            Ok(Value::Str(humanize::humanize(float_arg(&args[0])?)))
        }
        "humanize1024" => {
            arity(name, args, 1)?;
            Ok(Value::Str(humanize::humanize_1024(float_arg(&args[0])?)))
        }
        "humanizeDuration" => {
            arity(name, args, 1)?;
            Ok(Value::Str(humanize::humanize_duration(float_arg(&args[0])?)))
        }
        "humanizePercentage" => {
            arity(name, args, 1)?;
            Ok(Value::Str(humanize::humanize_percentage(float_arg(&args[0])?)))
        }
        "humanizeTimestamp" => {
            arity(name, args, 1)?;
            humanize::humanize_timestamp(float_arg(&args[0])?)
                .map(Value::Str)
                .map_err(FuncError::Call)
        }
        "pathPrefix" => {
            arity(name, args, 0)?;
            Ok(Value::Str(env.external_url.map(|u| u.path().to_string()).unwrap_or_default()))
        }
        "externalURL" => {
            arity(name, args, 0)?;
            Ok(Value::Str(env.external_url.map(ToString::to_string).unwrap_or_default()))
        }
        "graphLink" => {
            arity(name, args, 1)?;
            Ok(Value::Str(expression_link(string_arg(&args[0])?, 0)))
        }
        "tableLink" => {
            arity(name, args, 1)?;
            Ok(Value::Str(expression_link(string_arg(&args[0])?, 1)))
        }
        "parseDuration" => {
            arity(name, args, 1)?;
            let duration: PromDuration = string_arg(&args[0])?
                .parse()
                .map_err(|e: crate::duration::DurationError| FuncError::Call(e.to_string()))?;
            Ok(Value::Float(duration.as_secs_f64()))
        }
        "toTime" => {
            arity(name, args, 1)?;
            humanize::to_time(float_arg(&args[0])?)
                .map(Value::Str)
                .map_err(FuncError::Call)
        }
        "toDuration" => {
            arity(name, args, 1)?;
            Ok(Value::Str(humanize::go_duration(float_arg(&args[0])?)))
        }
        "stripPort" => {
            arity(name, args, 1)?;
            let host_port = string_arg(&args[0])?;
            Ok(Value::Str(
                split_host_port(host_port).map_or_else(|| host_port.to_string(), |(host, _)| host.to_string()),
            ))
        }
        "stripDomain" => {
            arity(name, args, 1)?;
            Ok(Value::Str(strip_domain(string_arg(&args[0])?)))
        }
        _ => Err(FuncError::Usage(format!("function {name:?} not defined"))),
    }
}

fn compile(pattern: &str) -> Result<Regex, FuncError> {
    Regex::new(pattern).map_err(|e| FuncError::Call(format!("regexp: Compile({pattern:?}): {e}")))
}

fn length(v: &Value) -> Result<Value, FuncError> {
    let n = match v {
        Value::Str(s) => s.len(),
        Value::List(l) => l.len(),
        Value::Map(m) => m.len(),
        Value::Nil => 0,
        other => return Err(FuncError::Call(format!("len of type {}", other.type_name()))),
    };
    Ok(Value::Int(n as i64))
}

/// Slices a string by bytes or a list by elements, with up to two bounds.
fn slice(item: &Value, indexes: &[Value]) -> Result<Value, FuncError> {
    if indexes.len() > 3 {
        return Err(FuncError::Call(format!("too many slice indexes: {}", indexes.len())));
    }
    let len = match item {
        Value::Str(_) if indexes.len() == 3 => {
            return Err(FuncError::Call("cannot 3-index slice a string".to_string()));
        }
        Value::Str(s) => s.len(),
        Value::List(l) => l.len(),
        Value::Nil => return Err(FuncError::Call("slice of untyped nil".to_string())),
        other => {
            return Err(FuncError::Call(format!(
                "can't slice item of type {}",
                other.type_name()
            )));
        }
    };

    let mut bounds = [0, len, len];
    for (bound, ix) in bounds.iter_mut().zip(indexes) {
        *bound = match ix {
            Value::Int(i) => usize::try_from(*i)
                .ok()
                .filter(|i| *i <= len)
                .ok_or_else(|| FuncError::Call(format!("index out of range: {i}")))?,
            other => {
                return Err(FuncError::Call(format!(
                    "cannot index slice/array with type {}",
                    other.type_name()
                )));
            }
        };
    }
    let [low, high, max] = bounds;
    if low > high {
        return Err(FuncError::Call(format!("invalid slice index: {low} > {high}")));
    }
    if indexes.len() == 3 && high > max {
        return Err(FuncError::Call(format!("invalid slice index: {high} > {max}")));
    }

    Ok(match item {
        Value::Str(s) => Value::Str(String::from_utf8_lossy(&s.as_bytes()[low..high]).into_owned()),
        Value::List(l) => Value::List(l[low..high].to_vec()),
        _ => Value::Nil,
    })
}

fn index(item: &Value, indexes: &[Value]) -> Result<Value, FuncError> {
    let mut current = item.clone();
    for ix in indexes {
        current = match (&current, ix) {
            (Value::Map(m), Value::Str(_) | Value::Nil) => {
                m.get(string_arg(ix)?).cloned().unwrap_or_default()
            }
            (Value::Map(_), other) => {
                return Err(FuncError::Call(format!(
                    "value has type {}; should be string",
                    other.type_name()
                )));
            }
            (Value::List(l), Value::Int(i)) => usize::try_from(*i)
                .ok()
                .and_then(|i| l.get(i))
                .cloned()
                .ok_or_else(|| FuncError::Call(format!("index out of range: {i}")))?,
            (Value::Str(s), Value::Int(i)) => usize::try_from(*i)
                .ok()
                .and_then(|i| s.as_bytes().get(i))
                .map(|b| Value::Int(i64::from(*b)))
                .ok_or_else(|| FuncError::Call(format!("index out of range: {i}")))?,
            (Value::List(_) | Value::Str(_), other) => {
                return Err(FuncError::Call(format!(
                    "cannot index slice/array with type {}",
                    other.type_name()
                )));
            }
            (Value::Nil, _) => return Err(FuncError::Call("index of untyped nil".to_string())),
            (other, _) => {
                return Err(FuncError::Call(format!(
                    "can't index item of type {}",
                    other.type_name()
                )));
            }
        };
    }
    Ok(current)
}

const BAD_COMPARISON: &str = "incompatible types for comparison";
const BAD_COMPARISON_TYPE: &str = "invalid type for comparison";

fn equal(a: &Value, b: &Value) -> Result<bool, FuncError> {
    match (a, b) {
        (Value::Nil, Value::Nil) => Ok(true),
        (Value::Bool(x), Value::Bool(y)) => Ok(x == y),
        (Value::Int(x), Value::Int(y)) => Ok(x == y),
        (Value::Float(x), Value::Float(y)) => Ok(x == y),
        (Value::Str(_) | Value::Nil, Value::Str(_) | Value::Nil) => {
            Ok(string_arg(a)? == string_arg(b)?)
        }
        (Value::List(_) | Value::Map(_), _) | (_, Value::List(_) | Value::Map(_)) => {
            Err(FuncError::Call(BAD_COMPARISON_TYPE.to_string()))
        }
        // Nil compares unequal to any other basic value.
        (Value::Nil, _) | (_, Value::Nil) => Ok(false),
        _ => Err(FuncError::Call(BAD_COMPARISON.to_string())),
    }
}

fn less(a: &Value, b: &Value) -> Result<bool, FuncError> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(x < y),
        (Value::Float(x), Value::Float(y)) => Ok(x < y),
        (Value::Str(_) | Value::Nil, Value::Str(_) | Value::Nil) => {
            Ok(string_arg(a)?.cmp(string_arg(b)?) == Ordering::Less)
        }
        (Value::Bool(_) | Value::List(_) | Value::Map(_), _)
        | (_, Value::Bool(_) | Value::List(_) | Value::Map(_)) => {
            Err(FuncError::Call(BAD_COMPARISON_TYPE.to_string()))
        }
        _ => Err(FuncError::Call(BAD_COMPARISON.to_string())),
    }
}

fn less_or_equal(a: &Value, b: &Value) -> Result<bool, FuncError> {
    Ok(less(a, b)? || equal(a, b)?)
}

fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '\'' => out.push_str("&#39;"),
            '"' => out.push_str("&#34;"),
            '\0' => out.push('\u{FFFD}'),
            c => out.push(c),
        }
    }
    out
}

fn js_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '<' | '>' | '&' | '=' => out.push_str(&format!("\\u{:04X}", c as u32)),
            c if (c as u32) < 0x20 || c.is_control() => {
                out.push_str(&format!("\\u{:04X}", c as u32));
            }
            c => out.push(c),
        }
    }
    out
}

fn query_escape(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

fn expression_link(expr: &str, tab: u8) -> String {
    format!("/graph?g0.expr={}&g0.tab={tab}", query_escape(expr))
}

/// Upper-cases the first letter of every word.
fn title(s: &str) -> String {
    let is_separator = |c: char| {
        if c.is_ascii() {
            !(c.is_ascii_alphanumeric() || c == '_')
        } else {
            c.is_whitespace()
        }
    };
    let mut out = String::with_capacity(s.len());
    let mut prev_sep = true;
    for c in s.chars() {
        if prev_sep {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        prev_sep = is_separator(c);
    }
    out
}

/// Splits `host:port`, accepting bracketed IPv6 hosts.
fn split_host_port(s: &str) -> Option<(&str, &str)> {
    if let Some(rest) = s.strip_prefix('[') {
        let (host, tail) = rest.split_once(']')?;
        let port = tail.strip_prefix(':')?;
        return (!port.contains(':')).then_some((host, port));
    }
    let (host, port) = s.rsplit_once(':')?;
    (!host.contains(':') && !host.contains('[')).then_some((host, port))
}

fn strip_domain(host_port: &str) -> String {
    let (host, port) = split_host_port(host_port).unwrap_or((host_port, ""));
    if host.parse::<IpAddr>().is_ok() {
        return host_port.to_string();
    }
    let short = host.split('.').next().unwrap_or_default();
    if port.is_empty() {
        short.to_string()
    } else if short.contains(':') {
        format!("[{short}]:{port}")
    } else {
        format!("{short}:{port}")
    }
}
