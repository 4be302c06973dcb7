use serde_json::Value;
use thiserror::Error;

use crate::core::pipeline;
use crate::core::template::DbTemplate;
use crate::models::{Action, DbQuery, DbResult, Method, Pattern, PipelineDef, Route};

/// A routes-file load failure. Loading is all-or-nothing; the first bad line
/// aborts with its location.
#[derive(Debug, Error)]
#[error("line {line}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}

fn err(line: usize, message: impl Into<String>) -> ParseError {
    ParseError { line, message: message.into() }
}

/// Parse the routes DSL into the routing table, preserving declaration order.
/// An empty or all-comment file yields an empty table.
pub fn parse_routes(text: &str) -> Result<Vec<Route>, ParseError> {
    let mut routes = Vec::new();
    for (line_no, logical) in preprocess(text)? {
        routes.push(parse_line(line_no, &logical)?);
    }
    Ok(routes)
}

/// Normalize line endings, strip `#` comment tails, and merge physical lines
/// while an inline `{ ... }` block is open. Comments are stripped before
/// brace scanning; a `#` inside a double-quoted JSON string is kept.
fn preprocess(text: &str) -> Result<Vec<(usize, String)>, ParseError> {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut logical = Vec::new();
    let mut buf = String::new();
    let mut buf_line = 0usize;
    let mut depth = 0i64;

    for (idx, raw) in normalized.split('\n').enumerate() {
        let line_no = idx + 1;
        let stripped = strip_comment(raw);
        if buf.is_empty() {
            if stripped.trim().is_empty() {
                continue;
            }
            buf_line = line_no;
            buf.push_str(&stripped);
        } else {
            buf.push('\n');
            buf.push_str(&stripped);
        }
        depth += brace_delta(&stripped);
        if depth < 0 {
            return Err(err(line_no, "unbalanced '}'"));
        }
        if depth == 0 {
            logical.push((buf_line, std::mem::take(&mut buf)));
        }
    }
    if depth != 0 {
        return Err(err(buf_line, "unterminated '{' block"));
    }
    Ok(logical)
}

fn strip_comment(line: &str) -> String {
    let mut out = String::new();
    let mut in_str = false;
    let mut escaped = false;
    for c in line.chars() {
        if in_str {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_str = false;
            }
        } else if c == '"' {
            in_str = true;
        } else if c == '#' {
            break;
        }
        out.push(c);
    }
    out
}

fn brace_delta(line: &str) -> i64 {
    let mut delta = 0i64;
    let mut in_str = false;
    let mut escaped = false;
    for c in line.chars() {
        if in_str {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_str = false;
            }
        } else {
            match c {
                '"' => in_str = true,
                '{' => delta += 1,
                '}' => delta -= 1,
                _ => {}
            }
        }
    }
    delta
}

fn next_token<'a>(s: &mut &'a str) -> Option<&'a str> {
    *s = s.trim_start();
    if s.is_empty() {
        return None;
    }
    let end = s.find(char::is_whitespace).unwrap_or(s.len());
    let (tok, rest) = s.split_at(end);
    *s = rest;
    Some(tok)
}

fn parse_line(line: usize, text: &str) -> Result<Route, ParseError> {
    let mut rest = text;
    let method_tok = next_token(&mut rest).ok_or_else(|| err(line, "missing method"))?;
    let method = Method::parse(method_tok)
        .ok_or_else(|| err(line, format!("unknown method '{}'", method_tok)))?;
    let uri = next_token(&mut rest).ok_or_else(|| err(line, "missing URI pattern"))?;
    let pattern = Pattern::parse(uri).map_err(|m| err(line, m))?;
    let action = parse_action(line, rest.trim_start())?;
    Ok(Route { method, pattern, action })
}

fn parse_action(line: usize, text: &str) -> Result<Action, ParseError> {
    if text.is_empty() {
        return Err(err(line, "missing action"));
    }
    if let Some(name) = text.strip_prefix("||") {
        let name = name.trim();
        if name.is_empty() {
            return Err(err(line, "missing pipeline name after '||'"));
        }
        return Ok(Action::Pipeline(name.to_string()));
    }
    if let Some(json) = text.strip_prefix("|>") {
        let def: PipelineDef = serde_json::from_str(json.trim())
            .map_err(|e| err(line, format!("bad inline pipeline: {}", e)))?;
        pipeline::validate(&def).map_err(|m| err(line, m))?;
        return Ok(Action::InlinePipeline(def));
    }
    if let Some(json) = text.strip_prefix("{..}") {
        let value: Value = serde_json::from_str(json.trim())
            .map_err(|e| err(line, format!("bad static response: {}", e)))?;
        if !value.is_object() {
            return Err(err(line, "static response must be a JSON object"));
        }
        return Ok(Action::Static(value));
    }
    if let Some(path) = text.strip_prefix("<js>") {
        let path = path.trim();
        if path.is_empty() {
            return Err(err(line, "missing script path after '<js>'"));
        }
        return Ok(Action::NodeJs(path.to_string()));
    }

    let symbol = text
        .get(..2)
        .filter(|s| matches!(*s, "--" | "~>" | "->" | ">>" | "<>" | "><"))
        .ok_or_else(|| err(line, format!("unrecognised action '{}'", text)))?;
    let mut rest = &text[2..];
    let hints = parse_hints(line, &mut rest)?;
    let sql = rest.trim();
    if sql.is_empty() {
        return Err(err(line, "missing SQL statement"));
    }
    let template =
        DbTemplate::parse(sql).map_err(|e| err(line, e.to_string()))?;
    let result = resolve_result(line, symbol, hints, &template)?;
    Ok(Action::Sql(DbQuery { result, template }))
}

fn parse_hints(line: usize, rest: &mut &str) -> Result<Option<Vec<String>>, ParseError> {
    let t = rest.trim_start();
    if !t.starts_with('(') {
        *rest = t;
        return Ok(None);
    }
    let close = t.find(')').ok_or_else(|| err(line, "unterminated hint list"))?;
    let hints: Vec<String> = t[1..close].split(',').map(|s| s.trim().to_string()).collect();
    for hint in &hints {
        if hint.is_empty() || !hint.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(err(line, format!("invalid hint identifier '{}'", hint)));
        }
    }
    *rest = &t[close + 1..];
    Ok(Some(hints))
}

fn resolve_result(
    line: usize,
    symbol: &str,
    hints: Option<Vec<String>>,
    template: &DbTemplate,
) -> Result<DbResult, ParseError> {
    match symbol {
        "--" => Ok(DbResult::None),
        "><" => Ok(DbResult::Count),
        "~>" | "->" | ">>" => {
            let columns = match hints {
                Some(cols) => cols,
                None => template.probe().columns.ok_or_else(|| {
                    err(line, "cannot infer result columns; add (col, ...) hints")
                })?,
            };
            Ok(match symbol {
                "~>" => DbResult::Item(columns),
                "->" => DbResult::ItemOk(columns),
                _ => DbResult::Collection(columns),
            })
        }
        "<>" => {
            let (table, sequence) = match hints {
                Some(h) => match h.as_slice() {
                    [table] => (table.clone(), "id".to_string()),
                    [table, seq] => (table.clone(), seq.clone()),
                    _ => {
                        return Err(err(line, "expected (table) or (table, sequence) hints"))
                    }
                },
                None => {
                    let table = template.probe().table.ok_or_else(|| {
                        err(line, "cannot infer target table; add (table, sequence) hints")
                    })?;
                    (table, "id".to_string())
                }
            };
            Ok(DbResult::LastInsert { table, sequence })
        }
        _ => Err(err(line, format!("unrecognised action symbol '{}'", symbol))),
    }
}
