use salvo::http::StatusCode;
use serde_json::Value;

use crate::core::template::DbTemplate;
use crate::models::pipeline::PipelineDef;

/// HTTP methods a route can bind to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Options,
}

impl Method {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "GET" => Some(Method::Get),
            "POST" => Some(Method::Post),
            "PUT" => Some(Method::Put),
            "PATCH" => Some(Method::Patch),
            "DELETE" => Some(Method::Delete),
            "OPTIONS" => Some(Method::Options),
            _ => None,
        }
    }

    pub fn from_http(m: &salvo::http::Method) -> Option<Self> {
        Method::parse(m.as_str())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Options => "OPTIONS",
        }
    }
}

/// One segment of a URI pattern: literal text or a named variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Atom(String),
    Var(String),
}

/// A slash-separated URI template. The leading `/` is optional and ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    pub segments: Vec<Segment>,
}

fn valid_segment_text(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '!' | '~'))
}

impl Pattern {
    /// Parse a URI template. Segments starting with `:` are variables.
    pub fn parse(uri: &str) -> Result<Self, String> {
        let mut segments = Vec::new();
        for part in uri.split('/').filter(|p| !p.is_empty()) {
            if let Some(name) = part.strip_prefix(':') {
                if !valid_segment_text(name) {
                    return Err(format!("invalid variable segment ':{}'", name));
                }
                segments.push(Segment::Var(name.to_string()));
            } else {
                if !valid_segment_text(part) {
                    return Err(format!("invalid segment '{}'", part));
                }
                segments.push(Segment::Atom(part.to_string()));
            }
        }
        Ok(Pattern { segments })
    }
}

/// Result-shaping mode for a SQL action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbResult {
    /// Execute, discard rows, answer `{"status":"ok"}`.
    None,
    /// Exactly one row as a JSON object; zero rows is a 404.
    Item(Vec<String>),
    /// Like `Item`, with a `"status":"ok"` marker added.
    ItemOk(Vec<String>),
    /// All rows as a JSON array.
    Collection(Vec<String>),
    /// The id generated by an insert, answered as `{table: id}` with 201.
    LastInsert { table: String, sequence: String },
    /// Affected-row count as `{"rowsAffected": n}`.
    Count,
}

/// A SQL template plus its result-shaping mode.
#[derive(Debug, Clone)]
pub struct DbQuery {
    pub result: DbResult,
    pub template: DbTemplate,
}

/// The action a matched route executes.
#[derive(Debug, Clone)]
pub enum Action {
    Sql(DbQuery),
    Pipeline(String),
    InlinePipeline(PipelineDef),
    NodeJs(String),
    Static(Value),
}

/// One entry of the routing table, in declaration order.
#[derive(Debug, Clone)]
pub struct Route {
    pub method: Method,
    pub pattern: Pattern,
    pub action: Action,
}

/// What an action hands back to the dispatcher.
#[derive(Debug, Clone)]
pub struct RouteResponse {
    pub status: StatusCode,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

impl RouteResponse {
    pub fn ok(body: Value) -> Self {
        RouteResponse {
            status: StatusCode::OK,
            headers: Vec::new(),
            body,
        }
    }

    pub fn with_status(status: StatusCode, body: Value) -> Self {
        RouteResponse {
            status,
            headers: Vec::new(),
            body,
        }
    }
}
