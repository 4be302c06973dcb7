use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("template is empty")]
    Empty,

    #[error("no binding for '{{{{{0}}}}}'")]
    Missing(String),
}

/// One piece of a parsed template: literal SQL or a named hole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Lit(String),
    Hole(String),
}

/// A SQL fragment with `{{name}}` holes. Hole names match `[A-Za-z0-9_:]+`;
/// a `:` prefix marks a URI path variable, plain names bind body fields.
/// Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbTemplate {
    fragments: Vec<Fragment>,
}

/// Best-effort reflection over a template's literal SQL, used at parse time
/// to default `columns`/`table` when the route author gives no hints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlShape {
    pub table: Option<String>,
    pub columns: Option<Vec<String>>,
}

impl DbTemplate {
    /// Lex the text into literal and hole fragments. Whitespace inside the
    /// braces is stripped; an unmatched `{{` or a brace pair around anything
    /// that is not a hole name stays literal text.
    pub fn parse(text: &str) -> Result<Self, TemplateError> {
        if text.trim().is_empty() {
            return Err(TemplateError::Empty);
        }
        let mut fragments = Vec::new();
        let mut lit = String::new();
        let mut rest = text;
        while let Some(start) = rest.find("{{") {
            let after = &rest[start + 2..];
            match after.find("}}") {
                Some(end) => {
                    let inner = after[..end].trim();
                    if !inner.is_empty() && is_hole_name(inner) {
                        lit.push_str(&rest[..start]);
                        if !lit.is_empty() {
                            fragments.push(Fragment::Lit(std::mem::take(&mut lit)));
                        }
                        fragments.push(Fragment::Hole(inner.to_string()));
                        rest = &after[end + 2..];
                    } else {
                        lit.push_str(&rest[..start + 2]);
                        rest = after;
                    }
                }
                None => {
                    lit.push_str(&rest[..start + 2]);
                    rest = after;
                }
            }
        }
        lit.push_str(rest);
        if !lit.is_empty() {
            fragments.push(Fragment::Lit(lit));
        }
        Ok(DbTemplate { fragments })
    }

    /// Names of all holes, in source order.
    pub fn holes(&self) -> impl Iterator<Item = &str> {
        self.fragments.iter().filter_map(|f| match f {
            Fragment::Hole(name) => Some(name.as_str()),
            Fragment::Lit(_) => None,
        })
    }

    /// Substitute every hole from the bag. The first unbound hole in source
    /// order aborts with `Missing`. A `:`-prefixed hole binds the path
    /// variable of the same name (the bag stores both without the prefix).
    ///
    /// String values are single-quoted with `'` doubled. When the template
    /// itself already wraps the hole in quotes (`'{{url}}'`) only the
    /// doubling is applied, so author-quoted templates stay valid SQL.
    pub fn render(&self, bag: &Map<String, Value>) -> Result<String, TemplateError> {
        let mut sql = String::new();
        for (i, frag) in self.fragments.iter().enumerate() {
            match frag {
                Fragment::Lit(text) => sql.push_str(text),
                Fragment::Hole(name) => {
                    let key = name.strip_prefix(':').unwrap_or(name);
                    let value = bag
                        .get(key)
                        .ok_or_else(|| TemplateError::Missing(name.clone()))?;
                    sql.push_str(&render_value(value, self.hole_is_prequoted(i)));
                }
            }
        }
        Ok(sql)
    }

    /// True when the fragments around hole `i` already supply single quotes.
    fn hole_is_prequoted(&self, i: usize) -> bool {
        let before = match i.checked_sub(1).and_then(|j| self.fragments.get(j)) {
            Some(Fragment::Lit(s)) => s.ends_with('\''),
            _ => false,
        };
        let after = match self.fragments.get(i + 1) {
            Some(Fragment::Lit(s)) => s.starts_with('\''),
            _ => false,
        };
        before && after
    }

    /// Recognise `INSERT INTO t`, `UPDATE t`, `DELETE FROM t` and
    /// `SELECT cols FROM t` in the literal text (holes masked out). Columns
    /// are split on commas outside parentheses; anything that does not reduce
    /// to a plain name (or a trailing `AS` alias) makes the column list
    /// unavailable, forcing explicit hints in the routes file.
    pub fn probe(&self) -> SqlShape {
        let flat: String = self
            .fragments
            .iter()
            .map(|f| match f {
                Fragment::Lit(s) => s.as_str(),
                Fragment::Hole(_) => "?",
            })
            .collect();

        if let Some(caps) = insert_re().captures(&flat) {
            return SqlShape { table: caps.get(1).map(|m| m.as_str().to_string()), columns: None };
        }
        if let Some(caps) = update_re().captures(&flat) {
            return SqlShape { table: caps.get(1).map(|m| m.as_str().to_string()), columns: None };
        }
        if let Some(caps) = delete_re().captures(&flat) {
            return SqlShape { table: caps.get(1).map(|m| m.as_str().to_string()), columns: None };
        }
        if let Some(caps) = select_re().captures(&flat) {
            let columns = caps.get(1).and_then(|m| split_columns(m.as_str()));
            return SqlShape { table: caps.get(2).map(|m| m.as_str().to_string()), columns };
        }
        SqlShape::default()
    }
}

fn is_hole_name(s: &str) -> bool {
    s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

/// Convert a bound JSON value to SQL text. The quoting here is the only line
/// of defence against injection, so strings are never emitted raw.
fn render_value(value: &Value, prequoted: bool) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) if prequoted => s.replace('\'', "''"),
        Value::String(s) => quote(s),
        other if prequoted => other.to_string().replace('\'', "''"),
        other => quote(&other.to_string()),
    }
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

// The probe regexes are compile-time constants; failing to build them is a
// programming error, not a runtime condition.
#[allow(clippy::unwrap_used)]
fn insert_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)^\s*insert\s+into\s+([A-Za-z0-9_".]+)"#).unwrap())
}

#[allow(clippy::unwrap_used)]
fn update_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)^\s*update\s+([A-Za-z0-9_".]+)"#).unwrap())
}

#[allow(clippy::unwrap_used)]
fn delete_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)^\s*delete\s+from\s+([A-Za-z0-9_".]+)"#).unwrap())
}

#[allow(clippy::unwrap_used)]
fn select_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?is)^\s*select\s+(.+?)\s+from\s+([A-Za-z0-9_".]+)"#).unwrap()
    })
}

fn split_columns(cols: &str) -> Option<Vec<String>> {
    let mut tokens = Vec::new();
    let mut depth = 0usize;
    let mut cur = String::new();
    for c in cols.chars() {
        match c {
            '(' => {
                depth += 1;
                cur.push(c);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                cur.push(c);
            }
            ',' if depth == 0 => {
                tokens.push(std::mem::take(&mut cur));
            }
            _ => cur.push(c),
        }
    }
    tokens.push(cur);
    tokens.iter().map(|t| column_name(t.trim())).collect()
}

fn column_name(token: &str) -> Option<String> {
    if token == "*" {
        return Some("*".to_string());
    }
    let lower = token.to_lowercase();
    if let Some(pos) = lower.rfind(" as ") {
        return plain_ident(token[pos + 4..].trim());
    }
    let bare = token.rsplit('.').next().unwrap_or(token).trim();
    plain_ident(bare)
}

fn plain_ident(s: &str) -> Option<String> {
    if !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Some(s.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bag(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_parse_holes_and_whitespace() {
        let t = DbTemplate::parse("select * from photo where id = {{ :id }}").unwrap();
        assert_eq!(t.holes().collect::<Vec<_>>(), vec![":id"]);
    }

    #[test]
    fn test_unmatched_brace_is_literal() {
        let t = DbTemplate::parse("select '{{' from x").unwrap();
        assert_eq!(t.holes().count(), 0);
        let sql = t.render(&Map::new()).unwrap();
        assert_eq!(sql, "select '{{' from x");
    }

    #[test]
    fn test_invalid_hole_name_is_literal() {
        let t = DbTemplate::parse("select {{a b}} from x").unwrap();
        assert_eq!(t.holes().count(), 0);
    }

    #[test]
    fn test_empty_template_rejected() {
        assert_eq!(DbTemplate::parse("   "), Err(TemplateError::Empty));
    }

    #[test]
    fn test_render_quotes_strings() {
        let t = DbTemplate::parse("select * from photo where url = {{url}}").unwrap();
        let sql = t.render(&bag(&[("url", json!("O'Reilly"))])).unwrap();
        assert_eq!(sql, "select * from photo where url = 'O''Reilly'");
    }

    #[test]
    fn test_render_prequoted_hole_escapes_only() {
        let t = DbTemplate::parse("insert into photo(url) values ('{{url}}')").unwrap();
        let sql = t.render(&bag(&[("url", json!("O'Reilly"))])).unwrap();
        assert_eq!(sql, "insert into photo(url) values ('O''Reilly')");
        assert!(sql.contains("'O''Reilly'"));
    }

    #[test]
    fn test_render_scalars_verbatim() {
        let t = DbTemplate::parse("update t set a = {{a}}, b = {{b}}, c = {{c}}").unwrap();
        let sql = t
            .render(&bag(&[("a", json!(42)), ("b", json!(true)), ("c", Value::Null)]))
            .unwrap();
        assert_eq!(sql, "update t set a = 42, b = true, c = NULL");
    }

    #[test]
    fn test_render_path_variable_hole() {
        let t = DbTemplate::parse("select * from photo where id = {{:id}}").unwrap();
        let sql = t.render(&bag(&[("id", json!("42"))])).unwrap();
        assert_eq!(sql, "select * from photo where id = '42'");
    }

    #[test]
    fn test_missing_reports_first_unbound_hole() {
        let t = DbTemplate::parse("select {{a}}, {{b}} from t").unwrap();
        let err = t.render(&bag(&[("b", json!(1))])).unwrap_err();
        assert_eq!(err, TemplateError::Missing("a".to_string()));
    }

    #[test]
    fn test_probe_select_columns() {
        let t = DbTemplate::parse("select id, url from photo where id = {{:id}}").unwrap();
        let shape = t.probe();
        assert_eq!(shape.table.as_deref(), Some("photo"));
        assert_eq!(shape.columns, Some(vec!["id".to_string(), "url".to_string()]));
    }

    #[test]
    fn test_probe_select_star() {
        let shape = DbTemplate::parse("SELECT * FROM photo").unwrap().probe();
        assert_eq!(shape.columns, Some(vec!["*".to_string()]));
    }

    #[test]
    fn test_probe_alias_and_qualifier() {
        let t = DbTemplate::parse("select p.id, count(*) as total from photo p group by p.id")
            .unwrap();
        let shape = t.probe();
        assert_eq!(shape.columns, Some(vec!["id".to_string(), "total".to_string()]));
    }

    #[test]
    fn test_probe_expression_without_alias_yields_no_columns() {
        let t = DbTemplate::parse("select coalesce(a, b) from t").unwrap();
        assert_eq!(t.probe().columns, None);
    }

    #[test]
    fn test_probe_commas_inside_parens() {
        let t = DbTemplate::parse("select least(a, b) as low, c from t").unwrap();
        assert_eq!(t.probe().columns, Some(vec!["low".to_string(), "c".to_string()]));
    }

    #[test]
    fn test_probe_insert_update_delete_tables() {
        assert_eq!(
            DbTemplate::parse("insert into photo(url) values ({{url}})").unwrap().probe().table.as_deref(),
            Some("photo")
        );
        assert_eq!(
            DbTemplate::parse("UPDATE photo SET url = {{url}}").unwrap().probe().table.as_deref(),
            Some("photo")
        );
        assert_eq!(
            DbTemplate::parse("delete from photo where id = {{:id}}").unwrap().probe().table.as_deref(),
            Some("photo")
        );
    }
}
