use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

/// Name of the implicit processor exposing the request bag.
pub const PIPE_IN: &str = "_in";
/// Name of the implicit aggregator whose input becomes the response body.
pub const PIPE_OUT: &str = "_out";

/// A directed graph of processors with named-field connections.
///
/// Definitions come either from a `*.json` file in the mesh directory or from
/// an inline `|>` literal in the routes file; both use the same shape:
///
/// ```json
/// {
///   "processors": {
///     "a": {"type": "sql", "query": "select id from photo where id = {{id}}"},
///     "b": {"type": "static", "value": {"tag": "x"}}
///   },
///   "connections": [{"from": "a.id", "to": "b.ref"}, {"from": "b.ref", "to": "_out.ref"}]
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineDef {
    #[serde(default)]
    pub processors: HashMap<String, Processor>,
    #[serde(default)]
    pub connections: Vec<Connection>,
}

/// One node of a pipeline.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Processor {
    Sql {
        query: String,
        #[serde(default)]
        result: SqlResultMode,
    },
    Static {
        #[serde(default)]
        value: Value,
    },
    Pipeline {
        name: String,
    },
    Nodejs {
        script: String,
    },
}

/// Result shaping for a SQL processor, mirroring the route-level modes that
/// make sense inside a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqlResultMode {
    None,
    #[default]
    Item,
    ItemOk,
    Collection,
    Count,
}

impl SqlResultMode {
    /// The route-level shaping mode this corresponds to. Processors have no
    /// column hints, so row-shaped modes take every column of the result.
    pub fn to_db_result(self) -> crate::models::route::DbResult {
        use crate::models::route::DbResult;
        let all = vec!["*".to_string()];
        match self {
            SqlResultMode::None => DbResult::None,
            SqlResultMode::Item => DbResult::Item(all),
            SqlResultMode::ItemOk => DbResult::ItemOk(all),
            SqlResultMode::Collection => DbResult::Collection(all),
            SqlResultMode::Count => DbResult::Count,
        }
    }
}

/// An edge: copy `from.processor`'s output field into `to.processor`'s input.
#[derive(Debug, Clone, Deserialize)]
pub struct Connection {
    pub from: Endpoint,
    pub to: Endpoint,
}

/// `"name.field"` reference into a processor's input or output object.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct Endpoint {
    pub processor: String,
    pub field: String,
}

impl TryFrom<String> for Endpoint {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        let (processor, field) = s
            .split_once('.')
            .ok_or_else(|| format!("endpoint '{}' is not of the form 'processor.field'", s))?;
        if processor.is_empty() || field.is_empty() {
            return Err(format!("endpoint '{}' has an empty processor or field", s));
        }
        // "_" is shorthand for the aggregator.
        let processor = if processor == "_" { PIPE_OUT } else { processor };
        Ok(Endpoint {
            processor: processor.to_string(),
            field: field.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_pipeline_def() {
        let def: PipelineDef = serde_json::from_str(
            r#"{
                "processors": {
                    "a": {"type": "sql", "query": "select * from t", "result": "collection"},
                    "b": {"type": "static", "value": {"x": 1}},
                    "c": {"type": "nodejs", "script": "scripts/c.js"},
                    "d": {"type": "pipeline", "name": "other"}
                },
                "connections": [{"from": "a.id", "to": "b.ref"}]
            }"#,
        )
        .unwrap();

        assert_eq!(def.processors.len(), 4);
        assert!(matches!(
            def.processors["a"],
            Processor::Sql { result: SqlResultMode::Collection, .. }
        ));
        assert_eq!(def.connections[0].from.processor, "a");
        assert_eq!(def.connections[0].to.field, "ref");
    }

    #[test]
    fn test_sql_result_mode_defaults_to_item() {
        let def: PipelineDef = serde_json::from_str(
            r#"{"processors": {"a": {"type": "sql", "query": "select 1"}}}"#,
        )
        .unwrap();
        assert!(matches!(
            def.processors["a"],
            Processor::Sql { result: SqlResultMode::Item, .. }
        ));
    }

    #[test]
    fn test_underscore_aliases_aggregator() {
        let ep = Endpoint::try_from("_.result".to_string()).unwrap();
        assert_eq!(ep.processor, PIPE_OUT);
        assert_eq!(ep.field, "result");
    }

    #[test]
    fn test_bad_endpoint_rejected() {
        assert!(Endpoint::try_from("nodot".to_string()).is_err());
        assert!(Endpoint::try_from(".field".to_string()).is_err());
        assert!(Endpoint::try_from("proc.".to_string()).is_err());
    }
}
