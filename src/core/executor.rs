use salvo::http::StatusCode;
use serde_json::{json, Map, Value};
use sqlx::PgConnection;

use crate::core::rows;
use crate::core::{nodejs, pipeline};
use crate::error::GatewayError;
use crate::models::{Action, DbQuery, DbResult, RouteResponse};
use crate::state::RequestContext;

/// Run one resolved action against the request bag.
pub async fn execute_action(
    action: &Action,
    bag: &Map<String, Value>,
    ctx: &RequestContext<'_>,
) -> Result<RouteResponse, GatewayError> {
    match action {
        Action::Sql(query) => {
            // Render before touching the pool: an unbindable hole is the
            // client's fault and must not depend on database health.
            let sql = render_query(query, bag)?;
            let mut conn = ctx
                .pool
                .acquire()
                .await
                .map_err(|e| GatewayError::Db(e.to_string()))?;
            run_sql(&mut *conn, &query.result, &sql).await
        }
        Action::Pipeline(name) => {
            let def = ctx.mesh.get(name).ok_or_else(|| {
                GatewayError::ServerConfiguration(format!("unknown pipeline '{}'", name))
            })?;
            pipeline::execute(def, bag.clone(), ctx).await
        }
        Action::InlinePipeline(def) => pipeline::execute(def, bag.clone(), ctx).await,
        Action::NodeJs(script) => {
            nodejs::run_script(&ctx.config.node_binary, script, &Value::Object(bag.clone())).await
        }
        Action::Static(value) => Ok(static_response(value.clone())),
    }
}

/// Shape a static route body. The reserved `"<Allow>"` key moves to an
/// `Allow` response header.
pub fn static_response(mut value: Value) -> RouteResponse {
    let mut headers = Vec::new();
    if let Some(obj) = value.as_object_mut() {
        if let Some(allow) = obj.remove("<Allow>") {
            if let Some(text) = allow.as_str() {
                headers.push(("Allow".to_string(), text.to_string()));
            }
        }
    }
    RouteResponse { status: StatusCode::OK, headers, body: value }
}

/// Render the template against the bag; a failed binding is a 400.
pub fn render_query(query: &DbQuery, bag: &Map<String, Value>) -> Result<String, GatewayError> {
    let sql = query
        .template
        .render(bag)
        .map_err(|e| GatewayError::BadRequest(e.to_string()))?;
    tracing::debug!(%sql, "rendered statement");
    Ok(sql)
}

/// Execute rendered SQL and shape the rows per the `DbResult` mode.
pub async fn run_sql(
    conn: &mut PgConnection,
    mode: &DbResult,
    sql: &str,
) -> Result<RouteResponse, GatewayError> {
    match mode {
        DbResult::None => {
            sqlx::query(sql).execute(&mut *conn).await.map_err(map_db_err)?;
            Ok(RouteResponse::ok(json!({"status": "ok"})))
        }
        DbResult::Count => {
            let done = sqlx::query(sql).execute(&mut *conn).await.map_err(map_db_err)?;
            Ok(RouteResponse::ok(json!({"rowsAffected": done.rows_affected()})))
        }
        DbResult::Item(columns) => {
            let obj = fetch_single(conn, sql, columns).await?;
            Ok(RouteResponse::ok(Value::Object(obj)))
        }
        DbResult::ItemOk(columns) => {
            let mut obj = fetch_single(conn, sql, columns).await?;
            obj.insert("status".to_string(), json!("ok"));
            Ok(RouteResponse::ok(Value::Object(obj)))
        }
        DbResult::Collection(columns) => {
            let rows = sqlx::query(sql).fetch_all(&mut *conn).await.map_err(map_db_err)?;
            let items: Vec<Value> = rows
                .iter()
                .map(|row| Value::Object(rows::row_to_object(row, columns)))
                .collect();
            Ok(RouteResponse::ok(Value::Array(items)))
        }
        DbResult::LastInsert { table, sequence } => {
            sqlx::query(sql).execute(&mut *conn).await.map_err(map_db_err)?;
            let id: i64 = sqlx::query_scalar("SELECT currval(pg_get_serial_sequence($1, $2))")
                .bind(table)
                .bind(sequence)
                .fetch_one(&mut *conn)
                .await
                .map_err(map_db_err)?;
            let mut body = Map::new();
            body.insert(table.clone(), json!(id));
            Ok(RouteResponse::with_status(StatusCode::CREATED, Value::Object(body)))
        }
    }
}

async fn fetch_single(
    conn: &mut PgConnection,
    sql: &str,
    columns: &[String],
) -> Result<Map<String, Value>, GatewayError> {
    let fetched = sqlx::query(sql).fetch_all(&mut *conn).await.map_err(map_db_err)?;
    match fetched.as_slice() {
        [] => Err(GatewayError::NotFound),
        [row] => Ok(rows::row_to_object(row, columns)),
        many => Err(GatewayError::Db(format!("item query returned {} rows", many.len()))),
    }
}

/// Constraint violations (SQLSTATE class 23) surface as 409; everything else
/// from the driver is a plain database error.
pub fn map_db_err(e: sqlx::Error) -> GatewayError {
    if let sqlx::Error::Database(db) = &e {
        if db.code().map(|c| c.starts_with("23")).unwrap_or(false) {
            return GatewayError::Conflict(db.message().to_string());
        }
    }
    GatewayError::Db(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_response_moves_allow_header() {
        let resp = static_response(json!({"<Allow>": "GET,POST", "GET": {}}));
        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(resp.headers, vec![("Allow".to_string(), "GET,POST".to_string())]);
        assert_eq!(resp.body, json!({"GET": {}}));
    }

    #[test]
    fn test_static_response_without_allow() {
        let resp = static_response(json!({"ok": true}));
        assert!(resp.headers.is_empty());
        assert_eq!(resp.body, json!({"ok": true}));
    }
}
