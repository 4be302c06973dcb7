use salvo::prelude::*;
use thiserror::Error;

/// Gateway error taxonomy. Every action failure is one of these; only the
/// `Writer` impl at the HTTP boundary turns them into responses.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{0}")]
    BadRequest(String),

    #[error("missing or invalid request signature")]
    Unauthorized,

    #[error("not found")]
    NotFound,

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    ServerConfiguration(String),

    #[error("{0}")]
    Db(String),

    #[error("{0}")]
    NodeJs(String),

    #[error("processor '{node}': {message}")]
    Pipeline { node: String, message: String },

    #[error("action exceeded its time budget")]
    Timeout,
}

impl GatewayError {
    /// Stable machine-readable kind, used as the `error` field of the body.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::BadRequest(_) => "BadRequest",
            GatewayError::Unauthorized => "Unauthorized",
            GatewayError::NotFound => "NotFound",
            GatewayError::Conflict(_) => "Conflict",
            GatewayError::ServerConfiguration(_) => "ServerConfiguration",
            GatewayError::Db(_) => "DbError",
            GatewayError::NodeJs(_) => "NodeJsError",
            GatewayError::Pipeline { .. } => "PipelineError",
            GatewayError::Timeout => "Timeout",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Unauthorized => StatusCode::UNAUTHORIZED,
            GatewayError::NotFound => StatusCode::NOT_FOUND,
            GatewayError::Conflict(_) => StatusCode::CONFLICT,
            GatewayError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Response body for this error. Kinds that carry context expose it as a
    /// `detail` field next to the stable `error` kind.
    pub fn body(&self) -> serde_json::Value {
        match self {
            GatewayError::Unauthorized | GatewayError::NotFound | GatewayError::Timeout => {
                serde_json::json!({ "error": self.kind() })
            }
            _ => serde_json::json!({ "error": self.kind(), "detail": self.to_string() }),
        }
    }
}

#[async_trait]
impl Writer for GatewayError {
    async fn write(mut self, _req: &mut Request, _depot: &mut Depot, res: &mut Response) {
        if self.status_code().is_server_error() {
            tracing::error!(kind = self.kind(), "{}", self);
        }
        res.status_code(self.status_code());
        res.render(Json(self.body()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            GatewayError::BadRequest("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(GatewayError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(GatewayError::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            GatewayError::Conflict("dup".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(GatewayError::Timeout.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            GatewayError::Pipeline { node: "a".into(), message: "boom".into() }.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_not_found_body_is_bare_kind() {
        assert_eq!(
            GatewayError::NotFound.body(),
            serde_json::json!({ "error": "NotFound" })
        );
    }

    #[test]
    fn test_pipeline_error_names_node() {
        let err = GatewayError::Pipeline { node: "a".into(), message: "boom".into() };
        assert_eq!(err.kind(), "PipelineError");
        assert!(err.to_string().contains("'a'"));
    }
}
