use std::process::Stdio;

use salvo::http::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::GatewayError;
use crate::models::RouteResponse;

/// The JSON envelope a script must print on stdout.
#[derive(Debug, Deserialize)]
struct Envelope {
    status: u16,
    #[serde(default)]
    headers: Vec<(String, String)>,
    body: Value,
}

/// Run `<node-binary> <script>` with the request JSON on stdin and decode
/// the `{status, headers, body}` envelope from stdout. stderr is logged.
/// The child is spawned with `kill_on_drop` so an abandoned request
/// terminates it.
pub async fn run_script(
    node_binary: &str,
    script: &str,
    input: &Value,
) -> Result<RouteResponse, GatewayError> {
    let mut child = Command::new(node_binary)
        .arg(script)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| GatewayError::NodeJs(format!("failed to spawn '{}': {}", node_binary, e)))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(input.to_string().as_bytes())
            .await
            .map_err(|e| GatewayError::NodeJs(format!("failed to write request body: {}", e)))?;
    }

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| GatewayError::NodeJs(e.to_string()))?;

    if !output.stderr.is_empty() {
        tracing::warn!(script, "nodejs stderr: {}", String::from_utf8_lossy(&output.stderr));
    }
    if !output.status.success() {
        return Err(GatewayError::NodeJs(format!("'{}' exited with {}", script, output.status)));
    }

    let envelope: Envelope = serde_json::from_slice(&output.stdout)
        .map_err(|e| GatewayError::NodeJs(format!("bad response envelope: {}", e)))?;
    let status = StatusCode::from_u16(envelope.status)
        .map_err(|_| GatewayError::NodeJs(format!("bad status {} in envelope", envelope.status)))?;

    Ok(RouteResponse { status, headers: envelope.headers, body: envelope.body })
}
