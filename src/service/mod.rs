//! NDJSON service for the bridge.
//!
//! This module exposes a small dispatcher that translates newline-delimited
//! JSON commands into calls on the [`Bridge`] facade. It backs the
//! `counter-bridge` binary. Requests on one connection are processed
//! sequentially; concurrency lives inside `execute_action_sequences`.

use crate::PROTOCOL_VERSION;
use crate::runtime::error::{BridgeError, OrchestrationError};
use crate::runtime::protocol::{ActionRequest, LifecycleRequest, SequencesRequest};
use crate::runtime::{Bridge, Model};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Service entry point: wraps a shared [`Bridge`] and serves connections.
pub struct Service<M: Model> {
    bridge: Arc<Bridge<M>>,
}

impl<M: Model> Clone for Service<M> {
    fn clone(&self) -> Self {
        Self {
            bridge: self.bridge.clone(),
        }
    }
}

impl<M: Model + 'static> Service<M> {
    /// Create a new service around the provided bridge.
    pub fn new(bridge: Arc<Bridge<M>>) -> Self {
        Self { bridge }
    }

    /// The wrapped bridge.
    pub fn bridge(&self) -> &Arc<Bridge<M>> {
        &self.bridge
    }

    /// Process a single connection by consuming requests from the reader and writing responses.
    pub async fn handle<R, W>(&self, reader: R, writer: W) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut session = Session {
            bridge: &self.bridge,
            writer,
        };
        session.run(reader).await
    }
}

struct Session<'a, M: Model, W> {
    bridge: &'a Bridge<M>,
    writer: W,
}

impl<'a, M: Model + 'static, W: AsyncWrite + Unpin> Session<'a, M, W> {
    async fn run<R: AsyncBufRead + Unpin>(&mut self, reader: R) -> io::Result<()> {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            let envelope: Result<RequestEnvelope, _> = serde_json::from_str(&line);
            let response = match envelope {
                Ok(request) => self.handle_request(request).await,
                Err(err) => {
                    ResponseEnvelope::from_error(Value::Null, ServiceError::Parse(err.to_string()))
                }
            };
            self.write_response(response).await?;
        }

        Ok(())
    }

    async fn write_response(&mut self, envelope: ResponseEnvelope) -> io::Result<()> {
        let mut line = serde_json::to_vec(&envelope)?;
        line.push(b'\n');
        self.writer.write_all(&line).await?;
        self.writer.flush().await
    }

    async fn handle_request(&mut self, request: RequestEnvelope) -> ResponseEnvelope {
        tracing::debug!(command = %request.command, "service request");
        match self.dispatch(&request.command, request.params).await {
            Ok(value) => ResponseEnvelope::success(request.id, value),
            Err(err) => {
                tracing::debug!(command = %request.command, error = ?err, "service request failed");
                ResponseEnvelope::from_error(request.id, err)
            }
        }
    }

    async fn dispatch(&mut self, command: &str, params: Value) -> Result<Value, ServiceError> {
        match command {
            "handshake" => self.cmd_handshake(&params),
            "init" => {
                let request: LifecycleRequest = parse_params_or_default(params)?;
                to_json(self.bridge.init(request).await?)
            }
            "cleanup" => {
                let request: LifecycleRequest = parse_params_or_default(params)?;
                to_json(self.bridge.cleanup(request).await?)
            }
            "execute_action" => {
                let request: ActionRequest = parse_params(params)?;
                to_json(self.bridge.execute_action(request).await?)
            }
            "execute_action_sequences" => {
                let request: SequencesRequest = parse_params(params)?;
                to_json(self.bridge.execute_action_sequences(request).await?)
            }
            other => Err(ServiceError::Unsupported(other.to_string())),
        }
    }

    fn cmd_handshake(&mut self, params: &Value) -> Result<Value, ServiceError> {
        let client = params
            .get("client")
            .and_then(Value::as_str)
            .ok_or_else(|| ServiceError::invalid_param("client"))?;

        let requested = params
            .get("protocol_version")
            .and_then(Value::as_str)
            .ok_or_else(|| ServiceError::invalid_param("protocol_version"))?;

        if requested != PROTOCOL_VERSION {
            return Err(ServiceError::Protocol(format!(
                "unsupported protocol version: expected {}, got {}",
                PROTOCOL_VERSION, requested
            )));
        }

        let config = self.bridge.config();
        Ok(json!({
            "protocol_version": PROTOCOL_VERSION,
            "bridge": {
                "version": crate::VERSION,
                "client": client,
                "pacing_ns": config.pacing_ns,
                "interference": config.interference,
                "capture_state": config.capture_state,
            }
        }))
    }
}

fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T, ServiceError> {
    serde_json::from_value(params).map_err(|err| ServiceError::InvalidParams(err.to_string()))
}

fn parse_params_or_default<T: DeserializeOwned + Default>(
    params: Value,
) -> Result<T, ServiceError> {
    if params.is_null() {
        Ok(T::default())
    } else {
        parse_params(params)
    }
}

fn to_json<T: Serialize>(value: T) -> Result<Value, ServiceError> {
    serde_json::to_value(value)
        .map_err(|err| ServiceError::Bridge(BridgeError::Internal(err.to_string())))
}

#[derive(Debug)]
enum ServiceError {
    Parse(String),
    InvalidParams(String),
    Unsupported(String),
    Protocol(String),
    Bridge(BridgeError),
}

impl ServiceError {
    fn invalid_param(name: &str) -> Self {
        ServiceError::InvalidParams(format!("missing or invalid parameter: {}", name))
    }
}

impl From<BridgeError> for ServiceError {
    fn from(err: BridgeError) -> Self {
        ServiceError::Bridge(err)
    }
}

#[derive(Deserialize)]
struct RequestEnvelope {
    id: Value,
    command: String,
    #[serde(default)]
    params: Value,
}

#[derive(Serialize)]
struct ResponseEnvelope {
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorEnvelope>,
}

impl ResponseEnvelope {
    fn success(id: Value, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    fn from_error(id: Value, error: ServiceError) -> Self {
        Self {
            id,
            result: None,
            error: Some(ErrorEnvelope::from(error)),
        }
    }
}

#[derive(Serialize)]
struct ErrorEnvelope {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl From<ServiceError> for ErrorEnvelope {
    fn from(error: ServiceError) -> Self {
        match error {
            ServiceError::Parse(message) => ErrorEnvelope {
                code: "parse_error".into(),
                message,
                details: None,
            },
            ServiceError::InvalidParams(message) => ErrorEnvelope {
                code: "invalid_params".into(),
                message,
                details: None,
            },
            ServiceError::Unsupported(command) => ErrorEnvelope {
                code: "unsupported_command".into(),
                message: format!("Command '{command}' is not supported"),
                details: None,
            },
            ServiceError::Protocol(message) => ErrorEnvelope {
                code: "protocol_error".into(),
                message,
                details: None,
            },
            ServiceError::Bridge(err) => {
                let message = err.to_string();
                let details = match &err {
                    BridgeError::Resolve {
                        sequence, action, ..
                    } => Some(json!({
                        "category": "resolution",
                        "sequence": sequence,
                        "action": action,
                    })),
                    BridgeError::Orchestration(OrchestrationError::SequenceAborted {
                        sequence,
                        action,
                        source,
                    }) => Some(json!({
                        "category": "sequence_aborted",
                        "sequence": sequence,
                        "action": action,
                        "not_implemented": source.is_not_implemented(),
                    })),
                    _ => None,
                };

                ErrorEnvelope {
                    code: "internal".into(),
                    message,
                    details,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo::{self, CounterModel};
    use crate::runtime::BridgeConfig;

    async fn roundtrip(input: &str) -> Vec<Value> {
        let bridge = Bridge::new(
            Arc::new(CounterModel::default()),
            demo::actions(),
            BridgeConfig::default(),
        );
        let service = Service::new(Arc::new(bridge));
        let mut output = Vec::new();
        service.handle(input.as_bytes(), &mut output).await.unwrap();
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_parse_and_unsupported_errors() {
        let responses = roundtrip("not json\n\n{\"id\":1,\"command\":\"rewind\"}\n").await;
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["id"], Value::Null);
        assert_eq!(responses[0]["error"]["code"], "parse_error");
        assert_eq!(responses[1]["id"], 1);
        assert_eq!(responses[1]["error"]["code"], "unsupported_command");
    }

    #[tokio::test]
    async fn test_handshake() {
        let responses = roundtrip(concat!(
            r#"{"id":1,"command":"handshake","params":{"client":"t","protocol_version":"1.0.0"}}"#,
            "\n",
            r#"{"id":2,"command":"handshake","params":{"client":"t","protocol_version":"0.1"}}"#,
            "\n",
            "{\"id\":3,\"command\":\"handshake\",\"params\":{}}\n",
        ))
        .await;
        assert_eq!(responses[0]["result"]["protocol_version"], PROTOCOL_VERSION);
        assert_eq!(responses[1]["error"]["code"], "protocol_error");
        assert_eq!(responses[2]["error"]["code"], "invalid_params");
    }

    #[tokio::test]
    async fn test_invalid_params() {
        let responses = roundtrip(
            "{\"id\":\"a\",\"command\":\"execute_action\",\"params\":{\"role_id\":0}}\n",
        )
        .await;
        assert_eq!(responses[0]["id"], "a");
        assert_eq!(responses[0]["error"]["code"], "invalid_params");
    }
}
