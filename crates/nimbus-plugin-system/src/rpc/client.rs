//! Host-side client for the plugin's `run` endpoint

use crate::error::{PluginError, PluginResult};
use nimbus_plugin_api::protocol::{methods, read_frame, write_frame, RunParams};
use nimbus_plugin_api::{RpcRequest, RpcResponse, RunResult};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Connection to the RPC address a plugin reported during the handshake
pub struct PluginRunClient {
    plugin: String,
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    next_id: u64,
}

impl PluginRunClient {
    pub async fn connect(
        plugin: impl Into<String>,
        address: SocketAddr,
        limit: Duration,
    ) -> PluginResult<Self> {
        let plugin = plugin.into();
        let stream = match timeout(limit, TcpStream::connect(address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(PluginError::startup(
                    &plugin,
                    format!("could not connect to {}: {}", address, e),
                ))
            }
            Err(_) => {
                return Err(PluginError::startup(
                    &plugin,
                    format!(
                        "could not connect to {} within {}ms",
                        address,
                        limit.as_millis()
                    ),
                ))
            }
        };
        debug!(plugin = %plugin, %address, "Connected to plugin");

        let (reader, writer) = stream.into_split();
        Ok(Self {
            plugin,
            reader: BufReader::new(reader),
            writer,
            next_id: 0,
        })
    }

    /// Issue `run` and wait for the plugin's answer.
    ///
    /// A logical failure comes back inside the `RunResult`; losing the
    /// connection before the response arrives is a transport error.
    pub async fn run(&mut self, args: Vec<String>) -> PluginResult<RunResult> {
        self.next_id += 1;
        let id = self.next_id;

        let request = RpcRequest::new(id, methods::RUN, &RunParams { args })?;
        write_frame(&mut self.writer, &request).await.map_err(|e| {
            PluginError::transport(&self.plugin, format!("failed to send run request: {}", e))
        })?;

        let response: RpcResponse = match read_frame(&mut self.reader).await {
            Ok(Some(response)) => response,
            Ok(None) => {
                return Err(PluginError::transport(
                    &self.plugin,
                    "connection closed before run completed",
                ))
            }
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                return Err(PluginError::protocol(format!(
                    "plugin {} sent a malformed response: {}",
                    self.plugin, e
                )))
            }
            Err(e) => {
                return Err(PluginError::transport(
                    &self.plugin,
                    format!("connection lost: {}", e),
                ))
            }
        };

        if response.id != id {
            return Err(PluginError::protocol(format!(
                "plugin {} answered request {} but {} was pending",
                self.plugin, response.id, id
            )));
        }

        response.into_result().map_err(|e| {
            PluginError::protocol(format!("plugin {} rejected run: {}", self.plugin, e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nimbus_plugin_api::RpcError;
    use pretty_assertions::assert_eq;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    const LIMIT: Duration = Duration::from_secs(2);

    /// One-shot plugin stand-in: reads a request and answers with `reply`
    async fn fake_plugin<F>(reply: F) -> SocketAddr
    where
        F: FnOnce(RpcRequest) -> Option<String> + Send + 'static,
    {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (reader, mut writer) = stream.into_split();
            let mut reader = BufReader::new(reader);
            let request: RpcRequest = read_frame(&mut reader).await.unwrap().unwrap();
            if let Some(line) = reply(request) {
                writer.write_all(line.as_bytes()).await.unwrap();
                writer.flush().await.unwrap();
            }
        });
        address
    }

    fn respond(request: &RpcRequest, result: &RunResult) -> String {
        let response = RpcResponse::success(request.id, result).unwrap();
        format!("{}\n", serde_json::to_string(&response).unwrap())
    }

    #[tokio::test]
    async fn test_run_returns_plugin_result() {
        let address = fake_plugin(|request| {
            assert_eq!(request.method, methods::RUN);
            let params: RunParams = request.parse_params().unwrap();
            assert_eq!(params.args, vec!["hello".to_string(), "world".to_string()]);
            Some(respond(&request, &RunResult::failed("nope")))
        })
        .await;

        let mut client = PluginRunClient::connect("greeter", address, LIMIT).await.unwrap();
        let result = client
            .run(vec!["hello".to_string(), "world".to_string()])
            .await
            .unwrap();

        assert_eq!(result, RunResult::failed("nope"));
    }

    #[tokio::test]
    async fn test_closed_connection_is_transport_error() {
        let address = fake_plugin(|_| None).await;

        let mut client = PluginRunClient::connect("greeter", address, LIMIT).await.unwrap();
        let err = client.run(vec!["hello".to_string()]).await.unwrap_err();

        assert!(matches!(err, PluginError::PluginTransport { .. }));
    }

    #[tokio::test]
    async fn test_mismatched_id_is_protocol_error() {
        let address = fake_plugin(|request| {
            let response = RpcResponse::success(request.id + 1, &RunResult::ok()).unwrap();
            Some(format!("{}\n", serde_json::to_string(&response).unwrap()))
        })
        .await;

        let mut client = PluginRunClient::connect("greeter", address, LIMIT).await.unwrap();
        let err = client.run(vec![]).await.unwrap_err();
        assert!(matches!(err, PluginError::Protocol { .. }));
    }

    #[tokio::test]
    async fn test_remote_error_and_garbage_are_protocol_errors() {
        let address = fake_plugin(|request| {
            let response = RpcResponse::failure(request.id, RpcError::new(-32601, "no run here"));
            Some(format!("{}\n", serde_json::to_string(&response).unwrap()))
        })
        .await;
        let mut client = PluginRunClient::connect("greeter", address, LIMIT).await.unwrap();
        let err = client.run(vec![]).await.unwrap_err();
        assert!(err.to_string().contains("no run here"));

        let address = fake_plugin(|_| Some("garbage\n".to_string())).await;
        let mut client = PluginRunClient::connect("greeter", address, LIMIT).await.unwrap();
        let err = client.run(vec![]).await.unwrap_err();
        assert!(matches!(err, PluginError::Protocol { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_plugin_is_startup_error() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let address = listener.local_addr().unwrap();
        drop(listener);

        let err = PluginRunClient::connect("greeter", address, LIMIT)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, PluginError::PluginStartup { .. }));
    }

    #[tokio::test]
    async fn test_connect_gives_up_after_the_limit() {
        // TEST-NET-1 is never routed; either the connect hangs or fails fast
        let address: SocketAddr = "192.0.2.1:9".parse().unwrap();
        let started = std::time::Instant::now();

        let err = PluginRunClient::connect("greeter", address, Duration::from_millis(100))
            .await
            .err()
            .unwrap();

        assert!(matches!(err, PluginError::PluginStartup { .. }));
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
