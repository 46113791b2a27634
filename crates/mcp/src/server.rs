//! MCP server management (spawn, communicate, lifecycle).

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::protocol::{
    CallToolParams, CallToolResult, IncomingMessage, InitializeParams, InitializeResult,
    JsonRpcNotification, JsonRpcRequest, ListToolsResult, RequestId, Tool,
};

/// Default timeout for a single MCP request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Maximum size of a single line from the server (1MB).
///
/// Reads stop at this bound, so a runaway line is never buffered whole.
/// Sized for listing searches that return many results at once.
pub const MAX_OUTPUT_SIZE: usize = 1024 * 1024;

/// Configuration for an MCP server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub request_timeout: Duration,
}

impl ServerConfig {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            request_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Build a config from a whitespace-separated command line such as
    /// `npx -y @openbnb/mcp-server-airbnb`.
    pub fn from_command_line(name: impl Into<String>, line: &str) -> Result<Self> {
        let mut parts = line.split_whitespace();
        let command = parts.next().ok_or(Error::EmptyCommand)?;
        Ok(Self::new(name, command).args(parts))
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }
}

/// The stdio pair of the child; locked as one so a request and its
/// response are never interleaved with another caller's.
struct Channel {
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

/// Handle to a running MCP server.
///
/// The child is spawned with `kill_on_drop`, so dropping the handle without
/// calling [`Server::shutdown`] still terminates the process.
pub struct Server {
    config: ServerConfig,
    process: Mutex<Child>,
    channel: Mutex<Channel>,
    next_id: AtomicI64,
    initialized: AtomicBool,
    tools: Mutex<Vec<Tool>>,
}

impl Server {
    /// Spawn a new MCP server process.
    pub async fn spawn(config: ServerConfig) -> Result<Self> {
        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut process = cmd.spawn().map_err(|source| Error::Spawn {
            command: config.command.clone(),
            source,
        })?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| Error::Io(std::io::Error::other("failed to capture stdin")))?;
        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| Error::Io(std::io::Error::other("failed to capture stdout")))?;

        if let Some(stderr) = process.stderr.take() {
            tokio::spawn(forward_stderr(config.name.clone(), stderr));
        }

        debug!(server = %config.name, command = %config.command, pid = ?process.id(), "spawned MCP server");

        Ok(Self {
            config,
            process: Mutex::new(process),
            channel: Mutex::new(Channel {
                stdin,
                stdout: BufReader::new(stdout),
            }),
            next_id: AtomicI64::new(1),
            initialized: AtomicBool::new(false),
            tools: Mutex::new(Vec::new()),
        })
    }

    /// Get the server name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Run the MCP handshake and fetch the tool list.
    ///
    /// Must be called before [`Server::call_tool`].
    pub async fn initialize(&self) -> Result<InitializeResult> {
        let result: InitializeResult = self
            .request("initialize", Some(InitializeParams::default()))
            .await?;
        self.notify("notifications/initialized").await?;
        self.initialized.store(true, Ordering::SeqCst);

        if let Some(info) = &result.server_info {
            debug!(server = %self.config.name, remote = %info.name, version = ?info.version, "MCP handshake complete");
        }

        self.refresh_tools().await?;
        Ok(result)
    }

    /// Check if the server is initialized.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Re-fetch the tool list, following pagination cursors.
    pub async fn refresh_tools(&self) -> Result<()> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = cursor.take().map(|c| serde_json::json!({ "cursor": c }));
            let page: ListToolsResult = self.request("tools/list", params).await?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }
        *self.tools.lock().await = tools;
        Ok(())
    }

    /// Get the list of available tools.
    pub async fn tools(&self) -> Vec<Tool> {
        self.tools.lock().await.clone()
    }

    /// Call a tool by name.
    ///
    /// A result flagged `isError` by the server is returned as
    /// [`Error::ToolCallFailed`] carrying the tool's text.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<serde_json::Value>,
    ) -> Result<CallToolResult> {
        if !self.is_initialized() {
            return Err(Error::NotInitialized);
        }

        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };
        let result: CallToolResult = self.request("tools/call", Some(params)).await?;

        if result.is_error {
            return Err(Error::ToolCallFailed(result.text()));
        }
        Ok(result)
    }

    /// Terminate the server process and reap it.
    pub async fn shutdown(self) -> Result<()> {
        let mut process = self.process.into_inner();
        if let Ok(Some(status)) = process.try_wait() {
            debug!(server = %self.config.name, %status, "MCP server already exited");
            return Ok(());
        }
        process.kill().await?;
        debug!(server = %self.config.name, "MCP server stopped");
        Ok(())
    }

    // --- Internal methods ---

    fn next_request_id(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn request<P, R>(&self, method: &str, params: Option<P>) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let id = self.next_request_id();
        let mut request = JsonRpcRequest::new(id.clone(), method);
        if let Some(p) = params {
            request = request.with_params(p)?;
        }
        let line = serde_json::to_string(&request)?;

        let limit = self.config.request_timeout;
        let response = timeout(limit, async {
            let mut channel = self.channel.lock().await;
            write_line(&mut channel.stdin, &line).await?;
            read_response(&mut channel.stdout, &id).await
        })
        .await
        .map_err(|_| Error::Timeout(limit))??;

        let value = response.into_result()?;
        Ok(serde_json::from_value(value)?)
    }

    async fn notify(&self, method: &str) -> Result<()> {
        let line = serde_json::to_string(&JsonRpcNotification::new(method))?;
        let mut channel = self.channel.lock().await;
        write_line(&mut channel.stdin, &line).await
    }
}

async fn write_line(stdin: &mut ChildStdin, line: &str) -> Result<()> {
    trace!(%line, "-> mcp");
    stdin.write_all(line.as_bytes()).await?;
    stdin.write_all(b"\n").await?;
    stdin.flush().await?;
    Ok(())
}

/// Drain the child's stderr into the log until it closes.
///
/// The pipe must stay open for the life of the child: a closed read end
/// turns the server's next log write into SIGPIPE.
async fn forward_stderr(name: String, stderr: ChildStderr) {
    let mut reader = BufReader::new(stderr);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&line);
                debug!(server = %name, "{}", text.trim_end());
            }
            Err(e) => {
                debug!(server = %name, error = %e, "stopped reading MCP server stderr");
                break;
            }
        }
    }
}

/// Read lines until the response to `id` arrives.
async fn read_response(
    stdout: &mut BufReader<ChildStdout>,
    id: &RequestId,
) -> Result<IncomingMessage> {
    let mut line = Vec::new();
    loop {
        line.clear();
        let bytes_read = (&mut *stdout)
            .take(MAX_OUTPUT_SIZE as u64 + 1)
            .read_until(b'\n', &mut line)
            .await?;
        if bytes_read == 0 {
            return Err(Error::ServerExited);
        }
        if line.len() > MAX_OUTPUT_SIZE {
            return Err(Error::OutputTooLarge {
                max: MAX_OUTPUT_SIZE,
            });
        }

        let trimmed = line.trim_ascii();
        if trimmed.is_empty() {
            continue;
        }
        trace!(line = %String::from_utf8_lossy(trimmed), "<- mcp");

        match serde_json::from_slice::<IncomingMessage>(trimmed) {
            Ok(message) if message.answers(id) => return Ok(message),
            Ok(message) => {
                debug!(method = ?message.method, "skipping unrelated MCP message");
            }
            Err(e) => {
                debug!(error = %e, "skipping non JSON-RPC line from MCP server");
            }
        }
    }
}
