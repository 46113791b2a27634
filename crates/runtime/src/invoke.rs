//! Tool-augmented invocation: one model conversation with one tool session.

use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::InvocationError;
use crate::model::{Backend, BackendFactory, Message, ModelRequest, ToolResult, Usage};
use crate::select::BackendDescriptor;
use crate::tools::{ToolHost, ToolLauncher, ToolSession};

/// One user submission.
#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    pub text: String,
    pub requested_model: Option<String>,
}

impl QueryRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            requested_model: None,
        }
    }

    pub fn with_model(mut self, model: Option<impl Into<String>>) -> Self {
        self.requested_model = model.map(Into::into);
        self
    }
}

/// What the model finally answered, before display formatting.
#[derive(Debug, Clone, PartialEq)]
pub enum RawResult {
    /// The answer was a JSON object.
    Structured(Value),
    Text(String),
}

impl RawResult {
    /// Classify a final answer. A JSON object, bare or inside a fenced
    /// code block, is structured; anything else is text.
    pub fn from_answer(answer: String) -> Self {
        match serde_json::from_str::<Value>(strip_code_fence(answer.trim())) {
            Ok(value @ Value::Object(_)) => Self::Structured(value),
            _ => Self::Text(answer),
        }
    }
}

fn strip_code_fence(s: &str) -> &str {
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Limits and prompt for an invocation.
#[derive(Debug, Clone)]
pub struct InvokeOptions {
    pub instructions: String,
    pub max_turns: usize,
    pub max_tokens: u32,
    /// Bound on the whole invocation, tool session startup included.
    pub timeout: Duration,
}

impl Default for InvokeOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl InvokeOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            instructions: config.instructions().to_string(),
            max_turns: config.invoke.max_turns.max(1),
            max_tokens: config.invoke.max_tokens,
            timeout: Duration::from_secs(config.invoke.timeout_secs),
        }
    }
}

/// Runs queries against a model with a freshly launched tool session each
/// time.
pub struct Invoker<L, F> {
    launcher: L,
    factory: F,
    options: InvokeOptions,
}

impl<L: ToolLauncher, F: BackendFactory> Invoker<L, F> {
    pub fn new(launcher: L, factory: F, options: InvokeOptions) -> Self {
        Self {
            launcher,
            factory,
            options,
        }
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Answer `request` with the model named by `descriptor`.
    ///
    /// The tool session lives exactly as long as this call and is closed on
    /// every path out of it, timeout included.
    pub async fn invoke(
        &self,
        descriptor: &BackendDescriptor,
        request: &QueryRequest,
    ) -> Result<RawResult, InvocationError> {
        let text = request.text.trim();
        if text.is_empty() {
            return Err(InvocationError::empty_query());
        }

        let backend = self.factory.build(descriptor).map_err(|e| {
            warn!(%descriptor, error = %e, "cannot build backend");
            InvocationError::backend(descriptor, &e)
        })?;

        let limit = self.options.timeout;
        let started = Instant::now();

        let session = match timeout(limit, self.launcher.launch()).await {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => {
                warn!(error = %e, "tool session failed to start");
                return Err(InvocationError::tool_session(&e));
            }
            Err(_) => {
                warn!(?limit, "tool session startup timed out");
                return Err(InvocationError::timed_out(limit));
            }
        };

        let remaining = limit.saturating_sub(started.elapsed());
        let outcome = timeout(
            remaining,
            self.converse(&backend, &session, descriptor, text),
        )
        .await;
        session.close().await;

        match outcome {
            Ok(result) => result,
            Err(_) => {
                warn!(%descriptor, ?limit, "invocation timed out");
                Err(InvocationError::timed_out(limit))
            }
        }
    }

    /// The model/tool loop.
    async fn converse<B: Backend, S: ToolHost>(
        &self,
        backend: &B,
        session: &S,
        descriptor: &BackendDescriptor,
        text: &str,
    ) -> Result<RawResult, InvocationError> {
        let mut messages = vec![
            Message::system(&self.options.instructions),
            Message::user(text),
        ];
        let mut last_text = String::new();
        let mut usage = Usage::default();

        for turn in 1..=self.options.max_turns {
            let response = backend
                .call(ModelRequest {
                    messages: &messages,
                    tools: session.specs(),
                    max_tokens: self.options.max_tokens,
                })
                .await
                .map_err(|e| {
                    warn!(%descriptor, error = %e, "model call failed");
                    InvocationError::backend(descriptor, &e)
                })?;

            usage += response.usage;
            let calls = response.message.tool_calls();
            let answer = response.message.text();
            debug!(
                turn,
                tool_calls = calls.len(),
                input_tokens = response.usage.input_tokens,
                output_tokens = response.usage.output_tokens,
                "model turn complete"
            );

            if calls.is_empty() {
                info!(
                    %descriptor,
                    turns = turn,
                    input_tokens = usage.input_tokens,
                    output_tokens = usage.output_tokens,
                    "query answered"
                );
                return Ok(RawResult::from_answer(answer));
            }
            if !answer.trim().is_empty() {
                last_text = answer;
            }
            messages.push(response.message);

            let mut results = Vec::with_capacity(calls.len());
            for call in &calls {
                match session.execute(call).await {
                    Ok(output) => results.push(ToolResult::Success {
                        tool_call_id: call.id.clone(),
                        output,
                    }),
                    Err(e) if e.is_fatal() => {
                        warn!(tool = %call.name, error = %e, "tool session lost");
                        return Err(InvocationError::tool_session(&e));
                    }
                    Err(e) => {
                        warn!(tool = %call.name, error = %e, "tool call failed, reporting to model");
                        results.push(ToolResult::Failure {
                            tool_call_id: call.id.clone(),
                            error: e,
                        });
                    }
                }
            }
            messages.push(Message::tool_results(results));
        }

        warn!(
            %descriptor,
            max_turns = self.options.max_turns,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "turn limit reached without a final answer"
        );
        Ok(RawResult::from_answer(last_text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelError, ModelResponse, Part, Role, ToolCall, ToolSpec, Usage};
    use crate::tools::ToolError;
    use crate::ErrorKind;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counters {
        launched: AtomicUsize,
        closed: AtomicUsize,
        executed: AtomicUsize,
    }

    #[derive(Clone, Copy)]
    enum ToolMode {
        Echo,
        Rejects,
        Crashes,
        WontStart,
        /// Never finishes starting up.
        Stalls,
    }

    struct FakeLauncher {
        counters: Arc<Counters>,
        mode: ToolMode,
    }

    struct FakeSession {
        counters: Arc<Counters>,
        mode: ToolMode,
        specs: Vec<ToolSpec>,
    }

    impl ToolHost for FakeSession {
        fn specs(&self) -> &[ToolSpec] {
            &self.specs
        }

        async fn execute(&self, call: &ToolCall) -> Result<Value, ToolError> {
            self.counters.executed.fetch_add(1, Ordering::SeqCst);
            match self.mode {
                ToolMode::Echo => {
                    let q = call.input["location"].as_str().unwrap_or_default();
                    tokio::task::yield_now().await;
                    Ok(json!({ "listings": [format!("stay in {q}")] }))
                }
                ToolMode::Rejects => Err(ToolError::Execution("invalid dates".into())),
                ToolMode::Crashes => Err(ToolError::SessionLost("server exited".into())),
                ToolMode::WontStart | ToolMode::Stalls => unreachable!(),
            }
        }
    }

    impl ToolSession for FakeSession {
        async fn close(self) {
            self.counters.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl ToolLauncher for FakeLauncher {
        type Session = FakeSession;

        async fn launch(&self) -> Result<FakeSession, ToolError> {
            match self.mode {
                ToolMode::WontStart => return Err(ToolError::Launch("npx: not found".into())),
                ToolMode::Stalls => tokio::time::sleep(Duration::from_secs(60)).await,
                _ => {}
            }
            self.counters.launched.fetch_add(1, Ordering::SeqCst);
            Ok(FakeSession {
                counters: Arc::clone(&self.counters),
                mode: self.mode,
                specs: vec![ToolSpec {
                    name: "airbnb_search".into(),
                    description: "Search listings".into(),
                    schema: json!({ "type": "object" }),
                }],
            })
        }
    }

    #[derive(Clone, Copy)]
    enum ModelMode {
        /// Calls the tool once with the user text, then summarizes.
        SearchThenAnswer,
        /// Answers with a JSON document straight away.
        Json,
        /// Never stops calling tools.
        Loops,
        Unreachable,
        Hangs,
    }

    struct FakeBackend {
        mode: ModelMode,
        calls: Arc<AtomicUsize>,
    }

    fn assistant(parts: Vec<Part>) -> ModelResponse {
        ModelResponse {
            message: Message {
                role: Role::Assistant,
                parts,
            },
            usage: Usage::default(),
        }
    }

    fn search_call(location: &str) -> Part {
        Part::ToolCall(ToolCall {
            id: format!("call-{location}"),
            name: "airbnb_search".into(),
            input: json!({ "location": location }),
        })
    }

    impl Backend for FakeBackend {
        async fn call(&self, request: ModelRequest<'_>) -> Result<ModelResponse, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let user = request.messages[1].text();
            match self.mode {
                ModelMode::Unreachable => Err(ModelError::Network("connection refused".into())),
                ModelMode::Hangs => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    unreachable!()
                }
                ModelMode::Json => Ok(assistant(vec![Part::Text(format!(
                    "```json\n{{\"data\":{{\"results\":[{{\"id\":\"1\",\"name\":\"{user}\"}}]}}}}\n```"
                ))])),
                ModelMode::Loops => Ok(assistant(vec![
                    Part::Text("still looking".into()),
                    search_call(&user),
                ])),
                ModelMode::SearchThenAnswer => {
                    let last = request.messages.last().unwrap();
                    let results: Vec<String> = last
                        .parts
                        .iter()
                        .filter_map(|p| match p {
                            Part::ToolResult(r) => Some(r.content()),
                            _ => None,
                        })
                        .collect();
                    if results.is_empty() {
                        Ok(assistant(vec![search_call(&user)]))
                    } else {
                        Ok(assistant(vec![Part::Text(format!(
                            "Answer for {user}: {}",
                            results.join(", ")
                        ))]))
                    }
                }
            }
        }
    }

    struct FakeFactory {
        mode: ModelMode,
        calls: Arc<AtomicUsize>,
    }

    impl BackendFactory for FakeFactory {
        type Backend = FakeBackend;

        fn build(&self, _descriptor: &BackendDescriptor) -> Result<FakeBackend, ModelError> {
            Ok(FakeBackend {
                mode: self.mode,
                calls: Arc::clone(&self.calls),
            })
        }

        fn has_remote_credential(&self) -> bool {
            false
        }
    }

    struct Harness {
        invoker: Invoker<FakeLauncher, FakeFactory>,
        counters: Arc<Counters>,
        model_calls: Arc<AtomicUsize>,
    }

    fn harness(tool: ToolMode, model: ModelMode, options: InvokeOptions) -> Harness {
        let counters = Arc::new(Counters::default());
        let model_calls = Arc::new(AtomicUsize::new(0));
        let invoker = Invoker::new(
            FakeLauncher {
                counters: Arc::clone(&counters),
                mode: tool,
            },
            FakeFactory {
                mode: model,
                calls: Arc::clone(&model_calls),
            },
            options,
        );
        Harness {
            invoker,
            counters,
            model_calls,
        }
    }

    fn descriptor() -> BackendDescriptor {
        BackendDescriptor::local("llama3.2:latest")
    }

    #[tokio::test]
    async fn empty_query_opens_nothing() {
        let h = harness(ToolMode::Echo, ModelMode::SearchThenAnswer, InvokeOptions::default());
        for text in ["", "   ", "\n\t"] {
            let err = h
                .invoker
                .invoke(&descriptor(), &QueryRequest::new(text))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::EmptyQuery);
        }
        assert_eq!(h.counters.launched.load(Ordering::SeqCst), 0);
        assert_eq!(h.model_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn tool_results_reach_the_model() {
        let h = harness(ToolMode::Echo, ModelMode::SearchThenAnswer, InvokeOptions::default());
        let result = h
            .invoker
            .invoke(&descriptor(), &QueryRequest::new("Paris"))
            .await
            .unwrap();
        assert_eq!(
            result,
            RawResult::Text(r#"Answer for Paris: {"listings":["stay in Paris"]}"#.into())
        );
        assert_eq!(h.model_calls.load(Ordering::SeqCst), 2);
        assert_eq!(h.counters.executed.load(Ordering::SeqCst), 1);
        assert_eq!(h.counters.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn json_answer_is_structured() {
        let h = harness(ToolMode::Echo, ModelMode::Json, InvokeOptions::default());
        let result = h
            .invoker
            .invoke(&descriptor(), &QueryRequest::new("Loft"))
            .await
            .unwrap();
        assert_eq!(
            result,
            RawResult::Structured(json!({ "data": { "results": [{ "id": "1", "name": "Loft" }] } }))
        );
    }

    #[tokio::test]
    async fn rejected_tool_call_is_fed_back() {
        let h = harness(ToolMode::Rejects, ModelMode::SearchThenAnswer, InvokeOptions::default());
        let result = h
            .invoker
            .invoke(&descriptor(), &QueryRequest::new("Rome"))
            .await
            .unwrap();
        match result {
            RawResult::Text(text) => assert!(text.contains("invalid dates")),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(h.counters.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn crashed_tool_fails_session_and_releases_it() {
        let h = harness(ToolMode::Crashes, ModelMode::SearchThenAnswer, InvokeOptions::default());
        let err = h
            .invoker
            .invoke(&descriptor(), &QueryRequest::new("Rome"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ToolSessionFailed);
        assert_eq!(h.counters.launched.load(Ordering::SeqCst), 1);
        assert_eq!(h.counters.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn launch_failure_is_tool_session_failed() {
        let h = harness(ToolMode::WontStart, ModelMode::SearchThenAnswer, InvokeOptions::default());
        let err = h
            .invoker
            .invoke(&descriptor(), &QueryRequest::new("Rome"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ToolSessionFailed);
        assert_eq!(h.model_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stalled_launch_times_out_before_model() {
        let options = InvokeOptions {
            timeout: Duration::from_millis(100),
            ..InvokeOptions::default()
        };
        let h = harness(ToolMode::Stalls, ModelMode::SearchThenAnswer, options);
        let err = h
            .invoker
            .invoke(&descriptor(), &QueryRequest::new("Oslo"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ToolSessionFailed);
        assert!(err.message().contains("timed out"));
        assert_eq!(h.model_calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.counters.launched.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unreachable_backend_still_releases_session() {
        let h = harness(ToolMode::Echo, ModelMode::Unreachable, InvokeOptions::default());
        let err = h
            .invoker
            .invoke(&descriptor(), &QueryRequest::new("Lisbon"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BackendUnreachable);
        assert_eq!(h.counters.launched.load(Ordering::SeqCst), 1);
        assert_eq!(h.counters.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn timeout_tears_session_down() {
        let options = InvokeOptions {
            timeout: Duration::from_millis(100),
            ..InvokeOptions::default()
        };
        let h = harness(ToolMode::Echo, ModelMode::Hangs, options);
        let err = h
            .invoker
            .invoke(&descriptor(), &QueryRequest::new("Oslo"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ToolSessionFailed);
        assert_eq!(h.counters.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn turn_limit_returns_last_text() {
        let options = InvokeOptions {
            max_turns: 3,
            ..InvokeOptions::default()
        };
        let h = harness(ToolMode::Echo, ModelMode::Loops, options);
        let result = h
            .invoker
            .invoke(&descriptor(), &QueryRequest::new("Kyoto"))
            .await
            .unwrap();
        assert_eq!(result, RawResult::Text("still looking".into()));
        assert_eq!(h.model_calls.load(Ordering::SeqCst), 3);
        assert_eq!(h.counters.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_invocations_are_independent() {
        let h = harness(ToolMode::Echo, ModelMode::SearchThenAnswer, InvokeOptions::default());
        let invoker = Arc::new(h.invoker);

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..10 {
            let invoker = Arc::clone(&invoker);
            tasks.spawn(async move {
                let city = format!("city-{i}");
                let result = invoker
                    .invoke(&descriptor(), &QueryRequest::new(&city))
                    .await;
                (city, result)
            });
        }

        let mut seen = 0;
        while let Some(joined) = tasks.join_next().await {
            let (city, result) = joined.unwrap();
            let expected = format!(r#"Answer for {city}: {{"listings":["stay in {city}"]}}"#);
            assert_eq!(result.unwrap(), RawResult::Text(expected));
            seen += 1;
        }
        assert_eq!(seen, 10);
        assert_eq!(h.counters.launched.load(Ordering::SeqCst), 10);
        assert_eq!(h.counters.closed.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn answers_are_classified() {
        assert_eq!(
            RawResult::from_answer(r#"{"data":{"results":[]}}"#.into()),
            RawResult::Structured(json!({ "data": { "results": [] } }))
        );
        assert_eq!(
            RawResult::from_answer("```\n{\"a\":1}\n```".into()),
            RawResult::Structured(json!({ "a": 1 }))
        );
        assert_eq!(
            RawResult::from_answer("[1, 2]".into()),
            RawResult::Text("[1, 2]".into())
        );
        assert_eq!(
            RawResult::from_answer("Here are three lofts.".into()),
            RawResult::Text("Here are three lofts.".into())
        );
    }
}
