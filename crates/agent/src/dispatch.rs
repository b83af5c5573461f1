//! C1 — the Tool Invocation Layer.
//!
//! `RunContext` is the per-agent-turn bookkeeping value spec §9 asks for
//! in place of a thread-local: one owned struct, threaded through the
//! turn by `&mut`, reset deterministically by simply being dropped at the
//! end of the turn. Nothing here is global.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use serde_json::Value;
use sha2::{Digest, Sha256};

use fathom_domain::config::AgentConfig;
use fathom_domain::error::AgentError;
use fathom_domain::research::{ToolCallRecord, ToolCallStatus};

/// Caching policy for one call, decided by the caller from the tool's
/// class (spec §4.1 "Caching policy by tool class") — the layer itself
/// has no opinion about which tools are cacheable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    Cacheable,
    NotCacheable,
}

/// Three failure modes that are caps on the whole turn, not on one call —
/// spec §7's "a run should only be killed by deadline, cap, or
/// infrastructure error". The engine must end the turn on any of these.
#[derive(Debug, thiserror::Error)]
pub enum CapTripped {
    #[error(transparent)]
    Budget(#[from] BudgetOrLoop),
    #[error("run exceeded its wall-clock budget of {0}s")]
    Deadline(u64),
}

#[derive(Debug, thiserror::Error)]
pub enum BudgetOrLoop {
    #[error("tool call budget exceeded: {limit} calls")]
    Budget { limit: usize },
    #[error("loop detected: {tool_name} repeated {repeats} times consecutively")]
    Loop { tool_name: String, repeats: usize },
}

/// The outcome of one `RunContext::dispatch` call. `Executed` and
/// `Guarded` both feed a tool-result message back to the LLM and let the
/// turn continue; `Capped` means the engine must stop the turn now.
pub enum DispatchOutcome {
    Executed(ToolCallRecord),
    Guarded(ToolCallRecord),
    Capped(ToolCallRecord, CapTripped),
}

impl DispatchOutcome {
    pub fn record(&self) -> &ToolCallRecord {
        match self {
            DispatchOutcome::Executed(r) | DispatchOutcome::Guarded(r) | DispatchOutcome::Capped(r, _) => r,
        }
    }
}

/// Per-run state for the Tool Invocation Layer (spec §4.1).
pub struct RunContext {
    config: AgentConfig,
    deadline: Option<Instant>,
    tool_log: Vec<ToolCallRecord>,
    result_cache: HashMap<String, Value>,
    web_search_seen: HashSet<String>,
    stored_hashes: HashSet<String>,
    answer_committed: bool,
    memory_searched: bool,
}

impl RunContext {
    pub fn new(config: AgentConfig, max_runtime_seconds: Option<u64>) -> Self {
        Self {
            deadline: max_runtime_seconds.map(|s| Instant::now() + Duration::from_secs(s)),
            config,
            tool_log: Vec::new(),
            result_cache: HashMap::new(),
            web_search_seen: HashSet::new(),
            stored_hashes: HashSet::new(),
            answer_committed: false,
            memory_searched: false,
        }
    }

    pub fn tool_log(&self) -> &[ToolCallRecord] {
        &self.tool_log
    }

    pub fn into_tool_log(self) -> Vec<ToolCallRecord> {
        self.tool_log
    }

    pub fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Dispatch one tool call through every guard in spec §4.1, calling
    /// `executor` only when nothing short-circuits it.
    ///
    /// `executor` receives the (possibly guard-rewritten) arguments and
    /// returns the raw tool result or an error message.
    pub async fn dispatch<F, Fut>(
        &mut self,
        tool_name: &str,
        arguments: Value,
        cache_policy: CachePolicy,
        executor: F,
    ) -> DispatchOutcome
    where
        F: FnOnce(Value) -> Fut,
        Fut: std::future::Future<Output = Result<Value, String>>,
    {
        let call_id = uuid::Uuid::new_v4().to_string();
        let started_at = chrono::Utc::now();
        let start = Instant::now();

        // 1. Deadline gate.
        if self.deadline_passed() {
            let secs = self.config.run_timeout_secs;
            let record = self.push_failed(&call_id, tool_name, &arguments, started_at, start, "run deadline exceeded");
            return DispatchOutcome::Capped(record, CapTripped::Deadline(secs));
        }

        // 2. Budget gate.
        if self.tool_log.len() >= self.config.max_tool_calls {
            let limit = self.config.max_tool_calls;
            let record = self.push_failed(&call_id, tool_name, &arguments, started_at, start, "tool call budget exceeded");
            return DispatchOutcome::Capped(record, BudgetOrLoop::Budget { limit }.into());
        }

        // 3. Loop guard: would this call extend a consecutive identical
        // streak to `max_identical_repeats`?
        let key = canonical_key(tool_name, &arguments);
        let streak = self.consecutive_streak(&key);
        if streak + 1 >= self.config.max_identical_repeats {
            let last_five: Vec<String> = self
                .tool_log
                .iter()
                .rev()
                .take(5)
                .map(|r| format!("{}({})", r.tool_name, r.arguments))
                .collect();
            tracing::warn!(tool_name, recent = ?last_five, "loop guard tripped");
            let repeats = self.config.max_identical_repeats;
            let record = self.push_failed(&call_id, tool_name, &arguments, started_at, start, "loop detected");
            return DispatchOutcome::Capped(
                record,
                BudgetOrLoop::Loop { tool_name: tool_name.to_string(), repeats }.into(),
            );
        }

        // 4. Cache hit path (opt-in only).
        let cache_key = format!("{tool_name}:{}", canonicalize(&arguments));
        if cache_policy == CachePolicy::Cacheable {
            if let Some(cached) = self.result_cache.get(&cache_key).cloned() {
                let mut logged_args = arguments.clone();
                if let Value::Object(ref mut map) = logged_args {
                    map.insert("_cached".into(), Value::Bool(true));
                }
                let record = ToolCallRecord {
                    call_id,
                    tool_name: tool_name.to_string(),
                    arguments: logged_args,
                    status: ToolCallStatus::Success,
                    result: Some(cached),
                    error: None,
                    duration_ms: start.elapsed().as_millis() as u64,
                    started_at,
                };
                self.tool_log.push(record.clone());
                return DispatchOutcome::Executed(record);
            }
        }

        // 5. Side-effect guards.
        if let Some(sentinel) = self.guard(tool_name, &arguments) {
            let record = ToolCallRecord {
                call_id,
                tool_name: tool_name.to_string(),
                arguments: arguments.clone(),
                status: ToolCallStatus::Success,
                result: Some(sentinel),
                error: None,
                duration_ms: start.elapsed().as_millis() as u64,
                started_at,
            };
            self.tool_log.push(record.clone());
            return DispatchOutcome::Guarded(record);
        }

        // 6. Execute, with the per-tool wall-clock timeout.
        let timeout = Duration::from_secs(self.config.tool_timeout_secs);
        let outcome = tokio::time::timeout(timeout, executor(arguments.clone())).await;

        let (status, result, error) = match outcome {
            Ok(Ok(value)) => (ToolCallStatus::Success, Some(value), None),
            Ok(Err(message)) => (ToolCallStatus::Failed, None, Some(message)),
            Err(_) => (ToolCallStatus::Timeout, None, Some(format!("tool '{tool_name}' timed out after {}s", self.config.tool_timeout_secs))),
        };

        // 7. Post-deadline gate.
        if self.deadline_passed() {
            let record = ToolCallRecord {
                call_id,
                tool_name: tool_name.to_string(),
                arguments,
                status,
                result,
                error,
                duration_ms: start.elapsed().as_millis() as u64,
                started_at,
            };
            self.tool_log.push(record.clone());
            return DispatchOutcome::Capped(record, CapTripped::Deadline(self.config.run_timeout_secs));
        }

        // 8. Record.
        let record = ToolCallRecord {
            call_id,
            tool_name: tool_name.to_string(),
            arguments,
            status,
            result: result.clone(),
            error,
            duration_ms: start.elapsed().as_millis() as u64,
            started_at,
        };
        self.tool_log.push(record.clone());

        // 9. Cache write, success + opted-in only.
        if status == ToolCallStatus::Success && cache_policy == CachePolicy::Cacheable {
            if let Some(value) = result {
                self.result_cache.insert(cache_key, value);
            }
        }

        // Post-execution bookkeeping for guard state transitions that
        // only take effect once a call actually succeeds.
        if status == ToolCallStatus::Success {
            match tool_name {
                "web_search" | "search" => {
                    self.web_search_seen.insert(normalize_query(&record.arguments));
                }
                "store_memory" => {
                    if let Some(content) = record.arguments.get("content").and_then(|v| v.as_str()) {
                        self.stored_hashes.insert(content_hash(content));
                        self.answer_committed = true;
                    }
                }
                _ => {}
            }
        }

        DispatchOutcome::Executed(record)
    }

    fn push_failed(
        &mut self,
        call_id: &str,
        tool_name: &str,
        arguments: &Value,
        started_at: chrono::DateTime<chrono::Utc>,
        start: Instant,
        message: &str,
    ) -> ToolCallRecord {
        let record = ToolCallRecord {
            call_id: call_id.to_string(),
            tool_name: tool_name.to_string(),
            arguments: arguments.clone(),
            status: ToolCallStatus::Failed,
            result: None,
            error: Some(message.to_string()),
            duration_ms: start.elapsed().as_millis() as u64,
            started_at,
        };
        self.tool_log.push(record.clone());
        record
    }

    fn consecutive_streak(&self, key: &str) -> usize {
        self.tool_log
            .iter()
            .rev()
            .take_while(|r| canonical_key(&r.tool_name, &r.arguments) == key)
            .count()
    }

    /// Side-effect guards, spec §4.1 step 5. Returns `Some(sentinel)` when
    /// the call is short-circuited without calling the executor.
    fn guard(&mut self, tool_name: &str, arguments: &Value) -> Option<Value> {
        match tool_name {
            "search_memory" => {
                if self.memory_searched {
                    return Some(serde_json::json!({
                        "content": "ERROR: search_memory can only be called ONCE per query. Use the results already retrieved, or proceed to web_search.",
                        "metadata": { "blocked": true, "reason": "single_attempt_rule" },
                    }));
                }
                self.memory_searched = true;
                None
            }
            "web_search" | "search" => {
                if self.answer_committed {
                    return Some(serde_json::json!({
                        "content": "SKIPPED: an answer has already been stored for this run.",
                        "metadata": { "blocked": true, "reason": "answer_already_committed" },
                    }));
                }
                let normalized = normalize_query(arguments);
                if self.web_search_seen.contains(&normalized) {
                    return Some(serde_json::json!({
                        "content": "SKIPPED: this query was already searched in this turn.",
                        "metadata": { "blocked": true, "reason": "duplicate_query" },
                    }));
                }
                None
            }
            "store_memory" => {
                let content = arguments.get("content").and_then(|v| v.as_str()).unwrap_or_default();
                let lower = content.to_lowercase();
                let telemetry_hit = self
                    .config
                    .store_memory_reject_substrings
                    .iter()
                    .any(|needle| lower.contains(&needle.to_lowercase()));
                let metadata_hit = arguments
                    .get("metadata")
                    .and_then(|m| m.as_object())
                    .is_some_and(|m| m.contains_key("status") || m.contains_key("query"));
                if telemetry_hit || metadata_hit {
                    return Some(serde_json::json!({
                        "content": "SKIPPED: payload looks like telemetry, not a citable answer.",
                        "metadata": { "blocked": true, "reason": "telemetry_like_payload" },
                    }));
                }
                if !content.is_empty() && self.stored_hashes.contains(&content_hash(content)) {
                    return Some(serde_json::json!({
                        "content": "SKIPPED: Duplicate content already stored this turn.",
                        "metadata": { "blocked": true, "reason": "duplicate_content" },
                    }));
                }
                None
            }
            _ => None,
        }
    }
}

fn normalize_query(arguments: &Value) -> String {
    arguments
        .get("query")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .trim()
        .to_lowercase()
}

fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex_string(&hasher.finalize())
}

fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Canonical, deterministically-key-sorted JSON serialization, used for
/// both the cache key and the loop guard's equality check.
pub fn canonicalize(value: &Value) -> String {
    serde_json::to_string(&sort_keys(value)).unwrap_or_default()
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut sorted = serde_json::Map::new();
            for (k, v) in entries {
                sorted.insert(k.clone(), sort_keys(v));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

/// `(tool_name, canonical(parameters \ {_cached}))` — the equality key
/// the loop guard compares consecutive log entries against.
fn canonical_key(tool_name: &str, arguments: &Value) -> String {
    let mut stripped = arguments.clone();
    if let Value::Object(ref mut map) = stripped {
        map.remove("_cached");
    }
    format!("{tool_name}:{}", canonicalize(&stripped))
}

impl From<AgentConfig> for RunContext {
    fn from(config: AgentConfig) -> Self {
        RunContext::new(config, None)
    }
}

/// Translate a cap trip into the domain `AgentError` the rest of the
/// crate surfaces.
pub fn cap_to_agent_error(cap: &CapTripped) -> AgentError {
    match cap {
        CapTripped::Deadline(limit_secs) => AgentError::RuntimeBudgetExceeded { limit_secs: *limit_secs },
        CapTripped::Budget(BudgetOrLoop::Budget { limit }) => AgentError::BudgetExceeded { limit: *limit },
        CapTripped::Budget(BudgetOrLoop::Loop { tool_name, repeats }) => {
            AgentError::LoopDetected { tool_name: tool_name.clone(), repeats: *repeats }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> AgentConfig {
        AgentConfig::default()
    }

    #[tokio::test]
    async fn budget_gate_trips_after_max_tool_calls() {
        let mut ctx = RunContext::new(AgentConfig { max_tool_calls: 2, ..cfg() }, None);
        for i in 0..2 {
            let out = ctx
                .dispatch("read_file", serde_json::json!({"path": format!("/tmp/{i}")}), CachePolicy::NotCacheable, |_| async {
                    Ok(serde_json::json!("ok"))
                })
                .await;
            assert!(matches!(out, DispatchOutcome::Executed(_)));
        }
        let out = ctx
            .dispatch("read_file", serde_json::json!({"path": "/tmp/3"}), CachePolicy::NotCacheable, |_| async { Ok(serde_json::json!("ok")) })
            .await;
        assert!(matches!(out, DispatchOutcome::Capped(_, CapTripped::Budget(BudgetOrLoop::Budget { .. }))));
    }

    #[tokio::test]
    async fn loop_guard_trips_on_third_identical_call() {
        let mut ctx = RunContext::new(cfg(), None);
        let args = serde_json::json!({"query": "X"});
        for _ in 0..2 {
            let out = ctx
                .dispatch("search_memory", args.clone(), CachePolicy::Cacheable, |_| async { Ok(serde_json::json!({"hits": []})) })
                .await;
            assert!(matches!(out, DispatchOutcome::Executed(_) | DispatchOutcome::Guarded(_)));
        }
        let out = ctx
            .dispatch("search_memory", args.clone(), CachePolicy::Cacheable, |_| async { Ok(serde_json::json!({"hits": []})) })
            .await;
        assert!(matches!(out, DispatchOutcome::Capped(_, CapTripped::Budget(BudgetOrLoop::Loop { .. }))));
    }

    #[tokio::test]
    async fn search_memory_second_call_is_guarded_not_looped() {
        let mut ctx = RunContext::new(cfg(), None);
        let args = serde_json::json!({"query": "X"});
        let first = ctx
            .dispatch("search_memory", args.clone(), CachePolicy::Cacheable, |_| async { Ok(serde_json::json!({"hits": []})) })
            .await;
        assert!(matches!(first, DispatchOutcome::Executed(_)));
        let second = ctx
            .dispatch("search_memory", args.clone(), CachePolicy::Cacheable, |_| async { Ok(serde_json::json!({"hits": []})) })
            .await;
        match second {
            DispatchOutcome::Guarded(record) => {
                assert_eq!(record.status, ToolCallStatus::Success);
                let result = record.result.unwrap();
                assert_eq!(result["metadata"]["reason"], "single_attempt_rule");
            }
            other => panic!("expected Guarded, got {other:?}", other = matches!(other, DispatchOutcome::Executed(_))),
        }
    }

    #[tokio::test]
    async fn duplicate_store_memory_is_skipped() {
        let mut ctx = RunContext::new(cfg(), None);
        let args = serde_json::json!({"content": "the sky is blue"});
        let first = ctx
            .dispatch("store_memory", args.clone(), CachePolicy::NotCacheable, |_| async { Ok(serde_json::json!({"id": "doc-1"})) })
            .await;
        assert!(matches!(first, DispatchOutcome::Executed(_)));
        let second = ctx
            .dispatch("store_memory", args.clone(), CachePolicy::NotCacheable, |_| async { Ok(serde_json::json!({"id": "doc-2"})) })
            .await;
        match second {
            DispatchOutcome::Guarded(record) => {
                assert_eq!(record.result.unwrap()["content"], "SKIPPED: Duplicate content already stored this turn.");
            }
            _ => panic!("expected duplicate store to be guarded"),
        }
    }

    #[tokio::test]
    async fn store_memory_rejects_telemetry_like_payload() {
        let mut ctx = RunContext::new(cfg(), None);
        let args = serde_json::json!({"content": "status: no results found for initial query"});
        let out = ctx
            .dispatch("store_memory", args, CachePolicy::NotCacheable, |_| async { Ok(serde_json::json!({"id": "doc-1"})) })
            .await;
        assert!(matches!(out, DispatchOutcome::Guarded(_)));
    }

    #[tokio::test]
    async fn cache_hit_skips_executor_and_marks_cached() {
        let mut ctx = RunContext::new(cfg(), None);
        let args = serde_json::json!({"path": "/tmp/a"});
        let first = ctx
            .dispatch("read_file", args.clone(), CachePolicy::Cacheable, |_| async { Ok(serde_json::json!("contents")) })
            .await;
        assert!(matches!(first, DispatchOutcome::Executed(_)));
        let second = ctx
            .dispatch("read_file", args.clone(), CachePolicy::Cacheable, |_| async {
                panic!("executor must not run on cache hit")
            })
            .await;
        match second {
            DispatchOutcome::Executed(record) => {
                assert_eq!(record.arguments["_cached"], true);
                assert_eq!(record.result.unwrap(), serde_json::json!("contents"));
            }
            _ => panic!("expected cache hit to still report Executed"),
        }
    }

    #[tokio::test]
    async fn deadline_gate_fails_once_elapsed() {
        let mut ctx = RunContext::new(cfg(), Some(0));
        tokio::time::sleep(Duration::from_millis(5)).await;
        let out = ctx
            .dispatch("read_file", serde_json::json!({"path": "/tmp/a"}), CachePolicy::NotCacheable, |_| async { Ok(serde_json::json!("ok")) })
            .await;
        assert!(matches!(out, DispatchOutcome::Capped(_, CapTripped::Deadline(_))));
    }

    #[test]
    fn canonicalize_is_order_independent() {
        let a = serde_json::json!({"b": 1, "a": 2});
        let b = serde_json::json!({"a": 2, "b": 1});
        assert_eq!(canonicalize(&a), canonicalize(&b));
    }
}
