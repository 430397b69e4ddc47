//! Worker/supervisor execution of snippets under a hard deadline

use crate::dataset::{Columns, Ohlcv};
use crate::error::{SandboxError, SandboxResult};
use crate::functions;
use crate::guard;
use crate::value::{MetricValue, extract_result};
use rhai::module_resolvers::DummyModuleResolver;
use rhai::{
    Array, Dynamic, Engine, EvalAltResult, INT, Map, ParseError,
    ParseErrorType, Scope,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, instrument, warn};

/// Name of the single mutable output binding
pub const RESULT_BINDING: &str = "result";

/// Interpreter limits and default deadline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Deadline used by [`SandboxExecutionRequest::with_default_deadline`]
    pub default_deadline: Duration,
    /// Snippets longer than this are rejected before parsing
    pub max_snippet_bytes: usize,
    /// Largest array a snippet may build; also caps indicator periods
    pub max_array_size: usize,
    /// Largest string a snippet may build
    pub max_string_size: usize,
    /// Most entries allowed in one map, `result` included
    pub max_map_size: usize,
    /// Deepest function call nesting
    pub max_call_levels: usize,
    /// Deepest expression nesting, applied to both statements and functions
    pub max_expr_depth: usize,
    /// Optional operation budget on top of the deadline
    pub max_operations: Option<u64>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            default_deadline: Duration::from_secs(10),
            max_snippet_bytes: 16 * 1024,
            max_array_size: 100_000,
            max_string_size: 10_000,
            max_map_size: 1_000,
            max_call_levels: 32,
            max_expr_depth: 64,
            max_operations: None,
        }
    }
}

/// One execution: snippet, dataset and deadline
#[derive(Debug, Clone)]
pub struct SandboxExecutionRequest {
    pub snippet: String,
    pub dataset: Vec<Ohlcv>,
    pub deadline: Duration,
}

impl SandboxExecutionRequest {
    pub fn new(snippet: impl Into<String>, dataset: Vec<Ohlcv>, deadline: Duration) -> Self {
        Self {
            snippet: snippet.into(),
            dataset,
            deadline,
        }
    }

    pub fn with_default_deadline(
        snippet: impl Into<String>,
        dataset: Vec<Ohlcv>,
        config: &SandboxConfig,
    ) -> Self {
        Self::new(snippet, dataset, config.default_deadline)
    }
}

/// Successful execution
#[derive(Debug, Clone, PartialEq)]
pub struct SandboxOutput {
    /// Contents of `result`; may be empty
    pub values: BTreeMap<String, MetricValue>,
    /// Interpreter operations performed
    pub operations: u64,
    pub elapsed: Duration,
}

/// Runs snippets on dedicated worker threads
///
/// The executor is cheap to share; each call spawns its own worker and
/// nothing is reused between calls.
#[derive(Debug, Default)]
pub struct SandboxExecutor {
    config: SandboxConfig,
    active: Arc<AtomicUsize>,
}

impl SandboxExecutor {
    pub fn new(config: SandboxConfig) -> Self {
        Self {
            config,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Worker threads that have not yet exited
    pub fn active_workers(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Run a snippet against its dataset.
    ///
    /// Returns as soon as the worker finishes or the deadline passes,
    /// whichever comes first. On timeout, or if this future is dropped
    /// early, the worker is told to stop and exits at its next operation.
    #[instrument(skip_all, fields(rows = request.dataset.len(), deadline = ?request.deadline))]
    pub async fn execute(&self, request: SandboxExecutionRequest) -> SandboxResult<SandboxOutput> {
        guard::check_snippet(&request.snippet, self.config.max_snippet_bytes)?;

        let deadline = request.deadline;
        let cancel = Arc::new(AtomicBool::new(false));
        let _cancel_on_drop = CancelOnDrop(Arc::clone(&cancel));
        let (tx, rx) = oneshot::channel();

        let worker = Worker {
            snippet: request.snippet,
            dataset: request.dataset,
            config: self.config.clone(),
            cancel,
            deadline,
        };
        let slot = WorkerSlot::acquire(&self.active);

        std::thread::Builder::new()
            .name("sandbox-worker".to_string())
            .spawn(move || {
                // Release the slot before reporting so callers never observe
                // a finished execution that still counts as active.
                let outcome = {
                    let _slot = slot;
                    worker.run()
                };
                // The supervisor may already have given up; nothing to do then.
                let _ = tx.send(outcome);
            })
            .map_err(|e| SandboxError::ComputeError(format!("failed to start worker: {e}")))?;

        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(outcome)) => {
                match &outcome {
                    Ok(output) => debug!(
                        values = output.values.len(),
                        operations = output.operations,
                        "Snippet finished"
                    ),
                    Err(e) => debug!(kind = e.kind(), error = %e, "Snippet failed"),
                }
                outcome
            }
            Ok(Err(_)) => Err(SandboxError::ComputeError(
                "worker exited without reporting a result".to_string(),
            )),
            Err(_) => {
                warn!(?deadline, "Snippet deadline exceeded, cancelling worker");
                Err(SandboxError::Timeout { deadline })
            }
        }
    }
}

/// Sets the cancellation token when the supervising future goes away.
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

/// Counts a live worker thread until dropped on that thread.
struct WorkerSlot(Arc<AtomicUsize>);

impl WorkerSlot {
    fn acquire(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(Arc::clone(counter))
    }
}

impl Drop for WorkerSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

struct Worker {
    snippet: String,
    dataset: Vec<Ohlcv>,
    config: SandboxConfig,
    cancel: Arc<AtomicBool>,
    deadline: Duration,
}

impl Worker {
    fn run(self) -> SandboxResult<SandboxOutput> {
        let started = Instant::now();
        let operations = Arc::new(AtomicU64::new(0));
        let engine = build_engine(&self.config, Arc::clone(&self.cancel), Arc::clone(&operations));
        let mut scope = bind_dataset(&self.dataset);

        let ast = engine
            .compile_with_scope(&scope, &self.snippet)
            .map_err(|e| classify_parse_error(&e))?;

        engine
            .run_ast_with_scope(&mut scope, &ast)
            .map_err(|e| classify_eval_error(*e, self.deadline))?;

        let result = scope.get_value::<Dynamic>(RESULT_BINDING).ok_or_else(|| {
            SandboxError::ContractViolation("`result` binding is missing".to_string())
        })?;

        Ok(SandboxOutput {
            values: extract_result(result)?,
            operations: operations.load(Ordering::Relaxed),
            elapsed: started.elapsed(),
        })
    }
}

fn build_engine(
    config: &SandboxConfig,
    cancel: Arc<AtomicBool>,
    operations: Arc<AtomicU64>,
) -> Engine {
    let mut engine = Engine::new_raw();

    engine
        .set_strict_variables(true)
        .set_max_array_size(config.max_array_size)
        .set_max_string_size(config.max_string_size)
        .set_max_map_size(config.max_map_size)
        .set_max_call_levels(config.max_call_levels)
        .set_max_expr_depths(config.max_expr_depth, config.max_expr_depth);

    if let Some(max) = config.max_operations {
        engine.set_max_operations(max);
    }

    for symbol in ["import", "export", "eval"] {
        engine.disable_symbol(symbol);
    }
    engine.set_module_resolver(DummyModuleResolver::new());

    // No output channel leaves the sandbox.
    engine.on_print(|_| {});
    engine.on_debug(|_, _, _| {});

    engine.on_progress(move |count| {
        operations.store(count, Ordering::Relaxed);
        if cancel.load(Ordering::Acquire) {
            Some(Dynamic::UNIT)
        } else {
            None
        }
    });

    engine
        .register_iterator::<Array>()
        .register_iterator::<std::ops::Range<INT>>()
        .register_iterator::<std::ops::RangeInclusive<INT>>();
    functions::register_allow_list(&mut engine, config.max_array_size);

    engine
}

fn bind_dataset(rows: &[Ohlcv]) -> Scope<'static> {
    let columns = Columns::from_rows(rows);
    let to_array = |values: Vec<f64>| -> Array { values.into_iter().map(Dynamic::from).collect() };

    let mut scope = Scope::new();
    scope
        .push_constant("open", to_array(columns.open))
        .push_constant("high", to_array(columns.high))
        .push_constant("low", to_array(columns.low))
        .push_constant("close", to_array(columns.close))
        .push_constant("volume", to_array(columns.volume))
        .push(RESULT_BINDING, Map::new());
    scope
}

fn classify_parse_error(err: &ParseError) -> SandboxError {
    match err.err_type() {
        ParseErrorType::VariableUndefined(name) => {
            SandboxError::CapabilityViolation(format!("unbound name `{name}`"))
        }
        ParseErrorType::ModuleUndefined(name) => {
            SandboxError::CapabilityViolation(format!("module `{name}` is not available"))
        }
        _ => SandboxError::ComputeError(format!("snippet does not parse: {err}")),
    }
}

fn classify_eval_error(err: EvalAltResult, deadline: Duration) -> SandboxError {
    match err {
        EvalAltResult::ErrorFunctionNotFound(signature, _) => {
            let name = function_name(&signature);
            if is_identifier(name) && !functions::is_allowed(name) {
                SandboxError::CapabilityViolation(format!(
                    "function `{name}` is not available in the sandbox"
                ))
            } else {
                SandboxError::ComputeError(format!("no matching overload: {signature}"))
            }
        }
        EvalAltResult::ErrorVariableNotFound(name, _) => {
            SandboxError::CapabilityViolation(format!("unbound name `{name}`"))
        }
        EvalAltResult::ErrorModuleNotFound(name, _) => {
            SandboxError::CapabilityViolation(format!("module `{name}` is not available"))
        }
        EvalAltResult::ErrorAssignmentToConstant(name, _) => {
            SandboxError::CapabilityViolation(format!("`{name}` is read-only"))
        }
        EvalAltResult::ErrorInFunctionCall(_, _, inner, _) => classify_eval_error(*inner, deadline),
        EvalAltResult::ErrorTerminated(..) => SandboxError::Timeout { deadline },
        EvalAltResult::ErrorTooManyOperations(_) => {
            SandboxError::ComputeError("operation budget exhausted".to_string())
        }
        other => SandboxError::ComputeError(other.to_string()),
    }
}

/// `"foo (f64, i64)"` -> `"foo"`
fn function_name(signature: &str) -> &str {
    signature
        .split(|c: char| c == '(' || c.is_whitespace())
        .next()
        .unwrap_or(signature)
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_')
}
