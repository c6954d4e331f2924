//! QuickJS script backend

use std::sync::Arc;

use rquickjs::{CatchResultExt, CaughtError, Context, Ctx, Function, Module, Object, Runtime, Value};

use dlt_node_core::{ScriptError, ScriptFactory, ScriptInstance};

use crate::host::{self, HostCapabilities};

/// Backend identifier
pub const BACKEND_NAME: &str = "quickjs";

const PRELUDE: &str = include_str!("prelude.js");
const ENTRY_GLOBAL: &str = "__dlt_entry";

/// Format a CaughtError with its message and stack trace
fn format_js_error(error: &CaughtError<'_>) -> String {
    match error {
        CaughtError::Exception(ex) => {
            let message = ex.message().unwrap_or_else(|| "Unknown error".to_string());
            match ex.stack() {
                Some(stack) if !stack.is_empty() => format!("{message}\n{stack}"),
                _ => message,
            }
        }
        CaughtError::Value(val) => format!("Exception: {val:?}"),
        CaughtError::Error(e) => e.to_string(),
    }
}

fn json_stringify<'js>(ctx: &Ctx<'js>, value: Value<'js>) -> rquickjs::Result<Option<String>> {
    let json: Object = ctx.globals().get("JSON")?;
    let stringify: Function = json.get("stringify")?;
    stringify.call((value,))
}

fn engine_error(e: rquickjs::Error) -> ScriptError {
    ScriptError::Engine(e.to_string())
}

/// Factory producing one QuickJS runtime per executor slot
///
/// Every instance gets its own runtime and context, the host function
/// bundle and the helper prelude, then evaluates the payload as an ES
/// module. The entry point is the module's `default` export, or `run` when
/// there is no default.
pub struct QuickJsFactory {
    caps: Arc<HostCapabilities>,
    memory_limit: Option<usize>,
}

impl QuickJsFactory {
    /// Create a factory sharing `caps` across all instances
    pub fn new(caps: HostCapabilities) -> Self {
        Self {
            caps: Arc::new(caps),
            memory_limit: None,
        }
    }

    /// Cap each instance's JS heap at `bytes`
    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = Some(bytes);
        self
    }
}

impl ScriptFactory for QuickJsFactory {
    fn backend_name(&self) -> &str {
        BACKEND_NAME
    }

    fn load(&self, slot: usize, source: &str) -> Result<Box<dyn ScriptInstance>, ScriptError> {
        let runtime = Runtime::new().map_err(engine_error)?;
        if let Some(limit) = self.memory_limit {
            runtime.set_memory_limit(limit);
        }
        let context = Context::full(&runtime).map_err(engine_error)?;

        context.with(|ctx| -> Result<(), ScriptError> {
            host::install(&ctx, slot, &self.caps).map_err(engine_error)?;
            ctx.eval::<(), _>(PRELUDE).catch(&ctx).map_err(|e| {
                ScriptError::Engine(format!("prelude failed: {}", format_js_error(&e)))
            })?;

            let module = Module::declare(ctx.clone(), format!("slot-{slot}.js"), source)
                .catch(&ctx)
                .map_err(|e| ScriptError::Compile(format_js_error(&e)))?;
            let (module, promise) = module
                .eval()
                .catch(&ctx)
                .map_err(|e| ScriptError::Compile(format_js_error(&e)))?;
            promise
                .finish::<()>()
                .catch(&ctx)
                .map_err(|e| ScriptError::Compile(format_js_error(&e)))?;

            let entry: Function = module
                .get("default")
                .or_else(|_| module.get("run"))
                .map_err(|_| {
                    ScriptError::MissingEntryPoint(
                        "export a `default` or `run` function".to_string(),
                    )
                })?;
            ctx.globals().set(ENTRY_GLOBAL, entry).map_err(engine_error)?;
            Ok(())
        })?;

        tracing::trace!(slot, backend = BACKEND_NAME, "Script instance loaded");

        Ok(Box::new(QuickJsInstance {
            slot,
            context,
            _runtime: runtime,
        }))
    }
}

impl std::fmt::Debug for QuickJsFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuickJsFactory")
            .field("memory_limit", &self.memory_limit)
            .finish()
    }
}

/// One loaded script with its own runtime
pub struct QuickJsInstance {
    slot: usize,
    context: Context,
    _runtime: Runtime,
}

impl ScriptInstance for QuickJsInstance {
    fn invoke(&mut self) -> Result<String, ScriptError> {
        let slot = self.slot;
        self.context.with(|ctx| {
            let entry: Function = ctx.globals().get(ENTRY_GLOBAL).map_err(engine_error)?;
            let value: Value = entry
                .call(())
                .catch(&ctx)
                .map_err(|e| ScriptError::Runtime(format_js_error(&e)))?;

            if value.is_undefined() || value.is_null() {
                return Err(ScriptError::InvalidResult(format!(
                    "entry point on slot {slot} returned nothing"
                )));
            }
            if let Some(s) = value.as_string() {
                return s.to_string().map_err(engine_error);
            }

            json_stringify(&ctx, value).map_err(engine_error)?.ok_or_else(|| {
                ScriptError::InvalidResult("result is not JSON-serializable".to_string())
            })
        })
    }
}
