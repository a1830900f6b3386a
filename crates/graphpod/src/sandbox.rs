use std::fs;
use std::path::{Path, PathBuf};

use rustpython_pylib;
use rustpython_stdlib;
use rustpython_vm as vm;
use rustpython_vm::builtins::PyBaseException;
use rustpython_vm::scope::Scope;
use rustpython_vm::{Interpreter, Settings};
use tempfile::TempDir;

use crate::bridge::BridgeHandle;

const BRIDGE_GLOBAL: &str = "__graphpod_llm_call";
const SITE_GLOBAL: &str = "__graphpod_site";
const INPUT_GLOBAL: &str = "__graphpod_input";
const RESULT_GLOBAL: &str = "__graphpod_result";

/// The embedded interpreter plus its module directory. Owned by the worker
/// thread; never crosses threads after construction.
pub struct Sandbox {
    interpreter: Interpreter,
    scope: Scope,
    site_dir: TempDir,
    entry_point: Option<String>,
}

impl std::fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sandbox")
            .field("site_dir", &self.site_dir)
            .field("entry_point", &self.entry_point)
            .finish_non_exhaustive()
    }
}

impl Sandbox {
    pub fn new() -> anyhow::Result<Self> {
        let mut settings = Settings::default();
        settings
            .path_list
            .push(rustpython_pylib::LIB_PATH.to_owned());
        let interpreter = Interpreter::with_init(settings, init_stdlib);
        let scope = interpreter
            .enter(|vm: &vm::VirtualMachine| -> vm::PyResult<Scope> {
                Ok(vm.new_scope_with_builtins())
            })
            .map_err(|err: vm::PyRef<PyBaseException>| {
                anyhow::anyhow!("python init error: {err:?}")
            })?;
        let site_dir = TempDir::new()?;
        Ok(Self {
            interpreter,
            scope,
            site_dir,
            entry_point: None,
        })
    }

    pub fn site_dir(&self) -> &Path {
        self.site_dir.path()
    }

    /// Writes a module source into the sandbox's filesystem under its fixed
    /// per-module path.
    pub fn write_module(&self, module: &str, source: &str) -> anyhow::Result<PathBuf> {
        let path = self.site_dir.path().join(format!("{module}.py"));
        fs::write(&path, source)?;
        Ok(path)
    }

    /// Puts the module directory at the front of the interpreter's search
    /// path so written modules become importable.
    pub fn extend_module_path(&self) -> anyhow::Result<()> {
        let site = self.site_dir.path().to_string_lossy().to_string();
        let scope = self.scope.clone();
        self.enter(move |vm| {
            scope
                .globals
                .set_item(SITE_GLOBAL, vm.ctx.new_str(site.as_str()).into(), vm)?;
            vm.run_code_string(
                scope.clone(),
                "import sys\nsys.path.insert(0, __graphpod_site)\n",
                "<graphpod_path>".to_owned(),
            )?;
            Ok(())
        })
    }

    /// Registers the native bridge function and defines the `call_llm`
    /// wrapper around it. The wrapper coerces its argument to a string and
    /// converts any exception escaping the FFI boundary into an ordinary
    /// return value; it is published to `builtins` so the agent module can
    /// resolve it without importing anything.
    pub fn inject_bridge(&self, bridge: BridgeHandle) -> anyhow::Result<()> {
        let scope = self.scope.clone();
        self.enter(move |vm| {
            let bridge_fn = vm.new_function(
                BRIDGE_GLOBAL,
                move |prompt: String| -> vm::PyResult<String> { Ok(bridge.call(&prompt)) },
            );
            scope
                .globals
                .set_item(BRIDGE_GLOBAL, bridge_fn.into(), vm)?;
            let wrapper = r#"def call_llm(prompt):
    try:
        return __graphpod_llm_call(str(prompt))
    except Exception as exc:
        return "Error calling LLM: " + str(exc)

import builtins
builtins.call_llm = call_llm
"#;
            vm.run_code_string(scope.clone(), wrapper, "<graphpod_bridge>".to_owned())?;
            Ok(())
        })
    }

    /// Imports the agent module and binds its entry point for dispatch.
    pub fn import_agent(&mut self, module: &str, entry_point: &str) -> anyhow::Result<()> {
        let code = format!("from {module} import {entry_point}\n");
        let scope = self.scope.clone();
        self.enter(move |vm| {
            vm.run_code_string(scope.clone(), &code, "<graphpod_import>".to_owned())?;
            Ok(())
        })?;
        self.entry_point = Some(entry_point.to_owned());
        Ok(())
    }

    /// Runs one request through the agent entry point. The user text enters
    /// the interpreter as a marshalled string value, never as spliced source,
    /// so delimiter characters in it cannot corrupt the submitted program.
    pub fn run_agent(&self, message: &str) -> anyhow::Result<String> {
        let entry = self
            .entry_point
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("agent entry point not bound"))?;
        let code = format!("{RESULT_GLOBAL} = str({entry}({INPUT_GLOBAL}))\n");
        let scope = self.scope.clone();
        self.enter(|vm| {
            scope
                .globals
                .set_item(INPUT_GLOBAL, vm.ctx.new_str(message).into(), vm)?;
            vm.run_code_string(scope.clone(), &code, "<graphpod_dispatch>".to_owned())?;
            let value = scope.globals.get_item(RESULT_GLOBAL, vm)?;
            value.try_to_value::<String>(vm)
        })
    }

    fn enter<T>(&self, f: impl FnOnce(&vm::VirtualMachine) -> vm::PyResult<T>) -> anyhow::Result<T> {
        self.interpreter
            .enter(|vm| f(vm).map_err(|exc| anyhow::anyhow!(render_exception(vm, exc))))
    }
}

fn render_exception(vm: &vm::VirtualMachine, exc: vm::PyRef<PyBaseException>) -> String {
    let obj: vm::PyObjectRef = exc.into();
    match obj.str(vm) {
        Ok(text) => text.as_str().to_owned(),
        Err(_) => format!("{obj:?}"),
    }
}

fn init_stdlib(vm: &mut vm::VirtualMachine) {
    vm.add_native_modules(rustpython_stdlib::get_module_inits());
    vm.add_frozen(rustpython_pylib::FROZEN_STDLIB);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testsupport::FixedBackend;
    use std::sync::Arc;
    use tokio::runtime::Handle;

    #[test]
    fn run_agent_requires_a_bound_entry_point() {
        let sandbox = Sandbox::new().expect("sandbox");
        let err = sandbox.run_agent("hi").expect_err("should fail");
        assert!(err.to_string().contains("entry point not bound"));
    }

    #[test]
    fn imported_module_handles_requests() {
        let mut sandbox = Sandbox::new().expect("sandbox");
        sandbox
            .write_module("agent", "def run_graph(user_input):\n    return 'echo:' + user_input\n")
            .expect("write module");
        sandbox.extend_module_path().expect("extend path");
        sandbox.import_agent("agent", "run_graph").expect("import");
        let result = sandbox.run_agent("hi").expect("run");
        assert_eq!(result, "echo:hi");
    }

    #[test]
    fn agent_exception_surfaces_as_error_detail() {
        let mut sandbox = Sandbox::new().expect("sandbox");
        sandbox
            .write_module("agent", "def run_graph(x):\n    raise ValueError('boom')\n")
            .expect("write module");
        sandbox.extend_module_path().expect("extend path");
        sandbox.import_agent("agent", "run_graph").expect("import");
        let err = sandbox.run_agent("hi").expect_err("should fail");
        assert!(
            err.to_string().contains("boom"),
            "detail should carry the raised message: {err}"
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn call_llm_is_visible_from_the_agent_module() {
        let runtime = Handle::current();
        // The sandbox must live entirely on one plain thread; only the
        // runtime handle crosses over.
        let result = std::thread::spawn(move || -> anyhow::Result<String> {
            let mut sandbox = Sandbox::new()?;
            sandbox.write_module("agent", "def run_graph(x):\n    return call_llm(x)\n")?;
            sandbox.extend_module_path()?;
            sandbox.inject_bridge(BridgeHandle::new(
                Arc::new(FixedBackend::new("pong")),
                runtime,
            ))?;
            sandbox.import_agent("agent", "run_graph")?;
            sandbox.run_agent("ping")
        })
        .join()
        .expect("sandbox thread")
        .expect("run");
        assert_eq!(result, "pong");
    }
}
