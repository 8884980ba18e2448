//! Per-step evaluation state shared with expressions.
//!
//! [`EvalContext`] is bound as `this` in every evaluation. Domain functions
//! called while rendering record side-channel signals on it (an error, a
//! return value, queued raw bytes, range sources) and the caller drains them
//! right after the evaluation returns. [`EvalData`] is the binding map an
//! expression is rendered against.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use indexmap::IndexMap;
use minijinja::value::{from_args, Object, ObjectRepr};
use minijinja::{Error as TemplateError, ErrorKind, State, Value};
use serde::Serialize;

use crate::document::{RemoteVarSpec, TemplateDocument};
use crate::field_map::FieldValue;
use crate::project::ProjectInfo;

/// The generation phase an evaluation runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Phase {
    #[default]
    #[serde(rename = "env")]
    Envs,
    #[serde(rename = "vars")]
    Vars,
    #[serde(rename = "remoteVars")]
    RemoteVars,
    #[serde(rename = "templates")]
    Templates,
    #[serde(rename = "executes-pre")]
    ExecutePre,
    #[serde(rename = "executes-post")]
    ExecutePost,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Envs => "env",
            Phase::Vars => "vars",
            Phase::RemoteVars => "remoteVars",
            Phase::Templates => "templates",
            Phase::ExecutePre => "executes-pre",
            Phase::ExecutePost => "executes-post",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Default)]
struct Scratch {
    phase: Phase,
    name: String,
    data: Value,
    error: Option<String>,
    return_value: Option<Value>,
    write_queue: VecDeque<Vec<u8>>,
    path_range: Option<Vec<Value>>,
}

#[derive(Debug)]
struct Shared {
    document: Mutex<TemplateDocument>,
    project: ProjectInfo,
    scratch: Mutex<Scratch>,
}

/// Handle on the evaluation context of one run. Clones share state.
#[derive(Debug, Clone)]
pub struct EvalContext {
    shared: Arc<Shared>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl EvalContext {
    pub fn new(document: TemplateDocument, project: ProjectInfo) -> Self {
        Self {
            shared: Arc::new(Shared {
                document: Mutex::new(document),
                project,
                scratch: Mutex::new(Scratch::default()),
            }),
        }
    }

    /// Locks the document. Never hold the guard across an evaluation:
    /// domain functions lock it too.
    pub fn document(&self) -> MutexGuard<'_, TemplateDocument> {
        lock(&self.shared.document)
    }

    pub fn project(&self) -> &ProjectInfo {
        &self.shared.project
    }

    /// Switches to a new current item.
    pub fn enter(&self, phase: Phase, name: &str, data: Value) {
        let mut scratch = lock(&self.shared.scratch);
        scratch.phase = phase;
        scratch.name = name.to_string();
        scratch.data = data;
    }

    pub fn phase(&self) -> Phase {
        lock(&self.shared.scratch).phase
    }

    pub fn name(&self) -> String {
        lock(&self.shared.scratch).name.clone()
    }

    pub fn data(&self) -> Value {
        lock(&self.shared.scratch).data.clone()
    }

    pub fn set_data(&self, data: Value) {
        lock(&self.shared.scratch).data = data;
    }

    /// Registers an error; the running evaluation fails once it returns.
    pub fn fail<S: Into<String>>(&self, message: S) {
        lock(&self.shared.scratch).error = Some(message.into());
    }

    pub fn take_error(&self) -> Option<String> {
        lock(&self.shared.scratch).error.take()
    }

    pub fn set_return(&self, value: Value) {
        lock(&self.shared.scratch).return_value = Some(value);
    }

    pub fn take_return(&self) -> Option<Value> {
        lock(&self.shared.scratch).return_value.take()
    }

    /// Queues a raw byte block for the file being written.
    pub fn push_bytes(&self, bytes: Vec<u8>) {
        lock(&self.shared.scratch).write_queue.push_back(bytes);
    }

    pub fn take_writes(&self) -> VecDeque<Vec<u8>> {
        std::mem::take(&mut lock(&self.shared.scratch).write_queue)
    }

    pub fn clear_writes(&self) {
        lock(&self.shared.scratch).write_queue.clear();
    }

    pub fn set_path_range(&self, sources: Vec<Value>) {
        lock(&self.shared.scratch).path_range = Some(sources);
    }

    pub fn take_path_range(&self) -> Option<Vec<Value>> {
        lock(&self.shared.scratch).path_range.take()
    }

    /// Clears every pending signal.
    pub fn reset(&self) {
        let mut scratch = lock(&self.shared.scratch);
        scratch.error = None;
        scratch.return_value = None;
        scratch.write_queue.clear();
        scratch.path_range = None;
    }

    /// Declared env value, or the process environment when undeclared.
    pub fn env(&self, name: &str) -> Option<String> {
        let declared = self
            .document()
            .envs
            .as_ref()
            .and_then(|envs| envs.get(name))
            .and_then(|v| v.as_str().map(str::to_string));
        declared.or_else(|| std::env::var(name).ok())
    }

    pub fn var(&self, name: &str) -> Option<FieldValue> {
        self.document().vars.as_ref().and_then(|vars| vars.get(name)).cloned()
    }

    pub fn remote_var(&self, name: &str) -> Option<RemoteVarSpec> {
        self.document().remote_var(name).cloned()
    }

    /// The resolved response, or `None` while unresolved.
    pub fn remote_var_response(&self, name: &str) -> Value {
        self.document()
            .remote_var(name)
            .and_then(|spec| spec.response.as_ref())
            .map(Value::from_serialize)
            .unwrap_or(Value::from(()))
    }

    /// A `top` binding viewing the live document.
    pub fn top(&self) -> Value {
        Value::from_object(DocumentView(self.clone()))
    }

    fn remote_var_value(&self, name: &str) -> Value {
        self.remote_var(name).map(|spec| Value::from_serialize(&spec)).unwrap_or(Value::from(()))
    }

    fn var_value(&self, name: &str) -> Value {
        self.var(name).map(|v| Value::from(&v)).unwrap_or(Value::from(()))
    }
}

/// Looks up `this` in the running template.
pub fn this_context(state: &State) -> Result<EvalContext, TemplateError> {
    state
        .lookup("this")
        .and_then(|value| value.downcast_object_ref::<EvalContext>().cloned())
        .ok_or_else(|| {
            TemplateError::new(ErrorKind::InvalidOperation, "no evaluation context bound as 'this'")
        })
}

fn group_names(args: &[Value]) -> Vec<String> {
    args.iter().filter_map(|v| v.as_str().map(str::to_string)).collect()
}

impl Object for EvalContext {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }

    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        match key.as_str()? {
            "type" => Some(Value::from(self.phase().as_str())),
            "name" => Some(Value::from(self.name())),
            "data" => Some(self.data()),
            _ => None,
        }
    }

    fn call_method(
        self: &Arc<Self>,
        _state: &State<'_, '_>,
        method: &str,
        args: &[Value],
    ) -> Result<Value, TemplateError> {
        let project = self.project();
        match method {
            "error" => {
                let (message,): (String,) = from_args(args)?;
                self.fail(message);
                Ok(Value::from(""))
            }
            "return" => {
                let (value,): (Value,) = from_args(args)?;
                self.set_return(value);
                Ok(Value::from(""))
            }
            "env" => {
                let (name,): (&str,) = from_args(args)?;
                Ok(Value::from(self.env(name).unwrap_or_default()))
            }
            "var" => {
                let (name,): (&str,) = from_args(args)?;
                Ok(self.var_value(name))
            }
            "remoteVar" => {
                let (name,): (&str,) = from_args(args)?;
                Ok(self.remote_var_value(name))
            }
            "remoteVarResponse" => {
                let (name,): (&str,) = from_args(args)?;
                Ok(self.remote_var_response(name))
            }
            "productName" => Ok(Value::from(project.product.name.as_str())),
            "moduleName" => Ok(Value::from(project.name.as_str())),
            "moduleDesc" => Ok(Value::from(project.desc.as_str())),
            "versionName" => Ok(Value::from(project.version.name.as_str())),
            "product" => Ok(Value::from_serialize(&project.product)),
            "version" => Ok(Value::from_serialize(&project.version)),
            "currentDepends" => {
                Ok(Value::from_serialize(project.current_depends(&group_names(args))))
            }
            "currentPluginDepends" => {
                Ok(Value::from_serialize(project.current_plugin_depends(&group_names(args))))
            }
            "dependGroup" => {
                let (name,): (&str,) = from_args(args)?;
                Ok(project.depend_group(name).map(Value::from_serialize).unwrap_or(Value::from(())))
            }
            _ => Err(TemplateError::new(
                ErrorKind::UnknownMethod,
                format!("this has no method named {method}"),
            )),
        }
    }
}

/// `top`: read access to the live template document.
#[derive(Debug)]
struct DocumentView(EvalContext);

impl Object for DocumentView {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }

    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        let document = self.0.document();
        let value = match key.as_str()? {
            "imports" => Value::from_serialize(&document.imports),
            "envs" => Value::from_object(document.envs.clone().unwrap_or_default()),
            "vars" => Value::from_object(document.vars.clone().unwrap_or_default()),
            "remoteVars" => Value::from_serialize(&document.remote_vars),
            "templates" => Value::from_serialize(&document.templates),
            "executes" => Value::from_serialize(&document.executes),
            "shell" => Value::from(document.shell.current()),
            "comments" => Value::from_serialize(&document.comments),
            _ => return None,
        };
        Some(value)
    }
}

/// Bindings an expression is rendered against: `Project`, `top`, `this` and
/// the synthetic `k{N}`/`v{N}` range bindings.
#[derive(Debug, Clone, Default)]
pub struct EvalData {
    values: IndexMap<String, Value>,
}

impl EvalData {
    /// The standard bindings of a run.
    pub fn new(context: &EvalContext) -> Self {
        let mut data = Self::default();
        data.bind("Project", Value::from_serialize(context.project()));
        data.bind("top", context.top());
        data.bind("this", Value::from_object(context.clone()));
        data
    }

    pub fn bind<K: Into<String>>(&mut self, key: K, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn unbind(&mut self, key: &str) -> Option<Value> {
        self.values.shift_remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// The bindings as a template context.
    pub fn to_value(&self) -> Value {
        self.values.iter().map(|(k, v)| (k.as_str(), v.clone())).collect()
    }
}
