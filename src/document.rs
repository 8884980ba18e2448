//! The template document: declared envs, vars, remote variables, file
//! templates, execution hooks and shell configuration, plus the merge rules
//! used to compose imported documents.

use std::fmt;

use indexmap::IndexMap;
use serde::de::{self, DeserializeSeed, Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_SHELL, SHELL_PLATFORM};
use crate::error::{Error, Result};
use crate::field_map::OrderedFieldMap;
use crate::remote::ResponseInfo;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TemplateDocument {
    /// Local paths or http(s) URLs of documents merged underneath this one
    #[serde(rename = "import")]
    pub imports: Vec<String>,
    pub envs: Option<OrderedFieldMap>,
    pub vars: Option<OrderedFieldMap>,
    pub remote_vars: Option<RemoteVarMap>,
    /// Path expression -> file spec
    pub templates: IndexMap<String, FileSpec>,
    pub executes: Option<Executes>,
    pub shell: ShellConfig,
    /// Free-form documentation, ignored by evaluation
    pub comments: Option<serde_yaml::Value>,
}

/// One templated output entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileSpec {
    /// Expression naming a source file copied verbatim; wins over `content`
    pub path: String,
    /// Expression producing the file body
    pub content: String,
    pub is_dir: bool,
    /// Expression registering iteration sources through `pathRange`
    pub range: String,
    pub comment: String,
    pub ignore: bool,
}

/// Declarative HTTP call whose parsed response becomes a variable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoteVarSpec {
    /// `http` or `https`
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    pub method: String,
    pub headers: Option<OrderedFieldMap>,
    pub request_params: Option<OrderedFieldMap>,
    pub request_form_data: Option<OrderedFieldMap>,
    pub request_upload_files: Option<UploadFiles>,
    pub request_body: String,
    pub response_judge: String,
    /// `|`-separated stages: `text`, `json`, `hex`, `base64`
    pub response_parser: String,
    pub post_response_parser: String,
    pub skip_https_verify_cert: bool,
    #[serde(skip)]
    pub response: Option<ResponseInfo>,
}

/// Multipart upload: file parts plus flat text fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadFiles {
    pub files: Option<OrderedFieldMap>,
    pub data: Option<OrderedFieldMap>,
}

impl UploadFiles {
    pub fn is_empty(&self) -> bool {
        self.files.as_ref().is_none_or(OrderedFieldMap::is_empty)
            && self.data.as_ref().is_none_or(OrderedFieldMap::is_empty)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Executes {
    pub pre: Vec<String>,
    pub post: Vec<String>,
}

/// Ordered remote variable declarations. A `null` entry is a declared but
/// empty variable.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct RemoteVarMap(pub IndexMap<String, Option<RemoteVarSpec>>);

impl RemoteVarMap {
    pub fn get(&self, name: &str) -> Option<&RemoteVarSpec> {
        self.0.get(name).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut RemoteVarSpec> {
        self.0.get_mut(name).and_then(Option::as_mut)
    }

    pub fn set(&mut self, name: impl Into<String>, spec: Option<RemoteVarSpec>) {
        self.0.insert(name.into(), spec);
    }

    pub fn keys(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Rejects entries without a URL while the node position is still known.
struct RemoteVarSeed<'a> {
    name: &'a str,
}

impl<'de> DeserializeSeed<'de> for RemoteVarSeed<'_> {
    type Value = Option<RemoteVarSpec>;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> std::result::Result<Self::Value, D::Error> {
        let spec = Option::<RemoteVarSpec>::deserialize(deserializer)?;
        if let Some(spec) = &spec {
            if spec.url.trim().is_empty() {
                return Err(de::Error::custom(format!(
                    "remote variable '{}' is missing url",
                    self.name
                )));
            }
        }
        Ok(spec)
    }
}

struct RemoteVarMapVisitor;

impl<'de> Visitor<'de> for RemoteVarMapVisitor {
    type Value = RemoteVarMap;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a mapping of remote variable names to request specs")
    }

    fn visit_unit<E: de::Error>(self) -> std::result::Result<Self::Value, E> {
        Ok(RemoteVarMap::default())
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Self::Value, A::Error> {
        let mut vars = IndexMap::new();
        while let Some(name) = access.next_key::<String>()? {
            let spec = access.next_value_seed(RemoteVarSeed { name: &name })?;
            vars.insert(name, spec);
        }
        Ok(RemoteVarMap(vars))
    }
}

impl<'de> Deserialize<'de> for RemoteVarMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_map(RemoteVarMapVisitor)
    }
}

/// Shell invocation prefix for hook commands.
///
/// Declared either as a bare string or as a mapping keyed by `windows` /
/// `unix`; an unresolved platform falls back to [`DEFAULT_SHELL`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ShellConfig {
    current: Option<String>,
}

impl ShellConfig {
    pub fn new<S: Into<String>>(shell: S) -> Self {
        Self { current: Some(shell.into()) }
    }

    pub fn current(&self) -> &str {
        self.current.as_deref().unwrap_or(DEFAULT_SHELL)
    }
}

impl<'de> Deserialize<'de> for ShellConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let current = match serde_yaml::Value::deserialize(deserializer)? {
            serde_yaml::Value::Null => None,
            serde_yaml::Value::String(s) => Some(s.trim().to_string()),
            serde_yaml::Value::Mapping(platforms) => platforms
                .iter()
                .find(|(k, _)| k.as_str().is_some_and(|k| k.eq_ignore_ascii_case(SHELL_PLATFORM)))
                .and_then(|(_, v)| v.as_str())
                .map(|s| s.trim().to_string()),
            _ => return Err(de::Error::custom("unsupported shell configuration")),
        };
        Ok(Self { current: current.filter(|s| !s.is_empty()) })
    }
}

fn merge_field_map(dest: &mut Option<OrderedFieldMap>, src: Option<OrderedFieldMap>) {
    match (dest.as_mut(), src) {
        (None, src) => *dest = src,
        (Some(dest), Some(src)) => {
            for (key, value) in src.iter() {
                dest.set(key.clone(), value.clone());
            }
        }
        (Some(_), None) => {}
    }
}

impl TemplateDocument {
    /// Parses a document from raw YAML (or JSON) bytes.
    /// Imports are left unresolved; see [`crate::loader::load_document`].
    pub fn from_slice(content: &[u8]) -> Result<Self> {
        if content.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_yaml::from_slice(content).map_err(Error::from_yaml)
    }

    /// Merges `other`'s envs, vars, remote variables and templates over this
    /// document. Existing keys keep their position, new keys are appended and
    /// `other` wins on collision. Hooks and shell are untouched.
    pub fn merge(&mut self, other: TemplateDocument) {
        merge_field_map(&mut self.envs, other.envs);
        merge_field_map(&mut self.vars, other.vars);

        match (self.remote_vars.as_mut(), other.remote_vars) {
            (None, src) => self.remote_vars = src,
            (Some(dest), Some(src)) => {
                for (name, spec) in src.0 {
                    dest.set(name, spec);
                }
            }
            (Some(_), None) => {}
        }

        for (path, spec) in other.templates {
            self.templates.insert(path, spec);
        }
    }

    /// Composes a document with its already-resolved imports.
    ///
    /// Imports are merged left to right into an empty accumulator, then the
    /// importing document's own declarations are merged on top. Hooks and
    /// shell come from the importing document only and are never merged.
    pub fn compose(imported: Vec<TemplateDocument>, document: TemplateDocument) -> Self {
        let mut accumulated = TemplateDocument::default();
        for doc in imported {
            accumulated.merge(doc);
        }

        let TemplateDocument { imports, envs, vars, remote_vars, templates, executes, shell, comments } =
            document;
        accumulated.imports = imports;
        accumulated.executes = executes;
        accumulated.shell = shell;
        accumulated.comments = comments;
        accumulated.merge(TemplateDocument {
            envs,
            vars,
            remote_vars,
            templates,
            ..Default::default()
        });
        accumulated
    }

    pub fn remote_var(&self, name: &str) -> Option<&RemoteVarSpec> {
        self.remote_vars.as_ref().and_then(|vars| vars.get(name))
    }

    pub fn pre_commands(&self) -> &[String] {
        self.executes.as_ref().map(|e| e.pre.as_slice()).unwrap_or_default()
    }

    pub fn post_commands(&self) -> &[String] {
        self.executes.as_ref().map(|e| e.post.as_slice()).unwrap_or_default()
    }
}
