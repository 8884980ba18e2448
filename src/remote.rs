//! Remote variables: turns a declared HTTP call into a request, runs it with
//! `reqwest::blocking` and feeds the body through the response parser
//! pipeline.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use indexmap::IndexMap;
use minijinja::Value;
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde::Serialize;

use crate::context::{EvalContext, EvalData};
use crate::document::RemoteVarSpec;
use crate::error::{Error, Result};
use crate::field_map::{FieldValue, OrderedFieldMap};
use crate::renderer::Evaluator;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// What a resolved remote variable exposes to later expressions.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseInfo {
    pub status: u16,
    pub reason: String,
    pub headers: IndexMap<String, String>,
    /// Raw body while the judge runs, the parsed value afterwards
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    None,
    Raw(String),
    Form(Vec<(String, String)>),
    Multipart {
        files: Vec<(String, PathBuf)>,
        fields: Vec<(String, String)>,
    },
}

/// A request with every expression already evaluated.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub kind: String,
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
    pub skip_verify: bool,
}

impl PreparedRequest {
    fn has_header(&self, name: &str) -> bool {
        self.headers.iter().any(|(key, _)| key.eq_ignore_ascii_case(name))
    }
}

/// Resolves remote variables one at a time.
pub struct RemoteVarResolver<'a> {
    evaluator: &'a Evaluator,
    /// Base for relative upload file paths
    source_root: &'a Path,
}

impl<'a> RemoteVarResolver<'a> {
    pub fn new(evaluator: &'a Evaluator, source_root: &'a Path) -> Self {
        Self { evaluator, source_root }
    }

    /// Builds, sends and parses the request declared by `spec`.
    ///
    /// # Errors
    /// * `Error::RemoteVarError` for a missing url, an unsupported type, a
    ///   network failure, a rejected response or a parser failure
    /// * `Error::ExpressionError` if one of the request expressions fails
    pub fn resolve(
        &self,
        name: &str,
        spec: &RemoteVarSpec,
        data: &EvalData,
        context: &EvalContext,
    ) -> Result<ResponseInfo> {
        let request = self.prepare(name, spec, data, context)?;
        log::debug!("{name}: {} {}", request.method, request.url);
        self.execute(name, spec, &request, data, context)
    }

    /// Evaluates type, url, method, headers, query parameters and body.
    pub fn prepare(
        &self,
        name: &str,
        spec: &RemoteVarSpec,
        data: &EvalData,
        context: &EvalContext,
    ) -> Result<PreparedRequest> {
        let fail = |message: String| Error::RemoteVarError { name: name.to_string(), message };
        context.set_data(Value::from_serialize(spec));

        if spec.url.trim().is_empty() {
            return Err(fail("missing url".to_string()));
        }

        let kind = self.evaluator.evaluate(&spec.kind, data, context)?.0.trim().to_lowercase();
        if kind != "http" && kind != "https" {
            return Err(fail(format!("unsupported type '{kind}', expected http or https")));
        }

        let mut url = self.evaluator.evaluate(&spec.url, data, context)?.0.trim().to_string();
        if !url.starts_with(&kind) {
            url = format!("{kind}://{url}");
        }

        let method = self.evaluator.evaluate(&spec.method, data, context)?.0.trim().to_uppercase();
        let method = if method.is_empty() { "GET".to_string() } else { method };

        let headers = self.evaluate_pairs(spec.headers.as_ref(), data, context)?;

        let params = self.evaluate_pairs(spec.request_params.as_ref(), data, context)?;
        if !params.is_empty() {
            let query = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(params.iter())
                .finish();
            let separator = if url.contains('?') { '&' } else { '?' };
            url = format!("{url}{separator}{query}");
        }

        let body = self.prepare_body(spec, data, context)?;

        Ok(PreparedRequest {
            skip_verify: kind == "https" && spec.skip_https_verify_cert,
            kind,
            method,
            url,
            headers,
            body,
        })
    }

    /// First declared of raw body, form data and upload files wins.
    fn prepare_body(
        &self,
        spec: &RemoteVarSpec,
        data: &EvalData,
        context: &EvalContext,
    ) -> Result<RequestBody> {
        if !spec.request_body.trim().is_empty() {
            let (body, _) = self.evaluator.evaluate(&spec.request_body, data, context)?;
            return Ok(RequestBody::Raw(body));
        }

        if spec.request_form_data.as_ref().is_some_and(|form| !form.is_empty()) {
            let pairs = self.evaluate_pairs(spec.request_form_data.as_ref(), data, context)?;
            return Ok(RequestBody::Form(pairs));
        }

        match &spec.request_upload_files {
            Some(upload) if !upload.is_empty() => {
                let files = self
                    .evaluate_pairs(upload.files.as_ref(), data, context)?
                    .into_iter()
                    .map(|(field, path)| (field, self.source_root.join(path)))
                    .collect();
                let fields = self.evaluate_pairs(upload.data.as_ref(), data, context)?;
                Ok(RequestBody::Multipart { files, fields })
            }
            _ => Ok(RequestBody::None),
        }
    }

    /// Evaluates every value of `map` in declared order; list values become
    /// repeated pairs.
    fn evaluate_pairs(
        &self,
        map: Option<&OrderedFieldMap>,
        data: &EvalData,
        context: &EvalContext,
    ) -> Result<Vec<(String, String)>> {
        let Some(map) = map else {
            return Ok(Vec::new());
        };
        let mut pairs = Vec::with_capacity(map.len());
        for (key, value) in map.iter() {
            match self.evaluator.evaluate_field(value, data, context)? {
                FieldValue::Str(value) => pairs.push((key.clone(), value)),
                FieldValue::List(values) => {
                    pairs.extend(values.into_iter().map(|value| (key.clone(), value)))
                }
            }
        }
        Ok(pairs)
    }

    /// Sends `request`, applies the judge and the parser pipeline.
    pub fn execute(
        &self,
        name: &str,
        spec: &RemoteVarSpec,
        request: &PreparedRequest,
        data: &EvalData,
        context: &EvalContext,
    ) -> Result<ResponseInfo> {
        let fail = |message: String| Error::RemoteVarError { name: name.to_string(), message };

        let client = Client::builder()
            .danger_accept_invalid_certs(request.skip_verify)
            .build()
            .map_err(|e| fail(e.to_string()))?;
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|_| fail(format!("invalid method '{}'", request.method)))?;

        let mut builder = client.request(method, &request.url);
        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        builder = match &request.body {
            RequestBody::None => builder,
            RequestBody::Raw(body) => builder.body(body.clone()),
            RequestBody::Form(pairs) => {
                let encoded = url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(pairs.iter())
                    .finish();
                if !request.has_header(CONTENT_TYPE.as_str()) {
                    builder = builder.header(CONTENT_TYPE, FORM_CONTENT_TYPE);
                }
                builder.body(encoded)
            }
            RequestBody::Multipart { files, fields } => {
                let mut form = Form::new();
                for (field, path) in files {
                    let bytes = std::fs::read(path)
                        .map_err(|e| fail(format!("failed to read {}: {e}", path.display())))?;
                    let file_name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    form = form.part(field.clone(), Part::bytes(bytes).file_name(file_name));
                }
                for (field, value) in fields {
                    form = form.text(field.clone(), value.clone());
                }
                builder.multipart(form)
            }
        };

        let response = builder.send().map_err(|e| fail(e.to_string()))?;
        let status = response.status();
        let mut headers: IndexMap<String, String> = IndexMap::new();
        for (key, value) in response.headers() {
            let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
            headers
                .entry(key.as_str().to_string())
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(&value);
                })
                .or_insert(value);
        }
        let body = response.bytes().map_err(|e| fail(e.to_string()))?.to_vec();

        let mut info = ResponseInfo {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            data: Value::from_bytes(body.clone()),
        };

        if !spec.response_judge.trim().is_empty() {
            context.set_data(Value::from_serialize(&info));
            let (verdict, _) = self
                .evaluator
                .evaluate(&spec.response_judge, data, context)
                .map_err(|e| fail(format!("response judge failed: {e}")))?;
            if !verdict.trim().is_empty() {
                return Err(fail(verdict.trim().to_string()));
            }
        } else if status.as_u16() != 200 {
            return Err(fail(format!("{} {}", info.status, info.reason).trim_end().to_string()));
        }

        info.data = parse_response(&spec.response_parser, body).map_err(fail)?;

        if !spec.post_response_parser.trim().is_empty() {
            context.set_data(Value::from_serialize(&info));
            let (text, returned) =
                self.evaluator.evaluate(&spec.post_response_parser, data, context)?;
            info.data = returned.unwrap_or_else(|| Value::from(text));
        }

        Ok(info)
    }
}

/// Working value of the parser pipeline.
#[derive(Debug)]
enum Payload {
    Bytes(Vec<u8>),
    Text(String),
    Json(serde_json::Value),
}

impl Payload {
    fn text(&self) -> Cow<'_, str> {
        match self {
            Payload::Bytes(bytes) => String::from_utf8_lossy(bytes),
            Payload::Text(text) => Cow::Borrowed(text),
            Payload::Json(serde_json::Value::String(text)) => Cow::Borrowed(text),
            Payload::Json(json) => Cow::Owned(json.to_string()),
        }
    }

    fn into_value(self) -> Value {
        match self {
            Payload::Bytes(bytes) => Value::from_bytes(bytes),
            Payload::Text(text) => Value::from(text),
            Payload::Json(json) => Value::from_serialize(&json),
        }
    }
}

/// Runs `body` through the `|`-separated stages of `parser`, left to right.
/// An empty parser keeps the raw bytes.
pub fn parse_response(parser: &str, body: Vec<u8>) -> std::result::Result<Value, String> {
    let mut payload = Payload::Bytes(body);
    for stage in parser.split('|').map(|s| s.trim().to_lowercase()).filter(|s| !s.is_empty()) {
        payload = match (stage.as_str(), payload) {
            ("json", Payload::Json(json)) => Payload::Json(json),
            ("json", other) => {
                let text = other.text();
                let json = serde_json::from_str(&text)
                    .map_err(|e| format!("json stage failed: {e}"))?;
                Payload::Json(json)
            }
            ("text", other) => {
                let text = other.text().into_owned();
                Payload::Text(text)
            }
            ("hex", other) => {
                let decoded = hex::decode(other.text().trim())
                    .map_err(|e| format!("hex stage failed: {e}"))?;
                Payload::Bytes(decoded)
            }
            ("base64", other) => {
                let decoded = STANDARD
                    .decode(other.text().trim())
                    .map_err(|e| format!("base64 stage failed: {e}"))?;
                Payload::Bytes(decoded)
            }
            (unknown, _) => return Err(format!("unknown response parser stage '{unknown}'")),
        };
    }
    Ok(payload.into_value())
}
