//! Functions and filters available to every expression.
//!
//! Domain functions talk to the evaluation context bound as `this`; the
//! helper library adds case conversion, regex, encoding, JSON and date
//! helpers on top of MiniJinja's builtins.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use cruet::Inflector;
use minijinja::value::{Rest, ValueKind};
use minijinja::{Environment, Error, ErrorKind, State, Value};
use regex::Regex;

use crate::constants::BYTES_MARKER;
use crate::context::this_context;

pub fn register(env: &mut Environment<'static>) {
    env.add_function("env", env_value);
    env.add_function("var", var_value);
    env.add_function("remoteVar", remote_var);
    env.add_function("remoteVarResponse", remote_var_response);
    env.add_function("writeBytes", write_bytes);
    env.add_function("pathRange", path_range);
    env.add_function("substrByFlag", substr_by_flag);
    env.add_function("error", raise_error);
    env.add_function("return", return_value);

    env.add_function("list", list);
    env.add_function("fromJson", from_json);
    env.add_function("now", now);
    env.add_function("date", date);
    env.add_function("b64enc", b64enc);
    env.add_function("b64dec", b64dec);
    env.add_function("hexenc", hexenc);
    env.add_function("hexdec", hexdec);

    env.add_filter("b64enc", b64enc);
    env.add_filter("b64dec", b64dec);
    env.add_filter("hexenc", hexenc);
    env.add_filter("hexdec", hexdec);
    env.add_filter("fromjson", from_json);
    env.add_filter("regex", regex_match);
    env.add_filter("regex_replace", regex_replace);

    env.add_filter("camel_case", camel_case);
    env.add_filter("kebab_case", kebab_case);
    env.add_filter("pascal_case", pascal_case);
    env.add_filter("screaming_snake_case", screaming_snake_case);
    env.add_filter("snake_case", snake_case);
    env.add_filter("table_case", table_case);
    env.add_filter("train_case", train_case);
    env.add_filter("plural", plural);
    env.add_filter("singular", singular);
    env.add_filter("foreign_key", foreign_key);
}

fn invalid<S: Into<String>>(message: S) -> Error {
    Error::new(ErrorKind::InvalidOperation, message.into())
}

fn env_value(state: &State, name: &str) -> Result<Value, Error> {
    Ok(Value::from(this_context(state)?.env(name).unwrap_or_default()))
}

fn var_value(state: &State, name: &str) -> Result<Value, Error> {
    let context = this_context(state)?;
    Ok(context.var(name).map(|v| Value::from(&v)).unwrap_or(Value::from(())))
}

/// The declared spec, before resolution.
fn remote_var(state: &State, name: &str) -> Result<Value, Error> {
    let context = this_context(state)?;
    Ok(context.remote_var(name).map(|spec| Value::from_serialize(&spec)).unwrap_or(Value::from(())))
}

fn remote_var_response(state: &State, name: &str) -> Result<Value, Error> {
    Ok(this_context(state)?.remote_var_response(name))
}

fn bytes_of(value: &Value) -> Option<Vec<u8>> {
    if let Some(bytes) = value.as_bytes() {
        return Some(bytes.to_vec());
    }
    if value.kind() == ValueKind::Seq {
        return value
            .try_iter()
            .ok()?
            .map(|item| item.as_i64().and_then(|n| u8::try_from(n).ok()))
            .collect();
    }
    None
}

/// Queues `blob` on the context and returns the marker the file writer
/// replaces with it.
fn write_bytes(state: &State, blob: Value) -> Result<String, Error> {
    let bytes = bytes_of(&blob)
        .ok_or_else(|| invalid(format!("writeBytes expects bytes, got {}", blob.kind())))?;
    this_context(state)?.push_bytes(bytes);
    Ok(BYTES_MARKER.to_string())
}

/// Records range sources for the calling file template.
fn path_range(state: &State, sources: Rest<Value>) -> Result<String, Error> {
    this_context(state)?.set_path_range(sources.0);
    Ok(String::new())
}

fn raise_error(state: &State, message: String) -> Result<String, Error> {
    this_context(state)?.fail(message);
    Ok(String::new())
}

fn return_value(state: &State, value: Value) -> Result<String, Error> {
    this_context(state)?.set_return(value);
    Ok(String::new())
}

/// Splits `value` on `flag` and joins the selected segments with dots.
///
/// A positive `pos` keeps the first `pos` segments (everything before the
/// `pos`-th split), a negative one keeps the last `-pos` segments. Zero
/// counts as 1. A position beyond the available splits yields an empty
/// string.
pub fn substr_by_flag(pos: i64, flag: &str, value: &str) -> String {
    if flag.is_empty() {
        return String::new();
    }
    let segments: Vec<&str> = value.split(flag).collect();
    let count = usize::try_from(pos.unsigned_abs().max(1)).unwrap_or(usize::MAX);
    if count >= segments.len() {
        return String::new();
    }
    if pos >= 0 {
        segments[..count].join(".")
    } else {
        segments[segments.len() - count..].join(".")
    }
}

fn list(items: Rest<Value>) -> Value {
    Value::from(items.0)
}

fn from_json(value: &str) -> Result<Value, Error> {
    let parsed: serde_json::Value =
        serde_json::from_str(value).map_err(|e| invalid(format!("invalid JSON: {e}")))?;
    Ok(Value::from_serialize(&parsed))
}

fn now(format: Option<&str>) -> String {
    chrono::Local::now().format(format.unwrap_or("%Y-%m-%d %H:%M:%S")).to_string()
}

/// Formats a unix timestamp (seconds, UTC).
fn date(timestamp: i64, format: Option<&str>) -> Result<String, Error> {
    let datetime = chrono::DateTime::from_timestamp(timestamp, 0)
        .ok_or_else(|| invalid(format!("timestamp {timestamp} is out of range")))?;
    Ok(datetime.format(format.unwrap_or("%Y-%m-%d %H:%M:%S")).to_string())
}

fn b64enc(value: Value) -> Result<String, Error> {
    let bytes = bytes_of(&value).ok_or_else(|| invalid("b64enc expects a string or bytes"))?;
    Ok(STANDARD.encode(bytes))
}

fn b64dec(value: &str) -> Result<Value, Error> {
    let bytes = STANDARD.decode(value.trim()).map_err(|e| invalid(format!("invalid base64: {e}")))?;
    Ok(Value::from_bytes(bytes))
}

fn hexenc(value: Value) -> Result<String, Error> {
    let bytes = bytes_of(&value).ok_or_else(|| invalid("hexenc expects a string or bytes"))?;
    Ok(hex::encode(bytes))
}

fn hexdec(value: &str) -> Result<Value, Error> {
    let bytes = hex::decode(value.trim()).map_err(|e| invalid(format!("invalid hex: {e}")))?;
    Ok(Value::from_bytes(bytes))
}

fn camel_case(value: &str) -> String {
    value.to_camel_case()
}

fn kebab_case(value: &str) -> String {
    value.to_kebab_case()
}

fn pascal_case(value: &str) -> String {
    value.to_pascal_case()
}

fn screaming_snake_case(value: &str) -> String {
    value.to_screaming_snake_case()
}

fn snake_case(value: &str) -> String {
    value.to_snake_case()
}

fn table_case(value: &str) -> String {
    value.to_table_case()
}

fn train_case(value: &str) -> String {
    value.to_train_case()
}

fn plural(value: &str) -> String {
    value.to_plural()
}

fn singular(value: &str) -> String {
    value.to_singular()
}

fn foreign_key(value: &str) -> String {
    value.to_foreign_key()
}

fn compile(pattern: &str) -> Result<Regex, Error> {
    Regex::new(pattern).map_err(|e| invalid(format!("invalid regex '{pattern}': {e}")))
}

fn regex_match(value: &str, pattern: &str) -> Result<bool, Error> {
    Ok(compile(pattern)?.is_match(value))
}

fn regex_replace(value: &str, pattern: &str, replacement: &str) -> Result<String, Error> {
    Ok(compile(pattern)?.replace_all(value, replacement).into_owned())
}
