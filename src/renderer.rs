//! Expression evaluation.
//! Binds the evaluation context and the domain function library to a
//! MiniJinja environment and renders `{{ ... }}` expressions against the
//! run's data.
use minijinja::{Environment, Value};

use crate::context::{EvalContext, EvalData};
use crate::error::{Error, Result};
use crate::field_map::FieldValue;
use crate::functions;

/// MiniJinja-based expression evaluator.
pub struct Evaluator {
    env: Environment<'static>,
}

impl Evaluator {
    /// Creates an evaluator with the domain functions and helper library bound.
    pub fn new() -> Self {
        let mut env = Environment::new();
        // File content must come out byte-exact.
        env.set_keep_trailing_newline(true);
        functions::register(&mut env);
        Self { env }
    }

    /// Evaluates `expr` to text.
    ///
    /// An empty or whitespace-only expression is returned unchanged. The
    /// expression is trimmed before rendering. Returns the rendered text and
    /// the value passed to `return(...)`, if any.
    ///
    /// # Errors
    /// * `Error::ExpressionError` if the expression fails to parse or render,
    ///   or calls `error(...)`
    pub fn evaluate(
        &self,
        expr: &str,
        data: &EvalData,
        context: &EvalContext,
    ) -> Result<(String, Option<Value>)> {
        let source = expr.trim();
        if source.is_empty() {
            return Ok((expr.to_string(), None));
        }
        self.render(source, data, context)
    }

    /// Evaluates `expr` to raw bytes, leaving surrounding whitespace intact.
    /// Used for file content, which may interleave `writeBytes` markers.
    pub fn evaluate_bytes(
        &self,
        expr: &str,
        data: &EvalData,
        context: &EvalContext,
    ) -> Result<(Vec<u8>, Option<Value>)> {
        if expr.trim().is_empty() {
            return Ok((expr.as_bytes().to_vec(), None));
        }
        let (rendered, returned) = self.render(expr, data, context)?;
        Ok((rendered.into_bytes(), returned))
    }

    /// Evaluates a declared value; list values are evaluated element-wise.
    pub fn evaluate_field(
        &self,
        value: &FieldValue,
        data: &EvalData,
        context: &EvalContext,
    ) -> Result<FieldValue> {
        match value {
            FieldValue::Str(expr) => Ok(FieldValue::Str(self.evaluate(expr, data, context)?.0)),
            FieldValue::List(items) => items
                .iter()
                .map(|expr| self.evaluate(expr, data, context).map(|(text, _)| text))
                .collect::<Result<Vec<_>>>()
                .map(FieldValue::List),
        }
    }

    fn render(
        &self,
        source: &str,
        data: &EvalData,
        context: &EvalContext,
    ) -> Result<(String, Option<Value>)> {
        let rendered = self
            .env
            .template_from_str(source)
            .and_then(|template| template.render(data.to_value()));

        // Drain the side channel whatever the outcome.
        let error = context.take_error();
        let returned = context.take_return();

        let rendered = rendered.map_err(|e| Error::ExpressionError {
            item: context.name(),
            message: format!("{e:#}"),
        })?;
        if let Some(message) = error {
            return Err(Error::ExpressionError { item: context.name(), message });
        }
        Ok((rendered, returned))
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Evaluator::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::TemplateDocument;
    use crate::project::ProjectInfo;

    #[test]
    fn test_trailing_newline_is_kept_for_content() {
        let ctx = EvalContext::new(TemplateDocument::default(), ProjectInfo::default());
        let data = EvalData::new(&ctx);
        let (bytes, _) = Evaluator::new().evaluate_bytes("line {{ 1 }}\n", &data, &ctx).unwrap();
        assert_eq!(bytes, b"line 1\n");
    }

    #[test]
    fn test_error_slot_is_drained_after_failure() {
        let ctx = EvalContext::new(TemplateDocument::default(), ProjectInfo::default());
        let data = EvalData::new(&ctx);
        let evaluator = Evaluator::new();
        assert!(evaluator.evaluate("{{ error('nope') }}", &data, &ctx).is_err());
        let (out, _) = evaluator.evaluate("fine", &data, &ctx).unwrap();
        assert_eq!(out, "fine");
    }
}
