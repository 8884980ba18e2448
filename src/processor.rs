//! File emission: expands a file template over its range combinations and
//! writes one directory, copied file or rendered file per combination.

use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::debug;
use minijinja::Value;

use crate::constants::BYTES_MARKER;
use crate::context::{EvalContext, EvalData, Phase};
use crate::document::FileSpec;
use crate::error::{Error, Result};
use crate::logger::LogSink;
use crate::range::{iterate, sources_from_values};
use crate::renderer::Evaluator;

const BLOCK: &str = "templates";

/// What a single combination produces on disk.
#[derive(Debug, PartialEq)]
pub enum FileOperation {
    CreateDir { target: PathBuf },
    Copy { source: PathBuf, target: PathBuf },
    Write { target: PathBuf, content: Vec<u8>, queue: VecDeque<Vec<u8>> },
}

impl FileOperation {
    pub fn target(&self) -> &Path {
        match self {
            FileOperation::CreateDir { target }
            | FileOperation::Copy { target, .. }
            | FileOperation::Write { target, .. } => target,
        }
    }
}

fn write_error(path: &Path, err: impl ToString) -> Error {
    Error::FileWriteError { path: path.display().to_string(), message: err.to_string() }
}

fn ensure_parent(target: &Path) -> Result<()> {
    match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|e| write_error(parent, e))
        }
        _ => Ok(()),
    }
}

fn find_marker(haystack: &[u8]) -> Option<usize> {
    let marker = BYTES_MARKER.as_bytes();
    haystack.windows(marker.len()).position(|window| window == marker)
}

/// Writes `rendered`, replacing each marker with the next queued block.
///
/// Every queued block must consume exactly one marker, in order; a missing
/// marker or a marker left over once the queue is drained is an
/// `InvalidData` error.
pub fn splice_bytes<W: Write>(
    rendered: &[u8],
    queue: &mut VecDeque<Vec<u8>>,
    writer: &mut W,
) -> io::Result<()> {
    let mut rest = rendered;
    while let Some(block) = queue.pop_front() {
        let index = find_marker(rest).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, "raw bytes were queued but no marker is left")
        })?;
        writer.write_all(&rest[..index])?;
        writer.write_all(&block)?;
        rest = &rest[index + BYTES_MARKER.len()..];
    }
    if find_marker(rest).is_some() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "marker found without queued raw bytes",
        ));
    }
    writer.write_all(rest)
}

/// Emits file templates into `work_dir`.
pub struct TemplateProcessor<'a> {
    evaluator: &'a Evaluator,
    work_dir: &'a Path,
    /// Base for relative copy sources
    source_root: &'a Path,
}

impl<'a> TemplateProcessor<'a> {
    pub fn new(evaluator: &'a Evaluator, work_dir: &'a Path, source_root: &'a Path) -> Self {
        Self { evaluator, work_dir, source_root }
    }

    /// Processes one `templates` entry.
    ///
    /// A `range` without an explicit `{{ ... }}` is taken as the argument
    /// list of `pathRange`. Combinations already written stay on disk when
    /// a later one fails.
    pub fn process(
        &self,
        path_template: &str,
        spec: &FileSpec,
        data: &mut EvalData,
        context: &EvalContext,
        sink: &mut dyn LogSink,
    ) -> Result<()> {
        if spec.ignore {
            sink.log(BLOCK, &format!("${{{path_template}}} => ignore"));
            return Ok(());
        }

        context.enter(Phase::Templates, path_template, Value::from_serialize(spec));
        context.reset();

        let range = spec.range.trim();
        if range.is_empty() {
            return self.emit(path_template, spec, data, context, sink);
        }

        let expr = if range.contains("{{") || range.contains("{%") {
            range.to_string()
        } else {
            format!("{{{{ pathRange({range}) }}}}")
        };
        self.evaluator.evaluate(&expr, data, context)?;
        let values = context.take_path_range().ok_or_else(|| {
            Error::RangeError(format!("range of '{path_template}' registered no sources"))
        })?;
        let sources = sources_from_values(&values)?;
        debug!("{path_template}: iterating {} range sources", sources.len());

        iterate(
            &sources,
            data,
            &mut |data: &mut EvalData| self.emit(path_template, spec, data, context, sink),
            0,
        )
    }

    /// Plans and applies a single combination. Queued bytes and range
    /// registrations never leak into the next combination.
    fn emit(
        &self,
        path_template: &str,
        spec: &FileSpec,
        data: &EvalData,
        context: &EvalContext,
        sink: &mut dyn LogSink,
    ) -> Result<()> {
        let result = self
            .plan(path_template, spec, data, context)
            .and_then(|operation| self.apply(path_template, operation, sink));
        context.clear_writes();
        context.take_path_range();
        result
    }

    /// Resolves the destination and decides what to do with it.
    pub fn plan(
        &self,
        path_template: &str,
        spec: &FileSpec,
        data: &EvalData,
        context: &EvalContext,
    ) -> Result<FileOperation> {
        let (rendered, _) = self.evaluator.evaluate(path_template, data, context)?;
        let mut relative = PathBuf::new();
        for segment in rendered.split('/').filter(|s| !s.trim().is_empty()) {
            let (segment, _) = self.evaluator.evaluate(segment, data, context)?;
            relative.push(segment.trim());
        }
        let target = self.work_dir.join(relative);

        if spec.is_dir {
            return Ok(FileOperation::CreateDir { target });
        }

        if spec.path.trim().is_empty() && spec.content.is_empty() {
            return Err(write_error(&target, "missing content"));
        }

        if !spec.path.trim().is_empty() {
            let (source, _) = self.evaluator.evaluate(&spec.path, data, context)?;
            return Ok(FileOperation::Copy { source: self.source_root.join(source.trim()), target });
        }

        let (content, _) = self.evaluator.evaluate_bytes(&spec.content, data, context)?;
        let queue = context.take_writes();
        Ok(FileOperation::Write { target, content, queue })
    }

    /// Performs `operation` on disk. Existing files are truncated.
    pub fn apply(
        &self,
        path_template: &str,
        operation: FileOperation,
        sink: &mut dyn LogSink,
    ) -> Result<()> {
        match operation {
            FileOperation::CreateDir { target } => {
                fs::create_dir_all(&target).map_err(|e| write_error(&target, e))?;
                sink.log(BLOCK, &format!("${{{path_template}}} => create dir: {}", target.display()));
            }
            FileOperation::Copy { source, target } => {
                ensure_parent(&target)?;
                fs::copy(&source, &target).map_err(|e| {
                    write_error(&target, format!("copy from {} failed: {e}", source.display()))
                })?;
                sink.log(BLOCK, &format!("${{{path_template}}} => copy file: {}", source.display()));
            }
            FileOperation::Write { target, content, mut queue } => {
                ensure_parent(&target)?;
                let file = File::create(&target).map_err(|e| write_error(&target, e))?;
                let mut writer = BufWriter::new(file);
                let spliced = !queue.is_empty();
                splice_bytes(&content, &mut queue, &mut writer)
                    .and_then(|_| writer.flush())
                    .map_err(|e| write_error(&target, e))?;
                let what = if spliced { "write content and bytes data to" } else { "write content to" };
                sink.log(BLOCK, &format!("${{{path_template}}} => {what}: {}", target.display()));
            }
        }
        Ok(())
    }
}
