use std::fs;

use skelgen::context::{EvalContext, EvalData};
use skelgen::document::{FileSpec, TemplateDocument};
use skelgen::error::Error;
use skelgen::logger::MemorySink;
use skelgen::processor::{FileOperation, TemplateProcessor};
use skelgen::project::ProjectInfo;
use skelgen::renderer::Evaluator;
use tempfile::TempDir;

fn context(yaml: &str) -> EvalContext {
    EvalContext::new(TemplateDocument::from_slice(yaml.as_bytes()).unwrap(), ProjectInfo::default())
}

fn content(body: &str) -> FileSpec {
    FileSpec { content: body.to_string(), ..Default::default() }
}

#[test]
fn test_binary_splice_is_byte_exact() {
    let temp_dir = TempDir::new().unwrap();
    let evaluator = Evaluator::new();
    let processor = TemplateProcessor::new(&evaluator, temp_dir.path(), temp_dir.path());
    let ctx = context("");
    let mut data = EvalData::new(&ctx);
    let mut sink = MemorySink::new();

    // 0x00 0xff 0x10 in base64
    let spec = content("A{{ writeBytes('AP8Q' | b64dec) }}C");
    processor.process("blob.bin", &spec, &mut data, &ctx, &mut sink).unwrap();

    let written = fs::read(temp_dir.path().join("blob.bin")).unwrap();
    assert_eq!(written, [b'A', 0x00, 0xff, 0x10, b'C']);
    assert!(ctx.take_writes().is_empty());
    assert!(sink.messages("templates")[0].contains("write content and bytes data to"));
}

#[test]
fn test_range_multiplies_files() {
    let temp_dir = TempDir::new().unwrap();
    let evaluator = Evaluator::new();
    let processor = TemplateProcessor::new(&evaluator, temp_dir.path(), temp_dir.path());
    let ctx = context("vars:\n  modules: [api, core]\n");
    let mut data = EvalData::new(&ctx);

    let spec = FileSpec {
        content: "module {{ v0 }} #{{ k0 }}\n".to_string(),
        range: "var('modules')".to_string(),
        ..Default::default()
    };
    processor.process("src/{{ v0 }}/mod.txt", &spec, &mut data, &ctx, &mut MemorySink::new()).unwrap();

    assert_eq!(fs::read_to_string(temp_dir.path().join("src/api/mod.txt")).unwrap(), "module api #0\n");
    assert_eq!(fs::read_to_string(temp_dir.path().join("src/core/mod.txt")).unwrap(), "module core #1\n");
    assert!(!data.contains("v0"));
}

#[test]
fn test_explicit_path_range_call() {
    let temp_dir = TempDir::new().unwrap();
    let evaluator = Evaluator::new();
    let processor = TemplateProcessor::new(&evaluator, temp_dir.path(), temp_dir.path());
    let ctx = context("");
    let mut data = EvalData::new(&ctx);

    let spec = FileSpec {
        content: "{{ v0 }}{{ v1 }}".to_string(),
        range: "{{ pathRange(['a', 'b'], [1, 2]) }}".to_string(),
        ..Default::default()
    };
    processor.process("{{ v0 }}{{ v1 }}.txt", &spec, &mut data, &ctx, &mut MemorySink::new()).unwrap();

    for name in ["a1", "a2", "b1", "b2"] {
        assert_eq!(fs::read_to_string(temp_dir.path().join(format!("{name}.txt"))).unwrap(), name);
    }
}

#[test]
fn test_range_without_sources() {
    let temp_dir = TempDir::new().unwrap();
    let evaluator = Evaluator::new();
    let processor = TemplateProcessor::new(&evaluator, temp_dir.path(), temp_dir.path());
    let ctx = context("");
    let mut data = EvalData::new(&ctx);

    let spec = FileSpec { content: "x".to_string(), range: "{{ 1 }}".to_string(), ..Default::default() };
    let result = processor.process("f.txt", &spec, &mut data, &ctx, &mut MemorySink::new());
    assert!(matches!(result, Err(Error::RangeError(_))));
}

#[test]
fn test_copy_and_directory() {
    let temp_dir = TempDir::new().unwrap();
    let source_root = TempDir::new().unwrap();
    fs::write(source_root.path().join("logo.png"), [0x89, b'P', b'N', b'G']).unwrap();

    let evaluator = Evaluator::new();
    let processor = TemplateProcessor::new(&evaluator, temp_dir.path(), source_root.path());
    let ctx = context("vars:\n  asset: logo.png\n");
    let mut data = EvalData::new(&ctx);
    let mut sink = MemorySink::new();

    let copy = FileSpec {
        path: "{{ var('asset') }}".to_string(),
        content: "ignored when path is set".to_string(),
        ..Default::default()
    };
    processor.process("assets/logo.png", &copy, &mut data, &ctx, &mut sink).unwrap();
    assert_eq!(fs::read(temp_dir.path().join("assets/logo.png")).unwrap(), [0x89, b'P', b'N', b'G']);

    let dir = FileSpec { is_dir: true, ..Default::default() };
    processor.process("empty/nested", &dir, &mut data, &ctx, &mut sink).unwrap();
    assert!(temp_dir.path().join("empty/nested").is_dir());
}

#[test]
fn test_missing_content_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let evaluator = Evaluator::new();
    let processor = TemplateProcessor::new(&evaluator, temp_dir.path(), temp_dir.path());
    let ctx = context("");
    let mut data = EvalData::new(&ctx);

    let result =
        processor.process("nothing.txt", &FileSpec::default(), &mut data, &ctx, &mut MemorySink::new());
    match result {
        Err(Error::FileWriteError { message, .. }) => assert_eq!(message, "missing content"),
        other => panic!("Expected FileWriteError, got {other:?}"),
    }
}

#[test]
fn test_ignored_template_is_skipped() {
    let temp_dir = TempDir::new().unwrap();
    let evaluator = Evaluator::new();
    let processor = TemplateProcessor::new(&evaluator, temp_dir.path(), temp_dir.path());
    let ctx = context("");
    let mut data = EvalData::new(&ctx);
    let mut sink = MemorySink::new();

    let spec = FileSpec { content: "x".to_string(), ignore: true, ..Default::default() };
    processor.process("skip.txt", &spec, &mut data, &ctx, &mut sink).unwrap();
    assert!(!temp_dir.path().join("skip.txt").exists());
    assert_eq!(sink.messages("templates"), vec!["${skip.txt} => ignore"]);
}

#[test]
fn test_existing_file_is_truncated() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("short.txt"), "a much longer previous body").unwrap();

    let evaluator = Evaluator::new();
    let processor = TemplateProcessor::new(&evaluator, temp_dir.path(), temp_dir.path());
    let ctx = context("");
    let mut data = EvalData::new(&ctx);
    processor.process("short.txt", &content("new"), &mut data, &ctx, &mut MemorySink::new()).unwrap();
    assert_eq!(fs::read_to_string(temp_dir.path().join("short.txt")).unwrap(), "new");
}

#[test]
fn test_plan_resolves_target() {
    let temp_dir = TempDir::new().unwrap();
    let evaluator = Evaluator::new();
    let processor = TemplateProcessor::new(&evaluator, temp_dir.path(), temp_dir.path());
    let ctx = context("vars:\n  pkg: com/example\n");
    let data = EvalData::new(&ctx);

    let operation = processor
        .plan("src//{{ var('pkg') }}/Main.java", &content("class Main {}"), &data, &ctx)
        .unwrap();
    assert_eq!(operation.target(), temp_dir.path().join("src/com/example/Main.java"));
    assert!(matches!(operation, FileOperation::Write { ref queue, .. } if queue.is_empty()));
}
