use std::fs;
use std::path::Path;

use skelgen::document::TemplateDocument;
use skelgen::error::Error;
use skelgen::field_map::FieldValue;
use skelgen::loader::{load_document, load_document_with, DocumentSource, LocalLoader};
use tempfile::TempDir;

fn write(dir: &Path, name: &str, content: &str) -> DocumentSource {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    DocumentSource::FileSystem(path)
}

#[test]
fn test_later_imports_win_and_document_wins_last() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "a.yaml", "vars:\n  name: from-a\n  only_a: a\n");
    write(temp_dir.path(), "b.yaml", "vars:\n  name: from-b\n  only_b: b\n");
    let main = write(
        temp_dir.path(),
        "main.yaml",
        "import: [a.yaml, b.yaml]\nvars:\n  own: main\n",
    );

    let document = load_document_with(&LocalLoader, &main).unwrap();
    let vars = document.vars.unwrap();
    assert_eq!(vars.keys(), vec!["name", "only_a", "only_b", "own"]);
    assert_eq!(vars.get("name"), Some(&FieldValue::from("from-b")));

    let main = write(
        temp_dir.path(),
        "main2.yaml",
        "import: [a.yaml, b.yaml]\nvars:\n  name: from-main\n",
    );
    let document = load_document_with(&LocalLoader, &main).unwrap();
    assert_eq!(document.vars.unwrap().get("name"), Some(&FieldValue::from("from-main")));
}

#[test]
fn test_hooks_and_shell_come_from_importing_document() {
    let temp_dir = TempDir::new().unwrap();
    write(
        temp_dir.path(),
        "base.yaml",
        "shell: zsh -c\nexecutes:\n  pre: [echo base]\ntemplates:\n  base.txt:\n    content: base\n",
    );
    let main = write(
        temp_dir.path(),
        "main.yaml",
        "import: [base.yaml]\nexecutes:\n  post: [echo main]\ntemplates:\n  main.txt:\n    content: main\n",
    );

    let document = load_document_with(&LocalLoader, &main).unwrap();
    assert!(document.pre_commands().is_empty());
    assert_eq!(document.post_commands(), ["echo main".to_string()]);
    assert_ne!(document.shell.current(), "zsh -c");
    assert_eq!(document.templates.keys().collect::<Vec<_>>(), vec!["base.txt", "main.txt"]);
}

#[test]
fn test_nested_imports_resolve_relative_to_importer() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "common/leaf.yaml", "envs:\n  LEAF: leaf\n");
    write(temp_dir.path(), "common/mid.yaml", "import: [leaf.yaml]\nenvs:\n  MID: mid\n");
    let main = write(temp_dir.path(), "main.yaml", "import: [common/mid.yaml]\n");

    let document = load_document(&main).unwrap();
    assert_eq!(document.envs.unwrap().keys(), vec!["LEAF", "MID"]);
}

#[test]
fn test_import_cycle_is_an_import_error() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "a.yaml", "import: [b.yaml]\n");
    write(temp_dir.path(), "b.yaml", "import: [a.yaml]\n");
    let main = DocumentSource::FileSystem(temp_dir.path().join("a.yaml"));

    match load_document_with(&LocalLoader, &main) {
        Err(Error::ImportError { message, .. }) => assert!(message.contains("cycle")),
        other => panic!("Expected ImportError, got {other:?}"),
    }
}

#[test]
fn test_missing_and_malformed_imports() {
    let temp_dir = TempDir::new().unwrap();
    let main = write(temp_dir.path(), "main.yaml", "import: [gone.yaml]\n");
    assert!(matches!(load_document_with(&LocalLoader, &main), Err(Error::ImportError { .. })));

    write(temp_dir.path(), "bad.yaml", "templates: [oops\n");
    let main = write(temp_dir.path(), "main2.yaml", "import: [bad.yaml]\n");
    assert!(matches!(load_document_with(&LocalLoader, &main), Err(Error::ImportError { .. })));
}

#[test]
fn test_missing_top_level_document() {
    let source = DocumentSource::FileSystem("does/not/exist.yaml".into());
    assert!(matches!(
        load_document_with(&LocalLoader, &source),
        Err(Error::DocumentNotFoundError { .. })
    ));
}

#[test]
fn test_full_document_shape() {
    let yaml = r##"
envs:
  - JAVA_HOME=/opt/jdk
vars:
  group: com.example
remoteVars:
  user:
    type: https
    url: api.example.test/user
    skipHttpsVerifyCert: true
    responseParser: json
  later:
templates:
  "src/{{ var('group') }}":
    isDir: true
  README.md:
    content: "# {{ Project.name }}"
    comment: readme
  legacy.txt:
    path: legacy.txt
    ignore: true
comments:
  - free form
"##;
    let document = TemplateDocument::from_slice(yaml.as_bytes()).unwrap();
    let remote = document.remote_var("user").unwrap();
    assert_eq!(remote.kind, "https");
    assert!(remote.skip_https_verify_cert);
    assert_eq!(document.remote_vars.as_ref().unwrap().len(), 2);
    assert!(document.templates["src/{{ var('group') }}"].is_dir);
    assert!(document.templates["legacy.txt"].ignore);
    assert!(document.comments.is_some());
}
