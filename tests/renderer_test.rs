use minijinja::Value;
use skelgen::context::{EvalContext, EvalData, Phase};
use skelgen::document::TemplateDocument;
use skelgen::error::Error;
use skelgen::project::ProjectInfo;
use skelgen::renderer::Evaluator;

fn setup(yaml: &str, project: &str) -> (Evaluator, EvalContext, EvalData) {
    let document = TemplateDocument::from_slice(yaml.as_bytes()).unwrap();
    let project = ProjectInfo::from_json(project).unwrap();
    let context = EvalContext::new(document, project);
    let data = EvalData::new(&context);
    (Evaluator::new(), context, data)
}

fn render(evaluator: &Evaluator, context: &EvalContext, data: &EvalData, expr: &str) -> String {
    evaluator.evaluate(expr, data, context).unwrap().0
}

#[test]
fn test_blank_expression_passes_through() {
    let (evaluator, context, data) = setup("", "{}");
    for blank in ["", "   ", "\n\t"] {
        let (out, returned) = evaluator.evaluate(blank, &data, &context).unwrap();
        assert_eq!(out, blank);
        assert!(returned.is_none());
    }
}

#[test]
fn test_expression_is_trimmed() {
    let (evaluator, context, data) = setup("", "{}");
    assert_eq!(render(&evaluator, &context, &data, "  {{ 1 + 1 }}  \n"), "2");
}

#[test]
fn test_return_value_is_separate_from_text() {
    let (evaluator, context, data) = setup("", "{}");
    let (out, returned) =
        evaluator.evaluate("ok{{ return([1, 2]) }}", &data, &context).unwrap();
    assert_eq!(out, "ok");
    assert_eq!(returned, Some(Value::from(vec![1, 2])));

    let (_, returned) = evaluator.evaluate("{{ this.return('x') }}", &data, &context).unwrap();
    assert_eq!(returned, Some(Value::from("x")));
}

#[test]
fn test_error_call_fails_with_item_name() {
    let (evaluator, context, data) = setup("", "{}");
    context.enter(Phase::Vars, "broken", Value::from(()));
    match evaluator.evaluate("text{{ error('bad input') }}", &data, &context) {
        Err(Error::ExpressionError { item, message }) => {
            assert_eq!(item, "broken");
            assert_eq!(message, "bad input");
        }
        other => panic!("Expected ExpressionError, got {other:?}"),
    }
}

#[test]
fn test_grammar_error() {
    let (evaluator, context, data) = setup("", "{}");
    assert!(matches!(
        evaluator.evaluate("{{ unclosed ", &data, &context),
        Err(Error::ExpressionError { .. })
    ));
}

#[test]
fn test_env_and_var_functions() {
    let (evaluator, context, data) = setup(
        "envs:\n  HOME_DIR: /srv\nvars:\n  group: com.example\n  tags: [a, b]\n",
        "{}",
    );
    assert_eq!(render(&evaluator, &context, &data, "{{ env('HOME_DIR') }}"), "/srv");
    assert_eq!(render(&evaluator, &context, &data, "{{ var('group') }}"), "com.example");
    assert_eq!(render(&evaluator, &context, &data, "{{ var('tags') | join('-') }}"), "a-b");
    assert_eq!(render(&evaluator, &context, &data, "{{ this.var('group') }}"), "com.example");
    assert_eq!(render(&evaluator, &context, &data, "{{ top.vars.group }}"), "com.example");
    assert_eq!(render(&evaluator, &context, &data, "{{ 'missing' if var('nope') is none }}"), "missing");
}

#[test]
fn test_this_exposes_current_item() {
    let (evaluator, context, data) = setup("", "{}");
    context.enter(Phase::RemoteVars, "user", Value::from("payload"));
    assert_eq!(
        render(&evaluator, &context, &data, "{{ this.type }}/{{ this.name }}/{{ this.data }}"),
        "remoteVars/user/payload"
    );
}

#[test]
fn test_remote_var_before_resolution() {
    let (evaluator, context, data) =
        setup("remoteVars:\n  user:\n    type: http\n    url: example.test\n", "{}");
    assert_eq!(render(&evaluator, &context, &data, "{{ remoteVar('user').url }}"), "example.test");
    assert_eq!(
        render(&evaluator, &context, &data, "{{ 'pending' if remoteVarResponse('user') is none }}"),
        "pending"
    );
}

#[test]
fn test_project_accessors() {
    let project = r#"{
        "name": "core",
        "desc": "Core module",
        "product": {"name": "Shop", "type": "web"},
        "version": {"name": "1.2.0"},
        "depends": {
            "current": {
                "base": {"name": "base", "depends": {
                    "default": [{"name": "serde", "version": "1"}],
                    "plugin": [{"name": "shade"}]
                }}
            },
            "group": {
                "extra": {"name": "extra", "depends": {"default": [{"name": "regex"}]}}
            }
        }
    }"#;
    let (evaluator, context, data) = setup("", project);
    let r = |expr: &str| render(&evaluator, &context, &data, expr);

    assert_eq!(r("{{ this.productName() }}:{{ this.moduleName() }}"), "Shop:core");
    assert_eq!(r("{{ this.moduleDesc() }}|{{ this.versionName() }}"), "Core module|1.2.0");
    assert_eq!(r("{{ this.product().type }}"), "web");
    assert_eq!(r("{{ this.currentDepends() | map(attribute='name') | join(',') }}"), "serde");
    assert_eq!(r("{{ this.currentPluginDepends()[0].name }}"), "shade");
    assert_eq!(r("{{ this.dependGroup('extra').name }}"), "extra");
    assert_eq!(r("{{ Project.name }}"), "core");
}

#[test]
fn test_helper_library() {
    let (evaluator, context, data) = setup("", "{}");
    let r = |expr: &str| render(&evaluator, &context, &data, expr);

    assert_eq!(r("{{ 'user_account' | pascal_case }}"), "UserAccount");
    assert_eq!(r("{{ 'UserAccount' | snake_case }}"), "user_account");
    assert_eq!(r("{{ 'user account' | kebab_case }}"), "user-account");
    assert_eq!(r("{{ 'abc' | b64enc }}"), "YWJj");
    assert_eq!(r("{{ 'YWJj' | b64dec | hexenc }}"), "616263");
    assert_eq!(r("{{ ('{\"k\": [1, 2]}' | fromjson).k | length }}"), "2");
    assert_eq!(r("{{ 'v1.2.3' | regex_replace('[^0-9.]', '') }}"), "1.2.3");
    assert_eq!(r("{{ 'matched' if 'abc123' | regex('^[a-z]+\\\\d+$') }}"), "matched");
    assert_eq!(r("{{ substrByFlag(2, '.', 'com.example.app') }}"), "com.example");
    assert_eq!(r("{{ substrByFlag(-1, '.', 'com.example.app') }}"), "app");
    assert_eq!(r("{{ substrByFlag(0, '.', 'com.example.app') }}"), "com");
    assert_eq!(r("{{ date(0, '%Y') }}"), "1970");
    assert_eq!(r("{{ list(1, 'a') | length }}"), "2");
}

#[test]
fn test_write_bytes_queues_and_returns_marker() {
    let (evaluator, context, data) = setup("", "{}");
    let (bytes, _) = evaluator
        .evaluate_bytes("A{{ writeBytes('AAE=' | b64dec) }}C", &data, &context)
        .unwrap();
    let queue = context.take_writes();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0], vec![0u8, 1]);
    assert!(bytes.starts_with(b"A") && bytes.ends_with(b"C"));
    assert!(bytes.len() > 2);
}
