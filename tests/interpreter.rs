//! End-to-end round-trip scenarios (§8) driven through the public
//! `run_source_to` entry point: source text in, printed output out.

use wisp_runtime::run_source_to;

fn run_ok(source: &str) -> String {
    let mut output = Vec::new();
    run_source_to(source, &mut output).expect("source should run to completion");
    String::from_utf8(output).expect("program output should be UTF-8")
}

#[test]
fn arithmetic_precedence() {
    assert_eq!(run_ok("print 1 + 2 * 3;"), "7\n");
}

#[test]
fn string_concatenation() {
    assert_eq!(
        run_ok(r#"var a = "foo"; var b = "bar"; print a + b;"#),
        "foobar\n"
    );
}

#[test]
fn while_loop_counts_up() {
    assert_eq!(
        run_ok("var x = 0; while (x < 3) { print x; x = x + 1; }"),
        "0\n1\n2\n"
    );
}

#[test]
fn if_elif_else_picks_the_else_branch() {
    assert_eq!(
        run_ok(r#"if (nil) print "a"; elif (false) print "b"; else print "c";"#),
        "c\n"
    );
}

#[test]
fn closures_capture_and_persist_across_calls() {
    let source = r#"
        def makeCounter() {
          var n = 0;
          def incr() { n = n + 1; return n; }
          return incr;
        }
        var c = makeCounter();
        print c(); print c(); print c();
    "#;
    assert_eq!(run_ok(source), "1\n2\n3\n");
}

#[test]
fn equality_across_tags_is_a_runtime_error() {
    let mut output = Vec::new();
    let err = run_source_to(r#"print 1 == "1";"#, &mut output).expect_err("should be a type error");
    match err {
        wisp_runtime::error::InterpretError::Runtime(e) => {
            assert!(e.message.contains("Cannot compare"));
        }
        other => panic!("expected a runtime error, got {other:?}"),
    }
}

#[test]
fn compile_errors_collect_more_than_one_diagnostic() {
    let mut output = Vec::new();
    let err = run_source_to("var = 1; var y = ;", &mut output).expect_err("malformed source should fail to compile");
    match err {
        wisp_runtime::error::InterpretError::Compile(errs) => {
            assert!(errs.0.len() >= 2, "expected multiple diagnostics, got {errs:?}");
        }
        other => panic!("expected a compile error, got {other:?}"),
    }
}

#[test]
fn redeclaring_a_local_in_the_same_scope_is_a_compile_error() {
    let mut output = Vec::new();
    let err = run_source_to("{ var x = 1; var x = 2; }", &mut output)
        .expect_err("redeclaration should fail to compile");
    assert!(matches!(err, wisp_runtime::error::InterpretError::Compile(_)));
}

#[test]
fn recursive_fibonacci() {
    let source = r#"
        def fib(n) {
            if (n < 2) { return n; }
            return fib(n - 1) + fib(n - 2);
        }
        print fib(10);
    "#;
    assert_eq!(run_ok(source), "55\n");
}

#[test]
fn assigning_to_an_undeclared_global_is_a_runtime_error() {
    let mut output = Vec::new();
    let err = run_source_to("x = 1;", &mut output).expect_err("undefined global assignment should fail");
    assert!(matches!(err, wisp_runtime::error::InterpretError::Runtime(_)));
}

#[test]
fn functions_print_by_name() {
    assert_eq!(run_ok("def greet() { print \"hi\"; } print greet;"), "<fn greet>\n");
}
