use super::*;

struct Run {
    result: Result<Value, Error>,
    output: String,
    evaluator: Evaluator,
}

fn options() -> EvaluatorOptions {
    EvaluatorOptions::new(PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests").join("modules"))
}

fn run_with(source: &str, options: EvaluatorOptions, setup: impl FnOnce(&mut Evaluator)) -> Run {
    let buffer = Rc::new(RefCell::new(Vec::<u8>::new()));
    let output: SharedOutput = buffer.clone();

    let mut evaluator = Evaluator::new(Rc::new(options), output);
    setup(&mut evaluator);

    let result = evaluator.run_source(source);
    let output = String::from_utf8(buffer.borrow().clone()).unwrap();

    Run { result, output, evaluator }
}

fn run(source: &str) -> Run {
    run_with(source, options(), |_| {})
}

fn eval(source: &str) -> Value {
    match run(source).result {
        Ok(value) => value,
        Err(err) => panic!("{} failed: {}", source, err),
    }
}

fn runtime_error(source: &str) -> RuntimeError {
    match run(source).result {
        Err(Error::Runtime(err)) => err,
        other => panic!("expected runtime error from {}, got {:?}", source, other),
    }
}

fn string(value: &str) -> Value {
    Value::String(Rc::from(value))
}

mod expressions {
    use pretty_assertions::assert_eq;
    use super::*;

    #[test]
    pub fn test_precedence() {
        assert_eq!(eval("1 + 2 * 3"), Value::Number(7.0));
        assert_eq!(eval("1 + (2 * 3)"), Value::Number(7.0));
        assert_eq!(eval("(1 + 2) * 3"), Value::Number(9.0));
        assert_eq!(eval("10 - 4 - 3"), Value::Number(3.0));
    }

    #[test]
    pub fn test_concatenation() {
        assert_eq!(eval("\"a\" + \"b\""), string("ab"));
        assert_eq!(eval("\"a\" + \"b\" + \"c\""), string("abc"));
    }

    #[test]
    pub fn test_truthiness() {
        assert_eq!(eval("!true"), Value::Boolean(false));
        assert_eq!(eval("!0"), Value::Boolean(false));
        assert_eq!(eval("!\"\""), Value::Boolean(false));
        assert_eq!(eval("!null"), Value::Boolean(true));
    }

    #[test]
    pub fn test_equality() {
        assert_eq!(eval("1 == 1"), Value::Boolean(true));
        assert_eq!(eval("\"a\" == \"a\""), Value::Boolean(true));
        assert_eq!(eval("null == null"), Value::Boolean(true));
        assert_eq!(eval("1 == \"1\""), Value::Boolean(false));
        assert_eq!(eval("null == false"), Value::Boolean(false));
        assert_eq!(eval("1 != 2"), Value::Boolean(true));
    }

    #[test]
    pub fn test_comparison() {
        assert_eq!(eval("1 < 2"), Value::Boolean(true));
        assert_eq!(eval("2 <= 2"), Value::Boolean(true));
        assert_eq!(eval("1 > 2"), Value::Boolean(false));
        assert_eq!(eval("-3 >= -3"), Value::Boolean(true));
    }

    #[test]
    pub fn test_logical_short_circuit() {
        assert_eq!(eval("var called = false; function f() { called = true; return true; } false and f(); called"),
                   Value::Boolean(false));
        assert_eq!(eval("var called = false; function f() { called = true; return true; } true or f(); called"),
                   Value::Boolean(false));
        assert_eq!(eval("null or \"x\""), string("x"));
        assert_eq!(eval("1 and 2"), Value::Number(2.0));
    }

    #[test]
    pub fn test_mixed_operands_fail() {
        assert!(matches!(runtime_error("1 + \"a\""), RuntimeError::InvalidOperand { .. }));
        assert!(matches!(runtime_error("\"a\" < \"b\""), RuntimeError::InvalidOperand { .. }));
        assert!(matches!(runtime_error("-\"a\""), RuntimeError::InvalidOperand { .. }));
    }

    #[test]
    pub fn test_result_is_last_expression_statement() {
        assert_eq!(eval("1; 2"), Value::Number(2.0));
        assert_eq!(eval("1; var a = 2;"), Value::Null);
        assert_eq!(eval(""), Value::Null);
    }
}

mod statements {
    use pretty_assertions::assert_eq;
    use super::*;

    #[test]
    pub fn test_print() {
        assert_eq!(run("print 1; print \"hi\"; print null; print 2.5;").output, "1\nhi\nnull\n2.5\n");

        let mut pretty = options();
        pretty.pretty = true;
        assert_eq!(run_with("print \"hi\"; print 1;", pretty, |_| {}).output, "hi\n\x1b[33m1\x1b[0m\n");
    }

    #[test]
    pub fn test_block_scopes() {
        assert_eq!(run("var a = 1; { var a = 2; { print a; } print a; } print a;").output, "2\n2\n1\n");
    }

    #[test]
    pub fn test_if_and_while() {
        assert_eq!(run("var i = 0; while (i < 3) { if (i == 1) print \"one\"; else print i; i = i + 1; }").output,
                   "0\none\n2\n");
    }

    #[test]
    pub fn test_for_loop() {
        assert_eq!(eval("var sum = 0; for (var i = 1; i <= 4; i = i + 1) sum = sum + i; sum"), Value::Number(10.0));
    }

    #[test]
    pub fn test_return_from_loop() {
        assert_eq!(eval("function find() { var i = 0; while (true) { if (i == 5) return i; i = i + 1; } } find()"),
                   Value::Number(5.0));
    }

    #[test]
    pub fn test_undefined_variable() {
        let err = runtime_error("print y;");

        assert_eq!(err.to_string(), "Error on line 1 col 7: Undefined variable 'y'.");
    }

    #[test]
    pub fn test_assign_undefined_variable() {
        assert!(matches!(runtime_error("y = 1;"), RuntimeError::UndefinedVariable(_)));
    }

    #[test]
    pub fn test_runtime_error_stops_module() {
        let run = run("print 1;\nprint y;\nprint 3;");

        assert!(matches!(run.result, Err(Error::Runtime(RuntimeError::UndefinedVariable(_)))));
        assert_eq!(run.output, "1\n");
        assert_eq!(run.evaluator.failed_statement(), Some(1));
    }

    #[test]
    pub fn test_parse_error_keeps_other_statements() {
        let run = run("var = 1; print 2; print 3;");

        assert!(run.result.is_ok());
        assert_eq!(run.output, "2\n3\n");
        assert_eq!(run.evaluator.parse_errors().len(), 1);
        assert!(run.evaluator.had_error());
    }

    #[test]
    pub fn test_own_initializer_warning_still_runs() {
        let run = run("print 1; { var a = a; }");

        // The read itself fails once it executes
        assert!(matches!(run.result, Err(Error::Runtime(RuntimeError::UndefinedVariable(_)))));
        assert_eq!(run.output, "1\n");
    }

    #[test]
    pub fn test_parse_error_inside_block_keeps_following_statements() {
        let run = run("{ print }\nprint 2;\nprint 3;");

        assert!(run.result.is_ok());
        assert_eq!(run.output, "2\n3\n");
        assert_eq!(run.evaluator.parse_errors().len(), 1);
    }

    #[test]
    pub fn test_lexer_error_runs_nothing() {
        let run = run("print 1; #");

        assert!(matches!(run.result, Err(Error::Lexer(_))));
        assert_eq!(run.output, "");
    }

    #[test]
    pub fn test_resolver_error_runs_nothing() {
        let run = run("print 1; return 2;");

        match run.result {
            Err(Error::Resolve(errors)) => assert_eq!(errors.len(), 1),
            other => panic!("expected resolve error, got {:?}", other),
        }

        assert_eq!(run.output, "");
    }
}

mod functions {
    use pretty_assertions::assert_eq;
    use super::*;

    #[test]
    pub fn test_closure_capture() {
        let source = "
            function makeCounter() {
                var count = 0;
                function increment() {
                    count = count + 1;
                    return count;
                }
                return increment;
            }

            var counter = makeCounter();
            var other = makeCounter();
            counter();
            counter();
            other();
            print counter();
            print other();
        ";

        assert_eq!(run(source).output, "3\n2\n");
    }

    #[test]
    pub fn test_closure_binds_at_declaration() {
        let source = "
            var a = \"global\";
            {
                function show() { return a; }
                print show();
                var a = \"block\";
                print show();
            }
        ";

        assert_eq!(run(source).output, "global\nglobal\n");
    }

    #[test]
    pub fn test_recursion() {
        assert_eq!(eval("function fib(n) { if (n < 2) return n; return fib(n - 1) + fib(n - 2); } fib(15)"),
                   Value::Number(610.0));
    }

    #[test]
    pub fn test_bare_return_is_null() {
        assert_eq!(eval("function f() { return; } f()"), Value::Null);
        assert_eq!(eval("function f() {} f()"), Value::Null);
    }

    #[test]
    pub fn test_arity_mismatch() {
        match runtime_error("function f(a, b) {}\nf(1);") {
            RuntimeError::ArityMismatch { token, expected, found } => {
                assert_eq!((expected, found), (2, 1));
                assert_eq!(token.line(), 2);
            },
            other => panic!("unexpected error {}", other),
        }
    }

    #[test]
    pub fn test_not_callable() {
        assert!(matches!(runtime_error("\"text\"();"), RuntimeError::NotCallable(_)));
        assert!(matches!(runtime_error("var a = 1; a();"), RuntimeError::NotCallable(_)));
    }

    #[test]
    pub fn test_stack_overflow() {
        let mut options = options();
        options.max_call_depth = 50;

        let run = run_with("function f(n) { return f(n + 1); } f(0);", options, |_| {});
        assert!(matches!(run.result, Err(Error::Runtime(RuntimeError::StackOverflow(_)))));
    }

    #[test]
    pub fn test_stack_overflow_at_default_depth() {
        assert_eq!(options().max_call_depth, DEFAULT_MAX_CALL_DEPTH);
        assert!(matches!(runtime_error("function f(n) { return f(n + 1); } f(0);"), RuntimeError::StackOverflow(_)));

        // Recursion just under the limit still completes
        let source = format!("function f(n) {{ if (n == 0) return 0; return 1 + f(n - 1); }} f({})", DEFAULT_MAX_CALL_DEPTH - 1);
        assert_eq!(eval(&source), Value::Number((DEFAULT_MAX_CALL_DEPTH - 1) as f64));
    }

    #[test]
    pub fn test_deeply_nested_expressions() {
        let depth = 5000;
        let source = format!("{}1{}", "(".repeat(depth), ")".repeat(depth));

        assert_eq!(eval(&source), Value::Number(1.0));
    }

    #[test]
    pub fn test_foreign_clock() {
        match eval("clock()") {
            Value::Number(seconds) => assert!(seconds > 0.0),
            other => panic!("expected a number, got {:?}", other),
        }
    }

    #[test]
    pub fn test_function_display() {
        assert_eq!(run("function f() {} print f; print clock;").output, "<function f>\n<foreign function clock>\n");
    }

    #[test]
    pub fn test_dynamic_global_fallback() {
        let run = run_with("function f() { return answer; } f()", options(), |evaluator| {
            evaluator.define_global("answer", Value::Number(42.0));
        });

        assert_eq!(run.result.unwrap(), Value::Number(42.0));
    }
}

mod classes {
    use pretty_assertions::assert_eq;
    use super::*;

    #[test]
    pub fn test_initializer_returns_instance() {
        let source = "
            class Point {
                init(x, y) {
                    this.x = x;
                    this.y = y;
                    return 5;
                }
            }

            var p = Point(1, 2);
            print p.x + p.y;
            print p;
            p.init(3, 4) == p
        ";

        let run = run(source);

        assert_eq!(run.output, "3\n<instance Point>\n");
        assert_eq!(run.result.unwrap(), Value::Boolean(true));
    }

    #[test]
    pub fn test_class_arity_follows_init() {
        assert!(matches!(runtime_error("class A { init(a) {} } A();"), RuntimeError::ArityMismatch { expected: 1, found: 0, .. }));
        assert!(matches!(runtime_error("class A {} A(1);"), RuntimeError::ArityMismatch { expected: 0, found: 1, .. }));
    }

    #[test]
    pub fn test_inherited_methods() {
        let source = "
            class A { hello() { return \"A\"; } }
            class B < A {}
            class C < B {}
            C().hello()
        ";

        assert_eq!(eval(source), string("A"));
    }

    #[test]
    pub fn test_inherited_initializer() {
        assert_eq!(eval("class A { init(v) { this.v = v; } } class B < A {} B(7).v"), Value::Number(7.0));
    }

    #[test]
    pub fn test_missing_method() {
        assert_eq!(eval("class A {} A().nothing"), Value::Null);
        assert!(matches!(runtime_error("class A {} class B < A {} B().missing();"), RuntimeError::NotCallable(_)));
    }

    #[test]
    pub fn test_methods_win_on_read_fields_on_write() {
        let source = "
            class A { m() { return \"method\"; } }
            var a = A();
            a.m = \"field\";
            a.x = 1;
            print a.x;
            a.m()
        ";

        let run = run(source);

        assert_eq!(run.output, "1\n");
        assert_eq!(run.result.unwrap(), string("method"));
    }

    #[test]
    pub fn test_this_is_bound_at_access() {
        let source = "
            class Counter {
                init() { this.count = 0; }
                add() { this.count = this.count + 1; return this; }
            }

            var counter = Counter();
            var add = counter.add;
            add();
            add();
            counter.count
        ";

        assert_eq!(eval(source), Value::Number(2.0));
    }

    #[test]
    pub fn test_super_is_lexical() {
        let source = "
            class A { greet() { return \"A\"; } }
            class B < A { greet() { return \"B\" + super.greet(); } }
            class C < B {}
            C().greet()
        ";

        assert_eq!(eval(source), string("BA"));
    }

    #[test]
    pub fn test_super_initializer() {
        let source = "
            class A { init(x) { this.x = x; } }
            class B < A { init(x, y) { super.init(x); this.y = y; } }
            var b = B(1, 2);
            b.x + b.y
        ";

        assert_eq!(eval(source), Value::Number(3.0));
    }

    #[test]
    pub fn test_missing_super_method() {
        assert!(matches!(runtime_error("class A {} class B < A { m() { return super.m(); } } B().m();"),
                         RuntimeError::InvalidPropertyAccess { .. }));
    }

    #[test]
    pub fn test_invalid_superclass() {
        assert!(matches!(runtime_error("var NotAClass = 1; class B < NotAClass {}"), RuntimeError::InvalidSuperclass(_)));
    }

    #[test]
    pub fn test_properties_need_instances() {
        assert!(matches!(runtime_error("var x = 1; x.y;"), RuntimeError::InvalidPropertyAccess { .. }));
        assert!(matches!(runtime_error("var x = 1; x.y = 2;"), RuntimeError::InvalidPropertyAccess { .. }));
    }

    #[test]
    pub fn test_instance_identity() {
        assert_eq!(eval("class A {} var a = A(); a == a"), Value::Boolean(true));
        assert_eq!(eval("class A {} A() == A()"), Value::Boolean(false));
    }
}

mod modules {
    use pretty_assertions::assert_eq;
    use super::*;

    #[test]
    pub fn test_exports_are_snapshots() {
        let run = run("var x = 1; export x; x = 2;");

        assert!(run.result.is_ok());
        assert_eq!(run.evaluator.exports().get("x"), Some(&Value::Number(1.0)));
    }

    #[test]
    pub fn test_export_order() {
        let run = run("var b = 1; var a = 2; export b; export a;");

        assert_eq!(run.evaluator.exports().keys().collect::<Vec<_>>(), vec!["b", "a"]);
    }

    #[test]
    pub fn test_builtin_math() {
        assert_eq!(eval("from math import sqrt, floor; sqrt(16) + floor(1.5)"), Value::Number(5.0));
        assert_eq!(eval("from math import pi; pi > 3.14"), Value::Boolean(true));
    }

    #[test]
    pub fn test_builtin_time() {
        assert_eq!(eval("from time import clock; clock() > 0"), Value::Boolean(true));
    }

    #[test]
    pub fn test_foreign_argument_error() {
        assert!(matches!(runtime_error("from math import abs; abs(\"x\");"), RuntimeError::InvalidOperand { .. }));
    }

    #[test]
    pub fn test_missing_builtin_export() {
        match runtime_error("from math import sqrt, nope;") {
            RuntimeError::ImportError { failure, .. } => {
                assert_eq!(failure, ImportFailure::MissingExports { module: String::from("math"), names: vec![String::from("nope")] });
                assert_eq!(failure.to_string(), "Module math does not export \"nope\".");
            },
            other => panic!("unexpected error {}", other),
        }
    }

    #[test]
    pub fn test_unknown_module() {
        match runtime_error("from nowhere import a;") {
            RuntimeError::ImportError { failure, .. } => assert_eq!(failure, ImportFailure::NotFound(String::from("nowhere"))),
            other => panic!("unexpected error {}", other),
        }
    }

    #[test]
    pub fn test_import_inside_block_is_local() {
        assert!(matches!(runtime_error("{ from math import sqrt; } sqrt(4);"), RuntimeError::UndefinedVariable(_)));
    }
}
