use crate::compiler::lexer::Lexer;
use super::*;

fn parse(source: &str) -> (Vec<Stmt>, Vec<ParseError>) {
    let tokens = Lexer::new(source).tokenize().unwrap();
    let mut parser = Parser::new(tokens);
    let statements = parser.parse();

    (statements, parser.into_errors())
}

fn parse_ok(source: &str) -> Vec<String> {
    let (statements, errors) = parse(source);
    assert!(errors.is_empty(), "{:?}", errors);

    statements.iter().map(|stmt| format!("{:?}", stmt)).collect()
}

mod expressions {
    use pretty_assertions::assert_eq;
    use super::*;

    #[test]
    pub fn test_precedence() {
        assert_eq!(parse_ok("1 + 2 * 3"), vec!["(1 + (2 * 3));"]);
        assert_eq!(parse_ok("(1 + 2) * 3"), vec!["((group (1 + 2)) * 3);"]);
        assert_eq!(parse_ok("1 - 2 - 3"), vec!["((1 - 2) - 3);"]);
        assert_eq!(parse_ok("-a < b == !c"), vec!["(((-a) < b) == (!c));"]);
    }

    #[test]
    pub fn test_logical() {
        assert_eq!(parse_ok("a or b and c"), vec!["(a or (b and c));"]);
    }

    #[test]
    pub fn test_assignment_is_right_associative() {
        assert_eq!(parse_ok("a = b = 1"), vec!["(a = (b = 1));"]);
    }

    #[test]
    pub fn test_call_chain() {
        assert_eq!(parse_ok("a.b(1, \"x\").c"), vec!["(((a.b)(1, \"x\")).c);"]);
        assert_eq!(parse_ok("f()()"), vec!["((f())());"]);
    }

    #[test]
    pub fn test_property_set() {
        assert_eq!(parse_ok("this.x = 2"), vec!["(this.x = 2);"]);
    }

    #[test]
    pub fn test_super_and_export() {
        assert_eq!(parse_ok("super.m(); export x"), vec!["(super.m());", "(export x);"]);
    }

    #[test]
    pub fn test_invalid_assignment_target() {
        let (statements, errors) = parse("1 + 2 = 3;");

        assert!(statements.is_empty());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "Invalid assignment target.");
        assert_eq!(errors[0].token.token_type(), TokenType::Assign);
    }

    #[test]
    pub fn test_missing_property_name() {
        let (_, errors) = parse("a.;");

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "Expect property name after '.'.");
    }

    #[test]
    pub fn test_expression_ids_are_unique() {
        let (statements, _) = parse("a; a;");

        let ids: Vec<ExprId> = statements.iter().filter_map(|stmt| match stmt {
            Stmt::Expression(Expr::Variable { id, .. }) => Some(*id),
            _ => None,
        }).collect();

        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
    }
}

mod statements {
    use pretty_assertions::assert_eq;
    use super::*;

    #[test]
    pub fn test_optional_semicolons() {
        assert_eq!(parse_ok("var a = 1\nprint a\na = 2;"), vec!["var a = 1;", "print a;", "(a = 2);"]);
    }

    #[test]
    pub fn test_stray_semicolons() {
        assert_eq!(parse_ok(";; print 1;;"), vec!["print 1;"]);
    }

    #[test]
    pub fn test_if_else() {
        assert_eq!(parse_ok("if (a) print 1; else { print 2; }"), vec!["if (a) print 1; else { print 2; }"]);
    }

    #[test]
    pub fn test_for_desugars_to_while() {
        assert_eq!(parse_ok("for (var i = 0; i < 3; i = i + 1) print i;"),
                   vec!["{ var i = 0; while ((i < 3)) { print i; (i = (i + 1)); } }"]);
        assert_eq!(parse_ok("for (;;) print 1;"), vec!["while (true) print 1;"]);
    }

    #[test]
    pub fn test_function() {
        assert_eq!(parse_ok("function add(a, b) { return a + b; }"),
                   vec!["function add(a, b) { return (a + b); }"]);
    }

    #[test]
    pub fn test_bare_return() {
        assert_eq!(parse_ok("function f() { return }"), vec!["function f() { return; }"]);
    }

    #[test]
    pub fn test_class() {
        assert_eq!(parse_ok("class B < A { init(x) { this.x = x; } get() { return this.x; } }"),
                   vec!["class B < A { init(x) { (this.x = x); } get() { return (this.x); } }"]);
    }

    #[test]
    pub fn test_import() {
        assert_eq!(parse_ok("from lib import a, b"), vec!["from lib import a, b;"]);
    }

    #[test]
    pub fn test_import_without_keyword() {
        let (_, errors) = parse("from lib a;");

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "Missing import keyword.");
    }

    #[test]
    pub fn test_too_many_arguments() {
        let args = vec!["1"; 256].join(", ");
        let (statements, errors) = parse(&format!("f({});", args));

        assert_eq!(statements.len(), 1);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "Can't have more than 255 arguments.");
    }
}

mod recovery {
    use pretty_assertions::assert_eq;
    use super::*;

    #[test]
    pub fn test_single_error_keeps_following_statements() {
        let (statements, errors) = parse("var = 1; print 2; print 3; print 4;");

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "Expect variable name.");
        assert_eq!(statements.iter().map(|stmt| format!("{:?}", stmt)).collect::<Vec<_>>(),
                   vec!["print 2;", "print 3;", "print 4;"]);
    }

    #[test]
    pub fn test_resync_at_keyword_without_semicolon() {
        let (statements, errors) = parse("print ) var a = 1");

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "Expect expression.");
        assert_eq!(statements.len(), 1);
    }

    #[test]
    pub fn test_error_position() {
        let (_, errors) = parse("var a = 1;\nvar b = );");

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].to_string(), "Error on line 2 col 9: Expect expression.");
    }

    #[test]
    pub fn test_error_inside_block_keeps_the_block_closed() {
        let (statements, errors) = parse("{ print }\nprint 2;\nprint 3;");

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "Expect expression.");
        assert_eq!(statements.iter().map(|stmt| format!("{:?}", stmt)).collect::<Vec<_>>(),
                   vec!["{  }", "print 2;", "print 3;"]);
    }

    #[test]
    pub fn test_error_inside_nested_block() {
        let (statements, errors) = parse("{ { var = 1 } print 1; } print 2;");

        assert_eq!(errors.len(), 1);
        assert_eq!(statements.len(), 2);
    }

    #[test]
    pub fn test_unclosed_block_at_eof() {
        let (_, errors) = parse("{ print 1;");

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "Expect '}' after block.");
        assert_eq!(errors[0].token.token_type(), TokenType::Eof);
    }
}
