//! End-to-end pipeline tests: source in, artifacts out

use rlcc::{Compiler, Stage};

#[test]
fn test_all_artifacts_produced() {
    let source = "let x = 2 + 3;\nprint(x);";
    let data = Compiler::new().compile(source);

    assert!(data.success, "{:?}", data.errors);
    assert_eq!(data.stage, Stage::CodeGeneration);
    assert!(!data.tokens.is_empty());
    assert!(data.ast.is_some());
    assert!(data.semantic_errors.is_empty());
    assert!(!data.intermediate_code.is_empty());
    assert!(!data.optimized_code.is_empty());
    assert!(data.python_code.is_some());
}

#[test]
fn test_constant_expression_folds() {
    let data = Compiler::new().compile("let x = 2 + 3;\nprint(x);");
    // The fold propagates through the copy and the temp goes away.
    assert_eq!(data.optimized_code, vec!["x = 5", "PRINT x"]);
    assert!(data
        .optimization_log
        .iter()
        .any(|l| l.contains("constant_folding")));
}

#[test]
fn test_prints_survive_optimization_in_order() {
    let source = "let a = 1 * 0;\nprint(1);\nprint(2);\nprint(a);";
    let data = Compiler::new().compile(source);
    assert!(data.success, "{:?}", data.errors);

    let prints = |lines: &[String]| -> Vec<String> {
        lines
            .iter()
            .filter(|l| l.starts_with("PRINT"))
            .cloned()
            .collect()
    };
    assert_eq!(
        prints(&data.intermediate_code),
        prints(&data.optimized_code)
    );
}

#[test]
fn test_optimized_never_longer() {
    let sources = [
        "let x = 2 + 3;\nprint(x);",
        "let i = 0;\nwhile (i < 10) { let unused = i * 9; i += 1; }\nprint(i);",
        "let a = 1;\nlet b = 2;\nlet c = a + b;\nlet d = a + b;\nprint(c + d);",
    ];
    for source in sources {
        let data = Compiler::new().compile(source);
        assert!(data.success, "{}: {:?}", source, data.errors);
        assert!(
            data.optimized_code.len() <= data.intermediate_code.len(),
            "{}",
            source
        );
    }
}

#[test]
fn test_dead_store_in_loop_removed() {
    let source = "let i = 0;\nwhile (i < 10) { let unused = i * 9; i += 1; }\nprint(i);";
    let data = Compiler::new().compile(source);
    assert!(data.success, "{:?}", data.errors);
    assert!(data
        .intermediate_code
        .iter()
        .any(|l| l.contains("i * 9")));
    assert!(!data.optimized_code.iter().any(|l| l.contains("i * 9")));
}

#[test]
fn test_syntax_error_reported_with_position() {
    let data = Compiler::new().compile("let x = ;\nprint(1);");
    assert!(!data.success);
    let error = data
        .errors
        .iter()
        .find(|e| e.contains("Syntax error"))
        .expect("syntax error reported");
    assert!(error.contains("line 1"), "{}", error);
}

#[test]
fn test_multiple_syntax_errors_in_one_run() {
    let data = Compiler::new().compile("let = 1;\nprint(2);\nlet 5 = 3;\nprint(4);");
    assert!(!data.success);
    let count = data
        .errors
        .iter()
        .filter(|e| e.contains("Syntax error"))
        .count();
    assert!(count >= 2, "{:?}", data.errors);
}

#[test]
fn test_semantic_error_blocks_codegen() {
    let data = Compiler::new().compile("let x = 1;\nprint(x + y);");
    assert!(!data.success);
    assert_eq!(data.stage, Stage::SemanticAnalysis);
    assert!(data.python_code.is_none());
    assert!(data
        .semantic_errors
        .iter()
        .any(|e| e.contains("'y'")));
}

#[test]
fn test_warnings_do_not_block() {
    // Unused variable is only a warning.
    let data = Compiler::new().compile("let x = 1;\nlet y = 2;\nprint(x);");
    assert!(data.success, "{:?}", data.errors);
    assert!(data
        .semantic_errors
        .iter()
        .any(|e| e.contains("Warning") && e.contains("'y'")));
}

#[test]
fn test_token_dump_wire_shape() {
    let data = Compiler::new().compile("let x = 1;\nprint(x);");
    let json = data.to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();

    let first = &value["tokens"][0];
    assert_eq!(first["type"], "LET");
    assert_eq!(first["value"], "let");
    assert_eq!(first["line"], 1);
    assert_eq!(first["column"], 1);
}

#[test]
fn test_ast_dump_is_tagged_tree() {
    let data = Compiler::new().compile("let x = 1 + 2;\nprint(x);");
    let json = data.to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();

    let first = &value["ast"]["statements"][0];
    assert_eq!(first["type"], "Let");
    assert_eq!(first["name"], "x");
    assert_eq!(first["value"]["type"], "BinaryOp");
    assert_eq!(first["value"]["left"]["type"], "IntLiteral");
}

#[test]
fn test_tac_text_forms() {
    let source = "let x = 0;\nscan(x);\nwhile (x > 0) { print(x); x -= 1; }";
    let data = Compiler::new().compile(source);
    assert!(data.success, "{:?}", data.errors);

    let ir = &data.intermediate_code;
    assert!(ir.contains(&"SCAN x".to_string()), "{:?}", ir);
    assert!(ir.contains(&"L1:".to_string()), "{:?}", ir);
    assert!(ir.contains(&"IF_FALSE t1 GOTO L2".to_string()), "{:?}", ir);
    assert!(ir.contains(&"GOTO L1".to_string()), "{:?}", ir);
    assert!(ir.contains(&"PRINT x".to_string()), "{:?}", ir);
}

#[test]
fn test_deterministic_output() {
    let source = "let i = 0;\nwhile (i < 4) { let a = 2 * 3; print(a + i); i += 1; }";
    let first = Compiler::new().compile(source);
    let second = Compiler::new().compile(source);
    assert_eq!(first.optimized_code, second.optimized_code);
    assert_eq!(first.optimization_log, second.optimization_log);
    assert_eq!(first.python_code, second.python_code);
}

#[test]
fn test_else_if_chain_compiles() {
    let source = "let x = 5;\nif (x > 9) { print(1); } else if (x > 4) { print(2); } else { print(3); }";
    let data = Compiler::new().compile(source);
    assert!(data.success, "{:?}", data.errors);
    let python = data.python_code.unwrap();
    assert!(python.contains("else:"), "{}", python);
}

#[test]
fn test_function_round_trip() {
    let source = "fn square(n) { return n * n; }\nprint(square(7));";
    let data = Compiler::new().compile(source);
    assert!(data.success, "{:?}", data.errors);
    assert!(data
        .intermediate_code
        .contains(&"FUNC square".to_string()));
    let python = data.python_code.unwrap();
    assert!(python.contains("def square(n):"), "{}", python);
}
