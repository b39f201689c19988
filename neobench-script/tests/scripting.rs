use std::io::Read;
use std::path::Path;

use rand::rngs::StdRng;
use rand::SeedableRng;

use neobench_script::{parse, CsvLoader, EvalError, ScriptContext, Statement, UnitOfWork, Vars};
use neobench_value::Value;

fn test_loader() -> CsvLoader {
    CsvLoader::with_source(|path: &Path| {
        if path == Path::new("/data.csv") {
            Ok(Box::new("row1, 1, 1.3\n\"row2\", 2, 2.0".as_bytes()) as Box<dyn Read>)
        } else {
            Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("(test) not found: {}", path.display()),
            ))
        }
    })
}

fn base_vars() -> Vars {
    let mut vars = Vars::default();
    vars.insert("scale".to_string(), Value::Int(1));
    vars.insert(
        "somelist".to_string(),
        Value::list(vec![Value::Int(1), Value::Int(2)]),
    );
    vars
}

fn eval_source(name: &str, source: &str) -> Result<UnitOfWork, EvalError> {
    let script = parse(name, source, 1.0).expect("script parses");
    let mut rng = StdRng::seed_from_u64(1337);
    let loader = test_loader();
    let mut sink = Vec::new();
    let mut ctx = ScriptContext {
        script_name: &script.name,
        vars: base_vars(),
        rng: &mut rng,
        csv: &loader,
        debug_out: &mut sink,
        preflight: false,
    };
    script.eval(&mut ctx)
}

/// Evaluate one expression via `:set v <expr>` and return the `v` param.
fn eval_expr(expr: &str) -> Result<Value, EvalError> {
    let uow = eval_source(
        &format!("expr:'{expr}'"),
        &format!(":set v {expr}\nRETURN {{v}};"),
    )?;
    Ok(uow.statements[0].params["v"].clone())
}

fn expect_value(expr: &str) -> Value {
    match eval_expr(expr) {
        Ok(v) => v,
        Err(e) => panic!("evaluating {expr:?}: {e}"),
    }
}

fn expect_int(expr: &str) -> i64 {
    match expect_value(expr) {
        Value::Int(i) => i,
        other => panic!("{expr:?} evaluated to {other:?}, wanted an int"),
    }
}

fn expect_float(expr: &str) -> f64 {
    match expect_value(expr) {
        Value::Float(f) => f,
        other => panic!("{expr:?} evaluated to {other:?}, wanted a float"),
    }
}

#[test]
fn scalar_expressions() {
    assert_eq!(expect_int("0"), 0);
    assert_eq!(expect_int("-0"), 0);
    assert_eq!(expect_int("1"), 1);
    assert_eq!(expect_int("9999999000"), 9_999_999_000);
    assert_eq!(expect_int("-9999999000"), -9_999_999_000);
    assert_eq!(expect_value("\"Hello\""), Value::string("Hello"));
    assert_eq!(expect_value("true"), Value::Bool(true));
    assert_eq!(expect_value("false"), Value::Bool(false));
}

#[test]
fn string_concatenation() {
    assert_eq!(expect_value("\"Hello\" + 123"), Value::string("Hello123"));
    assert_eq!(
        expect_value("123 + \"Hello\" + 123"),
        Value::string("123Hello123")
    );
}

#[test]
fn composite_expressions() {
    assert_eq!(
        expect_value("[1, 2, [3]]"),
        Value::list(vec![
            Value::Int(1),
            Value::Int(2),
            Value::list(vec![Value::Int(3)]),
        ])
    );
    assert_eq!(
        expect_value("[\"a\", \"b\"]"),
        Value::list(vec![Value::string("a"), Value::string("b")])
    );

    let empty = expect_value("{}");
    assert_eq!(empty, Value::Map(Default::default()));

    match expect_value("{ key: 1, nest: [ 1 ] }") {
        Value::Map(map) => {
            assert_eq!(map.len(), 2);
            assert_eq!(map["key"], Value::Int(1));
            assert_eq!(map["nest"], Value::list(vec![Value::Int(1)]));
        }
        other => panic!("wanted a map, got {other:?}"),
    }
}

#[test]
fn arithmetic_and_precedence() {
    assert_eq!(expect_int("1 * 2"), 2);
    assert_eq!(expect_int("1 * 2 * 4"), 8);
    assert_eq!(expect_int("-1 * 1337"), -1337);
    assert_eq!(expect_int("7 % 8"), 7);
    assert_eq!(expect_int("6 % 6"), 0);

    assert_eq!(expect_float("2 / 2"), 1.0);
    assert_eq!(expect_float("16 / 2 / 2"), 4.0);

    assert_eq!(expect_int("1 + 2"), 3);
    assert_eq!(expect_int("1 + 2 + 4"), 7);
    assert_eq!(expect_int("-1 + 1337"), 1336);

    assert_eq!(expect_int("1 - 2"), -1);
    assert_eq!(expect_int("1 - 2 - 4"), -5);
    assert_eq!(expect_int("-1 - 1337"), -1338);

    assert_eq!(expect_int("1 + 2 * 3"), 7);
    assert_eq!(expect_int("1 * 2 + 1"), 3);
    assert_eq!(expect_int("1 + 1 * 2"), 3);
    assert_eq!(expect_float("2 * 2 / 4"), 1.0);
    assert_eq!(expect_float("2 / 2 * 4"), 4.0);
    assert_eq!(expect_int("2 - 1 * 2 + 1"), 1);

    assert_eq!(expect_int("1 * (2 + 1)"), 3);
    assert_eq!(expect_int("(1 * (2 + 1))"), 3);
    assert_eq!(expect_int("(1 * (2 + (1)))"), 3);
}

#[test]
fn indexing() {
    assert_eq!(expect_int("[1,2][0]"), 1);
    assert_eq!(expect_int("[1,2][1]"), 2);
    assert_eq!(expect_int("range(1, 5)[abs(-1)]"), 2);
    assert_eq!(expect_int("$somelist[1]"), 2);

    let err = eval_expr("[1,2][5]").unwrap_err();
    assert!(err.0.contains("out of range"), "{err}");
    let err = eval_expr("[1,2][0.5]").unwrap_err();
    assert!(err.0.contains("floats can't be used as indexes"), "{err}");
}

#[test]
fn list_comprehensions() {
    assert_eq!(
        expect_value("[ i in range(1,3) | $i ]"),
        Value::list(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
    );
    assert_eq!(
        expect_value("[ i in range(1,3) | $i * 1337 ]"),
        Value::list(vec![Value::Int(1337), Value::Int(2674), Value::Int(4011)])
    );
}

#[test]
fn comprehension_scope_does_not_leak() {
    let uow = eval_source(
        "scope",
        ":set i 100\n:set l [ i in range(1,3) | $i ]\nRETURN $i, $l;",
    )
    .expect("evaluates");
    assert_eq!(uow.statements[0].params["i"], Value::Int(100));
}

#[test]
fn functions() {
    assert_eq!(expect_int("abs(-17)"), 17);
    assert!((expect_float("abs(-17.6)") - 17.6).abs() < 1e-9);
    assert_eq!(expect_float("double(5432)"), 5432.0);
    assert_eq!(expect_float("double(5432.0)"), 5432.0);
    assert_eq!(expect_int("greatest(5, 4, 3, 2)"), 5);
    assert_eq!(expect_int("greatest(-5, -4, -3, -2)"), -2);
    assert_eq!(expect_float("greatest(5, 4, 3, 2.0, 8)"), 8.0);
    assert_eq!(expect_int("least(5, 4, 3, 2)"), 2);
    assert_eq!(expect_float("least(5, 4, 3, 2.0, 8)"), 2.0);
    assert_eq!(expect_int("least(-5, -4, -3, -2)"), -5);
    assert_eq!(expect_int("len([1,2,3])"), 3);
    assert_eq!(expect_int("len([])"), 0);
    assert_eq!(expect_int("int(5.4 + 3.8)"), 9);
    assert_eq!(expect_int("int(5 + 4)"), 9);
    assert!((expect_float("pi()") - std::f64::consts::PI).abs() < 1e-12);
    assert!((expect_float("sqrt(2.0)") - 1.414213562).abs() < 1e-6);
    assert_eq!(
        expect_value("range(1, 5)"),
        Value::list((1..=5).map(Value::Int).collect())
    );
}

#[test]
fn csv_function_types_cells() {
    assert_eq!(
        expect_value("csv(\"/data.csv\")"),
        Value::list(vec![
            Value::list(vec![Value::string("row1"), Value::Int(1), Value::Float(1.3)]),
            Value::list(vec![Value::string("row2"), Value::Int(2), Value::Float(2.0)]),
        ])
    );
}

#[test]
fn random_functions_stay_in_bounds_and_are_seeded() {
    for _ in 0..200 {
        let v = expect_int("random(1, 5)");
        assert!((1..5).contains(&v), "random(1, 5) gave {v}");
        let g = expect_int("random_gaussian(1, 10, 2.5)");
        assert!((1..=10).contains(&g), "random_gaussian gave {g}");
        let e = expect_int("random_exponential(1, 10, 2.5)");
        assert!((1..=10).contains(&e), "random_exponential gave {e}");
    }
    assert_eq!(expect_int("random(3, 3)"), 3);

    // A fixed seed means a fixed draw.
    assert_eq!(expect_int("random(1, 5000)"), expect_int("random(1, 5000)"));

    match expect_value("random_matrix(2, [1,5], [5,8])") {
        Value::List(rows) => {
            assert_eq!(rows.len(), 2);
            for row in rows.iter() {
                let cells = row.as_list().expect("row is a list");
                assert_eq!(cells.len(), 2);
                assert!(matches!(cells[0], Value::Int(v) if (1..5).contains(&v)));
                assert!(matches!(cells[1], Value::Int(v) if (5..8).contains(&v)));
            }
        }
        other => panic!("wanted a matrix, got {other:?}"),
    }
}

#[test]
fn evaluation_errors_are_described() {
    let err = eval_expr("blorb(1)").unwrap_err();
    assert_eq!(err.0, "unknown function: blorb(1)");

    let err = eval_expr("$undefinedvar").unwrap_err();
    assert_eq!(err.0, "this variable is not defined: undefinedvar");

    let err = eval_expr("1.5 % 2").unwrap_err();
    assert!(err.0.contains("both sides to be integers"), "{err}");

    let err = eval_expr("1 % 0").unwrap_err();
    assert!(err.0.contains("by zero"), "{err}");

    let err = eval_expr("random(1.0, 5)").unwrap_err();
    assert!(err.0.contains("must be integers"), "{err}");

    let err = eval_expr("csv(\"/missing.csv\")").unwrap_err();
    assert!(err.0.contains("/missing.csv"), "{err}");
}

#[test]
fn debug_writes_to_the_diagnostic_stream() {
    let script = parse("test:debug(..)", ":set blah debug(1337) * 10\nRETURN { blah };", 1.0)
        .expect("parses");
    let mut rng = StdRng::seed_from_u64(1337);
    let loader = test_loader();
    let mut sink = Vec::new();
    let mut ctx = ScriptContext {
        script_name: &script.name,
        vars: base_vars(),
        rng: &mut rng,
        csv: &loader,
        debug_out: &mut sink,
        preflight: false,
    };
    let uow = script.eval(&mut ctx).expect("evaluates");
    assert_eq!(uow.statements[0].params["blah"], Value::Int(13370));
    assert_eq!(String::from_utf8(sink).unwrap(), "1337\n");
}

#[test]
fn sleep_command_is_parsed_and_skipped_in_output() {
    let uow = eval_source(
        "sleep",
        ":set sleeptime 13\n:sleep $sleeptime us\nRETURN 1;",
    )
    .expect("evaluates");
    assert_eq!(
        uow.statements,
        vec![Statement {
            query: "RETURN 1".to_string(),
            params: Default::default(),
        }]
    );
}

#[test]
fn sleep_units_parse() {
    use neobench_script::{Command, SleepUnit};

    let cases = [
        (":sleep 10", SleepUnit::Seconds),
        (":sleep 10 s", SleepUnit::Seconds),
        (":sleep 10s", SleepUnit::Seconds),
        (":sleep 10 ms", SleepUnit::Millis),
        (":sleep 10 us", SleepUnit::Micros),
    ];
    for (src, want) in cases {
        let script = parse(&format!("testSleep:'{src}'"), src, 1.0).expect("parses");
        match &script.commands[0] {
            Command::Sleep { unit, .. } => assert_eq!(*unit, want, "{src}"),
            other => panic!("expected sleep command for {src}, got {other:?}"),
        }
    }

    let err = parse("testSleep", ":sleep 10 days", 1.0).unwrap_err();
    assert!(
        err.message
            .contains(":sleep command must use 'us', 'ms', or 's' unit argument - or none. got: days"),
        "{err}"
    );
    assert_eq!(err.file, "testSleep");
    assert_eq!(err.line, 1);
}

#[test]
fn comments_are_skipped() {
    let uow = eval_source(
        "sleep",
        "\n// This is a comment on the set metacommand\n:set sleeptime 13 // eol comment\n\n// A comment on a query\nRETURN {sleeptime};",
    )
    .expect("evaluates");
    let mut params = neobench_script::Vars::default();
    params.insert("sleeptime".to_string(), Value::Int(13));
    assert_eq!(
        uow.statements,
        vec![Statement {
            query: "RETURN {sleeptime}".to_string(),
            params,
        }]
    );
}

#[test]
fn unused_params_are_not_sent() {
    let uow = eval_source(
        "sleep",
        "\n:set notSent 13\n:set sent $notSent + 10\n:set alsoSent $notSent + 1\n:set quotedSent $notSent + 2\n\nRETURN {sent} + $alsoSent + {`quotedSent`};",
    )
    .expect("evaluates");
    assert_eq!(uow.statements.len(), 1);
    let stmt = &uow.statements[0];
    assert_eq!(stmt.query, "RETURN {sent} + $alsoSent + {`quotedSent`}");
    assert_eq!(stmt.params.len(), 3);
    assert_eq!(stmt.params["sent"], Value::Int(23));
    assert_eq!(stmt.params["alsoSent"], Value::Int(14));
    assert_eq!(stmt.params["quotedSent"], Value::Int(15));
}

#[test]
fn client_side_params_become_literals() {
    let uow = eval_source(
        "sleep",
        "\n:set clientSide 7331\n:set serverSide 1337\n:set clientSideList [ i in range(1,2) | \"hello\" + $i ]\n\nRETURN $serverSide + {serverSide} + $$clientSide, $$clientSideList;",
    )
    .expect("evaluates");
    assert_eq!(uow.statements.len(), 1);
    let stmt = &uow.statements[0];
    assert_eq!(
        stmt.query,
        "RETURN $serverSide + {serverSide} + 7331, [\"hello1\", \"hello2\"]"
    );
    assert_eq!(stmt.params.len(), 1);
    assert_eq!(stmt.params["serverSide"], Value::Int(1337));
}

#[test]
fn multi_statement_scripts_preserve_order() {
    let uow = eval_source(
        "multi",
        "\n:set ids [1337]\n:set comp [ i in range(1, 10) | {i: $i, id: $ids[random(0, len($ids))]} ]\n:set date \"2021-01-27\"\n\nMATCH (a);\nMATCH (b);",
    )
    .expect("evaluates");
    assert_eq!(
        uow.statements,
        vec![
            Statement {
                query: "MATCH (a)".to_string(),
                params: Default::default(),
            },
            Statement {
                query: "MATCH (b)".to_string(),
                params: Default::default(),
            },
        ]
    );
}

#[test]
fn same_seed_same_unit_of_work() {
    let script = parse(
        "det",
        ":set a random(1, 100000)\n:set b random_gaussian(1, 500, 3.0)\nRETURN $a, $b;",
        1.0,
    )
    .unwrap();
    let loader = test_loader();

    let mut run = |seed: u64| {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut sink = Vec::new();
        let mut ctx = ScriptContext {
            script_name: &script.name,
            vars: base_vars(),
            rng: &mut rng,
            csv: &loader,
            debug_out: &mut sink,
            preflight: false,
        };
        script.eval(&mut ctx).expect("evaluates")
    };

    assert_eq!(run(99), run(99));
    assert_ne!(run(99), run(100));
}

#[test]
fn preflight_mode_skips_sleeps() {
    let script = parse("pf", ":sleep 3600\nRETURN 1;", 1.0).expect("parses");
    let mut rng = StdRng::seed_from_u64(1337);
    let loader = test_loader();
    let mut sink = Vec::new();
    let mut ctx = ScriptContext {
        script_name: &script.name,
        vars: base_vars(),
        rng: &mut rng,
        csv: &loader,
        debug_out: &mut sink,
        preflight: true,
    };
    // Would block for an hour if the sleep ran.
    let uow = script.eval(&mut ctx).expect("evaluates");
    assert_eq!(uow.statements.len(), 1);
}
