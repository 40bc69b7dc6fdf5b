use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use crate::{
    exception::{names, OnyxException},
    runtime::{
        call_value,
        expression::{BinaryOp, Expression, LValue},
        frame::Frame,
        function::{call_function, Param, UserFunction},
        scope::{LocalId, ParseScope},
        statement::{ExitPolicy, Flow, ForeachSource, ForeachStatement, Statement, StatementBlock},
    },
    types::{
        class::{Access, ClassBuilder, MemberInit, OnyxClass},
        closure::OnyxClosure,
        method::MethodVariant,
        typeinfo::TypeInfo,
        value::OnyxValue,
    },
};

fn lit(value: impl Into<OnyxValue>) -> Expression {
    Expression::literal(value)
}

fn var(id: LocalId) -> Expression {
    Expression::Local(id)
}

fn bin(op: BinaryOp, a: Expression, b: Expression) -> Expression {
    Expression::binary(op, a, b)
}

fn set(id: LocalId, value: Expression) -> Statement {
    Statement::Expression(Expression::assign(LValue::Local(id), value))
}

fn list(items: &[i64]) -> Expression {
    Expression::ListLit(items.iter().map(|i| lit(*i)).collect())
}

/// `log = log + [text]`
fn append(log: LocalId, text: &str) -> Statement {
    set(
        log,
        bin(BinaryOp::Add, var(log), Expression::ListLit(vec![lit(text)])),
    )
}

fn block(statements: Vec<Statement>) -> StatementBlock {
    StatementBlock::new(statements, Vec::new())
}

fn throw(err: &str) -> Statement {
    Statement::Throw {
        err: lit(err),
        desc: Some(lit("raised by a test")),
        arg: None,
    }
}

/// Runs `statements` in a fresh frame sized for `scope`.
fn run(scope: &ParseScope, statements: Vec<Statement>) -> (Result<Flow, OnyxException>, Frame) {
    let mut frame = Frame::new(scope.frame_size(), None, None);
    let outcome = block(statements).exec(&mut frame);
    (outcome, frame)
}

fn ints(value: &OnyxValue) -> Vec<i64> {
    value
        .as_list()
        .map(|l| l.iter().map(OnyxValue::to_int).collect())
        .unwrap_or_default()
}

fn strings(value: &OnyxValue) -> Vec<String> {
    value
        .as_list()
        .map(|l| l.iter().map(OnyxValue::to_string_value).collect())
        .unwrap_or_default()
}

fn eval(expr: Expression) -> Result<OnyxValue, OnyxException> {
    let mut frame = Frame::new(0, None, None);
    let value = expr.eval(&mut frame);
    frame.release().unwrap();
    value
}

#[test]
fn test_exit_handlers_on_error() {
    let mut scope = ParseScope::new();
    let log = scope.declare("log");
    let inner = block(vec![
        Statement::OnBlockExit {
            policy: ExitPolicy::Unconditional,
            body: block(vec![append(log, "H1")]),
        },
        Statement::OnBlockExit {
            policy: ExitPolicy::Success,
            body: block(vec![append(log, "H2")]),
        },
        Statement::OnBlockExit {
            policy: ExitPolicy::Error,
            body: block(vec![append(log, "H3")]),
        },
        throw("BOOM"),
        append(log, "unreachable"),
    ]);
    let (outcome, frame) = run(&scope, vec![Statement::Block(inner)]);
    assert_eq!(outcome.unwrap_err().err(), "BOOM");
    assert_eq!(strings(&frame.local(log)), vec!["H3", "H1"]);
    frame.release().unwrap();
}

#[test]
fn test_exit_handlers_on_success() {
    let mut scope = ParseScope::new();
    let log = scope.declare("log");
    let inner = block(vec![
        Statement::OnBlockExit {
            policy: ExitPolicy::Unconditional,
            body: block(vec![append(log, "H1")]),
        },
        Statement::OnBlockExit {
            policy: ExitPolicy::Success,
            body: block(vec![append(log, "H2")]),
        },
        Statement::OnBlockExit {
            policy: ExitPolicy::Error,
            body: block(vec![append(log, "H3")]),
        },
        append(log, "body"),
    ]);
    let (outcome, frame) = run(&scope, vec![Statement::Block(inner)]);
    assert!(matches!(outcome.unwrap(), Flow::Normal));
    assert_eq!(strings(&frame.local(log)), vec!["body", "H2", "H1"]);
    frame.release().unwrap();
}

#[test]
fn test_handler_registered_after_the_error_does_not_run() {
    let mut scope = ParseScope::new();
    let log = scope.declare("log");
    let inner = block(vec![
        throw("EARLY"),
        Statement::OnBlockExit {
            policy: ExitPolicy::Unconditional,
            body: block(vec![append(log, "late")]),
        },
    ]);
    let (outcome, frame) = run(&scope, vec![Statement::Block(inner)]);
    assert_eq!(outcome.unwrap_err().err(), "EARLY");
    assert!(frame.local(log).is_nothing());
    frame.release().unwrap();
}

#[test]
fn test_error_handler_rethrow_and_chaining() {
    let scope = ParseScope::new();
    let rethrowing = block(vec![
        Statement::OnBlockExit {
            policy: ExitPolicy::Error,
            body: block(vec![Statement::Rethrow]),
        },
        throw("FIRST"),
    ]);
    let (outcome, frame) = run(&scope, vec![Statement::Block(rethrowing)]);
    let e = outcome.unwrap_err();
    assert_eq!(e.err(), "FIRST");
    assert!(e.next().is_none());
    frame.release().unwrap();

    let throwing = block(vec![
        Statement::OnBlockExit {
            policy: ExitPolicy::Error,
            body: block(vec![throw("SECOND")]),
        },
        throw("FIRST"),
    ]);
    let (outcome, frame) = run(&scope, vec![Statement::Block(throwing)]);
    let e = outcome.unwrap_err();
    assert_eq!(e.err(), "FIRST");
    assert_eq!(e.next().map(OnyxException::err), Some("SECOND"));
    frame.release().unwrap();

    let (outcome, frame) = run(&scope, vec![Statement::Rethrow]);
    assert_eq!(outcome.unwrap_err().err(), names::RETHROW_ERROR);
    frame.release().unwrap();
}

#[test]
fn test_try_catch_binds_the_exception() {
    let mut scope = ParseScope::new();
    let caught = scope.declare("e");
    let result = scope.declare("result");
    let statements = vec![Statement::Try {
        body: block(vec![throw("MY-ERROR")]),
        catch_var: Some(caught),
        handler: block(vec![set(
            result,
            Expression::Member {
                object: Box::new(var(caught)),
                name: "err".into(),
            },
        )]),
    }];
    let (outcome, frame) = run(&scope, statements);
    outcome.unwrap();
    assert_eq!(frame.local(result).to_string_value(), "MY-ERROR");
    frame.release().unwrap();

    // a rethrow from the catch block propagates the caught exception
    let statements = vec![Statement::Try {
        body: block(vec![throw("AGAIN")]),
        catch_var: None,
        handler: block(vec![Statement::Rethrow]),
    }];
    let (outcome, frame) = run(&scope, statements);
    assert_eq!(outcome.unwrap_err().err(), "AGAIN");
    frame.release().unwrap();
}

#[test]
fn test_foreach_over_scalars_and_nothing() {
    let mut scope = ParseScope::new();
    let x = scope.declare("x");
    let count = scope.declare("count");
    let sum = scope.declare("sum");
    let body = || {
        block(vec![
            set(count, bin(BinaryOp::Add, var(count), lit(1))),
            set(sum, bin(BinaryOp::Add, var(sum), var(x))),
        ])
    };
    let (outcome, frame) = run(
        &scope,
        vec![
            set(count, lit(0)),
            set(sum, lit(0)),
            Statement::foreach(LValue::Local(x), lit(5), body()),
        ],
    );
    outcome.unwrap();
    assert_eq!(frame.local(count).to_int(), 1);
    assert_eq!(frame.local(sum).to_int(), 5);
    frame.release().unwrap();

    let (outcome, frame) = run(
        &scope,
        vec![
            set(count, lit(0)),
            Statement::foreach(LValue::Local(x), Expression::Literal(OnyxValue::Nothing), body()),
        ],
    );
    outcome.unwrap();
    assert_eq!(frame.local(count).to_int(), 0);
    frame.release().unwrap();
}

#[test]
fn test_foreach_exposes_the_implicit_index() {
    let mut scope = ParseScope::new();
    let x = scope.declare("x");
    let seen = scope.declare("seen");
    let body = block(vec![set(
        seen,
        bin(BinaryOp::Add, var(seen), Expression::ListLit(vec![Expression::ImplicitIndex])),
    )]);
    let (outcome, frame) = run(
        &scope,
        vec![
            set(seen, Expression::ListLit(vec![])),
            Statement::foreach(LValue::Local(x), list(&[7, 8, 9]), body),
        ],
    );
    outcome.unwrap();
    assert_eq!(ints(&frame.local(seen)), vec![0, 1, 2]);
    frame.release().unwrap();
}

#[test]
fn test_foreach_by_reference_writes_back() {
    let mut scope = ParseScope::new();
    let x = scope.declare("x");
    let items = scope.declare("items");
    let times_ten = || set(x, bin(BinaryOp::Mul, var(x), lit(10)));

    let (outcome, frame) = run(
        &scope,
        vec![
            set(items, list(&[1, 2, 3])),
            Statement::foreach_ref(LValue::Local(x), LValue::Local(items), block(vec![times_ten()])),
        ],
    );
    outcome.unwrap();
    assert_eq!(ints(&frame.local(items)), vec![10, 20, 30]);
    frame.release().unwrap();

    // break after the first element leaves the rest untouched
    let body = block(vec![
        times_ten(),
        Statement::If {
            condition: bin(BinaryOp::Eq, Expression::ImplicitIndex, lit(0)),
            then: block(vec![Statement::Break]),
            otherwise: None,
        },
    ]);
    let (outcome, frame) = run(
        &scope,
        vec![
            set(items, list(&[1, 2, 3])),
            Statement::foreach_ref(LValue::Local(x), LValue::Local(items), body),
        ],
    );
    outcome.unwrap();
    assert_eq!(ints(&frame.local(items)), vec![10, 2, 3]);
    frame.release().unwrap();

    // an exception still writes back what was done so far
    let body = block(vec![
        times_ten(),
        Statement::If {
            condition: bin(BinaryOp::Eq, Expression::ImplicitIndex, lit(1)),
            then: block(vec![throw("STOP")]),
            otherwise: None,
        },
    ]);
    let (outcome, frame) = run(
        &scope,
        vec![
            set(items, list(&[1, 2, 3])),
            Statement::foreach_ref(LValue::Local(x), LValue::Local(items), body),
        ],
    );
    assert_eq!(outcome.unwrap_err().err(), "STOP");
    assert_eq!(ints(&frame.local(items)), vec![10, 20, 3]);
    frame.release().unwrap();
}

#[test]
fn test_foreach_over_ranges() {
    let mut scope = ParseScope::new();
    let i = scope.declare("i");
    let seen = scope.declare("seen");
    let collect = || {
        block(vec![set(
            seen,
            bin(BinaryOp::Add, var(seen), Expression::ListLit(vec![var(i)])),
        )])
    };
    let reversed = Statement::Foreach(Box::new(ForeachStatement {
        target: LValue::Local(i),
        source: ForeachSource::Value(Expression::range(lit(1), lit(5), None)),
        body: collect(),
        reverse: true,
    }));
    let (outcome, frame) = run(&scope, vec![set(seen, Expression::ListLit(vec![])), reversed]);
    outcome.unwrap();
    assert_eq!(ints(&frame.local(seen)), vec![5, 4, 3, 2, 1]);
    frame.release().unwrap();

    let stepped = Statement::foreach(
        LValue::Local(i),
        Expression::range(lit(10), lit(1), Some(lit(4))),
        collect(),
    );
    let (outcome, frame) = run(&scope, vec![set(seen, Expression::ListLit(vec![])), stepped]);
    outcome.unwrap();
    assert_eq!(ints(&frame.local(seen)), vec![10, 6, 2]);
    frame.release().unwrap();

    let bad = Statement::foreach(LValue::Local(i), Expression::range(lit(1), lit(3), Some(lit(0))), collect());
    let (outcome, frame) = run(&scope, vec![bad]);
    assert_eq!(outcome.unwrap_err().err(), names::RANGE_ITERATOR);
    frame.release().unwrap();

    assert_eq!(ints(&eval(Expression::range(lit(1), lit(3), None)).unwrap()), vec![1, 2, 3]);
}

#[test]
fn test_functional_operators() {
    let doubled = Expression::Map {
        expr: Box::new(bin(BinaryOp::Mul, Expression::ImplicitArg(1), lit(2))),
        source: Box::new(list(&[1, 2, 3])),
        filter: None,
    };
    assert_eq!(ints(&eval(doubled).unwrap()), vec![2, 4, 6]);

    let filtered = Expression::Map {
        expr: Box::new(bin(BinaryOp::Mul, Expression::ImplicitArg(1), lit(2))),
        source: Box::new(list(&[1, 2, 3])),
        filter: Some(Box::new(bin(BinaryOp::Gt, Expression::ImplicitArg(1), lit(1)))),
    };
    assert_eq!(ints(&eval(filtered).unwrap()), vec![4, 6]);

    // a scalar source still produces a list
    let scalar = Expression::Map {
        expr: Box::new(Expression::ImplicitArg(1)),
        source: Box::new(lit(5)),
        filter: None,
    };
    assert_eq!(ints(&eval(scalar).unwrap()), vec![5]);

    let odd = Expression::Select {
        source: Box::new(Expression::range(lit(1), lit(6), None)),
        condition: Box::new(bin(
            BinaryOp::Eq,
            bin(BinaryOp::Mod, Expression::ImplicitArg(1), lit(2)),
            lit(1),
        )),
    };
    assert_eq!(ints(&eval(odd).unwrap()), vec![1, 3, 5]);

    let minus = || Box::new(bin(BinaryOp::Sub, Expression::ImplicitArg(1), Expression::ImplicitArg(2)));
    let foldl = Expression::Foldl {
        expr: minus(),
        source: Box::new(list(&[10, 2, 3])),
    };
    assert_eq!(eval(foldl).unwrap().to_int(), 5);
    let foldr = Expression::Foldr {
        expr: minus(),
        source: Box::new(list(&[10, 2, 3])),
    };
    assert_eq!(eval(foldr).unwrap().to_int(), -9);
    let empty = Expression::Foldl {
        expr: minus(),
        source: Box::new(Expression::Literal(OnyxValue::Nothing)),
    };
    assert!(eval(empty).unwrap().is_nothing());
}

#[test]
fn test_loops() {
    let mut scope = ParseScope::new();
    let n = scope.declare("n");
    let (outcome, frame) = run(
        &scope,
        vec![
            set(n, lit(0)),
            Statement::DoWhile {
                body: block(vec![set(n, bin(BinaryOp::Add, var(n), lit(1)))]),
                condition: lit(false),
            },
        ],
    );
    outcome.unwrap();
    assert_eq!(frame.local(n).to_int(), 1);
    frame.release().unwrap();

    let (outcome, frame) = run(
        &scope,
        vec![
            set(n, lit(0)),
            Statement::While {
                condition: lit(true),
                body: block(vec![
                    set(n, bin(BinaryOp::Add, var(n), lit(1))),
                    Statement::If {
                        condition: bin(BinaryOp::Ge, var(n), lit(3)),
                        then: block(vec![Statement::Break]),
                        otherwise: None,
                    },
                ]),
            },
        ],
    );
    outcome.unwrap();
    assert_eq!(frame.local(n).to_int(), 3);
    frame.release().unwrap();
}

#[test]
fn test_closures_capture_and_check_types() {
    let mut outer = ParseScope::new();
    let y = outer.declare("y");
    let f = outer.declare("f");

    let mut inner = ParseScope::new();
    let x = inner.declare("x");
    let captured_y = inner.declare("y");
    let body = block(vec![Statement::Return(Some(bin(BinaryOp::Add, var(x), var(captured_y))))]);
    let func = Arc::new(UserFunction::new(
        "add_y",
        vec![Param::new("x", x, TypeInfo::Int)],
        body,
        &inner,
    ));

    let (outcome, frame) = run(
        &outer,
        vec![
            set(y, lit(40)),
            set(
                f,
                Expression::Closure {
                    func: func.clone(),
                    captures: vec![(y, captured_y)],
                },
            ),
        ],
    );
    outcome.unwrap();
    let closure = frame.local(f);
    assert_eq!(call_value(&closure, vec![OnyxValue::Integer(2)]).unwrap().to_int(), 42);
    assert_eq!(
        call_value(&closure, vec![OnyxValue::from("two")]).unwrap_err().err(),
        names::RUNTIME_TYPE_ERROR
    );
    closure.release().unwrap();
    frame.release().unwrap();

    assert_eq!(
        call_value(&OnyxValue::Integer(1), vec![]).unwrap_err().err(),
        names::CALL_ERROR
    );
    let native = OnyxValue::Closure(Arc::new(OnyxClosure::native("count", |args| {
        Ok(OnyxValue::Integer(args.len() as i64))
    })));
    assert_eq!(call_value(&native, vec![lit_value(1), lit_value(2)]).unwrap().to_int(), 2);
}

fn lit_value(i: i64) -> OnyxValue {
    OnyxValue::Integer(i)
}

/// A class with a script method `inc()` that bumps and returns `self.n`.
fn counter_class() -> Arc<OnyxClass> {
    let scope = ParseScope::new();
    let body = block(vec![
        Statement::Expression(Expression::assign(
            LValue::SelfMember("n".into()),
            bin(BinaryOp::Add, Expression::SelfMember("n".into()), lit(1)),
        )),
        Statement::Return(Some(Expression::SelfMember("n".into()))),
    ]);
    let inc = Arc::new(UserFunction::new("inc", vec![], body, &scope));
    ClassBuilder::new("ScriptCounter")
        .member(
            "n",
            Access::Private,
            TypeInfo::Int,
            Some(MemberInit::Expr(Arc::new(bin(BinaryOp::Mul, lit(5), lit(2))))),
        )
        .method("inc", Access::Public, MethodVariant::script(inc))
        .build()
}

#[test]
fn test_script_methods_and_member_initializers() {
    let class = counter_class();
    let mut scope = ParseScope::new();
    let obj = scope.declare("obj");
    let last = scope.declare("last");
    let (outcome, frame) = run(
        &scope,
        vec![
            set(obj, Expression::new_object(&class, vec![])),
            set(last, Expression::method_call(var(obj), "inc", vec![])),
            set(last, Expression::method_call(var(obj), "inc", vec![])),
        ],
    );
    outcome.unwrap();
    assert_eq!(frame.local(last).to_int(), 12);

    let mut frame = frame;
    let hidden = Expression::Member {
        object: Box::new(var(obj)),
        name: "n".into(),
    }
    .eval(&mut frame);
    assert_eq!(hidden.unwrap_err().err(), names::PRIVATE_MEMBER);
    frame.release().unwrap();

    assert_eq!(
        eval(Expression::method_call(lit(3), "inc", vec![])).unwrap_err().err(),
        names::METHOD_EVAL_ON_NON_OBJECT
    );
}

#[test]
fn test_delete_statement_destroys_objects() {
    let drops = Arc::new(AtomicUsize::new(0));
    let counter = drops.clone();
    let class = ClassBuilder::new("Disposable")
        .native_destructor(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .build();
    let mut scope = ParseScope::new();
    let obj = scope.declare("obj");
    let alias = scope.declare("alias");
    let (outcome, frame) = run(
        &scope,
        vec![
            set(obj, Expression::new_object(&class, vec![])),
            set(alias, var(obj)),
            Statement::Delete(LValue::Local(obj)),
        ],
    );
    outcome.unwrap();
    assert_eq!(drops.load(Ordering::SeqCst), 1);
    assert!(frame.local(obj).is_nothing());
    assert!(!frame.local(alias).as_object().map(|o| o.is_valid()).unwrap_or(true));
    frame.release().unwrap();
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn test_lvalues_create_containers() {
    let mut scope = ParseScope::new();
    let h = scope.declare("h");
    let l = scope.declare("l");
    let taken = scope.declare("taken");
    let (outcome, frame) = run(
        &scope,
        vec![
            Statement::Expression(Expression::assign(
                LValue::index(LValue::index(LValue::Local(h), lit("a")), lit("b")),
                lit(1),
            )),
            Statement::Expression(Expression::assign(LValue::index(LValue::Local(l), lit(2)), lit(9))),
            set(
                taken,
                Expression::Remove(LValue::index(LValue::Local(l), lit(2))),
            ),
        ],
    );
    outcome.unwrap();
    let hash = frame.local(h);
    let inner = hash.as_hash().and_then(|h| h.find("a").cloned()).unwrap_or_default();
    assert_eq!(inner.as_hash().and_then(|h| h.find("b")).map(OnyxValue::to_int), Some(1));
    let items = frame.local(l);
    assert_eq!(items.as_list().map(|l| l.len()), Some(3));
    assert!(items.as_list().and_then(|l| l.retrieve(2)).map(OnyxValue::is_nothing).unwrap_or(false));
    assert_eq!(frame.local(taken).to_int(), 9);
    frame.release().unwrap();

    let mut scope = ParseScope::new();
    let l = scope.declare("l");
    let (outcome, frame) = run(
        &scope,
        vec![Statement::Expression(Expression::assign(
            LValue::index(LValue::Local(l), lit(-1)),
            lit(1),
        ))],
    );
    assert_eq!(outcome.unwrap_err().err(), names::LVALUE_ERROR);
    frame.release().unwrap();
}

#[test]
fn test_operators() {
    assert_eq!(eval(bin(BinaryOp::Add, lit("a"), lit(1))).unwrap().to_string_value(), "a1");
    assert_eq!(eval(bin(BinaryOp::Add, lit(1), lit(2.5))).unwrap().to_float(), 3.5);
    assert_eq!(
        eval(bin(BinaryOp::Div, lit(1), lit(0))).unwrap_err().err(),
        names::DIVISION_BY_ZERO
    );
    assert_eq!(
        eval(bin(BinaryOp::Mod, lit(1), lit(0))).unwrap_err().err(),
        names::DIVISION_BY_ZERO
    );
    assert!(eval(bin(BinaryOp::Eq, lit("1"), lit(1))).unwrap().to_bool());
    assert!(!eval(bin(BinaryOp::AbsEq, lit("1"), lit(1))).unwrap().to_bool());
    assert!(eval(bin(BinaryOp::Lt, lit(1), lit(2))).unwrap().to_bool());

    // the right side is not evaluated once the left side decides
    let short = bin(BinaryOp::Or, lit(true), bin(BinaryOp::Div, lit(1), lit(0)));
    assert!(eval(short).unwrap().to_bool());

    let merged = eval(bin(BinaryOp::Add, list(&[1]), list(&[2, 3]))).unwrap();
    assert_eq!(ints(&merged), vec![1, 2, 3]);
    let copied = eval(Expression::Copy(Box::new(list(&[4, 5])))).unwrap();
    assert_eq!(copied.as_list().map(|l| l.len()), Some(2));
}

#[test]
fn test_function_returns_and_defaults() {
    let mut scope = ParseScope::new();
    let a = scope.declare("a");
    let b = scope.declare("b");
    let body = block(vec![Statement::Return(Some(bin(BinaryOp::Add, var(a), var(b))))]);
    let func = Arc::new(
        UserFunction::new(
            "sum",
            vec![
                Param::new("a", a, TypeInfo::Int),
                Param::new("b", b, TypeInfo::Int).with_default(lit(100)),
            ],
            body,
            &scope,
        )
        .with_return_type(TypeInfo::Int),
    );
    assert_eq!(call_function(&func, None, None, vec![lit_value(1)]).unwrap().to_int(), 101);
    assert_eq!(
        call_function(&func, None, None, vec![lit_value(1), lit_value(2)]).unwrap().to_int(),
        3
    );

    let mut scope = ParseScope::new();
    let v = scope.declare("v");
    let wrong = Arc::new(
        UserFunction::new(
            "wrong",
            vec![Param::new("v", v, TypeInfo::Any)],
            block(vec![Statement::Return(Some(var(v)))]),
            &scope,
        )
        .with_return_type(TypeInfo::Int),
    );
    assert_eq!(
        call_function(&wrong, None, None, vec![OnyxValue::from("x")]).unwrap_err().err(),
        names::RUNTIME_TYPE_ERROR
    );
}

/// Counts `left` down to 1; `next` is private when `hide_next` is set.
fn countdown_class(hide_next: bool) -> Arc<OnyxClass> {
    let next_access = if hide_next { Access::Private } else { Access::Public };
    ClassBuilder::new("Countdown")
        .method(
            "next",
            next_access,
            MethodVariant::native(vec![], |object, _, _| {
                let class = object.class().clone();
                let left = object.get_member_value("left", Some(class.as_ref()))?.to_int() - 1;
                object.set_value("left", OnyxValue::Integer(left), Some(class.as_ref()))?;
                Ok(OnyxValue::Boolean(left > 0))
            }),
        )
        .method(
            "getValue",
            Access::Public,
            MethodVariant::native(vec![], |object, _, _| {
                object.get_member_value("left", Some(object.class().as_ref()))
            }),
        )
        .build()
}

#[test]
fn test_foreach_over_iterator_objects() {
    let mut scope = ParseScope::new();
    let x = scope.declare("x");
    let seen = scope.declare("seen");
    let it = scope.declare("it");
    let collect = || {
        block(vec![set(
            seen,
            bin(BinaryOp::Add, var(seen), Expression::ListLit(vec![var(x)])),
        )])
    };

    let class = countdown_class(false);
    let statements = vec![
        set(seen, Expression::ListLit(vec![])),
        set(it, Expression::new_object(&class, vec![])),
        Statement::Expression(Expression::assign(
            LValue::Member {
                object: Box::new(var(it)),
                name: "left".into(),
            },
            lit(4),
        )),
        Statement::foreach(LValue::Local(x), var(it), collect()),
    ];
    let (outcome, frame) = run(&scope, statements);
    outcome.unwrap();
    assert_eq!(ints(&frame.local(seen)), vec![3, 2, 1]);
    frame.release().unwrap();

    let hidden = countdown_class(true);
    let statements = vec![
        set(it, Expression::new_object(&hidden, vec![])),
        Statement::foreach(LValue::Local(x), var(it), collect()),
    ];
    let (outcome, frame) = run(&scope, statements);
    assert_eq!(outcome.unwrap_err().err(), names::iterator_error("foreach"));
    frame.release().unwrap();
}
