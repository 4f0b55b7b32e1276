use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use aspectwerkz::cflow::CflowStack;
use aspectwerkz::definition::AdviceType;
use aspectwerkz::expression::{Expression, ExpressionContext, MatchEnv};
use aspectwerkz::joinpoint::{
    Advice, AdviceIndex, AdviceRef, AdviceResolver, ChainState, ChainStrategy, ExecutionModel, JoinPoint,
    JoinPointController, Pointcut, Step,
};
use aspectwerkz::pattern::ClassPattern;
use aspectwerkz::reflect::MethodInfo;
use aspectwerkz::{Error, Result, Throwable, Value};

type Log = Arc<Mutex<Vec<String>>>;

#[derive(Default)]
struct Bodies(HashMap<AdviceIndex, Arc<dyn Advice>>);

impl Bodies {
    fn with(mut self, index: AdviceIndex, body: Arc<dyn Advice>) -> Self {
        self.0.insert(index, body);
        self
    }
}

impl AdviceResolver for Bodies {
    fn resolve(&self, index: AdviceIndex) -> Option<Arc<dyn Advice>> {
        self.0.get(&index).cloned()
    }
}

fn run_context() -> ExpressionContext {
    ExpressionContext::execution(Arc::new(MethodInfo::new("app.Job", "run").returning("int"))).unwrap()
}

fn expression(source: &str) -> Arc<Expression> {
    Arc::new(Expression::compile(source).unwrap())
}

fn run_pointcut() -> Pointcut {
    Pointcut::new(expression("execution(* app.Job.run())"))
}

fn around(name: &str, aspect: usize, advice: usize) -> AdviceRef {
    AdviceRef::new(name, AdviceIndex::new(aspect, advice), AdviceType::Around)
}

fn recording(log: &Log, label: &'static str) -> Arc<dyn Advice> {
    let log = Arc::clone(log);
    Arc::new(move |jp: &mut JoinPoint<'_>| -> Result<Value> {
        log.lock().push(format!("{label}>"));
        let value = jp.proceed();
        log.lock().push(format!("<{label}"));
        value
    })
}

fn labelled(log: &Log, label: &'static str) -> Arc<dyn Advice> {
    let log = Arc::clone(log);
    Arc::new(move |_jp: &mut JoinPoint<'_>| -> Result<Value> {
        log.lock().push(label.to_string());
        Ok(Value::Void)
    })
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().clone()
}

#[test]
fn no_pointcuts_runs_original_once() {
    let ctx = run_context();
    let calls = AtomicUsize::new(0);
    let original = |_jp: &mut JoinPoint<'_>| -> Result<Value> {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(Value::Int(7))
    };
    let bodies = Bodies::default();
    let mut jp = JoinPoint::new(&ctx, JoinPointController::new(ctx.signature(), Vec::new()), &bodies, &original);

    assert_eq!(jp.proceed().unwrap(), Value::Int(7));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(jp.controller().state(), ChainState::Returned);
    assert_eq!(jp.returned(), Some(&Value::Int(7)));
}

#[test]
fn advice_nests_in_pointcut_then_declaration_order() {
    let ctx = run_context();
    let log: Log = Arc::default();
    let bodies = Bodies::default()
        .with(AdviceIndex::new(0, 0), recording(&log, "p0a0"))
        .with(AdviceIndex::new(0, 1), recording(&log, "p0a1"))
        .with(AdviceIndex::new(1, 0), recording(&log, "p1a0"))
        .with(AdviceIndex::new(1, 1), recording(&log, "p1a1"));
    let pointcuts = vec![
        run_pointcut().with_advice(around("A.p0a0", 0, 0)).with_advice(around("A.p0a1", 0, 1)),
        run_pointcut().with_advice(around("B.p1a0", 1, 0)).with_advice(around("B.p1a1", 1, 1)),
    ];
    let original_log = Arc::clone(&log);
    let original = move |_jp: &mut JoinPoint<'_>| -> Result<Value> {
        original_log.lock().push("original".to_string());
        Ok(Value::Void)
    };
    let mut jp = JoinPoint::new(&ctx, JoinPointController::new(ctx.signature(), pointcuts), &bodies, &original);

    jp.proceed().unwrap();
    let expected = vec![
        "p0a0>", "p0a1>", "p1a0>", "p1a1>", "original", "<p1a1", "<p1a0", "<p0a1", "<p0a0",
    ];
    assert_eq!(entries(&log), expected);

    // the cursor is restored, so the same join point can run again
    log.lock().clear();
    jp.proceed().unwrap();
    assert_eq!(entries(&log), expected);
}

#[test]
fn advice_may_rewrite_arguments_and_results() {
    let ctx = run_context();
    let bodies = Bodies::default().with(
        AdviceIndex::new(0, 0),
        Arc::new(|jp: &mut JoinPoint<'_>| -> Result<Value> {
            jp.args_mut()[0] = Value::Int(20);
            let value = jp.proceed()?;
            Ok(Value::Int(value.as_int().unwrap_or(0) + 1))
        }),
    );
    let original = |jp: &mut JoinPoint<'_>| -> Result<Value> { Ok(jp.args()[0].clone()) };
    let controller = JoinPointController::new(ctx.signature(), vec![run_pointcut().with_advice(around("A.a", 0, 0))]);
    let mut jp = JoinPoint::new(&ctx, controller, &bodies, &original).with_args(vec![Value::Int(1)]);

    assert_eq!(jp.proceed().unwrap(), Value::Int(21));
    assert_eq!(jp.args(), &[Value::Int(20)]);
}

#[test]
fn plain_advice_kinds_wrap_the_original() {
    let ctx = run_context();
    let log: Log = Arc::default();
    let returned_seen: Arc<Mutex<Option<Value>>> = Arc::default();
    let seen = Arc::clone(&returned_seen);
    let after_returning_log = Arc::clone(&log);
    let bodies = Bodies::default()
        .with(AdviceIndex::new(0, 0), labelled(&log, "before"))
        .with(
            AdviceIndex::new(0, 1),
            Arc::new(move |jp: &mut JoinPoint<'_>| -> Result<Value> {
                after_returning_log.lock().push("after-returning".to_string());
                *seen.lock() = jp.returned().cloned();
                Ok(Value::Void)
            }),
        )
        .with(AdviceIndex::new(0, 2), labelled(&log, "after"));
    let pointcut = run_pointcut()
        .with_advice(AdviceRef::new("A.before", AdviceIndex::new(0, 0), AdviceType::Before))
        .with_advice(AdviceRef::new("A.afterReturning", AdviceIndex::new(0, 1), AdviceType::AfterReturning))
        .with_advice(AdviceRef::new("A.after", AdviceIndex::new(0, 2), AdviceType::After));
    let original_log = Arc::clone(&log);
    let original = move |_jp: &mut JoinPoint<'_>| -> Result<Value> {
        original_log.lock().push("original".to_string());
        Ok(Value::Long(99))
    };
    let mut jp =
        JoinPoint::new(&ctx, JoinPointController::new(ctx.signature(), vec![pointcut]), &bodies, &original);

    // plain advice results never replace the join point's value
    assert_eq!(jp.proceed().unwrap(), Value::Long(99));
    assert_eq!(entries(&log), vec!["before", "original", "after", "after-returning"]);
    assert_eq!(*returned_seen.lock(), Some(Value::Long(99)));
}

fn after_throwing_run(thrown_class: &'static str) -> (Result<Value>, Vec<String>) {
    let ctx = run_context();
    let log: Log = Arc::default();
    let handler_log = Arc::clone(&log);
    let bodies = Bodies::default().with(
        AdviceIndex::new(0, 0),
        Arc::new(move |jp: &mut JoinPoint<'_>| -> Result<Value> {
            let caught = jp.thrown().map(|t| t.class_name.clone()).unwrap_or_default();
            handler_log.lock().push(caught);
            Ok(Value::Void)
        }),
    );
    let filter = Arc::new(ClassPattern::compile("java.io.IOException").unwrap());
    let pointcut = run_pointcut().with_advice(
        AdviceRef::new("A.onIo", AdviceIndex::new(0, 0), AdviceType::AfterThrowing).with_type_filter(filter),
    );
    let original = move |_jp: &mut JoinPoint<'_>| -> Result<Value> { Err(Error::thrown(thrown_class, "disk full")) };
    let mut jp =
        JoinPoint::new(&ctx, JoinPointController::new(ctx.signature(), vec![pointcut]), &bodies, &original);
    let outcome = jp.proceed();
    (outcome, entries(&log))
}

#[test]
fn after_throwing_runs_for_matching_exceptions_and_rethrows() {
    let (outcome, log) = after_throwing_run("java.io.IOException");
    assert_eq!(log, vec!["java.io.IOException"]);
    let err = outcome.unwrap_err();
    assert_eq!(err.throwable(), Some(&Throwable::new("java.io.IOException", "disk full")));
}

#[test]
fn after_throwing_skips_other_exceptions() {
    let (outcome, log) = after_throwing_run("java.lang.IllegalStateException");
    assert!(log.is_empty());
    assert_eq!(
        outcome.unwrap_err().throwable().map(|t| t.class_name.as_str()),
        Some("java.lang.IllegalStateException")
    );
}

#[test]
fn after_returning_filters_on_the_declared_return_type() {
    let ctx = run_context();
    let log: Log = Arc::default();
    let bodies = Bodies::default()
        .with(AdviceIndex::new(0, 0), labelled(&log, "on-string"))
        .with(AdviceIndex::new(0, 1), labelled(&log, "on-int"))
        .with(AdviceIndex::new(0, 2), labelled(&log, "on-any"));
    let returns = |pattern: &str| Arc::new(ClassPattern::compile(pattern).unwrap());
    let pointcut = run_pointcut()
        .with_advice(
            AdviceRef::new("A.onString", AdviceIndex::new(0, 0), AdviceType::AfterReturning)
                .with_type_filter(returns("java.lang.String")),
        )
        .with_advice(
            AdviceRef::new("A.onInt", AdviceIndex::new(0, 1), AdviceType::AfterReturning)
                .with_type_filter(returns("int")),
        )
        .with_advice(AdviceRef::new("A.onAny", AdviceIndex::new(0, 2), AdviceType::AfterReturning));
    let original = |_jp: &mut JoinPoint<'_>| -> Result<Value> { Ok(Value::Int(7)) };
    let mut jp =
        JoinPoint::new(&ctx, JoinPointController::new(ctx.signature(), vec![pointcut]), &bodies, &original);

    assert_eq!(jp.proceed().unwrap(), Value::Int(7));
    assert_eq!(entries(&log), vec!["on-any", "on-int"]);
}

#[test]
fn after_throwing_ignores_successful_returns() {
    let ctx = run_context();
    let log: Log = Arc::default();
    let bodies = Bodies::default().with(AdviceIndex::new(0, 0), labelled(&log, "handler"));
    let pointcut =
        run_pointcut().with_advice(AdviceRef::new("A.onError", AdviceIndex::new(0, 0), AdviceType::AfterThrowing));
    let original = |_jp: &mut JoinPoint<'_>| -> Result<Value> { Ok(Value::Bool(true)) };
    let mut jp =
        JoinPoint::new(&ctx, JoinPointController::new(ctx.signature(), vec![pointcut]), &bodies, &original);

    assert_eq!(jp.proceed().unwrap(), Value::Bool(true));
    assert!(entries(&log).is_empty());
}

#[test]
fn exceptions_pass_through_around_advice_unchanged() {
    let ctx = run_context();
    let log: Log = Arc::default();
    let bodies = Bodies::default().with(AdviceIndex::new(0, 0), recording(&log, "around"));
    let original = |_jp: &mut JoinPoint<'_>| -> Result<Value> { Err(Error::thrown("app.JobFailed", "boom")) };
    let controller = JoinPointController::new(ctx.signature(), vec![run_pointcut().with_advice(around("A.a", 0, 0))]);
    let mut jp = JoinPoint::new(&ctx, controller, &bodies, &original);

    let err = jp.proceed().unwrap_err();
    assert_eq!(err.throwable(), Some(&Throwable::new("app.JobFailed", "boom")));
    assert_eq!(jp.thrown(), Some(&Throwable::new("app.JobFailed", "boom")));
    assert_eq!(entries(&log), vec!["around>", "<around"]);
    assert_eq!(jp.controller().state(), ChainState::Returned);
}

#[test]
fn proceed_from_plain_advice_is_a_dispatch_error() {
    let ctx = run_context();
    let bodies = Bodies::default().with(AdviceIndex::new(0, 0), Arc::new(|jp: &mut JoinPoint<'_>| jp.proceed()));
    let pointcut =
        run_pointcut().with_advice(AdviceRef::new("A.before", AdviceIndex::new(0, 0), AdviceType::Before));
    let original = |_jp: &mut JoinPoint<'_>| -> Result<Value> { Ok(Value::Void) };
    let mut jp =
        JoinPoint::new(&ctx, JoinPointController::new(ctx.signature(), vec![pointcut]), &bodies, &original);

    assert!(matches!(jp.proceed(), Err(Error::InternalDispatch { .. })));
}

#[test]
fn missing_advice_body_is_a_dispatch_error() {
    let ctx = run_context();
    let bodies = Bodies::default();
    let original = |_jp: &mut JoinPoint<'_>| -> Result<Value> { Ok(Value::Void) };
    let controller = JoinPointController::new(ctx.signature(), vec![run_pointcut().with_advice(around("A.a", 3, 1))]);
    let mut jp = JoinPoint::new(&ctx, controller, &bodies, &original);

    match jp.proceed() {
        Err(Error::InternalDispatch { detail, .. }) => assert!(detail.contains("3:1"), "{detail}"),
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[test]
fn cursor_walks_advices_and_pointcuts() {
    let mut controller = JoinPointController::new(
        "app.Job.run()",
        vec![
            run_pointcut().with_advice(around("A.a", 0, 0)),
            run_pointcut(),
            run_pointcut().with_advice(around("B.b", 1, 0)),
        ],
    );
    assert_eq!(controller.state(), ChainState::NotStarted);
    assert_eq!(controller.advice_count(), 2);

    assert!(matches!(controller.advance(|_| Ok(true)).unwrap(), Step::Advice(ref a) if a.name == "A.a"));
    assert_eq!(controller.state(), ChainState::AdviceActive { pointcut: 0, advice: 0 });
    assert_eq!(controller.current_advice().map(|a| a.name.as_str()), Some("A.a"));

    // the advice-less pointcut is skipped
    assert!(matches!(controller.advance(|_| Ok(true)).unwrap(), Step::Advice(ref a) if a.name == "B.b"));
    assert_eq!(controller.state(), ChainState::PointcutSwitch { from: 0, to: 2 });

    assert!(matches!(controller.advance(|_| Ok(true)).unwrap(), Step::Original));
    assert_eq!(controller.state(), ChainState::OriginalInvoked);
    assert!(controller.current_advice().is_none());
    assert!(matches!(controller.advance(|_| Ok(true)), Err(Error::InternalDispatch { .. })));

    controller.retreat().unwrap();
    assert_eq!(controller.state(), ChainState::AdviceActive { pointcut: 2, advice: 0 });
    controller.retreat().unwrap();
    assert_eq!(controller.state(), ChainState::AdviceActive { pointcut: 0, advice: 0 });
    controller.retreat().unwrap();
    assert_eq!(controller.state(), ChainState::Returned);
    assert!(matches!(controller.retreat(), Err(Error::InternalDispatch { .. })));
}

#[test]
fn closed_gate_skips_to_original() {
    let mut controller = JoinPointController::new("app.Job.run()", vec![run_pointcut().with_advice(around("A.a", 0, 0))]);
    assert!(matches!(controller.advance(|_| Ok(false)).unwrap(), Step::Original));
    controller.retreat().unwrap();
    assert!(matches!(controller.advance(|_| Ok(true)).unwrap(), Step::Advice(_)));
}

#[test]
fn redundant_advice_keeps_first_occurrence() {
    let mut controller = JoinPointController::new(
        "app.Job.run()",
        vec![
            run_pointcut().with_advice(around("A.a", 0, 0)).with_advice(around("A.b", 0, 1)),
            run_pointcut().with_advice(around("A.a", 0, 0)).with_advice(around("B.c", 1, 0)),
            run_pointcut().with_advice(around("A.b", 0, 1)),
        ],
    );

    assert_eq!(controller.clear_all_redundancies().unwrap(), 2);
    let names = |c: &JoinPointController| -> Vec<Vec<String>> {
        c.pointcuts().iter().map(|p| p.advices.iter().map(|a| a.name.clone()).collect()).collect()
    };
    let cleared = names(&controller);
    assert_eq!(cleared, vec![vec!["A.a", "A.b"], vec!["B.c"]]);
    assert_eq!(controller.advice_count(), 3);

    assert_eq!(controller.clear_all_redundancies().unwrap(), 0);
    assert_eq!(names(&controller), cleared);
}

#[test]
fn clear_redundancy_targets_one_name() {
    let mut controller = JoinPointController::new(
        "app.Job.run()",
        vec![
            run_pointcut().with_advice(around("A.a", 0, 0)).with_advice(around("A.a", 0, 0)),
            run_pointcut().with_advice(around("A.b", 0, 1)).with_advice(around("A.b", 0, 1)),
        ],
    );
    assert_eq!(controller.clear_redundancy("A.a").unwrap(), 1);
    assert_eq!(controller.clear_redundancy("A.missing").unwrap(), 0);
    assert_eq!(controller.advice_count(), 3);
}

#[test]
fn chain_cannot_change_while_in_flight() {
    let mut controller = JoinPointController::new("app.Job.run()", vec![run_pointcut().with_advice(around("A.a", 0, 0))]);
    controller.advance(|_| Ok(true)).unwrap();
    assert!(matches!(controller.clear_all_redundancies(), Err(Error::InternalDispatch { .. })));
    controller.retreat().unwrap();
    assert!(controller.clear_all_redundancies().is_ok());
}

#[test]
fn deep_copies_have_independent_cursors() {
    let mut controller = JoinPointController::new(
        "app.Job.run()",
        vec![run_pointcut().with_advice(around("A.a", 0, 0)).with_advice(around("A.a", 0, 0))],
    );
    let mut idle_copy = controller.deep_copy();
    idle_copy.clear_all_redundancies().unwrap();
    assert_eq!(idle_copy.advice_count(), 1);
    assert_eq!(controller.advice_count(), 2);

    controller.advance(|_| Ok(true)).unwrap();
    let mut running_copy = controller.deep_copy();
    running_copy.advance(|_| Ok(true)).unwrap();
    running_copy.advance(|_| Ok(true)).unwrap();
    assert_eq!(running_copy.state(), ChainState::OriginalInvoked);
    assert_eq!(controller.state(), ChainState::AdviceActive { pointcut: 0, advice: 0 });
}

#[test]
fn join_point_copies_run_independently() {
    let ctx = run_context();
    let log: Log = Arc::default();
    let bodies = Bodies::default().with(AdviceIndex::new(0, 0), recording(&log, "a"));
    let original = |jp: &mut JoinPoint<'_>| -> Result<Value> { Ok(jp.args()[0].clone()) };
    let controller = JoinPointController::new(ctx.signature(), vec![run_pointcut().with_advice(around("A.a", 0, 0))]);
    let jp = JoinPoint::new(&ctx, controller, &bodies, &original).with_args(vec![Value::from("first")]);

    let mut copy = jp.deep_copy();
    copy.args_mut()[0] = Value::from("second");
    assert_eq!(copy.proceed().unwrap(), Value::from("second"));
    assert_eq!(jp.args(), &[Value::from("first")]);
    assert_eq!(jp.controller().state(), ChainState::NotStarted);
}

#[test]
fn cflow_pointcuts_gate_the_whole_chain() {
    let ctx = run_context();
    let stack = CflowStack::new();
    let log: Log = Arc::default();
    let bodies = Bodies::default()
        .with(AdviceIndex::new(0, 0), recording(&log, "plain"))
        .with(AdviceIndex::new(1, 0), recording(&log, "in-tx"));
    let pointcuts = vec![
        run_pointcut().with_advice(around("A.plain", 0, 0)),
        Pointcut::new(expression("execution(* app.Job.run()) && cflow(execution(* app.Tx.begin()))"))
            .with_advice(around("B.inTx", 1, 0)),
    ];
    assert!(!pointcuts[0].cflow);
    assert!(pointcuts[1].cflow);
    let original = |_jp: &mut JoinPoint<'_>| -> Result<Value> { Ok(Value::Void) };
    let mut jp = JoinPoint::new(&ctx, JoinPointController::new(ctx.signature(), pointcuts), &bodies, &original)
        .with_cflow(&stack);

    let env = MatchEnv::new(None, Some(&stack));
    assert!(!jp.controller().is_gate_open(&ctx, &env).unwrap());
    jp.proceed().unwrap();
    assert!(entries(&log).is_empty());

    let begin = ExpressionContext::execution(Arc::new(MethodInfo::new("app.Tx", "begin"))).unwrap();
    let _tx = stack.guard(begin);
    assert!(jp.controller().is_gate_open(&ctx, &env).unwrap());
    jp.proceed().unwrap();
    assert_eq!(entries(&log), vec!["plain>", "in-tx>", "<in-tx", "<plain"]);
}

#[test]
fn chains_without_cflow_are_always_open() {
    let ctx = run_context();
    let controller = JoinPointController::new(ctx.signature(), vec![run_pointcut().with_advice(around("A.a", 0, 0))]);
    assert!(controller.is_gate_open(&ctx, &MatchEnv::new(None, None)).unwrap());
}

struct Bypass;

impl ChainStrategy for Bypass {
    fn proceed(&self, join_point: &mut JoinPoint<'_>) -> Result<Value> {
        join_point.invoke_original()
    }
}

#[derive(Default)]
struct Counting(AtomicUsize);

impl ChainStrategy for Counting {
    fn proceed(&self, join_point: &mut JoinPoint<'_>) -> Result<Value> {
        self.0.fetch_add(1, Ordering::SeqCst);
        join_point.proceed_linear()
    }
}

#[test]
fn custom_model_replaces_the_linear_walk() {
    let ctx = run_context();
    let log: Log = Arc::default();
    let bodies = Bodies::default().with(AdviceIndex::new(0, 0), recording(&log, "a"));
    let original = |_jp: &mut JoinPoint<'_>| -> Result<Value> { Ok(Value::Int(3)) };

    let bypass = JoinPointController::new(ctx.signature(), vec![run_pointcut().with_advice(around("A.a", 0, 0))])
        .with_model(ExecutionModel::Custom(Arc::new(Bypass)));
    let mut jp = JoinPoint::new(&ctx, bypass, &bodies, &original);
    assert_eq!(jp.proceed().unwrap(), Value::Int(3));
    assert!(entries(&log).is_empty());

    let counting = Arc::new(Counting::default());
    let controller = JoinPointController::new(ctx.signature(), vec![run_pointcut().with_advice(around("A.a", 0, 0))])
        .with_model(ExecutionModel::Custom(counting.clone()));
    let mut jp = JoinPoint::new(&ctx, controller, &bodies, &original);
    assert_eq!(jp.proceed().unwrap(), Value::Int(3));
    assert_eq!(entries(&log), vec!["a>", "<a"]);
    // once from the caller, once from inside the advice
    assert_eq!(counting.0.load(Ordering::SeqCst), 2);
}
