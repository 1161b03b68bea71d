//! End-to-end behaviour of the filter pipeline.

use bastion_core::{
    ActionContext, ActionDescriptor, ActionOutput, ActionResult, Capability, CapabilitySet, Fault,
    FilterScope, PipelineError, PipelineResult, PolicyMarker, RequestCancelled,
    ReturnContractViolation, ReturnKind,
};
use bastion_filters::builtin::{CorsFilter, ErrorEnvelopeFilter, RoleAuthorizationFilter};
use bastion_filters::context::{
    ActionExecutedContext, ActionExecutingContext, AuthorizationContext, ExceptionContext,
    ResourceExecutedContext, ResourceExecutingContext, ResultExecutedContext,
    ResultExecutingContext,
};
use bastion_filters::invocation::{
    ActionFilter, SyncActionFilter, SyncAuthorizationFilter, SyncExceptionFilter,
    SyncResourceFilter, SyncResultFilter,
};
use bastion_filters::{
    action_fn, resolve, ActionInvoker, BoxFuture, DeclaredFilters, Filter, FilterCatalog,
    FilterDescriptor, FilterResult, PhaseContext, Pipeline, PipelineContext, PipelineOutcome,
    ResultRenderer,
};
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Harness
// ============================================================================

#[derive(Clone, Default)]
struct Log(Arc<Mutex<Vec<String>>>);

impl Log {
    fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    fn matching(&self, prefix: &str, suffix: &str) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|e| e.starts_with(prefix) && e.ends_with(suffix))
            .collect()
    }

    fn contains(&self, entry: &str) -> bool {
        self.0.lock().iter().any(|e| e == entry)
    }
}

#[derive(Default)]
struct Renderer {
    log: Log,
    rendered: Mutex<Vec<ActionResult>>,
}

impl Renderer {
    fn with_log(log: &Log) -> Self {
        Self {
            log: log.clone(),
            rendered: Mutex::new(Vec::new()),
        }
    }

    fn renders(&self) -> Vec<ActionResult> {
        self.rendered.lock().clone()
    }
}

impl ResultRenderer for Renderer {
    fn render<'a>(
        &'a self,
        _action: &'a ActionContext,
        result: &'a ActionResult,
    ) -> BoxFuture<'a, Result<(), Fault>> {
        self.log.push("render");
        self.rendered.lock().push(result.clone());
        Box::pin(async { Ok(()) })
    }
}

/// Records every callback as `phase:name:step`.
#[derive(Clone)]
struct Tracer {
    name: &'static str,
    log: Log,
    short_circuit: Option<ActionResult>,
    recover: Option<ActionResult>,
}

impl Tracer {
    fn new(name: &'static str, log: &Log) -> Self {
        Self {
            name,
            log: log.clone(),
            short_circuit: None,
            recover: None,
        }
    }

    fn short_circuit(mut self, result: ActionResult) -> Self {
        self.short_circuit = Some(result);
        self
    }

    fn recover(mut self, result: ActionResult) -> Self {
        self.recover = Some(result);
        self
    }

    fn record(&self, phase: &str, step: &str) {
        self.log.push(format!("{phase}:{}:{step}", self.name));
    }

    fn filter(self, order: i32, caps: &[Capability]) -> Filter {
        let mut builder = Filter::builder(self.name).order(order);
        for cap in caps {
            builder = match cap {
                Capability::Authorization => builder.sync_authorization(self.clone()),
                Capability::Resource => builder.sync_resource(self.clone()),
                Capability::Exception => builder.sync_exception(self.clone()),
                Capability::Action => builder.sync_action(self.clone()),
                Capability::Result => builder.sync_result(self.clone()),
            };
        }
        builder.build()
    }
}

impl SyncAuthorizationFilter for Tracer {
    fn on_authorization(&self, ctx: &mut AuthorizationContext<'_>) -> FilterResult {
        self.record("authorization", "check");
        if let Some(result) = &self.short_circuit {
            ctx.set_result(result.clone());
        }
        Ok(())
    }
}

impl SyncResourceFilter for Tracer {
    fn on_resource_executing(&self, ctx: &mut ResourceExecutingContext<'_>) -> FilterResult {
        self.record("resource", "before");
        if let Some(result) = &self.short_circuit {
            ctx.set_result(result.clone());
        }
        Ok(())
    }

    fn on_resource_executed(&self, _ctx: &mut ResourceExecutedContext<'_>) -> FilterResult {
        self.record("resource", "after");
        Ok(())
    }
}

impl SyncActionFilter for Tracer {
    fn on_action_executing(&self, ctx: &mut ActionExecutingContext<'_>) -> FilterResult {
        self.record("action", "before");
        if let Some(result) = &self.short_circuit {
            ctx.set_result(result.clone());
        }
        Ok(())
    }

    fn on_action_executed(&self, _ctx: &mut ActionExecutedContext<'_>) -> FilterResult {
        self.record("action", "after");
        Ok(())
    }
}

impl SyncResultFilter for Tracer {
    fn on_result_executing(&self, _ctx: &mut ResultExecutingContext<'_>) -> FilterResult {
        self.record("result", "before");
        Ok(())
    }

    fn on_result_executed(&self, _ctx: &mut ResultExecutedContext<'_>) -> FilterResult {
        self.record("result", "after");
        Ok(())
    }
}

impl SyncExceptionFilter for Tracer {
    fn on_exception(&self, ctx: &mut ExceptionContext<'_>) -> FilterResult {
        self.record("exception", "seen");
        if let Some(result) = &self.recover {
            ctx.set_result(result.clone());
            ctx.mark_exception_handled();
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("boom {code}")]
struct Boom {
    code: u32,
}

fn descriptor() -> ActionDescriptor {
    ActionDescriptor::new("Orders", "Get")
}

fn ok_action(log: &Log, body: &'static str) -> impl ActionInvoker {
    let log = log.clone();
    action_fn(move |_ctx| {
        log.push("invoke");
        async move { Ok(ActionOutput::from(ActionResult::ok(body))) }
    })
}

fn failing_action(log: &Log, code: u32) -> impl ActionInvoker {
    let log = log.clone();
    action_fn(move |_ctx| {
        log.push("invoke");
        async move { Err::<ActionOutput, Fault>(Boom { code }.into()) }
    })
}

fn pipeline() -> Pipeline {
    Pipeline::builder().record_metrics(false).build()
}

async fn run_with(
    action_ctx: ActionContext,
    catalog: &FilterCatalog,
    declared: &DeclaredFilters,
    action: &dyn ActionInvoker,
    renderer: &Renderer,
) -> PipelineResult<PipelineOutcome> {
    let plan = resolve(catalog.collect(declared));
    pipeline().execute(&plan, action_ctx, action, renderer).await
}

async fn run(
    catalog: &FilterCatalog,
    declared: &DeclaredFilters,
    action: &dyn ActionInvoker,
    renderer: &Renderer,
) -> PipelineResult<PipelineOutcome> {
    run_with(ActionContext::new(descriptor()), catalog, declared, action, renderer).await
}

// ============================================================================
// Ordering
// ============================================================================

#[tokio::test]
async fn test_entry_ascending_exit_reverse() {
    let log = Log::default();
    let catalog = FilterCatalog::builder()
        .filter(Tracer::new("ten", &log).filter(10, &[Capability::Action]))
        .filter(Tracer::new("zero", &log).filter(0, &[Capability::Action]))
        .filter(Tracer::new("five", &log).filter(5, &[Capability::Action]))
        .build();
    let renderer = Renderer::with_log(&log);

    run(&catalog, &DeclaredFilters::new(), &ok_action(&log, "ok"), &renderer)
        .await
        .unwrap();

    assert_eq!(
        log.matching("action:", ":before"),
        vec!["action:zero:before", "action:five:before", "action:ten:before"]
    );
    assert_eq!(
        log.matching("action:", ":after"),
        vec!["action:ten:after", "action:five:after", "action:zero:after"]
    );
    assert_eq!(renderer.renders().len(), 1);
}

#[tokio::test]
async fn test_scope_tie_break_and_stability() {
    let log = Log::default();
    let catalog = FilterCatalog::builder()
        .filter(Tracer::new("global", &log).filter(0, &[Capability::Resource]))
        .build();
    let declared = DeclaredFilters::new()
        .action(Tracer::new("action-1", &log).filter(0, &[Capability::Resource]))
        .action(Tracer::new("action-2", &log).filter(0, &[Capability::Resource]))
        .controller(Tracer::new("controller", &log).filter(0, &[Capability::Resource]));
    let renderer = Renderer::default();

    run(&catalog, &declared, &ok_action(&log, "ok"), &renderer)
        .await
        .unwrap();

    assert_eq!(
        log.matching("resource:", ":before"),
        vec![
            "resource:global:before",
            "resource:controller:before",
            "resource:action-1:before",
            "resource:action-2:before",
        ]
    );
}

#[tokio::test]
async fn test_full_onion_sequence() {
    let log = Log::default();
    let all = [
        Capability::Authorization,
        Capability::Resource,
        Capability::Exception,
        Capability::Action,
        Capability::Result,
    ];
    let catalog = FilterCatalog::builder()
        .filter(Tracer::new("outer", &log).filter(0, &all))
        .filter(Tracer::new("inner", &log).filter(1, &all))
        .build();
    let renderer = Renderer::with_log(&log);

    let outcome = run(&catalog, &DeclaredFilters::new(), &ok_action(&log, "ok"), &renderer)
        .await
        .unwrap();

    assert_eq!(
        log.entries(),
        vec![
            "authorization:outer:check",
            "authorization:inner:check",
            "resource:outer:before",
            "resource:inner:before",
            "action:outer:before",
            "action:inner:before",
            "invoke",
            "action:inner:after",
            "action:outer:after",
            "result:outer:before",
            "result:inner:before",
            "render",
            "result:inner:after",
            "result:outer:after",
            "resource:inner:after",
            "resource:outer:after",
        ]
    );
    assert!(outcome.rendered);
    assert!(!outcome.canceled);
    assert_eq!(outcome.result.unwrap().body_text(), Some("ok"));
}

#[tokio::test]
async fn test_async_and_blocking_filters_interleave_in_order() {
    struct Slow {
        log: Log,
    }

    impl ActionFilter for Slow {
        fn on_action_executing<'a>(
            &'a self,
            _ctx: &'a mut ActionExecutingContext<'_>,
        ) -> BoxFuture<'a, FilterResult> {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                self.log.push("action:slow:before");
                Ok(())
            })
        }

        fn on_action_executed<'a>(
            &'a self,
            _ctx: &'a mut ActionExecutedContext<'_>,
        ) -> BoxFuture<'a, FilterResult> {
            Box::pin(async move {
                tokio::task::yield_now().await;
                self.log.push("action:slow:after");
                Ok(())
            })
        }
    }

    let log = Log::default();
    let catalog = FilterCatalog::builder()
        .filter(Tracer::new("first", &log).filter(0, &[Capability::Action]))
        .filter(
            Filter::builder("slow")
                .order(1)
                .action(Slow { log: log.clone() })
                .build(),
        )
        .filter(Tracer::new("last", &log).filter(2, &[Capability::Action]))
        .build();
    let renderer = Renderer::default();

    run(&catalog, &DeclaredFilters::new(), &ok_action(&log, "ok"), &renderer)
        .await
        .unwrap();

    assert_eq!(
        log.entries(),
        vec![
            "action:first:before",
            "action:slow:before",
            "action:last:before",
            "invoke",
            "action:last:after",
            "action:slow:after",
            "action:first:after",
        ]
    );
}

// ============================================================================
// Short-circuits
// ============================================================================

#[tokio::test]
async fn test_resource_short_circuit_forbidden() {
    let log = Log::default();
    let forbidden = ActionResult::text(StatusCode::FORBIDDEN, "Forbidden");
    let catalog = FilterCatalog::builder()
        .filter(
            Tracer::new("gate", &log)
                .short_circuit(forbidden)
                .filter(0, &[Capability::Resource]),
        )
        .filter(Tracer::new("inner", &log).filter(1, &[Capability::Resource]))
        .filter(Tracer::new("act", &log).filter(0, &[Capability::Action, Capability::Result]))
        .build();
    let renderer = Renderer::with_log(&log);

    let outcome = run(&catalog, &DeclaredFilters::new(), &ok_action(&log, "ok"), &renderer)
        .await
        .unwrap();

    assert_eq!(
        log.entries(),
        vec!["resource:gate:before", "render", "resource:gate:after"]
    );
    let renders = renderer.renders();
    assert_eq!(renders.len(), 1);
    assert_eq!(renders[0].body_text(), Some("Forbidden"));
    assert!(outcome.canceled);
}

#[tokio::test]
async fn test_authorization_denial_skips_everything() {
    let log = Log::default();
    let catalog = FilterCatalog::builder()
        .filter(RoleAuthorizationFilter::deny_all().into_filter())
        .filter(Tracer::new("after-auth", &log).filter(
            1,
            &[Capability::Authorization, Capability::Resource, Capability::Result],
        ))
        .build();
    let renderer = Renderer::with_log(&log);

    let outcome = run(&catalog, &DeclaredFilters::new(), &ok_action(&log, "ok"), &renderer)
        .await
        .unwrap();

    assert_eq!(log.entries(), vec!["render"]);
    assert_eq!(renderer.renders()[0].status(), StatusCode::FORBIDDEN);
    assert!(outcome.canceled);
}

#[tokio::test]
async fn test_action_short_circuit_unwinds_and_renders() {
    let log = Log::default();
    let catalog = FilterCatalog::builder()
        .filter(Tracer::new("outer", &log).filter(0, &[Capability::Action]))
        .filter(
            Tracer::new("validator", &log)
                .short_circuit(ActionResult::text(StatusCode::BAD_REQUEST, "invalid"))
                .filter(1, &[Capability::Action]),
        )
        .filter(Tracer::new("inner", &log).filter(2, &[Capability::Action]))
        .filter(Tracer::new("res", &log).filter(0, &[Capability::Result]))
        .build();
    let renderer = Renderer::with_log(&log);

    let outcome = run(&catalog, &DeclaredFilters::new(), &ok_action(&log, "ok"), &renderer)
        .await
        .unwrap();

    assert_eq!(
        log.entries(),
        vec![
            "action:outer:before",
            "action:validator:before",
            "action:validator:after",
            "action:outer:after",
            "result:res:before",
            "render",
            "result:res:after",
        ]
    );
    assert_eq!(renderer.renders()[0].status(), StatusCode::BAD_REQUEST);
    assert!(outcome.canceled);
}

#[tokio::test]
async fn test_result_filter_suppresses_render() {
    struct Suppress;
    impl SyncResultFilter for Suppress {
        fn on_result_executing(&self, ctx: &mut ResultExecutingContext<'_>) -> FilterResult {
            ctx.cancel();
            Ok(())
        }
    }

    let log = Log::default();
    let catalog = FilterCatalog::builder()
        .filter(Tracer::new("outer", &log).filter(0, &[Capability::Result]))
        .filter(Filter::builder("suppress").order(1).sync_result(Suppress).build())
        .filter(Tracer::new("inner", &log).filter(2, &[Capability::Result]))
        .build();
    let renderer = Renderer::with_log(&log);

    let outcome = run(&catalog, &DeclaredFilters::new(), &ok_action(&log, "ok"), &renderer)
        .await
        .unwrap();

    assert_eq!(
        log.entries(),
        vec!["invoke", "result:outer:before", "result:outer:after"]
    );
    assert!(renderer.renders().is_empty());
    assert!(outcome.render_suppressed);
    assert!(!outcome.rendered);
}

#[tokio::test]
async fn test_short_circuit_render_skips_result_filters() {
    let log = Log::default();
    let catalog = FilterCatalog::builder()
        .filter(
            Tracer::new("gate", &log)
                .short_circuit(ActionResult::text(StatusCode::TOO_MANY_REQUESTS, "slow down"))
                .filter(0, &[Capability::Resource]),
        )
        .filter(Tracer::new("decor", &log).filter(0, &[Capability::Result]))
        .build();
    let renderer = Renderer::with_log(&log);

    let outcome = run(&catalog, &DeclaredFilters::new(), &ok_action(&log, "ok"), &renderer)
        .await
        .unwrap();

    assert!(outcome.canceled);
    assert_eq!(
        log.entries(),
        vec!["resource:gate:before", "render", "resource:gate:after"]
    );
    assert_eq!(renderer.renders()[0].status(), StatusCode::TOO_MANY_REQUESTS);

    let log = Log::default();
    let catalog = FilterCatalog::builder()
        .filter(
            Tracer::new("deny", &log)
                .short_circuit(ActionResult::text(StatusCode::FORBIDDEN, "Forbidden"))
                .filter(0, &[Capability::Authorization]),
        )
        .filter(Tracer::new("decor", &log).filter(0, &[Capability::Result]))
        .build();
    let renderer = Renderer::with_log(&log);

    run(&catalog, &DeclaredFilters::new(), &ok_action(&log, "ok"), &renderer)
        .await
        .unwrap();

    assert_eq!(log.entries(), vec!["authorization:deny:check", "render"]);
}

// ============================================================================
// Faults
// ============================================================================

#[tokio::test]
async fn test_action_fault_recovered_by_exception_filter() {
    let log = Log::default();
    let catalog = FilterCatalog::builder()
        .filter(
            Tracer::new("recover", &log)
                .recover(ActionResult::ok("Recovered"))
                .filter(0, &[Capability::Exception]),
        )
        .build();
    let renderer = Renderer::with_log(&log);

    let outcome = run(&catalog, &DeclaredFilters::new(), &failing_action(&log, 1), &renderer)
        .await
        .unwrap();

    let renders = renderer.renders();
    assert_eq!(renders.len(), 1);
    assert_eq!(renders[0].body_text(), Some("Recovered"));
    assert!(outcome.recovered);
}

#[tokio::test]
async fn test_unhandled_fault_keeps_identity() {
    let log = Log::default();
    let catalog = FilterCatalog::builder()
        .filter(Tracer::new("observer", &log).filter(0, &[Capability::Exception, Capability::Resource]))
        .build();
    let renderer = Renderer::with_log(&log);

    let err = run(&catalog, &DeclaredFilters::new(), &failing_action(&log, 42), &renderer)
        .await
        .unwrap_err();

    assert!(!err.is_misuse());
    let fault = err.into_fault().unwrap();
    assert_eq!(fault.downcast_ref::<Boom>().unwrap().code, 42);
    assert!(renderer.renders().is_empty());
    assert_eq!(
        log.entries(),
        vec![
            "resource:observer:before",
            "invoke",
            "exception:observer:seen",
            "resource:observer:after",
        ]
    );
}

#[tokio::test]
async fn test_exception_filters_run_innermost_first() {
    let log = Log::default();
    let catalog = FilterCatalog::builder()
        .filter(Tracer::new("outer", &log).filter(0, &[Capability::Exception]))
        .filter(Tracer::new("inner", &log).filter(5, &[Capability::Exception]))
        .build();
    let renderer = Renderer::default();

    let _ = run(&catalog, &DeclaredFilters::new(), &failing_action(&log, 1), &renderer).await;

    assert_eq!(
        log.matching("exception:", ""),
        vec!["exception:inner:seen", "exception:outer:seen"]
    );
}

#[tokio::test]
async fn test_exception_result_alone_recovers() {
    struct Substitute;
    impl SyncExceptionFilter for Substitute {
        fn on_exception(&self, ctx: &mut ExceptionContext<'_>) -> FilterResult {
            ctx.set_result(ActionResult::ok("Recovered"));
            Ok(())
        }
    }

    struct SeesHandled(Log);
    impl SyncExceptionFilter for SeesHandled {
        fn on_exception(&self, ctx: &mut ExceptionContext<'_>) -> FilterResult {
            self.0.push(format!("outer:handled={}", ctx.is_exception_handled()));
            Ok(())
        }
    }

    let log = Log::default();
    let catalog = FilterCatalog::builder()
        .filter(Filter::builder("outer").order(0).sync_exception(SeesHandled(log.clone())).build())
        .filter(Filter::builder("substitute").order(1).sync_exception(Substitute).build())
        .build();
    let renderer = Renderer::default();

    let outcome = run(&catalog, &DeclaredFilters::new(), &failing_action(&log, 3), &renderer)
        .await
        .unwrap();

    assert!(outcome.recovered);
    assert!(log.contains("outer:handled=true"));
    let renders = renderer.renders();
    assert_eq!(renders.len(), 1);
    assert_eq!(renders[0].body_text(), Some("Recovered"));
}

#[tokio::test]
async fn test_action_after_can_handle_fault() {
    struct Fallback;
    impl SyncActionFilter for Fallback {
        fn on_action_executed(&self, ctx: &mut ActionExecutedContext<'_>) -> FilterResult {
            if ctx.exception().is_some() {
                ctx.set_result(ActionResult::ok("fallback"));
                ctx.mark_exception_handled();
            }
            Ok(())
        }
    }

    let log = Log::default();
    let catalog = FilterCatalog::builder()
        .filter(Filter::builder("fallback").sync_action(Fallback).build())
        .filter(Tracer::new("exc", &log).filter(0, &[Capability::Exception, Capability::Result]))
        .build();
    let renderer = Renderer::default();

    let outcome = run(&catalog, &DeclaredFilters::new(), &failing_action(&log, 9), &renderer)
        .await
        .unwrap();

    assert!(outcome.recovered);
    assert_eq!(renderer.renders()[0].body_text(), Some("fallback"));
    // The fault never reached the exception phase; the result phase ran normally.
    assert!(!log.contains("exception:exc:seen"));
    assert!(log.contains("result:exc:before"));
}

#[tokio::test]
async fn test_resource_before_fault_handled_by_resource_after() {
    struct Explodes;
    impl SyncResourceFilter for Explodes {
        fn on_resource_executing(&self, _ctx: &mut ResourceExecutingContext<'_>) -> FilterResult {
            Err(Boom { code: 5 }.into())
        }
    }

    struct Absorbs;
    impl SyncResourceFilter for Absorbs {
        fn on_resource_executed(&self, ctx: &mut ResourceExecutedContext<'_>) -> FilterResult {
            assert!(!ctx.is_canceled());
            ctx.mark_exception_handled();
            Ok(())
        }
    }

    let log = Log::default();
    let catalog = FilterCatalog::builder()
        .filter(Filter::builder("absorbs").order(0).sync_resource(Absorbs).build())
        .filter(Filter::builder("explodes").order(1).sync_resource(Explodes).build())
        .build();
    let renderer = Renderer::default();

    let outcome = run(&catalog, &DeclaredFilters::new(), &ok_action(&log, "ok"), &renderer)
        .await
        .unwrap();

    assert!(outcome.recovered);
    assert!(!log.contains("invoke"));
    let renders = renderer.renders();
    assert_eq!(renders.len(), 1);
    assert_eq!(renders[0].status(), StatusCode::OK);
    assert!(renders[0].body_text().is_none());
}

#[tokio::test]
async fn test_authorization_fault_propagates_immediately() {
    struct Broken;
    impl SyncAuthorizationFilter for Broken {
        fn on_authorization(&self, _ctx: &mut AuthorizationContext<'_>) -> FilterResult {
            Err(Boom { code: 11 }.into())
        }
    }

    let log = Log::default();
    let catalog = FilterCatalog::builder()
        .filter(Filter::builder("broken").sync_authorization(Broken).build())
        .filter(Tracer::new("res", &log).filter(0, &[Capability::Resource, Capability::Exception]))
        .build();
    let renderer = Renderer::default();

    let err = run(&catalog, &DeclaredFilters::new(), &ok_action(&log, "ok"), &renderer)
        .await
        .unwrap_err();

    assert_eq!(err.fault().unwrap().downcast_ref::<Boom>().unwrap().code, 11);
    assert!(log.entries().is_empty());
}

#[tokio::test]
async fn test_core_fault_handled_by_resource_after() {
    struct Absorbs(Log);
    impl SyncResourceFilter for Absorbs {
        fn on_resource_executed(&self, ctx: &mut ResourceExecutedContext<'_>) -> FilterResult {
            self.0.push("resource:absorbs:after");
            if ctx.exception().is_some() {
                ctx.set_result(ActionResult::text(StatusCode::SERVICE_UNAVAILABLE, "absorbed"));
                ctx.mark_exception_handled();
            }
            Ok(())
        }
    }

    let log = Log::default();
    let catalog = FilterCatalog::builder()
        .filter(Filter::builder("absorbs").sync_resource(Absorbs(log.clone())).build())
        .filter(Tracer::new("observer", &log).filter(0, &[Capability::Exception]))
        .build();
    let renderer = Renderer::with_log(&log);

    let outcome = run(&catalog, &DeclaredFilters::new(), &failing_action(&log, 8), &renderer)
        .await
        .unwrap();

    assert!(outcome.recovered);
    assert_eq!(
        log.entries(),
        vec![
            "invoke",
            "exception:observer:seen",
            "resource:absorbs:after",
            "render",
        ]
    );
    let renders = renderer.renders();
    assert_eq!(renders.len(), 1);
    assert_eq!(renders[0].body_text(), Some("absorbed"));
}

#[tokio::test]
async fn test_result_before_fault_recovered() {
    struct Explodes;
    impl SyncResultFilter for Explodes {
        fn on_result_executing(&self, _ctx: &mut ResultExecutingContext<'_>) -> FilterResult {
            Err(Boom { code: 6 }.into())
        }
    }

    let log = Log::default();
    let catalog = FilterCatalog::builder()
        .filter(Tracer::new("outer", &log).filter(0, &[Capability::Result]))
        .filter(Filter::builder("explodes").order(1).sync_result(Explodes).build())
        .filter(Tracer::new("inner", &log).filter(2, &[Capability::Result]))
        .filter(
            Tracer::new("recover", &log)
                .recover(ActionResult::ok("Recovered"))
                .filter(0, &[Capability::Exception]),
        )
        .build();
    let renderer = Renderer::with_log(&log);

    let outcome = run(&catalog, &DeclaredFilters::new(), &ok_action(&log, "ok"), &renderer)
        .await
        .unwrap();

    assert!(outcome.recovered);
    assert_eq!(
        log.entries(),
        vec![
            "invoke",
            "result:outer:before",
            "result:outer:after",
            "exception:recover:seen",
            "render",
        ]
    );
    assert_eq!(renderer.renders()[0].body_text(), Some("Recovered"));
}

#[tokio::test]
async fn test_render_never_repeated_after_recovery() {
    struct FailsAfterRender;
    impl SyncResultFilter for FailsAfterRender {
        fn on_result_executed(&self, _ctx: &mut ResultExecutedContext<'_>) -> FilterResult {
            Err(Boom { code: 2 }.into())
        }
    }

    let log = Log::default();
    let catalog = FilterCatalog::builder()
        .filter(Filter::builder("fails").sync_result(FailsAfterRender).build())
        .filter(
            Tracer::new("recover", &log)
                .recover(ActionResult::ok("late"))
                .filter(0, &[Capability::Exception]),
        )
        .build();
    let renderer = Renderer::default();

    let outcome = run(&catalog, &DeclaredFilters::new(), &ok_action(&log, "first"), &renderer)
        .await
        .unwrap();

    assert!(outcome.recovered);
    let renders = renderer.renders();
    assert_eq!(renders.len(), 1);
    assert_eq!(renders[0].body_text(), Some("first"));
}

#[tokio::test]
async fn test_return_contract_violation_is_a_fault() {
    let catalog = FilterCatalog::builder()
        .filter(ErrorEnvelopeFilter::new().into_filter())
        .build();
    let renderer = Renderer::default();
    let action = action_fn(|_ctx| async { Ok(ActionOutput::Value(serde_json::json!({"id": 1}))) });
    let ctx = ActionContext::new(descriptor().returns(ReturnKind::Unit));

    let outcome = run_with(ctx, &catalog, &DeclaredFilters::new(), &action, &renderer)
        .await
        .unwrap();
    assert!(outcome.recovered);
    assert_eq!(renderer.renders()[0].status(), StatusCode::INTERNAL_SERVER_ERROR);

    // Without a recovering filter the violation reaches the caller.
    let err = run_with(
        ActionContext::new(descriptor().returns(ReturnKind::Unit)),
        &FilterCatalog::new(),
        &DeclaredFilters::new(),
        &action,
        &renderer,
    )
    .await
    .unwrap_err();
    let violation = err
        .fault()
        .and_then(|f| f.downcast_ref::<ReturnContractViolation>())
        .unwrap();
    assert_eq!(violation.declared, ReturnKind::Unit);
    assert_eq!(violation.produced, ReturnKind::Value);
}

#[tokio::test]
async fn test_value_and_unit_outputs_are_wrapped() {
    let renderer = Renderer::default();
    let value = action_fn(|_ctx| async { Ok(ActionOutput::Value(serde_json::json!([1, 2]))) });
    run_with(
        ActionContext::new(descriptor().returns(ReturnKind::Value)),
        &FilterCatalog::new(),
        &DeclaredFilters::new(),
        &value,
        &renderer,
    )
    .await
    .unwrap();

    let unit = action_fn(|_ctx| async { Ok(ActionOutput::Unit) });
    run_with(
        ActionContext::new(descriptor().returns(ReturnKind::Unit)),
        &FilterCatalog::new(),
        &DeclaredFilters::new(),
        &unit,
        &renderer,
    )
    .await
    .unwrap();

    let renders = renderer.renders();
    assert_eq!(renders[0].body_json(), Some(&serde_json::json!([1, 2])));
    assert_eq!(renders[1].status(), StatusCode::OK);
    assert!(renders[1].body_text().is_none());
}

#[tokio::test]
async fn test_cancelled_request_fails_before_first_callback() {
    let log = Log::default();
    let token = CancellationToken::new();
    token.cancel();
    let catalog = FilterCatalog::builder()
        .filter(Tracer::new("all", &log).filter(
            0,
            &[Capability::Authorization, Capability::Resource, Capability::Action],
        ))
        .build();
    let renderer = Renderer::default();

    let err = run_with(
        ActionContext::new(descriptor()).with_cancellation(token),
        &catalog,
        &DeclaredFilters::new(),
        &ok_action(&log, "ok"),
        &renderer,
    )
    .await
    .unwrap_err();

    assert!(err.fault().unwrap().downcast_ref::<RequestCancelled>().is_some());
    assert!(log.entries().is_empty());
    assert!(renderer.renders().is_empty());
}

#[tokio::test]
async fn test_cancellation_before_invoke_reaches_exception_filters() {
    struct CancelsRequest(CancellationToken);
    impl SyncActionFilter for CancelsRequest {
        fn on_action_executing(&self, _ctx: &mut ActionExecutingContext<'_>) -> FilterResult {
            self.0.cancel();
            Ok(())
        }
    }

    let log = Log::default();
    let token = CancellationToken::new();
    let catalog = FilterCatalog::builder()
        .filter(Filter::builder("cancels").sync_action(CancelsRequest(token.clone())).build())
        .filter(ErrorEnvelopeFilter::new().into_filter())
        .build();
    let renderer = Renderer::default();

    let outcome = run_with(
        ActionContext::new(descriptor()).with_cancellation(token),
        &catalog,
        &DeclaredFilters::new(),
        &ok_action(&log, "ok"),
        &renderer,
    )
    .await
    .unwrap();

    assert!(outcome.recovered);
    assert!(!log.contains("invoke"));
    assert_eq!(renderer.renders()[0].status(), StatusCode::GATEWAY_TIMEOUT);
}

#[tokio::test]
async fn test_cancellation_observed_by_filter() {
    struct Watchful(CancellationToken);
    impl SyncActionFilter for Watchful {
        fn on_action_executing(&self, ctx: &mut ActionExecutingContext<'_>) -> FilterResult {
            self.0.cancel();
            ctx.action().ensure_active()
        }
    }

    let log = Log::default();
    let token = CancellationToken::new();
    let catalog = FilterCatalog::builder()
        .filter(Filter::builder("watchful").sync_action(Watchful(token.clone())).build())
        .build();
    let renderer = Renderer::default();

    let err = run_with(
        ActionContext::new(descriptor()).with_cancellation(token),
        &catalog,
        &DeclaredFilters::new(),
        &ok_action(&log, "ok"),
        &renderer,
    )
    .await
    .unwrap_err();

    assert!(err.fault().unwrap().downcast_ref::<RequestCancelled>().is_some());
    assert!(!log.contains("invoke"));
}

// ============================================================================
// Effective policies
// ============================================================================

#[tokio::test]
async fn test_action_scope_policy_wins_over_global() {
    const AUDIT: PolicyMarker = PolicyMarker::new("audit");

    struct Audit {
        name: &'static str,
        log: Log,
    }
    impl SyncActionFilter for Audit {
        fn on_action_executing(&self, ctx: &mut ActionExecutingContext<'_>) -> FilterResult {
            self.log.push(format!("{}:ran", self.name));
            if ctx.is_effective_policy(&AUDIT) {
                self.log.push(format!("{}:applied", self.name));
            }
            Ok(())
        }
    }

    let log = Log::default();
    let audit = |name: &'static str| {
        Filter::builder(name)
            .policy(AUDIT)
            .sync_action(Audit {
                name,
                log: log.clone(),
            })
            .build()
    };
    let catalog = FilterCatalog::builder().filter(audit("global")).build();
    let declared = DeclaredFilters::new().action(audit("action"));
    let renderer = Renderer::default();

    run(&catalog, &declared, &ok_action(&log, "ok"), &renderer)
        .await
        .unwrap();

    assert_eq!(
        log.entries(),
        vec!["global:ran", "action:ran", "action:applied", "invoke"]
    );
}

#[tokio::test]
async fn test_cors_override_applies_only_action_policy() {
    let catalog = FilterCatalog::builder()
        .filter(CorsFilter::permissive().into_filter())
        .build();
    let declared = DeclaredFilters::new().action(
        CorsFilter::builder()
            .allow_origin("https://app.example.com")
            .build()
            .into_filter(),
    );
    let log = Log::default();

    let request = |origin: &'static str| {
        let mut headers = HeaderMap::new();
        headers.insert("origin", HeaderValue::from_static(origin));
        ActionContext::new(descriptor())
            .with_method(Method::GET)
            .with_headers(headers)
    };

    let renderer = Renderer::default();
    run_with(request("https://evil.com"), &catalog, &declared, &ok_action(&log, "ok"), &renderer)
        .await
        .unwrap();
    run_with(
        request("https://app.example.com"),
        &catalog,
        &declared,
        &ok_action(&log, "ok"),
        &renderer,
    )
    .await
    .unwrap();

    let renders = renderer.renders();
    // The permissive global policy would have allowed any origin.
    assert!(!renders[0].headers().contains_key("access-control-allow-origin"));
    assert_eq!(
        renders[1].headers().get("access-control-allow-origin").unwrap(),
        "https://app.example.com"
    );
}

#[tokio::test]
async fn test_cors_preflight_short_circuits() {
    let catalog = FilterCatalog::builder()
        .filter(CorsFilter::permissive().into_filter())
        .build();
    let log = Log::default();
    let mut headers = HeaderMap::new();
    headers.insert("origin", HeaderValue::from_static("https://app.example.com"));
    headers.insert("access-control-request-method", HeaderValue::from_static("PUT"));
    let ctx = ActionContext::new(descriptor())
        .with_method(Method::OPTIONS)
        .with_headers(headers);
    let renderer = Renderer::default();

    let outcome = run_with(ctx, &catalog, &DeclaredFilters::new(), &ok_action(&log, "ok"), &renderer)
        .await
        .unwrap();

    assert!(outcome.canceled);
    assert!(!log.contains("invoke"));
    let rendered = &renderer.renders()[0];
    assert_eq!(rendered.status(), StatusCode::NO_CONTENT);
    assert!(rendered.headers().contains_key("access-control-allow-methods"));
}

#[tokio::test]
async fn test_required_policy_missing_is_misuse() {
    let plan = resolve(Vec::new());
    let pipeline = Pipeline::builder()
        .record_metrics(false)
        .require_policy(PolicyMarker::ERROR_ENVELOPE)
        .build();
    let log = Log::default();

    let err = pipeline
        .execute(
            &plan,
            ActionContext::new(descriptor()),
            &ok_action(&log, "ok"),
            &Renderer::default(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::NoEffectivePolicy { .. }));
    assert!(err.is_misuse());
}

// ============================================================================
// Arguments, factories and context lifecycle
// ============================================================================

#[tokio::test]
async fn test_action_filter_rewrites_arguments() {
    struct Defaults;
    impl SyncActionFilter for Defaults {
        fn on_action_executing(&self, ctx: &mut ActionExecutingContext<'_>) -> FilterResult {
            ctx.arguments_mut()
                .entry("limit".to_string())
                .or_insert(serde_json::json!(20));
            Ok(())
        }
    }

    let catalog = FilterCatalog::builder()
        .filter(Filter::builder("defaults").sync_action(Defaults).build())
        .build();
    let action = action_fn(|ctx| {
        let limit = ctx.argument("limit").cloned();
        async move {
            Ok(ActionOutput::from(ActionResult::json(
                StatusCode::OK,
                serde_json::json!({ "limit": limit }),
            )))
        }
    });
    let renderer = Renderer::default();

    run_with(
        ActionContext::new(descriptor()).with_argument("page", serde_json::json!(1)),
        &catalog,
        &DeclaredFilters::new(),
        &action,
        &renderer,
    )
    .await
    .unwrap();

    assert_eq!(
        renderer.renders()[0].body_json().unwrap()["limit"],
        serde_json::json!(20)
    );
}

#[tokio::test]
async fn test_factory_creates_instance_per_request() {
    let created = Arc::new(AtomicUsize::new(0));
    let log = Log::default();
    let counter = Arc::clone(&created);
    let tracer_log = log.clone();
    let factory = FilterDescriptor::factory(
        "scoped",
        FilterScope::Action,
        CapabilitySet::empty().with(Capability::Action),
        move |_ctx: &ActionContext| -> Result<Filter, Fault> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Tracer::new("scoped", &tracer_log).filter(0, &[Capability::Action]))
        },
    );
    let declared = DeclaredFilters::new().action_descriptor(factory);
    let renderer = Renderer::default();

    for _ in 0..2 {
        run(&FilterCatalog::new(), &declared, &ok_action(&log, "ok"), &renderer)
            .await
            .unwrap();
    }

    assert_eq!(created.load(Ordering::SeqCst), 2);
    assert_eq!(log.matching("action:scoped", ":before").len(), 2);
}

#[tokio::test]
async fn test_factory_capability_mismatch() {
    let declared = DeclaredFilters::new().action_descriptor(FilterDescriptor::factory(
        "liar",
        FilterScope::Action,
        CapabilitySet::empty().with(Capability::Resource),
        |_ctx: &ActionContext| -> Result<Filter, Fault> {
            Ok(Tracer::new("liar", &Log::default()).filter(0, &[Capability::Action]))
        },
    ));
    let log = Log::default();

    let err = run(
        &FilterCatalog::new(),
        &declared,
        &ok_action(&log, "ok"),
        &Renderer::default(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, PipelineError::CapabilityMismatch { .. }));
    assert!(!log.contains("invoke"));
}

#[tokio::test]
async fn test_context_reuse_requires_reset() {
    let log = Log::default();
    let pipeline = pipeline();
    let plan = resolve(vec![FilterDescriptor::instance(
        FilterScope::Global,
        Tracer::new("once", &log).filter(0, &[Capability::Action]),
    )]);
    let mut ctx: PipelineContext = pipeline
        .prepare(&plan, ActionContext::new(descriptor()))
        .unwrap();
    let action = ok_action(&log, "ok");
    let renderer = Renderer::default();

    pipeline.run(&mut ctx, &action, &renderer).await.unwrap();
    let err = pipeline.run(&mut ctx, &action, &renderer).await.unwrap_err();
    assert!(matches!(err, PipelineError::ContextReused { .. }));

    ctx.reset();
    pipeline.run(&mut ctx, &action, &renderer).await.unwrap();
    assert_eq!(renderer.renders().len(), 2);
}
