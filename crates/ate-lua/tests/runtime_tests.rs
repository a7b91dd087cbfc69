//! Guarded operations, capabilities and fault containment.

use ate_lua::testing::RuntimeHarness;
use ate_lua::{Capability, RuntimeConfig, RuntimeError, ScriptRuntime};
use ate_types::ErrorCode;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::thread;
use std::time::Duration;

// =============================================================================
// Execution guard
// =============================================================================

mod guard {
    use super::*;

    /// Host function that measures how many script operations are inside
    /// the runtime at once and what the guard reports meanwhile.
    struct Probe {
        inside: AtomicUsize,
        max_inside: AtomicUsize,
        max_holds: AtomicUsize,
        min_holds: AtomicUsize,
        runtime: OnceLock<Weak<ScriptRuntime>>,
    }

    impl Probe {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                inside: AtomicUsize::new(0),
                max_inside: AtomicUsize::new(0),
                max_holds: AtomicUsize::new(0),
                min_holds: AtomicUsize::new(usize::MAX),
                runtime: OnceLock::new(),
            })
        }

        fn capability(self: &Arc<Self>) -> Capability {
            let probe = Arc::clone(self);
            Capability::function(move |_| {
                let now = probe.inside.fetch_add(1, Ordering::SeqCst) + 1;
                probe.max_inside.fetch_max(now, Ordering::SeqCst);
                if let Some(rt) = probe.runtime.get().and_then(Weak::upgrade) {
                    let holds = rt.guard_holds();
                    probe.max_holds.fetch_max(holds, Ordering::SeqCst);
                    probe.min_holds.fetch_min(holds, Ordering::SeqCst);
                }
                thread::sleep(Duration::from_micros(200));
                probe.inside.fetch_sub(1, Ordering::SeqCst);
                Ok(Value::Null)
            })
        }
    }

    #[test]
    fn concurrent_callers_never_interleave() {
        const THREADS: usize = 8;
        const CALLS: usize = 25;

        let harness = RuntimeHarness::new();
        let probe = Probe::new();
        harness
            .manager()
            .register_capability("probe", probe.capability());
        let rt = harness
            .runtime_with_script(
                "shared",
                r#"
                counter = 0
                log = {}
                function work(worker, i)
                    local before = counter
                    probe()
                    counter = before + 1
                    log[#log + 1] = worker .. ":" .. i
                    return counter
                end
                function total() return counter end
                function log_size() return #log end
            "#,
            )
            .expect("runtime");
        let _ = probe.runtime.set(Arc::downgrade(&rt));

        let workers: Vec<_> = (0..THREADS)
            .map(|worker| {
                let rt = Arc::clone(&rt);
                thread::spawn(move || {
                    for i in 0..CALLS {
                        match i % 3 {
                            0 => {
                                rt.call_function("work", vec![json!(worker), json!(i)])
                                    .expect("call_function");
                            }
                            1 => {
                                rt.call_method_on_object("_G", "work", vec![json!(worker), json!(i)])
                                    .expect("call_method_on_object");
                            }
                            _ => {
                                rt.add_script(&format!("work({worker}, {i})"))
                                    .expect("add_script");
                            }
                        }
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().expect("worker thread");
        }

        let expected = json!(THREADS * CALLS);
        assert_eq!(rt.call_function("total", vec![]).expect("total"), expected);
        assert_eq!(rt.call_function("log_size", vec![]).expect("log"), expected);
        assert_eq!(probe.max_inside.load(Ordering::SeqCst), 1);
        assert_eq!(probe.max_holds.load(Ordering::SeqCst), 1);
        assert_eq!(probe.min_holds.load(Ordering::SeqCst), 1);
        assert_eq!(rt.guard_holds(), 0);
    }

    #[test]
    fn separate_runtimes_are_independent() {
        let harness = RuntimeHarness::new();
        let a = harness
            .runtime_with_script("a", "value = 'a'")
            .expect("a");
        let b = harness
            .runtime_with_script("b", "value = 'b'")
            .expect("b");
        a.add_script("function get() return value end").expect("script");
        b.add_script("function get() return value end").expect("script");
        assert_eq!(a.call_function("get", vec![]).expect("a"), json!("a"));
        assert_eq!(b.call_function("get", vec![]).expect("b"), json!("b"));
    }
}

// =============================================================================
// Capabilities
// =============================================================================

mod capabilities {
    use super::*;

    #[test]
    fn registration_is_visible_only_to_later_runtimes() {
        let harness = RuntimeHarness::new();
        let probe = "function has_x() return x ~= nil end";

        let early = harness.runtime_with_script("early", probe).expect("early");
        harness
            .manager()
            .register_capability("x", Capability::value(json!({"enabled": true})));
        let late = harness.runtime_with_script("late", probe).expect("late");

        assert_eq!(early.call_function("has_x", vec![]).expect("call"), json!(false));
        assert_eq!(late.call_function("has_x", vec![]).expect("call"), json!(true));
    }

    #[test]
    fn host_function_receives_json_arguments() {
        let harness = RuntimeHarness::new();
        harness.manager().register_capability(
            "host",
            Capability::object([(
                "describe",
                Capability::function(|args| {
                    Ok(json!({ "count": args.len(), "first": args.first().cloned() }))
                }),
            )]),
        );
        let rt = harness
            .runtime_with_script(
                "app",
                r#"function describe() return host.describe({ a = 1 }, "two") end"#,
            )
            .expect("runtime");
        assert_eq!(
            rt.call_function("describe", vec![]).expect("call"),
            json!({ "count": 2, "first": { "a": 1 } })
        );
    }

    #[test]
    fn capability_may_override_prelude_global() {
        let harness = RuntimeHarness::new();
        harness
            .manager()
            .register_capability("network", Capability::value("replaced"));
        let rt = harness
            .runtime_with_script("app", "function net() return network end")
            .expect("runtime");
        assert_eq!(rt.call_function("net", vec![]).expect("call"), json!("replaced"));
    }
}

// =============================================================================
// Fault containment
// =============================================================================

mod containment {
    use super::*;

    #[test]
    fn throwing_method_then_unrelated_call_succeeds() {
        let harness = RuntimeHarness::new();
        let rt = harness
            .runtime_with_script(
                "app",
                r#"
                handler = {
                    explode = function() error("handler exploded") end,
                }
                function ping() return "pong" end
            "#,
            )
            .expect("runtime");

        let err = rt
            .call_method_on_object("handler", "explode", vec![])
            .expect_err("reported failure");
        assert_eq!(err.code(), "RUNTIME_GUEST_FAILURE");
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("handler exploded"));

        assert_eq!(rt.call_function("ping", vec![]).expect("ping"), json!("pong"));
    }

    #[test]
    fn cyclic_return_value_is_a_guest_failure() {
        let harness = RuntimeHarness::new();
        let rt = harness
            .runtime_with_script(
                "app",
                r#"
                obj = { loop = function() local t = {} t.me = t return t end }
                function loop() return obj.loop() end
                function ping() return "pong" end
            "#,
            )
            .expect("runtime");

        let err = rt
            .call_method_on_object("obj", "loop", vec![])
            .expect_err("cyclic result");
        assert_eq!(err.code(), "RUNTIME_GUEST_FAILURE");

        let err = rt.call_function("loop", vec![]).expect_err("cyclic result");
        assert_eq!(err.code(), "RUNTIME_CONVERSION");
        let err = rt.run_function("loop", &[]).expect_err("cyclic result");
        assert_eq!(err.code(), "RUNTIME_CONVERSION");

        assert_eq!(rt.call_function("ping", vec![]).expect("ping"), json!("pong"));
        assert_eq!(rt.guard_holds(), 0);
    }

    #[test]
    fn mixed_table_return_value_is_rejected() {
        let harness = RuntimeHarness::new();
        let rt = harness
            .runtime_with_script("app", "obj = { mixed = function() return {1, 2, x = 3} end }")
            .expect("runtime");
        let err = rt
            .call_method_on_object("obj", "mixed", vec![])
            .expect_err("mixed table");
        assert_eq!(err.code(), "RUNTIME_GUEST_FAILURE");
    }

    #[test]
    fn oversized_exponent_returns_nil_promptly() {
        let harness = RuntimeHarness::new();
        let rt = harness
            .runtime_with_script(
                "app",
                r#"
                calc = {
                    huge = function() return smath.exp("3", "0xffffffff") == nil end,
                }
            "#,
            )
            .expect("runtime");
        let started = std::time::Instant::now();
        let out = rt
            .call_method_on_object("calc", "huge", vec![])
            .expect("call");
        assert_eq!(out, json!(true));
        assert!(started.elapsed() < std::time::Duration::from_secs(1));
    }

    #[test]
    fn call_function_failures_name_the_function() {
        let harness = RuntimeHarness::new();
        let rt = harness
            .runtime_with_script("app", "function broken() local t = nil return t.x end")
            .expect("runtime");
        match rt.call_function("broken", vec![]) {
            Err(RuntimeError::Call { function, message }) => {
                assert_eq!(function, "broken");
                assert!(!message.is_empty());
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}

// =============================================================================
// Bounded execution
// =============================================================================

mod timeout {
    use super::*;

    #[test]
    fn runaway_script_times_out_and_runtime_recovers() {
        let harness = RuntimeHarness::with_config(RuntimeConfig {
            call_timeout_ms: Some(100),
            ..RuntimeConfig::default()
        });
        let rt = harness.manager().create_runtime("app").expect("runtime");

        let err = rt.add_script("while true do end").expect_err("runaway");
        assert_eq!(err.code(), "RUNTIME_TIMEOUT");

        let err = rt
            .add_script("obj = { spin = function() while true do end end }")
            .and_then(|()| rt.call_method_on_object("obj", "spin", vec![]))
            .expect_err("runaway method");
        assert!(matches!(err, RuntimeError::Timeout { operation: "call_method_on_object", .. }));

        rt.add_script("function ok() return true end").expect("recovered");
        assert_eq!(rt.call_function("ok", vec![]).expect("call"), json!(true));
        assert_eq!(rt.guard_holds(), 0);
    }

    #[test]
    fn no_timeout_by_default() {
        let harness = RuntimeHarness::new();
        let rt = harness.manager().create_runtime("app").expect("runtime");
        rt.add_script("local n = 0 for i = 1, 2000000 do n = n + i end")
            .expect("long loop completes");
    }
}
