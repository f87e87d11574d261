//! Replays the golden suite on every backend.
//!
//! Each scenario must match its recorded output within the dtype tolerance,
//! and the CPU reference and C ABI backends must agree with each other.

use lightmem_conformance::{assert_allclose, builtin_suite, run};
use lightmem_core::config::BackendKind;
use lightmem_ffi_backend::context_for;

fn backends() -> Vec<lightmem_core::Context> {
    let _ = tracing_subscriber::fmt::try_init();
    vec![context_for(BackendKind::Cpu), context_for(BackendKind::Ffi)]
}

#[test]
fn golden_suite_matches_recorded_outputs() {
    let suite = builtin_suite().unwrap();
    for ctx in backends() {
        for s in &suite {
            let out = run(&ctx, s).unwrap_or_else(|e| panic!("{} on {}: {e}", s.name, ctx.name()));
            let (atol, rtol) = s.tolerance();
            assert_allclose(&out, &s.expected, atol, rtol);
        }
        assert_eq!(ctx.live_allocations(), 0, "{} leaked", ctx.name());
    }
}

#[test]
fn backends_agree_on_every_scenario() {
    let suite = builtin_suite().unwrap();
    let [cpu, ffi] = <[_; 2]>::try_from(backends()).unwrap();
    for s in &suite {
        let a = run(&cpu, s).unwrap();
        let b = run(&ffi, s).unwrap();
        assert_eq!(a, b, "{} differs between backends", s.name);
    }
}
