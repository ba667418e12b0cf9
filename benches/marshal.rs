//! Benchmarks for crossing the host boundary.
//!
//! Measures the per-call cost of each interop layer:
//! - Scalar push/read through the Stack Value Protocol
//! - Script calls into host closures (thunk dispatch)
//! - Host calls into script functions
//! - Table enumeration and deep conversion
//! - Reflected field access and method calls

extern crate luainterop;

use criterion::{criterion_group, criterion_main, Criterion};
use luainterop::prelude::*;
use std::hint::black_box;

#[derive(Clone)]
struct Particle {
    x: f64,
    vx: f64,
}

impl UserData for Particle {
    fn register(b: &mut BindingBuilder<Self>) {
        b.field("x", |p| p.x, |p, x| p.x = x).method_mut("step", |p, dt: f64| {
            p.x += p.vx * dt;
            Ok(p.x)
        });
    }
}

/// Benchmark pushing and reading back a number and a string.
fn bench_scalar_round_trip(c: &mut Criterion) {
    let mut state = State::new();

    c.bench_function("marshal_scalar_round_trip", |b| {
        b.iter(|| {
            state.push(black_box(42.5)).unwrap();
            state.push(black_box("label")).unwrap();
            let s = state.read::<String>(-1).unwrap();
            let n = state.read::<f64>(-2).unwrap();
            state.pop(2).unwrap();
            black_box((n, s))
        });
    });
}

/// Benchmark a script call into a two-argument host closure.
fn bench_host_closure_call(c: &mut Criterion) {
    let mut state = State::new();
    state
        .register("add", |(a, b): (f64, f64)| Ok(a + b))
        .unwrap();

    c.bench_function("call_host_closure", |b| {
        b.iter(|| {
            state.get_global("add").unwrap();
            state.push(black_box(1.0)).unwrap();
            state.push(black_box(2.0)).unwrap();
            state.call(2, 1).unwrap();
            let r = state.read::<f64>(-1).unwrap();
            state.pop(1).unwrap();
            black_box(r)
        });
    });
}

/// Benchmark a typed host call into a script function.
fn bench_script_function_call(c: &mut Criterion) {
    let mut state = State::new();
    let mul = state
        .create_function("mul", |(a, b): (f64, f64)| Ok(a * b))
        .unwrap();

    c.bench_function("call_script_function", |b| {
        b.iter(|| {
            let r: f64 = mul.call(&mut state, (black_box(3.0), 4.0)).unwrap();
            black_box(r)
        });
    });
}

/// Benchmark enumerating a 256-entry sequence.
fn bench_table_iteration(c: &mut Criterion) {
    let mut state = State::new();
    let values: Vec<f64> = (0..256).map(f64::from).collect();
    let view = ContainerView::from_list(&mut state, &values).unwrap();

    c.bench_function("container_iterate_256", |b| {
        b.iter(|| {
            let mut sum = 0.0;
            for pair in view.iter(&mut state).unwrap() {
                let (_, value) = pair.unwrap();
                if let Value::Number(n) = value {
                    sum += n;
                }
            }
            black_box(sum)
        });
    });
}

/// Benchmark copying a nested table into a host map.
fn bench_table_to_host_map(c: &mut Criterion) {
    let mut state = State::new();
    let outer = ContainerView::new_map(&mut state, 16).unwrap();
    for i in 0..16 {
        let inner = ContainerView::from_list(&mut state, &[1.0, 2.0, 3.0, 4.0]).unwrap();
        outer.set(&mut state, format!("k{}", i), &inner).unwrap();
        state.pop(1).unwrap();
    }

    c.bench_function("container_to_host_map", |b| {
        b.iter(|| black_box(outer.to_host_map(&state).unwrap()));
    });
}

/// Benchmark reading a reflected field and calling a reflected method.
fn bench_reflected_member_access(c: &mut Criterion) {
    let mut state = State::new();
    state.new_instance(Particle { x: 0.0, vx: 1.0 }).unwrap();

    c.bench_function("userdata_field_read", |b| {
        b.iter(|| {
            state.get_field(1, black_box("x")).unwrap();
            let x = state.read::<f64>(-1).unwrap();
            state.pop(1).unwrap();
            black_box(x)
        });
    });

    c.bench_function("userdata_method_call", |b| {
        b.iter(|| {
            state.get_field(1, "step").unwrap();
            state.push_copy(1).unwrap();
            state.push(black_box(0.5)).unwrap();
            state.call(2, 1).unwrap();
            let x = state.read::<f64>(-1).unwrap();
            state.pop(1).unwrap();
            black_box(x)
        });
    });
}

criterion_group!(
    benches,
    bench_scalar_round_trip,
    bench_host_closure_call,
    bench_script_function_call,
    bench_table_iteration,
    bench_table_to_host_map,
    bench_reflected_member_access,
);
criterion_main!(benches);
