use criterion::{criterion_group, criterion_main, Criterion};

use tansy::script::token::tokenize;
use tansy::script::ModuleRegistry;
use tansy::{Interpreter, InterpreterEvent};

/// Full submit-to-result round trip through the queue, the worker, and
/// the event bus.
fn bench_evaluate_round_trip(c: &mut Criterion) {
    let mut engine = Interpreter::new(ModuleRegistry::new());
    let mut events = engine.subscribe();
    engine.start().expect("failed to start the interpreter");

    c.bench_function("evaluate round trip", |b| {
        b.iter(|| {
            engine.evaluate("(2 + 3) * 4 - 5");
            loop {
                match events.recv_blocking() {
                    Ok(InterpreterEvent::StateChanged { busy: false }) => break,
                    Ok(_) => {}
                    Err(e) => panic!("event stream failed: {}", e),
                }
            }
        })
    });

    engine.stop();
}

fn bench_tokenize(c: &mut Criterion) {
    let source = "fn fib(n) { if n < 2 { return n } return fib(n - 1) + fib(n - 2) }\nfib(10)";
    c.bench_function("tokenize", |b| {
        b.iter(|| tokenize(source).expect("source should tokenize"))
    });
}

// ベンチマークグループの定義
criterion_group!(benches, bench_evaluate_round_trip, bench_tokenize);
criterion_main!(benches);
