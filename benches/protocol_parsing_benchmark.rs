use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use uci_engine_pool::protocol::{parse_continuation, parse_eval_score, parse_legal_moves};
use uci_engine_pool::query::find_move_token;
use uci_engine_pool::BestMoveEval;

/// Result parsing on the hot path of every best-move and eval request

fn benchmark_continuation_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("continuation_parsing");

    // Principal variations of increasing length
    for plies in [1, 8, 32] {
        let pv: Vec<&str> = ["e2e4", "e7e5", "g1f3", "b8c6"]
            .iter()
            .cycle()
            .take(plies)
            .copied()
            .collect();
        let info = format!(
            "info depth 22 seldepth 30 multipv 1 score cp 31 nodes 2419201 nps 1209600 hashfull 512 tbhits 0 time 2000 pv {}",
            pv.join(" ")
        );

        group.bench_with_input(BenchmarkId::new("regular", plies), &info, |bench, info| {
            bench.iter(|| black_box(parse_continuation("bestmove e2e4 ponder e7e5", info)))
        });
    }

    group.bench_function("mate", |bench| {
        bench.iter(|| {
            black_box(parse_continuation(
                "bestmove a1a8",
                "info depth 5 seldepth 2 multipv 1 score mate 1 nodes 31 pv a1a8",
            ))
        })
    });

    group.bench_function("stalemate", |bench| {
        bench.iter(|| black_box(parse_continuation("bestmove (none)", "info depth 0 score cp 0")))
    });

    group.finish();
}

fn benchmark_response_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("response_parsing");

    let perft: Vec<String> = [
        "a2a3", "b2b3", "c2c3", "d2d3", "e2e3", "f2f3", "g2g3", "h2h3", "a2a4", "b2b4", "c2c4",
        "d2d4", "e2e4", "f2f4", "g2g4", "h2h4", "b1a3", "b1c3", "g1f3", "g1h3",
    ]
    .iter()
    .map(|mv| format!("{}: 1", mv))
    .chain(["".to_string(), "Nodes searched: 20".to_string()])
    .collect();

    group.bench_function("legal_moves", |bench| {
        bench.iter(|| black_box(parse_legal_moves(&perft)))
    });

    group.bench_function("eval_score", |bench| {
        bench.iter(|| {
            black_box(parse_eval_score(
                "Final evaluation       +0.08 (white side) [with scaled NNUE, hybrid, ...]",
            ))
        })
    });

    group.bench_function("find_move_token", |bench| {
        bench.iter(|| {
            black_box(find_move_token(
                "info depth 12 seldepth 15 multipv 1 score cp 40 nodes 9000 pv d2d4 g8f6 c2c4",
            ))
        })
    });

    group.bench_function("best_move_eval", |bench| {
        bench.iter(|| black_box(BestMoveEval::from_responses("3|d1d8 e8d8 c1g5", "+4.21")))
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_continuation_parsing,
    benchmark_response_parsing
);
criterion_main!(benches);
