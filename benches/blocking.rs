//! Blocking, rearrangement, kernel and de-blocking benchmarks
//!
//! ```bash
//! cargo bench --bench blocking
//! cargo bench --bench blocking -- kernel
//! ```

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use spfc::blocking::{
    BlockGrid, BlockedCsr, BlockedOutput, ColumnBlocking, InputLayout, block_sparse, deblock,
    rearrange,
};
use spfc::kernel::{FusedKernel, KernelArgs, TiledKernel};
use spfc::runtime::{Arena, WorkerPool, available_threads, default_batch_block_width};
use spfc::sparse::CsrMatrix;
use spfc::telemetry::WorkerTelemetry;
use spfc::workload;

const ROWS: usize = 4096;
const COLS: usize = 4096;
const BATCH: usize = 256;

/// Deterministic ~5% dense matrix
fn weights() -> CsrMatrix {
    let mut triplets = Vec::new();
    let mut state = 0x2545_f491_u64;
    for i in 0..ROWS {
        for _ in 0..COLS / 20 {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            let c = (state % COLS as u64) as usize;
            triplets.push((i, c, ((state >> 32) % 7) as f32 - 3.0));
        }
    }
    CsrMatrix::from_triplets(ROWS, COLS, &triplets).expect("valid triplets")
}

/// Worker count rounded down to a multiple of the batch-block count
fn grid() -> BlockGrid {
    let width = default_batch_block_width();
    let nb = BATCH.div_ceil(width);
    let threads = (available_threads() / nb).max(1) * nb;
    BlockGrid::new(ROWS, COLS, BATCH, threads, width, ColumnBlocking::Count(32))
        .expect("valid grid")
}

fn bench_block_sparse(c: &mut Criterion) {
    let csr = weights();
    let grid = grid();
    let mut group = c.benchmark_group("block_sparse");
    group.throughput(Throughput::Elements(csr.nnz() as u64));
    group.bench_function("u32", |b| {
        b.iter(|| {
            let arena = Arena::new();
            let blocked: BlockedCsr<u32> =
                block_sparse(&arena, black_box(&csr), &grid, InputLayout::Partitioned).unwrap();
            black_box(blocked.nnz())
        })
    });
    group.finish();
}

fn bench_rearrange(c: &mut Criterion) {
    let grid = grid();
    let input = workload::input(COLS, BATCH);
    let mut group = c.benchmark_group("rearrange");
    group.throughput(Throughput::Bytes((COLS * BATCH * 4) as u64));
    for layout in [InputLayout::Partitioned, InputLayout::Replicated] {
        group.bench_with_input(BenchmarkId::from_parameter(layout), &layout, |b, &layout| {
            b.iter(|| {
                let arena = Arena::new();
                black_box(rearrange(&arena, black_box(&input), &grid, layout).unwrap().data().len())
            })
        });
    }
    group.finish();
}

fn bench_kernel(c: &mut Criterion) {
    let csr = weights();
    let grid = grid();
    let arena = Arena::new();
    let pool = WorkerPool::new(grid.threads()).unwrap();
    let input = workload::input(COLS, BATCH);
    let bias = workload::bias(ROWS);

    let mut group = c.benchmark_group("kernel");
    group.throughput(Throughput::Elements((csr.nnz() * BATCH) as u64));
    for layout in [InputLayout::RowMajor, InputLayout::Partitioned, InputLayout::Replicated] {
        let weights: BlockedCsr<u32> = block_sparse(&arena, &csr, &grid, layout).unwrap();
        let blocked_input = rearrange(&arena, &input, &grid, layout).unwrap();
        let mut output = BlockedOutput::new(&arena, &grid).unwrap();
        let mut telemetry = vec![WorkerTelemetry::default(); grid.tiles()];
        let args = KernelArgs::new(&weights, &blocked_input, &bias);

        group.bench_function(BenchmarkId::new("tiled", layout), |b| {
            b.iter(|| {
                pool.install(|| TiledKernel.compute(&args, &mut output, &mut telemetry))
                    .unwrap()
            })
        });
    }
    group.finish();
}

fn bench_deblock(c: &mut Criterion) {
    let grid = grid();
    let output = BlockedOutput::new(&Arena::new(), &grid).unwrap();
    c.bench_function("deblock", |b| b.iter(|| black_box(deblock(black_box(&output)))));
}

criterion_group!(benches, bench_block_sparse, bench_rearrange, bench_kernel, bench_deblock);
criterion_main!(benches);
