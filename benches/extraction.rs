use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use delayed_matrix::matrix::dense::{DenseMatrix, StorageOrder};
use delayed_matrix::matrix::sparse::{CompressedSparseMatrix, StorageOrder as SparseStorageOrder};
use delayed_matrix::{Matrix, Selection};

fn dense_row_extraction(c: &mut Criterion) {
    let mut group = c.benchmark_group("dense_row_extraction");
    for size in [128usize, 512, 2048].iter() {
        let data = vec![1.0_f64; size * size];
        let matrix = DenseMatrix::new(data, *size, *size, StorageOrder::RowMajor).unwrap();
        group.throughput(Throughput::Elements((*size * *size) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let mut extractor = matrix.dense_row(Selection::Full { length: size });
            let mut buf = vec![0.0_f64; size];
            b.iter(|| {
                for i in 0..size {
                    extractor.fetch(i, &mut buf).unwrap();
                }
            });
        });
    }
    group.finish();
}

fn sparse_row_extraction(c: &mut Criterion) {
    let mut group = c.benchmark_group("sparse_row_extraction");
    for size in [128usize, 512, 2048].iter() {
        // One nonzero per row, on the diagonal.
        let indptr: Vec<usize> = (0..=*size).collect();
        let indices: Vec<u32> = (0..*size as u32).collect();
        let values = vec![1.0_f64; *size];
        let matrix = CompressedSparseMatrix::<f64, u32>::new(
            values,
            indices,
            indptr,
            *size,
            *size,
            SparseStorageOrder::Csr,
            Some(false),
        )
        .unwrap();
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let mut extractor = matrix.sparse_row(Selection::Full { length: size });
            let mut vbuf = vec![0.0_f64; size];
            let mut ibuf = vec![0u32; size];
            b.iter(|| {
                for i in 0..size {
                    extractor.fetch(i, &mut vbuf, &mut ibuf).unwrap();
                }
            });
        });
    }
    group.finish();
}

criterion_group!(benches, dense_row_extraction, sparse_row_extraction);
criterion_main!(benches);
