use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::io::Cursor;
use vault_cryptor::{Cryptor, CryptorConfig};

fn generate_test_file(seed: u64, size: usize) -> Vec<u8> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut data = vec![0u8; size];
    rng.fill(&mut data[..]);
    data
}

fn cryptor() -> Cryptor {
    Cryptor::new(CryptorConfig::default()).unwrap()
}

fn bench_file_encryption(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_encryption");
    let cryptor = cryptor();

    let test_sizes = [
        ("1KB", 1024),
        ("32KB", 32 * 1024),
        ("100KB", 100 * 1024),
        ("1MB", 1024 * 1024),
    ];

    for (name, size) in test_sizes {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(name), &size, |b, &size| {
            let plaintext = generate_test_file(12345, size);
            b.iter(|| {
                let ciphertext = cryptor
                    .encrypt_file(Cursor::new(plaintext.clone()), Cursor::new(Vec::new()))
                    .unwrap();
                black_box(ciphertext);
            });
        });
    }
    group.finish();
}

fn bench_file_decryption(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_decryption");
    let cryptor = cryptor();

    let test_sizes = [
        ("empty", 0),
        ("1KB", 1024),
        ("32KB", 32 * 1024),
        ("100KB", 100 * 1024),
        ("1MB", 1024 * 1024),
        ("10MB", 10 * 1024 * 1024),
    ];

    for (name, size) in test_sizes {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(name), &size, |b, &size| {
            let plaintext = generate_test_file(54321, size);
            let ciphertext = cryptor
                .encrypt_file(Cursor::new(plaintext), Cursor::new(Vec::new()))
                .unwrap()
                .into_inner();

            b.iter(|| {
                let decrypted = cryptor
                    .decrypt_file(Cursor::new(ciphertext.clone()), Cursor::new(Vec::new()), true)
                    .unwrap();
                black_box(decrypted);
            });
        });
    }
    group.finish();
}

fn bench_chunked_operations(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunked_operations");
    let cryptor = cryptor();

    let chunk_size = 32 * 1024;
    let test_sizes = [
        ("just_under_1_chunk", chunk_size - 100),
        ("exactly_1_chunk", chunk_size),
        ("just_over_1_chunk", chunk_size + 100),
        ("exactly_2_chunks", chunk_size * 2),
        ("2.5_chunks", chunk_size * 2 + chunk_size / 2),
        ("10_chunks", chunk_size * 10),
    ];

    for (name, size) in test_sizes {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(name), &size, |b, &size| {
            let plaintext = generate_test_file(11111, size);
            let ciphertext = cryptor
                .encrypt_file(Cursor::new(plaintext), Cursor::new(Vec::new()))
                .unwrap()
                .into_inner();

            b.iter(|| {
                let decrypted = cryptor
                    .decrypt_file(Cursor::new(ciphertext.clone()), Cursor::new(Vec::new()), true)
                    .unwrap();
                black_box(decrypted);
            });
        });
    }
    group.finish();
}

fn bench_header_operations(c: &mut Criterion) {
    let mut group = c.benchmark_group("header_operations");
    let cryptor = cryptor();

    let headers: Vec<Vec<u8>> = (0..100u64)
        .map(|i| {
            let plaintext = generate_test_file(i, 64);
            cryptor
                .encrypt_file(Cursor::new(plaintext), Cursor::new(Vec::new()))
                .unwrap()
                .into_inner()
        })
        .collect();

    group.throughput(Throughput::Elements(headers.len() as u64));
    group.bench_function("batch_content_length_probes", |b| {
        b.iter(|| {
            for header in &headers {
                let length = cryptor
                    .decrypted_content_length(Cursor::new(header.clone()))
                    .unwrap();
                black_box(length);
            }
        });
    });

    group.finish();
}

fn bench_decrypt_range(c: &mut Criterion) {
    let mut group = c.benchmark_group("decrypt_range");
    let cryptor = cryptor();

    let sample_size = 10 * 1024 * 1024;
    let plaintext = generate_test_file(99999, sample_size);
    let ciphertext = cryptor
        .encrypt_file(Cursor::new(plaintext), Cursor::new(Vec::new()))
        .unwrap()
        .into_inner();

    let read_size = 1024 * 1024;
    group.throughput(Throughput::Bytes(read_size as u64));
    group.bench_function("random_access_1MB_window", |b| {
        b.iter(|| {
            let mut out = Vec::new();
            cryptor
                .decrypt_range(Cursor::new(ciphertext.clone()), &mut out, 0, read_size as u64)
                .unwrap();
            black_box(out);
        });
    });

    group.finish();
}

fn bench_filename_operations(c: &mut Criterion) {
    let mut group = c.benchmark_group("filename_operations");
    let cryptor = cryptor();

    let names = [
        ("short", "file.txt"),
        ("medium", "some/nested/directory/structure/file.txt"),
        ("long", &format!("document_{}_with_a_very_long_name.pdf", "x".repeat(100))),
    ];

    for (label, name) in &names {
        group.throughput(Throughput::Bytes(name.len() as u64));
        let encrypted = cryptor.encrypt_filename(name).unwrap();

        group.bench_with_input(BenchmarkId::new("encrypt", *label), name, |b, name| {
            b.iter(|| black_box(cryptor.encrypt_filename(name).unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("decrypt", *label), &encrypted, |b, encrypted| {
            b.iter(|| black_box(cryptor.decrypt_filename(encrypted).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_file_encryption,
    bench_file_decryption,
    bench_chunked_operations,
    bench_header_operations,
    bench_decrypt_range,
    bench_filename_operations,
);
criterion_main!(benches);
