use tsfiler_crypto::{decrypt_chunk, digest_hex, encrypt_chunk, Algorithm, ChunkMaterial};

fn make_data(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| (i.wrapping_mul(7) ^ (i >> 3)) as u8)
        .collect()
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_encrypt_chunk(bencher: divan::Bencher, size: usize) {
    let material = ChunkMaterial::generate(Algorithm::Aes256Cbc);
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| encrypt_chunk(divan::black_box(&material), divan::black_box(&data)).unwrap());
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_decrypt_chunk(bencher: divan::Bencher, size: usize) {
    let material = ChunkMaterial::generate(Algorithm::Aes256Cbc);
    let data = make_data(size);
    let encrypted = encrypt_chunk(&material, &data).unwrap();
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| decrypt_chunk(divan::black_box(&material), divan::black_box(&encrypted)).unwrap());
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_digest(bencher: divan::Bencher, size: usize) {
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| digest_hex(divan::black_box(&data)));
}

fn main() {
    divan::main();
}
