/*
 * shardcrypt: threshold-protected encrypted backup containers
 * Copyright (C) 2020-2022 The shardcrypt Authors
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */


use std::time::Duration;

use shardcrypt_core::{
    filecrypt::{Algorithm, BlockSize, Encoder, EncryptionHeader, HashType, KeyHeader, Position},
    shamir::{Config, FieldType},
};

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use rand::{distributions::Standard, Rng};

fn benchmark_generate_shares(c: &mut Criterion) {
    let mut group = c.benchmark_group("shamir Config::generate_shares");
    for threshold in (10..=40).step_by(10) {
        let config = Config::new(threshold, threshold * 2, FieldType::Bn254Fr).unwrap();
        let secret = config.new_secret();
        group.measurement_time(Duration::new(20, 0));
        group.bench_with_input(format!("T={:03}", threshold), &secret, |b, secret| {
            b.iter(|| config.generate_shares(secret).unwrap())
        });
    }
    group.finish()
}

fn benchmark_generate_secret(c: &mut Criterion) {
    let mut group = c.benchmark_group("shamir Config::generate_secret");
    for threshold in (5..=65).step_by(15) {
        let config = Config::new(threshold, threshold, FieldType::Bn254Fr).unwrap();
        let shares = config.generate_shares(&config.new_secret()).unwrap();
        group.measurement_time(Duration::new(20 + threshold as u64, 0));
        group.bench_with_input(format!("T={:03}", threshold), &shares, |b, shares| {
            b.iter(|| black_box(config.generate_secret(shares).unwrap()))
        });
    }
    group.finish()
}

fn benchmark_seal(c: &mut Criterion) {
    let mut group = c.benchmark_group("filecrypt Encoder::encrypt aead");
    let key_header = KeyHeader::pbkdf2(HashType::Sha256, 1000, 32, 12).unwrap();
    for size in [1usize << 10, 1 << 14, 1 << 18] {
        let data = rand::thread_rng()
            .sample_iter(Standard)
            .take(size)
            .collect::<Vec<u8>>();
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(format!("{}B", size), &data, |b, data| {
            b.iter(|| {
                let mut encoder = Encoder::in_memory(key_header.clone(), Some(&b"benchmark"[..]));
                let header =
                    EncryptionHeader::new(Algorithm::Aead, Position::Single, BlockSize::Bits256)
                        .unwrap();
                encoder.encrypt(header, data).unwrap();
                black_box(encoder.into_sink())
            })
        });
    }
    group.finish()
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(100);
    targets = benchmark_generate_shares, benchmark_generate_secret, benchmark_seal
}
criterion_main!(benches);
