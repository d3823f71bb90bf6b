use std::hint::black_box;
use std::time::Duration;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use h264_au_sync::{Action, Chunk, Framerate, ParseSession, ParserConfig, ParserError};

fn synthetic_stream(pictures: usize) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&[0, 0, 0, 1, 0x67, 0x64, 0x00, 0x1F, 0xAC, 0xD9]);
    out.extend_from_slice(&[0, 0, 0, 1, 0x68, 0xEB, 0xE3, 0xCB]);
    for index in 0..pictures {
        let header = if index % 30 == 0 { 0x65 } else { 0x41 };
        out.extend_from_slice(&[0, 0, 0, 1, 0x09, 0x10]);
        out.extend_from_slice(&[0, 0, 0, 1, header, 0x88]);
        out.extend((0..1500).map(|i| ((i * 7 + index) % 251) as u8 | 0x01));
    }
    out
}

fn run_parse(data: &[u8], chunk_bytes: usize, config: ParserConfig) -> Result<usize, ParserError> {
    let mut session = ParseSession::annexb(config)?;
    let mut emitted = 0usize;
    for chunk in data.chunks(chunk_bytes.max(1)) {
        session.submit(Chunk::new(chunk.to_vec()))?;
        while let Some(action) = session.try_reap() {
            if let Action::Buffers(buffers) = action {
                emitted += buffers.len();
            }
        }
    }
    emitted += session.finish()?.actions.len();
    Ok(emitted)
}

fn parse_benchmark(c: &mut Criterion) {
    let data = synthetic_stream(300);
    let framerate = Framerate::new(30, 1).expect("valid framerate");

    let mut group = c.benchmark_group("parse_annexb");
    group.sample_size(30);
    group.measurement_time(Duration::from_secs(10));
    group.warm_up_time(Duration::from_secs(2));

    for (mode, config) in [
        ("pass_through", ParserConfig::new()),
        ("synthesized", ParserConfig::new().with_framerate(framerate)),
    ] {
        for chunk_bytes in [188usize, 4096, 1024 * 1024] {
            group.throughput(Throughput::Bytes(data.len() as u64));
            group.bench_with_input(
                BenchmarkId::new(mode, format!("chunk_{chunk_bytes}")),
                &chunk_bytes,
                |b, &chunk| {
                    b.iter(|| {
                        black_box(
                            run_parse(&data, chunk, config.clone())
                                .expect("parse should succeed in benchmark"),
                        )
                    });
                },
            );
        }
    }

    group.finish();
}

criterion_group!(benches, parse_benchmark);
criterion_main!(benches);
