use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};

use plantcare_core::evaluation::{SensorReading, StateEvaluator};
use plantcare_core::logging::LogContext;
use plantcare_core::protocol::{
    CommunicationProtocol, LoopbackTransport, MessageBuilder, MessageType, ProtocolConfig,
};

const T0: u64 = 1_700_000_000_000;

fn bench_evaluate(c: &mut Criterion) {
    let readings: Vec<SensorReading> = (0..64u64)
        .map(|i| {
            let moisture = (i % 20) as f32 * 5.0;
            let light = (i % 7) as f32 * 400.0;
            SensorReading::new(moisture, light, 22.0, 50.0, T0 + i * 60_000)
        })
        .collect();

    c.bench_function("evaluate_64_readings", |b| {
        b.iter_batched(
            StateEvaluator::default,
            |mut evaluator| {
                for reading in &readings {
                    black_box(evaluator.evaluate(reading));
                }
                evaluator
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_sync_pass(c: &mut Criterion) {
    let ctx = LogContext::new("bench-pot");
    let reading = SensorReading::new(40.0, 900.0, 22.0, 50.0, T0);

    c.bench_function("sync_100_queued", |b| {
        b.iter_batched(
            || {
                let mut protocol =
                    CommunicationProtocol::new(ProtocolConfig::default(), LoopbackTransport::new(), &ctx);
                for i in 0..100u64 {
                    let payload = MessageBuilder::sensor_data("bench-pot", &reading);
                    protocol.send(MessageType::SensorData, payload, i % 10 == 0, T0 + i);
                }
                protocol.set_network_available(true);
                protocol
            },
            |mut protocol| {
                black_box(protocol.start_sync(T0 + 1_000));
                protocol
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_evaluate, bench_sync_pass);
criterion_main!(benches);
