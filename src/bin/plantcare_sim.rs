//! Scripted day in the life of one plant-care node.
//!
//! Usage: `plantcare-sim [config.json]`
//!
//! Drives a `DeviceContext` with a synthetic sensor trace: the soil dries
//! out over the day, the link drops for a few hours, the owner waters the
//! plant in the evening. Records are kept under the configured data
//! directory, so a second run resumes where the first one stopped.

use std::path::PathBuf;

use anyhow::Context;

use plantcare_core::persistence::FileStore;
use plantcare_core::protocol::{Channel, LoopbackTransport, ProtocolEvent};
use plantcare_core::{init_logger, AlertEffect, CoreConfig, DeviceContext, SensorReading, Timestamp};

const START: Timestamp = 1_700_000_000_000;
const STEP_MS: u64 = 5 * 60 * 1000;
const STEPS_PER_DAY: u64 = 24 * 12;

/// Synthetic sensor trace for step `i` of the day.
fn reading_at(step: u64, watered_at: u64) -> SensorReading {
    let hours = step as f32 / 12.0;
    let since_watering = if step >= watered_at { step - watered_at } else { step };
    let base_moisture = if step >= watered_at { 70.0 } else { 45.0 };
    let moisture = (base_moisture - since_watering as f32 * 0.15).max(2.0);

    // Grow lamp around the clock, daylight between 06:00 and 20:00.
    let light = if (6.0..20.0).contains(&hours) {
        let phase = (hours - 6.0) / 14.0 * std::f32::consts::PI;
        600.0 + 2_500.0 * phase.sin()
    } else {
        600.0
    };
    let temperature = 18.0 + 8.0 * ((hours - 8.0) / 24.0 * std::f32::consts::TAU).sin().max(0.0);

    SensorReading::new(moisture, light, temperature, 55.0, START + step * STEP_MS)
}

fn main() -> anyhow::Result<()> {
    init_logger();

    let mut candidates: Vec<PathBuf> = std::env::args().skip(1).map(PathBuf::from).collect();
    candidates.push(PathBuf::from("plantcare.json"));
    let mut config = CoreConfig::load_or_default(&candidates);
    config.apply_env_overrides();
    config.validate().context("invalid configuration")?;
    config.log_config();

    let store = FileStore::open(&config.persistence.data_dir)
        .with_context(|| format!("cannot open data dir {}", config.persistence.data_dir.display()))?;
    let transport = LoopbackTransport::new();
    let link = transport.clone();

    let mut device = DeviceContext::new(config, transport, store);
    let resumed = device.restore(START)?;
    log::info!("SIM_START resumed={} state={}", resumed, device.evaluator().state().name());

    device.set_network_available(true, START);

    let outage = (10 * 12)..(13 * 12);
    let watered_at = 19 * 12;
    let mut alerts_raised = 0usize;
    let mut syncs = 0usize;

    for step in 0..STEPS_PER_DAY {
        let now = START + step * STEP_MS;

        if step == outage.start {
            link.set_channel_down(Channel::HttpRest, true);
            link.set_channel_down(Channel::WebSocket, true);
            device.set_network_available(false, now);
        } else if step == outage.end {
            link.set_channel_down(Channel::HttpRest, false);
            link.set_channel_down(Channel::WebSocket, false);
            syncs += count_syncs(&device.set_network_available(true, now));
        }

        let report = device.ingest(reading_at(step, watered_at), now);
        for effect in &report.alert_effects {
            if let AlertEffect::Triggered(info) = effect {
                alerts_raised += 1;
                log::info!(
                    "SIM_ALERT type={} urgent={} repeat={}",
                    info.alert_type.name(),
                    info.is_urgent,
                    info.repeat_count
                );
            }
        }
        syncs += count_syncs(&report.protocol_events);

        // The owner acknowledges within the hour.
        if device.alerts().has_active_alert() && step % 12 == 11 {
            device.acknowledge(now);
        }
    }

    let end = START + STEPS_PER_DAY * STEP_MS;
    device.shutdown(end)?;

    let stats = device.protocol().stats();
    log::info!(
        "SIM_DONE state={} score={} alerts={} syncs={} sent={} failed={} queued={} frames={}",
        device.evaluator().state().name(),
        device.evaluator().health_score(),
        alerts_raised,
        syncs,
        stats.total_messages_sent,
        stats.failed_transmissions,
        stats.current_queue_size,
        link.sent_count()
    );
    println!("{}", serde_json::to_string_pretty(&device.system_info(end))?);
    Ok(())
}

fn count_syncs(events: &[ProtocolEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, ProtocolEvent::SyncComplete { .. }))
        .count()
}
