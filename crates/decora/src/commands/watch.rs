//! Live watch handler: stream device state changes to the terminal.

use std::collections::HashMap;
use std::sync::Arc;

use owo_colors::OwoColorize;

use decora_api::Device;
use decora_core::{Bridge, model};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

use super::restored_config;

pub async fn handle(global: &GlobalOpts) -> Result<(), CliError> {
    // Full config: push stream plus the periodic poll fallback.
    let cfg = restored_config(global)?;
    let bridge = Bridge::new(cfg)?;
    bridge.connect().await?;

    if !global.quiet {
        println!(
            "Watching {} devices (Ctrl-C to stop)",
            bridge.devices_snapshot().len()
        );
    }

    let color = output::should_color();
    let mut previous = signature_map(&bridge.devices_snapshot());
    let mut versions = bridge.cache().subscribe_version();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = versions.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = signature_map(&bridge.devices_snapshot());
                report_changes(&previous, &current, color);
                previous = current;
            }
        }
    }

    bridge.disconnect().await;
    Ok(())
}

/// Per-device signature of the fields worth reporting.
#[derive(Clone, PartialEq)]
struct StateSig {
    name: String,
    power: Option<String>,
    brightness: Option<i64>,
    fan_speed: Option<i64>,
    motion: Option<bool>,
    occupancy: Option<bool>,
    connected: Option<bool>,
}

fn signature_map(devices: &[Arc<Device>]) -> HashMap<String, StateSig> {
    devices
        .iter()
        .map(|d| {
            (
                d.id_str(),
                StateSig {
                    name: model::display_name(d),
                    power: d.power.clone(),
                    brightness: d.brightness,
                    fan_speed: d.fan_speed,
                    motion: d.motion,
                    occupancy: d.occupancy,
                    connected: d.connected,
                },
            )
        })
        .collect()
}

fn report_changes(
    previous: &HashMap<String, StateSig>,
    current: &HashMap<String, StateSig>,
    color: bool,
) {
    let stamp = chrono::Local::now().format("%H:%M:%S");

    for (id, sig) in current {
        let prior = previous.get(id);
        if prior == Some(sig) {
            continue;
        }

        let mut parts = Vec::new();
        if let Some(power) = &sig.power {
            if prior.is_none_or(|p| p.power != sig.power) {
                parts.push(format!("power {}", paint_power(power, color)));
            }
        }
        if let Some(level) = sig.brightness {
            if prior.is_none_or(|p| p.brightness != sig.brightness) {
                parts.push(format!("brightness {level}%"));
            }
        }
        if let Some(speed) = sig.fan_speed {
            if prior.is_none_or(|p| p.fan_speed != sig.fan_speed) {
                parts.push(format!("fan speed {speed}"));
            }
        }
        if let Some(motion) = sig.motion {
            if prior.is_none_or(|p| p.motion != sig.motion) {
                parts.push(format!("motion {motion}"));
            }
        }
        if let Some(occupancy) = sig.occupancy {
            if prior.is_none_or(|p| p.occupancy != sig.occupancy) {
                parts.push(format!("occupancy {occupancy}"));
            }
        }
        if let Some(connected) = sig.connected {
            if prior.is_none_or(|p| p.connected != sig.connected) {
                parts.push(format!("connected {connected}"));
            }
        }

        if !parts.is_empty() {
            println!("{stamp}  {} ({id}): {}", sig.name, parts.join(", "));
        }
    }
}

fn paint_power(power: &str, color: bool) -> String {
    if !color {
        return power.to_owned();
    }
    match power {
        "ON" => power.green().to_string(),
        "OFF" => power.red().to_string(),
        other => other.to_owned(),
    }
}
