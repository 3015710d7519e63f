//! Device control handler.

use decora_core::model;

use crate::cli::{GlobalOpts, SetArgs};
use crate::error::CliError;

use super::oneshot;

pub async fn handle(args: &SetArgs, global: &GlobalOpts) -> Result<(), CliError> {
    if !args.on && !args.off && args.brightness.is_none() && args.fan_speed.is_none() {
        return Err(CliError::Validation {
            field: "set".into(),
            reason: "give at least one of --on, --off, --brightness, --fan-speed".into(),
        });
    }
    if let Some(level) = args.brightness {
        if !(0..=100).contains(&level) {
            return Err(CliError::Validation {
                field: "brightness".into(),
                reason: format!("must be 0-100, got {level}"),
            });
        }
    }
    if let Some(speed) = args.fan_speed {
        if !(0..=100).contains(&speed) {
            return Err(CliError::Validation {
                field: "fan-speed".into(),
                reason: format!("must be 0-100, got {speed}"),
            });
        }
    }

    let quiet = global.quiet;
    let device_id = args.device.clone();
    let (on, off, brightness, fan_speed) = (args.on, args.off, args.brightness, args.fan_speed);

    oneshot(global, |bridge| async move {
        if let Some(level) = brightness {
            bridge.set_brightness(&device_id, level).await?;
        } else if let Some(speed) = fan_speed {
            bridge.set_fan_speed(&device_id, speed).await?;
        } else {
            bridge.set_power(&device_id, on && !off).await?;
        }

        if !quiet {
            let device = bridge.device(&device_id)?;
            let name = model::display_name(&device);
            let power = device.power.as_deref().unwrap_or("-");
            match device.brightness.filter(|_| brightness.is_some()) {
                Some(level) => println!("{name}: {power} at {level}%"),
                None => println!("{name}: {power}"),
            }
        }
        Ok(())
    })
    .await
}
