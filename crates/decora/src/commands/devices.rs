//! Device listing and detail handlers.

use tabled::Tabled;

use decora_api::Device;
use decora_core::model::{self, DeviceKind};

use crate::cli::{GetArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::oneshot;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Power")]
    power: String,
    #[tabled(rename = "Level")]
    level: String,
    #[tabled(rename = "Room")]
    room: String,
    #[tabled(rename = "Status")]
    status: String,
}

fn row(d: &Device) -> DeviceRow {
    let kind = DeviceKind::of(d);
    let level = match kind {
        DeviceKind::Dimmer => d.brightness.map_or_else(String::new, |b| format!("{b}%")),
        DeviceKind::Fan => d.fan_speed.map_or_else(String::new, |s| s.to_string()),
        _ => String::new(),
    };

    DeviceRow {
        id: d.id_str(),
        name: model::display_name(d),
        kind: kind.to_string(),
        power: d.power.clone().unwrap_or_default(),
        level,
        room: d.room_name.clone().unwrap_or_default(),
        status: d.status.clone().unwrap_or_default(),
    }
}

fn detail(d: &Device) -> String {
    let kind = DeviceKind::of(d);
    let opt = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".into());

    let mut lines = vec![
        format!("ID:         {}", d.id),
        format!("Name:       {}", model::display_name(d)),
        format!("Room:       {}", opt(&d.room_name)),
        format!("Model:      {}", opt(&d.model)),
        format!("Kind:       {kind}"),
        format!("Power:      {}", opt(&d.power)),
    ];
    if kind == DeviceKind::Dimmer {
        lines.push(format!(
            "Brightness: {}",
            d.brightness.map_or_else(|| "-".into(), |b| format!("{b}%"))
        ));
    }
    if kind == DeviceKind::Fan {
        lines.push(format!(
            "Fan speed:  {}",
            d.fan_speed.map_or_else(|| "-".into(), |s| s.to_string())
        ));
    }
    if let Some(motion) = d.motion {
        lines.push(format!("Motion:     {motion}"));
    }
    if let Some(occupancy) = d.occupancy {
        lines.push(format!("Occupancy:  {occupancy}"));
    }
    lines.push(format!("Status:     {}", opt(&d.status)));
    lines.push(format!("Firmware:   {}", opt(&d.version)));
    lines.join("\n")
}

// ── Handlers ────────────────────────────────────────────────────────

pub async fn list(global: &GlobalOpts) -> Result<(), CliError> {
    let format = global.output.clone();
    let quiet = global.quiet;

    oneshot(global, |bridge| async move {
        let devices: Vec<Device> = bridge
            .devices_snapshot()
            .iter()
            .map(|d| (**d).clone())
            .collect();

        let out = output::render_list(&format, &devices, row, Device::id_str);
        output::print_output(&out, quiet);
        Ok(())
    })
    .await
}

pub async fn get(args: &GetArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let format = global.output.clone();
    let quiet = global.quiet;
    let device_id = args.device.clone();

    oneshot(global, |bridge| async move {
        let device = bridge.device(&device_id)?;

        let out = output::render_single(&format, device.as_ref(), detail, Device::id_str);
        output::print_output(&out, quiet);
        Ok(())
    })
    .await
}
