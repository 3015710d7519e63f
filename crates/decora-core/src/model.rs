// Device classification by hardware model code.
//
// The cloud reports a bare model string; these tables map it to a
// functional category so consumers can pick the right control surface
// (brightness for dimmers, speed for fans, plain on/off otherwise).

use decora_api::Device;
use strum::Display;

/// Scene and button controllers.
const MODELS_CONTROLLER: &[&str] = &["D2SCS", "DW4BC"];

/// Fan speed controllers.
const MODELS_FAN: &[&str] = &["D24SF", "DW4SF"];

/// GFCI outlets.
const MODELS_GFCI: &[&str] = &["D2GF1", "D2GF2"];

/// Dimmers.
const MODELS_DIMMER: &[&str] = &[
    "D23LP", // Dimmer without LED bar
    "D26HD", // 600W Dimmer
    "D2ELV", // ELV Dimmer
    "D2MSD", // Motion Sensor Dimmer
    "DW1KD", // 1000W Dimmer
    "DW3HL", // 300W Dimmer
    "DW6HD", // 600W Dimmer
    "DWVAA", // Voice Assistant Dimmer
];

/// Models carrying a motion sensor.
const MODELS_MOTION_SENSOR: &[&str] = &["D2MSD"];

/// Plug-in outlets and receptacles.
const MODELS_OUTLET: &[&str] = &[
    "D215P", // Plug-in Outlet
    "D215R", // Receptacle
    "DW15A", // 15A Outlet
    "DW15P", // Plug-in Outlet
    "DW15R", // Receptacle
];

/// On/off switches.
const MODELS_SWITCH: &[&str] = &[
    "D215O", // Outdoor Switch
    "D215S", // Switch
    "DW15S", // 15A Switch
];

/// Functional device category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum DeviceKind {
    Controller,
    Fan,
    Gfci,
    Dimmer,
    Outlet,
    Switch,
    Unknown,
}

impl DeviceKind {
    /// Classify a hardware model code. `D2SCS` acts as both a scene
    /// controller and a switch; the controller role wins here.
    pub fn from_model(model: &str) -> Self {
        let model = model.trim().to_ascii_uppercase();
        let code = model.as_str();

        if MODELS_CONTROLLER.contains(&code) {
            Self::Controller
        } else if MODELS_FAN.contains(&code) {
            Self::Fan
        } else if MODELS_GFCI.contains(&code) {
            Self::Gfci
        } else if MODELS_DIMMER.contains(&code) {
            Self::Dimmer
        } else if MODELS_OUTLET.contains(&code) {
            Self::Outlet
        } else if MODELS_SWITCH.contains(&code) {
            Self::Switch
        } else {
            Self::Unknown
        }
    }

    pub fn of(device: &Device) -> Self {
        device
            .model
            .as_deref()
            .map_or(Self::Unknown, Self::from_model)
    }

    /// Dimmers and fan controllers take a level; everything else is
    /// on/off only.
    pub fn is_dimmable(self) -> bool {
        matches!(self, Self::Dimmer | Self::Fan)
    }
}

/// Whether this model carries a motion sensor.
pub fn has_motion_sensor(model: &str) -> bool {
    MODELS_MOTION_SENSOR.contains(&model.trim().to_ascii_uppercase().as_str())
}

/// Clean up a device's display name.
///
/// The cloud sometimes appends a literal `" None"` when the device has
/// no room, or prepends the room name to the device name. Both are
/// stripped; an empty result falls back to a generic label.
pub fn display_name(device: &Device) -> String {
    let mut name = device.name.clone().unwrap_or_default();

    if let Some(stripped) = name.strip_suffix(" None") {
        name = stripped.trim().to_owned();
    }

    if let Some(room) = device.room_name.as_deref() {
        if let Some(stripped) = name.strip_prefix(&format!("{room} ")) {
            name = stripped.trim().to_owned();
        }
    }

    if name.is_empty() {
        "Leviton Device".to_owned()
    } else {
        name
    }
}

// ── Tests ────────────────────────────────────────────────────────────
