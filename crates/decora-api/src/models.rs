// Wire types for the My Leviton REST API and stream notifications.
//
// Known attributes are strongly typed; everything else rides along in a
// flattened pass-through map so nothing the cloud sends is lost.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// ── Device ───────────────────────────────────────────────────────────

/// A device record as returned by `/Residences/{id}/iotSwitches`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    /// Numeric device identifier. Used as a string key by consumers and
    /// as an integer in stream subscriptions.
    pub id: u64,

    #[serde(default)]
    pub name: Option<String>,

    /// Hardware model code, e.g. `"DW6HD"`.
    #[serde(default)]
    pub model: Option<String>,

    /// `"ON"` / `"OFF"`.
    #[serde(default)]
    pub power: Option<String>,

    /// 0-100.
    #[serde(default)]
    pub brightness: Option<i64>,

    #[serde(default)]
    pub fan_speed: Option<i64>,

    #[serde(default)]
    pub occupancy: Option<bool>,

    #[serde(default)]
    pub motion: Option<bool>,

    #[serde(default)]
    pub connected: Option<bool>,

    /// `"offline"` when the device has dropped off the cloud.
    #[serde(default)]
    pub status: Option<String>,

    #[serde(default)]
    pub room_name: Option<String>,

    #[serde(default)]
    pub version: Option<String>,

    /// All remaining fields the cloud sends.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Device {
    /// The identifier in the string form consumers key on.
    pub fn id_str(&self) -> String {
        self.id.to_string()
    }

    pub fn is_online(&self) -> bool {
        self.status.as_deref() != Some("offline")
    }

    /// Merge a partial attribute patch into this record, field-wise.
    ///
    /// Only the keys present in `fields` change; every other attribute
    /// keeps its prior value. Keys outside the typed set land in
    /// `extra` rather than being discarded.
    pub fn apply_patch(&mut self, fields: &serde_json::Map<String, Value>) {
        for (key, value) in fields {
            match key.as_str() {
                "power" => {
                    if let Some(s) = value.as_str() {
                        self.power = Some(s.to_owned());
                    }
                }
                "brightness" => {
                    if let Some(n) = value.as_i64() {
                        self.brightness = Some(n);
                    }
                }
                "fanSpeed" => {
                    if let Some(n) = value.as_i64() {
                        self.fan_speed = Some(n);
                    }
                }
                "occupancy" => {
                    if let Some(b) = value.as_bool() {
                        self.occupancy = Some(b);
                    }
                }
                "motion" => {
                    if let Some(b) = value.as_bool() {
                        self.motion = Some(b);
                    }
                }
                "connected" => {
                    if let Some(b) = value.as_bool() {
                        self.connected = Some(b);
                    }
                }
                _ => {
                    self.extra.insert(key.clone(), value.clone());
                }
            }
        }
    }
}

// ── StateUpdate ──────────────────────────────────────────────────────

/// A partial device update extracted from a stream notification:
/// identifier plus only the fields that changed.
#[derive(Debug, Clone, PartialEq)]
pub struct StateUpdate {
    /// Device identifier as a string (matches cache keys).
    pub device_id: String,

    /// Changed fields, already projected to the known attribute set.
    pub fields: serde_json::Map<String, Value>,
}

impl StateUpdate {
    pub fn power(&self) -> Option<&str> {
        self.fields.get("power").and_then(Value::as_str)
    }

    pub fn brightness(&self) -> Option<i64> {
        self.fields.get("brightness").and_then(Value::as_i64)
    }
}

// ── AttributePatch ───────────────────────────────────────────────────

/// Partial attribute update for `PUT /IotSwitches/{id}`.
///
/// Only the fields that are set are serialized — the cloud applies the
/// body as a patch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub brightness: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fan_speed: Option<i64>,
}

impl AttributePatch {
    pub fn power(mut self, on: bool) -> Self {
        self.power = Some(if on { "ON" } else { "OFF" }.to_owned());
        self
    }

    pub fn brightness(mut self, level: i64) -> Self {
        self.brightness = Some(level);
        self
    }

    pub fn fan_speed(mut self, speed: i64) -> Self {
        self.fan_speed = Some(speed);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.power.is_none() && self.brightness.is_none() && self.fan_speed.is_none()
    }
}

// ── Directory wire types ─────────────────────────────────────────────

/// One entry of `GET /Person/{userId}/residentialPermissions`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResidentialPermission {
    #[serde(default, deserialize_with = "id_string")]
    pub residential_account_id: Option<String>,
}

/// `GET /ResidentialAccounts/{id}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResidentialAccount {
    #[serde(default, deserialize_with = "id_string")]
    pub primary_residence_id: Option<String>,
}

/// One entry of `GET /ResidentialAccounts/{id}/residences`.
#[derive(Debug, Clone, Deserialize)]
pub struct Residence {
    #[serde(default, deserialize_with = "id_string")]
    pub id: Option<String>,
}

/// The cloud is inconsistent about identifier types — numbers in some
/// documents, strings in others. Normalize to strings for URL building.
fn id_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }))
}

// ── Tests ────────────────────────────────────────────────────────────
