//! Thread-safe snapshot of decoded UPS values, consumed by whatever
//! HTTP/SNMP surface the host binary wires up. One mutex guards the
//! whole struct (§9: collapsing the source's per-field-mutex pattern).

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use serde_json::{json, Map, Value};

use crate::binding::{
    FieldKey, AC_PRESENT_USAGE, BATTERY_PRESENT_USAGE, BATTERY_SYSTEM_PAGE, CHARGING_USAGE,
    DISCHARGING_USAGE, NEEDS_REPLACEMENT_USAGE, REMAINING_CAPACITY_USAGE, RUNTIME_TO_EMPTY_USAGE, WATCHED,
};

/// A single decoded data point, as last written by the decoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldValue {
    pub used: bool,
    pub value: f64,
    /// Mirrors `FieldBinding::is_boolean` — a width-1 field, serialized as
    /// a JSON boolean rather than a number.
    pub is_boolean: bool,
    pub last_update: Option<Instant>,
}

struct StatusInner {
    connected: bool,
    manufacturer: String,
    model: String,
    serial: String,
    fields: HashMap<FieldKey, FieldValue>,
}

impl Default for StatusInner {
    fn default() -> Self {
        StatusInner {
            connected: false,
            manufacturer: String::new(),
            model: String::new(),
            serial: String::new(),
            fields: HashMap::new(),
        }
    }
}

/// The decoder's sole shared mutable state. Writers: only the decoder
/// task (`update_field`, `mark_attached`, `clear`). Readers: any thread,
/// via the accessor methods.
pub struct Status {
    inner: Mutex<StatusInner>,
}

impl Default for Status {
    fn default() -> Self {
        Status::new()
    }
}

impl Status {
    pub fn new() -> Self {
        Status {
            inner: Mutex::new(StatusInner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StatusInner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Called once per successful attach, after bindings are installed.
    pub fn mark_attached(&self, manufacturer: String, model: String, serial: String) {
        let mut inner = self.lock();
        inner.connected = true;
        inner.manufacturer = manufacturer;
        inner.model = model;
        inner.serial = serial;
    }

    /// Called on device-removed: clears bindings' worth of used flags and
    /// the device-info strings, flips `connected` false.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.connected = false;
        inner.manufacturer.clear();
        inner.model.clear();
        inner.serial.clear();
        inner.fields.clear();
    }

    pub fn update_field(&self, key: FieldKey, value: f64, is_boolean: bool) {
        let mut inner = self.lock();
        inner.fields.insert(
            key,
            FieldValue {
                used: true,
                value,
                is_boolean,
                last_update: Some(Instant::now()),
            },
        );
    }

    pub fn field(&self, key: FieldKey) -> FieldValue {
        self.lock().fields.get(&key).copied().unwrap_or_default()
    }

    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    pub fn manufacturer(&self) -> String {
        self.lock().manufacturer.clone()
    }

    pub fn model(&self) -> String {
        self.lock().model.clone()
    }

    pub fn serial(&self) -> String {
        self.lock().serial.clone()
    }

    pub fn remaining_capacity(&self) -> FieldValue {
        self.field((BATTERY_SYSTEM_PAGE, REMAINING_CAPACITY_USAGE))
    }

    pub fn ac_present(&self) -> FieldValue {
        self.field((BATTERY_SYSTEM_PAGE, AC_PRESENT_USAGE))
    }

    pub fn charging(&self) -> FieldValue {
        self.field((BATTERY_SYSTEM_PAGE, CHARGING_USAGE))
    }

    pub fn discharging(&self) -> FieldValue {
        self.field((BATTERY_SYSTEM_PAGE, DISCHARGING_USAGE))
    }

    pub fn battery_present(&self) -> FieldValue {
        self.field((BATTERY_SYSTEM_PAGE, BATTERY_PRESENT_USAGE))
    }

    pub fn needs_replacement(&self) -> FieldValue {
        self.field((BATTERY_SYSTEM_PAGE, NEEDS_REPLACEMENT_USAGE))
    }

    pub fn runtime_to_empty(&self) -> FieldValue {
        self.field((BATTERY_SYSTEM_PAGE, RUNTIME_TO_EMPTY_USAGE))
    }

    /// `{"status": "offline"}` when disconnected; otherwise `{"status":
    /// "online", "UPS": {"<Name>": value|bool, ..., "model": ...,
    /// "serial": ...}}`. Booleans (width-1 fields) are represented as
    /// JSON booleans, everything else as a JSON number. Mirrors
    /// `UPSHIDDevice::statusToJSON` in the original firmware.
    pub fn to_json(&self) -> Value {
        let inner = self.lock();
        if !inner.connected {
            return json!({ "status": "offline" });
        }

        let mut ups = Map::new();
        for (key, name) in WATCHED {
            if let Some(v) = inner.fields.get(key).filter(|v| v.used) {
                let value = if v.is_boolean { json!(v.value != 0.0) } else { json!(v.value) };
                ups.insert((*name).to_string(), value);
            }
        }
        ups.insert("model".to_string(), json!(inner.model));
        ups.insert("serial".to_string(), json!(inner.serial));

        json!({ "status": "online", "UPS": Value::Object(ups) })
    }
}
