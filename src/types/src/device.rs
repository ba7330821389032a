use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

/// Device identifier as found in operator configuration. Accepts both the
/// numeric and the string form so hand-edited device files keep working.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum DeviceId {
    Int(i64),
    Str(String),
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceId::Int(n) => n.fmt(f),
            DeviceId::Str(s) => s.fmt(f),
        }
    }
}

impl From<i64> for DeviceId {
    fn from(n: i64) -> Self {
        DeviceId::Int(n)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        DeviceId::Str(s.to_owned())
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub port: String,
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
    pub parity: Parity,
    pub slave_id: u8,
    pub enabled: bool,
    pub registers: BTreeMap<String, RegisterSpec>,
}

impl Device {
    /// The serial parameters that govern the shared port connection. All
    /// devices on one port must agree on these.
    pub fn serial_params(&self) -> (u32, DataBits, StopBits, Parity) {
        (self.baud_rate, self.data_bits, self.stop_bits, self.parity)
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RegisterSpec {
    pub address: u16,
    /// Number of 16-bit words, 1 or 2.
    pub length: u16,
    pub multiplier: f64,
    #[serde(default)]
    pub area: RegisterArea,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl RegisterSpec {
    /// Unit string for this register, falling back to the conventional unit
    /// for well-known power-analyzer parameter names.
    pub fn unit_for(&self, parameter: &str) -> String {
        match &self.unit {
            Some(unit) => unit.clone(),
            None => default_unit(parameter).to_owned(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RegisterArea {
    #[default]
    Input,
    Holding,
}

#[derive(Deserialize_repr, Serialize_repr, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DataBits {
    Five = 5,
    Six = 6,
    Seven = 7,
    Eight = 8,
}

#[derive(Deserialize_repr, Serialize_repr, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StopBits {
    One = 1,
    Two = 2,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Parity {
    None,
    Odd,
    Even,
}

fn default_unit(parameter: &str) -> &'static str {
    match parameter {
        "voltage" => "V",
        "current" => "A",
        "power" => "kW",
        "frequency" => "Hz",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_from_json() {
        let raw = r#"{
            "id": 1,
            "name": "Power Analyzer 1",
            "port": "/dev/ttyUSB0",
            "baudRate": 9600,
            "dataBits": 8,
            "stopBits": 1,
            "parity": "none",
            "slaveId": 1,
            "enabled": true,
            "registers": {
                "voltage": { "address": 0, "length": 2, "multiplier": 0.1 },
                "frequency": { "address": 6, "length": 1, "multiplier": 0.01 }
            }
        }"#;
        let device: Device = serde_json::from_str(raw).unwrap();
        assert_eq!(device.id, DeviceId::Int(1));
        assert_eq!(device.data_bits, DataBits::Eight);
        assert_eq!(device.stop_bits, StopBits::One);
        assert_eq!(device.parity, Parity::None);
        let voltage = &device.registers["voltage"];
        assert_eq!(voltage.length, 2);
        assert_eq!(voltage.area, RegisterArea::Input);
        assert_eq!(voltage.unit_for("voltage"), "V");
    }

    #[test]
    fn test_string_device_id() {
        let id: DeviceId = serde_json::from_str(r#""analyzer-a""#).unwrap();
        assert_eq!(id.to_string(), "analyzer-a");
    }

    #[test]
    fn test_serial_params_roundtrip() {
        let device: Device = serde_json::from_str(
            r#"{
                "id": "a",
                "name": "x",
                "port": "COM3",
                "baudRate": 19200,
                "dataBits": 7,
                "stopBits": 2,
                "parity": "even",
                "slaveId": 5,
                "enabled": false,
                "registers": {}
            }"#,
        )
        .unwrap();
        let json = serde_json::to_value(&device).unwrap();
        assert_eq!(json["dataBits"], 7);
        assert_eq!(json["stopBits"], 2);
        assert_eq!(json["parity"], "even");
    }
}
