use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::device::DeviceId;

/// One acquisition result for one device. Built once per poll attempt and
/// never mutated afterwards; a poll always yields a Reading, even when the
/// whole device failed.
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    pub device_id: DeviceId,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<BTreeMap<String, RegisterValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Reading {
    pub fn with_values(
        device_id: DeviceId,
        timestamp: DateTime<Utc>,
        values: BTreeMap<String, RegisterValue>,
    ) -> Self {
        Reading {
            device_id,
            timestamp,
            values: Some(values),
            error: None,
        }
    }

    /// A device-level failure: no register was read.
    pub fn failed(device_id: DeviceId, timestamp: DateTime<Utc>, error: impl Into<String>) -> Self {
        Reading {
            device_id,
            timestamp,
            values: None,
            error: Some(error.into()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Per-register outcome inside a Reading. `value` stays present (as null) on
/// failure so consumers see a stable shape.
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RegisterValue {
    pub value: Option<String>,
    pub unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<Vec<u16>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RegisterValue {
    pub fn ok(value: String, unit: String, raw: Vec<u16>) -> Self {
        RegisterValue {
            value: Some(value),
            unit,
            raw: Some(raw),
            error: None,
        }
    }

    pub fn err(error: impl Into<String>, unit: String) -> Self {
        RegisterValue {
            value: None,
            unit,
            raw: None,
            error: Some(error.into()),
        }
    }
}
