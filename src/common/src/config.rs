use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use tracing::{info, warn};
use types::{DataBits, Device, DeviceId, Parity, RegisterSpec, StopBits};

use crate::error::{GridError, GridResult};

/// Service settings. Every field has a default so a missing or partial
/// config file still yields a runnable service.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Config {
    pub data_dir: PathBuf,
    pub device_file: PathBuf,
    pub update_interval_ms: u64,
    pub inter_device_delay_ms: u64,
    pub response_timeout_ms: u64,
    pub history_hours: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: PathBuf::from("data"),
            device_file: PathBuf::from("config/devices.json"),
            update_interval_ms: 2000,
            inter_device_delay_ms: 100,
            response_timeout_ms: 1000,
            history_hours: 24,
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Self {
        match std::fs::read_to_string(path.as_ref()) {
            Ok(raw) => match toml::from_str(&raw) {
                Ok(config) => config,
                Err(e) => {
                    warn!("invalid config file {:?}: {e}, using defaults", path.as_ref());
                    Config::default()
                }
            },
            Err(_) => {
                info!("no config file at {:?}, using defaults", path.as_ref());
                Config::default()
            }
        }
    }
}

/// Loads the device set from a JSON file. A missing or malformed file is an
/// explicit fallback state: the built-in single power analyzer is used so the
/// service starts either way. Invalid ids and mismatched serial parameters
/// on a shared port are rejected outright.
pub async fn load_devices(path: impl AsRef<Path>) -> GridResult<Vec<Device>> {
    let devices = match tokio::fs::read(path.as_ref()).await {
        Ok(raw) => match serde_json::from_slice::<Vec<Device>>(&raw) {
            Ok(devices) => {
                info!("loaded {} device configurations", devices.len());
                devices
            }
            Err(e) => {
                warn!("malformed device file {:?}: {e}, using default device", path.as_ref());
                default_devices()
            }
        },
        Err(_) => {
            warn!("no device file at {:?}, using default device", path.as_ref());
            default_devices()
        }
    };

    validate_devices(&devices)?;
    Ok(devices)
}

/// Structural checks on a device set. String ids name history files on disk
/// and must stay a single path component. All enabled devices sharing a port
/// must agree on the serial parameters, otherwise the shared connection
/// cannot satisfy them all.
pub fn validate_devices(devices: &[Device]) -> GridResult<()> {
    for device in devices {
        if let DeviceId::Str(id) = &device.id {
            if id.is_empty() || id.contains(['/', '\\']) || id.contains("..") {
                return Err(GridError::Config(format!(
                    "device id {id:?} is not usable as a file name"
                )));
            }
        }
    }

    let mut seen: HashMap<&str, (&Device, (u32, DataBits, StopBits, Parity))> = HashMap::new();
    for device in devices.iter().filter(|d| d.enabled) {
        let params = device.serial_params();
        match seen.get(device.port.as_str()) {
            Some((first, first_params)) if *first_params != params => {
                return Err(GridError::Config(format!(
                    "devices {} and {} share port {} with different serial parameters",
                    first.id, device.id, device.port
                )));
            }
            Some(_) => {}
            None => {
                seen.insert(device.port.as_str(), (device, params));
            }
        }
    }
    Ok(())
}

/// The built-in fallback: one power analyzer on /dev/ttyUSB0, 9600 8N1.
pub fn default_devices() -> Vec<Device> {
    let registers = [
        ("voltage", reg(0, 2, 0.1)),
        ("current", reg(2, 2, 0.01)),
        ("power", reg(4, 2, 0.1)),
        ("frequency", reg(6, 1, 0.01)),
        ("powerFactor", reg(7, 1, 0.001)),
    ]
    .into_iter()
    .map(|(name, spec)| (name.to_owned(), spec))
    .collect();

    vec![Device {
        id: DeviceId::Int(1),
        name: "Power Analyzer 1".to_owned(),
        location: None,
        port: "/dev/ttyUSB0".to_owned(),
        baud_rate: 9600,
        data_bits: DataBits::Eight,
        stop_bits: StopBits::One,
        parity: Parity::None,
        slave_id: 1,
        enabled: true,
        registers,
    }]
}

fn reg(address: u16, length: u16, multiplier: f64) -> RegisterSpec {
    RegisterSpec {
        address,
        length,
        multiplier,
        area: Default::default(),
        unit: None,
        description: None,
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;

    #[tokio::test]
    async fn test_missing_device_file_falls_back_to_default() {
        let devices = load_devices("/nonexistent/devices.json").await.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].id, DeviceId::Int(1));
        assert_eq!(devices[0].registers.len(), 5);
        assert!(devices[0].enabled);
    }

    #[tokio::test]
    async fn test_malformed_device_file_falls_back_to_default() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{ not json").unwrap();
        let devices = load_devices(file.path()).await.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].port, "/dev/ttyUSB0");
    }

    #[test]
    fn test_port_group_mismatch_rejected() {
        let mut devices = default_devices();
        let mut second = devices[0].clone();
        second.id = DeviceId::Int(2);
        second.baud_rate = 19200;
        devices.push(second);
        assert!(validate_devices(&devices).is_err());
    }

    #[test]
    fn test_port_group_mismatch_ignored_for_disabled() {
        let mut devices = default_devices();
        let mut second = devices[0].clone();
        second.id = DeviceId::Int(2);
        second.baud_rate = 19200;
        second.enabled = false;
        devices.push(second);
        assert!(validate_devices(&devices).is_ok());
    }

    #[test]
    fn test_path_escaping_device_id_rejected() {
        let mut devices = default_devices();
        devices[0].id = DeviceId::Str("../etc/cron.d".to_owned());
        assert!(validate_devices(&devices).is_err());

        devices[0].id = DeviceId::Str("a/b".to_owned());
        assert!(validate_devices(&devices).is_err());

        devices[0].id = DeviceId::Str(String::new());
        assert!(validate_devices(&devices).is_err());
    }

    #[test]
    fn test_plain_string_device_id_accepted() {
        let mut devices = default_devices();
        devices[0].id = DeviceId::Str("analyzer-a".to_owned());
        assert!(validate_devices(&devices).is_ok());
    }

    #[test]
    fn test_config_defaults() {
        let config: Config = toml::from_str("update_interval_ms = 500").unwrap();
        assert_eq!(config.update_interval_ms, 500);
        assert_eq!(config.inter_device_delay_ms, 100);
        assert_eq!(config.history_hours, 24);
    }
}
