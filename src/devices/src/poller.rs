use std::collections::BTreeMap;

use chrono::Utc;
use protocol::modbus::{ModbusError, Reader};
use tracing::{debug, warn};
use types::{Device, Reading, RegisterArea, RegisterValue};

use crate::decode;

/// Polls every register of one device over its port's connection, producing
/// exactly one Reading. The device's slave id is passed into every read; the
/// bus address is never left behind as connection state for the next device
/// on the port to trip over.
///
/// Register-level trouble (timeout, device exception, bad response) is
/// recorded against that parameter alone. A transport error means the
/// connection itself is gone, so the rest of the device is abandoned and the
/// Reading carries a device-level error.
pub async fn poll_device<R: Reader>(reader: &mut R, device: &Device) -> Reading {
    let timestamp = Utc::now();
    let mut values = BTreeMap::new();

    for (parameter, spec) in &device.registers {
        let unit = spec.unit_for(parameter);
        let res = match spec.area {
            RegisterArea::Input => {
                reader
                    .read_input_registers(device.slave_id, spec.address, spec.length)
                    .await
            }
            RegisterArea::Holding => {
                reader
                    .read_holding_registers(device.slave_id, spec.address, spec.length)
                    .await
            }
        };

        match res {
            Ok(words) => match decode::decode(&words, spec.multiplier) {
                Ok(value) => {
                    values.insert(
                        parameter.clone(),
                        RegisterValue::ok(decode::format_value(value), unit, words),
                    );
                }
                Err(e) => {
                    values.insert(parameter.clone(), RegisterValue::err(e.to_string(), unit));
                }
            },
            Err(e @ ModbusError::Transport(_)) => {
                warn!("device {}: connection lost: {e}", device.id);
                return Reading::failed(device.id.clone(), timestamp, e.to_string());
            }
            Err(e) => {
                debug!("device {} register {parameter}: {e}", device.id);
                values.insert(parameter.clone(), RegisterValue::err(e.to_string(), unit));
            }
        }
    }

    Reading::with_values(device.id.clone(), timestamp, values)
}
