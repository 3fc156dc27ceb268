//! P2P group orchestrator: stands up the Wi-Fi Direct group the source
//! connects through, publishes the WFD sub-elements that advertise this
//! device as a primary sink, and pins the WPS PIN.

use std::process::Command;
use std::thread::sleep;
use std::time::Duration;
use tracing::{info, warn};
use wfd_protocol::WfdSettings;

use crate::supplicant::{self, SupplicantError};

#[derive(Debug, thiserror::Error)]
pub enum P2pError {
    #[error(transparent)]
    Supplicant(#[from] SupplicantError),
    #[error("no p2p-wl* interface appeared after p2p_group_add")]
    InterfaceMissing,
    #[error("failed to assign {ip} to {iface}: {source}")]
    AssignIp {
        iface: String,
        ip: String,
        source: std::io::Error,
    },
}

/// Device-info sub-element TLV.
/// `type=0x01` (PRIMARY_SINK), `session_available=1<<4`, `wsd=1<<6`.
fn wfd_devinfo_hex(control_port: u16) -> String {
    const PRIMARY_SINK: u16 = 0x01;
    const SESSION_AVAILABLE: u16 = 1 << 4;
    const WSD: u16 = 1 << 6;
    let devinfo = PRIMARY_SINK | SESSION_AVAILABLE | WSD;
    const MAX_THROUGHPUT_MBPS: u16 = 300;
    format!("0006{devinfo:04x}{control_port:04x}{MAX_THROUGHPUT_MBPS:04x}")
}

/// Zero BSSID sub-element.
const WFD_BSSID_HEX: &str = "0006000000000000";
/// Sink-info sub-element, status=0, mac=0.
const WFD_SINK_INFO_HEX: &str = "000700000000000000";

/// Bring up (or reuse) the Wi-Fi Direct P2P group and return the resulting
/// interface name. Any failure here is fatal at startup.
pub fn bring_up(settings: &WfdSettings) -> Result<String, P2pError> {
    if let Some(existing) = supplicant::find_p2p_interface()? {
        info!(interface = existing, "reusing existing p2p interface");
        return Ok(existing);
    }

    supplicant::p2p_find()?;
    supplicant::set_device_name(&settings.device_name)?;
    supplicant::set_device_type(&settings.device_type)?;
    supplicant::set_p2p_go_ht40()?;
    supplicant::wfd_subelem_set(0, &wfd_devinfo_hex(settings.rtsp_port))?;
    supplicant::wfd_subelem_set(1, WFD_BSSID_HEX)?;
    supplicant::wfd_subelem_set(6, WFD_SINK_INFO_HEX)?;
    supplicant::p2p_group_add(&settings.group_name)?;

    sleep(Duration::from_secs(3));
    let iface = supplicant::find_p2p_interface()?.ok_or(P2pError::InterfaceMissing)?;
    info!(interface = iface, "p2p group formed");

    assign_static_ip(&iface, settings)?;
    Ok(iface)
}

/// Set the WPS PIN on the negotiated interface. Reuses the DHCP lease
/// timeout as the WPS PIN timeout.
pub fn configure_wps_pin(iface: &str, settings: &WfdSettings) -> Result<(), P2pError> {
    supplicant::set_wps_pin(iface, &settings.wps_pin, settings.lease_timeout_secs)?;
    Ok(())
}

fn assign_static_ip(iface: &str, settings: &WfdSettings) -> Result<(), P2pError> {
    let status = Command::new("ip")
        .args(["addr", "add", &format!("{}/24", settings.sink_ip), "dev", iface])
        .status()
        .map_err(|source| P2pError::AssignIp {
            iface: iface.to_string(),
            ip: settings.sink_ip.to_string(),
            source,
        })?;
    if !status.success() {
        warn!(iface, ip = %settings.sink_ip, "ip addr add exited non-zero, interface may already be configured");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn devinfo_hex_encodes_type_flags_port_and_throughput() {
        // type=0x01 | session_available=0x10 | wsd=0x40 = 0x51; port=7236=0x1c44; 300Mbps=0x012c
        assert_eq!(wfd_devinfo_hex(7236), "000600511c44012c");
    }

    #[test]
    fn bssid_and_sink_info_are_fixed_zero_values() {
        assert_eq!(WFD_BSSID_HEX, "0006000000000000");
        assert_eq!(WFD_SINK_INFO_HEX, "000700000000000000");
    }
}
