use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// Process-wide settings, immutable once constructed.
///
/// Overridable via a TOML file at the path named by the `WFD_SINK_CONFIG`
/// environment variable, for testing; the production entrypoint has no CLI
/// flags and relies entirely on defaults plus this override.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WfdSettings {
    #[serde(default = "default_device_name")]
    pub device_name: String,
    #[serde(default = "default_device_type")]
    pub device_type: String,
    #[serde(default = "default_group_name")]
    pub group_name: String,
    #[serde(default = "default_wps_pin")]
    pub wps_pin: String,
    #[serde(default = "default_lease_timeout")]
    pub lease_timeout_secs: u32,
    #[serde(default = "default_rtsp_port")]
    pub rtsp_port: u16,
    #[serde(default = "default_rtp_port")]
    pub rtp_port: u16,
    #[serde(default = "default_sink_ip")]
    pub sink_ip: Ipv4Addr,
    #[serde(default = "default_peer_ip")]
    pub peer_ip: Ipv4Addr,
    #[serde(default = "default_netmask")]
    pub netmask: Ipv4Addr,
}

impl Default for WfdSettings {
    fn default() -> Self {
        Self {
            device_name: default_device_name(),
            device_type: default_device_type(),
            group_name: default_group_name(),
            wps_pin: default_wps_pin(),
            lease_timeout_secs: default_lease_timeout(),
            rtsp_port: default_rtsp_port(),
            rtp_port: default_rtp_port(),
            sink_ip: default_sink_ip(),
            peer_ip: default_peer_ip(),
            netmask: default_netmask(),
        }
    }
}

impl WfdSettings {
    /// Load from the file at `WFD_SINK_CONFIG`, falling back to defaults if
    /// the variable is unset or the file can't be read/parsed.
    pub fn load() -> Self {
        let Ok(path) = std::env::var("WFD_SINK_CONFIG") else {
            return Self::default();
        };
        match std::fs::read_to_string(&path) {
            Ok(text) => match toml::from_str(&text) {
                Ok(settings) => settings,
                Err(e) => {
                    tracing::warn!(path, error = %e, "failed to parse WFD_SINK_CONFIG, using defaults");
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!(path, error = %e, "failed to read WFD_SINK_CONFIG, using defaults");
                Self::default()
            }
        }
    }
}

fn default_device_name() -> String {
    "picast".into()
}
fn default_device_type() -> String {
    "7-0050F204-1".into()
}
fn default_group_name() -> String {
    "persistent".into()
}
fn default_wps_pin() -> String {
    "12345678".into()
}
fn default_lease_timeout() -> u32 {
    300
}
fn default_rtsp_port() -> u16 {
    7236
}
fn default_rtp_port() -> u16 {
    1028
}
fn default_sink_ip() -> Ipv4Addr {
    Ipv4Addr::new(192, 168, 173, 1)
}
fn default_peer_ip() -> Ipv4Addr {
    Ipv4Addr::new(192, 168, 173, 80)
}
fn default_netmask() -> Ipv4Addr {
    Ipv4Addr::new(255, 255, 255, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_known_values() {
        let s = WfdSettings::default();
        assert_eq!(s.device_name, "picast");
        assert_eq!(s.device_type, "7-0050F204-1");
        assert_eq!(s.group_name, "persistent");
        assert_eq!(s.wps_pin, "12345678");
        assert_eq!(s.lease_timeout_secs, 300);
        assert_eq!(s.rtsp_port, 7236);
        assert_eq!(s.rtp_port, 1028);
        assert_eq!(s.sink_ip, Ipv4Addr::new(192, 168, 173, 1));
        assert_eq!(s.peer_ip, Ipv4Addr::new(192, 168, 173, 80));
        assert_eq!(s.netmask, Ipv4Addr::new(255, 255, 255, 0));
    }

    #[test]
    fn partial_toml_overlay_falls_back_to_defaults_for_missing_fields() {
        let parsed: WfdSettings = toml::from_str("rtsp_port = 9999\n").unwrap();
        assert_eq!(parsed.rtsp_port, 9999);
        assert_eq!(parsed.rtp_port, 1028);
    }
}
