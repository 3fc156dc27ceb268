//! DHCP attendant: writes a single-lease config file and supervises the
//! `udhcpd` daemon for the peer's IP assignment.
//!
//! The config file's lifetime is scoped to the [`DhcpAttendant`] value: it is
//! guaranteed to exist while the daemon runs and removed on every exit path,
//! including a panic unwind, mirroring the acquisition/release discipline in
//! `display.rs`'s `VirtualDisplay`.

use std::fs;
use std::io::Write;
use std::process::{Child, Command, Stdio};
use tracing::{debug, info, warn};
use wfd_protocol::WfdSettings;

#[derive(Debug, thiserror::Error)]
pub enum DhcpError {
    #[error("failed to write DHCP config at {path}: {source}")]
    WriteConfig {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to spawn udhcpd: {0}")]
    Spawn(#[source] std::io::Error),
}

pub struct DhcpAttendant {
    config_path: String,
    daemon: Child,
}

impl DhcpAttendant {
    /// Write the config file and launch `udhcpd` against it, invoked with
    /// one argument: the config path.
    pub fn start(iface: &str, settings: &WfdSettings) -> Result<Self, DhcpError> {
        let config_path = format!("/tmp/wfd-sink-dhcpd-{}.conf", std::process::id());
        let contents = format!(
            "start  {peer}\nend {peer}\ninterface {iface}\noption subnet {netmask}\noption lease {lease}\n",
            peer = settings.peer_ip,
            iface = iface,
            netmask = settings.netmask,
            lease = settings.lease_timeout_secs,
        );

        let mut file = fs::File::create(&config_path).map_err(|source| DhcpError::WriteConfig {
            path: config_path.clone(),
            source,
        })?;
        file.write_all(contents.as_bytes()).map_err(|source| DhcpError::WriteConfig {
            path: config_path.clone(),
            source,
        })?;
        debug!(path = config_path, "wrote DHCP config");

        let daemon = Command::new("sudo")
            .arg("udhcpd")
            .arg(&config_path)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(DhcpError::Spawn)?;
        info!(pid = daemon.id(), path = config_path, "udhcpd started");

        Ok(Self { config_path, daemon })
    }
}

impl Drop for DhcpAttendant {
    fn drop(&mut self) {
        match self.daemon.try_wait() {
            Ok(Some(_)) => {}
            Ok(None) => {
                // SAFETY: pid is this child's own pid, owned exclusively by this struct.
                unsafe {
                    libc::kill(self.daemon.id() as i32, libc::SIGTERM);
                }
                let _ = self.daemon.wait();
            }
            Err(e) => warn!(error = %e, "could not check udhcpd status during shutdown"),
        }
        if let Err(e) = fs::remove_file(&self.config_path) {
            warn!(path = self.config_path, error = %e, "failed to remove DHCP config on shutdown");
        }
    }
}
