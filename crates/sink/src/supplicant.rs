//! Thin wrapper around the `wpa_cli` control program.
//!
//! Each call is a one-shot subprocess; invocations are serialized by the
//! caller (`p2p::bring_up`), so no locking is needed here.

use std::process::Command;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum SupplicantError {
    #[error("wpa_cli {command}: failed to spawn ({source})")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("wpa_cli {command}: expected OK in output, got {output:?}")]
    NotOk { command: String, output: String },
}

/// Run `wpa_cli <args>`, returning its stdout split into lines.
fn run(args: &str) -> Result<Vec<String>, SupplicantError> {
    debug!(args, "wpa_cli");
    let output = Command::new("wpa_cli")
        .args(args.split_whitespace())
        .output()
        .map_err(|source| SupplicantError::Spawn {
            command: args.to_string(),
            source,
        })?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout.lines().map(str::to_string).collect())
}

/// Run a command and require "OK" to appear somewhere in its stdout.
fn run_expect_ok(args: &str) -> Result<(), SupplicantError> {
    let lines = run(args)?;
    if lines.iter().any(|l| l.trim() == "OK") {
        Ok(())
    } else {
        Err(SupplicantError::NotOk {
            command: args.to_string(),
            output: lines.join("\n"),
        })
    }
}

pub fn p2p_find() -> Result<(), SupplicantError> {
    run_expect_ok("p2p_find type=progressive")
}

pub fn set_device_name(name: &str) -> Result<(), SupplicantError> {
    run_expect_ok(&format!("set device_name {name}"))
}

pub fn set_device_type(device_type: &str) -> Result<(), SupplicantError> {
    run_expect_ok(&format!("set device_type {device_type}"))
}

pub fn set_p2p_go_ht40() -> Result<(), SupplicantError> {
    run_expect_ok("set p2p_go_ht40 1")
}

pub fn wfd_subelem_set(index: u32, hex: &str) -> Result<(), SupplicantError> {
    run_expect_ok(&format!("wfd_subelem_set {index} {hex}"))
}

pub fn p2p_group_add(group_name: &str) -> Result<(), SupplicantError> {
    // The original doesn't check OK here either: p2p_group_add's reply is
    // asynchronous group-formation status, not a synchronous OK/FAIL.
    run(&format!("p2p_group_add {group_name}")).map(|_| ())
}

pub fn set_wps_pin(interface: &str, pin: &str, timeout_secs: u32) -> Result<(), SupplicantError> {
    run(&format!("-i {interface} wps_pin any {pin} {timeout_secs}")).map(|_| ())
}

/// Parse `wpa_cli interface` output:
/// ```text
/// Selected interface 'wlan0'
/// Available interfaces:
/// wlan0
/// p2p-wlan0-0
/// ```
fn parse_interface_list(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .filter(|l| !l.starts_with("Selected interface") && l.trim() != "Available interfaces:")
        .cloned()
        .collect()
}

pub fn list_interfaces() -> Result<Vec<String>, SupplicantError> {
    Ok(parse_interface_list(&run("interface")?))
}

/// Find an already-existing `p2p-wl*` interface, if any.
pub fn find_p2p_interface() -> Result<Option<String>, SupplicantError> {
    Ok(list_interfaces()?.into_iter().find(|name| name.starts_with("p2p-wl")))
}
