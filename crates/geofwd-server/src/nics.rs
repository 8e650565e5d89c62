//! Primary network interface discovery.

use geofwd_core::{FwdError, FwdResult};
use std::net::{IpAddr, UdpSocket};

/// Prefix of a listen address that stands for the primary interface.
pub const MAIN_PREFIX: &str = "MAIN:";

/// Address of the interface the default route leaves through.
///
/// Connecting a UDP socket sends no packets; it only makes the kernel pick
/// a source address.
pub fn primary_address() -> FwdResult<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket
        .connect("8.8.8.8:80")
        .map_err(|e| FwdError::Resolve(format!("no route to determine primary interface: {e}")))?;
    Ok(socket.local_addr()?.ip())
}

/// Replace a leading `MAIN:` with the primary interface address.
pub fn expand_main(addr: &str) -> FwdResult<String> {
    match addr.strip_prefix(MAIN_PREFIX) {
        Some(port) => Ok(join_host_port(primary_address()?, port)),
        None => Ok(addr.to_string()),
    }
}

fn join_host_port(ip: IpAddr, port: &str) -> String {
    match ip {
        IpAddr::V4(v4) => format!("{v4}:{port}"),
        IpAddr::V6(v6) => format!("[{v6}]:{port}"),
    }
}
