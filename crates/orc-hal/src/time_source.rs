//! Remote time sources.
//!
//! [`SntpClient`] is a minimal SNTPv4 client (RFC 4330): one 48-byte request,
//! one reply, transmit timestamp converted to Unix seconds.  It does no
//! round-trip compensation; whole-second accuracy is all the clock can hold.

use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;

use orc_types::OrcError;
use tracing::debug;

/// Seconds between the NTP era origin (1900) and the Unix epoch (1970).
const NTP_UNIX_OFFSET: u64 = 2_208_988_800;
const SNTP_PACKET_LEN: usize = 48;
/// LI = 0, VN = 4, Mode = 3 (client).
const SNTP_CLIENT_HEADER: u8 = 0b00_100_011;

/// A source of UTC time.
pub trait TimeSource: Send + Sync {
    /// Current UTC time in seconds since the Unix epoch, as reported by
    /// `server` (`host` or `host:port`).
    ///
    /// # Errors
    ///
    /// Returns [`OrcError::RemoteSyncFailure`] when the source cannot be
    /// reached or replies with garbage.
    fn fetch_epoch_seconds(&self, server: &str) -> Result<i64, OrcError>;
}

/// SNTP client.  The server is resolved again on every fetch.
pub struct SntpClient {
    timeout: Duration,
}

impl SntpClient {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

/// Port 123 is assumed when `server` has none.
fn resolve(server: &str) -> Result<SocketAddr, OrcError> {
    let target = if server.contains(':') {
        server.to_string()
    } else {
        format!("{server}:123")
    };
    target
        .to_socket_addrs()
        .map_err(|e| OrcError::RemoteSyncFailure(format!("cannot resolve {target}: {e}")))?
        .find(SocketAddr::is_ipv4)
        .ok_or_else(|| OrcError::RemoteSyncFailure(format!("no IPv4 address for {target}")))
}

impl TimeSource for SntpClient {
    fn fetch_epoch_seconds(&self, server: &str) -> Result<i64, OrcError> {
        let io = |e: std::io::Error| OrcError::RemoteSyncFailure(format!("{server}: {e}"));
        let addr = resolve(server)?;
        let socket = UdpSocket::bind("0.0.0.0:0").map_err(io)?;
        socket.set_read_timeout(Some(self.timeout)).map_err(io)?;

        let mut request = [0u8; SNTP_PACKET_LEN];
        request[0] = SNTP_CLIENT_HEADER;
        socket.send_to(&request, addr).map_err(io)?;

        let mut reply = [0u8; SNTP_PACKET_LEN];
        let (len, from) = socket.recv_from(&mut reply).map_err(io)?;
        debug!(server, %from, len, "sntp reply");
        parse_sntp_reply(&reply[..len])
    }
}

/// Extract Unix seconds from an SNTP server reply.
///
/// # Errors
///
/// Returns [`OrcError::RemoteSyncFailure`] for short packets, non-server
/// modes, kiss-of-death (stratum 0) and zero timestamps.
pub fn parse_sntp_reply(reply: &[u8]) -> Result<i64, OrcError> {
    if reply.len() < SNTP_PACKET_LEN {
        return Err(OrcError::RemoteSyncFailure(format!(
            "short reply ({} bytes)",
            reply.len()
        )));
    }
    let mode = reply[0] & 0b111;
    if mode != 4 {
        return Err(OrcError::RemoteSyncFailure(format!("unexpected mode {mode}")));
    }
    if reply[1] == 0 {
        return Err(OrcError::RemoteSyncFailure("kiss-of-death reply".to_string()));
    }
    let secs = u64::from(u32::from_be_bytes([reply[40], reply[41], reply[42], reply[43]]));
    if secs == 0 {
        return Err(OrcError::RemoteSyncFailure("zero transmit timestamp".to_string()));
    }
    // Era 0 ends in 2036; later timestamps wrap and are shifted into era 1.
    let secs = if secs < NTP_UNIX_OFFSET { secs + (1 << 32) } else { secs };
    Ok((secs - NTP_UNIX_OFFSET) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply_with(ntp_secs: u32) -> [u8; SNTP_PACKET_LEN] {
        let mut r = [0u8; SNTP_PACKET_LEN];
        r[0] = 0b00_100_100; // server mode
        r[1] = 2; // stratum
        r[40..44].copy_from_slice(&ntp_secs.to_be_bytes());
        r
    }

    #[test]
    fn parses_transmit_timestamp() {
        // 2024-01-01T00:00:00Z
        let ntp = (1_704_067_200u64 + NTP_UNIX_OFFSET) as u32;
        assert_eq!(parse_sntp_reply(&reply_with(ntp)).unwrap(), 1_704_067_200);
    }

    #[test]
    fn rejects_short_and_malformed_replies() {
        assert!(parse_sntp_reply(&[0u8; 12]).is_err());

        let mut client_mode = reply_with(3_913_056_000);
        client_mode[0] = SNTP_CLIENT_HEADER;
        assert!(parse_sntp_reply(&client_mode).is_err());

        let mut kod = reply_with(3_913_056_000);
        kod[1] = 0;
        assert!(parse_sntp_reply(&kod).is_err());

        assert!(parse_sntp_reply(&reply_with(0)).is_err());
    }

    #[test]
    fn era_rollover_is_handled() {
        // A small era-1 value lands after 2036.
        let secs = parse_sntp_reply(&reply_with(1_000)).unwrap();
        assert!(secs > 2_085_978_496);
    }

    #[test]
    fn fetch_from_local_responder() {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = server.local_addr().unwrap();
        let responder = std::thread::spawn(move || {
            let mut buf = [0u8; SNTP_PACKET_LEN];
            let (_, from) = server.recv_from(&mut buf).unwrap();
            assert_eq!(buf[0], SNTP_CLIENT_HEADER);
            let ntp = (1_800_000_000u64 + NTP_UNIX_OFFSET) as u32;
            server.send_to(&reply_with(ntp), from).unwrap();
        });

        let client = SntpClient::new(Duration::from_secs(2));
        assert_eq!(client.fetch_epoch_seconds(&addr.to_string()).unwrap(), 1_800_000_000);
        responder.join().unwrap();
    }

    #[test]
    fn unreachable_server_times_out() {
        // Bound but silent.
        let silent = UdpSocket::bind("127.0.0.1:0").unwrap();
        let client = SntpClient::new(Duration::from_millis(50));
        assert!(matches!(
            client.fetch_epoch_seconds(&silent.local_addr().unwrap().to_string()),
            Err(OrcError::RemoteSyncFailure(_))
        ));
    }

    #[test]
    fn each_fetch_queries_the_server_it_is_given() {
        let first = UdpSocket::bind("127.0.0.1:0").unwrap();
        let second = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addrs = (first.local_addr().unwrap(), second.local_addr().unwrap());
        let answer = |socket: UdpSocket, unix: u64| {
            std::thread::spawn(move || {
                let mut buf = [0u8; SNTP_PACKET_LEN];
                let (_, from) = socket.recv_from(&mut buf).unwrap();
                socket.send_to(&reply_with((unix + NTP_UNIX_OFFSET) as u32), from).unwrap();
            })
        };
        let a = answer(first, 1_800_000_000);
        let b = answer(second, 1_900_000_000);

        let client = SntpClient::new(Duration::from_secs(2));
        assert_eq!(client.fetch_epoch_seconds(&addrs.0.to_string()).unwrap(), 1_800_000_000);
        assert_eq!(client.fetch_epoch_seconds(&addrs.1.to_string()).unwrap(), 1_900_000_000);
        a.join().unwrap();
        b.join().unwrap();
    }

    #[test]
    fn bare_host_gets_the_ntp_port() {
        assert_eq!(resolve("127.0.0.1").unwrap().port(), 123);
        assert_eq!(resolve("127.0.0.1:1123").unwrap().port(), 1123);
    }
}
