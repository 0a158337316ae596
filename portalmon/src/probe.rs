use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use curl::easy::Easy;
use tracing::{debug, trace};
use url::Url;

use data_model::ConnectivityStatus;

use crate::config::Config;

/// Bound on the optional TCP pre-probe; it exists to be sub-second.
const FAST_PROBE_TIMEOUT: Duration = Duration::from_millis(800);

/// One lightweight GET against `url`. True only for a response below 400
/// within `timeout`; any transport error or timeout is simply "not
/// reachable". Redirects are not followed: a captive portal answering with
/// its own page must not count as reachability.
pub fn is_reachable(url: &Url, timeout: Duration) -> bool {
    match fetch_status(url, timeout) {
        Ok(code) => {
            trace!(code, "probe response");
            code < 400
        }
        Err(e) => {
            debug!(url = %url, error = %e, "probe failed");
            false
        }
    }
}

fn fetch_status(url: &Url, timeout: Duration) -> Result<u32, curl::Error> {
    let mut easy = Easy::new();
    easy.url(url.as_str())?;
    easy.get(true)?;
    easy.timeout(timeout)?;
    // the body is irrelevant, discard it
    easy.write_function(|data| Ok(data.len()))?;
    easy.perform()?;
    easy.response_code()
}

/// The monitor-loop gate. When a fast TCP probe host is configured, a
/// successful raw connect short-circuits the HTTP probe; a failed one does
/// not count as unreachable on its own, since the gate must not false-alarm
/// on a single filtered port.
pub fn connectivity(config: &Config) -> ConnectivityStatus {
    if let Some((host, port)) = &config.fast_probe {
        if tcp_reachable(host, *port) {
            trace!(host = %host, port, "fast TCP probe succeeded");
            return ConnectivityStatus::Reachable;
        }
    }
    if is_reachable(&config.test_url, config.request_timeout) {
        ConnectivityStatus::Reachable
    } else {
        ConnectivityStatus::Unreachable
    }
}

fn tcp_reachable(host: &str, port: u16) -> bool {
    let mut addrs = match (host, port).to_socket_addrs() {
        Ok(addrs) => addrs,
        Err(_) => return false,
    };
    addrs
        .next()
        .map(|addr| TcpStream::connect_timeout(&addr, FAST_PROBE_TIMEOUT).is_ok())
        .unwrap_or(false)
}
