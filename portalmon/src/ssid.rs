use std::io;
use std::process::Command;

use tracing::debug;

use data_model::Association;

/// Snapshot of the current Wi-Fi association. Any failure to run or parse
/// the platform tool is reported as `Unknown`, never as an error: the
/// monitor treats an unknown association as "not on the target network".
pub fn current() -> Association {
    match get_ssid() {
        Ok(name) => Association::Ssid(name),
        Err(e) => {
            debug!(error = %e, "could not read the current SSID");
            Association::Unknown
        }
    }
}

#[cfg(target_os = "windows")]
fn get_ssid() -> Result<String, io::Error> {
    let output = Command::new("netsh")
        .args(["wlan", "show", "interfaces"])
        .output()
        .map_err(|_| io::Error::new(io::ErrorKind::NotFound, "Could not execute 'netsh'"))?;

    if !output.status.success() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{}", String::from_utf8_lossy(&output.stderr)),
        ));
    }

    parse_ssid(&String::from_utf8_lossy(&output.stdout))
}

#[cfg(target_os = "windows")]
fn parse_ssid(data: &str) -> Result<String, io::Error> {
    for line in data.lines() {
        let line = line.trim();
        let lower = line.to_ascii_lowercase();
        // the interface listing has both "SSID" and "BSSID" lines
        if lower.starts_with("ssid") && !lower.contains("bssid") {
            if let Some((_, value)) = line.split_once(':') {
                let name = value.trim();
                if !name.is_empty() {
                    return Ok(name.to_owned());
                }
            }
        }
    }

    Err(io::Error::new(
        io::ErrorKind::NotFound,
        "Could not parse SSID name from netsh output",
    ))
}

#[cfg(target_os = "macos")]
fn get_ssid() -> Result<String, io::Error> {
    let output = Command::new("/usr/sbin/networksetup")
        .arg("-getairportnetwork")
        .arg("en0")
        .output()
        .map_err(|e| io::Error::new(io::ErrorKind::NotFound, e))?;

    if !output.status.success() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{}", String::from_utf8_lossy(&output.stderr)),
        ));
    }

    parse_ssid(&String::from_utf8_lossy(&output.stdout))
}

#[cfg(target_os = "macos")]
fn parse_ssid(data: &str) -> Result<String, io::Error> {
    for line in data.lines() {
        if let Some((key, value)) = line.trim().split_once(':') {
            if key == "Current Wi-Fi Network" {
                let name = value.trim();
                if !name.is_empty() {
                    return Ok(name.to_owned());
                }
            }
        }
    }

    Err(io::Error::new(
        io::ErrorKind::NotFound,
        format!("Could not parse SSID name: '{data}'"),
    ))
}

// This will need improving for the case when there are multiple interfaces
#[cfg(target_os = "linux")]
fn get_ssid() -> Result<String, io::Error> {
    let output = Command::new("iw")
        .arg("dev")
        .output()
        .map_err(|_| io::Error::new(io::ErrorKind::NotFound, "Could not execute 'iw'"))?;
    parse_ssid(&String::from_utf8_lossy(&output.stdout))
}

#[cfg(target_os = "linux")]
fn parse_ssid(data: &str) -> Result<String, io::Error> {
    for line in data.lines() {
        if let Some(rest) = line.trim().strip_prefix("ssid ") {
            let name = rest.trim();
            if !name.is_empty() {
                return Ok(name.to_owned());
            }
        }
    }

    Err(io::Error::new(
        io::ErrorKind::NotFound,
        "Could not parse SSID name",
    ))
}

#[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
fn get_ssid() -> Result<String, io::Error> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "no SSID reader for this platform; pin the association in config instead",
    ))
}

#[cfg(test)]
mod test {
    #[cfg(target_os = "windows")]
    #[test]
    fn netsh_interface_listing_parses() {
        let data = "\
    Name                   : Wi-Fi\r
    State                  : connected\r
    SSID                   : Campus\r
    BSSID                  : aa:bb:cc:dd:ee:ff\r
";
        assert_eq!(super::parse_ssid(data).unwrap(), "Campus");
    }

    #[cfg(target_os = "macos")]
    #[test]
    fn networksetup_output_parses() {
        let data = "Current Wi-Fi Network: Campus\n";
        assert_eq!(super::parse_ssid(data).unwrap(), "Campus");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn iw_dev_output_parses() {
        let data = "\
phy#0
\tInterface wlan0
\t\tifindex 3
\t\tssid Campus Net
\t\ttype managed
";
        assert_eq!(super::parse_ssid(data).unwrap(), "Campus Net");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn missing_ssid_line_is_an_error() {
        assert!(super::parse_ssid("phy#0\n\tInterface wlan0\n").is_err());
    }
}
