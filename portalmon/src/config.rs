use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde_derive::{Deserialize, Serialize};
use url::Url;

use data_model::{LocatorSpec, Strategy};

use crate::error::ConfigError;
use crate::locator::PortalLocators;

pub(crate) const CONFIG_FILE_NAME: &str = "portalmon.toml";

const DEFAULT_TEST_URL: &str = "http://connectivitycheck.gstatic.com/generate_204";
const DEFAULT_LOG_FILE: &str = "wifi_portal_runner.log";
const DEFAULT_CHECK_INTERVAL_SECONDS: u64 = 5;
const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 5;
const DEFAULT_AUTOMATION_TIMEOUT_SECONDS: u64 = 15;
const DEFAULT_FAST_TCP_PORT: u16 = 53;

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub(crate) struct PortalSpec {
    pub ssid: String,
    pub url: String,
    pub test_url: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub(crate) struct CredentialsSpec {
    pub username: String,
    pub password: String,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Default)]
pub(crate) struct MonitorSpec {
    pub check_interval_seconds: Option<u64>,
    pub request_timeout_seconds: Option<u64>,
    /// Assert the association statically instead of reading it, for
    /// platforms without a usable SSID primitive.
    pub pin_association: Option<bool>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Default)]
pub(crate) struct BrowserSpec {
    pub headless: Option<bool>,
    pub automation_timeout_seconds: Option<u64>,
    pub binary: Option<PathBuf>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Default)]
pub(crate) struct ProbeSpec {
    pub fast_tcp_host: Option<String>,
    pub fast_tcp_port: Option<u16>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Default)]
pub(crate) struct LocatorsSpec {
    pub menu: Option<Vec<Strategy>>,
    pub logout: Option<Vec<Strategy>>,
    pub username: Option<Vec<Strategy>>,
    pub password: Option<Vec<Strategy>>,
    pub login: Option<Vec<Strategy>>,
}

/// The config file as written by the operator. Everything optional at parse
/// time; what is actually required is enforced by `resolve`.
#[derive(Default, Serialize, Deserialize)]
pub(crate) struct ConfigFile {
    pub portal: Option<PortalSpec>,
    pub credentials: Option<CredentialsSpec>,
    pub monitor: Option<MonitorSpec>,
    pub browser: Option<BrowserSpec>,
    pub probe: Option<ProbeSpec>,
    pub locators: Option<LocatorsSpec>,
    pub log: Option<PathBuf>,
}

/// Validated, fully-defaulted configuration. Loaded once at startup and
/// immutable from then on.
#[derive(Clone, Debug)]
pub(crate) struct Config {
    pub target_ssid: String,
    pub portal_url: Url,
    pub test_url: Url,
    pub username: String,
    pub password: String,
    pub check_interval: Duration,
    pub request_timeout: Duration,
    pub automation_timeout: Duration,
    pub headless: bool,
    pub browser_binary: Option<PathBuf>,
    pub log_path: PathBuf,
    pub pin_association: bool,
    pub fast_probe: Option<(String, u16)>,
    pub locators: PortalLocators,
}

impl ConfigFile {
    pub fn resolve(self) -> Result<Config, ConfigError> {
        let portal = self.portal.ok_or(ConfigError::MissingSection("portal"))?;
        let credentials = self
            .credentials
            .ok_or(ConfigError::MissingSection("credentials"))?;

        if portal.ssid.is_empty() {
            return Err(ConfigError::MissingField("portal.ssid"));
        }
        if portal.url.is_empty() {
            return Err(ConfigError::MissingField("portal.url"));
        }
        if credentials.username.is_empty() {
            return Err(ConfigError::MissingField("credentials.username"));
        }
        if credentials.password.is_empty() {
            return Err(ConfigError::MissingField("credentials.password"));
        }

        let portal_url =
            Url::parse(&portal.url).map_err(|e| ConfigError::BadUrl("portal.url", e))?;
        let test_url = Url::parse(portal.test_url.as_deref().unwrap_or(DEFAULT_TEST_URL))
            .map_err(|e| ConfigError::BadUrl("portal.test_url", e))?;

        let monitor = self.monitor.unwrap_or_default();
        let browser = self.browser.unwrap_or_default();
        let probe = self.probe.unwrap_or_default();

        let fast_probe = match probe.fast_tcp_host {
            Some(host) if host.is_empty() => {
                return Err(ConfigError::MissingField("probe.fast_tcp_host"))
            }
            Some(host) => Some((host, probe.fast_tcp_port.unwrap_or(DEFAULT_FAST_TCP_PORT))),
            None => None,
        };

        Ok(Config {
            target_ssid: portal.ssid,
            portal_url,
            test_url,
            username: credentials.username,
            password: credentials.password,
            check_interval: positive_seconds(
                monitor.check_interval_seconds,
                DEFAULT_CHECK_INTERVAL_SECONDS,
                "monitor.check_interval_seconds",
            )?,
            request_timeout: positive_seconds(
                monitor.request_timeout_seconds,
                DEFAULT_REQUEST_TIMEOUT_SECONDS,
                "monitor.request_timeout_seconds",
            )?,
            automation_timeout: positive_seconds(
                browser.automation_timeout_seconds,
                DEFAULT_AUTOMATION_TIMEOUT_SECONDS,
                "browser.automation_timeout_seconds",
            )?,
            headless: browser.headless.unwrap_or(true),
            browser_binary: browser.binary,
            log_path: self.log.unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE)),
            pin_association: monitor.pin_association.unwrap_or(false),
            fast_probe,
            locators: resolve_locators(self.locators.unwrap_or_default())?,
        })
    }
}

fn positive_seconds(
    value: Option<u64>,
    default: u64,
    name: &'static str,
) -> Result<Duration, ConfigError> {
    let seconds = value.unwrap_or(default);
    if seconds == 0 {
        return Err(ConfigError::NonPositive(name));
    }
    Ok(Duration::from_secs(seconds))
}

fn resolve_locators(spec: LocatorsSpec) -> Result<PortalLocators, ConfigError> {
    let mut locators = PortalLocators::default();
    override_spec(&mut locators.menu, spec.menu, "locators.menu")?;
    override_spec(&mut locators.logout, spec.logout, "locators.logout")?;
    override_spec(&mut locators.username, spec.username, "locators.username")?;
    override_spec(&mut locators.password, spec.password, "locators.password")?;
    override_spec(&mut locators.login, spec.login, "locators.login")?;
    Ok(locators)
}

fn override_spec(
    locator: &mut LocatorSpec,
    strategies: Option<Vec<Strategy>>,
    name: &'static str,
) -> Result<(), ConfigError> {
    if let Some(strategies) = strategies {
        if strategies.is_empty() {
            return Err(ConfigError::MissingField(name));
        }
        locator.strategies = strategies;
    }
    Ok(())
}

pub(crate) fn find_config_file(file_name: &'static str) -> Result<PathBuf, ConfigError> {
    let mut dir = env::current_dir().ok();

    // Loop until no parent directory exists. (i.e. stop at "/")
    while let Some(directory) = dir {
        let config_path = directory.join(file_name);

        if config_path.exists() {
            return Ok(config_path);
        }

        dir = directory.parent().map(|p| p.to_path_buf());
    }

    Err(ConfigError::NotFound(file_name))
}

pub(crate) fn read_config(config_file_path: &PathBuf) -> Result<Config, ConfigError> {
    let config_string = std::fs::read_to_string(config_file_path).map_err(ConfigError::Io)?;
    let config: ConfigFile = toml::from_str(&config_string)?;
    config.resolve()
}
