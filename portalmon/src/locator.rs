use std::thread;
use std::time::{Duration, Instant};

use tracing::trace;

use data_model::{LocatorSpec, Strategy};

use crate::browser::BrowserClient;
use crate::error::LocateError;

const LOCATE_POLL: Duration = Duration::from_millis(250);

/// Try each strategy of `spec` in its declared order and return the first
/// that resolves. A strategy that misses just advances to the next one; only
/// exhausting them all is an error, and what that absence *means* is for the
/// caller to decide.
pub fn locate<'s>(
    client: &mut dyn BrowserClient,
    spec: &'s LocatorSpec,
) -> Result<&'s Strategy, LocateError> {
    for strategy in &spec.strategies {
        if client.find(strategy) {
            trace!(element = %spec.target, %strategy, "located");
            return Ok(strategy);
        }
    }
    Err(LocateError {
        target: spec.target.clone(),
        tried: spec.strategies.len(),
    })
}

/// Re-scan until `patience` elapses. A freshly opened page may not have
/// rendered the element yet even though a strategy would match it.
pub fn locate_within<'s>(
    client: &mut dyn BrowserClient,
    spec: &'s LocatorSpec,
    patience: Duration,
) -> Result<&'s Strategy, LocateError> {
    let deadline = Instant::now() + patience;
    loop {
        match locate(client, spec) {
            Ok(strategy) => return Ok(strategy),
            Err(err) if Instant::now() >= deadline => return Err(err),
            Err(_) => thread::sleep(LOCATE_POLL),
        }
    }
}

/// The locator specs for every control the portal flow touches. Defaults
/// match the portal this was written against; override per deployment via
/// the `[locators]` config table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortalLocators {
    pub menu: LocatorSpec,
    pub logout: LocatorSpec,
    pub username: LocatorSpec,
    pub password: LocatorSpec,
    pub login: LocatorSpec,
}

impl Default for PortalLocators {
    fn default() -> Self {
        PortalLocators {
            // the account menu lives in the page header; outer containers
            // are fallbacks for markup shifts between portal versions
            menu: LocatorSpec::new(
                "account-menu",
                vec![
                    Strategy::Path("/html/body/div[1]/div[2]/ul".into()),
                    Strategy::Path("/html/body/div[1]/div[2]".into()),
                    Strategy::Path("/html/body/div[1]".into()),
                ],
            ),
            logout: LocatorSpec::new(
                "logout-control",
                vec![
                    Strategy::Path("/html/body/div[1]/div[2]/ul/li[2]/span".into()),
                    Strategy::Text("Logout".into()),
                ],
            ),
            username: LocatorSpec::new(
                "username-field",
                vec![
                    Strategy::Path(
                        "/html/body/div[2]/div[1]/div/div[3]/div[3]/ul/li[1]/label".into(),
                    ),
                    Strategy::Attr("input[name='username']".into()),
                    Strategy::Attr("input[type='text']".into()),
                ],
            ),
            password: LocatorSpec::new(
                "password-field",
                vec![
                    Strategy::Path(
                        "/html/body/div[2]/div[1]/div/div[3]/div[3]/ul/li[2]/label".into(),
                    ),
                    Strategy::Attr("input[type='password']".into()),
                ],
            ),
            login: LocatorSpec::new(
                "login-button",
                vec![
                    Strategy::Path(
                        "/html/body/div[2]/div[1]/div/div[3]/div[5]/div[1]/input".into(),
                    ),
                    Strategy::Attr("input[type='submit']".into()),
                    Strategy::Text("Login".into()),
                ],
            ),
        }
    }
}
