use std::thread;
use std::time::Duration;

use tracing::{debug, info};

use data_model::LocatorSpec;

use crate::browser::BrowserClient;
use crate::error::{ActionError, AttemptError};
use crate::locator::{locate, locate_within, PortalLocators};

/// How often a logout click is re-attempted before the control is written
/// off as unresponsive.
const LOGOUT_RETRIES: usize = 2;

/// Lets style transitions finish after the reveal script runs.
const REVEAL_SETTLE: Duration = Duration::from_millis(200);

/// Lets the portal process a logout before the login form is opened.
const CLICK_SETTLE: Duration = Duration::from_millis(300);

/// Coax a hover-gated account menu into showing its controls: native hover
/// first, then the same pointer events replayed from page script plus a
/// style override, since headless sessions don't always deliver real hover.
/// Returns whether the logout control ended up visible.
pub fn reveal_menu(client: &mut dyn BrowserClient, locators: &PortalLocators) -> bool {
    match locate(client, &locators.menu) {
        Ok(trigger) => {
            if let Err(e) = client.hover(trigger) {
                debug!(error = %e, "native hover failed");
            }
            let _ = client.dispatch_pointer_events(trigger);
            let _ = client.force_visible(trigger);
            thread::sleep(REVEAL_SETTLE);
        }
        Err(_) => debug!("account menu trigger not found, nothing to reveal"),
    }
    logout_visible(client, locators)
}

fn logout_visible(client: &mut dyn BrowserClient, locators: &PortalLocators) -> bool {
    match locate(client, &locators.logout) {
        Ok(strategy) => client.is_visible(strategy),
        Err(_) => false,
    }
}

/// Click the logout control, assuming the caller has already revealed the
/// menu. `false` means no control responded; that is the caller's signal
/// that there was nothing to log out of, not an automation error.
pub fn click_logout(client: &mut dyn BrowserClient, locators: &PortalLocators) -> bool {
    for attempt in 1..=LOGOUT_RETRIES {
        if attempt > 1 {
            reveal_menu(client, locators);
        }
        let strategy = match locate(client, &locators.logout) {
            Ok(strategy) => strategy,
            Err(_) => continue,
        };
        if client.click(strategy).is_ok() {
            info!(attempt, "logout clicked");
            thread::sleep(CLICK_SETTLE);
            return true;
        }
        debug!(attempt, "native logout click did not register, clicking from script");
        if client.click_scripted(strategy).is_ok() {
            info!(attempt, "logout clicked (scripted)");
            thread::sleep(CLICK_SETTLE);
            return true;
        }
    }
    info!("no logout control responded");
    false
}

/// Open the portal in a fresh tab and fill the login form, username strictly
/// before password so half-filled-form validation never fires.
pub fn fill_credentials(
    client: &mut dyn BrowserClient,
    portal_url: &str,
    locators: &PortalLocators,
    username: &str,
    password: &str,
    form_wait: Duration,
) -> Result<(), AttemptError> {
    client.open_fresh(portal_url)?;
    fill_field(client, &locators.username, username, "fill-username", form_wait)?;
    fill_field(client, &locators.password, password, "fill-password", form_wait)?;
    Ok(())
}

fn fill_field(
    client: &mut dyn BrowserClient,
    spec: &LocatorSpec,
    value: &str,
    action: &'static str,
    form_wait: Duration,
) -> Result<(), ActionError> {
    let strategy = locate_within(client, spec, form_wait).map_err(|e| ActionError {
        action,
        detail: e.to_string(),
    })?;

    // native tier: clear, type, then read back to confirm the value stuck
    if client.type_text(strategy, value).is_ok()
        && client
            .read_value(strategy)
            .map(|v| v.trim() == value)
            .unwrap_or(false)
    {
        return Ok(());
    }

    debug!(action, "keystroke fill did not stick, setting the value from script");
    match client.set_value_scripted(strategy, value) {
        Ok(true) => Ok(()),
        Ok(false) => Err(ActionError {
            action,
            detail: "no input control near the located element".into(),
        }),
        Err(e) => Err(ActionError {
            action,
            detail: e.to_string(),
        }),
    }
}

/// Click the login submit control, scripted click as the fallback when the
/// native one fails (covered, zero-size, or stale).
pub fn click_login(
    client: &mut dyn BrowserClient,
    locators: &PortalLocators,
    form_wait: Duration,
) -> Result<(), ActionError> {
    let strategy = locate_within(client, &locators.login, form_wait).map_err(|e| ActionError {
        action: "click-login",
        detail: e.to_string(),
    })?;
    if client.click(strategy).is_ok() {
        return Ok(());
    }
    debug!("native login click did not register, clicking from script");
    client
        .click_scripted(strategy)
        .map_err(|e| ActionError {
            action: "click-login",
            detail: e.to_string(),
        })
}
