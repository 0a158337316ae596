use std::sync::mpsc::Receiver;

use tracing::{debug, error, info, warn};

use data_model::{Association, ConnectivityStatus};

use crate::browser::ChromeClient;
use crate::config::Config;
use crate::portal::Portal;
use crate::{probe, ssid};

#[derive(Debug, PartialEq)]
pub(crate) enum TickAction {
    /// Not associated with the target network; nothing here to fix.
    SkipOtherNetwork(Association),
    SkipOnline,
    Reauthenticate,
}

/// The per-tick guard order. A wrong association means no probe and no
/// browser; a reachable probe means no browser.
fn decide(
    association: &Association,
    target: &str,
    connectivity: &mut dyn FnMut() -> ConnectivityStatus,
) -> TickAction {
    if !association.matches(target) {
        return TickAction::SkipOtherNetwork(association.clone());
    }
    match connectivity() {
        ConnectivityStatus::Reachable => TickAction::SkipOnline,
        ConnectivityStatus::Unreachable => TickAction::Reauthenticate,
    }
}

/// Run ticks forever, an interval apart, regardless of what each attempt
/// did. A message on `term_receiver` ends the loop; a `recv_timeout`
/// timeout is just the next tick.
pub(crate) fn monitor_loop(config: &Config, term_receiver: Receiver<()>) {
    info!(
        ssid = %config.target_ssid,
        interval = ?config.check_interval,
        "monitoring started"
    );

    loop {
        tick(config);
        if term_receiver.recv_timeout(config.check_interval).is_ok() {
            break;
        }
    }

    info!("exiting");
}

fn tick(config: &Config) {
    let association = read_association(config);
    let mut connectivity = || probe::connectivity(config);

    match decide(&association, &config.target_ssid, &mut connectivity) {
        TickAction::SkipOtherNetwork(current) => {
            debug!(%current, wanted = %config.target_ssid, "not on the target network, skipping");
        }
        TickAction::SkipOnline => debug!("connectivity ok, nothing to do"),
        TickAction::Reauthenticate => {
            warn!("connectivity lost on the target network, starting portal re-authentication");
            reauthenticate(config);
        }
    }
}

fn reauthenticate(config: &Config) {
    let mut client = match ChromeClient::launch(
        config.headless,
        config.browser_binary.as_deref(),
        config.automation_timeout,
    ) {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "browser session failed to start");
            return;
        }
    };

    let portal = Portal::from_config(config);
    let mut verify = || probe::is_reachable(&config.test_url, config.request_timeout);
    match portal.reauthenticate(&mut client, &mut verify) {
        Ok(report) => info!(
            classified = %report.classified,
            restored = report.restored,
            "re-authentication attempt finished"
        ),
        Err(e) => error!(error = %e, "browser session failed mid-attempt"),
    }
    // client drops here: the session is released before the next tick
}

fn read_association(config: &Config) -> Association {
    if config.pin_association {
        return Association::Ssid(config.target_ssid.clone());
    }
    ssid::current()
}
