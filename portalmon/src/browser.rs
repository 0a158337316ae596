use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use headless_chrome::{Browser, Element, LaunchOptionsBuilder, Tab};
use tracing::{debug, warn};

use data_model::Strategy;

use crate::error::{SessionError, StepError};

/// What the portal automation needs from a browser. The native tier simulates
/// real input; the scripted tier drives the equivalent behavior from inside
/// the page, for elements that refuse native interaction. Which tier runs is
/// decided by the action layer at runtime, not by the client.
pub trait BrowserClient {
    /// Open `url` in a fresh tab, isolated from whatever any previous tab was
    /// showing. Falls back to reusing the current tab if the browser refuses
    /// a new one.
    fn open_fresh(&mut self, url: &str) -> Result<(), SessionError>;

    /// Whether `strategy` resolves to an element on the current page.
    fn find(&mut self, strategy: &Strategy) -> bool;

    /// Whether the element has geometry and is not hidden by style.
    fn is_visible(&mut self, strategy: &Strategy) -> bool;

    // native tier
    fn click(&mut self, strategy: &Strategy) -> Result<(), StepError>;
    fn hover(&mut self, strategy: &Strategy) -> Result<(), StepError>;
    /// Clear the element, then type `text` into it with simulated keystrokes.
    fn type_text(&mut self, strategy: &Strategy, text: &str) -> Result<(), StepError>;
    /// Current `value` property of the element.
    fn read_value(&mut self, strategy: &Strategy) -> Result<String, StepError>;

    // scripted tier
    fn click_scripted(&mut self, strategy: &Strategy) -> Result<(), StepError>;
    /// Set `text` as the value of the element, or of the nearest input-like
    /// descendant/sibling when the located element is a label or container,
    /// and fire the events a real keystroke would. `Ok(false)` means no
    /// input control was found near the element.
    fn set_value_scripted(&mut self, strategy: &Strategy, text: &str) -> Result<bool, StepError>;
    /// Replay the pointer events a hover would produce, from page script.
    fn dispatch_pointer_events(&mut self, strategy: &Strategy) -> Result<(), StepError>;
    /// Override the element's style so that hover-gated menus become
    /// interactable in headless mode.
    fn force_visible(&mut self, strategy: &Strategy) -> Result<(), StepError>;
}

const SCROLL_INTO_VIEW: &str = "function () { this.scrollIntoView({ block: 'center' }); }";

const CLEAR_VALUE: &str = "function () { if ('value' in this) { this.value = ''; } }";

const READ_VALUE: &str =
    "function () { return this.value === undefined ? '' : String(this.value); }";

const CLICK: &str = "function () { this.click(); }";

const POINTER_EVENTS: &str = r#"function () {
    var names = ['mouseover', 'mousemove', 'mouseenter'];
    for (var i = 0; i < names.length; i++) {
        this.dispatchEvent(new Event(names[i], { bubbles: true }));
    }
}"#;

const FORCE_VISIBLE: &str = r#"function () {
    this.style.visibility = 'visible';
    this.style.opacity = 1;
    if (window.getComputedStyle(this).display === 'none') {
        this.style.display = 'block';
    }
}"#;

const VISIBLE_CHECK: &str = r#"function () {
    var rect = this.getBoundingClientRect();
    var style = window.getComputedStyle(this);
    return rect.width > 0 && rect.height > 0
        && style.visibility !== 'hidden'
        && style.display !== 'none'
        && Number(style.opacity) !== 0;
}"#;

/// One Chrome/Chromium session, spoken to over CDP. Owned exclusively by the
/// re-authentication attempt that launched it; dropping it kills the browser,
/// so every exit path releases the session.
pub struct ChromeClient {
    browser: Browser,
    tab: Arc<Tab>,
    automation_timeout: Duration,
}

impl ChromeClient {
    pub fn launch(
        headless: bool,
        binary: Option<&Path>,
        automation_timeout: Duration,
    ) -> Result<Self, SessionError> {
        let mut builder = LaunchOptionsBuilder::default();
        builder
            .headless(headless)
            .sandbox(false)
            .window_size(Some((1920, 1080)))
            .idle_browser_timeout(Duration::from_secs(60))
            .args(vec![
                OsStr::new("--disable-gpu"),
                OsStr::new("--disable-dev-shm-usage"),
            ]);
        if let Some(path) = binary {
            builder.path(Some(PathBuf::from(path)));
        }
        let options = builder
            .build()
            .map_err(|e| SessionError(format!("launch options: {e}")))?;

        let browser = Browser::new(options).map_err(SessionError::from)?;
        let tab = browser.new_tab().map_err(SessionError::from)?;
        tab.set_default_timeout(automation_timeout);
        debug!(headless, "browser session started");

        Ok(ChromeClient {
            browser,
            tab,
            automation_timeout,
        })
    }

    fn resolve(&self, strategy: &Strategy) -> anyhow::Result<Element<'_>> {
        match strategy {
            Strategy::Path(xpath) => self.tab.find_element_by_xpath(xpath),
            Strategy::Attr(css) => self.tab.find_element(css),
            Strategy::Text(text) => self.tab.find_element_by_xpath(&text_xpath(text)),
        }
    }

    fn script_on(&self, strategy: &Strategy, body: &str) -> Result<serde_json::Value, StepError> {
        let element = self.resolve(strategy).map_err(step)?;
        let result = element.call_js_fn(body, vec![], true).map_err(step)?;
        Ok(result.value.unwrap_or(serde_json::Value::Null))
    }
}

impl BrowserClient for ChromeClient {
    fn open_fresh(&mut self, url: &str) -> Result<(), SessionError> {
        match self.browser.new_tab() {
            Ok(tab) => {
                tab.set_default_timeout(self.automation_timeout);
                self.tab = tab;
            }
            Err(e) => warn!(error = %e, "could not open a fresh tab, reusing the current one"),
        }
        self.tab.navigate_to(url).map_err(SessionError::from)?;
        self.tab.wait_until_navigated().map_err(SessionError::from)?;
        Ok(())
    }

    fn find(&mut self, strategy: &Strategy) -> bool {
        self.resolve(strategy).is_ok()
    }

    fn is_visible(&mut self, strategy: &Strategy) -> bool {
        self.script_on(strategy, VISIBLE_CHECK)
            .ok()
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    fn click(&mut self, strategy: &Strategy) -> Result<(), StepError> {
        let element = self.resolve(strategy).map_err(step)?;
        let _ = element.call_js_fn(SCROLL_INTO_VIEW, vec![], false);
        element.click().map(|_| ()).map_err(step)
    }

    fn hover(&mut self, strategy: &Strategy) -> Result<(), StepError> {
        let element = self.resolve(strategy).map_err(step)?;
        let _ = element.call_js_fn(SCROLL_INTO_VIEW, vec![], false);
        element.move_mouse_over().map(|_| ()).map_err(step)
    }

    fn type_text(&mut self, strategy: &Strategy, text: &str) -> Result<(), StepError> {
        let element = self.resolve(strategy).map_err(step)?;
        element.call_js_fn(CLEAR_VALUE, vec![], false).map_err(step)?;
        element.type_into(text).map(|_| ()).map_err(step)
    }

    fn read_value(&mut self, strategy: &Strategy) -> Result<String, StepError> {
        let value = self.script_on(strategy, READ_VALUE)?;
        Ok(value.as_str().unwrap_or_default().to_owned())
    }

    fn click_scripted(&mut self, strategy: &Strategy) -> Result<(), StepError> {
        self.script_on(strategy, CLICK).map(|_| ())
    }

    fn set_value_scripted(&mut self, strategy: &Strategy, text: &str) -> Result<bool, StepError> {
        // the value is embedded as a JSON literal so quoting survives
        let literal = serde_json::Value::String(text.to_owned()).to_string();
        let body = format!(
            r#"function () {{
    var value = {literal};
    var target = null;
    if (this.matches && this.matches('input, textarea')) {{ target = this; }}
    if (!target && this.querySelector) {{ target = this.querySelector('input, textarea'); }}
    if (!target && this.nextElementSibling
        && this.nextElementSibling.matches('input, textarea')) {{ target = this.nextElementSibling; }}
    if (!target && this.previousElementSibling
        && this.previousElementSibling.matches('input, textarea')) {{ target = this.previousElementSibling; }}
    if (!target && this.parentElement) {{ target = this.parentElement.querySelector('input, textarea'); }}
    if (!target) {{ return false; }}
    target.value = value;
    target.dispatchEvent(new Event('input', {{ bubbles: true }}));
    target.dispatchEvent(new Event('change', {{ bubbles: true }}));
    return target.value === value;
}}"#
        );
        let result = self.script_on(strategy, &body)?;
        Ok(result.as_bool().unwrap_or(false))
    }

    fn dispatch_pointer_events(&mut self, strategy: &Strategy) -> Result<(), StepError> {
        self.script_on(strategy, POINTER_EVENTS).map(|_| ())
    }

    fn force_visible(&mut self, strategy: &Strategy) -> Result<(), StepError> {
        self.script_on(strategy, FORCE_VISIBLE).map(|_| ())
    }
}

impl Drop for ChromeClient {
    fn drop(&mut self) {
        debug!("browser session released");
    }
}

fn step(err: anyhow::Error) -> StepError {
    StepError(err.to_string())
}

fn text_xpath(needle: &str) -> String {
    format!(
        "//*[text()[contains(normalize-space(.), {})]]",
        xpath_literal(needle)
    )
}

/// Quote a string for use inside an XPath expression. XPath 1.0 has no
/// escaping, so strings containing both quote kinds are split with concat().
fn xpath_literal(value: &str) -> String {
    if !value.contains('\'') {
        format!("'{value}'")
    } else if !value.contains('"') {
        format!("\"{value}\"")
    } else {
        let parts = value.split('\'').collect::<Vec<_>>().join("', \"'\", '");
        format!("concat('{parts}')")
    }
}


#[cfg(test)]
pub(crate) mod fake {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use data_model::Strategy;

    use crate::error::{SessionError, StepError};

    use super::BrowserClient;

    /// Tracks how many fake sessions are alive at once, for the invariant
    /// that re-authentication never overlaps itself.
    #[derive(Default)]
    pub(crate) struct SessionCounter {
        live: AtomicUsize,
        peak: AtomicUsize,
    }

    impl SessionCounter {
        pub fn live(&self) -> usize {
            self.live.load(Ordering::SeqCst)
        }

        pub fn peak(&self) -> usize {
            self.peak.load(Ordering::SeqCst)
        }
    }

    /// A scriptable in-memory page model. Elements are keyed by their
    /// selector string; `hidden` elements resolve but only become visible
    /// once pointer events or a style override have run against the page.
    #[derive(Default)]
    pub(crate) struct FakeClient {
        pub calls: Vec<String>,
        pub opened: Vec<String>,
        pub present: Vec<String>,
        pub hidden: Vec<String>,
        pub revealed: bool,
        pub fail_native_clicks: bool,
        pub fail_native_typing: bool,
        pub refuse_open: bool,
        /// Elements that only exist once at least N tabs have been opened,
        /// e.g. a login form that appears in the fresh tab but not on the
        /// landing page.
        pub appear_after_open: Vec<(usize, String)>,
        pub values: HashMap<String, String>,
        counter: Option<Arc<SessionCounter>>,
    }

    impl FakeClient {
        pub fn new() -> Self {
            FakeClient::default()
        }

        pub fn counted(counter: &Arc<SessionCounter>) -> Self {
            let live = counter.live.fetch_add(1, Ordering::SeqCst) + 1;
            counter.peak.fetch_max(live, Ordering::SeqCst);
            let mut client = FakeClient::new();
            client.counter = Some(Arc::clone(counter));
            client
        }

        pub fn with_elements(keys: &[&str]) -> Self {
            let mut client = FakeClient::new();
            client.present = keys.iter().map(|k| (*k).to_owned()).collect();
            client
        }

        pub fn hide(mut self, key: &str) -> Self {
            self.hidden.push(key.to_owned());
            self
        }

        pub fn calls_matching(&self, prefix: &str) -> usize {
            self.calls.iter().filter(|c| c.starts_with(prefix)).count()
        }

        fn appeared(&self, key: &str) -> bool {
            self.appear_after_open
                .iter()
                .any(|(n, k)| k == key && self.opened.len() >= *n)
        }

        fn known(&self, key: &str) -> bool {
            self.present.iter().any(|k| k == key)
                || self.hidden.iter().any(|k| k == key)
                || self.appeared(key)
        }
    }

    impl Drop for FakeClient {
        fn drop(&mut self) {
            if let Some(counter) = &self.counter {
                counter.live.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }

    pub(crate) fn key(strategy: &Strategy) -> String {
        match strategy {
            Strategy::Path(s) | Strategy::Attr(s) | Strategy::Text(s) => s.clone(),
        }
    }

    impl BrowserClient for FakeClient {
        fn open_fresh(&mut self, url: &str) -> Result<(), SessionError> {
            self.calls.push(format!("open:{url}"));
            if self.refuse_open {
                return Err(SessionError("no tab".into()));
            }
            self.opened.push(url.to_owned());
            Ok(())
        }

        fn find(&mut self, strategy: &Strategy) -> bool {
            let key = key(strategy);
            self.calls.push(format!("find:{key}"));
            self.known(&key)
        }

        fn is_visible(&mut self, strategy: &Strategy) -> bool {
            let key = key(strategy);
            self.calls.push(format!("visible:{key}"));
            self.present.iter().any(|k| k == &key)
                || self.appeared(&key)
                || (self.revealed && self.hidden.iter().any(|k| k == &key))
        }

        fn click(&mut self, strategy: &Strategy) -> Result<(), StepError> {
            let key = key(strategy);
            self.calls.push(format!("click:{key}"));
            if self.fail_native_clicks {
                return Err(StepError("element not interactable".into()));
            }
            Ok(())
        }

        fn hover(&mut self, strategy: &Strategy) -> Result<(), StepError> {
            self.calls.push(format!("hover:{}", key(strategy)));
            Ok(())
        }

        fn type_text(&mut self, strategy: &Strategy, text: &str) -> Result<(), StepError> {
            let key = key(strategy);
            self.calls.push(format!("type:{key}"));
            if self.fail_native_typing {
                return Err(StepError("keystrokes did not register".into()));
            }
            self.values.insert(key, text.to_owned());
            Ok(())
        }

        fn read_value(&mut self, strategy: &Strategy) -> Result<String, StepError> {
            let key = key(strategy);
            self.calls.push(format!("read:{key}"));
            Ok(self.values.get(&key).cloned().unwrap_or_default())
        }

        fn click_scripted(&mut self, strategy: &Strategy) -> Result<(), StepError> {
            self.calls.push(format!("click-scripted:{}", key(strategy)));
            Ok(())
        }

        fn set_value_scripted(
            &mut self,
            strategy: &Strategy,
            text: &str,
        ) -> Result<bool, StepError> {
            let key = key(strategy);
            self.calls.push(format!("set-scripted:{key}"));
            self.values.insert(key, text.to_owned());
            Ok(true)
        }

        fn dispatch_pointer_events(&mut self, strategy: &Strategy) -> Result<(), StepError> {
            self.calls.push(format!("pointer-events:{}", key(strategy)));
            self.revealed = true;
            Ok(())
        }

        fn force_visible(&mut self, strategy: &Strategy) -> Result<(), StepError> {
            self.calls.push(format!("force-visible:{}", key(strategy)));
            self.revealed = true;
            Ok(())
        }
    }
}
