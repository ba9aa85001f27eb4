use anyhow::{Context, Result};
use headless_chrome::browser::default_executable;
use headless_chrome::protocol::cdp::Network::GetResponseBodyReturnObject;
use headless_chrome::protocol::cdp::Network::events::ResponseReceivedEventParams;
use headless_chrome::{Browser, LaunchOptions};
use std::sync::mpsc;
use std::time::Duration;
use tracing::{debug, warn};

/// Loads a page in a headless browser and hands back the body of the first
/// network response whose URL contains a pattern.
///
/// Each call launches its own browser. The browser is owned by the call frame,
/// so it is shut down on every return path including errors and timeouts.
#[derive(Debug, Clone)]
pub struct ResponseCapture {
    timeout: Duration,
    headless: bool,
}

impl ResponseCapture {
    pub fn new(timeout: Duration, headless: bool) -> Self {
        Self { timeout, headless }
    }

    /// Returns `Ok(None)` when nothing matched before the timeout.
    pub fn capture(&self, url: &str, pattern: &str) -> Result<Option<String>> {
        let launch_options = LaunchOptions {
            headless: self.headless,
            sandbox: true,
            path: default_executable().ok(),
            ..Default::default()
        };

        let browser = Browser::new(launch_options)
            .context("Failed to launch Chrome. Make sure Chrome or Chromium is installed.")?;
        let tab = browser.new_tab().context("Failed to create new browser tab")?;

        let (tx, rx) = mpsc::sync_channel::<String>(1);
        let needle = pattern.to_string();
        tab.register_response_handling(
            "response-capture",
            Box::new(
                move |params: ResponseReceivedEventParams,
                      fetch_body: &dyn Fn() -> Result<GetResponseBodyReturnObject>| {
                    if !params.response.url.contains(&needle) {
                        return;
                    }
                    match fetch_body() {
                        Ok(body) if !body.base_64_encoded => {
                            // Only the first match matters; later ones find the slot full.
                            let _ = tx.try_send(body.body);
                        }
                        Ok(_) => debug!(url = %params.response.url, "skipping binary response"),
                        Err(e) => debug!(url = %params.response.url, "could not read response body: {}", e),
                    }
                },
            ),
        )
        .context("Failed to register response handler")?;

        debug!(url, pattern, "navigating");
        tab.navigate_to(url)
            .with_context(|| format!("Failed to navigate to {}", url))?;

        match rx.recv_timeout(self.timeout) {
            Ok(body) => Ok(Some(body)),
            Err(_) => {
                warn!(url, pattern, "no matching response within {:?}", self.timeout);
                Ok(None)
            }
        }
    }
}
