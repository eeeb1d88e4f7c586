//! Headless-browser session for the financial-data site.
//!
//! One session lives for a whole ticker run: it logs in once, then serves
//! every browse tool call. The orchestrator owns the session through the
//! agent context and closes it on every exit path.

use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use thiserror::Error;

const SITE_BASE: &str = "https://stockanalysis.com";
const LOGIN_ATTEMPTS: u32 = 2;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("failed to launch browser: {0}")]
    Launch(String),

    /// Authentication failed after the retry. Fatal for the ticker run.
    #[error("login failed after {LOGIN_ATTEMPTS} attempts")]
    LoginFailed,

    #[error("navigation failed for {url}: {message}")]
    NavigationFailed { url: String, message: String },

    #[error("browser protocol error: {0}")]
    Cdp(String),
}

impl From<chromiumoxide::error::CdpError> for BrowserError {
    fn from(e: chromiumoxide::error::CdpError) -> Self {
        BrowserError::Cdp(e.to_string())
    }
}

/// Statement page selector, mirrored by the browse tool's enums.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementType {
    Income,
    Balance,
    Cashflow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Annual,
    Quarterly,
}

/// Build the statement-page URL for a ticker.
///
/// Income statements have no extra path segment; quarterly and
/// as-reported views are query parameters.
pub fn build_financials_url(
    ticker: &str,
    statement: StatementType,
    period: Period,
    as_reported: bool,
) -> String {
    let path = match statement {
        StatementType::Income => "",
        StatementType::Balance => "/balance-sheet",
        StatementType::Cashflow => "/cash-flow-statement",
    };

    let mut params = Vec::new();
    if period == Period::Quarterly {
        params.push("p=quarterly");
    }
    if as_reported {
        params.push("type=as-reported");
    }

    let mut url = format!(
        "{}/stocks/{}/financials{}/",
        SITE_BASE,
        ticker.to_lowercase(),
        path
    );
    if !params.is_empty() {
        url.push('?');
        url.push_str(&params.join("&"));
    }
    url
}

/// A logged-in headless browser pointed at the financial-data site.
pub struct SiteBrowser {
    browser: Browser,
    page: Page,
    username: String,
    password: String,
    logged_in: bool,
    latest_screenshot: Option<Vec<u8>>,
}

impl SiteBrowser {
    /// Launch headless Chromium and open a blank page.
    pub async fn launch(username: String, password: String) -> Result<Self, BrowserError> {
        let config = BrowserConfig::builder()
            .window_size(1920, 1080)
            .build()
            .map_err(BrowserError::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::warn!("browser event error: {}", e);
                }
            }
        });

        let page = browser.new_page("about:blank").await?;

        Ok(Self {
            browser,
            page,
            username,
            password,
            logged_in: false,
            latest_screenshot: None,
        })
    }

    /// Log in, retrying once. Saves a debug screenshot on each failed
    /// attempt; the second failure is fatal.
    pub async fn ensure_logged_in(&mut self) -> Result<(), BrowserError> {
        if self.logged_in {
            return Ok(());
        }

        for attempt in 1..=LOGIN_ATTEMPTS {
            tracing::info!(attempt, "logging in to financial-data site");
            match self.try_login().await {
                Ok(true) => {
                    self.logged_in = true;
                    tracing::info!("login successful");
                    return Ok(());
                }
                Ok(false) => {
                    tracing::warn!(attempt, "still on login page after submit");
                    self.save_debug_screenshot(&format!("login_debug_attempt_{}", attempt))
                        .await;
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "login attempt errored");
                    self.save_debug_screenshot(&format!("login_error_attempt_{}", attempt))
                        .await;
                }
            }
        }

        Err(BrowserError::LoginFailed)
    }

    /// One login attempt. Ok(true) when the URL left the login path.
    async fn try_login(&mut self) -> Result<bool, BrowserError> {
        let login_url = format!("{}/login/", SITE_BASE);
        self.page.goto(login_url.as_str()).await?;
        self.page.wait_for_navigation().await?;

        // Fields are addressed by their stable ids, the submit control by
        // its accessible name: the site's button has no type="submit".
        let email = self.page.find_element("input#email").await?;
        email.click().await?;
        email.type_str(&self.username).await?;

        let password = self.page.find_element("input#password").await?;
        password.click().await?;
        password.type_str(&self.password).await?;

        let submit = self
            .page
            .find_xpath("//button[normalize-space(.)='Log In']")
            .await?;
        submit.click().await?;

        // Wait for navigation away from /login/.
        for _ in 0..20 {
            tokio::time::sleep(Duration::from_millis(500)).await;
            if let Some(url) = self.page.url().await? {
                if !url.to_lowercase().contains("login") {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Navigate to a statement page, switch the display to raw units, and
    /// capture a full-page screenshot into the session cache.
    pub async fn navigate_to_financials(
        &mut self,
        ticker: &str,
        statement: StatementType,
        period: Period,
    ) -> Result<String, BrowserError> {
        self.ensure_logged_in().await?;

        let url = build_financials_url(ticker, statement, period, true);
        tracing::info!(%url, "navigating to financials page");

        let navigate = async {
            self.page.goto(url.as_str()).await?;
            self.page.wait_for_navigation().await?;

            // The data table renders after hydration.
            let mut found = false;
            for _ in 0..20 {
                if self.page.find_element("table").await.is_ok() {
                    found = true;
                    break;
                }
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
            if !found {
                tracing::warn!(%url, "data table not found, continuing to screenshot");
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok::<(), BrowserError>(())
        };

        if let Err(e) = navigate.await {
            self.save_debug_screenshot(&format!("nav_error_{}", ticker.to_lowercase()))
                .await;
            return Err(BrowserError::NavigationFailed {
                url,
                message: e.to_string(),
            });
        }

        self.select_raw_units().await;

        let shot = self.capture_full_page().await?;
        let debug_name = format!(
            "{}_{:?}_{:?}",
            ticker.to_lowercase(),
            statement,
            period
        )
        .to_lowercase();
        let _ = std::fs::write(
            std::env::temp_dir().join(format!("{}.png", debug_name)),
            &shot,
        );
        self.latest_screenshot = Some(shot);

        Ok(url)
    }

    /// Switch the number-units dropdown to "Raw" so values are absolute
    /// integers. Silent when the control is absent or already raw.
    async fn select_raw_units(&self) {
        let dropdown = match self
            .page
            .find_element(r#"button[title="Change number units"]"#)
            .await
        {
            Ok(el) => el,
            Err(e) => {
                tracing::warn!("units dropdown not found: {}", e);
                return;
            }
        };
        if dropdown.click().await.is_err() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;

        match self
            .page
            .find_xpath("//button[contains(normalize-space(.), 'Raw')]")
            .await
        {
            Ok(raw) => {
                if raw.click().await.is_ok() {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    tracing::debug!("selected raw number units");
                }
            }
            Err(e) => tracing::warn!("could not select raw units: {}", e),
        }
    }

    async fn capture_full_page(&self) -> Result<Vec<u8>, BrowserError> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(true)
            .build();
        Ok(self.page.screenshot(params).await?)
    }

    /// The most recent full-page screenshot, if any navigation happened.
    pub fn latest_screenshot(&self) -> Option<&[u8]> {
        self.latest_screenshot.as_deref()
    }

    async fn save_debug_screenshot(&self, name: &str) {
        if let Ok(bytes) = self.capture_full_page().await {
            let path = std::env::temp_dir().join(format!("{}.png", name));
            if std::fs::write(&path, bytes).is_ok() {
                tracing::debug!(path = %path.display(), "saved debug screenshot");
            }
        }
    }

    /// Tear the session down. Errors are logged, not propagated; close is
    /// called on failure paths where the original error matters more.
    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            tracing::warn!("error closing browser: {}", e);
        }
        let _ = self.browser.wait().await;
        tracing::info!("browser session closed");
    }
}
