use headless_chrome;
use headless_chrome::protocol::cdp::{Emulation, Page};
use headless_chrome::{FetcherOptions, LaunchOptions};
use anyhow::anyhow;
use base64::Engine;
use thiserror::Error;
use url::Url;
use std::fmt;
use std::ops::Deref;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Script used to measure the full page height once navigation is done.
const SCROLL_HEIGHT_SCRIPT: &str = "document.body.scrollHeight";

/// Window height used at launch when the capture height is only known later.
const LAUNCH_HEIGHT: u32 = 1080;

#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("can't provide a Chromium binary: {0}")]
    Provision(#[source] anyhow::Error),
    #[error("can't launch browser: {0}")]
    Launch(#[source] anyhow::Error),
    #[error("can't navigate to {url}: {source}")]
    Navigation { url: String, source: anyhow::Error },
    #[error("can't evaluate page script: {0}")]
    Evaluation(#[source] anyhow::Error),
    #[error("page height is not a number: {0}")]
    PageHeight(String),
    #[error("can't set viewport: {0}")]
    Viewport(#[source] anyhow::Error),
    #[error("can't take screenshot: {0}")]
    Screenshot(#[source] anyhow::Error),
    #[error("screenshot is not valid base64: {0}")]
    Base64Error(#[from] base64::DecodeError),
}

pub type Result<T> = std::result::Result<T, BrowserError>;

impl BrowserError {
    /// True when the browser never came up, as opposed to a failure while
    /// working with a page.
    pub fn is_provisioning(&self) -> bool {
        matches!(self, BrowserError::Provision(_) | BrowserError::Launch(_))
    }
}

/// Steps of a capture, reported as each one starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Downloading,
    Navigating,
    SettingViewport,
    TakingScreenshot,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let line = match self {
            Stage::Downloading => "Downloading Chromium...",
            Stage::Navigating => "Navigating to the URL...",
            Stage::SettingViewport => "Setting viewport...",
            Stage::TakingScreenshot => "Taking screenshot...",
        };
        f.write_str(line)
    }
}

/// How to find and start the browser.
#[derive(Debug, Clone, Default)]
pub struct LaunchConfig {
    /// Explicit Chrome/Chromium binary, skips lookup and download.
    pub browser_path: Option<PathBuf>,
    pub window_size: Option<(u32, u32)>,
}

impl LaunchConfig {

    pub fn for_viewport(width: u32, height: Option<u32>) -> Self {
        Self {
            browser_path: None,
            window_size: Some((width, height.unwrap_or(LAUNCH_HEIGHT))),
        }
    }

    pub fn with_browser_path(mut self, path: Option<PathBuf>) -> Self {
        self.browser_path = path;
        self
    }
}

/// Where the browser binary comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserSource {
    Configured(PathBuf),
    Installed(PathBuf),
    /// Nothing installed, the pinned Chromium revision comes from the
    /// fetcher's cache, downloading it first if it isn't there yet.
    Fetched,
}

impl BrowserSource {

    pub fn locate(config: &LaunchConfig) -> Self {
        if let Some(path) = &config.browser_path {
            return BrowserSource::Configured(path.clone());
        }

        match headless_chrome::browser::default_executable() {
            Ok(path) => BrowserSource::Installed(path),
            Err(e) => {
                debug!(reason = %e, "no local Chromium found");
                BrowserSource::Fetched
            }
        }
    }

    fn path(&self) -> Option<PathBuf> {
        match self {
            BrowserSource::Configured(path) | BrowserSource::Installed(path) => Some(path.clone()),
            BrowserSource::Fetched => None,
        }
    }
}

pub struct Browser (headless_chrome::Browser);

impl Browser {

    /// Starts a headless browser. A fetched Chromium is first looked up in the
    /// cache only; `Stage::Downloading` is reported just before a download.
    pub fn launch(config: &LaunchConfig, source: &BrowserSource, progress: &dyn Fn(Stage)) -> Result<Self> {

        let browser = match source {
            BrowserSource::Fetched => fetch_and_start(|fetcher| Self::start(config, source, fetcher), progress)?,
            _ => Self::start(config, source, FetcherOptions::default()).map_err(BrowserError::Launch)?,
        };

        info!(?source, "browser launched");

        Ok(Self(browser))
    }

    fn start(config: &LaunchConfig, source: &BrowserSource, fetcher: FetcherOptions) -> anyhow::Result<headless_chrome::Browser> {

        let options = LaunchOptions::default_builder()
            .headless(true)
            .path(source.path())
            .window_size(config.window_size)
            .fetcher_options(fetcher)
            .build()
            .map_err(|e| anyhow!("invalid launch options: {}", e))?;

        headless_chrome::Browser::new(options)
    }

    fn url_to_tab(&self, url: &Url) -> Result<PageTab> {

        let navigation_error = |source: anyhow::Error| BrowserError::Navigation { url: url.to_string(), source };

        let tab = PageTab(self.0.new_tab().map_err(BrowserError::Launch)?);

        tab.navigate_to(url.as_str())
            .and_then(|tab| tab.wait_until_navigated())
            .map_err(navigation_error)?;

        debug!(%url, "navigation finished");

        Ok(tab)
    }

    /// Loads `url` and returns it as PNG bytes of `width` × `height`, the
    /// height defaulting to the page's full scroll height.
    pub fn screenshot(&self, url: &Url, width: u32, height: Option<u32>, progress: &dyn Fn(Stage)) -> Result<Vec<u8>> {

        progress(Stage::Navigating);
        let tab = self.url_to_tab(url)?;

        let height = match height {
            Some(height) => height,
            None => tab.scroll_height()?,
        };

        progress(Stage::SettingViewport);
        tab.set_viewport(width, height)?;

        progress(Stage::TakingScreenshot);
        let png = tab.capture_png(width, height)?;

        info!(width, height, bytes = png.len(), "screenshot taken");

        Ok(png)
    }
}

/// Starts from the fetcher cache when it already holds Chromium; otherwise
/// reports `Stage::Downloading` and starts again with downloads allowed.
fn fetch_and_start<B>(start: impl Fn(FetcherOptions) -> anyhow::Result<B>, progress: &dyn Fn(Stage)) -> Result<B> {

    match start(FetcherOptions::default().with_allow_download(false)) {
        Ok(browser) => Ok(browser),
        Err(e) => {
            debug!(error = %e, "no cached Chromium");
            progress(Stage::Downloading);
            start(FetcherOptions::default()).map_err(BrowserError::Provision)
        }
    }
}

/// A tab that is closed when it goes out of scope.
struct PageTab (Arc<headless_chrome::Tab>);

impl PageTab {

    fn scroll_height(&self) -> Result<u32> {

        let value = self.0
            .evaluate(SCROLL_HEIGHT_SCRIPT, false)
            .map_err(BrowserError::Evaluation)?
            .value;

        let height = parse_height(value.as_ref())?;
        debug!(height, "measured full page height");

        Ok(height)
    }

    fn set_viewport(&self, width: u32, height: u32) -> Result<()> {
        self.0
            .call_method(device_metrics(width, height))
            .map_err(BrowserError::Viewport)?;
        Ok(())
    }

    fn capture_png(&self, width: u32, height: u32) -> Result<Vec<u8>> {

        let data = self.0
            .call_method(screenshot_request(width, height))
            .map_err(BrowserError::Screenshot)?
            .data;

        Ok(base64::engine::general_purpose::STANDARD.decode(data)?)
    }
}

impl Deref for PageTab {
    type Target = headless_chrome::Tab;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Drop for PageTab {
    fn drop(&mut self) {
        if let Err(e) = self.0.close(true) {
            warn!(error = %e, "can't close tab");
        }
    }
}

/// Emulated viewport of exactly `width` × `height` CSS pixels at scale 1.
fn device_metrics(width: u32, height: u32) -> Emulation::SetDeviceMetricsOverride {
    Emulation::SetDeviceMetricsOverride {
        width,
        height,
        device_scale_factor: 1.0,
        mobile: false,
        scale: None,
        screen_width: None,
        screen_height: None,
        position_x: None,
        position_y: None,
        dont_set_visible_size: None,
        screen_orientation: None,
        viewport: None,
        display_feature: None,
        device_posture: None,
    }
}

/// PNG of the top-left `width` × `height` region, including whatever lies
/// past the visible window.
fn screenshot_request(width: u32, height: u32) -> Page::CaptureScreenshot {
    Page::CaptureScreenshot {
        format: Some(Page::CaptureScreenshotFormatOption::Png),
        quality: None,
        clip: Some(Page::Viewport {
            x: 0.0,
            y: 0.0,
            width: f64::from(width),
            height: f64::from(height),
            scale: 1.0,
        }),
        from_surface: Some(true),
        capture_beyond_viewport: Some(true),
        optimize_for_speed: None,
    }
}

/// Reads the value returned by the height script. Empty pages report 0,
/// which is clamped to a single pixel so the screenshot stays valid.
fn parse_height(value: Option<&serde_json::Value>) -> Result<u32> {

    let height = value
        .and_then(serde_json::Value::as_f64)
        .filter(|h| h.is_finite() && *h >= 0.0)
        .ok_or_else(|| BrowserError::PageHeight(format!("{:?}", value)))?;

    Ok((height.ceil() as u32).max(1))
}
