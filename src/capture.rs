use crate::browser::{self, Browser, BrowserError, BrowserSource, LaunchConfig, Stage};
use crate::request::CaptureRequest;
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;
use url::Url;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error(transparent)]
    Browser(#[from] BrowserError),
    #[error("can't write {}: {source}", path.display())]
    Write { path: PathBuf, source: std::io::Error },
    #[error("Task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, CaptureError>;

/// Something that can turn a URL into PNG bytes, reporting each [`Stage`] it starts.
pub trait PageCapture {
    fn capture_png(&self, url: &Url, width: u32, height: Option<u32>, progress: &dyn Fn(Stage)) -> browser::Result<Vec<u8>>;
}

impl PageCapture for Browser {
    fn capture_png(&self, url: &Url, width: u32, height: Option<u32>, progress: &dyn Fn(Stage)) -> browser::Result<Vec<u8>> {
        self.screenshot(url, width, height, progress)
    }
}

/// Captures the requested page and writes it to the request's output path,
/// replacing any file already there. Nothing is written unless the capture
/// succeeded.
pub fn save_screenshot<C: PageCapture + ?Sized>(capturer: &C, request: &CaptureRequest, progress: &dyn Fn(Stage)) -> Result<PathBuf> {

    let png = capturer.capture_png(&request.url, request.width, request.height, progress)?;

    let path = request.output_path.clone();
    std::fs::write(&path, &png).map_err(|source| CaptureError::Write { path: path.clone(), source })?;

    info!(path = %path.display(), bytes = png.len(), "screenshot written");

    Ok(path)
}

/// Provisions and launches a browser, then saves the screenshot. The browser
/// process is gone by the time this returns.
pub fn capture_with_browser(request: &CaptureRequest, config: &LaunchConfig, progress: &dyn Fn(Stage)) -> Result<PathBuf> {

    let source = BrowserSource::locate(config);
    let browser = Browser::launch(config, &source, progress)?;

    save_screenshot(&browser, request, progress)
}

/// Runs the blocking capture chain off the async runtime.
pub async fn run<F>(request: CaptureRequest, config: LaunchConfig, progress: F) -> Result<PathBuf>
where
    F: Fn(Stage) + Send + 'static,
{
    tokio::task::spawn_blocking(move || capture_with_browser(&request, &config, &progress)).await?
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::cell::{Cell, RefCell};
    use tempfile::TempDir;

    const FAKE_PNG: &[u8] = b"\x89PNG\r\n\x1a\nfake";

    struct FakeCapture {
        fail_navigation: bool,
        seen: Cell<Option<(u32, Option<u32>)>>,
    }

    impl FakeCapture {
        fn new(fail_navigation: bool) -> Self {
            Self { fail_navigation, seen: Cell::new(None) }
        }
    }

    impl PageCapture for FakeCapture {
        fn capture_png(&self, url: &Url, width: u32, height: Option<u32>, progress: &dyn Fn(Stage)) -> browser::Result<Vec<u8>> {
            self.seen.set(Some((width, height)));
            progress(Stage::Navigating);
            if self.fail_navigation {
                return Err(BrowserError::Navigation {
                    url: url.to_string(),
                    source: anyhow!("net::ERR_NAME_NOT_RESOLVED"),
                });
            }
            progress(Stage::SettingViewport);
            progress(Stage::TakingScreenshot);
            Ok(FAKE_PNG.to_vec())
        }
    }

    fn quiet(_: Stage) {}

    fn request_in(dir: &TempDir, args: &[&str]) -> CaptureRequest {
        let mut request = CaptureRequest::from_positional(args).unwrap();
        request.output_path = dir.path().join(&request.output_path);
        request
    }

    #[test]
    fn writes_png_to_output_path() {
        let dir = TempDir::new().unwrap();
        let request = request_in(&dir, &["https://example.com", "1024", "2000", "screenshot.png"]);
        let capture = FakeCapture::new(false);

        let path = save_screenshot(&capture, &request, &quiet).unwrap();

        assert_eq!(path, dir.path().join("screenshot.png"));
        assert_eq!(std::fs::read(&path).unwrap(), FAKE_PNG);
        assert_eq!(capture.seen.get(), Some((1024, Some(2000))));
    }

    #[test]
    fn full_page_height_is_left_to_the_capturer() {
        let dir = TempDir::new().unwrap();
        let request = request_in(&dir, &["https://example.com"]);
        let capture = FakeCapture::new(false);

        save_screenshot(&capture, &request, &quiet).unwrap();

        assert_eq!(capture.seen.get(), Some((1080, None)));
        assert!(dir.path().join("example.com.png").is_file());
    }

    #[test]
    fn stages_reach_the_caller() {
        let dir = TempDir::new().unwrap();
        let request = request_in(&dir, &["https://example.com"]);
        let stages = RefCell::new(Vec::new());

        save_screenshot(&FakeCapture::new(false), &request, &|stage| stages.borrow_mut().push(stage)).unwrap();

        assert_eq!(
            stages.into_inner(),
            [Stage::Navigating, Stage::SettingViewport, Stage::TakingScreenshot]
        );
    }

    #[test]
    fn overwrites_existing_file() {
        let dir = TempDir::new().unwrap();
        let request = request_in(&dir, &["https://example.com", "800", "600", "page"]);
        std::fs::write(&request.output_path, b"old contents that are longer than the new ones").unwrap();

        save_screenshot(&FakeCapture::new(false), &request, &quiet).unwrap();

        assert_eq!(std::fs::read(&request.output_path).unwrap(), FAKE_PNG);
    }

    #[test]
    fn navigation_failure_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let request = request_in(&dir, &["https://unreachable.invalid"]);
        let stages = RefCell::new(Vec::new());

        let err = save_screenshot(&FakeCapture::new(true), &request, &|stage| stages.borrow_mut().push(stage)).unwrap_err();

        assert!(matches!(err, CaptureError::Browser(BrowserError::Navigation { .. })));
        assert!(err.to_string().contains("ERR_NAME_NOT_RESOLVED"));
        assert!(!request.output_path.exists());
        assert_eq!(stages.into_inner(), [Stage::Navigating]);
    }

    #[test]
    fn write_failure_names_the_path() {
        let dir = TempDir::new().unwrap();
        let mut request = request_in(&dir, &["https://example.com"]);
        request.output_path = dir.path().join("missing").join("shot.png");

        let err = save_screenshot(&FakeCapture::new(false), &request, &quiet).unwrap_err();

        assert!(matches!(err, CaptureError::Write { .. }));
        assert!(err.to_string().contains("shot.png"));
    }

    #[tokio::test]
    #[ignore = "needs Chromium and network access"]
    async fn unreachable_host_through_real_browser() {
        let dir = TempDir::new().unwrap();
        let request = request_in(&dir, &["https://unreachable.invalid", "800", "600"]);
        let config = LaunchConfig::for_viewport(request.width, request.height);

        let err = run(request.clone(), config, quiet).await.unwrap_err();

        assert!(matches!(err, CaptureError::Browser(BrowserError::Navigation { .. })));
        assert!(!request.output_path.exists());
    }
}
