use std::path::PathBuf;
use thiserror::Error;
use url::Url;

/// Viewport width used when none (or `0`) is given.
pub const DEFAULT_WIDTH: u32 = 1080;

const PNG_SUFFIX: &str = ".png";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RequestError {
    #[error("Invalid URL.")]
    InvalidUrl,
    #[error("No URL given")]
    MissingUrl,
}

pub type Result<T> = std::result::Result<T, RequestError>;

/// Everything needed for one capture, resolved from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    pub url: Url,
    pub width: u32,
    /// `None` means the full scrollable height, measured once the page is loaded.
    pub height: Option<u32>,
    pub output_path: PathBuf,
    pub open_after_save: bool,
}

/// Values given through named flags. They win over the positional ones.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub out: Option<String>,
    pub open: bool,
}

impl CaptureRequest {

    /// Builds a request from the positional form
    /// `<url> [width] [height] [filename] [open]`.
    ///
    /// The number of arguments decides how the fourth one is read: with
    /// five arguments it is always the filename, with exactly four it is the
    /// open flag when it is `"1"` or `"0"` and the filename otherwise.
    pub fn from_positional<S: AsRef<str>>(args: &[S]) -> Result<Self> {

        let arg = |i: usize| args.get(i).map(AsRef::as_ref);

        let url = parse_url(arg(0).ok_or(RequestError::MissingUrl)?)?;

        let width = normalize_width(arg(1).and_then(parse_pixels).unwrap_or(0));
        let height = normalize_height(arg(2).and_then(parse_pixels).unwrap_or(0));

        let (output_path, open_after_save) = match (arg(3), arg(4)) {
            (Some(filename), Some(flag)) => (normalize_filename(filename, &url), flag == "1"),
            (Some(flag @ ("1" | "0")), None) => (default_filename(&url), flag == "1"),
            (Some(filename), None) => (normalize_filename(filename, &url), false),
            (None, _) => (default_filename(&url), false),
        };

        Ok(Self { url, width, height, output_path, open_after_save })
    }

    pub fn with_overrides(mut self, overrides: &Overrides) -> Self {

        if let Some(width) = overrides.width {
            self.width = normalize_width(width);
        }
        if let Some(height) = overrides.height {
            self.height = normalize_height(height);
        }
        if let Some(out) = &overrides.out {
            self.output_path = normalize_filename(out, &self.url);
        }
        if overrides.open {
            self.open_after_save = true;
        }

        self
    }

    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }
}

/// Accepts absolute `http` and `https` URLs only.
pub fn parse_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim()).map_err(|_| RequestError::InvalidUrl)?;

    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        _ => Err(RequestError::InvalidUrl),
    }
}

fn parse_pixels(raw: &str) -> Option<u32> {
    raw.trim().parse().ok()
}

pub fn normalize_width(width: u32) -> u32 {
    if width == 0 { DEFAULT_WIDTH } else { width }
}

pub fn normalize_height(height: u32) -> Option<u32> {
    (height != 0).then_some(height)
}

/// `<host>.png`
pub fn default_filename(url: &Url) -> PathBuf {
    PathBuf::from(format!("{}{}", url.host_str().unwrap_or_default(), PNG_SUFFIX))
}

/// Blank names fall back to the default; `.png` is appended unless the
/// name already ends with it, in any case.
pub fn normalize_filename(name: &str, url: &Url) -> PathBuf {

    if name.trim().is_empty() {
        return default_filename(url);
    }

    if name.to_ascii_lowercase().ends_with(PNG_SUFFIX) {
        PathBuf::from(name)
    } else {
        PathBuf::from(format!("{}{}", name, PNG_SUFFIX))
    }
}
