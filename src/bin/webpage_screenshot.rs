use webpage_screenshot::browser::LaunchConfig;
use webpage_screenshot::request::{CaptureRequest, Overrides};
use webpage_screenshot::{capture, opener, Error, ErrorKind, Result};
use clap::{CommandFactory, Parser};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio;
use tracing::{debug, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const EXAMPLES: &str = "\
Examples:
  webpage_screenshot https://example.com
  webpage_screenshot https://example.com 1280 0
  webpage_screenshot https://example.com 1024 2000 screenshot.png 1";

/// Captures a screenshot of a webpage with a headless browser and saves it as PNG
#[derive(Parser, Debug)]
#[command(version, about, long_about = None, after_help = EXAMPLES)]
struct Args {
    /// URL to capture (must start with http:// or https://)
    url: Option<String>,

    /// Width of the viewport in pixels (default: 1080, 0 for default)
    #[arg(value_name = "WIDTH", allow_negative_numbers = true)]
    width_arg: Option<String>,

    /// Height of the viewport in pixels (default: full page, 0 for full page)
    #[arg(value_name = "HEIGHT", allow_negative_numbers = true)]
    height_arg: Option<String>,

    /// Output PNG file name (default: <domain>.png).
    /// With four arguments, a lone 1 or 0 here is read as OPEN instead
    #[arg(value_name = "FILENAME", allow_hyphen_values = true)]
    filename_arg: Option<String>,

    /// Set to 1 to open the image after saving (default: 0)
    #[arg(value_name = "OPEN", allow_hyphen_values = true)]
    open_arg: Option<String>,

    /// Anything after OPEN is ignored
    #[arg(hide = true, allow_hyphen_values = true)]
    ignored: Vec<String>,

    /// Viewport width, overrides WIDTH
    #[arg(long, value_name = "PX")]
    width: Option<u32>,

    /// Viewport height, overrides HEIGHT
    #[arg(long, value_name = "PX")]
    height: Option<u32>,

    /// Output file, overrides FILENAME
    #[arg(long, value_name = "FILE")]
    out: Option<String>,

    /// Open the image after saving
    #[arg(long)]
    open: bool,

    /// Chrome/Chromium binary to use instead of looking one up or downloading it
    #[arg(long, value_name = "PATH")]
    browser_path: Option<PathBuf>,

    /// More diagnostics on stderr (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {

    /// Positional arguments in order, stopping at the first missing one.
    fn positional(&self) -> Vec<&str> {
        [&self.url, &self.width_arg, &self.height_arg, &self.filename_arg, &self.open_arg]
            .into_iter()
            .map_while(|arg| arg.as_deref())
            .collect()
    }

    /// Without a URL there is nothing to capture, only usage to show.
    fn wants_usage(&self) -> bool {
        self.url.is_none()
    }

    fn overrides(&self) -> Overrides {
        Overrides {
            width: self.width,
            height: self.height,
            out: self.out.clone(),
            open: self.open,
        }
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn usage() -> String {
    Args::command().render_long_help().to_string()
}

/// The single line printed when a run fails.
fn report(e: &Error) -> String {
    match e.kind() {
        ErrorKind::Validation => e.to_string(),
        ErrorKind::Provisioning | ErrorKind::Capture => format!("Error fetching or rendering data: {}", e),
    }
}

async fn run(args: &Args) -> Result<()> {

    if !args.ignored.is_empty() {
        debug!(ignored = ?args.ignored, "extra arguments ignored");
    }

    let positional = args.positional();
    let request = CaptureRequest::from_positional(&positional[..])?
        .with_overrides(&args.overrides());

    info!(
        url = %request.url,
        width = request.width,
        height = ?request.height,
        output = %request.output_path.display(),
        "capture requested"
    );

    let config = LaunchConfig::for_viewport(request.width, request.height)
        .with_browser_path(args.browser_path.clone());

    let path = capture::run(request.clone(), config, |stage| println!("{}", stage)).await?;

    println!("Web page rendered and saved as {}", path.display());

    if request.open_after_save {
        if let Err(e) = opener::open_image(&path) {
            warn!(error = %e, path = %path.display(), "can't open image");
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {

    let args = Args::parse();

    init_logging(args.verbose);

    if args.wants_usage() {
        print!("{}", usage());
        return ExitCode::SUCCESS;
    }

    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            println!("{}", report(&e));
            ExitCode::FAILURE
        }
    }

}
