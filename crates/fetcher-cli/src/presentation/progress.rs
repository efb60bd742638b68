//! Progress bars for in-flight fetches.
//!
//! One bar per caller, rendered through a shared [`MultiProgress`]. Bars show
//! permille of the transfer so the same style works whether or not the total
//! size is known.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use url::Url;

use fetcher_core::{FetchError, FetchListener, FetchOutput, Progress};

const BAR_LENGTH: u64 = 1000;
const BAR_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] [{bar:30.cyan/blue}] {percent:>3}% {prefix} {msg}";

/// Terminal result of one caller, tagged with its URL.
pub type Completion = (Url, Result<FetchOutput, FetchError>);

/// Owns the bars and the channel results are collected on.
pub struct ProgressBoard {
    bars: MultiProgress,
    style: ProgressStyle,
    tx: mpsc::UnboundedSender<Completion>,
}

impl ProgressBoard {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Completion>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let style = ProgressStyle::with_template(BAR_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░");
        let board = Self {
            bars: MultiProgress::new(),
            style,
            tx,
        };
        (board, rx)
    }

    /// Hidden bars; used when output is not a terminal and in tests.
    pub fn hidden() -> (Self, mpsc::UnboundedReceiver<Completion>) {
        let (board, rx) = Self::new();
        board
            .bars
            .set_draw_target(indicatif::ProgressDrawTarget::hidden());
        (board, rx)
    }

    /// A listener with its own bar labelled by `url`.
    pub fn listener(&self, url: &Url) -> BarListener {
        let bar = self.bars.add(ProgressBar::new(BAR_LENGTH));
        bar.set_style(self.style.clone());
        bar.set_prefix(label(url));
        bar.set_message("waiting");
        BarListener {
            url: url.clone(),
            bar,
            tx: self.tx.clone(),
        }
    }

    /// Print a line without tearing the bars.
    pub fn println(&self, line: impl AsRef<str>) {
        if self.bars.println(line.as_ref()).is_err() {
            println!("{}", line.as_ref());
        }
    }
}

/// Last path segment, or the host for bare URLs.
fn label(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back().map(str::to_string))
        .filter(|segment| !segment.is_empty())
        .or_else(|| url.host_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string())
}

fn permille(fraction: f64) -> u64 {
    // Fractions are already clamped to [0, 1].
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let position = (fraction * BAR_LENGTH as f64).round() as u64;
    position.min(BAR_LENGTH)
}

/// [`FetchListener`] that drives one progress bar.
pub struct BarListener {
    url: Url,
    bar: ProgressBar,
    tx: mpsc::UnboundedSender<Completion>,
}

impl FetchListener for BarListener {
    fn on_progress(&self, progress: &Progress) {
        match progress {
            Progress::Loading => self.bar.set_message("loading"),
            Progress::Downloading { fraction } => {
                self.bar.set_message("downloading");
                self.bar.set_position(permille(*fraction));
            }
            Progress::Uploading { fraction } => {
                self.bar.set_message("uploading");
                self.bar.set_position(permille(*fraction));
            }
            Progress::Paused { fraction } => {
                self.bar.set_message("paused");
                self.bar.set_position(permille(*fraction));
            }
            Progress::Finished { .. } | Progress::Cancelled | Progress::Failed { .. } => {}
        }
    }

    fn on_complete(&self, result: Result<FetchOutput, FetchError>) {
        match &result {
            Ok(output) => {
                self.bar.set_position(BAR_LENGTH);
                self.bar
                    .finish_with_message(format!("done ({})", output.provenance()));
            }
            Err(FetchError::Cancelled) => self.bar.abandon_with_message("cancelled"),
            Err(e) => self.bar.abandon_with_message(format!("failed: {e}")),
        }
        let _ = self.tx.send((self.url.clone(), result));
    }
}
