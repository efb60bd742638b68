//! Transfer progress state machine.
//!
//! ```text
//! loading ─► downloading(f) ⇄ paused ─► finished(artifact)
//!        └─► uploading(f)   ⇄ paused ─► cancelled
//!                                     └► failed(error)
//! ```
//!
//! `loading` is initial; `finished`, `cancelled` and `failed` are terminal.
//! Every method returns `Some(next)` when the transition is taken and `None`
//! when the input is ignored, so callers fan out only real changes.

use serde::{Deserialize, Serialize};

use super::artifact::Artifact;
use super::errors::FetchError;
use super::types::TransferKind;

/// Observable state of one transfer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Progress {
    Loading,
    Downloading { fraction: f64 },
    Uploading { fraction: f64 },
    /// Suspended; remembers the fraction reached so resuming never regresses.
    Paused { fraction: f64 },
    Finished { artifact: Box<Artifact> },
    Cancelled,
    Failed { error: FetchError },
}

/// Clamp a transport-reported fraction into `[0.0, 1.0]`; NaN counts as zero.
fn clamp_fraction(fraction: f64) -> f64 {
    if fraction.is_nan() {
        0.0
    } else {
        fraction.clamp(0.0, 1.0)
    }
}

const fn running(kind: TransferKind, fraction: f64) -> Progress {
    match kind {
        TransferKind::Download => Progress::Downloading { fraction },
        TransferKind::Upload => Progress::Uploading { fraction },
    }
}

impl Progress {
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Finished { .. } | Self::Cancelled | Self::Failed { .. }
        )
    }

    #[must_use]
    pub const fn is_paused(&self) -> bool {
        matches!(self, Self::Paused { .. })
    }

    /// Fraction completed, for states that carry one.
    #[must_use]
    pub const fn fraction(&self) -> Option<f64> {
        match self {
            Self::Downloading { fraction }
            | Self::Uploading { fraction }
            | Self::Paused { fraction } => Some(*fraction),
            _ => None,
        }
    }

    /// Short state name for logs and summaries.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::Downloading { .. } => "downloading",
            Self::Uploading { .. } => "uploading",
            Self::Paused { .. } => "paused",
            Self::Finished { .. } => "finished",
            Self::Cancelled => "cancelled",
            Self::Failed { .. } => "failed",
        }
    }

    /// The transport accepted the request: `loading → downloading(0.0)`.
    #[must_use]
    pub const fn accept(&self, kind: TransferKind) -> Option<Self> {
        match self {
            Self::Loading => Some(running(kind, 0.0)),
            _ => None,
        }
    }

    /// Byte-level progress reported by the transport.
    ///
    /// Lower or equal fractions are ignored so listeners never observe a
    /// regression. Reports that arrive while paused are ignored too; the
    /// fraction is picked up again on resume.
    #[must_use]
    pub fn report(&self, kind: TransferKind, fraction: f64) -> Option<Self> {
        let fraction = clamp_fraction(fraction);
        match (self, kind) {
            (Self::Loading, _) => Some(running(kind, fraction)),
            (Self::Downloading { fraction: current }, TransferKind::Download)
            | (Self::Uploading { fraction: current }, TransferKind::Upload) => {
                (fraction > *current).then(|| running(kind, fraction))
            }
            _ => None,
        }
    }

    /// Explicit pause toggle.
    #[must_use]
    pub const fn pause(&self) -> Option<Self> {
        match self {
            Self::Downloading { fraction } | Self::Uploading { fraction } => {
                Some(Self::Paused {
                    fraction: *fraction,
                })
            }
            _ => None,
        }
    }

    /// Resume from pause with the fraction the transport reports at resume time.
    ///
    /// A resume callback for a transfer that is not paused is treated as an
    /// ordinary progress report.
    #[must_use]
    pub fn resume(&self, kind: TransferKind, fraction: f64) -> Option<Self> {
        match self {
            Self::Paused { fraction: current } => {
                Some(running(kind, clamp_fraction(fraction).max(*current)))
            }
            _ => self.report(kind, fraction),
        }
    }

    /// Move to a terminal state. Terminal states never change again.
    #[must_use]
    pub fn terminate(&self, next: Self) -> Option<Self> {
        (!self.is_terminal() && next.is_terminal()).then_some(next)
    }
}
