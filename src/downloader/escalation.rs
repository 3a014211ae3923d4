// Variant escalation
//
// Drives `extract` across the fixed variant list. Each failure is reduced to a
// `FailureKind` and fed to `decide`, a pure function that says whether to try
// the next variant or stop. A backend "success" only counts when the output
// resolver can find the file it produced.

use std::path::Path;
use std::time::{Duration, SystemTime};

use tokio_util::sync::CancellationToken;

use super::errors::{DownloadError, FailureKind};
use super::models::{ExtractionOptions, ExtractionRequest, ExtractionVariant, ResolvedFile, DEFAULT_VARIANTS};
use super::resolver::OutputResolver;
use super::summary::ElapsedTable;
use super::traits::{ExtractionBackend, ProgressSink};

/// What to do after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Stream negotiation failed; another client strategy may work
    NextVariantTransient,
    /// Unclassified failure; still worth trying the next variant
    NextVariant,
    /// Transport failure; hand over to transport-level fallback
    Abort,
    Cancel,
}

pub fn decide(kind: FailureKind) -> Decision {
    match kind {
        FailureKind::TransientIncompatibility => Decision::NextVariantTransient,
        FailureKind::Transport => Decision::Abort,
        FailureKind::Canceled => Decision::Cancel,
        FailureKind::NoOutput | FailureKind::Other => Decision::NextVariant,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EscalationPolicy {
    pub transient_delay: Duration,
    pub other_delay: Duration,
    /// Upper bound of random extra delay, as a fraction of the base delay
    pub jitter: f64,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            transient_delay: Duration::from_millis(400),
            other_delay: Duration::from_millis(500),
            jitter: 0.25,
        }
    }
}

impl EscalationPolicy {
    /// No waiting between attempts
    pub fn immediate() -> Self {
        Self {
            transient_delay: Duration::ZERO,
            other_delay: Duration::ZERO,
            jitter: 0.0,
        }
    }

    pub fn delay_for(&self, decision: Decision) -> Duration {
        let base = match decision {
            Decision::NextVariantTransient => self.transient_delay,
            Decision::NextVariant => self.other_delay,
            Decision::Abort | Decision::Cancel => return Duration::ZERO,
        };
        if base.is_zero() || self.jitter <= 0.0 {
            return base;
        }
        base.mul_f64(1.0 + rand::random::<f64>() * self.jitter)
    }
}

#[derive(Debug)]
pub enum EscalationOutcome {
    Succeeded(ResolvedFile),
    ExhaustedAllVariants {
        attempts: usize,
        last_error: DownloadError,
    },
    AbortedTransportError(DownloadError),
    Canceled,
}

/// One URL's escalation inputs
pub struct EscalationJob<'a> {
    pub url: &'a str,
    pub format_selector: &'a str,
    pub output_dir: &'a Path,
    pub options: &'a ExtractionOptions,
}

pub struct VariantEscalation {
    variants: Vec<ExtractionVariant>,
    policy: EscalationPolicy,
    resolver: OutputResolver,
}

impl Default for VariantEscalation {
    fn default() -> Self {
        Self::new(DEFAULT_VARIANTS.to_vec())
    }
}

impl VariantEscalation {
    pub fn new(variants: Vec<ExtractionVariant>) -> Self {
        Self {
            variants,
            policy: EscalationPolicy::default(),
            resolver: OutputResolver::default(),
        }
    }

    pub fn with_policy(mut self, policy: EscalationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub async fn run(
        &self,
        backend: &dyn ExtractionBackend,
        job: &EscalationJob<'_>,
        progress: &dyn ProgressSink,
        elapsed: &ElapsedTable,
        cancel: &CancellationToken,
    ) -> EscalationOutcome {
        let total = self.variants.len();
        let mut last_error = DownloadError::Unknown("no variants configured".to_string());
        let mut attempts = 0;

        for (idx, variant) in self.variants.iter().enumerate() {
            if cancel.is_cancelled() {
                return EscalationOutcome::Canceled;
            }
            attempts += 1;
            tracing::info!(
                backend = backend.name(),
                variant = %variant,
                attempt = idx + 1,
                total,
                "extracting"
            );

            let request = ExtractionRequest {
                url: job.url,
                variant: *variant,
                format_selector: job.format_selector,
                output_dir: job.output_dir,
                options: job.options,
            };
            let started = SystemTime::now();

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(DownloadError::Canceled),
                r = backend.extract(&request, progress) => r,
            };
            progress.finish();

            let error = match result {
                Ok(output) => match self.resolver.resolve(&output, job.output_dir) {
                    Some(file) => {
                        tracing::info!(variant = %variant, path = %file.path.display(), "extraction succeeded");
                        elapsed.record(&file.path, output.elapsed);
                        return EscalationOutcome::Succeeded(file);
                    }
                    None => {
                        tracing::warn!(variant = %variant, "backend reported success but no output file was found");
                        DownloadError::NoOutputProduced
                    }
                },
                Err(e) => e,
            };

            let decision = decide(error.kind());
            match decision {
                Decision::Cancel => {
                    remove_partials(job.output_dir, started);
                    return EscalationOutcome::Canceled;
                }
                Decision::Abort => {
                    tracing::warn!(variant = %variant, error = %error, "transport error, aborting escalation");
                    return EscalationOutcome::AbortedTransportError(error);
                }
                Decision::NextVariantTransient | Decision::NextVariant => {
                    tracing::warn!(variant = %variant, error = %error, "variant failed");
                    last_error = error;
                    if idx + 1 < total {
                        let delay = self.policy.delay_for(decision);
                        if !delay.is_zero() {
                            tokio::select! {
                                _ = cancel.cancelled() => return EscalationOutcome::Canceled,
                                _ = tokio::time::sleep(delay) => {}
                            }
                        }
                    }
                }
            }
        }

        EscalationOutcome::ExhaustedAllVariants {
            attempts,
            last_error,
        }
    }
}

/// Drop in-progress backend files written since `since`
fn remove_partials(dir: &Path, since: SystemTime) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if !(name.ends_with(".part") || name.ends_with(".ytdl")) {
            continue;
        }
        let fresh = entry
            .metadata()
            .and_then(|m| m.modified())
            .map_or(false, |m| m >= since);
        if fresh && std::fs::remove_file(&path).is_ok() {
            tracing::debug!(path = %path.display(), "removed partial file");
        }
    }
}
