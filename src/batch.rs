//! Fitting independent tracks on a pool of worker threads

use crate::event_data::BoundTrackParameters;
use crate::filters::{KalmanFitter, KalmanFitterOptions, KalmanFitterResult};
use crate::geometry::SurfaceRef;
use crate::propagator::Stepper;
use crate::types::SourceLink;
use crossbeam::channel;
use log::{debug, warn};

/// One track to fit.
#[derive(Clone, Debug)]
pub struct FitJob {
    pub source_links: Vec<SourceLink>,
    pub start: BoundTrackParameters,
    /// Surface sequence for a direct navigator
    pub sequence: Option<Vec<SurfaceRef>>,
}

impl FitJob {
    pub fn new(source_links: Vec<SourceLink>, start: BoundTrackParameters) -> Self {
        Self {
            source_links,
            start,
            sequence: None,
        }
    }

    pub fn with_sequence(mut self, sequence: Vec<SurfaceRef>) -> Self {
        self.sequence = Some(sequence);
        self
    }
}

/// Fit every job with the shared `fitter` and `options` on `workers` threads.
///
/// The results come back in job order. Failed fits keep their error in
/// [`KalmanFitterResult::result`].
pub fn fit_parallel<S: Stepper>(
    fitter: &KalmanFitter<S>,
    jobs: &[FitJob],
    options: &KalmanFitterOptions<'_>,
    workers: usize,
) -> Vec<KalmanFitterResult> {
    if jobs.is_empty() {
        return Vec::new();
    }
    let workers = workers.clamp(1, jobs.len());

    let (job_tx, job_rx) = channel::unbounded::<(usize, &FitJob)>();
    let (result_tx, result_rx) = channel::unbounded::<(usize, KalmanFitterResult)>();
    for item in jobs.iter().enumerate() {
        if job_tx.send(item).is_err() {
            break;
        }
    }
    drop(job_tx);

    crossbeam::scope(|scope| {
        for worker in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            scope.spawn(move |_| {
                let mut fitted = 0;
                for (index, job) in job_rx.iter() {
                    let result =
                        fitter.fit_raw(&job.source_links, &job.start, options, job.sequence.as_deref());
                    if let Err(e) = &result.result {
                        warn!("Track {} failed: {}", index, e);
                    }
                    if result_tx.send((index, result)).is_err() {
                        break;
                    }
                    fitted += 1;
                }
                debug!("Worker {} fitted {} tracks", worker, fitted);
            });
        }
    })
    .unwrap_or_else(|panic| std::panic::resume_unwind(panic));
    drop(result_tx);

    let mut results: Vec<Option<KalmanFitterResult>> = (0..jobs.len()).map(|_| None).collect();
    for (index, result) in result_rx.iter() {
        results[index] = Some(result);
    }
    results.into_iter().flatten().collect()
}
