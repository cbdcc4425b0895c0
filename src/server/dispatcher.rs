//! Per-request orchestration.
//!
//! [`ShardService::handle`] drives one request through
//! `Idle → Unpacking → (ProbeBranch) → Computing → Dispersing → Packing → Done`,
//! or into `Failed` from `Unpacking` or `Computing`. Every path ends with a
//! well-formed response that echoes the correlation id.

use std::sync::Arc;

use metrics::{counter, histogram};
use tracing::{debug, trace};

use crate::constants::metric_names::{
    DISPERSION_DELAY_US, PROBES_TOTAL, PROBE_UNAVAILABLE_TOTAL, REQUESTS_FAILED_TOTAL,
    REQUESTS_TOTAL, STAGE_DURATION_US,
};
use crate::error::RequestError;
use crate::model::RatingEngine;
use crate::server::codec;
use crate::server::dispersion::DispersionDelay;
use crate::server::metrics::ShardStats;
use crate::server::proto;
use crate::telemetry::{
    measure, utilization_percent, CpuTimeSampler, MonotonicClock, Stage, TimeSource,
    TimingRecord, UtilizationReporter, UtilizationSample,
};
use crate::types::CorrelationId;

/// Lifecycle of a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Idle,
    Unpacking,
    ProbeBranch,
    Computing,
    Dispersing,
    Packing,
    Done,
    Failed,
}

impl DispatchState {
    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(self, next: DispatchState) -> bool {
        use DispatchState::*;
        matches!(
            (self, next),
            (Idle, Unpacking)
                | (Unpacking, ProbeBranch)
                | (Unpacking, Computing)
                | (Unpacking, Failed)
                | (ProbeBranch, Computing)
                | (Computing, Dispersing)
                | (Computing, Failed)
                | (Dispersing, Packing)
                | (Packing, Done)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, DispatchState::Done | DispatchState::Failed)
    }
}

/// State machine owned by one request; never shared.
#[derive(Debug)]
struct Lifecycle {
    id: CorrelationId,
    state: DispatchState,
}

impl Lifecycle {
    fn new(id: CorrelationId) -> Self {
        Self {
            id,
            state: DispatchState::Idle,
        }
    }

    fn advance(&mut self, next: DispatchState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {:?} -> {:?}",
            self.state,
            next
        );
        trace!("Request {} {:?} -> {:?}", self.id, self.state, next);
        self.state = next;
    }
}

/// The shard's request handler. Shared by every worker.
pub struct ShardService {
    engine: Arc<dyn RatingEngine>,
    sampler: Arc<dyn CpuTimeSampler>,
    reporter: UtilizationReporter,
    delay: DispersionDelay,
    clock: Arc<dyn TimeSource>,
    stats: Arc<ShardStats>,
}

impl ShardService {
    pub fn new(
        engine: Arc<dyn RatingEngine>,
        sampler: Arc<dyn CpuTimeSampler>,
        delay: DispersionDelay,
    ) -> Self {
        Self {
            engine,
            reporter: UtilizationReporter::new(Arc::clone(&sampler)),
            sampler,
            delay,
            clock: Arc::new(MonotonicClock::new()),
            stats: Arc::new(ShardStats::new()),
        }
    }

    /// Replace the stage clock.
    pub fn with_clock(mut self, clock: Arc<dyn TimeSource>) -> Self {
        self.clock = clock;
        self
    }

    pub fn stats(&self) -> &Arc<ShardStats> {
        &self.stats
    }

    pub fn engine(&self) -> &Arc<dyn RatingEngine> {
        &self.engine
    }

    /// Serve one request to completion. Blocks the calling thread for the
    /// dispersion delay, so call it from a worker that may block.
    pub fn handle(&self, request: proto::CfRequest) -> proto::CfResponse {
        let id = CorrelationId(request.request_id);
        let span = crate::request_span!(id.value());
        let _entered = span.enter();

        self.stats.request_started();
        counter!(REQUESTS_TOTAL).increment(1);

        let mut lifecycle = Lifecycle::new(id);
        let mut timing = TimingRecord::default();
        let cpu_start = self.sampler.sample().ok();

        lifecycle.advance(DispatchState::Unpacking);
        let (unpacked, unpack_us) = measure(&*self.clock, || codec::unpack_request(&request));
        timing.record(Stage::Unpack, unpack_us);
        let unpacked = match unpacked {
            Ok(u) => u,
            Err(e) => return self.fail(lifecycle, &e, None, timing),
        };

        let query = unpacked.kind.query();
        span.record("user_id", query.user.0);
        span.record("item_id", query.item.0);
        span.record("probe", unpacked.kind.is_probe());

        let utilization = if unpacked.kind.is_probe() {
            lifecycle.advance(DispatchState::ProbeBranch);
            let sample = self.reporter.report();
            self.stats.record_probe(sample.is_some());
            counter!(PROBES_TOTAL).increment(1);
            if sample.is_none() {
                counter!(PROBE_UNAVAILABLE_TOTAL).increment(1);
            }
            sample
        } else {
            None
        };

        // Computed for probes as well, so both request kinds cost the same.
        lifecycle.advance(DispatchState::Computing);
        let (rating, compute_us) = measure(&*self.clock, || self.engine.predict(query));
        timing.record(Stage::Compute, compute_us);
        let rating = match rating {
            Ok(r) => r,
            Err(e) => return self.fail(lifecycle, &e, utilization, timing),
        };

        lifecycle.advance(DispatchState::Dispersing);
        let waited_us = self.delay.stall(&*self.clock);
        histogram!(DISPERSION_DELAY_US).record(waited_us as f64);

        lifecycle.advance(DispatchState::Packing);
        let (mut response, pack_us) = measure(&*self.clock, || {
            codec::pack_response(id, rating, utilization)
        });
        timing.record(Stage::Pack, pack_us);
        timing.cpu_util_percent = self.utilization_delta(cpu_start);
        codec::attach_timing(&mut response, &timing);

        lifecycle.advance(DispatchState::Done);
        record_stage_durations(&timing);
        span.record("outcome", "ok");
        self.stats.request_finished(false);

        response
    }

    fn fail(
        &self,
        mut lifecycle: Lifecycle,
        error: &RequestError,
        utilization: Option<UtilizationSample>,
        timing: TimingRecord,
    ) -> proto::CfResponse {
        lifecycle.advance(DispatchState::Failed);
        debug!("Request {} failed: {}", lifecycle.id, error);

        tracing::Span::current().record("outcome", error.label());
        counter!(REQUESTS_FAILED_TOTAL, "kind" => error.label()).increment(1);
        self.stats.request_finished(true);

        codec::pack_error(lifecycle.id, error, utilization, &timing)
    }

    fn utilization_delta(&self, start: Option<UtilizationSample>) -> Option<f32> {
        let start = start?;
        let end = self.sampler.sample().ok()?;
        utilization_percent(&start, &end)
    }
}

fn record_stage_durations(timing: &TimingRecord) {
    for stage in [Stage::Unpack, Stage::Compute, Stage::Pack] {
        histogram!(STAGE_DURATION_US, "stage" => stage.as_str()).record(timing.get(stage) as f64);
    }
}
