//! The per-request state machine.
//!
//! One [RequestPipeline] drives one client request from dispatch through
//! resolution, fetch planning, streaming, and completion. A pipeline and
//! its fetch handles are exclusively owned by the event-loop context that
//! created them: all driving happens through `&mut self`, so no locking is
//! needed inside.
//!
//! The pipeline suspends whenever an asynchronous read is submitted or the
//! transport cannot take more bytes, and is re-driven by
//! [RequestPipeline::peek] when the owner is woken by loader readiness, a
//! timer, or transport writability. A suspended resolution records an
//! interrupt point naming the operation it was resolving for; the
//! delivering read resumes the request there exactly once.

use crate::fetch::{FetchEvent, FetchHandle, FetchKind, FetchPurpose};
use crate::gateway::Gateway;
use crate::plan::{BlobCtx, PlanParams, PlanSink};
use crate::reply::{raise_status, ReplyFramer};
use crate::resolve::{ResolveOutput, ResolveStage};
use rand::Rng;
use seqgate_api::counters::CounterEvent;
use seqgate_api::db::{DbError, DbErrorKind, DbRecord};
use seqgate_api::protocol::{codes, status, ItemType, ReplyIssue, Severity};
use seqgate_api::transport::DynTransport;
use seqgate_api::{
    BioseqResolution, BlobId, LocatorOrigin, OutputFormat, Request,
    RequestKind, ResolutionOutcome, TseOption,
};
use std::sync::Arc;

/// Where a pipeline stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Constructed, not yet started.
    Created,
    /// Waiting on an asynchronous resolution read.
    Resolving,
    /// Sub-fetches are planned and possibly outstanding.
    Fetching,
    /// Everything delivered into the framer; flushing the tail.
    Draining,
    /// Terminal: the reply went out complete.
    Completed,
    /// Terminal: the request was cancelled and drained.
    Cancelled,
}

/// Which operation a suspended resolution was resolving for; resumption
/// re-enters the pipeline here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResumePoint {
    ResolveForResolve,
    ResolveForBlob,
    ResolveForAnnotation,
}

/// The state machine driving one request.
#[derive(Debug)]
pub struct RequestPipeline {
    gateway: Arc<Gateway>,
    request: Request,
    transport: DynTransport,
    framer: ReplyFramer,
    fetches: Vec<FetchHandle>,
    state: PipelineState,
    status: u16,
    /// The single-assignment resume slot: set when a resolution suspends,
    /// taken by the one delivery that resumes it.
    pending_resume: Option<ResumePoint>,
    cancelled: bool,
    sent_last: bool,
    span: tracing::Span,
}

impl RequestPipeline {
    pub(crate) fn new(
        gateway: Arc<Gateway>,
        request: Request,
        transport: DynTransport,
    ) -> Self {
        let request_id: u64 = rand::thread_rng().gen();
        Self {
            gateway,
            request,
            transport,
            framer: ReplyFramer::new(),
            fetches: Vec::new(),
            state: PipelineState::Created,
            status: status::OK,
            pending_resume: None,
            cancelled: false,
            sent_last: false,
            span: tracing::debug_span!("request", id = request_id),
        }
    }

    /// Dispatch the request. Synchronous work (cache hits, definitive
    /// misses, malformed input) completes inline; anything asynchronous
    /// suspends until [RequestPipeline::peek].
    pub fn start(&mut self) {
        if !matches!(self.state, PipelineState::Created) {
            tracing::warn!("pipeline started twice");
            return;
        }
        let span = self.span.clone();
        let _guard = span.enter();

        let counters = self.gateway.counters().clone();
        counters.increment(match self.request.kind() {
            RequestKind::Resolve => CounterEvent::RequestResolve,
            RequestKind::BlobBySeqId => CounterEvent::RequestBlobBySeqId,
            RequestKind::BlobById => CounterEvent::RequestBlobById,
            RequestKind::Annotation => CounterEvent::RequestAnnotation,
        });
        tracing::debug!(kind = ?self.request.kind(), "request started");

        match self.request.clone() {
            Request::Resolve(r) => {
                self.start_resolution(
                    &r.seq_id,
                    r.seq_id_type,
                    ResumePoint::ResolveForResolve,
                );
            }
            Request::BlobBySeqId(r) => {
                self.start_resolution(
                    &r.seq_id,
                    r.seq_id_type,
                    ResumePoint::ResolveForBlob,
                );
            }
            Request::BlobById(r) => {
                self.state = PipelineState::Fetching;
                match BlobId::parse(&r.blob_id) {
                    Ok(blob_id) => {
                        self.plan_blob(blob_id, LocatorOrigin::Client)
                    }
                    Err(e) => {
                        counters.increment(CounterEvent::MalformedRequest);
                        self.abort_request(ReplyIssue::error(
                            status::BAD_REQUEST,
                            codes::MALFORMED_PARAMETER,
                            e.to_string(),
                        ));
                    }
                }
            }
            Request::Annotation(r) => {
                self.start_resolution(
                    &r.seq_id,
                    r.seq_id_type,
                    ResumePoint::ResolveForAnnotation,
                );
            }
        }
        self.advance();
    }

    /// Drive the pipeline: poll every live sub-fetch that is ready (or all
    /// of them when `need_wait` is set), then emit completion and flush as
    /// far as the transport allows.
    pub fn peek(&mut self, need_wait: bool) {
        if self.is_finished() {
            return;
        }
        let span = self.span.clone();
        let _guard = span.enter();

        if !self.cancelled && self.transport.is_closed() {
            tracing::debug!("client went away");
            self.cancel_inner();
        }
        if self.cancelled {
            self.drain_cancelled();
            return;
        }

        let mut i = 0;
        while i < self.fetches.len() {
            if !self.fetches[i].is_finished()
                && (need_wait || self.fetches[i].is_ready())
            {
                let events = self.fetches[i].poll();
                if !events.is_empty() {
                    tracing::trace!(
                        kind = ?self.fetches[i].kind(),
                        events = events.len(),
                        "sub-fetch delivered"
                    );
                    let purpose = self.fetches[i].purpose().clone();
                    for ev in events {
                        self.handle_event(i, &purpose, ev);
                    }
                }
            }
            i += 1;
        }
        self.advance();
    }

    /// Cancel the request: every live sub-fetch is asked to stop and
    /// drained, then a forced completion goes out with no further data.
    pub fn cancel(&mut self) {
        if self.is_finished() {
            return;
        }
        let span = self.span.clone();
        let _guard = span.enter();
        self.cancel_inner();
        self.drain_cancelled();
    }

    /// Terminal means completed or cancelled-and-drained.
    pub fn is_finished(&self) -> bool {
        matches!(
            self.state,
            PipelineState::Completed | PipelineState::Cancelled
        )
    }

    /// The current state.
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// The worst status seen so far; the transport layer reports this as
    /// the response status once the reply is under way.
    pub fn status(&self) -> u16 {
        self.status
    }

    fn start_resolution(
        &mut self,
        seq_id: &str,
        seq_id_type: Option<i16>,
        point: ResumePoint,
    ) {
        self.state = PipelineState::Resolving;
        let gw = self.gateway.clone();
        let out = gw.resolver().resolve(
            seq_id,
            seq_id_type,
            self.request.cache_use(),
            point,
        );
        match out {
            ResolveOutput::Done(res) => self.resume(point, res),
            ResolveOutput::Postponed(handle) => {
                self.pending_resume = Some(point);
                self.fetches.push(handle);
            }
        }
    }

    /// Re-enter at an interrupt point with a finished resolution.
    fn resume(&mut self, point: ResumePoint, res: BioseqResolution) {
        match point {
            ResumePoint::ResolveForResolve => self.finish_resolve(res),
            ResumePoint::ResolveForBlob => self.continue_blob(res),
            ResumePoint::ResolveForAnnotation => {
                self.continue_annotation(res)
            }
        }
    }

    /// Take the resume slot; a delivery that finds it empty is a duplicate
    /// and is dropped.
    fn take_resume(&mut self, point: ResumePoint, res: BioseqResolution) {
        match self.pending_resume.take() {
            Some(p) if p == point => self.resume(p, res),
            Some(p) => {
                tracing::warn!(?p, ?point, "resume point mismatch dropped");
                self.pending_resume = Some(p);
            }
            None => tracing::warn!("spurious resolution resume dropped"),
        }
    }

    /// Map a failed resolution to the issue to report, if any.
    fn resolution_issue(
        &mut self,
        res: &BioseqResolution,
    ) -> Option<ReplyIssue> {
        match res.outcome {
            ResolutionOutcome::NotResolved => {
                self.gateway.counters().increment(CounterEvent::NotFound);
                Some(ReplyIssue::error(
                    status::NOT_FOUND,
                    codes::UNRESOLVED_SEQ_ID,
                    "identifier did not resolve",
                ))
            }
            ResolutionOutcome::Error => {
                Some(res.issue.clone().unwrap_or_else(|| {
                    ReplyIssue::error(
                        status::MALFUNCTION,
                        codes::MALFUNCTION,
                        "resolution failed without detail",
                    )
                }))
            }
            _ => None,
        }
    }

    fn finish_resolve(&mut self, res: BioseqResolution) {
        self.state = PipelineState::Fetching;
        if let Some(issue) = self.resolution_issue(&res) {
            self.abort_request(issue);
            return;
        }
        let Some(info) = res.info else {
            self.abort_request(ReplyIssue::error(
                status::MALFUNCTION,
                codes::MALFUNCTION,
                "resolution finished without a record",
            ));
            return;
        };

        let format = match &self.request {
            Request::Resolve(r) => r.output_format,
            _ => OutputFormat::Json,
        };
        let rendered;
        let (fmt, payload): (OutputFormat, &[u8]) = match (format, &res.raw) {
            (OutputFormat::Protobuf, Some(raw)) => {
                (OutputFormat::Protobuf, raw.as_ref())
            }
            _ => match serde_json::to_vec(&info) {
                Ok(v) => {
                    rendered = v;
                    (OutputFormat::Json, rendered.as_slice())
                }
                Err(e) => {
                    self.abort_request(ReplyIssue::error(
                        status::MALFUNCTION,
                        codes::MALFUNCTION,
                        format!("could not serialize bioseq record: {e}"),
                    ));
                    return;
                }
            },
        };
        let item = self.framer.new_item();
        self.framer.bioseq_info_data(item, fmt, payload);
        self.framer.item_complete(item, ItemType::BioseqInfo);
    }

    fn continue_blob(&mut self, res: BioseqResolution) {
        self.state = PipelineState::Fetching;
        if let Some(issue) = self.resolution_issue(&res) {
            self.abort_request(issue);
            return;
        }
        let Some(info) = res.info else {
            self.abort_request(ReplyIssue::error(
                status::MALFUNCTION,
                codes::MALFUNCTION,
                "resolution finished without a record",
            ));
            return;
        };
        let locator = info.locator();
        if !locator.is_valid() {
            self.gateway.counters().increment(CounterEvent::NotFound);
            self.abort_request(ReplyIssue::error(
                status::NOT_FOUND,
                codes::NO_BLOB_PROPS,
                format!(
                    "no blob behind {}.{}",
                    info.accession, info.version
                ),
            ));
            return;
        }
        self.plan_blob(locator, LocatorOrigin::Derived);
    }

    fn continue_annotation(&mut self, res: BioseqResolution) {
        self.state = PipelineState::Fetching;
        if let Some(issue) = self.resolution_issue(&res) {
            self.abort_request(issue);
            return;
        }
        let Some(info) = res.info else {
            self.abort_request(ReplyIssue::error(
                status::MALFUNCTION,
                codes::MALFUNCTION,
                "resolution finished without a record",
            ));
            return;
        };
        let names = match &self.request {
            Request::Annotation(r) => r.names.clone(),
            _ => Vec::new(),
        };
        let mut handle = FetchHandle::new(
            FetchKind::NamedAnnot,
            FetchPurpose::NamedAnnot,
            self.gateway.db().named_annot_query(
                &info.accession,
                info.version,
                info.seq_id_type,
                &names,
            ),
        );
        match handle.submit() {
            Ok(()) => self.fetches.push(handle),
            Err(e) => {
                self.gateway
                    .counters()
                    .increment(CounterEvent::DbUnknownError);
                self.abort_request(ReplyIssue::error(
                    status::SERVER_ERROR,
                    codes::DB_ERROR,
                    format!("query submission failed: {e}"),
                ));
            }
        }
    }

    fn plan_params(&self) -> PlanParams {
        match &self.request {
            Request::BlobBySeqId(r) => PlanParams {
                tse: r.tse,
                cache_use: r.cache_use,
                exclude: r.exclude_blobs.clone(),
                send_blob_if_small: r.send_blob_if_small,
            },
            Request::BlobById(r) => PlanParams {
                tse: r.tse,
                cache_use: r.cache_use,
                exclude: r.exclude_blobs.clone(),
                send_blob_if_small: r.send_blob_if_small,
            },
            _ => PlanParams {
                tse: TseOption::None,
                cache_use: self.request.cache_use(),
                exclude: Vec::new(),
                send_blob_if_small: None,
            },
        }
    }

    fn plan_blob(&mut self, blob_id: BlobId, origin: LocatorOrigin) {
        let params = self.plan_params();
        let gw = self.gateway.clone();
        let mut sink = PlanSink {
            framer: &mut self.framer,
            fetches: &mut self.fetches,
            status: &mut self.status,
        };
        gw.planner().plan(blob_id, origin, true, &params, &mut sink);
    }

    /// A resolution-phase failure: no sub-fetch exists yet, so the whole
    /// request ends with a reply-level message and its completion.
    fn abort_request(&mut self, issue: ReplyIssue) {
        raise_status(&mut self.status, issue.status);
        tracing::debug!(
            status = issue.status,
            code = issue.code,
            "request aborted early"
        );
        self.framer.reply_message(&issue);
        self.state = PipelineState::Fetching;
    }

    fn handle_event(
        &mut self,
        idx: usize,
        purpose: &FetchPurpose,
        ev: FetchEvent,
    ) {
        match purpose {
            FetchPurpose::Resolution { point, stage } => {
                self.on_resolution_event(idx, *point, stage.clone(), ev)
            }
            FetchPurpose::BlobProps { ctx, params } => {
                self.on_blob_props_event(idx, ctx, params, ev)
            }
            FetchPurpose::BlobChunks { blob_id, data_item } => {
                self.on_blob_chunks_event(idx, *blob_id, *data_item, ev)
            }
            FetchPurpose::NamedAnnot => self.on_annot_event(idx, ev),
        }
    }

    /// True when the error ends the read; sub-error severities are only
    /// recorded.
    fn db_error_is_fatal(&mut self, e: &DbError) -> bool {
        if e.severity < Severity::Error {
            tracing::warn!(message = %e.message, "non-fatal database notice");
            return false;
        }
        self.gateway.counters().increment(match e.kind {
            DbErrorKind::Timeout => CounterEvent::DbTimeout,
            DbErrorKind::Unknown => CounterEvent::DbUnknownError,
        });
        true
    }

    fn issue_from_db_error(e: &DbError) -> ReplyIssue {
        let code = match e.kind {
            DbErrorKind::Timeout => codes::DB_TIMEOUT,
            DbErrorKind::Unknown => codes::DB_ERROR,
        };
        ReplyIssue::error(status::SERVER_ERROR, code, e.message.clone())
    }

    fn on_resolution_event(
        &mut self,
        idx: usize,
        point: ResumePoint,
        stage: ResolveStage,
        ev: FetchEvent,
    ) {
        match ev {
            FetchEvent::Error(e) => {
                if !self.db_error_is_fatal(&e) {
                    return;
                }
                self.fetches[idx].mark_finished();
                self.take_resume(
                    point,
                    BioseqResolution::failed(Self::issue_from_db_error(&e)),
                );
            }
            FetchEvent::Record(rec) => match (stage, rec) {
                (ResolveStage::SecondaryId, DbRecord::SecondaryId(r)) => {
                    self.fetches[idx].mark_finished();
                    let cache_use = self.request.cache_use();
                    let gw = self.gateway.clone();
                    match gw.resolver().promote_secondary(
                        &r,
                        cache_use,
                        ResolutionOutcome::FromDbSecondary,
                        point,
                    ) {
                        ResolveOutput::Done(res) => {
                            self.take_resume(point, res)
                        }
                        ResolveOutput::Postponed(handle) => {
                            self.fetches.push(handle)
                        }
                    }
                }
                (ResolveStage::SecondaryId, DbRecord::NotFound) => {
                    self.fetches[idx].mark_finished();
                    self.take_resume(point, BioseqResolution::not_resolved());
                }
                (
                    ResolveStage::FullRecord { outcome },
                    DbRecord::BioseqInfo { info, raw },
                ) => {
                    self.fetches[idx].mark_finished();
                    self.take_resume(
                        point,
                        BioseqResolution::resolved(outcome, info, Some(raw)),
                    );
                }
                (ResolveStage::FullRecord { .. }, DbRecord::NotFound) => {
                    // the key pointed somewhere, the record is gone
                    self.fetches[idx].mark_finished();
                    self.gateway
                        .counters()
                        .increment(CounterEvent::DataInconsistency);
                    self.take_resume(
                        point,
                        BioseqResolution::failed(ReplyIssue::error(
                            status::SERVER_ERROR,
                            codes::NO_RECORD_FOR_KEY,
                            "secondary id key without backing record",
                        )),
                    );
                }
                (_, rec) => {
                    tracing::warn!(?rec, "unexpected resolution delivery")
                }
            },
        }
    }

    fn on_blob_props_event(
        &mut self,
        idx: usize,
        ctx: &BlobCtx,
        params: &PlanParams,
        ev: FetchEvent,
    ) {
        match ev {
            FetchEvent::Record(DbRecord::BlobProps(props)) => {
                self.fetches[idx].mark_finished();
                let gw = self.gateway.clone();
                let mut sink = PlanSink {
                    framer: &mut self.framer,
                    fetches: &mut self.fetches,
                    status: &mut self.status,
                };
                gw.planner().apply_props(ctx, props, params, &mut sink);
            }
            FetchEvent::Record(DbRecord::NotFound) => {
                self.fetches[idx].mark_finished();
                let gw = self.gateway.clone();
                let mut sink = PlanSink {
                    framer: &mut self.framer,
                    fetches: &mut self.fetches,
                    status: &mut self.status,
                };
                gw.planner().report_missing_props(ctx, &mut sink);
            }
            FetchEvent::Error(e) => {
                if !self.db_error_is_fatal(&e) {
                    return;
                }
                self.fetches[idx].mark_finished();
                let issue = Self::issue_from_db_error(&e);
                let gw = self.gateway.clone();
                let mut sink = PlanSink {
                    framer: &mut self.framer,
                    fetches: &mut self.fetches,
                    status: &mut self.status,
                };
                gw.planner().report_prop_issue(ctx, issue, &mut sink);
            }
            FetchEvent::Record(rec) => {
                tracing::warn!(?rec, "unexpected blob props delivery")
            }
        }
    }

    fn on_blob_chunks_event(
        &mut self,
        idx: usize,
        blob_id: BlobId,
        data_item: u64,
        ev: FetchEvent,
    ) {
        match ev {
            FetchEvent::Record(DbRecord::BlobChunk { chunk_no, data }) => {
                self.framer.blob_chunk_data(
                    data_item, &blob_id, chunk_no, &data,
                );
            }
            FetchEvent::Record(DbRecord::Complete) => {
                self.fetches[idx].mark_finished();
                self.framer.item_complete(data_item, ItemType::Blob);
            }
            FetchEvent::Record(DbRecord::NotFound) => {
                self.fetches[idx].mark_finished();
                self.gateway
                    .counters()
                    .increment(CounterEvent::DataInconsistency);
                let issue = ReplyIssue::error(
                    status::SERVER_ERROR,
                    codes::MISSING_BLOB_CHUNK,
                    format!("body of blob {blob_id} missing"),
                );
                raise_status(&mut self.status, issue.status);
                self.framer.message(data_item, ItemType::Blob, &issue);
                self.framer.item_complete(data_item, ItemType::Blob);
            }
            FetchEvent::Error(e) => {
                if !self.db_error_is_fatal(&e) {
                    return;
                }
                self.fetches[idx].mark_finished();
                let issue = Self::issue_from_db_error(&e);
                raise_status(&mut self.status, issue.status);
                self.framer.message(data_item, ItemType::Blob, &issue);
                self.framer.item_complete(data_item, ItemType::Blob);
            }
            FetchEvent::Record(rec) => {
                tracing::warn!(?rec, "unexpected blob chunk delivery")
            }
        }
    }

    fn on_annot_event(&mut self, idx: usize, ev: FetchEvent) {
        match ev {
            FetchEvent::Record(DbRecord::NamedAnnot(rec)) => {
                match serde_json::to_vec(&rec) {
                    Ok(payload) => {
                        let item = self.framer.new_item();
                        self.framer.named_annot_data(item, &payload);
                        self.framer
                            .item_complete(item, ItemType::NamedAnnot);
                    }
                    Err(e) => {
                        let issue = ReplyIssue::error(
                            status::MALFUNCTION,
                            codes::MALFUNCTION,
                            format!("could not serialize annotation: {e}"),
                        );
                        raise_status(&mut self.status, issue.status);
                        self.framer.reply_message(&issue);
                    }
                }
            }
            FetchEvent::Record(DbRecord::Complete)
            | FetchEvent::Record(DbRecord::NotFound) => {
                self.fetches[idx].mark_finished();
            }
            FetchEvent::Error(e) => {
                if !self.db_error_is_fatal(&e) {
                    return;
                }
                self.fetches[idx].mark_finished();
                let issue = Self::issue_from_db_error(&e);
                raise_status(&mut self.status, issue.status);
                self.framer.reply_message(&issue);
            }
            FetchEvent::Record(rec) => {
                tracing::warn!(?rec, "unexpected annotation delivery")
            }
        }
    }

    fn cancel_inner(&mut self) {
        if self.cancelled {
            return;
        }
        self.cancelled = true;
        self.gateway.counters().increment(CounterEvent::Cancelled);
        tracing::debug!("request cancelled");
    }

    /// Ask every live sub-fetch to stop, drain terminal deliveries, and
    /// once everything is down emit the forced completion.
    fn drain_cancelled(&mut self) {
        for handle in self.fetches.iter_mut() {
            if !handle.is_finished() {
                handle.cancel();
                handle.poll();
            }
        }
        if self.fetches.iter().all(|h| h.is_finished()) {
            if !self.framer.is_completed() {
                self.framer.reply_complete();
            }
            self.flush(true);
            self.state = PipelineState::Cancelled;
        }
    }

    /// Emit the reply completion once everything planned has finished,
    /// then flush as far as the delivery policy and the transport allow.
    fn advance(&mut self) {
        if matches!(self.state, PipelineState::Fetching)
            && self.fetches.iter().all(|h| h.is_finished())
            && !self.framer.is_completed()
        {
            tracing::debug!(status = self.status, "reply complete");
            self.framer.reply_complete();
            self.state = PipelineState::Draining;
        }
        self.flush(false);
        if matches!(self.state, PipelineState::Draining) && self.sent_last {
            self.state = PipelineState::Completed;
        }
    }

    fn flush(&mut self, force: bool) {
        if self.sent_last {
            return;
        }
        if !force {
            // resolve and annotation replies are delivered atomically
            if !self.request.streams() && !self.framer.is_completed() {
                return;
            }
            if !self.transport.is_output_ready() {
                return;
            }
        }
        if !self.framer.has_pending() && !self.framer.is_completed() {
            return;
        }
        let data = self.framer.take_output();
        let is_last = self.framer.is_completed();
        if data.is_empty() && !is_last {
            return;
        }
        match self.transport.send(data, is_last) {
            Ok(()) => {
                if is_last {
                    self.sent_last = true;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "transport send failed");
                self.cancel_inner();
            }
        }
    }
}
