//! PDR Fetch Cycle
//!
//! State machine for one GetPDR exchange with the host. It performs no I/O:
//! the caller asks it for the next request, delivers each response, and
//! takes the accumulated records once the cycle reaches `Merging`.
//!
//! Handle 0 (explicit, or implied by an empty handle list) walks the host's
//! next-record-handle chain until the host answers 0. Explicit non-zero
//! handles are fetched once each, in order.

use crate::error::FetchError;
use crate::pdr::{
    split_records, FruRecordSetPdr, PdrHeader, PdrType, StateSensorPdr, TerminusLocatorPdr,
};
use crate::store::PdrRepository;
use crate::transport::{GetPdrRequest, GetPdrResponse};
use crate::types::{RecordHandle, RECORD_HANDLE_TERMINAL};
use std::collections::VecDeque;
use std::fmt;
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    AwaitingFirstRequest,
    AwaitingPage { record_handle: RecordHandle },
    Merging,
    NotifyingHost,
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleState::Idle => write!(f, "idle"),
            CycleState::AwaitingFirstRequest => write!(f, "awaiting-first-request"),
            CycleState::AwaitingPage { record_handle } => {
                write!(f, "awaiting-page({})", record_handle)
            }
            CycleState::Merging => write!(f, "merging"),
            CycleState::NotifyingHost => write!(f, "notifying-host"),
        }
    }
}

/// What the caller should do after delivering a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    Request(GetPdrRequest),
    Complete,
}

/// Everything one cycle accumulates
#[derive(Debug, Default)]
pub struct CycleContext {
    queue: VecDeque<RecordHandle>,
    following_chain: bool,
    /// Bytes of a record arriving in several parts
    partial: Vec<u8>,
    pub entity_associations: Vec<Vec<u8>>,
    pub state_sensors: Vec<StateSensorPdr>,
    pub fru_record_sets: Vec<FruRecordSetPdr>,
    pub terminus_locators: Vec<TerminusLocatorPdr>,
    /// Repository handles stored during this cycle
    pub stored: Vec<RecordHandle>,
    pub skipped: usize,
    pub requests: usize,
}

impl CycleContext {
    fn new(handles: Vec<RecordHandle>) -> Self {
        let queue = if handles.is_empty() {
            VecDeque::from([RECORD_HANDLE_TERMINAL])
        } else {
            handles.into()
        };
        Self {
            queue,
            ..Default::default()
        }
    }

    fn classify(&mut self, repo: &mut PdrRepository, payload: &[u8]) -> Result<(), FetchError> {
        for record in split_records(payload) {
            let bytes = match record {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(error = %e, "Skipping truncated PDR");
                    self.skipped += 1;
                    continue;
                }
            };
            // split_records only yields records with a parseable header
            let Ok(header) = PdrHeader::parse(bytes) else {
                self.skipped += 1;
                continue;
            };

            match header.kind() {
                Some(PdrType::EntityAssociation) => {
                    trace!(record_handle = header.record_handle, "Queued entity association PDR");
                    self.entity_associations.push(bytes.to_vec());
                }
                Some(PdrType::StateSensor) => match StateSensorPdr::decode(bytes) {
                    Ok(mut pdr) => {
                        pdr.record_handle = self.store(repo, bytes, pdr.terminus_handle)?;
                        self.state_sensors.push(pdr);
                    }
                    Err(e) => self.skip(header, e),
                },
                Some(PdrType::FruRecordSet) => match FruRecordSetPdr::decode(bytes) {
                    Ok(mut pdr) => {
                        pdr.record_handle = self.store(repo, bytes, pdr.terminus_handle)?;
                        self.fru_record_sets.push(pdr);
                    }
                    Err(e) => self.skip(header, e),
                },
                Some(PdrType::TerminusLocator) => match TerminusLocatorPdr::decode(bytes) {
                    Ok(mut pdr) => {
                        pdr.record_handle = self.store(repo, bytes, pdr.terminus_handle)?;
                        self.terminus_locators.push(pdr);
                    }
                    Err(e) => self.skip(header, e),
                },
                _ => {
                    self.store(repo, bytes, 0)?;
                }
            }
        }
        Ok(())
    }

    fn store(
        &mut self,
        repo: &mut PdrRepository,
        bytes: &[u8],
        terminus_handle: u16,
    ) -> Result<RecordHandle, FetchError> {
        let handle = repo.add(bytes, true, terminus_handle)?;
        self.stored.push(handle);
        Ok(handle)
    }

    fn skip(&mut self, header: PdrHeader, error: crate::error::PdrError) {
        warn!(
            record_handle = header.record_handle,
            pdr_type = header.pdr_type,
            error = %error,
            "Skipping malformed PDR"
        );
        self.skipped += 1;
    }
}

/// Fetch cycle state plus the follow-up deferred while a cycle runs
#[derive(Debug)]
pub struct FetchCycle {
    state: CycleState,
    context: Option<CycleContext>,
    deferred: Option<Vec<RecordHandle>>,
}

impl Default for FetchCycle {
    fn default() -> Self {
        Self::new()
    }
}

impl FetchCycle {
    pub fn new() -> Self {
        Self {
            state: CycleState::Idle,
            context: None,
            deferred: None,
        }
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == CycleState::Idle
    }

    /// A follow-up cycle is waiting for the current one to end
    pub fn has_deferred(&self) -> bool {
        self.deferred.is_some()
    }

    /// Schedule a cycle for `handles` (empty means the whole repository).
    ///
    /// Returns false when a cycle is already in flight; the request is then
    /// deferred and merged with any other deferred request into a single
    /// follow-up cycle.
    pub fn schedule(&mut self, handles: Vec<RecordHandle>) -> bool {
        if self.is_idle() {
            self.context = Some(CycleContext::new(handles));
            self.state = CycleState::AwaitingFirstRequest;
            return true;
        }

        self.deferred = Some(match self.deferred.take() {
            None => handles,
            // an empty list already covers everything
            Some(existing) if existing.is_empty() || handles.is_empty() => Vec::new(),
            Some(mut existing) => {
                for handle in handles {
                    if !existing.contains(&handle) {
                        existing.push(handle);
                    }
                }
                existing
            }
        });
        debug!(state = %self.state, "Fetch deferred until current cycle ends");
        false
    }

    /// First request of a scheduled cycle.
    pub fn start(&mut self) -> Option<GetPdrRequest> {
        if self.state != CycleState::AwaitingFirstRequest {
            return None;
        }
        let context = self.context.as_mut()?;
        let record_handle = context.queue.pop_front().unwrap_or(RECORD_HANDLE_TERMINAL);
        context.following_chain = record_handle == RECORD_HANDLE_TERMINAL;
        context.requests += 1;
        self.state = CycleState::AwaitingPage { record_handle };
        Some(GetPdrRequest::first_part(record_handle))
    }

    /// Deliver the response to the outstanding request.
    ///
    /// Any error aborts the cycle; records already stored stay in `repo`.
    pub fn on_response(
        &mut self,
        repo: &mut PdrRepository,
        response: GetPdrResponse,
    ) -> Result<NextStep, FetchError> {
        let CycleState::AwaitingPage { record_handle } = self.state else {
            return Err(FetchError::UnexpectedResponse);
        };
        let Some(context) = self.context.as_mut() else {
            return Err(FetchError::UnexpectedResponse);
        };

        if !response.completion_code.is_success() {
            self.abort();
            return Err(FetchError::CompletionCode {
                record_handle,
                code: response.completion_code,
            });
        }

        context.partial.extend_from_slice(&response.record_data);
        if response.transfer_flag.has_more() {
            trace!(
                record_handle,
                data_transfer_handle = response.next_data_transfer_handle,
                "Requesting next part"
            );
            context.requests += 1;
            return Ok(NextStep::Request(GetPdrRequest::next_part(
                record_handle,
                response.next_data_transfer_handle,
            )));
        }

        let payload = std::mem::take(&mut context.partial);
        if let Err(e) = context.classify(repo, &payload) {
            self.abort();
            return Err(e);
        }

        let next = if context.following_chain
            && response.next_record_handle != RECORD_HANDLE_TERMINAL
        {
            Some(response.next_record_handle)
        } else {
            let next = context.queue.pop_front();
            context.following_chain = next == Some(RECORD_HANDLE_TERMINAL);
            next
        };

        match next {
            Some(record_handle) => {
                context.requests += 1;
                self.state = CycleState::AwaitingPage { record_handle };
                Ok(NextStep::Request(GetPdrRequest::first_part(record_handle)))
            }
            None => {
                self.state = CycleState::Merging;
                Ok(NextStep::Complete)
            }
        }
    }

    /// Take the accumulated records once all pages are in.
    pub fn take_context(&mut self) -> Option<CycleContext> {
        if self.state != CycleState::Merging {
            return None;
        }
        self.context.take()
    }

    pub fn enter_notifying(&mut self) {
        if self.state == CycleState::Merging {
            self.state = CycleState::NotifyingHost;
        }
    }

    /// End the cycle normally and promote any deferred follow-up.
    pub fn finish(&mut self) {
        self.state = CycleState::Idle;
        self.context = None;
        self.promote_deferred();
    }

    /// Drop the cycle and everything it accumulated. A deferred follow-up
    /// still runs as a fresh cycle.
    pub fn abort(&mut self) {
        if self.state != CycleState::Idle {
            debug!(state = %self.state, "Aborting fetch cycle");
        }
        self.state = CycleState::Idle;
        self.context = None;
        self.promote_deferred();
    }

    /// Discard the current cycle and any deferred follow-up.
    pub fn reset(&mut self) {
        self.state = CycleState::Idle;
        self.context = None;
        self.deferred = None;
    }

    fn promote_deferred(&mut self) {
        if let Some(handles) = self.deferred.take() {
            self.schedule(handles);
        }
    }
}
