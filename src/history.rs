//! Production batches as reported by the service (history and admin views).

use crate::api::{BatchDetail, BatchSummary};
use crate::error::ApiError;
use crate::token::{Resolution, SequenceToken, TokenSource};

#[derive(Debug, Default)]
pub struct BatchHistory {
    batches: Vec<BatchSummary>,
    list_tokens: TokenSource,
    selected: Option<String>,
    detail: Option<BatchDetail>,
    detail_tokens: TokenSource,
}

impl BatchHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> &[BatchSummary] {
        &self.batches
    }

    pub fn is_loading(&self) -> bool {
        self.list_tokens.in_flight()
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Detail of the selected batch, once loaded.
    pub fn detail(&self) -> Option<&BatchDetail> {
        self.detail.as_ref()
    }

    pub fn is_loading_detail(&self) -> bool {
        self.detail_tokens.in_flight()
    }

    pub fn begin_refresh(&mut self) -> SequenceToken {
        self.list_tokens.issue()
    }

    pub fn resolve_refresh(
        &mut self,
        token: SequenceToken,
        result: Result<Vec<BatchSummary>, ApiError>,
    ) -> Resolution<usize, ApiError> {
        if !self.list_tokens.settle(token) {
            return Resolution::Stale;
        }
        match result {
            Ok(batches) => {
                self.batches = batches;
                Resolution::Applied(self.batches.len())
            }
            Err(e) => Resolution::Failed(e),
        }
    }

    /// Select a batch; its detail replaces whatever was shown before.
    pub fn select(&mut self, batch_id: &str) -> SequenceToken {
        self.selected = Some(batch_id.to_owned());
        self.detail = None;
        self.detail_tokens.issue()
    }

    pub fn resolve_detail(
        &mut self,
        token: SequenceToken,
        result: Result<BatchDetail, ApiError>,
    ) -> Resolution<(), ApiError> {
        if !self.detail_tokens.settle(token) {
            return Resolution::Stale;
        }
        match result {
            Ok(detail) => {
                self.detail = Some(detail);
                Resolution::Applied(())
            }
            Err(e) => Resolution::Failed(e),
        }
    }
}
