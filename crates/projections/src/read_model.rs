//! Query access to the read documents.

use std::cmp::Ordering;

use common::AggregateId;
use domain::MatterStatus;
use event_store::{EventEnvelope, EventStore, EventStoreExt};
use serde::Serialize;

use crate::Result;
use crate::views::{
    CLIENT_DETAILS, ClientDetails, DASHBOARD, DASHBOARD_ID, DashboardStatistics, MATTER_DETAILS,
    MatterDetails,
};

/// Largest page a matter listing returns.
pub const MAX_PAGE_SIZE: usize = 10;

/// Fields a matter listing can be sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    CreatedAt,
    ClientName,
    OpposingParty,
    Status,
    ClaimAmount,
}

impl SortField {
    /// Parses a field name, falling back to `CreatedAt` for anything else.
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "client_name" | "clientname" => SortField::ClientName,
            "opposing_party" | "opposingparty" => SortField::OpposingParty,
            "status" => SortField::Status,
            "claim_amount" | "claimamount" => SortField::ClaimAmount,
            _ => SortField::CreatedAt,
        }
    }

    fn compare(&self, a: &MatterDetails, b: &MatterDetails) -> Ordering {
        match self {
            SortField::CreatedAt => a.created_at.cmp(&b.created_at),
            SortField::ClientName => a.client_name.cmp(&b.client_name),
            SortField::OpposingParty => a.opposing_party.cmp(&b.opposing_party),
            SortField::Status => a.status.cmp(&b.status),
            SortField::ClaimAmount => a.current_claim_amount.cmp(&b.current_claim_amount),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    /// Only `desc` (any case) sorts descending.
    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("desc") {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        }
    }
}

/// Filter, sort and page parameters for listing matters.
#[derive(Debug, Clone, PartialEq)]
pub struct MatterQuery {
    pub page: usize,
    pub page_size: usize,
    pub sort: SortField,
    pub direction: SortDirection,
    pub status: Option<MatterStatus>,
    pub high_priority: Option<bool>,
}

impl Default for MatterQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: MAX_PAGE_SIZE,
            sort: SortField::default(),
            direction: SortDirection::default(),
            status: None,
            high_priority: None,
        }
    }
}

impl MatterQuery {
    pub fn page(mut self, page: usize) -> Self {
        self.page = page;
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn sort_by(mut self, sort: SortField, direction: SortDirection) -> Self {
        self.sort = sort;
        self.direction = direction;
        self
    }

    pub fn with_status(mut self, status: MatterStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn high_priority(mut self, high_priority: bool) -> Self {
        self.high_priority = Some(high_priority);
        self
    }

    /// Page number and size after clamping to their allowed ranges.
    pub fn bounds(&self) -> (usize, usize) {
        (self.page.max(1), self.page_size.clamp(1, MAX_PAGE_SIZE))
    }

    fn matches(&self, matter: &MatterDetails) -> bool {
        self.status.is_none_or(|status| matter.status == status)
            && self
                .high_priority
                .is_none_or(|flag| matter.is_high_priority == flag)
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub page_size: usize,
    pub total_count: usize,
    pub total_pages: usize,
}

/// Reads documents maintained by the inline projections and the daemon.
#[derive(Debug, Clone)]
pub struct ReadModel<S> {
    store: S,
}

impl<S: EventStore> ReadModel<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn matter(&self, matter_id: AggregateId) -> Result<Option<MatterDetails>> {
        Ok(self
            .store
            .load_typed(MATTER_DETAILS, matter_id.as_uuid())
            .await?)
    }

    /// Lists matters. Ties on the sort field are broken by matter id.
    #[tracing::instrument(skip(self))]
    pub async fn matters(&self, query: &MatterQuery) -> Result<Page<MatterDetails>> {
        let (page, page_size) = query.bounds();

        let mut matters = self
            .store
            .list_documents(MATTER_DETAILS)
            .await?
            .into_iter()
            .map(serde_json::from_value::<MatterDetails>)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        matters.retain(|m| query.matches(m));

        matters.sort_by(|a, b| {
            let ordering = query.sort.compare(a, b).then_with(|| a.id.cmp(&b.id));
            match query.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });

        let total_count = matters.len();
        let items = matters
            .into_iter()
            .skip((page - 1).saturating_mul(page_size))
            .take(page_size)
            .collect();

        Ok(Page {
            items,
            page,
            page_size,
            total_count,
            total_pages: total_count.div_ceil(page_size),
        })
    }

    pub async fn client(&self, client_id: AggregateId) -> Result<Option<ClientDetails>> {
        Ok(self
            .store
            .load_typed(CLIENT_DETAILS, client_id.as_uuid())
            .await?)
    }

    /// All clients ordered by name.
    pub async fn clients(&self) -> Result<Vec<ClientDetails>> {
        let mut clients = self
            .store
            .list_documents(CLIENT_DETAILS)
            .await?
            .into_iter()
            .map(serde_json::from_value::<ClientDetails>)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        clients.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(clients)
    }

    /// The dashboard summary; all zero until the daemon first commits.
    pub async fn dashboard(&self) -> Result<DashboardStatistics> {
        Ok(self
            .store
            .load_typed(DASHBOARD, DASHBOARD_ID)
            .await?
            .unwrap_or_default())
    }

    /// Raw envelopes of a stream, oldest first.
    pub async fn history(&self, stream_id: AggregateId) -> Result<Vec<EventEnvelope>> {
        Ok(self.store.read_stream(stream_id).await?)
    }
}
