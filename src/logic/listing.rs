use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{AggregateError, AggregateResult};
use crate::logic::coordinator::begin;
use crate::model::{AggregateKind, InventorySchema, ListSpec, Record};
use crate::store::{AggregateStore, ListQuery};

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_LIMIT: u64 = 10;
pub const MAX_LIMIT: u64 = 100;

/// Paging, filter and search parameters of a list request
#[derive(Debug, Clone, PartialEq)]
pub struct ListRequest {
    pub page: u64,
    pub limit: u64,
    pub search: Option<String>,
    /// Raw query parameters; only those declared by the aggregate are used
    pub filters: HashMap<String, String>,
}

impl Default for ListRequest {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
            search: None,
            filters: HashMap::new(),
        }
    }
}

impl ListRequest {
    /// Parse query-string parameters. `limit` above the maximum is capped.
    pub fn from_params(mut params: HashMap<String, String>) -> AggregateResult<Self> {
        let page = positive(params.remove("page"), "page")?.unwrap_or(DEFAULT_PAGE);
        let limit = positive(params.remove("limit"), "limit")?
            .unwrap_or(DEFAULT_LIMIT)
            .min(MAX_LIMIT);
        let search = params
            .remove("search")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let request = Self {
            page,
            limit,
            search,
            filters: params,
        };
        request.offset()?;
        Ok(request)
    }

    /// Rows skipped before this page; must fit a signed 64-bit `OFFSET`
    fn offset(&self) -> AggregateResult<u64> {
        self.page
            .checked_sub(1)
            .and_then(|skipped| skipped.checked_mul(self.limit))
            .filter(|offset| *offset <= i64::MAX as u64)
            .ok_or_else(|| AggregateError::validation("page is out of range"))
    }

    fn query(&self, spec: &ListSpec) -> AggregateResult<ListQuery> {
        let filters = spec
            .filters
            .iter()
            .filter_map(|(param, field)| {
                self.filters
                    .get(*param)
                    .map(|value| value.trim())
                    .filter(|value| !value.is_empty())
                    .map(|value| (*field, value.to_string()))
            })
            .collect();

        Ok(ListQuery {
            filters,
            search: self
                .search
                .clone()
                .map(|term| (spec.search.to_vec(), term)),
            limit: self.limit,
            offset: self.offset()?,
        })
    }
}

fn positive(raw: Option<String>, name: &str) -> AggregateResult<Option<u64>> {
    let Some(raw) = raw.filter(|s| !s.trim().is_empty()) else {
        return Ok(None);
    };
    match raw.trim().parse::<u64>() {
        Ok(n) if n >= 1 => Ok(Some(n)),
        _ => Err(AggregateError::validation(format!(
            "{} must be a positive integer",
            name
        ))),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    pub items: Vec<Record>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub pages: u64,
}

/// Filtered, paged listing of parent rows
pub struct Lister<S: AggregateStore> {
    store: Arc<S>,
    schema: Arc<InventorySchema>,
}

impl<S: AggregateStore> Lister<S> {
    pub fn new(store: Arc<S>, schema: Arc<InventorySchema>) -> Self {
        Self { store, schema }
    }

    pub async fn list(&self, kind: AggregateKind, request: &ListRequest) -> AggregateResult<Page> {
        let aggregate = self.schema.aggregate(kind);
        let query = request.query(&aggregate.list)?;

        let mut tx = begin(self.store.as_ref()).await?;
        let result = tx.list(aggregate.parent, &query).await;
        if let Err(e) = tx.rollback().await {
            log::warn!("Failed to release list of {}: {}", aggregate.parent.name, e);
        }
        let (items, total) = result.map_err(|e| {
            AggregateError::from_store(format!("listing {}", aggregate.parent.name), e)
        })?;

        Ok(Page {
            items,
            total,
            page: request.page,
            limit: request.limit,
            pages: total.div_ceil(request.limit),
        })
    }
}
