use order_stream_engine::db_types::{EventQueryFilter, SortDirection, SortField, DEFAULT_QUERY_LIMIT};
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::ServerError;

/// Raw query parameters of the orders endpoint, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrdersQuery {
    pub status: Option<String>,
    pub is_final: Option<bool>,
    pub user_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

impl OrdersQuery {
    /// Validates the parameters and applies the documented defaults. Exactly one of `status` and
    /// `is_final` must be present.
    pub fn into_filter(self) -> Result<EventQueryFilter, ServerError> {
        let bad_request = |msg: &str| ServerError::InvalidRequestBody(msg.to_string());
        match (&self.status, &self.is_final) {
            (None, None) => return Err(bad_request("one of status or is_final is required")),
            (Some(_), Some(_)) => return Err(bad_request("status and is_final are mutually exclusive")),
            _ => {},
        }
        let statuses = self
            .status
            .map(|names| names.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();
        let sort_by = match self.sort_by.as_deref() {
            None => SortField::default(),
            Some(field) => field.parse().map_err(|_| bad_request("sort_by must be created_at or updated_at"))?,
        };
        let sort_order = match self.sort_order.as_deref() {
            None => SortDirection::default(),
            Some(direction) => direction.parse().map_err(|_| bad_request("sort_order must be ASC or DESC"))?,
        };
        Ok(EventQueryFilter {
            statuses,
            is_final: self.is_final,
            user_id: self.user_id,
            limit: self.limit.unwrap_or(DEFAULT_QUERY_LIMIT),
            offset: self.offset.unwrap_or(0),
            sort_by,
            sort_order,
        })
    }
}
