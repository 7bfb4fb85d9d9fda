use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;
use uuid::Uuid;

/// Wire format for event timestamps. Second precision, always UTC, always a trailing `Z`.
pub const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

pub fn parse_event_timestamp(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(value, TIME_FORMAT).map(|t| t.and_utc())
}

pub fn format_event_timestamp(value: &DateTime<Utc>) -> String {
    value.format(TIME_FORMAT).to_string()
}

//--------------------------------------  OrderStatusType  ------------------------------------------------------------

/// The closed set of order statuses the payments provider emits.
///
/// The integer ids are stable and match the seeded `order_statuses` dictionary table. A status is
/// final when no further progression is expected for the order under normal rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatusType {
    CoolOrderCreated,
    SbuVarificationPending,
    ConfirmedByMayor,
    ChangedMyMind,
    Failed,
    Chinazes,
    GiveMyMoneyBack,
}

impl OrderStatusType {
    pub const ALL: [OrderStatusType; 7] = [
        OrderStatusType::CoolOrderCreated,
        OrderStatusType::SbuVarificationPending,
        OrderStatusType::ConfirmedByMayor,
        OrderStatusType::ChangedMyMind,
        OrderStatusType::Failed,
        OrderStatusType::Chinazes,
        OrderStatusType::GiveMyMoneyBack,
    ];

    pub fn id(&self) -> i32 {
        match self {
            OrderStatusType::CoolOrderCreated => 1,
            OrderStatusType::SbuVarificationPending => 2,
            OrderStatusType::ConfirmedByMayor => 3,
            OrderStatusType::ChangedMyMind => 4,
            OrderStatusType::Failed => 5,
            OrderStatusType::Chinazes => 6,
            OrderStatusType::GiveMyMoneyBack => 7,
        }
    }

    pub fn from_id(id: i32) -> Option<Self> {
        Self::ALL.iter().find(|s| s.id() == id).copied()
    }

    pub fn is_final(&self) -> bool {
        matches!(
            self,
            OrderStatusType::ChangedMyMind
                | OrderStatusType::Failed
                | OrderStatusType::Chinazes
                | OrderStatusType::GiveMyMoneyBack
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatusType::CoolOrderCreated => "cool_order_created",
            OrderStatusType::SbuVarificationPending => "sbu_varification_pending",
            OrderStatusType::ConfirmedByMayor => "confirmed_by_mayor",
            OrderStatusType::ChangedMyMind => "changed_my_mind",
            OrderStatusType::Failed => "failed",
            OrderStatusType::Chinazes => "chinazes",
            OrderStatusType::GiveMyMoneyBack => "give_my_money_back",
        }
    }

    /// The dictionary row for this status.
    pub fn as_order_status(&self) -> OrderStatus {
        OrderStatus { id: self.id(), name: self.as_str().to_string(), is_final: self.is_final() }
    }
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
#[error("Unknown order status: {0}")]
pub struct StatusConversionError(pub String);

impl FromStr for OrderStatusType {
    type Err = StatusConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|status| status.as_str() == s)
            .copied()
            .ok_or_else(|| StatusConversionError(s.to_string()))
    }
}

//--------------------------------------    OrderStatus    ------------------------------------------------------------

/// A row of the order status dictionary.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct OrderStatus {
    pub id: i32,
    pub name: String,
    pub is_final: bool,
}

//--------------------------------------     OrderEvent    ------------------------------------------------------------

/// A persisted order lifecycle event, exactly as it sits in the `events` table.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct OrderEvent {
    pub event_id: Uuid,
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub order_status_id: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------     EventDetail   ------------------------------------------------------------

/// An event joined with its status dictionary row. This is what queries return.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct EventDetail {
    pub event_id: Uuid,
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub order_status_id: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub order_status_name: String,
    pub is_final: bool,
}

//--------------------------------------    EventPayload   ------------------------------------------------------------

/// The wire representation of an event.
///
/// This is the shape of the webhook body, of every SSE frame, and of the entries in the orders
/// query response. All fields are strings; [`EventPayload::validate`] turns a payload into typed
/// identifiers and timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPayload {
    pub event_id: String,
    pub order_id: String,
    pub user_id: String,
    pub order_status: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Error)]
pub enum PayloadError {
    #[error("{0} is not a well-formed UUID")]
    InvalidUuid(&'static str),
    #[error("{0} is not a timestamp of the form YYYY-MM-DDTHH:MM:SSZ")]
    InvalidTimestamp(&'static str),
    #[error("order_status must not be empty")]
    EmptyStatus,
}

impl EventPayload {
    /// Validates the identifier and timestamp fields. The status name is left as-is; resolving it
    /// against the dictionary is the admission service's job.
    pub fn validate(&self) -> Result<IncomingEvent, PayloadError> {
        let event_id = Uuid::parse_str(&self.event_id).map_err(|_| PayloadError::InvalidUuid("event_id"))?;
        let order_id = Uuid::parse_str(&self.order_id).map_err(|_| PayloadError::InvalidUuid("order_id"))?;
        let user_id = Uuid::parse_str(&self.user_id).map_err(|_| PayloadError::InvalidUuid("user_id"))?;
        if self.order_status.is_empty() {
            return Err(PayloadError::EmptyStatus);
        }
        let created_at =
            parse_event_timestamp(&self.created_at).map_err(|_| PayloadError::InvalidTimestamp("created_at"))?;
        let updated_at =
            parse_event_timestamp(&self.updated_at).map_err(|_| PayloadError::InvalidTimestamp("updated_at"))?;
        Ok(IncomingEvent { event_id, order_id, user_id, created_at, updated_at })
    }
}

impl From<&EventDetail> for EventPayload {
    fn from(event: &EventDetail) -> Self {
        Self {
            event_id: event.event_id.to_string(),
            order_id: event.order_id.to_string(),
            user_id: event.user_id.to_string(),
            order_status: event.order_status_name.clone(),
            created_at: format_event_timestamp(&event.created_at),
            updated_at: format_event_timestamp(&event.updated_at),
        }
    }
}

//--------------------------------------   IncomingEvent   ------------------------------------------------------------

/// A validated webhook event that has not been admitted yet. The status id is assigned during
/// admission, once the status name has been resolved against the dictionary.
#[derive(Debug, Clone)]
pub struct IncomingEvent {
    pub event_id: Uuid,
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IncomingEvent {
    pub fn with_status(self, order_status_id: i32) -> OrderEvent {
        OrderEvent {
            event_id: self.event_id,
            order_id: self.order_id,
            user_id: self.user_id,
            order_status_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

//-------------------------------------- EventQueryFilter  ------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortField {
    #[default]
    CreatedAt,
    UpdatedAt,
}

impl SortField {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortField::CreatedAt => "created_at",
            SortField::UpdatedAt => "updated_at",
        }
    }
}

impl FromStr for SortField {
    type Err = StatusConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created_at" => Ok(SortField::CreatedAt),
            "updated_at" => Ok(SortField::UpdatedAt),
            other => Err(StatusConversionError(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    #[default]
    Descending,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Ascending => "ASC",
            SortDirection::Descending => "DESC",
        }
    }
}

impl FromStr for SortDirection {
    type Err = StatusConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ASC" => Ok(SortDirection::Ascending),
            "DESC" => Ok(SortDirection::Descending),
            other => Err(StatusConversionError(other.to_string())),
        }
    }
}

/// Filter for the orders query. Exactly one of `statuses` and `is_final` is expected to be set;
/// enforcing that is the caller's job, the filter itself applies whatever criteria are present.
#[derive(Debug, Clone)]
pub struct EventQueryFilter {
    pub statuses: Vec<String>,
    pub is_final: Option<bool>,
    pub user_id: Option<Uuid>,
    pub limit: i64,
    pub offset: i64,
    pub sort_by: SortField,
    pub sort_order: SortDirection,
}

pub const DEFAULT_QUERY_LIMIT: i64 = 10;

impl Default for EventQueryFilter {
    fn default() -> Self {
        Self {
            statuses: Vec::new(),
            is_final: None,
            user_id: None,
            limit: DEFAULT_QUERY_LIMIT,
            offset: 0,
            sort_by: SortField::default(),
            sort_order: SortDirection::default(),
        }
    }
}
