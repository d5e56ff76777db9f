pub mod channel;
pub mod forward;
pub mod htlc;
pub mod invoice;
pub mod node_record;
pub mod payment;
pub mod routing_policy;
pub mod transaction;

use lnhub_sdk::objects::{
    ChannelLifecycle as SdkChannelLifecycle, InvoiceState as SdkInvoiceState,
    PaymentStatus as SdkPaymentStatus,
};

/// Channel status for database operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "snake_case", type_name = "channel_status")]
pub enum ChannelStatus {
    Opening,
    Open,
    Closing,
    Closed,
    ForceClosed,
}

/// Channel lifecycle event kind for the append-only event log.
///
/// This is the sqlx::Type version. For API/DTO use, see
/// `lnhub_sdk::objects::ChannelLifecycle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "snake_case", type_name = "channel_event_type")]
pub enum ChannelEventType {
    Opened,
    Closed,
    Active,
    Inactive,
    FullyResolved,
}

impl From<SdkChannelLifecycle> for ChannelEventType {
    fn from(value: SdkChannelLifecycle) -> Self {
        match value {
            SdkChannelLifecycle::Opened => ChannelEventType::Opened,
            SdkChannelLifecycle::Closed => ChannelEventType::Closed,
            SdkChannelLifecycle::Active => ChannelEventType::Active,
            SdkChannelLifecycle::Inactive => ChannelEventType::Inactive,
            SdkChannelLifecycle::FullyResolved => ChannelEventType::FullyResolved,
        }
    }
}

/// Invoice state for database operations.
///
/// This is the sqlx::Type version. For API/DTO use, see
/// `lnhub_sdk::objects::InvoiceState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "snake_case", type_name = "invoice_state")]
pub enum InvoiceState {
    Open,
    Settled,
    Canceled,
    Accepted,
}

impl From<SdkInvoiceState> for InvoiceState {
    fn from(value: SdkInvoiceState) -> Self {
        match value {
            SdkInvoiceState::Open => InvoiceState::Open,
            SdkInvoiceState::Settled => InvoiceState::Settled,
            SdkInvoiceState::Canceled => InvoiceState::Canceled,
            SdkInvoiceState::Accepted => InvoiceState::Accepted,
        }
    }
}

/// Payment state for database operations.
///
/// This is the sqlx::Type version. For API/DTO use, see
/// `lnhub_sdk::objects::PaymentStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "snake_case", type_name = "payment_state")]
pub enum PaymentState {
    InFlight,
    Succeeded,
    Failed,
}

impl From<SdkPaymentStatus> for PaymentState {
    fn from(value: SdkPaymentStatus) -> Self {
        match value {
            SdkPaymentStatus::InFlight => PaymentState::InFlight,
            SdkPaymentStatus::Succeeded => PaymentState::Succeeded,
            SdkPaymentStatus::Failed => PaymentState::Failed,
        }
    }
}

/// HTLC event kind for database operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "snake_case", type_name = "htlc_event_type")]
pub enum HtlcEventType {
    Forward,
    ForwardFail,
    Settle,
    LinkFail,
}
