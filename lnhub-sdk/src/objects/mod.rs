pub mod events;
pub mod requests;
pub mod ws;

pub use events::{
    ChannelCloseStatus, ChannelLifecycle, ChannelStateEvent, CloseChannelResponse, InvoiceEvent,
    InvoiceState, NewAddressResponse, NewPaymentResponse, OpenChannelResponse, OpenChannelStatus,
    PaymentStatus, PeerEvent, PeerEventKind, TransactionEvent,
};
pub use requests::{
    AddressType, CloseChannelRequest, NewAddressRequest, NewPaymentRequest, OpenChannelRequest,
};
pub use ws::{Pong, WsError, WsRequest};
