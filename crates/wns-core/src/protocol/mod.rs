//! Message framing
//!
//! Two layers: the outer [`Envelope`] (plaintext address tag + sealed payload,
//! postcard on the wire) and the inner [`Request`]/[`Response`] records (JSON,
//! sealed inside the payload).

mod envelope;
mod message;

pub use envelope::{Envelope, ENVELOPE_VERSION};
pub use message::{
    Request, Response, STATUS_BAD_REQUEST, STATUS_HANDLER_ERROR, STATUS_OK,
    STATUS_UNSUPPORTED_SERVICE,
};
