pub mod chain;
pub mod envelope;

pub use chain::{HttpTransport, Transport, TransportChain};
pub use envelope::{decode_list, EnvelopeShape};
