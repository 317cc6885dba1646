pub mod server;
pub mod transport;

pub use server::{ProtocolServer, REQUEST_DATA, ServerStats};
pub use transport::{MockTransport, Transport, open_port};
