pub mod augment;
pub mod core;
pub mod document;
pub mod error;
pub mod handler;
pub mod normalize;
pub mod registry;
pub mod relay;
pub mod session;
pub mod upstream_client;

pub use augment::augment;
pub use core::{Core, CoreState, UpstreamConfig};
pub use document::ChatDocument;
pub use error::{ErrorKind, ProxyError};
pub use normalize::{NormalizedChat, ValidationError, normalize};
pub use registry::{ModelDescriptor, ModelRegistry};
pub use relay::{ChunkSink, RelayError, RelayState, RelayStats, StreamRelay};
pub use handler::REQUEST_ID_HEADER;
pub use session::ProxySession;
pub use upstream_client::{GatewayError, TransportErrorKind, UpstreamClientConfig, UpstreamGateway};
