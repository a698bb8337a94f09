//! Service client builder.
//!
//! Provides a fluent builder API for configuring and opening a
//! [`ServiceClient`].

use std::time::Duration;

use crate::client::Multiplexer;
use crate::{
    // ---
    Address,
    ClientConfig,
    Encoding,
    Result,
    RpcError,
    ServiceClient,
    ServiceDescriptor,
    TransportConfig,
    TransportKind,
    TransportPtr,
};

/// Builder for [`ServiceClient`].
///
/// A descriptor and an address are required. The address scheme selects the
/// transport family (`ws://` push, `http://` request/response) unless a kind
/// is set explicitly; a kind the scheme cannot serve is a conflict.
///
/// # Examples
///
/// ## WebSocket with binary envelopes
/// ```no_run
/// # use protomux::{ServiceClientBuilder, ServiceDescriptor};
/// # async fn example(descriptor: ServiceDescriptor) -> protomux::Result<()> {
/// let client = ServiceClientBuilder::new()
///     .descriptor(descriptor)
///     .address("ws://localhost:8089")
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
///
/// ## Synchronous HTTP with JSON
/// ```no_run
/// # use protomux::{Encoding, ServiceClientBuilder, ServiceDescriptor};
/// # use std::time::Duration;
/// # async fn example(descriptor: ServiceDescriptor) -> protomux::Result<()> {
/// let client = ServiceClientBuilder::new()
///     .descriptor(descriptor)
///     .address("http://localhost:8088")
///     .request_response(true)
///     .encoding(Encoding::Text)
///     .request_timeout(Duration::from_secs(5))
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct ServiceClientBuilder {
    // ---
    descriptor: Option<ServiceDescriptor>,
    address: Option<String>,
    kind: Option<TransportKind>,
    transport: Option<TransportPtr>,

    encoding: Option<Encoding>,
    payload_encoding: Option<Encoding>,

    // Applied by `ServiceClient::call` (optional, default: none)
    request_timeout: Option<Duration>,
}

impl ServiceClientBuilder {
    // ---

    /// Create a new, empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a loaded [`ClientConfig`]. The descriptor still has to be
    /// set.
    pub fn from_config(config: &ClientConfig) -> Self {
        // ---
        Self {
            address: Some(config.address.clone()),
            kind: config.transport,
            encoding: config.encoding,
            payload_encoding: config.payload_encoding,
            request_timeout: config.request_timeout(),
            ..Self::default()
        }
    }

    /// Service to talk to.
    pub fn descriptor(mut self, descriptor: ServiceDescriptor) -> Self {
        self.descriptor = Some(descriptor);
        self
    }

    /// Service address.
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Transport kind. Default: implied by the address scheme.
    pub fn transport_kind(mut self, kind: TransportKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Use a push transport.
    pub fn push(self) -> Self {
        self.transport_kind(TransportKind::Push)
    }

    /// Use a request/response transport, issuing one request at a time when
    /// `synchronous`.
    pub fn request_response(self, synchronous: bool) -> Self {
        self.transport_kind(TransportKind::RequestResponse { synchronous })
    }

    /// Use this transport instead of creating one from the address.
    pub fn transport(mut self, transport: TransportPtr) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Envelope encoding, and payload encoding unless set separately.
    ///
    /// Default: [`Encoding::Binary`].
    pub fn encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = Some(encoding);
        self
    }

    /// Payload encoding. Default: the envelope encoding.
    pub fn payload_encoding(mut self, encoding: Encoding) -> Self {
        self.payload_encoding = Some(encoding);
        self
    }

    /// Timeout applied by [`ServiceClient::call`].
    ///
    /// Default: none.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Open the transport and return a client in the open state.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Required fields missing (`descriptor`, `address`)
    /// - The address is malformed or uses an unsupported scheme
    /// - The transport kind contradicts the address scheme, or an explicit
    ///   transport is of a different kind than requested
    /// - The selected transport is not compiled in, or fails to open
    pub async fn build(self) -> Result<ServiceClient> {
        // ---
        let descriptor = self
            .descriptor
            .ok_or_else(|| RpcError::MissingConfig("descriptor".into()))?;
        let address = self
            .address
            .ok_or_else(|| RpcError::MissingConfig("address".into()))?;
        let address = Address::parse(&address)?;

        let kind = match (self.kind, &self.transport) {
            (Some(kind), _) => kind,
            (None, Some(transport)) => transport.kind(),
            (None, None) => address.default_kind(),
        };

        if !address.accepts(kind) {
            return Err(RpcError::ConfigConflict(format!(
                "{kind} transport cannot serve {address}"
            )));
        }

        let encoding = self.encoding.unwrap_or_default();
        let payload_encoding = self.payload_encoding.unwrap_or(encoding);

        let transport = match self.transport {
            Some(transport) => {
                if transport.kind() != kind {
                    return Err(RpcError::ConfigConflict(format!(
                        "transport is {}, configured kind is {kind}",
                        transport.kind()
                    )));
                }
                transport
            }
            None => {
                crate::create_transport(TransportConfig {
                    address: address.clone(),
                    kind,
                    content_type: encoding.content_type(),
                    textual: encoding.is_textual(),
                })
                .await?
            }
        };

        let mux = Multiplexer::open(transport, &address, encoding).await?;

        crate::log_debug!(
            "client for {} ready ({} methods, payloads as {payload_encoding})",
            descriptor.name(),
            descriptor.len()
        );

        Ok(ServiceClient::new(
            mux,
            descriptor,
            payload_encoding,
            self.request_timeout,
        ))
    }
}
