//! Typed service stubs.
//!
//! [`rpc_service!`](crate::rpc_service) turns a method table into a struct
//! with one callback-style method per RPC, the shape a schema code
//! generator would emit.

/// Declare a typed client stub for one service.
///
/// ```ignore
/// protomux::rpc_service! {
///     /// Calculator client.
///     pub service Calculator(".Calculator.Service") {
///         unary fn add(AddRequest) -> AddResult;
///         unary fn div(DivRequest) -> DivResult;
///         streaming fn ticks(TickRequest) -> Tick;
///     }
/// }
///
/// let calculator = Calculator::connect(
///     ServiceClientBuilder::new().address("ws://localhost:8089"),
/// ).await?;
///
/// calculator.add(&AddRequest { lhs: 2, rhs: 3 }, |result| {
///     assert_eq!(result.unwrap().value, 5);
/// })?;
/// ```
///
/// Each generated method has the signature
/// `fn name<F>(&self, request: &Req, callback: F) -> Result<RequestId>`
/// with `F: FnMut(Result<Resp>) + Send + 'static`.
#[macro_export]
macro_rules! rpc_service {
    (@kind unary) => {
        $crate::MethodKind::Unary
    };
    (@kind streaming) => {
        $crate::MethodKind::Streaming
    };

    (
        $(#[$meta:meta])*
        $vis:vis service $client:ident($path:literal) {
            $(
                $(#[$method_meta:meta])*
                $kind:ident fn $method:ident($req:ty) -> $resp:ty;
            )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone)]
        $vis struct $client {
            inner: $crate::ServiceClient,
        }

        impl $client {
            /// Method table of this service.
            pub fn descriptor() -> $crate::Result<$crate::ServiceDescriptor> {
                $crate::ServiceDescriptor::builder($path)
                    $(
                        .method::<$req, $resp>(
                            stringify!($method),
                            $crate::rpc_service!(@kind $kind),
                        )
                    )+
                    .build()
            }

            /// Build and open a client; the descriptor is filled in.
            pub async fn connect(builder: $crate::ServiceClientBuilder) -> $crate::Result<Self> {
                let inner = builder.descriptor(Self::descriptor()?).build().await?;
                Ok(Self { inner })
            }

            /// Wrap an existing client built with this service's descriptor.
            pub fn from_client(inner: $crate::ServiceClient) -> $crate::Result<Self> {
                if inner.descriptor().name() != $path {
                    return Err($crate::RpcError::ConfigConflict(format!(
                        "client is for {}, not {}",
                        inner.descriptor().name(),
                        $path
                    )));
                }
                Ok(Self { inner })
            }

            /// Underlying untyped client.
            pub fn client(&self) -> &$crate::ServiceClient {
                &self.inner
            }

            /// End the session. See [`ServiceClient::end_session`]($crate::ServiceClient::end_session).
            pub async fn end_session(&self) -> $crate::Result<()> {
                self.inner.end_session().await
            }

            $(
                $(#[$method_meta])*
                pub fn $method<F>(&self, request: &$req, callback: F) -> $crate::Result<$crate::RequestId>
                where
                    F: FnMut($crate::Result<$resp>) + Send + 'static,
                {
                    self.inner
                        .invoke::<$req, $resp, F>(stringify!($method), request, callback)
                }
            )+
        }
    };
}
