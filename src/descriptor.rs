//! Service descriptors.
//!
//! A [`ServiceDescriptor`] is the static method table of one service: which
//! methods exist, what they take and return, and whether they stream. It is
//! built once, validated, and handed to the client at construction time;
//! nothing about it is looked up from global state.

use serde::{Deserialize, Serialize};
use std::any::type_name;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::{Payload, Result, RpcError};

/// Whether a method answers once or keeps pushing updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MethodKind {
    /// Exactly one response per call.
    Unary,

    /// Any number of responses for one outstanding id, until the session
    /// ends or an error occurs.
    Streaming,
}

impl fmt::Display for MethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodKind::Unary => f.write_str("unary"),
            MethodKind::Streaming => f.write_str("streaming"),
        }
    }
}

/// One method of a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    name: Arc<str>,
    full_name: Arc<str>,
    kind: MethodKind,
    request_type: &'static str,
    response_type: &'static str,
}

impl MethodDescriptor {
    /// Short name, e.g. `add`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fully-qualified name sent on the wire, e.g. `.Calculator.Service.add`.
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn kind(&self) -> MethodKind {
        self.kind
    }

    pub fn is_streaming(&self) -> bool {
        self.kind == MethodKind::Streaming
    }

    /// Rust type name of the request payload.
    pub fn request_type(&self) -> &'static str {
        self.request_type
    }

    /// Rust type name of the response payload.
    pub fn response_type(&self) -> &'static str {
        self.response_type
    }

    /// Check that `Req`/`Resp` are the payload types this method was
    /// declared with.
    pub fn check_types<Req, Resp>(&self) -> Result<()> {
        // ---
        if type_name::<Req>() != self.request_type {
            return Err(RpcError::TypeMismatch {
                method: self.full_name.to_string(),
                expected: self.request_type,
                actual: type_name::<Req>(),
            });
        }
        if type_name::<Resp>() != self.response_type {
            return Err(RpcError::TypeMismatch {
                method: self.full_name.to_string(),
                expected: self.response_type,
                actual: type_name::<Resp>(),
            });
        }
        Ok(())
    }
}

/// Static description of one service and its methods.
///
/// Cheap to clone; clones share the method table.
///
/// # Example
///
/// ```ignore
/// let descriptor = ServiceDescriptor::builder(".Calculator.Service")
///     .unary::<AddRequest, AddResult>("add")
///     .streaming::<TickRequest, Tick>("ticks")
///     .build()?;
///
/// assert!(descriptor.method("add").is_some());
/// assert!(descriptor.method(".Calculator.Service.add").is_some());
/// ```
#[derive(Debug, Clone)]
pub struct ServiceDescriptor {
    name: Arc<str>,
    methods: Arc<[MethodDescriptor]>,
    // short and full names both map to an index into `methods`
    index: Arc<HashMap<Arc<str>, usize>>,
}

impl ServiceDescriptor {
    // ---

    /// Start describing the service with the given fully-qualified name.
    pub fn builder(name: impl Into<String>) -> ServiceDescriptorBuilder {
        ServiceDescriptorBuilder {
            name: name.into(),
            methods: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up a method by short or fully-qualified name.
    pub fn method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.index.get(name).map(|&i| &self.methods[i])
    }

    /// Like [`method`](Self::method), failing with
    /// [`RpcError::UnknownMethod`].
    pub fn resolve(&self, name: &str) -> Result<&MethodDescriptor> {
        self.method(name)
            .ok_or_else(|| RpcError::UnknownMethod(name.to_string()))
    }

    /// Methods in declaration order.
    pub fn methods(&self) -> impl Iterator<Item = &MethodDescriptor> {
        self.methods.iter()
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

/// Builder for [`ServiceDescriptor`].
pub struct ServiceDescriptorBuilder {
    name: String,
    methods: Vec<(String, MethodKind, &'static str, &'static str)>,
}

impl ServiceDescriptorBuilder {
    // ---

    /// Declare a unary method.
    pub fn unary<Req: Payload, Resp: Payload>(self, name: impl Into<String>) -> Self {
        self.method::<Req, Resp>(name, MethodKind::Unary)
    }

    /// Declare a streaming method.
    pub fn streaming<Req: Payload, Resp: Payload>(self, name: impl Into<String>) -> Self {
        self.method::<Req, Resp>(name, MethodKind::Streaming)
    }

    /// Declare a method of the given kind.
    pub fn method<Req: Payload, Resp: Payload>(
        mut self,
        name: impl Into<String>,
        kind: MethodKind,
    ) -> Self {
        self.methods
            .push((name.into(), kind, type_name::<Req>(), type_name::<Resp>()));
        self
    }

    /// Validate and freeze the descriptor.
    ///
    /// # Errors
    ///
    /// - [`RpcError::MissingConfig`] if the service name is empty, a method
    ///   name is empty, or no method was declared
    /// - [`RpcError::ConfigConflict`] if a method name is declared twice
    pub fn build(self) -> Result<ServiceDescriptor> {
        // ---
        let service = self.name.trim();
        if service.is_empty() {
            return Err(RpcError::MissingConfig("service name".into()));
        }
        if self.methods.is_empty() {
            return Err(RpcError::MissingConfig(format!(
                "at least one method for service {service}"
            )));
        }

        let mut methods = Vec::with_capacity(self.methods.len());
        let mut index = HashMap::with_capacity(self.methods.len() * 2);

        for (name, kind, request_type, response_type) in self.methods {
            if name.is_empty() {
                return Err(RpcError::MissingConfig(format!(
                    "method name in service {service}"
                )));
            }

            let short: Arc<str> = Arc::from(name.as_str());
            let full: Arc<str> = Arc::from(format!("{service}.{name}"));

            if index.contains_key(&short) || index.contains_key(&full) {
                return Err(RpcError::ConfigConflict(format!(
                    "method {full} declared twice"
                )));
            }

            index.insert(short.clone(), methods.len());
            index.insert(full.clone(), methods.len());
            methods.push(MethodDescriptor {
                name: short,
                full_name: full,
                kind,
                request_type,
                response_type,
            });
        }

        Ok(ServiceDescriptor {
            name: Arc::from(service),
            methods: methods.into(),
            index: Arc::new(index),
        })
    }
}
