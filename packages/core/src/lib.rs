//! SimpleMX core: exposing live objects to remote management clients.
//!
//! An application describes which members of an object are managed with a
//! [`Resource`] declaration table, registers the object with a [`Registry`],
//! and remote requests reach it through the [`Dispatcher`]:
//! - `StructuredName`: `domain:folders...,name=key` address of a managed object
//! - `Value`: dynamically typed attribute values, arguments and results
//! - `Descriptors`: validated attribute and operation table for one object
//! - `MetadataRecord`: human-readable description shipped to clients
//!
//! # Example
//!
//! ```rust
//! use std::sync::atomic::{AtomicI64, Ordering};
//! use std::sync::Arc;
//!
//! use simplemx_core::{Dispatcher, Managed, Registry, Resource, Value, ValueType};
//!
//! struct Counter {
//!     hits: AtomicI64,
//! }
//!
//! impl Managed for Counter {
//!     fn resource() -> Resource<Self> {
//!         Resource::new("app", "counter").getter("getHits", ValueType::Integer, |c: &Counter| {
//!             Ok(Value::from(c.hits.load(Ordering::Relaxed)))
//!         })
//!     }
//! }
//!
//! let registry = Arc::new(Registry::new());
//! let counter = Arc::new(Counter { hits: AtomicI64::new(3) });
//! let name = registry.register(&counter).unwrap();
//!
//! let dispatcher = Dispatcher::new(registry);
//! assert_eq!(dispatcher.get_attribute(&name, "hits").unwrap(), Value::Integer(3));
//! ```

mod dispatch;
mod error;
mod introspect;
mod metadata;
mod name;
mod registry;
mod resource;
mod value;

pub use dispatch::Dispatcher;
pub use error::{Error, MemberError, PublishError, Result};
pub use introspect::{
    introspect, AttributeDescriptor, Descriptors, Invoker, MemberDescriptor, MemberKind,
    OperationDescriptor,
};
pub use metadata::{describe, AttributeInfo, MetadataRecord, OperationInfo, ParameterInfo};
pub use name::{build_name, FolderName, StructuredName};
pub use registry::{Binding, Publisher, Registry};
pub use resource::{Exposure, Managed, MethodBody, MethodSpec, Resource, SelfNaming};
pub use value::{Value, ValueType};
