//! Dispatching remote requests against registered objects.
//!
//! The registry lock is only held while resolving the binding; member bodies
//! run without it, so a slow or blocked member never holds up registration
//! of other objects.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::introspect::{signature_list, Invoker, OperationDescriptor};
use crate::metadata::MetadataRecord;
use crate::name::StructuredName;
use crate::registry::{Binding, Registry};
use crate::value::{Value, ValueType};
use crate::{Error, MemberError, Result};

/// A member body that panicked instead of returning an error.
#[derive(Debug, Error)]
#[error("member panicked: {0}")]
struct Panicked(String);

/// A getter returned something its declared type does not admit.
#[derive(Debug, Error)]
#[error("returned {found} where {expected} was declared")]
struct BadReturn {
    expected: ValueType,
    found: &'static str,
}

/// Get, set and invoke against the bindings of a [`Registry`].
#[derive(Clone, Debug)]
pub struct Dispatcher {
    registry: Arc<Registry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Metadata record of a registered object that is still alive.
    pub fn describe(&self, name: &StructuredName) -> Result<MetadataRecord> {
        let (binding, _target) = self.resolve(name)?;
        Ok(binding.metadata().clone())
    }

    /// Read the current value of an attribute.
    pub fn get_attribute(&self, name: &StructuredName, attribute: &str) -> Result<Value> {
        let (binding, target) = self.resolve(name)?;
        let descriptor = binding
            .descriptors()
            .attribute(attribute)
            .ok_or_else(|| no_such_member(name, attribute))?;
        let getter = descriptor.getter.as_ref().ok_or_else(|| Error::NotReadable {
            name: name.clone(),
            attribute: attribute.to_string(),
        })?;

        debug!(name = %name, attribute, "get attribute");
        let value = call(name, attribute, getter, target.as_ref(), Vec::new())?;
        descriptor.value_type.coerce(&value).ok_or_else(|| Error::Invocation {
            name: name.clone(),
            member: attribute.to_string(),
            source: Box::new(BadReturn {
                expected: descriptor.value_type,
                found: value.type_name(),
            }),
        })
    }

    /// Coerce `value` to the attribute's type and pass it to the setter.
    pub fn set_attribute(
        &self,
        name: &StructuredName,
        attribute: &str,
        value: Value,
    ) -> Result<()> {
        let (binding, target) = self.resolve(name)?;
        let descriptor = binding
            .descriptors()
            .attribute(attribute)
            .ok_or_else(|| no_such_member(name, attribute))?;
        let setter = descriptor.setter.as_ref().ok_or_else(|| Error::NotWritable {
            name: name.clone(),
            attribute: attribute.to_string(),
        })?;
        let value = coerce_args(attribute, &[descriptor.value_type], &[value])?;

        debug!(name = %name, attribute, "set attribute");
        call(name, attribute, setter, target.as_ref(), value)?;
        Ok(())
    }

    /// Invoke the overload of `operation` that accepts `args`.
    ///
    /// An overload accepting every argument as-is wins over ones that need
    /// coercion. Two overloads that qualify at the same stage are rejected
    /// with [`Error::AmbiguousOperation`].
    pub fn invoke(
        &self,
        name: &StructuredName,
        operation: &str,
        args: Vec<Value>,
    ) -> Result<Value> {
        let (binding, target) = self.resolve(name)?;
        let (descriptor, args) = select_overload(name, &binding, operation, args)?;

        debug!(name = %name, operation, args = args.len(), "invoke operation");
        call(name, operation, &descriptor.invoker, target.as_ref(), args)
    }

    /// Invoke the overload whose parameter types are exactly `signature`.
    pub fn invoke_signature(
        &self,
        name: &StructuredName,
        operation: &str,
        signature: &[ValueType],
        args: Vec<Value>,
    ) -> Result<Value> {
        let (binding, target) = self.resolve(name)?;
        let descriptor = binding
            .descriptors()
            .operations(operation)
            .find(|o| o.signature() == signature)
            .ok_or_else(|| {
                no_such_member(name, &format!("{}({})", operation, signature_list(signature)))
            })?;
        if args.len() != signature.len() {
            return Err(no_such_member(
                name,
                &format!("{}/{}", operation, args.len()),
            ));
        }
        let args = coerce_args(operation, signature, &args)?;

        debug!(name = %name, operation, "invoke operation by signature");
        call(name, operation, &descriptor.invoker, target.as_ref(), args)
    }

    fn resolve(
        &self,
        name: &StructuredName,
    ) -> Result<(Arc<Binding>, Arc<dyn Any + Send + Sync>)> {
        let binding = self.registry.lookup(name)?;
        let target = binding
            .target()
            .ok_or_else(|| Error::NotFound(name.clone()))?;
        Ok((binding, target))
    }
}

fn no_such_member(name: &StructuredName, member: &str) -> Error {
    Error::NoSuchMember {
        name: name.clone(),
        member: member.to_string(),
    }
}

fn coerce_args(member: &str, params: &[ValueType], args: &[Value]) -> Result<Vec<Value>> {
    params
        .iter()
        .zip(args)
        .enumerate()
        .map(|(position, (expected, arg))| {
            expected.coerce(arg).ok_or_else(|| Error::TypeMismatch {
                member: member.to_string(),
                position,
                expected: *expected,
                found: arg.type_name().to_string(),
            })
        })
        .collect()
}

fn select_overload<'a>(
    name: &StructuredName,
    binding: &'a Binding,
    operation: &'a str,
    args: Vec<Value>,
) -> Result<(&'a OperationDescriptor, Vec<Value>)> {
    let candidates: Vec<&OperationDescriptor> = binding
        .descriptors()
        .operations(operation)
        .filter(|o| o.parameters.len() == args.len())
        .collect();
    if candidates.is_empty() {
        return Err(no_such_member(
            name,
            &format!("{}/{}", operation, args.len()),
        ));
    }

    let exact: Vec<_> = candidates
        .iter()
        .copied()
        .filter(|o| o.parameters.iter().zip(&args).all(|(p, a)| p.value_type.matches(a)))
        .collect();
    match exact.as_slice() {
        [only] => return Ok((*only, args)),
        [] => {}
        several => return Err(ambiguous(name, operation, args.len(), several)),
    }

    let mut coercible = Vec::new();
    let mut first_mismatch = None;
    for candidate in &candidates {
        match coerce_args(operation, &candidate.signature(), &args) {
            Ok(coerced) => coercible.push((*candidate, coerced)),
            Err(err) => {
                first_mismatch.get_or_insert(err);
            }
        }
    }
    match coercible.len() {
        1 => Ok(coercible.remove(0)),
        0 => Err(first_mismatch.unwrap_or_else(|| no_such_member(name, operation))),
        _ => {
            let several: Vec<_> = coercible.iter().map(|(o, _)| *o).collect();
            Err(ambiguous(name, operation, args.len(), &several))
        }
    }
}

fn ambiguous(
    name: &StructuredName,
    operation: &str,
    arity: usize,
    candidates: &[&OperationDescriptor],
) -> Error {
    let candidates = candidates
        .iter()
        .map(|o| format!("({})", signature_list(&o.signature())))
        .collect::<Vec<_>>()
        .join(" ");
    Error::AmbiguousOperation {
        name: name.clone(),
        operation: operation.to_string(),
        arity,
        candidates,
    }
}

/// Run a member body, turning its errors and panics into
/// [`Error::Invocation`].
fn call(
    name: &StructuredName,
    member: &str,
    invoker: &Invoker,
    target: &(dyn Any + Send + Sync),
    args: Vec<Value>,
) -> Result<Value> {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| invoker(target, args)));
    let source: MemberError = match outcome {
        Ok(Ok(value)) => return Ok(value),
        Ok(Err(source)) => source,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic payload".to_string());
            Box::new(Panicked(message))
        }
    };

    warn!(name = %name, member, error = %source, "managed member failed");
    Err(Error::Invocation {
        name: name.clone(),
        member: member.to_string(),
        source,
    })
}
