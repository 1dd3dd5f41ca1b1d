//! Declaration tables: what an object exposes and under which name.
//!
//! Instead of discovering members at runtime, each managed type supplies a
//! [`Resource`] listing its exposed methods. The [`introspect`](crate::introspect)
//! step validates the table when the object is registered.

use std::fmt;
use std::sync::Arc;

use crate::error::MemberError;
use crate::name::FolderName;
use crate::value::{Value, ValueType};

/// Body of an exposed method: receives the object and the already coerced
/// arguments.
pub type MethodBody<T> = Arc<dyn Fn(&T, Vec<Value>) -> Result<Value, MemberError> + Send + Sync>;

/// How a method is exposed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Exposure {
    /// A getter (`getX`/`isX`) or setter (`setX`) backing an attribute.
    Attribute,
    /// An invokable action.
    Operation,
}

/// Declaration of one exposed method.
pub struct MethodSpec<T> {
    pub(crate) name: String,
    pub(crate) exposure: Exposure,
    pub(crate) params: Vec<ValueType>,
    pub(crate) returns: ValueType,
    pub(crate) description: Option<String>,
    pub(crate) parameter_names: Vec<String>,
    pub(crate) parameter_descriptions: Vec<String>,
    pub(crate) body: MethodBody<T>,
}

impl<T> MethodSpec<T> {
    fn new<F>(
        name: impl Into<String>,
        exposure: Exposure,
        params: impl IntoIterator<Item = ValueType>,
        returns: ValueType,
        body: F,
    ) -> Self
    where
        F: Fn(&T, Vec<Value>) -> Result<Value, MemberError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            exposure,
            params: params.into_iter().collect(),
            returns,
            description: None,
            parameter_names: Vec::new(),
            parameter_descriptions: Vec::new(),
            body: Arc::new(body),
        }
    }

    /// An attribute accessor with an arbitrary shape.
    ///
    /// The shape is only checked at registration; prefer [`MethodSpec::getter`]
    /// and [`MethodSpec::setter`].
    pub fn attribute<F>(
        name: impl Into<String>,
        params: impl IntoIterator<Item = ValueType>,
        returns: ValueType,
        body: F,
    ) -> Self
    where
        F: Fn(&T, Vec<Value>) -> Result<Value, MemberError> + Send + Sync + 'static,
    {
        Self::new(name, Exposure::Attribute, params, returns, body)
    }

    /// A zero-argument getter such as `getFoo` or `isEnabled`.
    pub fn getter<F>(name: impl Into<String>, value_type: ValueType, get: F) -> Self
    where
        F: Fn(&T) -> Result<Value, MemberError> + Send + Sync + 'static,
    {
        Self::attribute(name, [], value_type, move |target, _| get(target))
    }

    /// A one-argument setter such as `setFoo`.
    pub fn setter<F>(name: impl Into<String>, value_type: ValueType, set: F) -> Self
    where
        F: Fn(&T, Value) -> Result<(), MemberError> + Send + Sync + 'static,
    {
        Self::attribute(name, [value_type], ValueType::Unit, move |target, args| {
            let value = args.into_iter().next().unwrap_or_default();
            set(target, value)?;
            Ok(Value::Null)
        })
    }

    /// An operation taking `params` and returning `returns`.
    pub fn operation<F>(
        name: impl Into<String>,
        params: impl IntoIterator<Item = ValueType>,
        returns: ValueType,
        body: F,
    ) -> Self
    where
        F: Fn(&T, Vec<Value>) -> Result<Value, MemberError> + Send + Sync + 'static,
    {
        Self::new(name, Exposure::Operation, params, returns, body)
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn parameter_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parameter_names = names.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn parameter_descriptions<I, S>(mut self, descriptions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parameter_descriptions = descriptions.into_iter().map(Into::into).collect();
        self
    }
}

impl<T> fmt::Debug for MethodSpec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodSpec")
            .field("name", &self.name)
            .field("exposure", &self.exposure)
            .field("params", &self.params)
            .field("returns", &self.returns)
            .finish_non_exhaustive()
    }
}

/// Declared metadata of a managed type: naming plus exposed methods.
pub struct Resource<T> {
    domain_name: String,
    object_name: String,
    description: Option<String>,
    folder_names: Vec<String>,
    methods: Vec<MethodSpec<T>>,
}

impl<T> Resource<T> {
    /// Start a declaration. An empty `object_name` registers the object
    /// under its type name.
    pub fn new(domain_name: impl Into<String>, object_name: impl Into<String>) -> Self {
        Self {
            domain_name: domain_name.into(),
            object_name: object_name.into(),
            description: None,
            folder_names: Vec::new(),
            methods: Vec::new(),
        }
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Append a `field=value` or bare `value` folder segment.
    #[must_use]
    pub fn folder(mut self, folder: impl Into<String>) -> Self {
        self.folder_names.push(folder.into());
        self
    }

    #[must_use]
    pub fn method(mut self, method: MethodSpec<T>) -> Self {
        self.methods.push(method);
        self
    }

    #[must_use]
    pub fn getter<F>(self, name: impl Into<String>, value_type: ValueType, get: F) -> Self
    where
        F: Fn(&T) -> Result<Value, MemberError> + Send + Sync + 'static,
    {
        self.method(MethodSpec::getter(name, value_type, get))
    }

    #[must_use]
    pub fn setter<F>(self, name: impl Into<String>, value_type: ValueType, set: F) -> Self
    where
        F: Fn(&T, Value) -> Result<(), MemberError> + Send + Sync + 'static,
    {
        self.method(MethodSpec::setter(name, value_type, set))
    }

    #[must_use]
    pub fn operation<F>(
        self,
        name: impl Into<String>,
        params: impl IntoIterator<Item = ValueType>,
        returns: ValueType,
        body: F,
    ) -> Self
    where
        F: Fn(&T, Vec<Value>) -> Result<Value, MemberError> + Send + Sync + 'static,
    {
        self.method(MethodSpec::operation(name, params, returns, body))
    }

    pub fn domain_name(&self) -> &str {
        &self.domain_name
    }

    pub fn object_name(&self) -> &str {
        &self.object_name
    }

    pub fn object_description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn folder_names(&self) -> &[String] {
        &self.folder_names
    }

    pub fn methods(&self) -> &[MethodSpec<T>] {
        &self.methods
    }
}

impl<T> fmt::Debug for Resource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("domain_name", &self.domain_name)
            .field("object_name", &self.object_name)
            .field("folder_names", &self.folder_names)
            .field("methods", &self.methods)
            .finish()
    }
}

/// A type whose instances can be registered for remote management.
pub trait Managed: Send + Sync + Sized + 'static {
    /// The declaration every instance of this type registers with.
    fn resource() -> Resource<Self>;

    /// Instances that name themselves return their [`SelfNaming`] here; it
    /// replaces the declared domain, object name and folders.
    fn self_naming(&self) -> Option<&dyn SelfNaming> {
        None
    }
}

/// Capability of an object that supplies its own name.
pub trait SelfNaming {
    fn domain_name(&self) -> String;

    fn object_name(&self) -> String;

    /// `None` or an empty list means no folders.
    fn folder_names(&self) -> Option<Vec<FolderName>> {
        None
    }
}
