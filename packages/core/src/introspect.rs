//! Validation of declaration tables into descriptor sets.
//!
//! Attribute accessors must follow the getter/setter conventions:
//! - `getX()` returning a value, or `isX()` returning a bool
//! - `setX(value)` returning unit
//!
//! where `X` starts with an uppercase letter and is a valid identifier.
//! Getters and setters sharing `X` merge into one attribute. Operations keep
//! their method name and may be overloaded by parameter signature.

use std::any::Any;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::error::MemberError;
use crate::metadata::ParameterInfo;
use crate::resource::{Exposure, MethodBody, MethodSpec, Resource};
use crate::value::{Value, ValueType};
use crate::{Error, Result};

/// Type-erased callable for a member of a registered object.
pub type Invoker = Arc<
    dyn Fn(&(dyn Any + Send + Sync), Vec<Value>) -> std::result::Result<Value, MemberError>
        + Send
        + Sync,
>;

const GETTER_PREFIXES: [&str; 2] = ["get", "is"];
const SETTER_PREFIXES: [&str; 1] = ["set"];

/// Attribute backed by a getter, a setter, or both.
#[derive(Clone)]
pub struct AttributeDescriptor {
    pub name: String,
    pub value_type: ValueType,
    pub description: String,
    pub getter: Option<Invoker>,
    pub setter: Option<Invoker>,
}

impl AttributeDescriptor {
    pub fn is_readable(&self) -> bool {
        self.getter.is_some()
    }

    pub fn is_writable(&self) -> bool {
        self.setter.is_some()
    }
}

impl fmt::Debug for AttributeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeDescriptor")
            .field("name", &self.name)
            .field("value_type", &self.value_type)
            .field("readable", &self.is_readable())
            .field("writable", &self.is_writable())
            .finish_non_exhaustive()
    }
}

/// Invokable operation with its parameter metadata.
#[derive(Clone)]
pub struct OperationDescriptor {
    pub name: String,
    pub returns: ValueType,
    pub parameters: Vec<ParameterInfo>,
    pub description: String,
    pub invoker: Invoker,
}

impl OperationDescriptor {
    /// Parameter types in declaration order.
    pub fn signature(&self) -> Vec<ValueType> {
        self.parameters.iter().map(|p| p.value_type).collect()
    }
}

impl fmt::Debug for OperationDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationDescriptor")
            .field("name", &self.name)
            .field("returns", &self.returns)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MemberKind {
    Attribute,
    Operation,
}

#[derive(Clone, Debug)]
pub enum MemberDescriptor {
    Attribute(AttributeDescriptor),
    Operation(OperationDescriptor),
}

impl MemberDescriptor {
    pub fn kind(&self) -> MemberKind {
        match self {
            MemberDescriptor::Attribute(_) => MemberKind::Attribute,
            MemberDescriptor::Operation(_) => MemberKind::Operation,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            MemberDescriptor::Attribute(a) => &a.name,
            MemberDescriptor::Operation(o) => &o.name,
        }
    }

    /// Identity of the member: kind, name and parameter signature.
    pub fn key(&self) -> (MemberKind, &str, Vec<ValueType>) {
        match self {
            MemberDescriptor::Attribute(a) => (MemberKind::Attribute, &a.name, Vec::new()),
            MemberDescriptor::Operation(o) => (MemberKind::Operation, &o.name, o.signature()),
        }
    }
}

/// Validated members of one object, in declaration order.
#[derive(Clone, Debug, Default)]
pub struct Descriptors {
    members: Vec<MemberDescriptor>,
}

impl Descriptors {
    pub fn iter(&self) -> impl Iterator<Item = &MemberDescriptor> {
        self.members.iter()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.attributes().find(|a| a.name == name)
    }

    pub fn attributes(&self) -> impl Iterator<Item = &AttributeDescriptor> {
        self.members.iter().filter_map(|m| match m {
            MemberDescriptor::Attribute(a) => Some(a),
            MemberDescriptor::Operation(_) => None,
        })
    }

    /// Every overload of the named operation.
    pub fn operations<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a OperationDescriptor> {
        self.all_operations().filter(move |o| o.name == name)
    }

    pub fn all_operations(&self) -> impl Iterator<Item = &OperationDescriptor> {
        self.members.iter().filter_map(|m| match m {
            MemberDescriptor::Operation(o) => Some(o),
            MemberDescriptor::Attribute(_) => None,
        })
    }
}

/// Validate a declaration table and build its descriptor set.
///
/// Fails with [`Error::InvalidMember`] on the first method that does not
/// match a recognized shape; nothing is produced in that case.
pub fn introspect<T: Send + Sync + 'static>(resource: &Resource<T>) -> Result<Descriptors> {
    let mut order: Vec<Slot> = Vec::new();
    let mut attributes: Vec<AttributeDescriptor> = Vec::new();
    let mut attribute_slots: BTreeMap<String, usize> = BTreeMap::new();
    let mut signatures: HashSet<(String, Vec<ValueType>)> = HashSet::new();

    for method in resource.methods() {
        match method.exposure {
            Exposure::Attribute => {
                let accessor = classify_accessor(method)?;
                match attribute_slots.get(&accessor.attribute).copied() {
                    Some(index) => merge_accessor(&mut attributes[index], accessor, method)?,
                    None => {
                        let index = attributes.len();
                        attribute_slots.insert(accessor.attribute.clone(), index);
                        attributes.push(new_attribute(accessor, method));
                        order.push(Slot::Attribute(index));
                    }
                }
            }
            Exposure::Operation => {
                let operation = build_operation(method)?;
                if !signatures.insert((operation.name.clone(), operation.signature())) {
                    return Err(Error::invalid_member(
                        &method.name,
                        format!(
                            "operation with parameters ({}) is declared more than once",
                            signature_list(&operation.signature())
                        ),
                    ));
                }
                order.push(Slot::Operation(operation));
            }
        }
    }

    let members = order
        .into_iter()
        .map(|slot| match slot {
            Slot::Attribute(index) => MemberDescriptor::Attribute(attributes[index].clone()),
            Slot::Operation(operation) => MemberDescriptor::Operation(operation),
        })
        .collect();
    Ok(Descriptors { members })
}

/// Position of a member in declaration order. Attributes point into the
/// list of merged accessors.
enum Slot {
    Attribute(usize),
    Operation(OperationDescriptor),
}

enum Direction {
    Get,
    Set,
}

struct Accessor {
    attribute: String,
    direction: Direction,
    value_type: ValueType,
}

fn classify_accessor<T>(method: &MethodSpec<T>) -> Result<Accessor> {
    let (direction, value_type, prefixes): (Direction, ValueType, &[&'static str]) =
        match (method.params.as_slice(), method.returns) {
            ([], returns) if returns != ValueType::Unit => {
                (Direction::Get, returns, &GETTER_PREFIXES[..])
            }
            ([param], ValueType::Unit) if *param != ValueType::Unit => {
                (Direction::Set, *param, &SETTER_PREFIXES[..])
            }
            _ => {
                return Err(Error::invalid_member(
                    &method.name,
                    "attribute methods must be a getter taking no arguments and returning a \
                     value, or a setter taking one argument and returning unit",
                ))
            }
        };

    let (prefix, attribute) = strip_accessor_prefix(&method.name, prefixes)?;
    if prefix == "is" && value_type != ValueType::Bool {
        return Err(Error::invalid_member(
            &method.name,
            "'is' getters must return bool",
        ));
    }

    Ok(Accessor {
        attribute: decapitalize(attribute),
        direction,
        value_type,
    })
}

/// Strip a getter/setter prefix, leaving a capitalized identifier.
fn strip_accessor_prefix<'a>(
    method: &'a str,
    prefixes: &[&'static str],
) -> Result<(&'static str, &'a str)> {
    let Some((prefix, rest)) = prefixes
        .iter()
        .find_map(|prefix| method.strip_prefix(*prefix).map(|rest| (*prefix, rest)))
    else {
        return Err(Error::invalid_member(
            method,
            format!("accessor name must start with one of {:?}", prefixes),
        ));
    };

    match rest.chars().next() {
        None => Err(Error::invalid_member(
            method,
            format!("nothing follows the '{}' prefix", prefix),
        )),
        Some(first) if !first.is_uppercase() => Err(Error::invalid_member(
            method,
            format!("the name after '{}' must start with an uppercase letter", prefix),
        )),
        Some(_) if !is_identifier(rest) => Err(Error::invalid_member(
            method,
            format!("'{}' is not a valid identifier", rest),
        )),
        Some(_) => Ok((prefix, rest)),
    }
}

/// `Foo` becomes the attribute `foo`.
fn decapitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) if unicode_ident::is_xid_start(first) || first == '_' => {
            chars.all(unicode_ident::is_xid_continue)
        }
        _ => false,
    }
}

fn new_attribute<T: Send + Sync + 'static>(
    accessor: Accessor,
    method: &MethodSpec<T>,
) -> AttributeDescriptor {
    let invoker = erase(&method.body);
    let (getter, setter) = match accessor.direction {
        Direction::Get => (Some(invoker), None),
        Direction::Set => (None, Some(invoker)),
    };
    AttributeDescriptor {
        name: accessor.attribute,
        value_type: accessor.value_type,
        description: method.description.clone().unwrap_or_default(),
        getter,
        setter,
    }
}

fn merge_accessor<T: Send + Sync + 'static>(
    existing: &mut AttributeDescriptor,
    accessor: Accessor,
    method: &MethodSpec<T>,
) -> Result<()> {
    if existing.value_type != accessor.value_type {
        return Err(Error::invalid_member(
            &method.name,
            format!(
                "attribute '{}' is {} but this accessor uses {}",
                existing.name, existing.value_type, accessor.value_type
            ),
        ));
    }

    let slot = match accessor.direction {
        Direction::Get => &mut existing.getter,
        Direction::Set => &mut existing.setter,
    };
    if slot.is_some() {
        return Err(Error::invalid_member(
            &method.name,
            format!("attribute '{}' already has this accessor", existing.name),
        ));
    }
    *slot = Some(erase(&method.body));

    if existing.description.is_empty() {
        if let Some(description) = &method.description {
            existing.description = description.clone();
        }
    }
    Ok(())
}

fn build_operation<T: Send + Sync + 'static>(
    method: &MethodSpec<T>,
) -> Result<OperationDescriptor> {
    if !is_identifier(&method.name) {
        return Err(Error::invalid_member(
            &method.name,
            "operation name is not a valid identifier",
        ));
    }
    if method.params.contains(&ValueType::Unit) {
        return Err(Error::invalid_member(
            &method.name,
            "parameters cannot have the unit type",
        ));
    }
    let arity = method.params.len();
    if method.parameter_names.len() > arity || method.parameter_descriptions.len() > arity {
        return Err(Error::invalid_member(
            &method.name,
            format!(
                "{} parameter(s) declared but {} name(s) and {} description(s) given",
                arity,
                method.parameter_names.len(),
                method.parameter_descriptions.len()
            ),
        ));
    }

    let parameters = method
        .params
        .iter()
        .enumerate()
        .map(|(i, value_type)| ParameterInfo {
            name: method
                .parameter_names
                .get(i)
                .cloned()
                .unwrap_or_else(|| format!("p{}", i + 1)),
            value_type: *value_type,
            description: method
                .parameter_descriptions
                .get(i)
                .cloned()
                .unwrap_or_else(|| format!("parameter {}", i + 1)),
        })
        .collect();

    Ok(OperationDescriptor {
        name: method.name.clone(),
        returns: method.returns,
        parameters,
        description: method.description.clone().unwrap_or_default(),
        invoker: erase(&method.body),
    })
}

fn erase<T: Send + Sync + 'static>(body: &MethodBody<T>) -> Invoker {
    let body = Arc::clone(body);
    Arc::new(
        move |target: &(dyn Any + Send + Sync),
              args: Vec<Value>|
              -> std::result::Result<Value, MemberError> {
            let target = target
                .downcast_ref::<T>()
                .ok_or("managed object has an unexpected type")?;
            body(target, args)
        },
    )
}

pub(crate) fn signature_list(signature: &[ValueType]) -> String {
    signature
        .iter()
        .map(ValueType::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Thing;

    fn zero(_: &Thing) -> std::result::Result<Value, MemberError> {
        Ok(Value::Integer(0))
    }

    fn ignore(_: &Thing, _: Value) -> std::result::Result<(), MemberError> {
        Ok(())
    }

    fn invalid_member(resource: Resource<Thing>) -> String {
        match introspect(&resource) {
            Err(Error::InvalidMember { member, .. }) => member,
            other => panic!("expected InvalidMember, got {:?}", other),
        }
    }

    #[test]
    fn getter_and_setter_merge() {
        let resource = Resource::new("d", "o")
            .getter("getFoo", ValueType::Integer, zero)
            .setter("setFoo", ValueType::Integer, ignore);
        let descriptors = introspect(&resource).unwrap();

        assert_eq!(descriptors.len(), 1);
        let foo = descriptors.attribute("foo").unwrap();
        assert!(foo.is_readable());
        assert!(foo.is_writable());
        assert_eq!(foo.value_type, ValueType::Integer);
    }

    #[test]
    fn attribute_names_start_lowercase() {
        let resource = Resource::new("d", "o")
            .getter("getFooBar", ValueType::Integer, zero)
            .getter("getÉtat", ValueType::Integer, zero);
        let descriptors = introspect(&resource).unwrap();
        let names: Vec<_> = descriptors.iter().map(MemberDescriptor::name).collect();
        assert_eq!(names, ["fooBar", "état"]);
        assert!(descriptors.attribute("FooBar").is_none());
    }

    #[test]
    fn members_keep_declaration_order() {
        let resource = Resource::new("d", "o")
            .getter("getFoo", ValueType::Integer, zero)
            .operation("resetFoo", [], ValueType::Unit, |_: &Thing, _| Ok(Value::Null))
            .getter("getBar", ValueType::Integer, zero)
            .setter("setFoo", ValueType::Integer, ignore);
        let descriptors = introspect(&resource).unwrap();
        let kinds: Vec<_> = descriptors.iter().map(|m| (m.kind(), m.name())).collect();
        assert_eq!(
            kinds,
            [
                (MemberKind::Attribute, "foo"),
                (MemberKind::Operation, "resetFoo"),
                (MemberKind::Attribute, "bar"),
            ]
        );
        assert!(descriptors.attribute("foo").unwrap().is_writable());
    }

    #[test]
    fn is_getter_for_bools() {
        let resource = Resource::new("d", "o").getter("isEnabled", ValueType::Bool, |_: &Thing| {
            Ok(Value::Bool(true))
        });
        let descriptors = introspect(&resource).unwrap();
        assert!(descriptors.attribute("enabled").unwrap().is_readable());

        let resource = Resource::new("d", "o").getter("isCount", ValueType::Integer, zero);
        assert_eq!(invalid_member(resource), "isCount");
    }

    #[test]
    fn setter_only_attribute() {
        let resource = Resource::new("d", "o").setter("setLevel", ValueType::String, ignore);
        let level = introspect(&resource).unwrap().attribute("level").cloned().unwrap();
        assert!(!level.is_readable());
        assert!(level.is_writable());
    }

    #[test]
    fn bare_prefix_rejected() {
        let resource = Resource::new("d", "o").getter("get", ValueType::Integer, zero);
        assert_eq!(invalid_member(resource), "get");

        let resource = Resource::new("d", "o").getter("is", ValueType::Bool, |_: &Thing| {
            Ok(Value::Bool(false))
        });
        assert_eq!(invalid_member(resource), "is");

        let resource = Resource::new("d", "o").setter("set", ValueType::Integer, ignore);
        assert_eq!(invalid_member(resource), "set");
    }

    #[test]
    fn unprefixed_short_name_rejected() {
        let resource = Resource::new("d", "o").getter("x", ValueType::Integer, zero);
        assert_eq!(invalid_member(resource), "x");
    }

    #[test]
    fn lowercase_after_prefix_rejected() {
        let resource = Resource::new("d", "o").getter("getfoo", ValueType::Integer, zero);
        assert_eq!(invalid_member(resource), "getfoo");

        let resource = Resource::new("d", "o").getter("isolated", ValueType::Bool, |_: &Thing| {
            Ok(Value::Bool(false))
        });
        assert_eq!(invalid_member(resource), "isolated");
    }

    #[test]
    fn invalid_identifier_rejected() {
        let resource = Resource::new("d", "o").getter("getFoo-Bar", ValueType::Integer, zero);
        assert_eq!(invalid_member(resource), "getFoo-Bar");
    }

    #[test]
    fn wrong_arity_rejected() {
        let resource = Resource::new("d", "o").method(MethodSpec::attribute(
            "getFoo",
            [ValueType::Integer],
            ValueType::Integer,
            |_: &Thing, _| Ok(Value::Null),
        ));
        assert_eq!(invalid_member(resource), "getFoo");

        let resource = Resource::new("d", "o").method(MethodSpec::attribute(
            "getFoo",
            [],
            ValueType::Unit,
            |_: &Thing, _| Ok(Value::Null),
        ));
        assert_eq!(invalid_member(resource), "getFoo");

        let resource = Resource::new("d", "o").method(MethodSpec::attribute(
            "setFoo",
            [ValueType::Integer, ValueType::Integer],
            ValueType::Unit,
            |_: &Thing, _| Ok(Value::Null),
        ));
        assert_eq!(invalid_member(resource), "setFoo");
    }

    #[test]
    fn mismatched_pair_rejected() {
        let resource = Resource::new("d", "o")
            .getter("getFoo", ValueType::Integer, zero)
            .setter("setFoo", ValueType::String, ignore);
        assert_eq!(invalid_member(resource), "setFoo");
    }

    #[test]
    fn duplicate_getter_rejected() {
        let resource = Resource::new("d", "o")
            .getter("getFlag", ValueType::Bool, |_: &Thing| Ok(Value::Bool(true)))
            .getter("isFlag", ValueType::Bool, |_: &Thing| Ok(Value::Bool(true)));
        assert_eq!(invalid_member(resource), "isFlag");
    }

    #[test]
    fn operations_keep_names_and_overload() {
        let resource = Resource::new("d", "o")
            .operation("resetFoo", [], ValueType::Unit, |_: &Thing, _| Ok(Value::Null))
            .operation("resetFoo", [ValueType::Integer], ValueType::Unit, |_: &Thing, _| {
                Ok(Value::Null)
            });
        let descriptors = introspect(&resource).unwrap();
        assert_eq!(descriptors.operations("resetFoo").count(), 2);
        assert!(descriptors.attribute("resetFoo").is_none());
    }

    #[test]
    fn duplicate_signature_rejected() {
        let resource = Resource::new("d", "o")
            .operation("doIt", [ValueType::Integer], ValueType::Unit, |_: &Thing, _| {
                Ok(Value::Null)
            })
            .operation("doIt", [ValueType::Integer], ValueType::Bool, |_: &Thing, _| {
                Ok(Value::Bool(true))
            });
        assert_eq!(invalid_member(resource), "doIt");
    }

    #[test]
    fn parameter_defaults() {
        let resource = Resource::new("d", "o").method(
            MethodSpec::operation(
                "doSomething",
                [ValueType::String, ValueType::Integer],
                ValueType::String,
                |_: &Thing, mut args| Ok(args.remove(0)),
            )
            .parameter_names(["first"])
            .parameter_descriptions(["First argument"]),
        );
        let descriptors = introspect(&resource).unwrap();
        let op = descriptors.operations("doSomething").next().unwrap();
        assert_eq!(op.parameters[0].name, "first");
        assert_eq!(op.parameters[0].description, "First argument");
        assert_eq!(op.parameters[1].name, "p2");
        assert_eq!(op.parameters[1].description, "parameter 2");
        assert_eq!(op.description, "");
    }

    #[test]
    fn too_many_parameter_names_rejected() {
        let resource = Resource::new("d", "o").method(
            MethodSpec::operation("doIt", [], ValueType::Unit, |_: &Thing, _| Ok(Value::Null))
                .parameter_names(["extra"]),
        );
        assert_eq!(invalid_member(resource), "doIt");
    }

    #[test]
    fn invoker_calls_body() {
        let resource = Resource::new("d", "o").getter("getFoo", ValueType::Integer, |_: &Thing| {
            Ok(Value::Integer(7))
        });
        let descriptors = introspect(&resource).unwrap();
        let getter = descriptors.attribute("foo").unwrap().getter.clone().unwrap();
        assert_eq!(getter(&Thing, Vec::new()).unwrap(), Value::Integer(7));

        // A target of another type is reported, not trusted
        assert!(getter(&"not a thing", Vec::new()).is_err());
    }
}
