//! Human-readable descriptions of managed objects.

use serde::{Deserialize, Serialize};

use crate::introspect::{Descriptors, MemberDescriptor};
use crate::value::ValueType;

/// Name, type and description of one operation parameter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    pub description: String,
    pub readable: bool,
    pub writable: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationInfo {
    pub name: String,
    pub returns: ValueType,
    pub description: String,
    pub parameters: Vec<ParameterInfo>,
}

/// Description bundle answered to remote introspection queries.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub description: String,
    pub attributes: Vec<AttributeInfo>,
    pub operations: Vec<OperationInfo>,
}

impl MetadataRecord {
    pub fn attribute(&self, name: &str) -> Option<&AttributeInfo> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// First declared overload of the named operation.
    pub fn operation(&self, name: &str) -> Option<&OperationInfo> {
        self.operations.iter().find(|o| o.name == name)
    }
}

/// Build the description record for a descriptor set.
///
/// Absent descriptions are empty strings; parameter names and descriptions
/// already carry their positional defaults from introspection.
pub fn describe(descriptors: &Descriptors, description: Option<&str>) -> MetadataRecord {
    let mut record = MetadataRecord {
        description: description.unwrap_or_default().to_string(),
        ..MetadataRecord::default()
    };

    for member in descriptors.iter() {
        match member {
            MemberDescriptor::Attribute(a) => record.attributes.push(AttributeInfo {
                name: a.name.clone(),
                value_type: a.value_type,
                description: a.description.clone(),
                readable: a.is_readable(),
                writable: a.is_writable(),
            }),
            MemberDescriptor::Operation(o) => record.operations.push(OperationInfo {
                name: o.name.clone(),
                returns: o.returns,
                description: o.description.clone(),
                parameters: o.parameters.clone(),
            }),
        }
    }

    record
}
