//! Structured names for managed objects.
//!
//! A name is a domain, an ordered list of folder segments and a primary key.
//! It renders as `domain:field=value,...,name=key`:
//!
//! ```rust
//! use simplemx_core::{FolderName, StructuredName};
//!
//! let name = StructuredName::new(
//!     "j256",
//!     "testObject",
//!     vec![FolderName::parse("b=B").unwrap(), FolderName::new("C")],
//! )
//! .unwrap();
//! assert_eq!(name.to_string(), "j256:b=B,00=C,name=testObject");
//! ```

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::resource::{Managed, Resource, SelfNaming};
use crate::{Error, Result};

/// Characters that separate parts of a rendered name.
const RESERVED: &[char] = &[':', ',', '=', '*', '?', '"', '\n', '\r'];

/// Field that carries the primary key in the rendered form.
const PRIMARY_KEY_FIELD: &str = "name";

/// One folder segment of a structured name.
///
/// Either a `field=value` pair, or a bare value whose field is assigned when
/// the name is rendered: the zero-padded index of the segment among the
/// other bare segments.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FolderName {
    field: Option<String>,
    value: String,
}

impl FolderName {
    /// A bare value whose field is numbered automatically.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            field: None,
            value: value.into(),
        }
    }

    pub fn with_field(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            value: value.into(),
        }
    }

    /// Parse `field=value` or a bare `value`. Splits at the first `=`.
    pub fn parse(s: &str) -> Result<Self> {
        let folder = match s.split_once('=') {
            Some((field, value)) => Self::with_field(field, value),
            None => Self::new(s),
        };
        folder.validate()?;
        Ok(folder)
    }

    pub fn field(&self) -> Option<&str> {
        self.field.as_deref()
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    fn validate(&self) -> Result<()> {
        if let Some(field) = &self.field {
            check_part("folder field", field)?;
        }
        check_part("folder value", &self.value)
    }
}

impl fmt::Display for FolderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{}={}", field, self.value),
            None => f.write_str(&self.value),
        }
    }
}

fn check_part(what: &str, part: &str) -> Result<()> {
    if part.trim().is_empty() {
        return Err(Error::invalid_name(format!("{} is empty", what)));
    }
    if let Some(c) = part.chars().find(|c| RESERVED.contains(c)) {
        return Err(Error::invalid_name(format!(
            "{} '{}' contains reserved character {:?}",
            what, part, c
        )));
    }
    Ok(())
}

/// Address of a managed object.
///
/// Equality, ordering and hashing use the rendered form, so a name parsed
/// from `j256:00=FolderName,name=testObject` equals the one built from a bare
/// `FolderName` segment.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StructuredName {
    domain: String,
    primary_key: String,
    folders: Vec<FolderName>,
    rendered: String,
}

impl StructuredName {
    /// Validate the parts and build the name.
    ///
    /// Fails with [`Error::InvalidName`] when the domain or primary key is
    /// blank, any part contains a reserved character, or two folder segments
    /// render to the same field.
    pub fn new(
        domain: impl Into<String>,
        primary_key: impl Into<String>,
        folders: Vec<FolderName>,
    ) -> Result<Self> {
        let domain = domain.into();
        let primary_key = primary_key.into();

        check_part("domain name", &domain)?;
        check_part("object name", &primary_key)?;
        for folder in &folders {
            folder.validate()?;
        }

        let mut seen = HashSet::new();
        seen.insert(PRIMARY_KEY_FIELD.to_string());
        let mut rendered = format!("{}:", domain);
        for (field, value) in resolve_fields(&folders) {
            if !seen.insert(field.clone()) {
                return Err(Error::invalid_name(format!(
                    "folder field '{}' appears more than once",
                    field
                )));
            }
            rendered.push_str(&field);
            rendered.push('=');
            rendered.push_str(value);
            rendered.push(',');
        }
        rendered.push_str(PRIMARY_KEY_FIELD);
        rendered.push('=');
        rendered.push_str(&primary_key);

        Ok(Self {
            domain,
            primary_key,
            folders,
            rendered,
        })
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn folders(&self) -> &[FolderName] {
        &self.folders
    }

    /// Folder segments with their rendered fields, in declaration order.
    pub fn folder_fields(&self) -> Vec<(String, &str)> {
        resolve_fields(&self.folders)
    }

    pub fn as_str(&self) -> &str {
        &self.rendered
    }
}

/// Assign positional fields to bare segments.
///
/// The counter only advances on bare segments, so `["b=B", "C", "d=D"]`
/// renders "C" as `00=C`.
fn resolve_fields(folders: &[FolderName]) -> Vec<(String, &str)> {
    let mut auto_index = 0usize;
    folders
        .iter()
        .map(|folder| match &folder.field {
            Some(field) => (field.clone(), folder.value.as_str()),
            None => {
                let field = format!("{:02}", auto_index);
                auto_index += 1;
                (field, folder.value.as_str())
            }
        })
        .collect()
}

impl fmt::Display for StructuredName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rendered)
    }
}

impl fmt::Debug for StructuredName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StructuredName").field(&self.rendered).finish()
    }
}

impl PartialEq for StructuredName {
    fn eq(&self, other: &Self) -> bool {
        self.rendered == other.rendered
    }
}

impl Eq for StructuredName {}

impl Hash for StructuredName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rendered.hash(state);
    }
}

impl PartialOrd for StructuredName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for StructuredName {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rendered.cmp(&other.rendered)
    }
}

impl FromStr for StructuredName {
    type Err = Error;

    /// Parse the rendered form. Every segment other than `name=` becomes a
    /// folder with an explicit field.
    fn from_str(s: &str) -> Result<Self> {
        let (domain, keys) = s
            .split_once(':')
            .ok_or_else(|| Error::invalid_name(format!("'{}' has no domain separator", s)))?;

        let mut primary_key = None;
        let mut folders = Vec::new();
        for segment in keys.split(',') {
            let (field, value) = segment.split_once('=').ok_or_else(|| {
                Error::invalid_name(format!("segment '{}' is not field=value", segment))
            })?;
            if field == PRIMARY_KEY_FIELD {
                if primary_key.replace(value).is_some() {
                    return Err(Error::invalid_name(format!(
                        "'{}' has more than one '{}' field",
                        s, PRIMARY_KEY_FIELD
                    )));
                }
            } else {
                folders.push(FolderName::with_field(field, value));
            }
        }

        let primary_key = primary_key.ok_or_else(|| {
            Error::invalid_name(format!("'{}' has no '{}' field", s, PRIMARY_KEY_FIELD))
        })?;
        StructuredName::new(domain, primary_key, folders)
    }
}

impl TryFrom<String> for StructuredName {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<StructuredName> for String {
    fn from(name: StructuredName) -> Self {
        name.rendered
    }
}

/// Where a name comes from, decided once per registration.
enum NameSource<'a, T> {
    Declared(&'a Resource<T>),
    SelfNamed(&'a dyn SelfNaming),
}

impl<'a, T: Managed> NameSource<'a, T> {
    fn resolve(resource: &'a Resource<T>, object: &'a T) -> Self {
        match object.self_naming() {
            Some(naming) => NameSource::SelfNamed(naming),
            None => NameSource::Declared(resource),
        }
    }
}

/// Build the name an object registers under.
///
/// A [`SelfNaming`] capability on the object overrides the declaration
/// entirely. A declaration with an empty object name falls back to the
/// type's own name. Validation happens after the choice, so a self-named
/// object that reports an empty domain still fails with
/// [`Error::InvalidName`].
pub fn build_name<T: Managed>(resource: &Resource<T>, object: &T) -> Result<StructuredName> {
    match NameSource::resolve(resource, object) {
        NameSource::SelfNamed(naming) => StructuredName::new(
            naming.domain_name(),
            naming.object_name(),
            naming.folder_names().unwrap_or_default(),
        ),
        NameSource::Declared(resource) => {
            let folders = resource
                .folder_names()
                .iter()
                .map(|folder| FolderName::parse(folder))
                .collect::<Result<Vec<_>>>()?;
            let object_name = if resource.object_name().is_empty() {
                short_type_name::<T>()
            } else {
                resource.object_name()
            };
            StructuredName::new(resource.domain_name(), object_name, folders)
        }
    }
}

fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
