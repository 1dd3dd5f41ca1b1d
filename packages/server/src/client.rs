//! Client side of the management protocol.

use simplemx_core::{MetadataRecord, StructuredName, Value, ValueType};
use thiserror::Error;
use tokio::net::{TcpStream, ToSocketAddrs};

use crate::connection::{Connection, ConnectionError, DEFAULT_MAX_MESSAGE_SIZE};
use crate::protocol::{json_to_value, value_to_json, Request, Response};

/// Errors seen by a [`ManagementClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to connect: {0}")]
    Connect(#[source] std::io::Error),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// The server answered with an error.
    #[error("{kind}: {message}")]
    Remote { kind: String, message: String },

    #[error("server closed the connection")]
    Closed,

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl ClientError {
    /// Wire identifier of a remote failure, e.g. `not_found`.
    pub fn remote_kind(&self) -> Option<&str> {
        match self {
            ClientError::Remote { kind, .. } => Some(kind),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// A connection to a management listener.
pub struct ManagementClient {
    conn: Connection<TcpStream>,
}

impl ManagementClient {
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let stream = TcpStream::connect(addr).await.map_err(ClientError::Connect)?;
        Ok(Self {
            conn: Connection::new(stream, DEFAULT_MAX_MESSAGE_SIZE),
        })
    }

    /// Names of every object the server publishes.
    pub async fn list(&mut self) -> Result<Vec<StructuredName>> {
        match self.call(&Request::List).await? {
            Response::Names { names } => Ok(names),
            other => Err(unexpected(other)),
        }
    }

    pub async fn describe(&mut self, name: &StructuredName) -> Result<MetadataRecord> {
        let request = Request::Describe { name: name.clone() };
        match self.call(&request).await? {
            Response::Metadata { metadata } => Ok(metadata),
            other => Err(unexpected(other)),
        }
    }

    pub async fn get_attribute(&mut self, name: &StructuredName, attribute: &str) -> Result<Value> {
        let request = Request::Get {
            name: name.clone(),
            attribute: attribute.to_string(),
        };
        self.call_for_value(&request).await
    }

    pub async fn set_attribute(
        &mut self,
        name: &StructuredName,
        attribute: &str,
        value: Value,
    ) -> Result<()> {
        let request = Request::Set {
            name: name.clone(),
            attribute: attribute.to_string(),
            value: value_to_json(value),
        };
        match self.call(&request).await? {
            Response::Ok => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    pub async fn invoke(
        &mut self,
        name: &StructuredName,
        operation: &str,
        args: Vec<Value>,
    ) -> Result<Value> {
        let request = invoke_request(name, operation, args, None);
        self.call_for_value(&request).await
    }

    /// Invoke the overload whose parameter types are `signature`.
    pub async fn invoke_signature(
        &mut self,
        name: &StructuredName,
        operation: &str,
        signature: &[ValueType],
        args: Vec<Value>,
    ) -> Result<Value> {
        let request = invoke_request(name, operation, args, Some(signature.to_vec()));
        self.call_for_value(&request).await
    }

    async fn call_for_value(&mut self, request: &Request) -> Result<Value> {
        match self.call(request).await? {
            Response::Value { value } => Ok(json_to_value(value)),
            other => Err(unexpected(other)),
        }
    }

    async fn call(&mut self, request: &Request) -> Result<Response> {
        self.conn.send_message(request).await?;
        match self.conn.read_message::<Response>().await? {
            Some(Response::Error { kind, message }) => Err(ClientError::Remote { kind, message }),
            Some(response) => Ok(response),
            None => Err(ClientError::Closed),
        }
    }
}

fn invoke_request(
    name: &StructuredName,
    operation: &str,
    args: Vec<Value>,
    signature: Option<Vec<ValueType>>,
) -> Request {
    Request::Invoke {
        name: name.clone(),
        operation: operation.to_string(),
        args: args.into_iter().map(value_to_json).collect(),
        signature,
    }
}

fn unexpected(response: Response) -> ClientError {
    ClientError::UnexpectedResponse(format!("{:?}", response))
}
