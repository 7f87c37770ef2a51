//! Client handle: a target URI plus the transport that reaches it.
//!
//! The transport is an opaque byte channel keyed by URI. [`LocalTransport`]
//! routes `local://<name>` URIs to stores registered in this process; other
//! schemes belong to transports provided elsewhere.

use crate::error::{Error, Result, TransportError};
use crate::protocol::{ErrorPayload, Request, RequestMessage, Response, ResponseMessage};
use crate::query::Row;
use crate::store::GetResult;
use crate::MyriadStore;
use dashmap::DashMap;
use myriad_model::digest::Digest;
use myriad_model::{DimensionValues, Measure, MeasureSet, Property, PropertyOperation};
use std::sync::Arc;
use url::Url;

pub const LOCAL_SCHEME: &str = "local";
pub const DEFAULT_PAGE_SIZE: usize = 256;

pub trait Transport: Send + Sync {
    /// Deliver one encoded request to `uri` and return the encoded response.
    fn call(&self, uri: &Url, request: &[u8]) -> std::result::Result<Vec<u8>, TransportError>;
}

/// In-process transport over a registry of named stores.
#[derive(Default)]
pub struct LocalTransport {
    stores: DashMap<String, Arc<MyriadStore>>,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `store` under `name` and return the URI that reaches it.
    pub fn register(&self, name: &str, store: Arc<MyriadStore>) -> std::result::Result<Url, TransportError> {
        let uri = Url::parse(&format!("{LOCAL_SCHEME}://{name}")).map_err(|e| {
            TransportError::Malformed {
                what: "uri".into(),
                message: e.to_string(),
            }
        })?;
        self.stores.insert(host_of(&uri), store);
        Ok(uri)
    }
}

fn host_of(uri: &Url) -> String {
    uri.host_str().unwrap_or_default().to_string()
}

impl Transport for LocalTransport {
    fn call(&self, uri: &Url, request: &[u8]) -> std::result::Result<Vec<u8>, TransportError> {
        if uri.scheme() != LOCAL_SCHEME {
            return Err(TransportError::UnsupportedScheme {
                scheme: uri.scheme().to_string(),
            });
        }
        let store = self
            .stores
            .get(&host_of(uri))
            .map(|s| Arc::clone(s.value()))
            .ok_or_else(|| TransportError::Unreachable {
                uri: uri.to_string(),
            })?;
        Ok(store.handle_bytes(request))
    }
}

/// A per-session handle to one store.
#[derive(Clone)]
pub struct MyriadClient {
    uri: Url,
    transport: Arc<dyn Transport>,
    page_size: usize,
}

impl MyriadClient {
    pub fn new(uri: Url, transport: Arc<dyn Transport>) -> Self {
        Self {
            uri,
            transport,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }

    fn call(&self, request: Request) -> Result<Response> {
        let bytes = serde_json::to_vec(&RequestMessage::new(request)).map_err(|e| {
            TransportError::Malformed {
                what: "request".into(),
                message: e.to_string(),
            }
        })?;
        let reply = self.transport.call(&self.uri, &bytes)?;
        let message: ResponseMessage = serde_json::from_slice(&reply).map_err(|e| {
            TransportError::Malformed {
                what: "response".into(),
                message: e.to_string(),
            }
        })?;
        match message.response {
            Response::Error(payload) => Err(from_payload(payload)),
            response => Ok(response),
        }
    }

    pub fn get_metadata(&self) -> Result<Vec<DimensionValues>> {
        match self.call(Request::GetMetadata)? {
            Response::Metadata { dimensions } => Ok(dimensions),
            other => Err(unexpected("Metadata", &other)),
        }
    }

    pub fn get_dimension_list(&self) -> Result<Vec<String>> {
        match self.call(Request::GetDimensionList)? {
            Response::DimensionList { names } => Ok(names),
            other => Err(unexpected("DimensionList", &other)),
        }
    }

    /// A lazy query; nothing is fetched until the rows are iterated.
    pub fn query(&self, filters: Vec<DimensionValues>) -> RemoteQuery {
        RemoteQuery {
            client: self.clone(),
            filters: Arc::new(filters),
        }
    }

    pub fn get(&self, measures: MeasureSet) -> Result<GetResult> {
        match self.call(Request::Get { measures })? {
            Response::Get(result) => Ok(result),
            other => Err(unexpected("Get", &other)),
        }
    }

    pub fn get_properties(&self, keys: Vec<String>) -> Result<Vec<Property>> {
        match self.call(Request::GetProperties { keys })? {
            Response::Properties { properties } => Ok(properties),
            other => Err(unexpected("Properties", &other)),
        }
    }

    pub fn put_property(&self, operation: PropertyOperation) -> Result<(Property, Digest)> {
        match self.call(Request::PutProperty { operation })? {
            Response::Property { property, digest } => Ok((property, digest)),
            other => Err(unexpected("Property", &other)),
        }
    }

    pub fn add_measure(&self, measure: Measure) -> Result<DimensionValues> {
        match self.call(Request::AddMeasure { measure })? {
            Response::DimensionValues(values) => Ok(values),
            other => Err(unexpected("DimensionValues", &other)),
        }
    }

    pub fn add_dimension(&self, name: impl Into<String>) -> Result<DimensionValues> {
        match self.call(Request::AddDimension { name: name.into() })? {
            Response::DimensionValues(values) => Ok(values),
            other => Err(unexpected("DimensionValues", &other)),
        }
    }
}

fn from_payload(payload: ErrorPayload) -> Error {
    match payload {
        ErrorPayload::Validation(e) => Error::Validation(e),
        ErrorPayload::Conflict(c) => Error::Conflict(c),
        ErrorPayload::Malformed { message } => Error::Transport(TransportError::Malformed {
            what: "request".into(),
            message,
        }),
        ErrorPayload::Internal { message } => Error::Transport(TransportError::Remote { message }),
    }
}

fn unexpected(expected: &str, got: &Response) -> Error {
    Error::Transport(TransportError::Malformed {
        what: "response".into(),
        message: format!("expected {expected}, got {got:?}"),
    })
}

/// A query bound to a client. Each call to [`RemoteQuery::rows`] starts over
/// from the first page.
#[derive(Clone)]
pub struct RemoteQuery {
    client: MyriadClient,
    filters: Arc<Vec<DimensionValues>>,
}

impl RemoteQuery {
    pub fn rows(&self) -> RemoteRows {
        RemoteRows {
            client: self.client.clone(),
            filters: Arc::clone(&self.filters),
            offset: 0,
            buffer: Vec::new().into_iter(),
            done: false,
        }
    }
}

/// Fetches pages on demand. A transport or store failure is yielded once and
/// ends the sequence.
pub struct RemoteRows {
    client: MyriadClient,
    filters: Arc<Vec<DimensionValues>>,
    offset: usize,
    buffer: std::vec::IntoIter<Row>,
    done: bool,
}

impl RemoteRows {
    fn fetch(&mut self) -> Result<()> {
        let request = Request::Query {
            filters: self.filters.as_ref().clone(),
            offset: self.offset,
            limit: self.client.page_size,
        };
        match self.client.call(request)? {
            Response::Rows { rows, complete } => {
                self.offset += rows.len();
                self.done = complete || rows.is_empty();
                self.buffer = rows.into_iter();
                Ok(())
            }
            other => Err(unexpected("Rows", &other)),
        }
    }
}

impl Iterator for RemoteRows {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Result<Row>> {
        loop {
            if let Some(row) = self.buffer.next() {
                return Some(Ok(row));
            }
            if self.done {
                return None;
            }
            if let Err(e) = self.fetch() {
                self.done = true;
                return Some(Err(e));
            }
        }
    }
}
