//! Request/response messages exchanged between a client and a store.
//!
//! Messages are JSON-encoded envelopes carrying the protocol version. The
//! store answers every request with exactly one response; failures travel as
//! [`Response::Error`] rather than as transport faults.

use crate::error::{Conflict, Error};
use crate::query::Row;
use crate::store::GetResult;
use crate::MyriadStore;
use myriad_model::digest::Digest;
use myriad_model::{DimensionValues, Measure, MeasureSet, Property, PropertyOperation, ValidationError};
use serde::{Deserialize, Serialize};

/// Protocol version
pub const PROTOCOL_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMessage {
    pub version: String,
    pub request: Request,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMessage {
    pub version: String,
    pub response: Response,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    GetMetadata,
    GetDimensionList,
    /// One page of a query; rows carry ordinals relative to the full result.
    Query {
        filters: Vec<DimensionValues>,
        offset: usize,
        limit: usize,
    },
    Get {
        measures: MeasureSet,
    },
    GetProperties {
        keys: Vec<String>,
    },
    PutProperty {
        operation: PropertyOperation,
    },
    AddMeasure {
        measure: Measure,
    },
    AddDimension {
        name: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    Metadata { dimensions: Vec<DimensionValues> },
    DimensionList { names: Vec<String> },
    /// `complete` is set on the last page.
    Rows { rows: Vec<Row>, complete: bool },
    Get(GetResult),
    Properties { properties: Vec<Property> },
    Property { property: Property, digest: Digest },
    DimensionValues(DimensionValues),
    Error(ErrorPayload),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorPayload {
    Validation(ValidationError),
    Conflict(Conflict),
    /// The request could not be decoded.
    Malformed { message: String },
    /// The store failed for reasons the caller cannot fix (e.g. disk).
    Internal { message: String },
}

impl From<Error> for ErrorPayload {
    fn from(error: Error) -> Self {
        match error {
            Error::Validation(e) => ErrorPayload::Validation(e),
            Error::Conflict(c) => ErrorPayload::Conflict(c),
            other => ErrorPayload::Internal {
                message: other.to_string(),
            },
        }
    }
}

impl RequestMessage {
    pub fn new(request: Request) -> Self {
        Self {
            version: PROTOCOL_VERSION.to_string(),
            request,
        }
    }
}

impl ResponseMessage {
    pub fn new(response: Response) -> Self {
        Self {
            version: PROTOCOL_VERSION.to_string(),
            response,
        }
    }
}

impl MyriadStore {
    /// Answer one decoded request.
    pub fn handle(&self, request: Request) -> Response {
        self.dispatch(request)
            .unwrap_or_else(|e| Response::Error(e.into()))
    }

    fn dispatch(&self, request: Request) -> Result<Response, Error> {
        let response = match request {
            Request::GetMetadata => Response::Metadata {
                dimensions: self.get_metadata(),
            },
            Request::GetDimensionList => Response::DimensionList {
                names: self.get_dimension_list(),
            },
            Request::Query {
                filters,
                offset,
                limit,
            } => {
                let query = self.query(&filters)?;
                let mut rows: Vec<Row> = query
                    .rows()
                    .skip(offset)
                    .take(limit.saturating_add(1))
                    .collect();
                let complete = rows.len() <= limit;
                rows.truncate(limit);
                Response::Rows { rows, complete }
            }
            Request::Get { measures } => Response::Get(self.get(&measures)?),
            Request::GetProperties { keys } => Response::Properties {
                properties: self
                    .get_properties(&keys)
                    .iter()
                    .map(|p| (**p).clone())
                    .collect(),
            },
            Request::PutProperty { operation } => {
                let property = self.put_property(&operation)?;
                Response::Property {
                    digest: property.digest(),
                    property: (*property).clone(),
                }
            }
            Request::AddMeasure { measure } => Response::DimensionValues(self.add_measure(&measure)?),
            Request::AddDimension { name } => Response::DimensionValues(self.add_dimension(&name)?),
        };
        Ok(response)
    }

    /// Decode a JSON request envelope, answer it, and encode the response.
    /// Undecodable input yields an encoded [`ErrorPayload::Malformed`].
    pub fn handle_bytes(&self, bytes: &[u8]) -> Vec<u8> {
        let response = match serde_json::from_slice::<RequestMessage>(bytes) {
            Ok(message) if message.version != PROTOCOL_VERSION => {
                Response::Error(ErrorPayload::Malformed {
                    message: format!(
                        "protocol version {} is not supported (expected {})",
                        message.version, PROTOCOL_VERSION
                    ),
                })
            }
            Ok(message) => self.handle(message.request),
            Err(e) => Response::Error(ErrorPayload::Malformed {
                message: e.to_string(),
            }),
        };
        encode_response(ResponseMessage::new(response))
    }
}

fn encode_response(message: ResponseMessage) -> Vec<u8> {
    match serde_json::to_vec(&message) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, "failed to encode response");
            let fallback = ResponseMessage::new(Response::Error(ErrorPayload::Internal {
                message: e.to_string(),
            }));
            serde_json::to_vec(&fallback).unwrap_or_default()
        }
    }
}
