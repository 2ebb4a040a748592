//! S3 XML serialization/deserialization for the Evaporust multipart client.
//!
//! This is the client side of the S3 RestXml protocol: request bodies are
//! serialized with [`to_xml`] and response bodies are parsed with
//! [`from_xml`] or, when the body may be an `<Error>` document,
//! [`from_xml_response`].
//!
//! # S3 XML conventions
//!
//! - Namespace: `http://s3.amazonaws.com/doc/2006-03-01/`
//! - Booleans: lowercase `true`/`false`
//! - Timestamps: ISO 8601 format (`2006-02-03T16:45:09.000Z`)
//! - XML declaration: `<?xml version="1.0" encoding="UTF-8"?>`

pub mod deserialize;
pub mod error;
pub mod serialize;

pub use deserialize::{S3Deserialize, from_xml, from_xml_response};
pub use error::XmlError;
pub use serialize::{S3_NAMESPACE, S3Serialize, to_xml};
