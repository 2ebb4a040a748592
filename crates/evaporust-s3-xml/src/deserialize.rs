//! S3 XML deserialization of response bodies.
//!
//! Each [`S3Deserialize`] implementation reads the children of its element
//! and returns once the matching end tag is consumed. Unknown children are
//! skipped so that additions to the S3 response shapes do not break parsing.

use evaporust_s3_model::output::{
    CompleteMultipartUploadOutput, CreateMultipartUploadOutput, ListMultipartUploadsOutput,
};
use evaporust_s3_model::types::{MultipartUpload, S3ErrorBody};
use quick_xml::Reader;
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesStart, Event};

use crate::error::XmlError;

/// Trait for deserializing S3 types from XML.
pub trait S3Deserialize: Sized {
    /// Deserialize an instance from the given XML reader.
    ///
    /// The reader is positioned just after the opening tag of this element.
    ///
    /// # Errors
    ///
    /// Returns `XmlError` if the XML is malformed or required fields are missing.
    fn deserialize_xml(reader: &mut Reader<&[u8]>) -> Result<Self, XmlError>;
}

/// Deserialize S3 XML into a typed value, ignoring the root element name.
///
/// # Errors
///
/// Returns `XmlError` if the XML is malformed or deserialization fails.
pub fn from_xml<T: S3Deserialize>(xml: &[u8]) -> Result<T, XmlError> {
    let mut reader = new_reader(xml);
    let _root = read_root(&mut reader)?;
    T::deserialize_xml(&mut reader)
}

/// Deserialize a response body that is either `T` or an S3 `<Error>` document.
///
/// # Errors
///
/// Returns `XmlError` if the XML is malformed or deserialization fails.
///
/// # Examples
///
/// ```
/// use evaporust_s3_model::output::CompleteMultipartUploadOutput;
/// use evaporust_s3_xml::from_xml_response;
///
/// let body = b"<Error><Code>InternalError</Code></Error>";
/// let parsed = from_xml_response::<CompleteMultipartUploadOutput>(body).unwrap();
/// assert_eq!(parsed.unwrap_err().code, "InternalError");
/// ```
pub fn from_xml_response<T: S3Deserialize>(xml: &[u8]) -> Result<Result<T, S3ErrorBody>, XmlError> {
    let mut reader = new_reader(xml);
    if read_root(&mut reader)? == "Error" {
        Ok(Err(S3ErrorBody::deserialize_xml(&mut reader)?))
    } else {
        Ok(Ok(T::deserialize_xml(&mut reader)?))
    }
}

fn new_reader(xml: &[u8]) -> Reader<&[u8]> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    reader
}

/// Skip the declaration and return the root element name.
fn read_root(reader: &mut Reader<&[u8]>) -> Result<String, XmlError> {
    loop {
        match reader.read_event()? {
            Event::Start(e) => return tag_name(&e),
            Event::Eof => return Err(XmlError::MissingElement("root element".to_string())),
            _ => {}
        }
    }
}

fn tag_name(e: &BytesStart<'_>) -> Result<String, XmlError> {
    let name = e.local_name();
    std::str::from_utf8(name.as_ref())
        .map(ToOwned::to_owned)
        .map_err(|err| XmlError::ParseError(err.to_string()))
}

/// Read the text content of the current element and consume its end tag.
fn read_text_content(reader: &mut Reader<&[u8]>) -> Result<String, XmlError> {
    let mut text = String::new();
    loop {
        match reader.read_event()? {
            Event::Text(e) => {
                let decoded = e
                    .decode()
                    .map_err(|err| XmlError::ParseError(err.to_string()))?;
                let unescaped = quick_xml::escape::unescape(&decoded)
                    .map_err(|err| XmlError::ParseError(err.to_string()))?;
                text.push_str(&unescaped);
            }
            Event::GeneralRef(e) => {
                if let Some(ch) = e
                    .resolve_char_ref()
                    .map_err(|err| XmlError::ParseError(err.to_string()))?
                {
                    text.push(ch);
                    continue;
                }
                let name = e
                    .decode()
                    .map_err(|err| XmlError::ParseError(err.to_string()))?;
                let resolved = resolve_predefined_entity(&name)
                    .ok_or_else(|| XmlError::ParseError(format!("unknown entity &{name};")))?;
                text.push_str(resolved);
            }
            Event::End(_) => return Ok(text),
            Event::Eof => {
                return Err(XmlError::UnexpectedElement(
                    "unexpected EOF while reading text content".to_string(),
                ));
            }
            _ => {}
        }
    }
}

/// Skip over an element and all its children.
fn skip_element(reader: &mut Reader<&[u8]>) -> Result<(), XmlError> {
    let mut depth: u32 = 1;
    loop {
        match reader.read_event()? {
            Event::Start(_) => depth += 1,
            Event::End(_) => {
                depth -= 1;
                if depth == 0 {
                    return Ok(());
                }
            }
            Event::Eof => {
                return Err(XmlError::UnexpectedElement(
                    "unexpected EOF while skipping element".to_string(),
                ));
            }
            _ => {}
        }
    }
}

fn parse_bool(s: &str) -> Result<bool, XmlError> {
    match s {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(XmlError::ParseError(format!("invalid boolean: {s}"))),
    }
}

fn parse_i32(s: &str) -> Result<i32, XmlError> {
    s.parse::<i32>()
        .map_err(|e| XmlError::ParseError(format!("invalid i32 '{s}': {e}")))
}

fn parse_timestamp(s: &str) -> Result<chrono::DateTime<chrono::Utc>, XmlError> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.fZ")
                .map(|ndt| ndt.and_utc())
        })
        .map_err(|e| XmlError::ParseError(format!("invalid timestamp '{s}': {e}")))
}

/// Treat an empty marker element as absent.
fn non_empty(text: String) -> Option<String> {
    if text.is_empty() { None } else { Some(text) }
}

fn unexpected_eof(context: &str) -> XmlError {
    XmlError::UnexpectedElement(format!("unexpected EOF in {context}"))
}

impl S3Deserialize for CreateMultipartUploadOutput {
    fn deserialize_xml(reader: &mut Reader<&[u8]>) -> Result<Self, XmlError> {
        let mut output = CreateMultipartUploadOutput::default();

        loop {
            match reader.read_event()? {
                Event::Start(e) => match tag_name(&e)?.as_str() {
                    "Bucket" => output.bucket = Some(read_text_content(reader)?),
                    "Key" => output.key = Some(read_text_content(reader)?),
                    "UploadId" => output.upload_id = non_empty(read_text_content(reader)?),
                    _ => skip_element(reader)?,
                },
                Event::End(_) => break,
                Event::Eof => return Err(unexpected_eof("InitiateMultipartUploadResult")),
                _ => {}
            }
        }

        Ok(output)
    }
}

impl S3Deserialize for CompleteMultipartUploadOutput {
    fn deserialize_xml(reader: &mut Reader<&[u8]>) -> Result<Self, XmlError> {
        let mut output = CompleteMultipartUploadOutput::default();

        loop {
            match reader.read_event()? {
                Event::Start(e) => match tag_name(&e)?.as_str() {
                    "Location" => output.location = Some(read_text_content(reader)?),
                    "Bucket" => output.bucket = Some(read_text_content(reader)?),
                    "Key" => output.key = Some(read_text_content(reader)?),
                    "ETag" => output.e_tag = Some(read_text_content(reader)?),
                    _ => skip_element(reader)?,
                },
                Event::End(_) => break,
                Event::Eof => return Err(unexpected_eof("CompleteMultipartUploadResult")),
                _ => {}
            }
        }

        Ok(output)
    }
}

impl S3Deserialize for MultipartUpload {
    fn deserialize_xml(reader: &mut Reader<&[u8]>) -> Result<Self, XmlError> {
        let mut key = None;
        let mut upload_id = None;
        let mut initiated = None;
        let mut storage_class = None;

        loop {
            match reader.read_event()? {
                Event::Start(e) => match tag_name(&e)?.as_str() {
                    "Key" => key = Some(read_text_content(reader)?),
                    "UploadId" => upload_id = Some(read_text_content(reader)?),
                    "Initiated" => {
                        let text = read_text_content(reader)?;
                        initiated = Some(parse_timestamp(&text)?);
                    }
                    "StorageClass" => storage_class = Some(read_text_content(reader)?),
                    _ => skip_element(reader)?,
                },
                Event::End(_) => break,
                Event::Eof => return Err(unexpected_eof("Upload")),
                _ => {}
            }
        }

        Ok(MultipartUpload {
            key: key.ok_or_else(|| XmlError::MissingElement("Upload/Key".to_string()))?,
            upload_id: upload_id
                .ok_or_else(|| XmlError::MissingElement("Upload/UploadId".to_string()))?,
            initiated,
            storage_class,
        })
    }
}

impl S3Deserialize for ListMultipartUploadsOutput {
    fn deserialize_xml(reader: &mut Reader<&[u8]>) -> Result<Self, XmlError> {
        let mut output = ListMultipartUploadsOutput::default();

        loop {
            match reader.read_event()? {
                Event::Start(e) => match tag_name(&e)?.as_str() {
                    "Bucket" => output.bucket = Some(read_text_content(reader)?),
                    "KeyMarker" => output.key_marker = non_empty(read_text_content(reader)?),
                    "UploadIdMarker" => {
                        output.upload_id_marker = non_empty(read_text_content(reader)?);
                    }
                    "NextKeyMarker" => {
                        output.next_key_marker = non_empty(read_text_content(reader)?);
                    }
                    "NextUploadIdMarker" => {
                        output.next_upload_id_marker = non_empty(read_text_content(reader)?);
                    }
                    "MaxUploads" => {
                        let text = read_text_content(reader)?;
                        output.max_uploads = Some(parse_i32(&text)?);
                    }
                    "IsTruncated" => {
                        let text = read_text_content(reader)?;
                        output.is_truncated = parse_bool(&text)?;
                    }
                    "Upload" => output.uploads.push(MultipartUpload::deserialize_xml(reader)?),
                    _ => skip_element(reader)?,
                },
                Event::End(_) => break,
                Event::Eof => return Err(unexpected_eof("ListMultipartUploadsResult")),
                _ => {}
            }
        }

        Ok(output)
    }
}

impl S3Deserialize for S3ErrorBody {
    fn deserialize_xml(reader: &mut Reader<&[u8]>) -> Result<Self, XmlError> {
        let mut body = S3ErrorBody::default();

        loop {
            match reader.read_event()? {
                Event::Start(e) => match tag_name(&e)?.as_str() {
                    "Code" => body.code = read_text_content(reader)?,
                    "Message" => body.message = Some(read_text_content(reader)?),
                    "Key" => body.key = Some(read_text_content(reader)?),
                    "RequestId" => body.request_id = Some(read_text_content(reader)?),
                    _ => skip_element(reader)?,
                },
                Event::End(_) => break,
                Event::Eof => return Err(unexpected_eof("Error")),
                _ => {}
            }
        }

        Ok(body)
    }
}
