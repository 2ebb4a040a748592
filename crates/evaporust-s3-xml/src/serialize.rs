//! S3 XML serialization of request bodies.

use std::io::{self, Write};

use evaporust_s3_model::types::{CompletedMultipartUpload, CompletedPart};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesText, Event};

use crate::error::XmlError;

/// The S3 XML namespace.
pub const S3_NAMESPACE: &str = "http://s3.amazonaws.com/doc/2006-03-01/";

/// Trait for serializing S3 types to XML.
///
/// Implementors write their content as child elements inside the current XML
/// context. The root element name and namespace are handled by [`to_xml`].
pub trait S3Serialize {
    /// Serialize this value as XML child elements into the given writer.
    ///
    /// # Errors
    ///
    /// Returns `io::Error` if writing to the underlying writer fails.
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()>;
}

/// Serialize a value as a complete S3 XML document rooted at `root_element`.
///
/// # Errors
///
/// Returns `XmlError` if serialization fails.
///
/// # Examples
///
/// ```
/// use evaporust_s3_model::types::{CompletedMultipartUpload, CompletedPart};
/// use evaporust_s3_xml::to_xml;
///
/// let manifest = CompletedMultipartUpload::sorted(vec![CompletedPart::new(1, "etag")]);
/// let xml = to_xml("CompleteMultipartUpload", &manifest).unwrap();
/// assert!(String::from_utf8(xml).unwrap().contains("<PartNumber>1</PartNumber>"));
/// ```
pub fn to_xml<T: S3Serialize>(root_element: &str, value: &T) -> Result<Vec<u8>, XmlError> {
    let mut buf = Vec::with_capacity(512);
    let mut writer = Writer::new(&mut buf);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    writer
        .create_element(root_element)
        .with_attribute(("xmlns", S3_NAMESPACE))
        .write_inner_content(|w| value.serialize_xml(w))?;

    Ok(buf)
}

fn write_text_element<W: Write>(writer: &mut Writer<W>, tag: &str, text: &str) -> io::Result<()> {
    writer
        .create_element(tag)
        .write_text_content(BytesText::new(text))?;
    Ok(())
}

impl S3Serialize for CompletedPart {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        writer.create_element("Part").write_inner_content(|w| {
            write_text_element(w, "PartNumber", &self.part_number.to_string())?;
            write_text_element(w, "ETag", &self.e_tag)?;
            Ok(())
        })?;
        Ok(())
    }
}

impl S3Serialize for CompletedMultipartUpload {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        for part in &self.parts {
            part.serialize_xml(writer)?;
        }
        Ok(())
    }
}
