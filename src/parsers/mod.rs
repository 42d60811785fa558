pub mod jacoco;

use std::io::BufRead;

use quick_xml::events::BytesStart;
use quick_xml::Reader;

use crate::error::HarvestError;

pub(crate) fn xml_reader<R: BufRead>(reader: R) -> Reader<R> {
    let mut xml = Reader::from_reader(reader);
    xml.trim_text(true);
    xml
}

pub(crate) fn xml_err<R>(source: quick_xml::Error, xml: &Reader<R>) -> HarvestError {
    HarvestError::Xml {
        source,
        position: xml.buffer_position(),
    }
}

/// Fetch and unescape a single attribute by name.
pub(crate) fn get_attr(e: &BytesStart, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == name)
        .and_then(|attr| attr.unescape_value().ok().map(|v| v.into_owned()))
}
