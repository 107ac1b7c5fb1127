// crates/plcsim-rs-topology/src/error.rs

use quick_xml::errors::serialize::{DeError, SeError};
use thiserror::Error;

/// Errors that can occur while loading or saving a topology document.
#[derive(Debug, Error)]
pub enum TopologyError {
    /// An error from the underlying `quick-xml` deserializer.
    #[error("XML parsing error: {0}")]
    XmlParsing(#[from] DeError),

    /// An error from the underlying `quick-xml` serializer.
    #[error("XML serializing error: {0}")]
    XmlSerializing(#[from] SeError),

    /// The topology file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Formatting error: {0}")]
    Fmt(#[from] std::fmt::Error),

    /// The document parsed but describes an unusable topology.
    #[error("Validation error: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::TopologyError;

    #[test]
    fn test_from_de_error() {
        let xml_err = quick_xml::de::from_str::<()>("invalid xml").unwrap_err();
        let err: TopologyError = xml_err.into();
        assert!(matches!(err, TopologyError::XmlParsing(_)));
    }

    #[test]
    fn test_from_se_error() {
        let xml_err = quick_xml::errors::serialize::SeError::Custom("test error".to_string());
        let err: TopologyError = xml_err.into();
        assert!(matches!(err, TopologyError::XmlSerializing(_)));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: TopologyError = io_err.into();
        assert!(matches!(err, TopologyError::Io(_)));
        assert_eq!(err.to_string(), "I/O error: missing");
    }
}
