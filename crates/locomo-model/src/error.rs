//! Error types for robot description parsing.

use thiserror::Error;

/// Errors that can occur while reading a robot description.
#[derive(Debug, Error)]
pub enum MjcfError {
    /// XML parsing error.
    #[error("XML parse error: {0}")]
    XmlParse(String),

    /// Missing required element.
    #[error("missing required element: {element} in {context}")]
    MissingElement {
        /// The missing element name.
        element: &'static str,
        /// Where the element was expected.
        context: String,
    },

    /// Missing required attribute.
    #[error("missing required attribute: {attribute} on {element}")]
    MissingAttribute {
        /// The missing attribute name.
        attribute: &'static str,
        /// The element that should have the attribute.
        element: String,
    },

    /// Invalid attribute value.
    #[error("invalid value for {attribute} on {element}: {message}")]
    InvalidAttribute {
        /// The attribute with the invalid value.
        attribute: String,
        /// The element containing the attribute.
        element: String,
        /// Description of why the value is invalid.
        message: String,
    },

    /// Unknown joint type.
    #[error("unknown joint type: {0}")]
    UnknownJointType(String),

    /// Unknown or unsupported geom type.
    #[error("unsupported geom type: {0}")]
    UnsupportedGeomType(String),

    /// Duplicate body name.
    #[error("duplicate body name: {0}")]
    DuplicateBody(String),

    /// Duplicate joint name.
    #[error("duplicate joint name: {0}")]
    DuplicateJoint(String),

    /// Actuator references a joint that does not exist.
    #[error("actuator references undefined joint: {0}")]
    UndefinedJoint(String),

    /// The worldbody must contain exactly one robot root.
    #[error("expected exactly one root body in worldbody, found {0}")]
    RootCount(usize),

    /// Global coordinates are only supported for unrotated bodies.
    #[error("body {0} is rotated, which global coordinates do not support")]
    RotatedGlobalBody(String),
}

impl MjcfError {
    pub(crate) fn missing_element(element: &'static str, context: impl Into<String>) -> Self {
        Self::MissingElement {
            element,
            context: context.into(),
        }
    }

    pub(crate) fn invalid(
        attribute: impl Into<String>,
        element: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidAttribute {
            attribute: attribute.into(),
            element: element.into(),
            message: message.into(),
        }
    }
}

/// Result type for robot description operations.
pub type Result<T> = std::result::Result<T, MjcfError>;
