use core::convert::TryFrom;
use core::fmt;

// --- Primitive Types ---

/// Index of a namespace in the server's namespace table.
pub type NamespaceIndex = u16;

/// The opaque key part of a `NodeId`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Identifier {
    Numeric(u32),
    String(String),
}

/// Identifies a node: a namespace index plus an opaque key.
///
/// Identifiers are unique within a namespace. Node managers own exactly one
/// namespace and use the index to reject foreign identifiers cheaply.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId {
    pub namespace: NamespaceIndex,
    pub identifier: Identifier,
}

impl NodeId {
    pub const fn numeric(namespace: NamespaceIndex, value: u32) -> Self {
        Self {
            namespace,
            identifier: Identifier::Numeric(value),
        }
    }

    pub fn string(namespace: NamespaceIndex, value: impl Into<String>) -> Self {
        Self {
            namespace,
            identifier: Identifier::String(value.into()),
        }
    }

    /// Returns the string key, if this is a string identifier.
    pub fn as_str(&self) -> Option<&str> {
        match &self.identifier {
            Identifier::String(s) => Some(s),
            Identifier::Numeric(_) => None,
        }
    }

    /// The `ObjectsFolder` of the server's standard namespace.
    pub const fn objects_folder() -> Self {
        Self::numeric(0, ids::OBJECTS_FOLDER)
    }

    /// The top-level `Server` object that collects all events.
    pub const fn server() -> Self {
        Self::numeric(0, ids::SERVER)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace != 0 {
            write!(f, "ns={};", self.namespace)?;
        }
        match &self.identifier {
            Identifier::Numeric(v) => write!(f, "i={v}"),
            Identifier::String(s) => write!(f, "s={s}"),
        }
    }
}

// --- Well-known Identifiers (namespace 0) ---

pub mod ids {
    pub const OBJECTS_FOLDER: u32 = 85;
    pub const SERVER: u32 = 2253;

    pub const HAS_EVENT_SOURCE: u32 = 36;
    pub const ORGANIZES: u32 = 35;
    pub const HAS_PROPERTY: u32 = 46;
    pub const HAS_COMPONENT: u32 = 47;
    pub const HAS_NOTIFIER: u32 = 48;

    pub const AGGREGATE_INTERPOLATIVE: u32 = 2341;
    pub const AGGREGATE_AVERAGE: u32 = 2342;
    pub const AGGREGATE_TOTAL: u32 = 2344;
    pub const AGGREGATE_MINIMUM: u32 = 2346;
    pub const AGGREGATE_MAXIMUM: u32 = 2347;
    pub const AGGREGATE_COUNT: u32 = 2352;
}

/// Bit in the `EventNotifier` attribute that marks a node as an event source
/// clients may subscribe to.
pub const EVENT_NOTIFIER_SUBSCRIBE_TO_EVENTS: u8 = 0x01;

/// `AccessLevel` bits.
pub const ACCESS_LEVEL_CURRENT_READ: u8 = 0x01;
pub const ACCESS_LEVEL_CURRENT_WRITE: u8 = 0x02;

// --- Core Identifiers ---

/// The class of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeClass {
    Object,
    Variable,
    Method,
}

/// Attributes that can be read from a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum AttributeId {
    NodeId = 1,
    NodeClass = 2,
    BrowseName = 3,
    DisplayName = 4,
    Description = 5,
    EventNotifier = 12,
    Value = 13,
    DataType = 14,
    AccessLevel = 17,
    MinimumSamplingInterval = 19,
}

impl TryFrom<u32> for AttributeId {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::NodeId),
            2 => Ok(Self::NodeClass),
            3 => Ok(Self::BrowseName),
            4 => Ok(Self::DisplayName),
            5 => Ok(Self::Description),
            12 => Ok(Self::EventNotifier),
            13 => Ok(Self::Value),
            14 => Ok(Self::DataType),
            17 => Ok(Self::AccessLevel),
            19 => Ok(Self::MinimumSamplingInterval),
            other => Err(other),
        }
    }
}

/// Reference types used by the address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceType {
    Organizes,
    HasComponent,
    HasProperty,
    HasNotifier,
    HasEventSource,
}

impl ReferenceType {
    pub const fn node_id(self) -> NodeId {
        NodeId::numeric(
            0,
            match self {
                Self::Organizes => ids::ORGANIZES,
                Self::HasComponent => ids::HAS_COMPONENT,
                Self::HasProperty => ids::HAS_PROPERTY,
                Self::HasNotifier => ids::HAS_NOTIFIER,
                Self::HasEventSource => ids::HAS_EVENT_SOURCE,
            },
        )
    }

    /// `HasNotifier` is a subtype of `HasEventSource`.
    pub fn is_subtype_of(self, other: ReferenceType) -> bool {
        self == other || (self == Self::HasNotifier && other == Self::HasEventSource)
    }
}

/// A 32-bit OPC-UA style status code. The top two bits carry the severity.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusCode(pub u32);

impl StatusCode {
    pub const GOOD: Self = Self(0x0000_0000);
    pub const UNCERTAIN_LAST_USABLE_VALUE: Self = Self(0x4090_0000);
    pub const BAD_INTERNAL_ERROR: Self = Self(0x8002_0000);
    pub const BAD_NO_COMMUNICATION: Self = Self(0x8031_0000);
    pub const BAD_WAITING_FOR_INITIAL_DATA: Self = Self(0x8032_0000);
    pub const BAD_NODE_ID_INVALID: Self = Self(0x8033_0000);
    pub const BAD_NODE_ID_UNKNOWN: Self = Self(0x8034_0000);
    pub const BAD_ATTRIBUTE_ID_INVALID: Self = Self(0x8035_0000);
    pub const BAD_NOT_WRITABLE: Self = Self(0x803B_0000);
    pub const BAD_OUT_OF_RANGE: Self = Self(0x803C_0000);
    pub const BAD_NOT_SUPPORTED: Self = Self(0x803D_0000);
    pub const BAD_MONITORED_ITEM_ID_INVALID: Self = Self(0x8042_0000);
    pub const BAD_FILTER_NOT_ALLOWED: Self = Self(0x8045_0000);
    pub const BAD_CONTINUATION_POINT_INVALID: Self = Self(0x804A_0000);
    pub const BAD_NODE_ID_EXISTS: Self = Self(0x805E_0000);
    pub const BAD_TYPE_MISMATCH: Self = Self(0x8074_0000);
    pub const BAD_METHOD_INVALID: Self = Self(0x8075_0000);
    pub const BAD_CONFIGURATION_ERROR: Self = Self(0x8089_0000);
    pub const BAD_CONDITION_DISABLED: Self = Self(0x8099_0000);
    pub const BAD_DATA_LOST: Self = Self(0x809D_0000);
    pub const BAD_INVALID_STATE: Self = Self(0x80AF_0000);
}

impl Default for StatusCode {
    fn default() -> Self {
        Self::GOOD
    }
}

impl fmt::Debug for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StatusCode({:#010X})", self.0)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010X}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_display() {
        assert_eq!(NodeId::server().to_string(), "i=2253");
        assert_eq!(
            NodeId::string(3, "1:Metals/WestTank").to_string(),
            "ns=3;s=1:Metals/WestTank"
        );
    }

    #[test]
    fn test_status_code_severity() {
        let severity = |code: StatusCode| code.0 >> 30;
        assert_eq!(severity(StatusCode::GOOD), 0);
        assert_eq!(severity(StatusCode::UNCERTAIN_LAST_USABLE_VALUE), 1);
        assert_eq!(severity(StatusCode::BAD_NO_COMMUNICATION), 2);
        assert_eq!(severity(StatusCode::BAD_DATA_LOST), 2);
    }

    #[test]
    fn test_attribute_id_conversion() {
        assert_eq!(AttributeId::try_from(13), Ok(AttributeId::Value));
        assert_eq!(AttributeId::try_from(99), Err(99));
    }

    #[test]
    fn test_has_notifier_is_event_source_subtype() {
        assert!(ReferenceType::HasNotifier.is_subtype_of(ReferenceType::HasEventSource));
        assert!(!ReferenceType::HasEventSource.is_subtype_of(ReferenceType::HasNotifier));
    }
}
