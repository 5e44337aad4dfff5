//! [`Property`]: a named point in a state's parameter space.
//!
//! Properties key [`crate::testvalue::TestValue`] lists so the enumerator can
//! group, dedupe, and cross-product boundary probes per spec.md §4.7. They
//! also show up in diagnostics (condition string forms, `generator-info`), so
//! the `Display` impl is the stable, human-readable name.

use std::fmt;

/// A stack-bound position referenced by `Op`/`Param`/`IsCode`/`IsData`
/// expressions, named the way a rule author would bind it (`"param_0"`,
/// `"key"`, `"new_value"`, ...).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Var(pub String);

impl Var {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Var {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Var {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// A named point in the state's parameter space, keying test-value groups.
///
/// Scalar properties carry no argument. Parameterized properties name the
/// bound variable they constrain, matching the bracketed notation in the
/// glossary (`"isCode[param_0]"`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Property {
    Pc,
    Gas,
    GasRefund,
    ReadOnly,
    Status,
    Revision,
    StackSize,
    Op(Var),
    Param(Var),
    IsCode(Var),
    IsData(Var),
    StorageWarm(Var),
    AddressWarm(Var),
    StorageConfiguration(Var),
    TransientStorage(Var),
    AccountEmpty(Var),
    SelfDestructed,
    BlockNumberWindow(Var),
    BlobHashPresence(Var),
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Property::Pc => write!(f, "pc"),
            Property::Gas => write!(f, "gas"),
            Property::GasRefund => write!(f, "gasRefund"),
            Property::ReadOnly => write!(f, "readOnly"),
            Property::Status => write!(f, "status"),
            Property::Revision => write!(f, "revision"),
            Property::StackSize => write!(f, "stackSize"),
            Property::Op(v) => write!(f, "op[{v}]"),
            Property::Param(v) => write!(f, "param[{v}]"),
            Property::IsCode(v) => write!(f, "isCode[{v}]"),
            Property::IsData(v) => write!(f, "isData[{v}]"),
            Property::StorageWarm(v) => write!(f, "storageWarm[{v}]"),
            Property::AddressWarm(v) => write!(f, "addressWarm[{v}]"),
            Property::StorageConfiguration(v) => write!(f, "storageConfiguration[{v}]"),
            Property::TransientStorage(v) => write!(f, "transientStorage[{v}]"),
            Property::AccountEmpty(v) => write!(f, "accountEmpty[{v}]"),
            Property::SelfDestructed => write!(f, "selfDestructed"),
            Property::BlockNumberWindow(v) => write!(f, "blockNumberWindow[{v}]"),
            Property::BlobHashPresence(v) => write!(f, "blobHashPresence[{v}]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bracketed_properties_render_with_their_variable() {
        let p = Property::IsCode(Var::new("param_0"));
        assert_eq!(p.to_string(), "isCode[param_0]");
    }

    #[test]
    fn scalar_properties_render_bare() {
        assert_eq!(Property::Gas.to_string(), "gas");
    }
}
