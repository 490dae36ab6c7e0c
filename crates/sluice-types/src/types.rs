use serde::{Deserialize, Serialize};
use std::fmt;

/// Static type of a rule expression.
///
/// Every expression node has a type derivable at validation time. `Any` is the
/// type of message field content: it is accepted by parameters declared `Any`
/// and by equality, and must otherwise go through a conversion function.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    /// UTF-8 string
    String,
    /// 64-bit signed integer
    Long,
    /// 64-bit float
    Double,
    /// Boolean
    Boolean,
    /// UTC timestamp
    DateTime,
    /// Homogeneous array with the given element type
    Array(Box<Type>),
    /// String-keyed map with dynamically typed values
    Map,
    /// Unknown message content
    Any,
    /// No value (effecting functions)
    Void,
}

impl Type {
    /// Array type with the given element type
    #[must_use]
    pub fn array(element: Type) -> Self {
        Self::Array(Box::new(element))
    }

    /// Whether a parameter of type `self` can take an argument of type `actual`.
    ///
    /// Only exact matches and Long→Double widening are allowed; arrays widen
    /// element-wise.
    #[must_use]
    pub fn accepts(&self, actual: &Type) -> bool {
        match (self, actual) {
            (_, Type::Void) => false,
            (Type::Any, _) => true,
            (Type::Double, Type::Long) => true,
            (Type::Array(expected), Type::Array(found)) => expected.accepts(found),
            (expected, found) => expected == found,
        }
    }

    /// Long or Double
    #[must_use]
    pub const fn is_numeric(&self) -> bool {
        matches!(self, Self::Long | Self::Double)
    }

    /// Smallest type that both `self` and `other` widen into, if any.
    #[must_use]
    pub fn unify(&self, other: &Type) -> Option<Type> {
        if self == other {
            return Some(self.clone());
        }
        match (self, other) {
            (Type::Long, Type::Double) | (Type::Double, Type::Long) => Some(Type::Double),
            (Type::Array(a), Type::Array(b)) => a.unify(b).map(Type::array),
            (Type::Void, _) | (_, Type::Void) => None,
            _ => Some(Type::Any),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "String"),
            Self::Long => write!(f, "Long"),
            Self::Double => write!(f, "Double"),
            Self::Boolean => write!(f, "Boolean"),
            Self::DateTime => write!(f, "DateTime"),
            Self::Array(element) => write!(f, "Array<{element}>"),
            Self::Map => write!(f, "Map"),
            Self::Any => write!(f, "Any"),
            Self::Void => write!(f, "Void"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_widening_is_one_way() {
        assert!(Type::Double.accepts(&Type::Long));
        assert!(!Type::Long.accepts(&Type::Double));
        assert!(!Type::String.accepts(&Type::Long));
    }

    #[test]
    fn test_any_does_not_flow_into_typed_parameters() {
        assert!(Type::Any.accepts(&Type::String));
        assert!(!Type::String.accepts(&Type::Any));
        assert!(!Type::Any.accepts(&Type::Void));
    }

    #[test]
    fn test_array_widening() {
        let doubles = Type::array(Type::Double);
        assert!(doubles.accepts(&Type::array(Type::Long)));
        assert!(!Type::array(Type::Long).accepts(&doubles));
        assert_eq!(doubles.to_string(), "Array<Double>");
    }

    #[test]
    fn test_unify() {
        assert_eq!(Type::Long.unify(&Type::Double), Some(Type::Double));
        assert_eq!(Type::Long.unify(&Type::String), Some(Type::Any));
        assert_eq!(Type::Void.unify(&Type::Long), None);
    }
}
