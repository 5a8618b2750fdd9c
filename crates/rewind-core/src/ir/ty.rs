use serde::{Deserialize, Serialize};

/// A resolved type in the IR.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Type {
    /// Void / unit.
    Void,
    /// Boolean.
    Bool,
    /// Signed integer with bit width.
    Int(u8),
    /// Floating point with bit width (32 or 64).
    Float(u8),
    /// Pointer to a contained type.
    Ptr(Box<Type>),
    /// Array of a uniform element type.
    Array(Box<Type>),
}

impl Type {
    pub fn ptr_to(pointee: Type) -> Type {
        Type::Ptr(Box::new(pointee))
    }

    pub fn is_ptr(&self) -> bool {
        matches!(self, Type::Ptr(_))
    }

    /// The contained type of a pointer, if this is one.
    pub fn pointee(&self) -> Option<&Type> {
        match self {
            Type::Ptr(inner) => Some(inner),
            _ => None,
        }
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self, Type::Array(_))
    }

    /// Pointer-to-pointer-or-aggregate. Such values cannot be reified with a
    /// single-indirection load/store pair.
    pub fn is_nested_ptr(&self) -> bool {
        match self {
            Type::Ptr(inner) => inner.is_ptr() || inner.is_aggregate(),
            _ => false,
        }
    }
}

/// Function signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSig {
    pub params: Vec<Type>,
    pub return_ty: Type,
}
