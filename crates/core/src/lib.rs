pub mod context;
pub mod error;
pub mod functions;
pub mod operations;
pub mod types;
pub mod value;

pub use context::Context;
pub use error::{Error, ErrorCode, Result};
pub use functions::{Arity, FunctionImpl, FunctionRegistry, ResolveError};
pub use operations::{BinaryOp, Converter, ConverterRegistry, OperationRegistry};
pub use types::{ArithmeticClass, AtomicTypeFeatures, BuiltinType, TypeCode, TypeRegistry, ValueType};
pub use value::{Instance, Value};
