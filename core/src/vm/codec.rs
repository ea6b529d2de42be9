use bumpalo::Bump;

use crate::{String, values::Value};

/// External (de)serializer consulted by `DES` and `SER`.
///
/// Schemas are addressed by the names the linker recorded in
/// [`Program::schemas`](crate::linker::Program::schemas); what a schema means
/// is entirely up to the implementation.
pub trait SchemaCodec {
    fn decode<'a>(
        &self,
        schema: &str,
        value: Value<'a>,
        arena: &'a Bump,
    ) -> Result<Value<'a>, String>;

    fn encode<'a>(
        &self,
        schema: &str,
        value: Value<'a>,
        arena: &'a Bump,
    ) -> Result<Value<'a>, String>;
}
