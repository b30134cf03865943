use brine_proto_schema::Options;
use crate::{
    error::ProtoError,
    parser::parse_schema,
    resolver::Builder,
    types::Schema,
};

/// Parse, import and resolve a self-contained `.proto` text.
/// Returns `Err(ProtoError)` if parsing, resolution or verification fails.
pub fn compile_schema(text: &str) -> Result<Builder, ProtoError> {
    compile_schema_with(text, Options::default())
}

pub fn compile_schema_with(text: &str, options: Options) -> Result<Builder, ProtoError> {
    let schema = parse_schema(text)?;
    compile_parsed(&schema, options)
}

/// Same as [compile_schema] for a schema given in its JSON form.
pub fn compile_json_schema(text: &str, options: Options) -> Result<Builder, ProtoError> {
    let schema = Schema::from_json(text)?;
    compile_parsed(&schema, options)
}

fn compile_parsed(schema: &Schema, options: Options) -> Result<Builder, ProtoError> {
    let mut builder = Builder::new(options);
    builder.import(schema, None)?;
    builder.resolve_all()?;
    Ok(builder)
}
