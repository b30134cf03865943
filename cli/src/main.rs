use clap::{Args, Parser, Subcommand};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use brine_proto::{load_json_file, load_proto_file, new_builder, parse_schema, Builder, ByteBuffer, Options};
use brine_proto_compiler::error::ProtoError;

#[derive(Parser)]
#[command(name = "bproto")]
#[command(about = "Parse .proto schemas and encode or decode protobuf messages", long_about = None)]
struct Cli {
    #[command(flatten)]
    options: OptionFlags,

    #[command(subcommand)]
    command: Commands,
}

/// Builder options. `--config` is read first; flags override it.
#[derive(Args)]
struct OptionFlags {
    /// JSON file with builder options
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Rename fields to camelCase on import
    #[arg(long, global = true)]
    camel_case: bool,

    /// Do not register field name aliases
    #[arg(long, global = true)]
    no_accessors: bool,

    /// Leave fields missing from the input unset on decode
    #[arg(long, global = true)]
    no_defaults: bool,

    /// Keep unknown fields when decoding
    #[arg(long, global = true)]
    keep_unknown: bool,

    /// Skip files that were already imported instead of failing
    #[arg(long, global = true)]
    allow_duplicate_imports: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a `.proto` file and print its AST as JSON
    Parse {
        /// Input `.proto` file
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Load and resolve a schema, then list every type it declares
    Check {
        /// Input `.proto` or `.json` schema
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Encode a JSON message to wire bytes
    Encode {
        /// Input `.proto` or `.json` schema
        #[arg(short, long)]
        schema: PathBuf,

        /// Full name of the message type
        #[arg(short = 't', long = "type")]
        type_name: String,

        /// JSON message (reads stdin if omitted)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output file (prints hex to stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Prefix the message with its varint length
        #[arg(long)]
        delimited: bool,
    },

    /// Decode wire bytes and print the message as JSON
    Decode {
        /// Input `.proto` or `.json` schema
        #[arg(short, long)]
        schema: PathBuf,

        /// Full name of the message type
        #[arg(short = 't', long = "type")]
        type_name: String,

        /// Wire bytes (reads stdin if omitted)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Input is hex text rather than raw bytes
        #[arg(long)]
        hex: bool,

        /// Input is a sequence of length-prefixed messages
        #[arg(long)]
        delimited: bool,
    },
}

fn main() -> Result<(), ProtoError> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let options = cli.options.load()?;

    match &cli.command {
        Commands::Parse { input } => {
            let text = fs::read_to_string(input)?;
            let schema = parse_schema(&text)?;
            println!("{}", serde_json::to_string_pretty(&schema)?);
            Ok(())
        }

        Commands::Check { input } => {
            let builder = load_schema(input, options)?;
            for (name, kind) in builder.tree().type_names() {
                println!("{:<8} .{}", kind, name);
            }
            tracing::info!(path = %input.display(), "schema resolved");
            Ok(())
        }

        Commands::Encode { schema, type_name, input, output, delimited } => {
            let builder = load_schema(schema, options)?;
            let runtime = builder.build(type_name)?;

            let json: serde_json::Value = serde_json::from_slice(&read_input(input.as_deref())?)?;
            let message = runtime.from_json(&json)?;
            let bytes = if *delimited {
                runtime.encode_delimited(&message)?
            } else {
                runtime.encode(&message)?
            };

            if let Some(out_path) = output {
                fs::write(out_path, &bytes)?;
                tracing::info!(bytes = bytes.len(), path = %out_path.display(), "wrote message");
            } else {
                println!("{}", hex::encode(&bytes));
            }
            Ok(())
        }

        Commands::Decode { schema, type_name, input, hex: hex_input, delimited } => {
            let builder = load_schema(schema, options)?;
            let runtime = builder.build(type_name)?;

            let mut data = read_input(input.as_deref())?;
            if *hex_input {
                let text = String::from_utf8_lossy(&data);
                let digits: String = text.split_whitespace().collect();
                data = hex::decode(digits).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
            }

            if *delimited {
                let mut bb = ByteBuffer::new(&data);
                let mut messages = Vec::new();
                while !bb.is_empty() {
                    let message = runtime.decode_delimited(&mut bb)?;
                    messages.push(runtime.to_json(&message));
                }
                println!("{}", serde_json::to_string_pretty(&messages)?);
            } else {
                let message = runtime.decode(&data)?;
                println!("{}", serde_json::to_string_pretty(&runtime.to_json(&message))?);
            }
            Ok(())
        }
    }
}

impl OptionFlags {
    fn load(&self) -> Result<Options, ProtoError> {
        let mut options = match &self.config {
            Some(path) => Options::from_json_str(&fs::read_to_string(path)?)?,
            None => Options::default(),
        };
        if self.camel_case {
            options.convert_fields_to_camel_case = true;
        }
        if self.no_accessors {
            options.populate_accessors = false;
        }
        if self.no_defaults {
            options.populate_defaults = false;
        }
        if self.keep_unknown {
            options.retain_unknown_fields = true;
        }
        if self.allow_duplicate_imports {
            options.allow_duplicate_imports = true;
        }
        Ok(options)
    }
}

fn load_schema(path: &Path, options: Options) -> Result<Builder, ProtoError> {
    let builder = Some(new_builder(options));
    if path.extension().is_some_and(|ext| ext == "json") {
        load_json_file(path, builder)
    } else {
        load_proto_file(path, builder)
    }
}

fn read_input(path: Option<&Path>) -> Result<Vec<u8>, ProtoError> {
    match path {
        Some(path) => Ok(fs::read(path)?),
        None => {
            let mut data = Vec::new();
            io::stdin().read_to_end(&mut data)?;
            Ok(data)
        }
    }
}
