use std::fs;
use std::io::{self, Write};

use anyhow::{Context, anyhow, bail};
use allocator_api2::alloc::Global;
use pbarena::arena::Arena;
use pbarena::google::api::HttpBody;
use pbarena::reflection::DynamicMessageRef;
use pbarena::{DynMessage, Message, MessageExt};
use tracing_subscriber::EnvFilter;

const PREVIEW_LEN: usize = 64;

struct Args {
    input: String,
    reencode: Option<String>,
    dump: bool,
}

fn parse_args() -> anyhow::Result<Option<Args>> {
    let mut args = std::env::args().skip(1);
    let mut input = None;
    let mut reencode = None;
    let mut dump = false;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(None),
            "--dump" => dump = true,
            "--reencode" => {
                reencode = Some(args.next().context("--reencode needs an output path")?);
            }
            _ if input.is_none() => input = Some(arg),
            _ => bail!("unexpected argument `{arg}`"),
        }
    }
    Ok(input.map(|input| Args { input, reencode, dump }))
}

fn init_logging() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .try_init()
        .map_err(|err| anyhow!("installing the log subscriber: {err}"))
}

fn main() -> anyhow::Result<()> {
    init_logging()?;

    let Some(args) = parse_args()? else {
        print_usage();
        return Ok(());
    };

    let arena = Arena::new(&Global);
    let decoded = if args.input == "-" {
        HttpBody::decode_from_bufread(&mut io::stdin().lock(), &arena)
    } else {
        let mut file = fs::File::open(&args.input)
            .with_context(|| format!("opening {}", args.input))?;
        HttpBody::decode_from_read(&mut file, &arena)
    };
    let body = decoded.with_context(|| format!("decoding {} as google.api.HttpBody", args.input))?;

    let mut out = io::stdout().lock();
    print_summary(&mut out, body)?;
    if args.dump {
        writeln!(out, "{:#?}", DynamicMessageRef(body))?;
    }

    if let Some(path) = args.reencode {
        let bytes = body.serialize(&arena)?;
        fs::write(&path, bytes).with_context(|| format!("writing {path}"))?;
        tracing::info!(path = %path, len = bytes.len(), "re-encoded message written");
    }
    Ok(())
}

fn print_summary(out: &mut impl Write, body: &HttpBody<'_>) -> io::Result<()> {
    writeln!(out, "content_type: {:?}", body.content_type())?;
    let data = body.data();
    let preview = &data[..data.len().min(PREVIEW_LEN)];
    let ellipsis = if data.len() > PREVIEW_LEN { "..." } else { "" };
    match std::str::from_utf8(preview) {
        Ok(text) => writeln!(out, "data: {} bytes {text:?}{ellipsis}", data.len())?,
        Err(_) => writeln!(out, "data: {} bytes {preview:02x?}{ellipsis}", data.len())?,
    }
    for (i, ext) in body.extensions().iter().enumerate() {
        writeln!(
            out,
            "extensions[{i}]: {} ({} bytes)",
            ext.type_url(),
            ext.value().len()
        )?;
    }
    let unknown = body.unknown_fields();
    if !unknown.is_empty() {
        writeln!(out, "unknown fields: {}", unknown.len())?;
    }
    Ok(())
}

fn print_usage() {
    eprintln!("Inspect a serialized google.api.HttpBody");
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("  httpbody-inspect <body.pb> [--dump] [--reencode <out.pb>]");
    eprintln!("  httpbody-inspect - < body.pb");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("  --dump              Print every populated field");
    eprintln!("  --reencode <path>   Write the message serialized again");
    eprintln!();
    eprintln!("Log verbosity follows RUST_LOG, e.g. RUST_LOG=pbarena=trace.");
}
