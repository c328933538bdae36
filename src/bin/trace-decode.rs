use anyhow::{Context, Result};
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use structopt::StructOpt;
use trace_decode::{ContextBytes, Decoder, DecoderOptions, LogReporter, Protocol};

#[derive(StructOpt, Debug)]
#[structopt(
    about = "A decoder for the ARM ETMv3.5 and Cortex-M0+ MTB CPU instruction-trace protocols."
)]
struct Opt {
    #[structopt(
        short,
        long,
        help = "Decode an MTB record stream instead of ETM v3.5 (fixed 8-byte records)"
    )]
    mtb: bool,

    #[structopt(
        short = "-a",
        long = "--alt-addr-encoding",
        help = "Assume the alternative branch-address encoding rather than the standard one (ETM35 only)"
    )]
    alt_addr_encoding: bool,

    #[structopt(
        short = "-c",
        long = "--context-bytes",
        help = "Context ID width in bytes accompanying I-Sync/ContextID packets",
        default_value = "0"
    )]
    context_bytes: u8,

    #[structopt(name = "FILE", parse(from_os_str))]
    file: PathBuf,
}

fn context_bytes_from(n: u8) -> Result<ContextBytes> {
    match n {
        0 => Ok(ContextBytes::None),
        1 => Ok(ContextBytes::One),
        2 => Ok(ContextBytes::Two),
        4 => Ok(ContextBytes::Four),
        n => anyhow::bail!("invalid --context-bytes {}: must be 0, 1, 2 or 4", n),
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let opt = Opt::from_args();

    let options = DecoderOptions {
        protocol: if opt.mtb { Protocol::Mtb } else { Protocol::Etm35 },
        alt_addr_encoding: opt.alt_addr_encoding,
        context_bytes: context_bytes_from(opt.context_bytes)?,
        cycle_accurate: false,
        data_only_mode: false,
    };

    let buf = {
        let mut f = File::open(&opt.file)
            .with_context(|| format!("failed to open {:?}", opt.file))?;
        let mut buf = Vec::new();
        f.read_to_end(&mut buf)
            .with_context(|| format!("failed to read {:?}", opt.file))?;
        buf
    };

    let mut decoder = Decoder::new(options);
    decoder.force_sync(true);
    let mut reporter = LogReporter;

    let mut printed = 0usize;
    let result = decoder.pump(
        &buf,
        |cpu| {
            println!("{:#?}", cpu);
            printed += 1;
        },
        Some(&mut reporter),
    );

    if let Err(e) = result {
        eprintln!("warning: {}", e);
    }

    eprintln!("decoded {} packet(s); stats: {:?}", printed, decoder.stats());
    Ok(())
}
