use std::fs;
use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use pyglue::Generator;

#[derive(Parser, Debug)]
#[command(name = "pyglue")]
#[command(about = "Generate CPython extension glue from annotated C headers", long_about = None)]
struct Args {
    /// Annotated header files to scan, in order
    #[arg(value_name = "HEADER", required = true)]
    headers: Vec<PathBuf>,

    /// Name of the generated extension module
    #[arg(short, long, default_value = "pymodule")]
    module_name: String,

    /// Write the generated unit here instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Library initialization call emitted at the top of the module
    /// initializer, without the trailing semicolon (e.g. "AFF4_Init()")
    #[arg(long, value_name = "CALL")]
    init_call: Option<String>,

    #[command(flatten)]
    verbosity: clap_verbosity_flag::Verbosity,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    env_logger::Builder::new()
        .filter_level(args.verbosity.log_level_filter())
        .init();

    let mut generator = match &args.init_call {
        Some(call) => Generator::with_init_call(&args.module_name, call),
        None => Generator::new(&args.module_name),
    };

    for header in &args.headers {
        generator
            .parse_file(header)
            .with_context(|| format!("failed to scan {}", header.display()))?;
    }

    let output = generator.generate().context("generation failed")?;

    match &args.output {
        Some(path) => fs::write(path, output)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => std::io::stdout()
            .write_all(output.as_bytes())
            .context("failed to write to stdout")?,
    }

    Ok(())
}
