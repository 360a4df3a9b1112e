use clap::Parser;
use dyload::{Loader, OpenFlags};
use std::process::ExitCode;

/// Open a shared library, call one of its `double(double)` functions and print the result.
#[derive(Parser, Debug)]
#[command(name = "dyload", version)]
struct Args {
    /// Library path or logical name.
    #[arg(short, long, default_value = "libm")]
    library: String,
    /// Symbol to call as `extern "C" fn(f64) -> f64`.
    #[arg(short, long, default_value = "cos")]
    symbol: String,
    /// Argument passed to the symbol.
    #[arg(short, long, default_value_t = 2.0, allow_negative_numbers = true)]
    arg: f64,
    /// Resolve every symbol when the library is opened.
    #[arg(long)]
    now: bool,
}

fn run(args: &Args) -> dyload::Result<f64> {
    let flags = if args.now {
        OpenFlags::RTLD_NOW
    } else {
        OpenFlags::RTLD_LAZY
    };
    let mut loader = Loader::new();
    let handle = loader.open(&args.library, flags)?;
    let value = {
        let func = unsafe { loader.resolve::<extern "C" fn(f64) -> f64>(handle, &args.symbol)? };
        func(args.arg)
    };
    loader.close(handle)?;
    Ok(value)
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    match run(&args) {
        Ok(value) => {
            println!("{value:.6}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}
