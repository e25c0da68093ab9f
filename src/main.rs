use std::env;
use std::io;
use std::process;

use clap::crate_version;
use clap_complete::{Generator, Shell};

use rsvg_convert::cache::Cache;
use rsvg_convert::cli::{build_cli, Action, ArgParser};
use rsvg_convert::config::Config;
use rsvg_convert::convert::Converter;
use rsvg_convert::error::{Error, ParseError};
use rsvg_convert::request::ConversionRequest;
use rsvg_convert::runner::{CancelToken, Inkscape, Renderer};

fn print_completions<G: Generator>(gen: G, cmd: &mut clap::Command) {
    clap_complete::generate(gen, cmd, cmd.get_name().to_string(), &mut io::stdout());
}

fn print_version(config: &Config) {
    let inkscape = Inkscape::new(&config.renderer, config.timeout);

    println!("rsvg-convert version {}\n", crate_version!());
    println!("renderer:");
    println!("  {}", inkscape.identity());
}

#[cfg(unix)]
mod interrupt {
    use once_cell::sync::OnceCell;
    use rsvg_convert::runner::CancelToken;

    static TOKEN: OnceCell<CancelToken> = OnceCell::new();

    extern "C" fn on_signal(_signum: libc::c_int) {
        if let Some(token) = TOKEN.get() {
            token.cancel();
        }
    }

    /// Makes SIGINT and SIGTERM cancel `token`, so that the renderer is killed and the
    /// cache is left clean instead of the process dying halfway through.
    pub fn install(token: &CancelToken) {
        if TOKEN.set(token.clone()).is_err() {
            return;
        }

        let handler = on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;

        unsafe {
            libc::signal(libc::SIGINT, handler);
            libc::signal(libc::SIGTERM, handler);
        }
    }
}

#[cfg(not(unix))]
mod interrupt {
    use rsvg_convert::runner::CancelToken;

    pub fn install(_token: &CancelToken) {}
}

fn convert(config: &Config, request: &ConversionRequest) -> Result<(), Error> {
    let cancel = CancelToken::new();
    interrupt::install(&cancel);

    let cache = Cache::open(config.cache_options())?;
    let inkscape = Inkscape::new(&config.renderer, config.timeout);

    let conversion = Converter::new(&cache, &inkscape)
        .with_cancel(cancel)
        .with_source_date_epoch(config.source_date_epoch)
        .convert(request)?;

    rsvg_convert::convert_log!(
        "{} {}",
        if conversion.cache_hit { "reused" } else { "created" },
        conversion.artifact.display()
    );

    cache.close()?;

    Ok(())
}

fn run() -> Result<(), Error> {
    let config = Config::from_env()?;

    match ArgParser::new(config.tolerant).parse(env::args_os())? {
        Action::PrintCompletion(shell) => {
            let mut cmd = build_cli();
            eprintln!("Generating completion file for {shell}");
            print_completions::<Shell>(shell, &mut cmd);
        }

        Action::PrintVersion => print_version(&config),

        Action::Convert(request) => convert(&config, &request)?,
    }

    Ok(())
}

fn main() {
    match run() {
        Ok(()) => (),

        // clap knows how to print help and usage errors, and exits with 0 or 2
        Err(Error::Parse(ParseError::Usage(e))) => e.exit(),

        Err(e) => {
            eprintln!("{e}");
            process::exit(e.exit_code());
        }
    }
}
