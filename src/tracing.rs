use tracing_subscriber::EnvFilter;

/// Fallback filter under `--verbose`: pipeline targets at debug, noisy
/// dependencies held back.
const VERBOSE_FILTER: &str = "debug,sqlx=warn,hyper=info,hyper_util=info,reqwest=info,h2=info";

fn fallback_filter(default_filter: &str, verbose: bool) -> &str {
    if verbose {
        VERBOSE_FILTER
    } else {
        default_filter
    }
}

/// Install the global subscriber, writing to stderr so stdout stays clean for
/// the JSON a command prints.
///
/// `RUST_LOG` wins when set. Otherwise `default_filter` is used, or the
/// verbose filter when `verbose` is on. Verbose output also carries file and
/// line; the normal output is compact.
pub fn init_tracing(default_filter: &str, verbose: bool) -> Result<(), anyhow::Error> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(fallback_filter(default_filter, verbose)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);
    let installed = if verbose {
        builder.with_file(true).with_line_number(true).try_init()
    } else {
        builder.compact().try_init()
    };
    installed.map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))
}
