use modgate::cli::{self, Cli};

fn main() {
    let args = Cli::parse_args();

    let level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    if let Err(e) = cli::run(args) {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}
