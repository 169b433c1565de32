use tracing_subscriber::EnvFilter;

fn main() {
    // Logs go to stderr at warn by default; RUST_LOG overrides.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()))
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = annoport::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
