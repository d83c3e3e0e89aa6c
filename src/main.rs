use clap::Parser;
use fileio_cli::{run, Cli, Outcome};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(Outcome::Success) | Ok(Outcome::NoInput) => std::process::exit(0),
        Ok(Outcome::Aborted) => std::process::exit(1),
        Err(e) => {
            eprintln!("[ERROR] Upload failed: {e:#}");
            std::process::exit(1);
        }
    }
}
