//! The binary talk-loader-fetch.

use talk_loader_fetch_cli::*;

fn main() {
    let args = <Args as clap::Parser>::parse();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing::Level::INFO.into())
                .from_env_lossy(),
        )
        .try_init();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("could not start tokio runtime: {err}");
            std::process::exit(2);
        }
    };

    let report = match runtime.block_on(run(args)) {
        Ok(report) => report,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(2);
        }
    };

    for outcome in report.outcomes.iter() {
        match &outcome.resource {
            Some(resource) => println!(
                "{} -> {} ({} bytes)",
                outcome.id,
                resource.path.display(),
                resource.size
            ),
            None => println!("{} -> failed", outcome.id),
        }
    }

    let stats = &report.stats;
    tracing::info!(
        requests = stats.requests,
        coalesced = stats.coalesced,
        fetches = stats.fetches_started,
        failed = stats.fetches_failed,
        "done"
    );

    if !report.all_ok() {
        std::process::exit(1);
    }
}
