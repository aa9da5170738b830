use anyhow::Result;
use clap::Parser;
use webtime::{
    host::{args::HostArgs, start_host},
    utils::{
        dir::create_application_default_path,
        logging::{enable_logging, HOST_PREFIX},
        runtime::single_thread_runtime,
    },
};

/// Entry point the browser's native messaging registration launches. Events
/// arrive on stdin, tab commands leave on stdout, so logging stays in files
/// unless --log-console is passed for debugging.
fn main() -> Result<()> {
    let args = HostArgs::parse();

    let app_dir = args.dir.map_or_else(create_application_default_path, Ok)?;
    enable_logging(HOST_PREFIX, &app_dir, args.log, args.log_console)?;
    single_thread_runtime()?.block_on(async move { start_host(app_dir).await })?;
    Ok(())
}
