#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = scriptorium_rust::run_worker().await {
        eprintln!("scriptorium-worker fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
