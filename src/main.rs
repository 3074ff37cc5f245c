#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = scriptorium_rust::run().await {
        eprintln!("scriptorium-rust fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
