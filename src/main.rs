#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = grader_agent::run().await {
        eprintln!("grader-backend fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
