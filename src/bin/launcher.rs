#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = grader_agent::run_launcher().await {
        eprintln!("grader-launcher fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
