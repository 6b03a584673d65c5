// Binary entry point for helpmetest
// This is a thin wrapper that delegates to the library implementation

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = helpmetest_mcp::shell::run().await {
        eprintln!("helpmetest fatal error: {:#}", e);
        return Err(e);
    }
    Ok(())
}
