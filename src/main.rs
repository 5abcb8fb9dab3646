#[tokio::main]
async fn main() {
    if let Err(error) = livepreview_lib::run_agent().await {
        eprintln!("livepreview agent failed: {error}");
        std::process::exit(1);
    }
}
