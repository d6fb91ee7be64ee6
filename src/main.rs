use std::process;

#[tokio::main]
async fn main() {
    if let Err(e) = tg_media_finder::run().await {
        log::error!("Fatal: {}", e);
        eprintln!("tg-media-finder: {}", e);
        process::exit(1);
    }
}
