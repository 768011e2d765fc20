use image_reconciler::runtime::{boot, run};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    boot::init_logging();
    let (client, config) = boot::boot(std::env::args().nth(1)).await?;

    match run::run_once(&client, &config).await {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Err(failure) => {
            println!("{}", serde_json::to_string_pretty(&failure.report())?);
            std::process::exit(1);
        }
    }
}
