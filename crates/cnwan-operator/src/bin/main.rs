use clap::Parser;

use cnwan_operator::cli::{OperatorOpt, run};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fluvio_future::subscriber::init_logger();

    let opt = OperatorOpt::parse();
    run(opt).await
}
