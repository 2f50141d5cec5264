#[tokio::main]
async fn main() -> anyhow::Result<()> {
    presencewatch_lib::run().await
}
